use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use crate::core::distance::is_within_bounding_box;
use crate::models::{
    pair_key, ActivityOffer, MatchRecord, OfferRequest, OfferStatus, Package, Profile,
    ProfilePatch, RequestStatus, StoreChange, SwipeRecord, SwipeStatus,
};
use crate::services::store::{
    AcceptOutcome, Acceptance, ChangeBroadcaster, ChangeFeed, MatchStore, MessageStore,
    OfferQuery, OfferStore, PackageStore, ProfileQuery, ProfileStore, RequestQuery, RequestStore,
    StoreError, Stores, SwipeStore,
};
use crate::services::notify::TracingSink;

/// A direct message as seen by the read-only message view
#[derive(Debug, Clone)]
pub struct MessageRecord {
    pub sender_id: String,
    pub receiver_id: String,
    pub sent_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct Tables {
    profiles: HashMap<String, Profile>,
    offers: HashMap<Uuid, ActivityOffer>,
    requests: HashMap<Uuid, OfferRequest>,
    matches: Vec<MatchRecord>,
    packages: Vec<Package>,
    messages: Vec<MessageRecord>,
    swipes: HashMap<(String, String), SwipeRecord>,
}

impl Tables {
    fn has_pair(&self, a: &str, b: &str) -> bool {
        self.matches
            .iter()
            .any(|m| m.sender_id == a && m.receiver_id == b)
    }

    /// Insert whichever halves are missing; true when anything was written
    fn insert_pair(&mut self, a: &str, b: &str, offer_id: Option<Uuid>, at: DateTime<Utc>) -> bool {
        let mut created = false;
        for (sender, receiver) in [(a, b), (b, a)] {
            if !self.has_pair(sender, receiver) {
                self.matches.push(MatchRecord {
                    id: Uuid::new_v4(),
                    sender_id: sender.to_string(),
                    receiver_id: receiver.to_string(),
                    offer_id,
                    created_at: at,
                });
                created = true;
            }
        }
        created
    }
}

/// In-process implementation of every store.
///
/// All tables sit behind one lock, so compound writes are atomic with
/// respect to each other. Used by tests and for running the service without
/// a database.
pub struct MemoryStore {
    tables: RwLock<Tables>,
    changes: ChangeBroadcaster,
    available: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            changes: ChangeBroadcaster::default(),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate an outage: every call fails with `Unavailable` while false
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("memory store offline".to_string()))
        }
    }

    pub async fn insert_profile(&self, profile: Profile) {
        self.tables
            .write()
            .await
            .profiles
            .insert(profile.id.clone(), profile);
    }

    pub async fn insert_message(&self, message: MessageRecord) {
        self.tables.write().await.messages.push(message);
    }

    /// Mark every message from `from` to `user_id` as read
    pub async fn mark_read(&self, user_id: &str, from: &str, at: DateTime<Utc>) {
        let mut tables = self.tables.write().await;
        for message in tables
            .messages
            .iter_mut()
            .filter(|m| m.receiver_id == user_id && m.sender_id == from)
        {
            message.read_at.get_or_insert(at);
        }
    }

    /// Raw directional records, including orphaned halves
    pub async fn match_records(&self) -> Vec<MatchRecord> {
        self.tables.read().await.matches.clone()
    }

    /// Insert a single directional half, bypassing the pair invariant.
    /// Only useful for simulating damaged data.
    pub async fn insert_match_half(&self, record: MatchRecord) {
        self.tables.write().await.matches.push(record);
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Stores {
    /// Wire every store to a fresh in-memory backend that logs notifications.
    /// The backend handle is returned for seeding and inspection.
    pub fn in_memory() -> (Self, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let stores = Stores::from_backend(store.clone(), Arc::new(TracingSink));
        (stores, store)
    }
}

impl ChangeFeed for MemoryStore {
    fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }
}

#[async_trait]
impl ProfileStore for MemoryStore {
    async fn get(&self, id: &str) -> Result<Profile, StoreError> {
        self.check_available()?;
        self.tables
            .read()
            .await
            .profiles
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("profile {}", id)))
    }

    async fn update(&self, id: &str, patch: &ProfilePatch) -> Result<Profile, StoreError> {
        self.check_available()?;
        let mut tables = self.tables.write().await;
        let profile = tables
            .profiles
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("profile {}", id)))?;
        patch.apply(profile);
        Ok(profile.clone())
    }

    async fn query(&self, query: &ProfileQuery) -> Result<Vec<Profile>, StoreError> {
        self.check_available()?;
        let tables = self.tables.read().await;

        let mut profiles: Vec<Profile> = tables
            .profiles
            .values()
            .filter(|p| query.ids.as_ref().map_or(true, |ids| ids.contains(&p.id)))
            .filter(|p| !query.exclude_ids.contains(&p.id))
            .filter(|p| query.min_age.map_or(true, |min| p.age >= min))
            .filter(|p| query.max_age.map_or(true, |max| p.age <= max))
            .filter(|p| query.gender.map_or(true, |g| p.gender == g))
            .filter(|p| match (&query.bounding_box, p.coordinates) {
                (Some(bbox), Some(c)) => is_within_bounding_box(c.latitude, c.longitude, bbox),
                _ => true,
            })
            .cloned()
            .collect();

        profiles.sort_by(|a, b| a.id.cmp(&b.id));
        if let Some(offset) = query.offset {
            profiles.drain(..offset.min(profiles.len()));
        }
        if let Some(limit) = query.limit {
            profiles.truncate(limit);
        }
        Ok(profiles)
    }
}

#[async_trait]
impl OfferStore for MemoryStore {
    async fn insert(&self, offer: &ActivityOffer) -> Result<(), StoreError> {
        self.check_available()?;
        self.tables
            .write()
            .await
            .offers
            .insert(offer.id, offer.clone());
        Ok(())
    }

    async fn publish(
        &self,
        offer: &ActivityOffer,
        daily_offers_count: u32,
        daily_offers_reset_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.check_available()?;
        let mut tables = self.tables.write().await;
        let creator = tables
            .profiles
            .get_mut(&offer.creator_id)
            .ok_or_else(|| StoreError::NotFound(format!("profile {}", offer.creator_id)))?;
        creator.daily_offers_count = daily_offers_count;
        creator.daily_offers_reset_at = Some(daily_offers_reset_at);
        tables.offers.insert(offer.id, offer.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<ActivityOffer, StoreError> {
        self.check_available()?;
        self.tables
            .read()
            .await
            .offers
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("offer {}", id)))
    }

    async fn update_status(
        &self,
        id: Uuid,
        from: OfferStatus,
        to: OfferStatus,
    ) -> Result<bool, StoreError> {
        self.check_available()?;
        let mut tables = self.tables.write().await;
        let offer = tables
            .offers
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("offer {}", id)))?;

        if offer.status != from || !from.can_transition_to(to) {
            return Ok(false);
        }
        offer.status = to;
        self.changes.publish(StoreChange::OfferStatusChanged {
            offer_id: id,
            status: to,
        });
        Ok(true)
    }

    async fn query(&self, query: &OfferQuery) -> Result<Vec<ActivityOffer>, StoreError> {
        self.check_available()?;
        let tables = self.tables.read().await;

        let mut offers: Vec<ActivityOffer> = tables
            .offers
            .values()
            .filter(|o| query.status.map_or(true, |s| o.status == s))
            .filter(|o| query.creator_id.as_ref().map_or(true, |c| &o.creator_id == c))
            .filter(|o| {
                query
                    .exclude_creator_id
                    .as_ref()
                    .map_or(true, |c| &o.creator_id != c)
            })
            .filter(|o| query.event_not_before.map_or(true, |t| o.event_at >= t))
            .filter(|o| query.ids.as_ref().map_or(true, |ids| ids.contains(&o.id)))
            .filter(|o| !query.exclude_ids.contains(&o.id))
            .cloned()
            .collect();

        offers.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        if let Some(offset) = query.offset {
            offers.drain(..offset.min(offers.len()));
        }
        if let Some(limit) = query.limit {
            offers.truncate(limit);
        }
        Ok(offers)
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        self.check_available()?;
        Ok(self.tables.write().await.offers.remove(&id).is_some())
    }

    async fn expire_before(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>, StoreError> {
        self.check_available()?;
        let mut tables = self.tables.write().await;
        let mut expired = Vec::new();
        for offer in tables
            .offers
            .values_mut()
            .filter(|o| o.status == OfferStatus::Active && o.event_at < now)
        {
            offer.status = OfferStatus::Expired;
            expired.push(offer.id);
        }
        for id in &expired {
            self.changes.publish(StoreChange::OfferStatusChanged {
                offer_id: *id,
                status: OfferStatus::Expired,
            });
        }
        Ok(expired)
    }
}

#[async_trait]
impl RequestStore for MemoryStore {
    async fn get(&self, id: Uuid) -> Result<OfferRequest, StoreError> {
        self.check_available()?;
        self.tables
            .read()
            .await
            .requests
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("request {}", id)))
    }

    async fn query(&self, query: &RequestQuery) -> Result<Vec<OfferRequest>, StoreError> {
        self.check_available()?;
        let tables = self.tables.read().await;

        let mut requests: Vec<OfferRequest> = tables
            .requests
            .values()
            .filter(|r| query.requester_id.as_ref().map_or(true, |id| &r.requester_id == id))
            .filter(|r| query.status.map_or(true, |s| r.status == s))
            .filter(|r| query.offer_ids.as_ref().map_or(true, |ids| ids.contains(&r.offer_id)))
            .filter(|r| {
                query.creator_id.as_ref().map_or(true, |creator| {
                    tables
                        .offers
                        .get(&r.offer_id)
                        .map_or(false, |o| &o.creator_id == creator)
                })
            })
            .cloned()
            .collect();

        requests.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(requests)
    }

    async fn count_sent_since(
        &self,
        requester_id: &str,
        since: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        self.check_available()?;
        let tables = self.tables.read().await;
        Ok(tables
            .requests
            .values()
            .filter(|r| r.requester_id == requester_id && r.created_at >= since)
            .count() as u64)
    }

    async fn create_request(
        &self,
        request: &OfferRequest,
        charge_free_tier: bool,
    ) -> Result<(), StoreError> {
        self.check_available()?;
        let mut tables = self.tables.write().await;

        let duplicate = tables.requests.values().any(|r| {
            r.offer_id == request.offer_id
                && r.requester_id == request.requester_id
                && r.status.is_active()
        });
        if duplicate {
            return Err(StoreError::Conflict(format!(
                "{} already has an active request on offer {}",
                request.requester_id, request.offer_id
            )));
        }

        let requester = tables
            .profiles
            .get_mut(&request.requester_id)
            .ok_or_else(|| StoreError::NotFound(format!("profile {}", request.requester_id)))?;
        requester.total_requests_sent += 1;
        if charge_free_tier {
            requester.free_offers_used += 1;
        }

        tables.requests.insert(request.id, request.clone());
        self.changes.publish(StoreChange::RequestCreated {
            request_id: request.id,
            offer_id: request.offer_id,
        });
        Ok(())
    }

    async fn accept_request(&self, acceptance: &Acceptance) -> Result<AcceptOutcome, StoreError> {
        self.check_available()?;
        let mut tables = self.tables.write().await;

        let request = tables
            .requests
            .get_mut(&acceptance.request_id)
            .ok_or_else(|| StoreError::NotFound(format!("request {}", acceptance.request_id)))?;
        if request.status != RequestStatus::Pending {
            return Ok(AcceptOutcome::NotPending);
        }
        request.status = RequestStatus::Accepted;
        request.updated_at = acceptance.accepted_at;

        let match_created = tables.insert_pair(
            &acceptance.creator_id,
            &acceptance.requester_id,
            Some(acceptance.offer_id),
            acceptance.accepted_at,
        );

        let offer_completed = match tables.offers.get_mut(&acceptance.offer_id) {
            Some(offer) if offer.status.can_transition_to(OfferStatus::Completed) => {
                offer.status = OfferStatus::Completed;
                true
            }
            _ => false,
        };

        self.changes.publish(StoreChange::RequestStatusChanged {
            request_id: acceptance.request_id,
            status: RequestStatus::Accepted,
        });
        if match_created {
            self.changes.publish(StoreChange::MatchPairCreated {
                user_a: acceptance.creator_id.clone(),
                user_b: acceptance.requester_id.clone(),
            });
        }
        if offer_completed {
            self.changes.publish(StoreChange::OfferStatusChanged {
                offer_id: acceptance.offer_id,
                status: OfferStatus::Completed,
            });
        }

        Ok(AcceptOutcome::Accepted { match_created })
    }

    async fn reject_request(&self, request_id: Uuid, at: DateTime<Utc>) -> Result<bool, StoreError> {
        self.check_available()?;
        let mut tables = self.tables.write().await;
        let request = tables
            .requests
            .get_mut(&request_id)
            .ok_or_else(|| StoreError::NotFound(format!("request {}", request_id)))?;
        if request.status != RequestStatus::Pending {
            return Ok(false);
        }
        request.status = RequestStatus::Rejected;
        request.updated_at = at;
        self.changes.publish(StoreChange::RequestStatusChanged {
            request_id,
            status: RequestStatus::Rejected,
        });
        Ok(true)
    }
}

#[async_trait]
impl MatchStore for MemoryStore {
    async fn insert_pair(
        &self,
        user_a: &str,
        user_b: &str,
        offer_id: Option<Uuid>,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        self.check_available()?;
        let created = self
            .tables
            .write()
            .await
            .insert_pair(user_a, user_b, offer_id, at);
        if created {
            self.changes.publish(StoreChange::MatchPairCreated {
                user_a: user_a.to_string(),
                user_b: user_b.to_string(),
            });
        }
        Ok(created)
    }

    async fn delete_pair(&self, user_a: &str, user_b: &str) -> Result<usize, StoreError> {
        self.check_available()?;
        let mut tables = self.tables.write().await;
        let key = pair_key(user_a, user_b);
        let before = tables.matches.len();
        tables
            .matches
            .retain(|m| pair_key(&m.sender_id, &m.receiver_id) != key);
        let removed = before - tables.matches.len();

        if removed > 0 {
            self.changes.publish(StoreChange::MatchPairDeleted {
                user_a: user_a.to_string(),
                user_b: user_b.to_string(),
            });
        }
        Ok(removed)
    }

    async fn query_by_user(&self, user_id: &str) -> Result<Vec<MatchRecord>, StoreError> {
        self.check_available()?;
        let tables = self.tables.read().await;
        Ok(tables
            .matches
            .iter()
            .filter(|m| m.sender_id == user_id || m.receiver_id == user_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl PackageStore for MemoryStore {
    async fn latest_usable(
        &self,
        owner_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Package>, StoreError> {
        self.check_available()?;
        let tables = self.tables.read().await;
        Ok(tables
            .packages
            .iter()
            .filter(|p| p.owner_id == owner_id && p.is_usable(now))
            .max_by_key(|p| p.created_at)
            .cloned())
    }

    async fn insert(&self, package: &Package) -> Result<(), StoreError> {
        self.check_available()?;
        self.tables.write().await.packages.push(package.clone());
        Ok(())
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn count_unread(&self, user_id: &str, from: Option<&str>) -> Result<u64, StoreError> {
        self.check_available()?;
        let tables = self.tables.read().await;
        Ok(tables
            .messages
            .iter()
            .filter(|m| m.receiver_id == user_id && m.read_at.is_none())
            .filter(|m| from.map_or(true, |sender| m.sender_id == sender))
            .count() as u64)
    }

    async fn latest_per_conversation(
        &self,
        user_id: &str,
    ) -> Result<HashMap<String, DateTime<Utc>>, StoreError> {
        self.check_available()?;
        let tables = self.tables.read().await;
        let mut latest: HashMap<String, DateTime<Utc>> = HashMap::new();

        for message in &tables.messages {
            let other = if message.sender_id == user_id {
                &message.receiver_id
            } else if message.receiver_id == user_id {
                &message.sender_id
            } else {
                continue;
            };
            let entry = latest.entry(other.clone()).or_insert(message.sent_at);
            if message.sent_at > *entry {
                *entry = message.sent_at;
            }
        }
        Ok(latest)
    }
}

#[async_trait]
impl SwipeStore for MemoryStore {
    async fn record(&self, record: &SwipeRecord) -> Result<(), StoreError> {
        self.check_available()?;
        self.tables.write().await.swipes.insert(
            (record.sender_id.clone(), record.receiver_id.clone()),
            record.clone(),
        );
        Ok(())
    }

    async fn get(
        &self,
        sender_id: &str,
        receiver_id: &str,
    ) -> Result<Option<SwipeRecord>, StoreError> {
        self.check_available()?;
        Ok(self
            .tables
            .read()
            .await
            .swipes
            .get(&(sender_id.to_string(), receiver_id.to_string()))
            .cloned())
    }

    async fn history(&self, user_id: &str) -> Result<Vec<SwipeRecord>, StoreError> {
        self.check_available()?;
        Ok(self
            .tables
            .read()
            .await
            .swipes
            .values()
            .filter(|s| s.sender_id == user_id)
            .cloned()
            .collect())
    }

    async fn complete_match(
        &self,
        user_a: &str,
        user_b: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        self.check_available()?;
        let mut tables = self.tables.write().await;

        for (sender, receiver) in [(user_a, user_b), (user_b, user_a)] {
            tables.swipes.insert(
                (sender.to_string(), receiver.to_string()),
                SwipeRecord {
                    sender_id: sender.to_string(),
                    receiver_id: receiver.to_string(),
                    status: SwipeStatus::Matched,
                    created_at: at,
                },
            );
        }

        let created = tables.insert_pair(user_a, user_b, None, at);
        if created {
            self.changes.publish(StoreChange::MatchPairCreated {
                user_a: user_a.to_string(),
                user_b: user_b.to_string(),
            });
        }
        Ok(created)
    }
}
