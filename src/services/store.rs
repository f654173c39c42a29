use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::{
    ActivityOffer, BoundingBox, Gender, MatchRecord, NotificationEvent, OfferRequest, OfferStatus,
    Package, Profile, ProfilePatch, RequestStatus, StoreChange, SwipeRecord,
};

/// Errors that can occur when talking to a backing store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    /// A uniqueness or state guard rejected the write
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("SQLx error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

/// Candidate profile query for the swipe feed
#[derive(Debug, Clone, Default)]
pub struct ProfileQuery {
    /// Restrict to these ids when set
    pub ids: Option<Vec<String>>,
    pub exclude_ids: Vec<String>,
    pub min_age: Option<u8>,
    pub max_age: Option<u8>,
    pub gender: Option<Gender>,
    /// Profiles without coordinates always pass the box
    pub bounding_box: Option<BoundingBox>,
    /// Rows to skip in id order before `limit` applies
    pub offset: Option<usize>,
    pub limit: Option<usize>,
}

/// Offer query; results are ordered newest first, ties broken by id
#[derive(Debug, Clone, Default)]
pub struct OfferQuery {
    pub status: Option<OfferStatus>,
    pub creator_id: Option<String>,
    pub exclude_creator_id: Option<String>,
    pub event_not_before: Option<DateTime<Utc>>,
    pub ids: Option<Vec<Uuid>>,
    pub exclude_ids: Vec<Uuid>,
    pub offset: Option<usize>,
    pub limit: Option<usize>,
}

/// Request query; `creator_id` matches requests on offers owned by that user
#[derive(Debug, Clone, Default)]
pub struct RequestQuery {
    pub requester_id: Option<String>,
    pub creator_id: Option<String>,
    pub offer_ids: Option<Vec<Uuid>>,
    pub status: Option<RequestStatus>,
}

/// Everything the store needs to commit an acceptance in one step
#[derive(Debug, Clone)]
pub struct Acceptance {
    pub request_id: Uuid,
    pub offer_id: Uuid,
    pub creator_id: String,
    pub requester_id: String,
    pub accepted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptOutcome {
    Accepted { match_created: bool },
    /// The request left `Pending` before the write landed
    NotPending,
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Profile, StoreError>;
    async fn update(&self, id: &str, patch: &ProfilePatch) -> Result<Profile, StoreError>;
    async fn query(&self, query: &ProfileQuery) -> Result<Vec<Profile>, StoreError>;

    /// Read bypassing any cache; used right before quota decisions
    async fn get_fresh(&self, id: &str) -> Result<Profile, StoreError> {
        self.get(id).await
    }

    /// Drop any cached copy after a write made elsewhere
    async fn invalidate(&self, _id: &str) {}
}

#[async_trait]
pub trait OfferStore: Send + Sync {
    async fn insert(&self, offer: &ActivityOffer) -> Result<(), StoreError>;
    /// Insert an offer and store the creator's new daily counter in one write
    async fn publish(
        &self,
        offer: &ActivityOffer,
        daily_offers_count: u32,
        daily_offers_reset_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;
    async fn get(&self, id: Uuid) -> Result<ActivityOffer, StoreError>;
    /// Conditional update; returns false when the offer is not in `from`
    async fn update_status(
        &self,
        id: Uuid,
        from: OfferStatus,
        to: OfferStatus,
    ) -> Result<bool, StoreError>;
    async fn query(&self, query: &OfferQuery) -> Result<Vec<ActivityOffer>, StoreError>;
    async fn delete(&self, id: Uuid) -> Result<bool, StoreError>;
    /// Flip every active offer whose event time is before `now` to expired
    async fn expire_before(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>, StoreError>;
}

#[async_trait]
pub trait RequestStore: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<OfferRequest, StoreError>;
    async fn query(&self, query: &RequestQuery) -> Result<Vec<OfferRequest>, StoreError>;
    async fn count_sent_since(
        &self,
        requester_id: &str,
        since: DateTime<Utc>,
    ) -> Result<u64, StoreError>;
    /// Insert a pending request and bump the requester's counters atomically.
    ///
    /// Fails with `Conflict` when the requester already has an active request
    /// on the offer.
    async fn create_request(
        &self,
        request: &OfferRequest,
        charge_free_tier: bool,
    ) -> Result<(), StoreError>;
    /// Mark accepted, create the match pair if absent and complete the offer,
    /// all or nothing.
    async fn accept_request(&self, acceptance: &Acceptance) -> Result<AcceptOutcome, StoreError>;
    /// Returns false when the request is no longer pending
    async fn reject_request(&self, request_id: Uuid, at: DateTime<Utc>) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait MatchStore: Send + Sync {
    /// Create both directional halves unless the pair already exists.
    /// Returns true when anything was written.
    async fn insert_pair(
        &self,
        user_a: &str,
        user_b: &str,
        offer_id: Option<Uuid>,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;
    /// Remove whichever halves exist; returns how many were removed
    async fn delete_pair(&self, user_a: &str, user_b: &str) -> Result<usize, StoreError>;
    /// Directional records where the user is on either side
    async fn query_by_user(&self, user_id: &str) -> Result<Vec<MatchRecord>, StoreError>;
}

#[async_trait]
pub trait PackageStore: Send + Sync {
    /// Most recently created package that is active and unexpired at `now`
    async fn latest_usable(
        &self,
        owner_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Package>, StoreError>;
    async fn insert(&self, package: &Package) -> Result<(), StoreError>;
}

/// Read-only view of the messaging subsystem
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Unread messages addressed to `user_id`, optionally only those from `from`
    async fn count_unread(&self, user_id: &str, from: Option<&str>) -> Result<u64, StoreError>;
    /// Latest message time per conversation partner
    async fn latest_per_conversation(
        &self,
        user_id: &str,
    ) -> Result<HashMap<String, DateTime<Utc>>, StoreError>;
}

#[async_trait]
pub trait SwipeStore: Send + Sync {
    /// Insert or overwrite the record for (sender, receiver)
    async fn record(&self, record: &SwipeRecord) -> Result<(), StoreError>;
    async fn get(&self, sender_id: &str, receiver_id: &str)
        -> Result<Option<SwipeRecord>, StoreError>;
    /// Records sent by `user_id`
    async fn history(&self, user_id: &str) -> Result<Vec<SwipeRecord>, StoreError>;
    /// Mark both directions matched and create the match pair in one write.
    /// Returns true when a new pair was created.
    async fn complete_match(
        &self,
        user_a: &str,
        user_b: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;
}

/// Fire-and-forget delivery of notification events
pub trait NotificationSink: Send + Sync {
    fn emit(&self, event: NotificationEvent);
}

/// Stores that publish their state changes
pub trait ChangeFeed: Send + Sync {
    fn subscribe(&self) -> broadcast::Receiver<StoreChange>;
}

/// Broadcast channel shared by store implementations
#[derive(Debug, Clone)]
pub struct ChangeBroadcaster {
    tx: broadcast::Sender<StoreChange>,
}

impl ChangeBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn publish(&self, change: StoreChange) {
        // Err only means nobody is subscribed
        if self.tx.send(change).is_err() {
            tracing::trace!("No change subscribers");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.tx.subscribe()
    }
}

impl Default for ChangeBroadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Every collaborator the core talks to
#[derive(Clone)]
pub struct Stores {
    pub profiles: Arc<dyn ProfileStore>,
    pub offers: Arc<dyn OfferStore>,
    pub requests: Arc<dyn RequestStore>,
    pub matches: Arc<dyn MatchStore>,
    pub packages: Arc<dyn PackageStore>,
    pub messages: Arc<dyn MessageStore>,
    pub swipes: Arc<dyn SwipeStore>,
    pub notifications: Arc<dyn NotificationSink>,
}

impl Stores {
    /// Wire a single backend that implements every store
    pub fn from_backend<B>(backend: Arc<B>, notifications: Arc<dyn NotificationSink>) -> Self
    where
        B: ProfileStore
            + OfferStore
            + RequestStore
            + MatchStore
            + PackageStore
            + MessageStore
            + SwipeStore
            + 'static,
    {
        Self {
            profiles: backend.clone(),
            offers: backend.clone(),
            requests: backend.clone(),
            matches: backend.clone(),
            packages: backend.clone(),
            messages: backend.clone(),
            swipes: backend,
            notifications,
        }
    }

    /// Replace the profile store, e.g. with a caching wrapper
    pub fn with_profiles(mut self, profiles: Arc<dyn ProfileStore>) -> Self {
        self.profiles = profiles;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_change_broadcaster_delivers_to_subscribers() {
        let broadcaster = ChangeBroadcaster::default();
        let mut rx = broadcaster.subscribe();

        broadcaster.publish(StoreChange::MatchPairCreated {
            user_a: "a".to_string(),
            user_b: "b".to_string(),
        });

        let change = rx.recv().await.unwrap();
        assert!(matches!(change, StoreChange::MatchPairCreated { .. }));
    }

    #[test]
    fn test_publish_without_subscribers_is_harmless() {
        let broadcaster = ChangeBroadcaster::new(4);
        broadcaster.publish(StoreChange::MatchPairDeleted {
            user_a: "a".to_string(),
            user_b: "b".to_string(),
        });
    }
}
