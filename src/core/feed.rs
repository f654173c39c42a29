use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::core::distance::{filter_by_radius, Locatable};
use crate::core::filters::{is_offer_eligible, matches_demographics, validate_filters};
use crate::error::CoreResult;
use crate::models::{
    ActivityOffer, Coordinates, DiscoveryFilters, OfferCandidate, OfferStatus, Profile,
    RequestStatus,
};
use crate::services::session::SkipStore;
use crate::services::store::{OfferQuery, ProfileQuery, RequestQuery, Stores};

/// An offer together with its creator's profile
#[derive(Debug, Clone)]
pub struct FeedEntry {
    pub offer: ActivityOffer,
    pub creator: Profile,
}

impl Locatable for FeedEntry {
    /// Offers without their own position are placed at the creator's
    fn coordinates(&self) -> Option<Coordinates> {
        self.offer.coordinates.or(self.creator.coordinates)
    }
}

/// Pick the next offer to show `user`, or `None` when nothing is left.
///
/// Pure: callers gather the candidates and the exclusion set.
pub fn select_next(
    user: &Profile,
    filters: &DiscoveryFilters,
    candidates: Vec<FeedEntry>,
    exclusions: &HashSet<Uuid>,
    now: DateTime<Utc>,
) -> Option<OfferCandidate> {
    let eligible: Vec<FeedEntry> = candidates
        .into_iter()
        .filter(|entry| is_offer_eligible(&entry.offer, &user.id, now))
        .filter(|entry| !exclusions.contains(&entry.offer.id))
        .filter(|entry| matches_demographics(&entry.creator, filters))
        .collect();

    let max_km = filters.max_distance_km.unwrap_or(f64::INFINITY);
    let located = filter_by_radius(user.coordinates, eligible, max_km);

    located
        .into_iter()
        .min_by(|a, b| {
            b.item
                .offer
                .created_at
                .cmp(&a.item.offer.created_at)
                .then_with(|| a.item.offer.id.cmp(&b.item.offer.id))
        })
        .map(|located| OfferCandidate {
            creator: located.item.creator.public(),
            offer: located.item.offer,
            distance_km: located.distance_km,
        })
}

/// Offer feed: one candidate at a time, with session-scoped skips
#[derive(Clone)]
pub struct DiscoveryFeed {
    stores: Stores,
    skips: Arc<dyn SkipStore>,
    candidate_limit: usize,
}

impl DiscoveryFeed {
    pub fn new(stores: Stores, skips: Arc<dyn SkipStore>, candidate_limit: usize) -> Self {
        Self {
            stores,
            skips,
            candidate_limit,
        }
    }

    pub async fn next_candidate(
        &self,
        user: &Profile,
        filters: &DiscoveryFilters,
        now: DateTime<Utc>,
    ) -> CoreResult<Option<OfferCandidate>> {
        validate_filters(filters)?;

        let mut exclusions = self.skips.skipped(&user.id).await?;
        let own_requests = self
            .stores
            .requests
            .query(&RequestQuery {
                requester_id: Some(user.id.clone()),
                ..Default::default()
            })
            .await?;
        exclusions.extend(own_requests.iter().map(|r| r.offer_id));

        // Pages run newest first, so the first page with a hit holds the newest
        // eligible offer. Filters applied after the query can empty a page.
        let exclude_ids: Vec<Uuid> = exclusions.iter().copied().collect();
        let page_size = self.candidate_limit.max(1);
        let mut offset = 0;

        loop {
            let offers = self
                .stores
                .offers
                .query(&OfferQuery {
                    status: Some(OfferStatus::Active),
                    exclude_creator_id: Some(user.id.clone()),
                    event_not_before: Some(now),
                    exclude_ids: exclude_ids.clone(),
                    offset: Some(offset),
                    limit: Some(page_size),
                    ..Default::default()
                })
                .await?;

            let fetched = offers.len();
            if fetched == 0 {
                break;
            }

            // Accepting completes the offer, but the two writes can be observed apart
            let offer_ids: Vec<Uuid> = offers.iter().map(|o| o.id).collect();
            let accepted = self
                .stores
                .requests
                .query(&RequestQuery {
                    offer_ids: Some(offer_ids),
                    status: Some(RequestStatus::Accepted),
                    ..Default::default()
                })
                .await?;
            exclusions.extend(accepted.iter().map(|r| r.offer_id));

            let candidates = self.attach_creators(offers).await?;
            debug!(
                "Checking {} offer candidates for {} at offset {}",
                candidates.len(),
                user.id,
                offset
            );

            if let Some(candidate) = select_next(user, filters, candidates, &exclusions, now) {
                return Ok(Some(candidate));
            }
            if fetched < page_size {
                break;
            }
            offset += fetched;
        }

        debug!("No open offers for {}", user.id);
        Ok(None)
    }

    /// Hide an offer for the rest of the session
    pub async fn skip(&self, user_id: &str, offer_id: Uuid) -> CoreResult<()> {
        self.skips.skip(user_id, offer_id).await?;
        debug!("{} skipped offer {}", user_id, offer_id);
        Ok(())
    }

    /// Forget every skip, e.g. on manual refresh
    pub async fn reset(&self, user_id: &str) -> CoreResult<()> {
        self.skips.reset(user_id).await?;
        info!("Reset skipped offers for {}", user_id);
        Ok(())
    }

    async fn attach_creators(&self, offers: Vec<ActivityOffer>) -> CoreResult<Vec<FeedEntry>> {
        let creator_ids: Vec<String> = offers
            .iter()
            .map(|o| o.creator_id.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();

        let creators: HashMap<String, Profile> = self
            .stores
            .profiles
            .query(&ProfileQuery {
                ids: Some(creator_ids),
                ..Default::default()
            })
            .await?
            .into_iter()
            .map(|p| (p.id.clone(), p))
            .collect();

        Ok(offers
            .into_iter()
            .filter_map(|offer| match creators.get(&offer.creator_id) {
                Some(creator) => Some(FeedEntry {
                    creator: creator.clone(),
                    offer,
                }),
                None => {
                    warn!("Offer {} has no creator profile, skipping", offer.id);
                    None
                }
            })
            .collect())
    }
}
