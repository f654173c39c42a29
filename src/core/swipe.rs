use chrono::{DateTime, Utc};
use std::collections::HashSet;
use tracing::{debug, info};

use crate::core::distance::{calculate_bounding_box, compare_distance, filter_by_radius};
use crate::core::filters::{matches_demographics, validate_filters};
use crate::error::{CoreError, CoreResult};
use crate::models::{
    DiscoveryFilters, NotificationEvent, Profile, ProfileCandidate, SwipeAction, SwipeRecord,
    SwipeStatus,
};
use crate::services::store::{ProfileQuery, Stores};

/// Result of a single swipe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwipeOutcome {
    pub status: SwipeStatus,
    /// True when this swipe completed a mutual like
    pub matched: bool,
}

/// Every profile the user already swiped on, whatever the outcome
pub fn swiped_ids(history: &[SwipeRecord]) -> HashSet<String> {
    history.iter().map(|r| r.receiver_id.clone()).collect()
}

/// Rank profile candidates: boosted first, then nearest, then id
pub fn rank_profiles(
    user: &Profile,
    filters: &DiscoveryFilters,
    candidates: Vec<Profile>,
    excluded: &HashSet<String>,
    now: DateTime<Utc>,
) -> Vec<ProfileCandidate> {
    let eligible: Vec<Profile> = candidates
        .into_iter()
        .filter(|p| p.id != user.id)
        .filter(|p| !excluded.contains(&p.id))
        .filter(|p| matches_demographics(p, filters))
        .collect();

    let max_km = filters.max_distance_km.unwrap_or(f64::INFINITY);
    let mut located = filter_by_radius(user.coordinates, eligible, max_km);

    located.sort_by(|a, b| {
        b.item
            .is_boosted(now)
            .cmp(&a.item.is_boosted(now))
            .then_with(|| compare_distance(a.distance_km, b.distance_km))
            .then_with(|| a.item.id.cmp(&b.item.id))
    });

    located
        .into_iter()
        .map(|located| ProfileCandidate {
            is_boosted: located.item.is_boosted(now),
            profile: located.item.public(),
            distance_km: located.distance_km,
        })
        .collect()
}

fn top_profile(
    user: &Profile,
    filters: &DiscoveryFilters,
    pool: Vec<Profile>,
    excluded: &HashSet<String>,
    now: DateTime<Utc>,
) -> Option<Profile> {
    let top_id = rank_profiles(user, filters, pool.clone(), excluded, now)
        .into_iter()
        .next()
        .map(|candidate| candidate.profile.id)?;
    pool.into_iter().find(|p| p.id == top_id)
}

/// Profile-card discovery and like/pass handling
#[derive(Clone)]
pub struct SwipeFlow {
    stores: Stores,
    candidate_limit: usize,
}

impl SwipeFlow {
    pub fn new(stores: Stores, candidate_limit: usize) -> Self {
        Self {
            stores,
            candidate_limit,
        }
    }

    pub async fn next_profile(
        &self,
        user: &Profile,
        filters: &DiscoveryFilters,
        now: DateTime<Utc>,
    ) -> CoreResult<Option<ProfileCandidate>> {
        validate_filters(filters)?;

        let history = self.stores.swipes.history(&user.id).await?;
        let excluded = swiped_ids(&history);

        let mut exclude_ids: Vec<String> = excluded.iter().cloned().collect();
        exclude_ids.push(user.id.clone());

        let bounding_box = match (user.coordinates, filters.max_distance_km) {
            (Some(c), Some(max_km)) => {
                Some(calculate_bounding_box(c.latitude, c.longitude, max_km))
            }
            _ => None,
        };

        // The store pages in id order, so rank each page together with the
        // best profile so far instead of trusting the first page
        let page_size = self.candidate_limit.max(1);
        let mut offset = 0;
        let mut best: Option<Profile> = None;

        loop {
            let page = self
                .stores
                .profiles
                .query(&ProfileQuery {
                    exclude_ids: exclude_ids.clone(),
                    min_age: Some(filters.min_age),
                    max_age: Some(filters.max_age),
                    gender: filters.gender,
                    bounding_box,
                    offset: Some(offset),
                    limit: Some(page_size),
                    ..Default::default()
                })
                .await?;

            let fetched = page.len();
            debug!(
                "Found {} profile candidates for {} at offset {}",
                fetched, user.id, offset
            );

            let mut pool = page;
            pool.extend(best.take());
            best = top_profile(user, filters, pool, &excluded, now);

            if fetched < page_size {
                break;
            }
            offset += fetched;
        }

        Ok(best.and_then(|profile| {
            rank_profiles(user, filters, vec![profile], &excluded, now)
                .into_iter()
                .next()
        }))
    }

    pub async fn swipe(
        &self,
        user_id: &str,
        target_id: &str,
        action: SwipeAction,
        now: DateTime<Utc>,
    ) -> CoreResult<SwipeOutcome> {
        if user_id == target_id {
            return Err(CoreError::InvalidTransition(
                "cannot swipe on yourself".to_string(),
            ));
        }
        // Target must exist
        self.stores.profiles.get(target_id).await?;

        if let Some(existing) = self.stores.swipes.get(user_id, target_id).await? {
            if existing.status == SwipeStatus::Matched {
                return Ok(SwipeOutcome {
                    status: SwipeStatus::Matched,
                    matched: false,
                });
            }
        }

        if action == SwipeAction::Pass {
            self.record(user_id, target_id, SwipeStatus::Rejected, now).await?;
            return Ok(SwipeOutcome {
                status: SwipeStatus::Rejected,
                matched: false,
            });
        }

        let reciprocal = self.stores.swipes.get(target_id, user_id).await?;
        let liked_back = matches!(
            reciprocal.map(|r| r.status),
            Some(SwipeStatus::Liked) | Some(SwipeStatus::Matched)
        );

        if !liked_back {
            self.record(user_id, target_id, SwipeStatus::Liked, now).await?;
            return Ok(SwipeOutcome {
                status: SwipeStatus::Liked,
                matched: false,
            });
        }

        let created = self
            .stores
            .swipes
            .complete_match(user_id, target_id, now)
            .await?;
        if created {
            info!("Mutual like between {} and {}", user_id, target_id);
            self.stores.notifications.emit(NotificationEvent::MatchCreated {
                user_a: user_id.to_string(),
                user_b: target_id.to_string(),
            });
        }

        Ok(SwipeOutcome {
            status: SwipeStatus::Matched,
            matched: true,
        })
    }

    async fn record(
        &self,
        sender_id: &str,
        receiver_id: &str,
        status: SwipeStatus,
        now: DateTime<Utc>,
    ) -> CoreResult<()> {
        self.stores
            .swipes
            .record(&SwipeRecord {
                sender_id: sender_id.to_string(),
                receiver_id: receiver_id.to_string(),
                status,
                created_at: now,
            })
            .await?;
        Ok(())
    }
}
