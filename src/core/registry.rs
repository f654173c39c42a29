use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::core::quota::QuotaPolicy;
use crate::error::{CoreError, CoreResult};
use crate::models::{MatchRecord, MatchSummary, RequestStatus, UserCounters};
use crate::services::store::{RequestQuery, StoreError, Stores};

/// One entry per matched counterpart
#[derive(Debug, Clone, PartialEq)]
pub struct Counterpart {
    pub user_id: String,
    pub offer_id: Option<Uuid>,
    pub matched_at: DateTime<Utc>,
}

/// Collapse directional records into one entry per counterpart, keeping the
/// earliest half.
pub fn collapse_matches(user_id: &str, records: &[MatchRecord]) -> Vec<Counterpart> {
    let mut by_user: HashMap<&str, Counterpart> = HashMap::new();

    for record in records {
        let Some(other) = record.counterpart(user_id) else {
            continue;
        };
        by_user
            .entry(other)
            .and_modify(|existing| {
                if record.created_at < existing.matched_at {
                    existing.matched_at = record.created_at;
                }
                existing.offer_id = existing.offer_id.or(record.offer_id);
            })
            .or_insert_with(|| Counterpart {
                user_id: other.to_string(),
                offer_id: record.offer_id,
                matched_at: record.created_at,
            });
    }

    let mut counterparts: Vec<Counterpart> = by_user.into_values().collect();
    counterparts.sort_by(|a, b| a.user_id.cmp(&b.user_id));
    counterparts
}

/// Most recent activity first
pub fn sort_summaries(summaries: &mut [MatchSummary]) {
    summaries.sort_by(|a, b| {
        b.activity_at()
            .cmp(&a.activity_at())
            .then_with(|| a.user.id.cmp(&b.user.id))
    });
}

/// Read and remove mutual matches
#[derive(Clone)]
pub struct MatchRegistry {
    stores: Stores,
    quota: QuotaPolicy,
}

impl MatchRegistry {
    pub fn new(stores: Stores, quota: QuotaPolicy) -> Self {
        Self { stores, quota }
    }

    pub async fn list_matches(&self, user_id: &str) -> CoreResult<Vec<MatchSummary>> {
        let records = self.stores.matches.query_by_user(user_id).await?;
        let counterparts = collapse_matches(user_id, &records);
        let latest = self.stores.messages.latest_per_conversation(user_id).await?;

        let mut summaries = Vec::with_capacity(counterparts.len());
        for counterpart in counterparts {
            let profile = match self.stores.profiles.get(&counterpart.user_id).await {
                Ok(profile) => profile,
                Err(StoreError::NotFound(_)) => {
                    warn!(
                        "Match {} <-> {} points at a missing profile, skipping",
                        user_id, counterpart.user_id
                    );
                    continue;
                }
                Err(err) => return Err(err.into()),
            };

            let unread_count = self
                .stores
                .messages
                .count_unread(user_id, Some(&counterpart.user_id))
                .await?;

            summaries.push(MatchSummary {
                user: profile.public(),
                offer_id: counterpart.offer_id,
                matched_at: counterpart.matched_at,
                last_message_at: latest.get(&counterpart.user_id).copied(),
                unread_count,
            });
        }

        sort_summaries(&mut summaries);
        debug!("Listed {} matches for {}", summaries.len(), user_id);
        Ok(summaries)
    }

    /// Remove both halves of a match. Succeeds even if one or both halves
    /// were already gone; returns how many were removed.
    pub async fn unmatch(&self, user_id: &str, other_id: &str) -> CoreResult<usize> {
        if user_id == other_id {
            return Err(CoreError::InvalidTransition(
                "cannot unmatch yourself".to_string(),
            ));
        }

        let removed = self.stores.matches.delete_pair(user_id, other_id).await?;
        info!("Unmatched {} and {} ({} records removed)", user_id, other_id, removed);
        Ok(removed)
    }

    /// Badge counts for the user's navigation
    pub async fn counters(&self, user_id: &str, now: DateTime<Utc>) -> CoreResult<UserCounters> {
        let profile = self.stores.profiles.get_fresh(user_id).await?;

        let pending = self
            .stores
            .requests
            .query(&RequestQuery {
                creator_id: Some(user_id.to_string()),
                status: Some(RequestStatus::Pending),
                ..Default::default()
            })
            .await?;
        let unread_messages = self.stores.messages.count_unread(user_id, None).await?;
        let records = self.stores.matches.query_by_user(user_id).await?;
        let decision = self.quota.check(&self.stores, &profile, now).await?;

        Ok(UserCounters {
            pending_incoming_requests: pending.len() as u64,
            unread_messages,
            matches: collapse_matches(user_id, &records).len() as u64,
            requests_remaining: decision.remaining(),
        })
    }
}
