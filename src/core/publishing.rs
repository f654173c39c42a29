use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::OfferSettings;
use crate::error::{CoreError, CoreResult};
use crate::models::{ActivityOffer, OfferDraft, OfferStatus, OfferType, Profile};
use crate::services::store::Stores;

/// Length of the daily publishing window
pub const DAILY_WINDOW_HOURS: i64 = 24;

pub fn validate_draft(draft: &OfferDraft, now: DateTime<Utc>) -> CoreResult<()> {
    if draft.title.trim().is_empty() {
        return Err(CoreError::InvalidInput("title must not be empty".to_string()));
    }
    if draft.event_at <= now {
        return Err(CoreError::InvalidInput(
            "eventAt must be in the future".to_string(),
        ));
    }
    if draft.capacity == 0 {
        return Err(CoreError::InvalidInput("capacity must be at least 1".to_string()));
    }
    if draft.offer_type == OfferType::OneToOne && draft.capacity != 1 {
        return Err(CoreError::InvalidInput(
            "one-to-one offers have a capacity of 1".to_string(),
        ));
    }
    Ok(())
}

/// Offers published in the creator's current window and when that window ends.
///
/// A window opens with the first offer after the previous one ended.
pub fn daily_window(profile: &Profile, now: DateTime<Utc>) -> (u32, DateTime<Utc>) {
    match profile.daily_offers_reset_at {
        Some(reset_at) if reset_at > now => (profile.daily_offers_count, reset_at),
        _ => (0, now + Duration::hours(DAILY_WINDOW_HOURS)),
    }
}

/// Publishing, cancelling and expiring offers
#[derive(Clone)]
pub struct OfferPublisher {
    stores: Stores,
    settings: OfferSettings,
}

impl OfferPublisher {
    pub fn new(stores: Stores, settings: OfferSettings) -> Self {
        Self { stores, settings }
    }

    pub async fn publish(
        &self,
        creator_id: &str,
        draft: OfferDraft,
        now: DateTime<Utc>,
    ) -> CoreResult<ActivityOffer> {
        validate_draft(&draft, now)?;

        let creator = self.stores.profiles.get_fresh(creator_id).await?;
        let (count, reset_at) = daily_window(&creator, now);
        let limit = self.settings.daily_limit;

        if !creator.is_premium && count >= limit {
            warn!("Daily offer limit reached for {} ({}/{})", creator_id, count, limit);
            return Err(CoreError::QuotaExceeded { used: count, limit });
        }

        let offer = ActivityOffer {
            id: Uuid::new_v4(),
            creator_id: creator_id.to_string(),
            title: draft.title.trim().to_string(),
            description: draft.description,
            city: draft.city,
            district: draft.district,
            coordinates: draft.coordinates,
            event_at: draft.event_at,
            capacity: draft.capacity,
            offer_type: draft.offer_type,
            category: draft.category,
            status: OfferStatus::Active,
            created_at: now,
        };

        self.stores.offers.publish(&offer, count + 1, reset_at).await?;
        self.stores.profiles.invalidate(creator_id).await;

        info!("Offer {} published by {}", offer.id, creator_id);
        Ok(offer)
    }

    /// Withdraw an active offer; creator only
    pub async fn cancel(&self, offer_id: Uuid, caller_id: &str) -> CoreResult<ActivityOffer> {
        let mut offer = self.stores.offers.get(offer_id).await?;
        if offer.creator_id != caller_id {
            return Err(CoreError::InvalidTransition(format!(
                "only the creator can cancel offer {}",
                offer_id
            )));
        }

        let updated = self
            .stores
            .offers
            .update_status(offer_id, OfferStatus::Active, OfferStatus::Cancelled)
            .await?;
        if !updated {
            return Err(CoreError::InvalidTransition(format!(
                "offer {} is no longer active",
                offer_id
            )));
        }

        offer.status = OfferStatus::Cancelled;
        info!("Offer {} cancelled", offer_id);
        Ok(offer)
    }

    /// Expire every active offer whose event time has passed
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> CoreResult<usize> {
        let expired = self.stores.offers.expire_before(now).await?;
        if !expired.is_empty() {
            info!("Expired {} offers", expired.len());
        }
        Ok(expired.len())
    }
}
