use chrono::{DateTime, Utc};

use crate::error::{CoreError, CoreResult};
use crate::models::{ActivityOffer, DiscoveryFilters, Profile};

/// Youngest age any filter may ask for
pub const MIN_ADULT_AGE: u8 = 18;

/// Reject filter sets that can never match anything
pub fn validate_filters(filters: &DiscoveryFilters) -> CoreResult<()> {
    if filters.min_age < MIN_ADULT_AGE {
        return Err(CoreError::InvalidInput(format!(
            "minAge must be at least {}",
            MIN_ADULT_AGE
        )));
    }
    if filters.min_age > filters.max_age {
        return Err(CoreError::InvalidInput(
            "minAge must not exceed maxAge".to_string(),
        ));
    }
    if let Some(max) = filters.max_distance_km {
        if !max.is_finite() || max < 0.0 {
            return Err(CoreError::InvalidInput(
                "maxDistanceKm must be a non-negative number".to_string(),
            ));
        }
    }
    Ok(())
}

/// Check if a profile matches the demographic filters
#[inline]
pub fn matches_demographics(profile: &Profile, filters: &DiscoveryFilters) -> bool {
    if let Some(gender) = filters.gender {
        if profile.gender != gender {
            return false;
        }
    }

    profile.age >= filters.min_age && profile.age <= filters.max_age
}

/// An offer can be shown to `user_id` if it is still open and not their own
#[inline]
pub fn is_offer_eligible(offer: &ActivityOffer, user_id: &str, now: DateTime<Utc>) -> bool {
    offer.is_open(now) && offer.creator_id != user_id
}
