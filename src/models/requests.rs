use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::domain::{
    Coordinates, DiscoveryFilters, Gender, OfferCategory, OfferDraft, OfferType, RequestDraft,
    SwipeAction,
};

/// Query parameters shared by the offer feed and the swipe feed
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeedQuery {
    #[serde(alias = "min_age", rename = "minAge")]
    pub min_age: Option<u8>,
    #[serde(alias = "max_age", rename = "maxAge")]
    pub max_age: Option<u8>,
    /// A gender or `all`
    pub gender: Option<String>,
    #[serde(alias = "max_distance_km", rename = "maxDistanceKm")]
    pub max_distance_km: Option<f64>,
}

impl FeedQuery {
    /// Fill unspecified fields from the configured defaults.
    ///
    /// Unknown gender strings are treated as `all` rather than rejected.
    pub fn into_filters(self, defaults: &DiscoveryFilters) -> DiscoveryFilters {
        let gender = match self.gender.as_deref() {
            None | Some("all") => defaults.gender,
            Some(value) => Gender::parse(value),
        };

        DiscoveryFilters {
            min_age: self.min_age.unwrap_or(defaults.min_age),
            max_age: self.max_age.unwrap_or(defaults.max_age),
            gender,
            max_distance_km: self.max_distance_km.or(defaults.max_distance_km),
        }
    }
}

/// Skip an offer for the rest of the session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkipOfferRequest {
    #[serde(alias = "offer_id", rename = "offerId")]
    pub offer_id: Uuid,
}

/// Record a one-to-one swipe
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SwipeRequest {
    #[validate(length(min = 1))]
    #[serde(alias = "target_user_id", rename = "targetUserId")]
    pub target_user_id: String,
    pub action: SwipeAction,
}

/// Publish a new activity offer
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PublishOfferRequest {
    #[validate(length(min = 1, max = 120))]
    pub title: String,
    #[validate(length(max = 2000))]
    #[serde(default)]
    pub description: String,
    #[validate(length(min = 1, max = 120))]
    pub city: String,
    #[validate(length(max = 120))]
    pub district: Option<String>,
    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude: Option<f64>,
    #[validate(range(min = -180.0, max = 180.0))]
    pub longitude: Option<f64>,
    pub event_at: DateTime<Utc>,
    #[validate(range(min = 1, max = 100))]
    #[serde(default = "default_capacity")]
    pub capacity: u16,
    pub offer_type: OfferType,
    pub category: OfferCategory,
}

fn default_capacity() -> u16 {
    1
}

impl PublishOfferRequest {
    pub fn into_draft(self) -> OfferDraft {
        let coordinates = match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Some(Coordinates::new(lat, lon)),
            _ => None,
        };

        OfferDraft {
            title: self.title,
            description: self.description,
            city: self.city,
            district: self.district,
            coordinates,
            event_at: self.event_at,
            capacity: self.capacity,
            offer_type: self.offer_type,
            category: self.category,
        }
    }
}

/// Ask to join an offer
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateOfferRequestBody {
    #[validate(length(max = 500))]
    pub message: Option<String>,
    pub suggested_at: Option<DateTime<Utc>>,
    #[validate(length(max = 200))]
    pub location: Option<String>,
}

impl From<CreateOfferRequestBody> for RequestDraft {
    fn from(body: CreateOfferRequestBody) -> Self {
        RequestDraft {
            message: body.message,
            suggested_at: body.suggested_at,
            location: body.location,
        }
    }
}
