use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Geographic position in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// `geo` points are (x = longitude, y = latitude)
    pub fn to_point(self) -> geo::Point<f64> {
        geo::Point::new(self.longitude, self.latitude)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "gender", rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Other,
}

impl Gender {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "male" => Some(Gender::Male),
            "female" => Some(Gender::Female),
            "other" => Some(Gender::Other),
            _ => None,
        }
    }
}

/// User profile with demographic, location and quota data
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: String,
    pub name: String,
    pub age: u8,
    pub gender: Gender,
    pub city: String,
    #[serde(default)]
    pub coordinates: Option<Coordinates>,
    #[serde(default)]
    pub is_premium: bool,
    #[serde(default)]
    pub boost_expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub free_offers_used: u32,
    /// Per-user override of the configured free allowance (test accounts)
    #[serde(default)]
    pub free_offers_limit: Option<u32>,
    #[serde(default)]
    pub total_requests_sent: u32,
    #[serde(default)]
    pub daily_offers_count: u32,
    #[serde(default)]
    pub daily_offers_reset_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Profile {
    pub fn is_boosted(&self, now: DateTime<Utc>) -> bool {
        self.boost_expires_at.map_or(false, |expiry| expiry > now)
    }

    pub fn free_limit(&self, default_limit: u32) -> u32 {
        self.free_offers_limit.unwrap_or(default_limit)
    }

    pub fn public(&self) -> PublicProfile {
        PublicProfile {
            id: self.id.clone(),
            name: self.name.clone(),
            age: self.age,
            gender: self.gender,
            city: self.city.clone(),
        }
    }
}

/// The part of a profile other users are allowed to see
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicProfile {
    pub id: String,
    pub name: String,
    pub age: u8,
    pub gender: Gender,
    pub city: String,
}

/// Partial profile update; `None` fields are left untouched
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfilePatch {
    pub name: Option<String>,
    pub city: Option<String>,
    pub coordinates: Option<Coordinates>,
    pub is_premium: Option<bool>,
    pub boost_expires_at: Option<DateTime<Utc>>,
    pub free_offers_limit: Option<u32>,
}

impl ProfilePatch {
    pub fn apply(&self, profile: &mut Profile) {
        if let Some(name) = &self.name {
            profile.name = name.clone();
        }
        if let Some(city) = &self.city {
            profile.city = city.clone();
        }
        if let Some(coordinates) = self.coordinates {
            profile.coordinates = Some(coordinates);
        }
        if let Some(is_premium) = self.is_premium {
            profile.is_premium = is_premium;
        }
        if let Some(expiry) = self.boost_expires_at {
            profile.boost_expires_at = Some(expiry);
        }
        if let Some(limit) = self.free_offers_limit {
            profile.free_offers_limit = Some(limit);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "offer_type", rename_all = "snake_case")]
pub enum OfferType {
    OneToOne,
    Group,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "offer_category", rename_all = "lowercase")]
pub enum OfferCategory {
    Coffee,
    Drinks,
    Food,
    Sport,
    Culture,
    Outdoor,
    Nightlife,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "offer_status", rename_all = "lowercase")]
pub enum OfferStatus {
    Active,
    Completed,
    Cancelled,
    Expired,
}

impl OfferStatus {
    /// Offers only ever leave `Active`; every other status is terminal.
    pub fn can_transition_to(self, next: OfferStatus) -> bool {
        self == OfferStatus::Active && next != OfferStatus::Active
    }
}

/// A user-published, time-boxed activity invitation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityOffer {
    pub id: Uuid,
    pub creator_id: String,
    pub title: String,
    pub description: String,
    pub city: String,
    #[serde(default)]
    pub district: Option<String>,
    #[serde(default)]
    pub coordinates: Option<Coordinates>,
    pub event_at: DateTime<Utc>,
    pub capacity: u16,
    pub offer_type: OfferType,
    pub category: OfferCategory,
    pub status: OfferStatus,
    pub created_at: DateTime<Utc>,
}

impl ActivityOffer {
    /// Active and its event has not started yet
    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        self.status == OfferStatus::Active && self.event_at >= now
    }
}

/// Everything a creator supplies when publishing an offer
#[derive(Debug, Clone)]
pub struct OfferDraft {
    pub title: String,
    pub description: String,
    pub city: String,
    pub district: Option<String>,
    pub coordinates: Option<Coordinates>,
    pub event_at: DateTime<Utc>,
    pub capacity: u16,
    pub offer_type: OfferType,
    pub category: OfferCategory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "request_status", rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Accepted,
    Rejected,
}

impl RequestStatus {
    /// Pending and accepted requests block a second request on the same offer
    pub fn is_active(self) -> bool {
        matches!(self, RequestStatus::Pending | RequestStatus::Accepted)
    }
}

/// A user's bid to join a specific offer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferRequest {
    pub id: Uuid,
    pub offer_id: Uuid,
    pub requester_id: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub suggested_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub location: Option<String>,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Optional details a requester attaches to a request
#[derive(Debug, Clone, Default)]
pub struct RequestDraft {
    pub message: Option<String>,
    pub suggested_at: Option<DateTime<Utc>>,
    pub location: Option<String>,
}

/// One directional half of a mutual match
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchRecord {
    pub id: Uuid,
    pub sender_id: String,
    pub receiver_id: String,
    #[serde(default)]
    pub offer_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl MatchRecord {
    /// The other side of this record as seen from `user_id`
    pub fn counterpart(&self, user_id: &str) -> Option<&str> {
        if self.sender_id == user_id {
            Some(&self.receiver_id)
        } else if self.receiver_id == user_id {
            Some(&self.sender_id)
        } else {
            None
        }
    }
}

/// Order-independent key for a pair of users
pub fn pair_key(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

/// Purchased request allowance
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Package {
    pub id: Uuid,
    pub owner_id: String,
    /// `None` means unlimited
    #[serde(default)]
    pub quota_limit: Option<u32>,
    /// `None` means the package never expires
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Package {
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.expires_at.map_or(true, |expiry| expiry > now)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwipeAction {
    Like,
    Pass,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "swipe_status", rename_all = "lowercase")]
pub enum SwipeStatus {
    Liked,
    Rejected,
    Matched,
}

/// Persisted outcome of a one-to-one swipe
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwipeRecord {
    pub sender_id: String,
    pub receiver_id: String,
    pub status: SwipeStatus,
    pub created_at: DateTime<Utc>,
}

/// Geospatial bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

/// Demographic and distance filters for discovery
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryFilters {
    pub min_age: u8,
    pub max_age: u8,
    /// `None` means all genders
    #[serde(default)]
    pub gender: Option<Gender>,
    #[serde(default)]
    pub max_distance_km: Option<f64>,
}

impl Default for DiscoveryFilters {
    fn default() -> Self {
        Self {
            min_age: 18,
            max_age: 99,
            gender: None,
            max_distance_km: None,
        }
    }
}

/// An offer surfaced by the discovery feed
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferCandidate {
    pub offer: ActivityOffer,
    pub creator: PublicProfile,
    pub distance_km: Option<f64>,
}

/// A profile surfaced by the swipe feed
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileCandidate {
    pub profile: PublicProfile,
    pub distance_km: Option<f64>,
    pub is_boosted: bool,
}

/// A match resolved to the other party
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchSummary {
    pub user: PublicProfile,
    pub offer_id: Option<Uuid>,
    pub matched_at: DateTime<Utc>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub unread_count: u64,
}

impl MatchSummary {
    pub fn activity_at(&self) -> DateTime<Utc> {
        self.last_message_at.unwrap_or(self.matched_at)
    }
}

/// Badge counters shown across the UI
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserCounters {
    pub pending_incoming_requests: u64,
    pub unread_messages: u64,
    pub matches: u64,
    /// `None` when the user has no request limit
    pub requests_remaining: Option<u32>,
}
