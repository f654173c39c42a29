use serde::{Deserialize, Serialize};

use crate::models::domain::{
    MatchSummary, OfferCandidate, OfferRequest, ProfileCandidate, SwipeStatus,
};

/// Next offer in the feed; `candidate` is empty once the feed is exhausted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedResponse {
    pub candidate: Option<OfferCandidate>,
    pub exhausted: bool,
}

/// Next profile in the swipe feed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileFeedResponse {
    pub candidate: Option<ProfileCandidate>,
    pub exhausted: bool,
}

/// Outcome of a swipe
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwipeResponse {
    pub status: SwipeStatus,
    pub matched: bool,
}

/// Current request allowance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaResponse {
    pub allowed: bool,
    pub tier: String,
    pub remaining: Option<u32>,
}

/// Response for the match list endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchesResponse {
    pub matches: Vec<MatchSummary>,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnmatchResponse {
    pub removed: usize,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub status_code: u16,
}

/// Result of accepting a request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptResponse {
    pub request: OfferRequest,
    pub match_created: bool,
}

/// A list of requests, incoming or outgoing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestsResponse {
    pub requests: Vec<OfferRequest>,
    pub total: usize,
}
