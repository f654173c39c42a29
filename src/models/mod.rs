// Model exports
pub mod domain;
pub mod events;
pub mod requests;
pub mod responses;

pub use domain::{
    pair_key, ActivityOffer, BoundingBox, Coordinates, DiscoveryFilters, Gender, MatchRecord,
    MatchSummary, OfferCandidate, OfferCategory, OfferDraft, OfferRequest, OfferStatus, OfferType, Package,
    Profile, ProfileCandidate, ProfilePatch, PublicProfile, RequestDraft, RequestStatus,
    SwipeAction, SwipeRecord, SwipeStatus, UserCounters,
};
pub use events::{NotificationEvent, StoreChange};
pub use requests::{CreateOfferRequestBody, FeedQuery, PublishOfferRequest, SkipOfferRequest, SwipeRequest};
pub use responses::{
    AcceptResponse, ErrorResponse, FeedResponse, HealthResponse, MatchesResponse,
    ProfileFeedResponse, QuotaResponse, RequestsResponse, SwipeResponse, UnmatchResponse,
};
