// Core algorithm exports
pub mod clock;
pub mod distance;
pub mod feed;
pub mod filters;
pub mod lifecycle;
pub mod publishing;
pub mod quota;
pub mod registry;
pub mod swipe;

pub use clock::{Clock, ManualClock, SystemClock};
pub use distance::{
    calculate_bounding_box, distance_km, filter_by_radius, haversine_distance,
    is_within_bounding_box, Locatable, Located,
};
pub use feed::{select_next, DiscoveryFeed, FeedEntry};
pub use filters::{is_offer_eligible, matches_demographics, validate_filters};
pub use lifecycle::{Accepted, RequestLifecycle};
pub use publishing::{daily_window, validate_draft, OfferPublisher};
pub use quota::{QuotaDecision, QuotaPolicy};
pub use registry::{collapse_matches, MatchRegistry};
pub use swipe::{rank_profiles, SwipeFlow, SwipeOutcome};
