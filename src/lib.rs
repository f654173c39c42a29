//! Lume Offers - offer discovery, request quota and matching for the Lume app
//!
//! Users publish activity offers, browse other users' offers, and send
//! requests to join them. Accepting a request creates a mutual match.
//! Request sending is limited by a quota derived from the user's tier.

pub mod config;
pub mod core;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;

// Re-export commonly used types
pub use crate::core::{
    distance::{calculate_bounding_box, haversine_distance},
    DiscoveryFeed, MatchRegistry, OfferPublisher, QuotaDecision, QuotaPolicy, RequestLifecycle,
    SwipeFlow,
};
pub use error::{CoreError, CoreResult};
pub use models::{ActivityOffer, DiscoveryFilters, MatchSummary, OfferRequest, Profile};
pub use services::{MemoryStore, PostgresStore, Stores};
