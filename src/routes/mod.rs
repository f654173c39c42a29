// Route exports
pub mod auth;
pub mod feed;
pub mod matches;
pub mod offers;

use actix_web::http::StatusCode;
use actix_web::{error, web, HttpRequest, HttpResponse, ResponseError};
use std::fmt;
use std::sync::Arc;

use crate::config::Settings;
use crate::core::{
    Clock, DiscoveryFeed, MatchRegistry, OfferPublisher, QuotaPolicy, RequestLifecycle, SwipeFlow,
};
use crate::error::CoreError;
use crate::models::{DiscoveryFilters, ErrorResponse};
use crate::services::{PostgresStore, SkipStore, Stores};

pub use auth::{AuthUser, JwtVerifier};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub stores: Stores,
    pub feed: DiscoveryFeed,
    pub swipes: SwipeFlow,
    pub lifecycle: RequestLifecycle,
    pub publisher: OfferPublisher,
    pub registry: MatchRegistry,
    pub quota: QuotaPolicy,
    pub default_filters: DiscoveryFilters,
    pub clock: Arc<dyn Clock>,
    pub jwt: Arc<JwtVerifier>,
    /// Present when running against PostgreSQL
    pub database: Option<Arc<PostgresStore>>,
}

impl AppState {
    pub fn new(
        stores: Stores,
        skips: Arc<dyn SkipStore>,
        clock: Arc<dyn Clock>,
        settings: &Settings,
    ) -> Self {
        let quota = QuotaPolicy::new(settings.quota);
        let candidate_limit = settings.discovery.candidate_limit;

        Self {
            feed: DiscoveryFeed::new(stores.clone(), skips, candidate_limit),
            swipes: SwipeFlow::new(stores.clone(), candidate_limit),
            lifecycle: RequestLifecycle::new(stores.clone(), quota),
            publisher: OfferPublisher::new(stores.clone(), settings.offers.clone()),
            registry: MatchRegistry::new(stores.clone(), quota),
            quota,
            default_filters: settings.discovery.default_filters(),
            clock,
            jwt: Arc::new(JwtVerifier::new(&settings.auth.jwt_secret)),
            database: None,
            stores,
        }
    }

    pub fn with_database(mut self, database: Arc<PostgresStore>) -> Self {
        self.database = Some(database);
        self
    }
}

impl CoreError {
    fn error_code(&self) -> &'static str {
        match self {
            CoreError::QuotaExceeded { .. } => "quota_exceeded",
            CoreError::InvalidTransition(_) => "invalid_transition",
            CoreError::NotFound(_) => "not_found",
            CoreError::InvalidInput(_) => "invalid_input",
            CoreError::StoreUnavailable(_) => "store_unavailable",
        }
    }
}

impl ResponseError for CoreError {
    fn status_code(&self) -> StatusCode {
        match self {
            CoreError::QuotaExceeded { .. } => StatusCode::PAYMENT_REQUIRED,
            CoreError::InvalidTransition(_) => StatusCode::CONFLICT,
            CoreError::NotFound(_) => StatusCode::NOT_FOUND,
            CoreError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            CoreError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        HttpResponse::build(status).json(ErrorResponse {
            error: self.error_code().to_string(),
            message: self.to_string(),
            status_code: status.as_u16(),
        })
    }
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.error, self.message)
    }
}

impl ResponseError for ErrorResponse {
    fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::BAD_REQUEST)
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(self)
    }
}

/// Handle JSON payload errors
pub fn handle_json_payload_error(err: error::JsonPayloadError, req: &HttpRequest) -> actix_web::Error {
    tracing::info!("JSON payload error on {}: {}", req.path(), err);
    ErrorResponse {
        error: "invalid_json".to_string(),
        message: format!("Invalid JSON: {}", err),
        status_code: 400,
    }
    .into()
}

/// Handle query payload errors
pub fn handle_query_payload_error(err: error::QueryPayloadError, req: &HttpRequest) -> actix_web::Error {
    tracing::info!("Query error on {}: {}", req.path(), err);
    ErrorResponse {
        error: "invalid_query".to_string(),
        message: format!("Invalid query: {}", err),
        status_code: 400,
    }
    .into()
}

/// Handle path parameter errors, e.g. malformed ids
pub fn handle_path_error(err: error::PathError, req: &HttpRequest) -> actix_web::Error {
    tracing::info!("Path error on {}: {}", req.path(), err);
    ErrorResponse {
        error: "invalid_path".to_string(),
        message: format!("Invalid path: {}", err),
        status_code: 400,
    }
    .into()
}

/// Register the extractor error handlers on an app
pub fn configure_extractors(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(handle_json_payload_error))
        .app_data(web::QueryConfig::default().error_handler(handle_query_payload_error))
        .app_data(web::PathConfig::default().error_handler(handle_path_error));
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .configure(matches::configure)
            .configure(feed::configure)
            .configure(offers::configure),
    );
}
