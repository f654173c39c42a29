use actix_web::{web, HttpResponse, Responder};

use crate::error::CoreError;
use crate::models::{HealthResponse, MatchesResponse, UnmatchResponse};
use crate::routes::{AppState, AuthUser};

/// Configure health, match and counter routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_check))
        .route("/matches", web::get().to(list_matches))
        .route("/matches/{user_id}", web::delete().to(unmatch))
        .route("/counters", web::get().to(counters));
}

/// Health check endpoint
async fn health_check(state: web::Data<AppState>) -> impl Responder {
    let healthy = match &state.database {
        Some(database) => database.health_check().await.unwrap_or(false),
        None => true,
    };

    let status = if healthy { "healthy" } else { "degraded" };

    HttpResponse::Ok().json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: state.clock.now(),
    })
}

/// Mutual matches, most recent activity first
///
/// GET /api/v1/matches
async fn list_matches(
    state: web::Data<AppState>,
    user: AuthUser,
) -> Result<HttpResponse, CoreError> {
    let matches = state.registry.list_matches(&user.id).await?;

    tracing::info!("Returning {} matches for user {}", matches.len(), user.id);

    Ok(HttpResponse::Ok().json(MatchesResponse {
        total: matches.len(),
        matches,
    }))
}

/// DELETE /api/v1/matches/{user_id}
async fn unmatch(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<String>,
) -> Result<HttpResponse, CoreError> {
    let removed = state.registry.unmatch(&user.id, &path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(UnmatchResponse { removed }))
}

/// Badge counters
///
/// GET /api/v1/counters
async fn counters(state: web::Data<AppState>, user: AuthUser) -> Result<HttpResponse, CoreError> {
    let counters = state.registry.counters(&user.id, state.clock.now()).await?;
    Ok(HttpResponse::Ok().json(counters))
}
