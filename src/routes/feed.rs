use actix_web::{web, HttpResponse};
use validator::Validate;

use crate::error::CoreError;
use crate::models::{
    FeedQuery, FeedResponse, ProfileFeedResponse, SkipOfferRequest, SwipeRequest, SwipeResponse,
};
use crate::routes::{AppState, AuthUser};

/// Configure discovery and swipe routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/feed/next", web::get().to(next_offer))
        .route("/feed/skip", web::post().to(skip_offer))
        .route("/feed/reset", web::post().to(reset_feed))
        .route("/profiles/next", web::get().to(next_profile))
        .route("/swipes", web::post().to(swipe));
}

/// Next offer for the caller
///
/// GET /api/v1/feed/next?minAge=21&maxAge=35&gender=female&maxDistanceKm=25
async fn next_offer(
    state: web::Data<AppState>,
    user: AuthUser,
    query: web::Query<FeedQuery>,
) -> Result<HttpResponse, CoreError> {
    let filters = query.into_inner().into_filters(&state.default_filters);
    let profile = state.stores.profiles.get(&user.id).await?;

    let candidate = state
        .feed
        .next_candidate(&profile, &filters, state.clock.now())
        .await?;

    Ok(HttpResponse::Ok().json(FeedResponse {
        exhausted: candidate.is_none(),
        candidate,
    }))
}

/// POST /api/v1/feed/skip
async fn skip_offer(
    state: web::Data<AppState>,
    user: AuthUser,
    req: web::Json<SkipOfferRequest>,
) -> Result<HttpResponse, CoreError> {
    state.feed.skip(&user.id, req.offer_id).await?;
    Ok(HttpResponse::NoContent().finish())
}

/// POST /api/v1/feed/reset
async fn reset_feed(state: web::Data<AppState>, user: AuthUser) -> Result<HttpResponse, CoreError> {
    state.feed.reset(&user.id).await?;
    Ok(HttpResponse::NoContent().finish())
}

/// Next profile card for the caller
///
/// GET /api/v1/profiles/next
async fn next_profile(
    state: web::Data<AppState>,
    user: AuthUser,
    query: web::Query<FeedQuery>,
) -> Result<HttpResponse, CoreError> {
    let filters = query.into_inner().into_filters(&state.default_filters);
    let profile = state.stores.profiles.get(&user.id).await?;

    let candidate = state
        .swipes
        .next_profile(&profile, &filters, state.clock.now())
        .await?;

    Ok(HttpResponse::Ok().json(ProfileFeedResponse {
        exhausted: candidate.is_none(),
        candidate,
    }))
}

/// Like or pass on a profile
///
/// POST /api/v1/swipes
///
/// Request body:
/// ```json
/// {
///   "targetUserId": "string",
///   "action": "like|pass"
/// }
/// ```
async fn swipe(
    state: web::Data<AppState>,
    user: AuthUser,
    req: web::Json<SwipeRequest>,
) -> Result<HttpResponse, CoreError> {
    req.validate()
        .map_err(|e| CoreError::InvalidInput(e.to_string()))?;

    let outcome = state
        .swipes
        .swipe(&user.id, &req.target_user_id, req.action, state.clock.now())
        .await?;

    Ok(HttpResponse::Ok().json(SwipeResponse {
        status: outcome.status,
        matched: outcome.matched,
    }))
}
