use actix_web::{web, HttpResponse};
use uuid::Uuid;
use validator::Validate;

use crate::error::CoreError;
use crate::models::{
    AcceptResponse, CreateOfferRequestBody, PublishOfferRequest, QuotaResponse, RequestsResponse,
};
use crate::routes::{AppState, AuthUser};

/// Configure offer and request routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/offers", web::post().to(publish_offer))
        .route("/offers/{id}/cancel", web::post().to(cancel_offer))
        .route("/offers/{id}/requests", web::post().to(create_request))
        .route("/requests/incoming", web::get().to(incoming_requests))
        .route("/requests/outgoing", web::get().to(outgoing_requests))
        .route("/requests/{id}/accept", web::post().to(accept_request))
        .route("/requests/{id}/reject", web::post().to(reject_request))
        .route("/quota", web::get().to(quota));
}

/// Publish a new offer
///
/// POST /api/v1/offers
async fn publish_offer(
    state: web::Data<AppState>,
    user: AuthUser,
    req: web::Json<PublishOfferRequest>,
) -> Result<HttpResponse, CoreError> {
    req.validate()
        .map_err(|e| CoreError::InvalidInput(e.to_string()))?;

    let offer = state
        .publisher
        .publish(&user.id, req.into_inner().into_draft(), state.clock.now())
        .await?;

    Ok(HttpResponse::Created().json(offer))
}

/// POST /api/v1/offers/{id}/cancel
async fn cancel_offer(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, CoreError> {
    let offer = state.publisher.cancel(path.into_inner(), &user.id).await?;
    Ok(HttpResponse::Ok().json(offer))
}

/// Ask to join an offer
///
/// POST /api/v1/offers/{id}/requests
///
/// Request body:
/// ```json
/// {
///   "message": "string",
///   "suggestedAt": "2025-06-01T18:00:00Z",
///   "location": "string"
/// }
/// ```
async fn create_request(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<Uuid>,
    req: web::Json<CreateOfferRequestBody>,
) -> Result<HttpResponse, CoreError> {
    req.validate()
        .map_err(|e| CoreError::InvalidInput(e.to_string()))?;

    let request = state
        .lifecycle
        .create(
            path.into_inner(),
            &user.id,
            req.into_inner().into(),
            state.clock.now(),
        )
        .await?;

    Ok(HttpResponse::Created().json(request))
}

/// GET /api/v1/requests/incoming
async fn incoming_requests(
    state: web::Data<AppState>,
    user: AuthUser,
) -> Result<HttpResponse, CoreError> {
    let requests = state.lifecycle.incoming(&user.id).await?;
    Ok(HttpResponse::Ok().json(RequestsResponse {
        total: requests.len(),
        requests,
    }))
}

/// GET /api/v1/requests/outgoing
async fn outgoing_requests(
    state: web::Data<AppState>,
    user: AuthUser,
) -> Result<HttpResponse, CoreError> {
    let requests = state.lifecycle.outgoing(&user.id).await?;
    Ok(HttpResponse::Ok().json(RequestsResponse {
        total: requests.len(),
        requests,
    }))
}

/// POST /api/v1/requests/{id}/accept
async fn accept_request(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, CoreError> {
    let accepted = state
        .lifecycle
        .accept(path.into_inner(), &user.id, state.clock.now())
        .await?;

    Ok(HttpResponse::Ok().json(AcceptResponse {
        request: accepted.request,
        match_created: accepted.match_created,
    }))
}

/// POST /api/v1/requests/{id}/reject
async fn reject_request(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, CoreError> {
    let request = state
        .lifecycle
        .reject(path.into_inner(), &user.id, state.clock.now())
        .await?;
    Ok(HttpResponse::Ok().json(request))
}

/// Whether the caller may send another request, and how many are left
///
/// GET /api/v1/quota
async fn quota(state: web::Data<AppState>, user: AuthUser) -> Result<HttpResponse, CoreError> {
    let profile = state.stores.profiles.get_fresh(&user.id).await?;
    let decision = state
        .quota
        .check(&state.stores, &profile, state.clock.now())
        .await?;

    Ok(HttpResponse::Ok().json(QuotaResponse {
        allowed: decision.allowed(),
        tier: decision.tier().to_string(),
        remaining: decision.remaining(),
    }))
}
