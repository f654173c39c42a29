use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::core::quota::QuotaPolicy;
use crate::error::{CoreError, CoreResult};
use crate::models::{
    ActivityOffer, NotificationEvent, OfferRequest, OfferStatus, RequestDraft, RequestStatus,
};
use crate::services::store::{AcceptOutcome, Acceptance, RequestQuery, Stores};

/// Result of accepting a request
#[derive(Debug, Clone)]
pub struct Accepted {
    pub request: OfferRequest,
    /// False when the two users were already matched
    pub match_created: bool,
}

/// Create, accept and reject requests on offers.
///
/// Every compound effect is delegated to a single store call so a failure
/// leaves nothing half-written.
#[derive(Clone)]
pub struct RequestLifecycle {
    stores: Stores,
    quota: QuotaPolicy,
}

impl RequestLifecycle {
    pub fn new(stores: Stores, quota: QuotaPolicy) -> Self {
        Self { stores, quota }
    }

    /// Send a request on an offer, charging the requester's allowance.
    ///
    /// Two concurrent calls from a user with one free request left can both
    /// pass the quota check; the counter then ends one past the limit.
    pub async fn create(
        &self,
        offer_id: Uuid,
        requester_id: &str,
        draft: RequestDraft,
        now: DateTime<Utc>,
    ) -> CoreResult<OfferRequest> {
        let requester = self.stores.profiles.get_fresh(requester_id).await?;
        let offer = self.stores.offers.get(offer_id).await?;

        if offer.creator_id == requester_id {
            return Err(CoreError::InvalidTransition(
                "cannot request your own offer".to_string(),
            ));
        }
        if offer.status != OfferStatus::Active {
            return Err(CoreError::InvalidTransition(format!(
                "offer {} is {:?}",
                offer_id, offer.status
            )));
        }
        if offer.event_at < now {
            return Err(CoreError::InvalidTransition(format!(
                "offer {} has already started",
                offer_id
            )));
        }

        let existing = self
            .stores
            .requests
            .query(&RequestQuery {
                requester_id: Some(requester_id.to_string()),
                offer_ids: Some(vec![offer_id]),
                ..Default::default()
            })
            .await?;
        if existing.iter().any(|r| r.status.is_active()) {
            return Err(CoreError::InvalidTransition(format!(
                "{} already has a request on offer {}",
                requester_id, offer_id
            )));
        }

        let decision = self.quota.check(&self.stores, &requester, now).await?;
        if !decision.allowed() {
            let (used, limit) = decision.usage().unwrap_or((0, 0));
            warn!(
                "Quota exceeded for {} on {} tier ({}/{})",
                requester_id,
                decision.tier(),
                used,
                limit
            );
            return Err(CoreError::QuotaExceeded { used, limit });
        }

        let request = OfferRequest {
            id: Uuid::new_v4(),
            offer_id,
            requester_id: requester_id.to_string(),
            message: draft.message,
            suggested_at: draft.suggested_at,
            location: draft.location,
            status: RequestStatus::Pending,
            created_at: now,
            updated_at: now,
        };

        self.stores
            .requests
            .create_request(&request, decision.charges_free_tier())
            .await?;
        self.stores.profiles.invalidate(requester_id).await;

        info!(
            "Request {} created by {} on offer {} ({} tier)",
            request.id,
            requester_id,
            offer_id,
            decision.tier()
        );
        self.stores.notifications.emit(NotificationEvent::RequestCreated {
            request_id: request.id,
            offer_id,
            requester_id: requester_id.to_string(),
            creator_id: offer.creator_id,
        });

        Ok(request)
    }

    /// Accept a pending request; only the offer's creator may do this
    pub async fn accept(
        &self,
        request_id: Uuid,
        caller_id: &str,
        now: DateTime<Utc>,
    ) -> CoreResult<Accepted> {
        let (mut request, offer) = self.load_for_creator(request_id, caller_id).await?;

        let outcome = self
            .stores
            .requests
            .accept_request(&Acceptance {
                request_id,
                offer_id: offer.id,
                creator_id: offer.creator_id.clone(),
                requester_id: request.requester_id.clone(),
                accepted_at: now,
            })
            .await?;

        let match_created = match outcome {
            AcceptOutcome::Accepted { match_created } => match_created,
            AcceptOutcome::NotPending => {
                return Err(CoreError::InvalidTransition(format!(
                    "request {} was already answered",
                    request_id
                )));
            }
        };

        request.status = RequestStatus::Accepted;
        request.updated_at = now;
        info!(
            "Request {} accepted by {} (new match: {})",
            request_id, caller_id, match_created
        );

        self.stores.notifications.emit(NotificationEvent::RequestAccepted {
            request_id,
            offer_id: offer.id,
            requester_id: request.requester_id.clone(),
            creator_id: offer.creator_id.clone(),
        });
        if match_created {
            self.stores.notifications.emit(NotificationEvent::MatchCreated {
                user_a: offer.creator_id,
                user_b: request.requester_id.clone(),
            });
        }

        Ok(Accepted {
            request,
            match_created,
        })
    }

    /// Reject a pending request; only the offer's creator may do this
    pub async fn reject(
        &self,
        request_id: Uuid,
        caller_id: &str,
        now: DateTime<Utc>,
    ) -> CoreResult<OfferRequest> {
        let (mut request, offer) = self.load_for_creator(request_id, caller_id).await?;

        if !self.stores.requests.reject_request(request_id, now).await? {
            return Err(CoreError::InvalidTransition(format!(
                "request {} was already answered",
                request_id
            )));
        }

        request.status = RequestStatus::Rejected;
        request.updated_at = now;
        info!("Request {} rejected by {}", request_id, caller_id);

        self.stores.notifications.emit(NotificationEvent::RequestRejected {
            request_id,
            offer_id: offer.id,
            requester_id: request.requester_id.clone(),
        });

        Ok(request)
    }

    /// Pending requests on offers owned by `creator_id`, oldest first
    pub async fn incoming(&self, creator_id: &str) -> CoreResult<Vec<OfferRequest>> {
        let mut requests = self
            .stores
            .requests
            .query(&RequestQuery {
                creator_id: Some(creator_id.to_string()),
                status: Some(RequestStatus::Pending),
                ..Default::default()
            })
            .await?;
        requests.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(requests)
    }

    /// Every request sent by `requester_id`, newest first
    pub async fn outgoing(&self, requester_id: &str) -> CoreResult<Vec<OfferRequest>> {
        let mut requests = self
            .stores
            .requests
            .query(&RequestQuery {
                requester_id: Some(requester_id.to_string()),
                ..Default::default()
            })
            .await?;
        requests.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(requests)
    }

    async fn load_for_creator(
        &self,
        request_id: Uuid,
        caller_id: &str,
    ) -> CoreResult<(OfferRequest, ActivityOffer)> {
        let request = self.stores.requests.get(request_id).await?;
        let offer = self.stores.offers.get(request.offer_id).await?;

        if offer.creator_id != caller_id {
            return Err(CoreError::InvalidTransition(format!(
                "only the creator of offer {} can answer its requests",
                offer.id
            )));
        }
        if request.status != RequestStatus::Pending {
            return Err(CoreError::InvalidTransition(format!(
                "request {} is {:?}",
                request_id, request.status
            )));
        }
        Ok((request, offer))
    }
}
