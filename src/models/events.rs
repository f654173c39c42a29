use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::domain::{OfferStatus, RequestStatus};

/// Events handed to the notification delivery subsystem
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationEvent {
    RequestCreated {
        #[serde(rename = "requestId")]
        request_id: Uuid,
        #[serde(rename = "offerId")]
        offer_id: Uuid,
        #[serde(rename = "requesterId")]
        requester_id: String,
        #[serde(rename = "creatorId")]
        creator_id: String,
    },
    RequestAccepted {
        #[serde(rename = "requestId")]
        request_id: Uuid,
        #[serde(rename = "offerId")]
        offer_id: Uuid,
        #[serde(rename = "requesterId")]
        requester_id: String,
        #[serde(rename = "creatorId")]
        creator_id: String,
    },
    RequestRejected {
        #[serde(rename = "requestId")]
        request_id: Uuid,
        #[serde(rename = "offerId")]
        offer_id: Uuid,
        #[serde(rename = "requesterId")]
        requester_id: String,
    },
    MatchCreated {
        #[serde(rename = "userA")]
        user_a: String,
        #[serde(rename = "userB")]
        user_b: String,
    },
}

impl NotificationEvent {
    /// Users the event is addressed to
    pub fn recipients(&self) -> Vec<&str> {
        match self {
            NotificationEvent::RequestCreated { creator_id, .. } => vec![creator_id],
            NotificationEvent::RequestAccepted { requester_id, .. } => vec![requester_id],
            NotificationEvent::RequestRejected { requester_id, .. } => vec![requester_id],
            NotificationEvent::MatchCreated { user_a, user_b } => vec![user_a, user_b],
        }
    }
}

/// State changes published by stores so clients can react without polling
#[derive(Debug, Clone, PartialEq)]
pub enum StoreChange {
    RequestCreated { request_id: Uuid, offer_id: Uuid },
    RequestStatusChanged { request_id: Uuid, status: RequestStatus },
    OfferStatusChanged { offer_id: Uuid, status: OfferStatus },
    MatchPairCreated { user_a: String, user_b: String },
    MatchPairDeleted { user_a: String, user_b: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_serialization() {
        let event = NotificationEvent::MatchCreated {
            user_a: "a".to_string(),
            user_b: "b".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "match_created");
        assert_eq!(json["userA"], "a");
        assert_eq!(event.recipients(), vec!["a", "b"]);
    }
}
