use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;

use crate::models::NotificationEvent;
use crate::services::store::NotificationSink;

/// Errors that can occur when delivering a notification
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("Failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Webhook rejected event with status {0}")]
    Rejected(u16),
}

/// Logs every event; the default when no webhook is configured
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn emit(&self, event: NotificationEvent) {
        tracing::info!("Notification for {:?}: {:?}", event.recipients(), event);
    }
}

/// Posts events as JSON to an external push/notification service
#[derive(Clone)]
pub struct WebhookSink {
    url: String,
    client: Client,
}

impl WebhookSink {
    pub fn new(url: String, timeout_secs: u64) -> Result<Self, NotifyError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;

        Ok(Self { url, client })
    }

    /// Deliver one event and wait for the response
    pub async fn deliver(&self, event: &NotificationEvent) -> Result<(), NotifyError> {
        tracing::debug!("Posting notification to: {}", self.url);

        let body = serde_json::to_vec(event)?;
        let response = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(NotifyError::Rejected(response.status().as_u16()));
        }
        Ok(())
    }
}

impl NotificationSink for WebhookSink {
    fn emit(&self, event: NotificationEvent) {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                tracing::warn!("No runtime to deliver notification, dropping {:?}", event);
                return;
            }
        };

        let sink = self.clone();
        handle.spawn(async move {
            if let Err(e) = sink.deliver(&event).await {
                tracing::warn!("Failed to deliver notification {:?}: {}", event, e);
            }
        });
    }
}

/// Keeps emitted events in memory so they can be inspected
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<NotificationEvent>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<NotificationEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl NotificationSink for RecordingSink {
    fn emit(&self, event: NotificationEvent) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn sample_event() -> NotificationEvent {
        NotificationEvent::RequestRejected {
            request_id: Uuid::new_v4(),
            offer_id: Uuid::new_v4(),
            requester_id: "guest".to_string(),
        }
    }

    #[tokio::test]
    async fn test_webhook_posts_event_json() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/notify")
            .match_header("content-type", "application/json")
            .match_body(mockito::Matcher::PartialJsonString(
                r#"{"type":"request_rejected","requesterId":"guest"}"#.to_string(),
            ))
            .with_status(202)
            .create_async()
            .await;

        let sink = WebhookSink::new(format!("{}/notify", server.url()), 5).unwrap();
        sink.deliver(&sample_event()).await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_webhook_error_status() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/notify")
            .with_status(500)
            .create_async()
            .await;

        let sink = WebhookSink::new(format!("{}/notify", server.url()), 5).unwrap();
        let result = sink.deliver(&sample_event()).await;
        assert!(matches!(result, Err(NotifyError::Rejected(500))));
    }

    #[test]
    fn test_recording_sink_keeps_order() {
        let sink = RecordingSink::new();
        sink.emit(sample_event());
        sink.emit(NotificationEvent::MatchCreated {
            user_a: "a".to_string(),
            user_b: "b".to_string(),
        });

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[1], NotificationEvent::MatchCreated { .. }));
    }

    #[test]
    fn test_webhook_emit_outside_runtime_is_dropped() {
        let sink = WebhookSink::new("http://127.0.0.1:9/notify".to_string(), 1).unwrap();
        sink.emit(sample_event());
    }
}
