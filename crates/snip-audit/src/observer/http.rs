use crate::error::AuditError;
use crate::event::AuditEvent;
use crate::observer::Observer;
use async_trait::async_trait;
use std::time::Duration;

/// Request timeout used by [`HttpObserver::new`].
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(5);

/// POSTs each event as JSON to a remote collector.
///
/// Any response status of 400 or above counts as a failed delivery.
#[derive(Debug, Clone)]
pub struct HttpObserver {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpObserver {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, AuditError> {
        Self::with_timeout(endpoint, DEFAULT_HTTP_TIMEOUT)
    }

    pub fn with_timeout(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, AuditError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            endpoint: endpoint.into(),
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Observer for HttpObserver {
    fn name(&self) -> &str {
        "http"
    }

    async fn notify(&self, event: &AuditEvent) -> Result<(), AuditError> {
        let response = self.client.post(&self.endpoint).json(event).send().await?;

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            return Err(AuditError::Rejected(status.as_u16()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::AuditAction;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn event() -> AuditEvent {
        AuditEvent {
            ts: 1_700_000_000,
            action: AuditAction::Follow,
            user_id: Some("u1".to_string()),
            url: "https://example.com".to_string(),
        }
    }

    #[tokio::test]
    async fn posts_event_as_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/audit"))
            .and(body_json(serde_json::json!({
                "ts": 1_700_000_000,
                "action": "follow",
                "user_id": "u1",
                "url": "https://example.com"
            })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let observer = HttpObserver::new(format!("{}/audit", server.uri())).unwrap();
        observer.notify(&event()).await.unwrap();
    }

    #[tokio::test]
    async fn error_status_is_a_failed_delivery() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let observer = HttpObserver::new(server.uri()).unwrap();
        let err = observer.notify(&event()).await.unwrap_err();
        assert!(matches!(err, AuditError::Rejected(503)));
    }

    #[tokio::test]
    async fn slow_collector_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let observer =
            HttpObserver::with_timeout(server.uri(), Duration::from_millis(100)).unwrap();
        let err = observer.notify(&event()).await.unwrap_err();
        assert!(matches!(err, AuditError::Http(e) if e.is_timeout()));
    }
}
