//! Execution delegated to a remote release agent over HTTP
//!
//! Every executor call becomes a JSON `POST {endpoint}/v1/<operation>`.
//! The agent answers 2xx on success, 504 when a wait timed out, and any
//! other status with an `{"error": "..."}` body. A `delete` carrying
//! `timeoutSeconds` returns only once the resources are gone.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::ClusterExecutor;
use crate::error::{ReleaseError, Result};

/// Slack on top of the operation timeout before the HTTP call is abandoned
const REQUEST_GRACE: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ManifestRequest<'a> {
    namespace: &'a str,
    manifest: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    timeout_seconds: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdateRequest<'a> {
    namespace: &'a str,
    current: &'a str,
    target: &'a str,
    recreate: bool,
    timeout_seconds: u64,
}

#[derive(Debug, Deserialize)]
struct AgentError {
    error: String,
}

pub struct RemoteExecutor {
    client: reqwest::Client,
    endpoint: String,
}

impl RemoteExecutor {
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn call<B: Serialize + Sync>(
        &self,
        operation: &str,
        body: &B,
        timeout: Option<Duration>,
    ) -> Result<()> {
        let url = format!("{}/v1/{}", self.endpoint, operation);
        let mut request = self.client.post(&url).json(body);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout + REQUEST_GRACE);
        }

        debug!(url = %url, "calling release agent");
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        if status == StatusCode::GATEWAY_TIMEOUT {
            return Err(ReleaseError::Timeout(timeout.unwrap_or_default()));
        }

        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<AgentError>(&text)
            .map(|e| e.error)
            .unwrap_or(text);
        Err(ReleaseError::Cluster(format!(
            "agent {} failed ({}): {}",
            operation, status, message
        )))
    }
}

#[async_trait]
impl ClusterExecutor for RemoteExecutor {
    async fn validate(&self, namespace: &str, manifest: &str) -> Result<()> {
        let body = ManifestRequest {
            namespace,
            manifest,
            timeout_seconds: None,
        };
        self.call("validate", &body, None).await
    }

    async fn create(&self, namespace: &str, manifest: &str, timeout: Duration) -> Result<()> {
        let body = ManifestRequest {
            namespace,
            manifest,
            timeout_seconds: Some(timeout.as_secs()),
        };
        self.call("create", &body, Some(timeout)).await
    }

    async fn update(
        &self,
        namespace: &str,
        current: &str,
        target: &str,
        recreate: bool,
        timeout: Duration,
    ) -> Result<()> {
        let body = UpdateRequest {
            namespace,
            current,
            target,
            recreate,
            timeout_seconds: timeout.as_secs(),
        };
        self.call("update", &body, Some(timeout)).await
    }

    async fn delete(&self, namespace: &str, manifest: &str) -> Result<()> {
        let body = ManifestRequest {
            namespace,
            manifest,
            timeout_seconds: None,
        };
        self.call("delete", &body, None).await
    }

    async fn delete_and_wait(&self, namespace: &str, manifest: &str, timeout: Duration) -> Result<()> {
        let body = ManifestRequest {
            namespace,
            manifest,
            timeout_seconds: Some(timeout.as_secs()),
        };
        self.call("delete", &body, Some(timeout)).await
    }

    async fn watch_until_ready(&self, namespace: &str, manifest: &str, timeout: Duration) -> Result<()> {
        let body = ManifestRequest {
            namespace,
            manifest,
            timeout_seconds: Some(timeout.as_secs()),
        };
        self.call("watch", &body, Some(timeout)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TIMEOUT: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn test_create_posts_manifest() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/create"))
            .and(body_json(serde_json::json!({
                "namespace": "prod",
                "manifest": "kind: ConfigMap",
                "timeoutSeconds": 60
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let executor = RemoteExecutor::new(format!("{}/", server.uri())).unwrap();
        executor.create("prod", "kind: ConfigMap", TIMEOUT).await.unwrap();
    }

    #[tokio::test]
    async fn test_update_sends_both_manifests() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/update"))
            .and(body_json(serde_json::json!({
                "namespace": "prod",
                "current": "a",
                "target": "b",
                "recreate": true,
                "timeoutSeconds": 60
            })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let executor = RemoteExecutor::new(server.uri()).unwrap();
        executor.update("prod", "a", "b", true, TIMEOUT).await.unwrap();
    }

    #[tokio::test]
    async fn test_validation_rejected_by_agent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/validate"))
            .and(body_json(serde_json::json!({
                "namespace": "prod",
                "manifest": "kind: Widget"
            })))
            .respond_with(
                ResponseTemplate::new(422)
                    .set_body_json(serde_json::json!({"error": "unknown kind Widget"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let executor = RemoteExecutor::new(server.uri()).unwrap();
        let err = executor.validate("prod", "kind: Widget").await.unwrap_err();
        assert!(matches!(err, ReleaseError::Cluster(ref m) if m.contains("unknown kind Widget")));
    }

    #[tokio::test]
    async fn test_delete_and_wait_sends_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/delete"))
            .and(body_json(serde_json::json!({
                "namespace": "prod",
                "manifest": "kind: Job",
                "timeoutSeconds": 60
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let executor = RemoteExecutor::new(server.uri()).unwrap();
        executor.delete_and_wait("prod", "kind: Job", TIMEOUT).await.unwrap();
    }

    #[tokio::test]
    async fn test_agent_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/delete"))
            .respond_with(
                ResponseTemplate::new(500)
                    .set_body_json(serde_json::json!({"error": "forbidden by policy"})),
            )
            .mount(&server)
            .await;

        let executor = RemoteExecutor::new(server.uri()).unwrap();
        let err = executor.delete("prod", "kind: Secret").await.unwrap_err();
        assert!(matches!(err, ReleaseError::Cluster(ref m) if m.contains("forbidden by policy")));
    }

    #[tokio::test]
    async fn test_gateway_timeout_maps_to_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/watch"))
            .respond_with(ResponseTemplate::new(504))
            .mount(&server)
            .await;

        let executor = RemoteExecutor::new(server.uri()).unwrap();
        let err = executor
            .watch_until_ready("prod", "kind: Job", TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(err, ReleaseError::Timeout(t) if t == TIMEOUT));
    }
}
