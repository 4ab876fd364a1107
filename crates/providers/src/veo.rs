//! Adapter for operation-based video generation (Veo).
//!
//! The handle is a long-running operation name. The status route reports
//! `done` plus either an `error` or the `videoUri` of the finished clip;
//! the download route copies that clip into durable storage.

use async_trait::async_trait;
use genjobs_core::provider::{clamp_progress, PollPolicy, Provider, StatusResult};
use serde::Deserialize;

use crate::adapter::ProviderAdapter;
use crate::backend::BackendClient;
use crate::error::ProviderError;

/// Status route on the dashboard backend.
pub const STATUS_PATH: &str = "/api/video/veo/status";
/// Download route on the dashboard backend.
pub const DOWNLOAD_PATH: &str = "/api/video/veo/download";

/// Body of the Veo status route.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VeoStatusResponse {
    #[serde(default)]
    pub done: bool,
    pub progress: Option<f64>,
    pub error: Option<VeoOperationError>,
    pub video_uri: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VeoOperationError {
    pub code: Option<i64>,
    pub message: Option<String>,
}

/// Map a Veo status body onto the shared [`StatusResult`].
pub fn interpret_status(response: VeoStatusResponse) -> Result<StatusResult, ProviderError> {
    if !response.done {
        return Ok(StatusResult::Pending {
            progress: response.progress.map(clamp_progress),
        });
    }

    if let Some(error) = response.error {
        let reason = match (error.message, error.code) {
            (Some(message), _) if !message.trim().is_empty() => message,
            (_, Some(code)) => format!("Video generation failed (code {code})"),
            _ => "Video generation failed".to_string(),
        };
        return Ok(StatusResult::Failed { reason });
    }

    match response.video_uri {
        Some(uri) if !uri.trim().is_empty() => Ok(StatusResult::Succeeded { artifact_ref: uri }),
        _ => Err(ProviderError::MalformedResponse(
            "operation done without error or videoUri".to_string(),
        )),
    }
}

pub struct VeoAdapter {
    backend: BackendClient,
    policy: PollPolicy,
}

impl VeoAdapter {
    pub fn new(backend: BackendClient) -> Self {
        Self {
            backend,
            policy: Provider::Veo.default_poll_policy(),
        }
    }

    pub fn with_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }
}

#[async_trait]
impl ProviderAdapter for VeoAdapter {
    fn provider(&self) -> Provider {
        Provider::Veo
    }

    fn poll_policy(&self) -> PollPolicy {
        self.policy
    }

    async fn check_status(&self, handle: &str) -> Result<StatusResult, ProviderError> {
        let body = serde_json::json!({ "operationName": handle });
        let response: VeoStatusResponse = self.backend.post_json(STATUS_PATH, &body).await?;
        interpret_status(response)
    }

    async fn finalize(&self, artifact_ref: &str) -> Result<String, ProviderError> {
        tracing::debug!(video_uri = %artifact_ref, "Downloading Veo video");
        let body = serde_json::json!({ "videoUri": artifact_ref });
        self.backend.finalize(DOWNLOAD_PATH, &body).await
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn parse(json: &str) -> Result<StatusResult, ProviderError> {
        interpret_status(serde_json::from_str(json).unwrap())
    }

    #[test]
    fn not_done_is_pending() {
        assert_eq!(
            parse(r#"{"done":false,"progress":42.6}"#).unwrap(),
            StatusResult::Pending { progress: Some(43) }
        );
    }

    #[test]
    fn missing_done_is_pending_without_progress() {
        assert_eq!(
            parse(r#"{}"#).unwrap(),
            StatusResult::Pending { progress: None }
        );
    }

    #[test]
    fn done_with_video_uri_succeeds() {
        assert_eq!(
            parse(r#"{"done":true,"videoUri":"gs://bucket/out.mp4"}"#).unwrap(),
            StatusResult::Succeeded {
                artifact_ref: "gs://bucket/out.mp4".into()
            }
        );
    }

    #[test]
    fn done_with_error_fails_with_message() {
        assert_eq!(
            parse(r#"{"done":true,"error":{"code":3,"message":"prompt blocked"}}"#).unwrap(),
            StatusResult::Failed {
                reason: "prompt blocked".into()
            }
        );
    }

    #[test]
    fn done_with_error_code_only() {
        assert_matches!(
            parse(r#"{"done":true,"error":{"code":13}}"#).unwrap(),
            StatusResult::Failed { reason } if reason.contains("code 13")
        );
    }

    #[test]
    fn done_without_result_is_malformed() {
        assert_matches!(
            parse(r#"{"done":true}"#),
            Err(ProviderError::MalformedResponse(_))
        );
    }

    #[test]
    fn adapter_uses_default_policy() {
        let backend = BackendClient::with_client(reqwest::Client::new(), "http://localhost:3000");
        let adapter = VeoAdapter::new(backend);
        assert_eq!(adapter.provider(), Provider::Veo);
        assert_eq!(adapter.poll_policy().max_polls, 48);
    }
}
