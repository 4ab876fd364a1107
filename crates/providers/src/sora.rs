//! Adapter for job-based video generation (Sora).
//!
//! The handle is the provider's video id. The status route reports a
//! lifecycle string; once `completed`, the same id is handed to the
//! download route.

use async_trait::async_trait;
use genjobs_core::provider::{clamp_progress, PollPolicy, Provider, StatusResult};
use serde::Deserialize;

use crate::adapter::ProviderAdapter;
use crate::backend::BackendClient;
use crate::error::ProviderError;

/// Status route on the dashboard backend.
pub const STATUS_PATH: &str = "/api/video/sora/status";
/// Download route on the dashboard backend.
pub const DOWNLOAD_PATH: &str = "/api/video/sora/download";

/// Body of the Sora status route.
#[derive(Debug, Clone, Deserialize)]
pub struct SoraStatusResponse {
    /// Echo of the video id, when the backend includes it.
    pub id: Option<String>,
    pub status: String,
    pub progress: Option<f64>,
    pub error: Option<SoraError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SoraError {
    pub code: Option<String>,
    pub message: Option<String>,
}

/// Map a Sora status body onto the shared [`StatusResult`].
///
/// `handle` becomes the artifact reference on success.
pub fn interpret_status(handle: &str, response: SoraStatusResponse) -> Result<StatusResult, ProviderError> {
    match response.status.as_str() {
        "queued" | "in_progress" => Ok(StatusResult::Pending {
            progress: response.progress.map(clamp_progress),
        }),
        "completed" => Ok(StatusResult::Succeeded {
            artifact_ref: response.id.unwrap_or_else(|| handle.to_string()),
        }),
        "failed" => {
            let reason = response
                .error
                .and_then(|e| e.message.or(e.code))
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| "Generation failed".to_string());
            Ok(StatusResult::Failed { reason })
        }
        other => Err(ProviderError::MalformedResponse(format!(
            "unknown Sora status '{other}'"
        ))),
    }
}

pub struct SoraAdapter {
    backend: BackendClient,
    policy: PollPolicy,
}

impl SoraAdapter {
    pub fn new(backend: BackendClient) -> Self {
        Self {
            backend,
            policy: Provider::Sora.default_poll_policy(),
        }
    }

    pub fn with_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }
}

#[async_trait]
impl ProviderAdapter for SoraAdapter {
    fn provider(&self) -> Provider {
        Provider::Sora
    }

    fn poll_policy(&self) -> PollPolicy {
        self.policy
    }

    async fn check_status(&self, handle: &str) -> Result<StatusResult, ProviderError> {
        let body = serde_json::json!({ "videoId": handle });
        let response: SoraStatusResponse = self.backend.post_json(STATUS_PATH, &body).await?;
        interpret_status(handle, response)
    }

    async fn finalize(&self, artifact_ref: &str) -> Result<String, ProviderError> {
        tracing::debug!(video_id = %artifact_ref, "Downloading Sora video");
        let body = serde_json::json!({ "videoId": artifact_ref });
        self.backend.finalize(DOWNLOAD_PATH, &body).await
    }
}
