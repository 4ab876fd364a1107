//! HTTP plumbing shared by the provider adapters.
//!
//! The dashboard backend exposes one status route and one download route
//! per provider. [`BackendClient`] wraps a pooled [`reqwest::Client`] and
//! turns non-2xx responses into [`ProviderError::Api`].

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

/// Default timeout for a single status request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default timeout for a finalize request. Downloads can take minutes.
pub const DEFAULT_FINALIZE_TIMEOUT: Duration = Duration::from_secs(300);

/// HTTP client for the backend routes that front the generation providers.
#[derive(Debug, Clone)]
pub struct BackendClient {
    client: reqwest::Client,
    base_url: String,
    finalize_timeout: Duration,
}

impl BackendClient {
    /// Create a client for `base_url` (e.g. `https://dashboard.example.com`).
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder().timeout(request_timeout).build()?;
        Ok(Self::with_client(client, base_url))
    }

    /// Reuse an existing [`reqwest::Client`] (shares its connection pool).
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client,
            base_url,
            finalize_timeout: DEFAULT_FINALIZE_TIMEOUT,
        }
    }

    pub fn with_finalize_timeout(mut self, timeout: Duration) -> Self {
        self.finalize_timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// `POST` a JSON body and decode the JSON response.
    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, ProviderError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.client.post(self.url(path)).json(body).send().await?;
        Self::parse_response(response).await
    }

    /// `POST` to a download route and return the durable artifact URL.
    ///
    /// Uses the longer finalize timeout.
    pub async fn finalize<B>(&self, path: &str, body: &B) -> Result<String, ProviderError>
    where
        B: Serialize + ?Sized,
    {
        let response = self
            .client
            .post(self.url(path))
            .timeout(self.finalize_timeout)
            .json(body)
            .send()
            .await?;
        let payload: FinalizeResponse = Self::parse_response(response).await?;
        payload.into_url()
    }

    // ---- private helpers ----

    /// Return the response unchanged on success, or an
    /// [`ProviderError::Api`] with the status and body text.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ProviderError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn parse_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ProviderError> {
        let response = Self::ensure_success(response).await?;
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| ProviderError::MalformedResponse(e.to_string()))
    }
}

/// Body returned by every download route.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FinalizeResponse {
    pub url: Option<String>,
    pub error: Option<String>,
}

impl FinalizeResponse {
    /// An `error` wins over a `url`; neither is malformed.
    pub fn into_url(self) -> Result<String, ProviderError> {
        match (self.url, self.error) {
            (_, Some(error)) => Err(ProviderError::Rejected(error)),
            (Some(url), None) if !url.trim().is_empty() => Ok(url),
            _ => Err(ProviderError::MalformedResponse(
                "download response carried neither url nor error".to_string(),
            )),
        }
    }
}
