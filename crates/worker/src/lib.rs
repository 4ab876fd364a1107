//! Wiring for the `genjobs-worker` binary.
//!
//! Kept in a library so command-line parsing and adapter construction can
//! be unit-tested without starting a runtime.

use std::str::FromStr;
use std::sync::Arc;

use genjobs_core::job::JobMetadata;
use genjobs_core::provider::Provider;
use genjobs_orchestrator::{GenJobsConfig, JobEvent};
use genjobs_providers::backend::BackendClient;
use genjobs_providers::sora::SoraAdapter;
use genjobs_providers::veo::VeoAdapter;
use genjobs_providers::{AdapterSet, ProviderError};

/// A job named on the command line as `provider:handle`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobArg {
    pub provider: Provider,
    pub handle: String,
}

impl JobArg {
    /// Metadata recorded for jobs started from the command line.
    pub fn metadata(&self) -> JobMetadata {
        JobMetadata::new("", default_model(self.provider))
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ArgError {
    #[error("Expected 'provider:handle', got '{0}'")]
    MissingSeparator(String),

    #[error("Unknown provider '{provider}' in '{arg}'")]
    UnknownProvider { provider: String, arg: String },

    #[error("Empty handle in '{0}'")]
    EmptyHandle(String),
}

impl FromStr for JobArg {
    type Err = ArgError;

    fn from_str(arg: &str) -> Result<Self, Self::Err> {
        let (provider, handle) = arg
            .split_once(':')
            .ok_or_else(|| ArgError::MissingSeparator(arg.to_string()))?;
        let provider = provider
            .parse::<Provider>()
            .map_err(|_| ArgError::UnknownProvider {
                provider: provider.to_string(),
                arg: arg.to_string(),
            })?;
        // Only the first ':' separates; the handle may contain more.
        let handle = handle.trim();
        if handle.is_empty() {
            return Err(ArgError::EmptyHandle(arg.to_string()));
        }
        Ok(Self {
            provider,
            handle: handle.to_string(),
        })
    }
}

/// Parse every command-line argument, failing on the first bad one.
pub fn parse_args<I, S>(args: I) -> Result<Vec<JobArg>, ArgError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    args.into_iter().map(|a| a.as_ref().parse()).collect()
}

/// Model id recorded for jobs whose caller did not supply one.
pub fn default_model(provider: Provider) -> &'static str {
    match provider {
        Provider::Veo => "veo-3.0-generate",
        Provider::Sora => "sora-2",
    }
}

/// Build one HTTP adapter per provider, sharing a backend client.
pub fn build_adapters(config: &GenJobsConfig) -> Result<AdapterSet, ProviderError> {
    let backend = BackendClient::new(&config.backend_url, config.request_timeout)?
        .with_finalize_timeout(config.finalize_timeout);
    tracing::debug!(base_url = backend.base_url(), "Backend client ready");

    let veo = VeoAdapter::new(backend.clone()).with_policy(config.policy_for(Provider::Veo));
    let sora = SoraAdapter::new(backend).with_policy(config.policy_for(Provider::Sora));

    Ok(AdapterSet::new().with(Arc::new(veo)).with(Arc::new(sora)))
}

/// Log one lifecycle event.
pub fn log_event(event: &JobEvent) {
    match event {
        JobEvent::Started { job_id, provider } => {
            tracing::info!(%job_id, %provider, "Job started");
        }
        JobEvent::Progress { job_id, progress } => {
            tracing::info!(%job_id, progress, "Job progress");
        }
        JobEvent::Completed {
            job_id,
            artifact_url,
        } => {
            tracing::info!(%job_id, %artifact_url, "Job completed");
        }
        JobEvent::Failed { job_id, error } => {
            tracing::warn!(%job_id, %error, "Job failed");
        }
        JobEvent::Cleared { job_id } => {
            tracing::info!(%job_id, "Job cleared");
        }
    }
}
