//! Configuration loaded from environment variables.

use std::time::Duration;

use genjobs_core::provider::{PollPolicy, Provider, MAX_POLL_INTERVAL};

use crate::events::DEFAULT_EVENT_CAPACITY;

/// Default time `shutdown` waits for spawned tasks to exit.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 5;
/// Default per-request timeout for status checks.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
/// Default per-request timeout for finalize downloads.
pub const DEFAULT_FINALIZE_TIMEOUT_SECS: u64 = 300;

/// Errors raised while reading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{key} is invalid: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Settings for the orchestrator itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Capacity of the job event broadcast channel.
    pub event_capacity: usize,
    /// How long `shutdown` waits for timer and tick tasks to exit.
    pub shutdown_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            event_capacity: DEFAULT_EVENT_CAPACITY,
            shutdown_timeout: Duration::from_secs(DEFAULT_SHUTDOWN_TIMEOUT_SECS),
        }
    }
}

/// Full configuration: backend location, HTTP timeouts, per-provider
/// poll policies, and orchestrator settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenJobsConfig {
    /// Base URL of the backend exposing the status and download routes.
    pub backend_url: String,
    pub request_timeout: Duration,
    pub finalize_timeout: Duration,
    pub veo_policy: PollPolicy,
    pub sora_policy: PollPolicy,
    pub orchestrator: OrchestratorConfig,
}

impl GenJobsConfig {
    /// Defaults for everything except the backend URL.
    pub fn new(backend_url: impl Into<String>) -> Self {
        Self {
            backend_url: backend_url.into(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            finalize_timeout: Duration::from_secs(DEFAULT_FINALIZE_TIMEOUT_SECS),
            veo_policy: Provider::Veo.default_poll_policy(),
            sora_policy: Provider::Sora.default_poll_policy(),
            orchestrator: OrchestratorConfig::default(),
        }
    }

    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                         | Default |
    /// |---------------------------------|---------|
    /// | `GENJOBS_BACKEND_URL`           | required |
    /// | `GENJOBS_REQUEST_TIMEOUT_SECS`  | `30`    |
    /// | `GENJOBS_FINALIZE_TIMEOUT_SECS` | `300`   |
    /// | `VEO_POLL_INTERVAL_SECS`        | `10`    |
    /// | `VEO_MAX_POLLS`                 | `48`    |
    /// | `SORA_POLL_INTERVAL_SECS`       | `5`     |
    /// | `SORA_MAX_POLLS`                | `96`    |
    /// | `GENJOBS_EVENT_CAPACITY`        | `256`   |
    /// | `GENJOBS_SHUTDOWN_TIMEOUT_SECS` | `5`     |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let backend_url = lookup("GENJOBS_BACKEND_URL")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or(ConfigError::Missing("GENJOBS_BACKEND_URL"))?;
        if !backend_url.starts_with("http://") && !backend_url.starts_with("https://") {
            return Err(ConfigError::Invalid {
                key: "GENJOBS_BACKEND_URL",
                reason: format!("must start with http:// or https://, got '{backend_url}'"),
            });
        }

        let mut config = Self::new(backend_url);
        let secs = |key: &'static str, default: u64| positive(&lookup, key, default);

        config.request_timeout =
            Duration::from_secs(secs("GENJOBS_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS)?);
        config.finalize_timeout =
            Duration::from_secs(secs("GENJOBS_FINALIZE_TIMEOUT_SECS", DEFAULT_FINALIZE_TIMEOUT_SECS)?);

        let veo = config.veo_policy;
        config.veo_policy = PollPolicy::new(
            interval(&lookup, "VEO_POLL_INTERVAL_SECS", veo.interval)?,
            to_u32("VEO_MAX_POLLS", secs("VEO_MAX_POLLS", u64::from(veo.max_polls))?)?,
        );
        let sora = config.sora_policy;
        config.sora_policy = PollPolicy::new(
            interval(&lookup, "SORA_POLL_INTERVAL_SECS", sora.interval)?,
            to_u32("SORA_MAX_POLLS", secs("SORA_MAX_POLLS", u64::from(sora.max_polls))?)?,
        );

        config.orchestrator.event_capacity =
            usize::try_from(secs("GENJOBS_EVENT_CAPACITY", DEFAULT_EVENT_CAPACITY as u64)?).map_err(
                |e| ConfigError::Invalid {
                    key: "GENJOBS_EVENT_CAPACITY",
                    reason: e.to_string(),
                },
            )?;
        config.orchestrator.shutdown_timeout = Duration::from_secs(secs(
            "GENJOBS_SHUTDOWN_TIMEOUT_SECS",
            DEFAULT_SHUTDOWN_TIMEOUT_SECS,
        )?);

        Ok(config)
    }

    /// Poll policy configured for `provider`.
    pub fn policy_for(&self, provider: Provider) -> PollPolicy {
        match provider {
            Provider::Veo => self.veo_policy,
            Provider::Sora => self.sora_policy,
        }
    }
}

/// Parse a strictly positive integer, falling back to `default` when unset.
fn positive<F>(lookup: &F, key: &'static str, default: u64) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(default);
    };
    let value: u64 = raw.trim().parse().map_err(|_| ConfigError::Invalid {
        key,
        reason: format!("expected a positive integer, got '{raw}'"),
    })?;
    if value == 0 {
        return Err(ConfigError::Invalid {
            key,
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(value)
}

/// Parse a poll interval in seconds, bounded by [`MAX_POLL_INTERVAL`].
fn interval<F>(lookup: &F, key: &'static str, default: Duration) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let secs = positive(lookup, key, default.as_secs())?;
    if secs > MAX_POLL_INTERVAL.as_secs() {
        return Err(ConfigError::Invalid {
            key,
            reason: format!("must be at most {} seconds", MAX_POLL_INTERVAL.as_secs()),
        });
    }
    Ok(Duration::from_secs(secs))
}

fn to_u32(key: &'static str, value: u64) -> Result<u32, ConfigError> {
    u32::try_from(value).map_err(|e| ConfigError::Invalid {
        key,
        reason: e.to_string(),
    })
}
