//! Provider identifiers, polling policies, and the normalised status
//! payload returned by every provider adapter.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

/// External generation service that owns a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Operation-based video generation (long-running operation names).
    Veo,
    /// Job-based video generation (video ids).
    Sora,
}

impl Provider {
    /// All known providers.
    pub const ALL: [Provider; 2] = [Provider::Veo, Provider::Sora];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Veo => "veo",
            Self::Sora => "sora",
        }
    }

    /// Recommended polling cadence for this provider.
    ///
    /// Both policies bound the total wait to eight minutes.
    pub fn default_poll_policy(&self) -> PollPolicy {
        match self {
            Self::Veo => PollPolicy::new(Duration::from_secs(10), 48),
            Self::Sora => PollPolicy::new(Duration::from_secs(5), 96),
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "veo" => Ok(Self::Veo),
            "sora" => Ok(Self::Sora),
            other => Err(CoreError::Validation(format!(
                "Unknown provider '{other}'. Valid providers: veo, sora"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Poll policy
// ---------------------------------------------------------------------------

/// Longest poll interval a policy may use (one day).
pub const MAX_POLL_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// How often a job is polled and how many polls it gets before timing out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_polls: u32,
}

impl PollPolicy {
    pub fn new(interval: Duration, max_polls: u32) -> Self {
        Self {
            interval,
            max_polls,
        }
    }

    /// Upper bound on how long a job can be polled.
    pub fn max_wait(&self) -> Duration {
        self.interval.saturating_mul(self.max_polls)
    }

    /// Reject policies that could never poll or never time out.
    ///
    /// The interval must be non-zero and at most [`MAX_POLL_INTERVAL`];
    /// the poll budget must be at least one.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.interval.is_zero() {
            return Err(CoreError::Validation(
                "Poll interval must be greater than zero".to_string(),
            ));
        }
        if self.interval > MAX_POLL_INTERVAL {
            return Err(CoreError::Validation(format!(
                "Poll interval of {}s exceeds the {}s maximum",
                self.interval.as_secs(),
                MAX_POLL_INTERVAL.as_secs()
            )));
        }
        if self.max_polls == 0 {
            return Err(CoreError::Validation(
                "Poll budget must allow at least one poll".to_string(),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Status result
// ---------------------------------------------------------------------------

/// Provider status for one job, normalised across providers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StatusResult {
    /// Still generating. `progress` is a coarse percentage when the
    /// provider reports one.
    Pending { progress: Option<u8> },
    /// Generation finished; `artifact_ref` is what finalize needs.
    Succeeded { artifact_ref: String },
    /// The provider reported the generation as failed.
    Failed { reason: String },
}

/// Clamp a provider-reported progress value into `0..=100`.
pub fn clamp_progress(raw: f64) -> u8 {
    if raw.is_nan() {
        return 0;
    }
    raw.round().clamp(0.0, 100.0) as u8
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
