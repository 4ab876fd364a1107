//! Lifecycle events emitted by the orchestrator.
//!
//! Presentation code can subscribe instead of polling `get_job`. Sending
//! never blocks the scheduler; slow receivers observe `Lagged`.

use genjobs_core::provider::Provider;
use genjobs_core::types::JobId;
use serde::Serialize;

/// Default broadcast channel capacity.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    /// A new job record was created and its timer armed.
    Started { job_id: JobId, provider: Provider },

    /// A poll tick reported the job as still running.
    Progress { job_id: JobId, progress: u8 },

    /// The artifact was finalized.
    Completed { job_id: JobId, artifact_url: String },

    /// Provider failure, timeout, or finalize failure.
    Failed { job_id: JobId, error: String },

    /// The record was removed by its owner.
    Cleared { job_id: JobId },
}

impl JobEvent {
    pub fn job_id(&self) -> &JobId {
        match self {
            Self::Started { job_id, .. }
            | Self::Progress { job_id, .. }
            | Self::Completed { job_id, .. }
            | Self::Failed { job_id, .. }
            | Self::Cleared { job_id } => job_id,
        }
    }
}
