//! Job record, status machine, and creation metadata.
//!
//! A [`JobRecord`] only moves forward through
//! `Queued -> Processing -> {Completed, Failed}`. All mutations go through
//! [`JobRecord::apply`], which enforces that ordering and the rule that
//! `artifact_url` is written exactly once, on entry to `Completed`.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::CoreError;
use crate::provider::Provider;
use crate::types::{JobId, Timestamp};

/// Error message recorded when a job exhausts its poll budget.
pub const TIMEOUT_MESSAGE: &str = "Generation timed out";

/// Prefix for errors raised while saving a finished artifact.
pub const FINALIZE_FAILED_PREFIX: &str = "Failed to save generated video";

/// Maximum length of a prompt summary.
pub const MAX_PROMPT_SUMMARY_LEN: u64 = 2000;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    /// Still being polled (or about to be).
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Queued | Self::Processing)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether moving from `self` to `next` is a legal forward step.
    ///
    /// Staying in the same non-terminal state is allowed (progress updates).
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        match (self, next) {
            (Self::Queued, _) => true,
            (Self::Processing, Self::Queued) => false,
            (Self::Processing, _) => true,
            (Self::Completed | Self::Failed, _) => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------------

/// Descriptive metadata supplied when tracking starts. Immutable afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct JobMetadata {
    #[validate(length(max = 2000))]
    pub prompt_summary: String,
    #[validate(length(min = 1, max = 128))]
    pub model_id: String,
}

impl JobMetadata {
    pub fn new(prompt_summary: impl Into<String>, model_id: impl Into<String>) -> Self {
        Self {
            prompt_summary: prompt_summary.into(),
            model_id: model_id.into(),
        }
    }

    /// Validate field lengths, mapping failures to [`CoreError::Validation`].
    pub fn validated(self) -> Result<Self, CoreError> {
        self.validate()?;
        Ok(self)
    }
}

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// Snapshot of one tracked generation job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: JobId,
    pub provider: Provider,
    pub prompt_summary: String,
    pub model_id: String,
    pub status: JobStatus,
    /// Coarse completion percentage (0-100).
    pub progress: u8,
    /// Set only once the job is `Completed`.
    pub artifact_url: Option<String>,
    /// Set only once the job is `Failed`.
    pub error_message: Option<String>,
    /// Provider-side reference used for status polls.
    pub provider_handle: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub completed_at: Option<Timestamp>,
}

impl JobRecord {
    /// Create a `Queued` record for a provider handle.
    pub fn new(provider: Provider, handle: impl Into<String>, metadata: JobMetadata) -> Self {
        let handle = handle.into();
        let now = Utc::now();
        Self {
            id: JobId::for_handle(provider, &handle),
            provider,
            prompt_summary: metadata.prompt_summary,
            model_id: metadata.model_id,
            status: JobStatus::Queued,
            progress: 0,
            artifact_url: None,
            error_message: None,
            provider_handle: handle,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// Apply a partial update, enforcing forward-only transitions.
    ///
    /// Terminal records are frozen: any update to them is a
    /// [`CoreError::Conflict`].
    pub fn apply(&mut self, update: JobUpdate) -> Result<(), CoreError> {
        if self.status.is_terminal() {
            return Err(CoreError::Conflict(format!(
                "Job {} is already {:?}",
                self.id, self.status
            )));
        }

        let next = update.status.unwrap_or(self.status);
        if !self.status.can_transition_to(next) {
            return Err(CoreError::Conflict(format!(
                "Job {} cannot move from {:?} to {:?}",
                self.id, self.status, next
            )));
        }
        if update.artifact_url.is_some() && next != JobStatus::Completed {
            return Err(CoreError::Conflict(
                "artifact_url can only be set when completing a job".to_string(),
            ));
        }
        if update.error_message.is_some() && next != JobStatus::Failed {
            return Err(CoreError::Conflict(
                "error_message can only be set when failing a job".to_string(),
            ));
        }

        if let Some(progress) = update.progress {
            self.progress = progress.min(100);
        }
        match next {
            JobStatus::Completed => {
                self.progress = 100;
                self.artifact_url = update.artifact_url;
            }
            JobStatus::Failed => {
                self.error_message = update.error_message;
            }
            JobStatus::Queued | JobStatus::Processing => {}
        }

        let now = Utc::now();
        if next.is_terminal() {
            self.completed_at = Some(now);
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Update
// ---------------------------------------------------------------------------

/// Partial set of fields to change on a [`JobRecord`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub progress: Option<u8>,
    pub artifact_url: Option<String>,
    pub error_message: Option<String>,
}

impl JobUpdate {
    /// The provider reported the job as still running.
    pub fn processing(progress: Option<u8>) -> Self {
        Self {
            status: Some(JobStatus::Processing),
            progress,
            ..Default::default()
        }
    }

    pub fn completed(artifact_url: impl Into<String>) -> Self {
        Self {
            status: Some(JobStatus::Completed),
            progress: Some(100),
            artifact_url: Some(artifact_url.into()),
            ..Default::default()
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: Some(JobStatus::Failed),
            error_message: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn timed_out() -> Self {
        Self::failed(TIMEOUT_MESSAGE)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
