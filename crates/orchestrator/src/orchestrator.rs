//! Public entry point for tracking generation jobs.
//!
//! [`JobOrchestrator`] is created once by whichever long-lived scope owns
//! job tracking and cloned into every caller. It must be torn down
//! explicitly with [`JobOrchestrator::shutdown`] when that scope ends.
//!
//! Job failures never surface as errors here: they are recorded on the
//! job record, and callers read them back through [`JobOrchestrator::get_job`]
//! or the event stream.

use std::sync::Arc;
use std::time::Duration;

use genjobs_core::error::CoreError;
use genjobs_core::job::{JobMetadata, JobRecord};
use genjobs_core::provider::Provider;
use genjobs_core::types::JobId;
use genjobs_providers::AdapterSet;
use tokio::sync::broadcast;

use crate::config::OrchestratorConfig;
use crate::error::OrchestratorError;
use crate::events::JobEvent;
use crate::scheduler::Scheduler;

/// Tracks generation jobs across providers.
///
/// Cheap to clone; all clones share the same registry and timers.
#[derive(Clone)]
pub struct JobOrchestrator {
    scheduler: Arc<Scheduler>,
    shutdown_timeout: Duration,
}

impl JobOrchestrator {
    pub fn new(adapters: AdapterSet, config: &OrchestratorConfig) -> Self {
        if adapters.is_empty() {
            tracing::warn!("Job orchestrator created without provider adapters");
        }
        tracing::info!(
            providers = ?adapters.providers(),
            event_capacity = config.event_capacity,
            "Job orchestrator created",
        );
        Self {
            scheduler: Scheduler::new(adapters, config.event_capacity),
            shutdown_timeout: config.shutdown_timeout,
        }
    }

    /// Start tracking a provider job and return its id.
    ///
    /// If the job is already being polled, or already reached a terminal
    /// state, the existing id is returned and nothing new is armed.
    /// Otherwise the record is created, its timer armed, and one status
    /// check is run immediately without waiting a full interval.
    ///
    /// Nothing is recorded or armed when the adapter's poll policy fails
    /// [`PollPolicy::validate`](genjobs_core::provider::PollPolicy::validate).
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start_job(
        &self,
        provider: Provider,
        handle: impl Into<String>,
        metadata: JobMetadata,
    ) -> Result<JobId, OrchestratorError> {
        let handle = handle.into();
        if handle.trim().is_empty() {
            return Err(CoreError::Validation("Provider handle must not be empty".to_string()).into());
        }
        let metadata = metadata.validated()?;
        let adapter = self
            .scheduler
            .adapter(provider)
            .ok_or(OrchestratorError::UnsupportedProvider(provider))?;
        let policy = adapter.poll_policy();
        policy
            .validate()
            .map_err(|e| OrchestratorError::InvalidPollPolicy {
                provider,
                reason: e.to_string(),
            })?;
        let id = JobId::for_handle(provider, &handle);

        let token = {
            let mut state = self.scheduler.lock();
            if state.is_shut_down() {
                return Err(OrchestratorError::ShutDown);
            }
            if state.is_armed(&id) {
                tracing::debug!(job_id = %id, "Job already being polled");
                return Ok(id);
            }
            match state.registry.get(&id).map(|r| r.status) {
                Some(status) if status.is_terminal() => {
                    tracing::debug!(job_id = %id, ?status, "Job already finished, not re-arming");
                    return Ok(id);
                }
                Some(_) => {}
                None => {
                    state.registry.create(provider, &handle, metadata);
                    self.scheduler.emit(JobEvent::Started {
                        job_id: id.clone(),
                        provider,
                    });
                }
            }
            self.scheduler.arm(&mut state, &id, policy.interval)
        };

        tracing::info!(
            job_id = %id,
            %provider,
            interval_secs = policy.interval.as_secs_f64(),
            max_polls = policy.max_polls,
            max_wait_secs = policy.max_wait().as_secs(),
            "Tracking generation job",
        );
        self.scheduler.spawn_tick(id.clone(), token);
        Ok(id)
    }

    /// Snapshot of a job record.
    pub fn get_job(&self, id: &JobId) -> Option<JobRecord> {
        self.scheduler.lock().registry.get(id).cloned()
    }

    /// Remove a job record, stopping its timer if it is still polling.
    ///
    /// A tick already in flight for the job is abandoned; nothing is sent
    /// to the provider. Returns the removed record.
    pub fn clear_job(&self, id: &JobId) -> Option<JobRecord> {
        let mut state = self.scheduler.lock();
        let was_polling = state.disarm(id);
        state.guard.forget(id);
        let removed = state.registry.remove(id);
        if removed.is_some() {
            tracing::info!(job_id = %id, was_polling, "Job cleared");
            self.scheduler.emit(JobEvent::Cleared { job_id: id.clone() });
        }
        removed
    }

    /// Jobs still `Queued` or `Processing`, oldest first.
    pub fn active_jobs(&self) -> Vec<JobRecord> {
        self.scheduler.lock().registry.list_active()
    }

    /// Jobs that reached `Completed` or `Failed`, oldest first.
    pub fn completed_jobs(&self) -> Vec<JobRecord> {
        self.scheduler.lock().registry.list_completed()
    }

    /// True iff any job is `Queued` or `Processing`.
    pub fn is_anything_processing(&self) -> bool {
        self.scheduler.lock().registry.any_active()
    }

    /// Whether a live timer is armed for `id`.
    pub fn is_polling(&self, id: &JobId) -> bool {
        self.scheduler.lock().is_armed(id)
    }

    /// Number of polls performed for `id` so far.
    pub fn tick_count(&self, id: &JobId) -> Option<u32> {
        self.scheduler.lock().registry.tick_count(id)
    }

    /// Subscribe to job lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.scheduler.subscribe()
    }

    pub fn is_shut_down(&self) -> bool {
        self.scheduler.lock().is_shut_down()
    }

    /// Release every timer and stop all polling.
    ///
    /// Job records are kept so callers can read a final snapshot. No tick
    /// touches the registry once the synchronous part of this call has
    /// run; the remainder waits (bounded by the configured timeout) for
    /// the spawned tasks to exit. Later calls to [`start_job`](Self::start_job)
    /// fail with [`OrchestratorError::ShutDown`].
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down job orchestrator");
        let released = self.scheduler.stop_all();
        let kept = self.scheduler.lock().registry.len();
        tracing::info!(released, kept, "Poll timers released, job records kept");

        if !self.scheduler.drain(self.shutdown_timeout).await {
            tracing::warn!(
                timeout_secs = self.shutdown_timeout.as_secs(),
                "Timed out waiting for poll tasks to exit",
            );
        }
        tracing::info!("Job orchestrator shut down complete");
    }
}
