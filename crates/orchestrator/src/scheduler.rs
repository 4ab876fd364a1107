//! Per-job poll timers and the tick state machine.
//!
//! Every tracked job owns one recurring timer task. Each timer tick is
//! spawned as its own task, so a slow status check does not delay the
//! next tick and several ticks for the same job can be in flight at once.
//! The finalize guard closes the race that creates.
//!
//! Every timer owns a [`CancellationToken`] (a child of the scheduler's
//! master token). Releasing the timer cancels it under the state lock,
//! and every tick re-checks its token under that lock before mutating
//! anything, so a released job never sees another registry write.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use genjobs_core::job::{JobStatus, JobUpdate, FINALIZE_FAILED_PREFIX, TIMEOUT_MESSAGE};
use genjobs_core::provider::{Provider, StatusResult};
use genjobs_core::types::JobId;
use genjobs_providers::{AdapterSet, ProviderAdapter};
use tokio::sync::broadcast;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::events::JobEvent;
use crate::guard::DedupGuard;
use crate::registry::JobRegistry;

// ---------------------------------------------------------------------------
// Timer handle
// ---------------------------------------------------------------------------

/// Ownership of one job's live recurring timer.
///
/// Consumed by [`release`](Self::release), so it can only be released once.
pub(crate) struct TimerHandle {
    token: CancellationToken,
}

impl TimerHandle {
    fn release(self) {
        self.token.cancel();
    }
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Everything ticks and callers mutate, guarded by one lock.
#[derive(Default)]
pub(crate) struct SchedulerState {
    pub(crate) registry: JobRegistry,
    pub(crate) guard: DedupGuard,
    timers: HashMap<JobId, TimerHandle>,
    shut_down: bool,
}

impl SchedulerState {
    pub(crate) fn is_armed(&self, id: &JobId) -> bool {
        self.timers.contains_key(id)
    }

    pub(crate) fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    /// Release the timer for `id`, if one is armed.
    pub(crate) fn disarm(&mut self, id: &JobId) -> bool {
        match self.timers.remove(id) {
            Some(timer) => {
                timer.release();
                tracing::debug!(job_id = %id, "Poll timer released");
                true
            }
            None => false,
        }
    }
}

/// What a single tick did. Returned for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TickOutcome {
    /// The job is gone, terminal, or its timer was released.
    Stopped,
    /// Another tick owns the finalize step.
    Skipped,
    /// No terminal state reached; polling continues.
    Continue,
    /// This tick moved the job to `Completed` or `Failed`.
    Terminal,
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

pub(crate) struct Scheduler {
    state: Mutex<SchedulerState>,
    adapters: AdapterSet,
    events: broadcast::Sender<JobEvent>,
    /// Master token; every timer token is a child of it.
    cancel: CancellationToken,
    tasks: TaskTracker,
}

impl Scheduler {
    pub(crate) fn new(adapters: AdapterSet, event_capacity: usize) -> Arc<Self> {
        let (events, _) = broadcast::channel(event_capacity.max(1));
        Arc::new(Self {
            state: Mutex::new(SchedulerState::default()),
            adapters,
            events,
            cancel: CancellationToken::new(),
            tasks: TaskTracker::new(),
        })
    }

    /// Lock the shared state.
    ///
    /// No lock section awaits or panics midway, so a poisoned lock still
    /// holds consistent state.
    pub(crate) fn lock(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn adapter(&self, provider: Provider) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.get(provider)
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    pub(crate) fn emit(&self, event: JobEvent) {
        // Only fails when nobody is subscribed.
        let _ = self.events.send(event);
    }

    /// Arm a recurring timer for `id` and return its token.
    ///
    /// The caller must hold the state lock and have checked that no timer
    /// is armed for `id`. The first timer tick fires one `interval` from
    /// now; callers wanting an immediate status use [`spawn_tick`](Self::spawn_tick).
    pub(crate) fn arm(
        self: &Arc<Self>,
        state: &mut SchedulerState,
        id: &JobId,
        interval: Duration,
    ) -> CancellationToken {
        let token = self.cancel.child_token();
        state.timers.insert(
            id.clone(),
            TimerHandle {
                token: token.clone(),
            },
        );
        self.tasks.spawn(run_timer(
            Arc::downgrade(self),
            id.clone(),
            interval,
            token.clone(),
        ));
        tracing::debug!(
            job_id = %id,
            interval_ms = interval.as_millis() as u64,
            "Poll timer armed",
        );
        token
    }

    /// Run one tick for `id` on its own task.
    ///
    /// The tick is abandoned at its next await once `token` is cancelled.
    pub(crate) fn spawn_tick(self: &Arc<Self>, id: JobId, token: CancellationToken) {
        let scheduler = Arc::clone(self);
        self.tasks.spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    tracing::trace!(job_id = %id, "Tick abandoned");
                }
                outcome = scheduler.run_tick(&id, &token) => {
                    tracing::trace!(job_id = %id, ?outcome, "Tick finished");
                }
            }
        });
    }

    /// One poll of one job.
    ///
    /// 1. Cleared or released jobs stop.
    /// 2. Jobs whose finalize is running or done are skipped.
    /// 3. The tick is counted; a count past the budget times out.
    /// 4. The provider is asked for status; transport errors are retried
    ///    next tick.
    /// 5. Pending updates progress, failure fails, success finalizes.
    ///
    /// A non-terminal answer on the last budgeted tick times the job out.
    pub(crate) async fn run_tick(&self, id: &JobId, token: &CancellationToken) -> TickOutcome {
        let (adapter, handle, tick, max_polls) = {
            let mut state = self.lock();
            if token.is_cancelled() {
                return TickOutcome::Stopped;
            }
            let Some((status, provider, handle)) = state
                .registry
                .get(id)
                .map(|r| (r.status, r.provider, r.provider_handle.clone()))
            else {
                state.disarm(id);
                return TickOutcome::Stopped;
            };
            if state.guard.is_claimed(id) {
                tracing::trace!(job_id = %id, "Finalize in progress or done, skipping tick");
                return TickOutcome::Skipped;
            }
            if status.is_terminal() {
                state.disarm(id);
                return TickOutcome::Stopped;
            }

            let Some(adapter) = self.adapters.get(provider) else {
                let message = format!("No adapter registered for provider '{provider}'");
                self.conclude(&mut state, id, JobUpdate::failed(message));
                return TickOutcome::Terminal;
            };
            let max_polls = adapter.poll_policy().max_polls;
            let tick = state.registry.record_tick(id).unwrap_or(0);
            if tick > max_polls {
                tracing::warn!(job_id = %id, tick, max_polls, "Poll budget exhausted");
                self.conclude(&mut state, id, JobUpdate::timed_out());
                return TickOutcome::Terminal;
            }
            (adapter, handle, tick, max_polls)
        };

        let last_tick = tick >= max_polls;
        tracing::debug!(job_id = %id, tick, max_polls, "Checking job status");

        match adapter.check_status(&handle).await {
            Err(e) => {
                tracing::warn!(job_id = %id, tick, error = %e, "Status check failed");
                if last_tick {
                    self.conclude_unclaimed(id, token, JobUpdate::timed_out())
                } else {
                    TickOutcome::Continue
                }
            }
            Ok(StatusResult::Pending { progress }) => {
                if last_tick {
                    return self.conclude_unclaimed(id, token, JobUpdate::timed_out());
                }
                let mut state = self.lock();
                if token.is_cancelled() {
                    return TickOutcome::Stopped;
                }
                if state.guard.is_claimed(id) {
                    return TickOutcome::Skipped;
                }
                if state.registry.update(id, JobUpdate::processing(progress)) {
                    let progress = state.registry.get(id).map(|r| r.progress).unwrap_or(0);
                    tracing::debug!(job_id = %id, progress, "Job processing");
                    self.emit(JobEvent::Progress {
                        job_id: id.clone(),
                        progress,
                    });
                }
                TickOutcome::Continue
            }
            Ok(StatusResult::Failed { reason }) => {
                self.conclude_unclaimed(id, token, JobUpdate::failed(reason))
            }
            Ok(StatusResult::Succeeded { artifact_ref }) => {
                self.finalize(id, token, adapter.as_ref(), &artifact_ref).await
            }
        }
    }

    /// Finalize path: claim the guard, run finalize, record the result.
    async fn finalize(
        &self,
        id: &JobId,
        token: &CancellationToken,
        adapter: &dyn ProviderAdapter,
        artifact_ref: &str,
    ) -> TickOutcome {
        {
            let mut state = self.lock();
            if token.is_cancelled() || !state.registry.contains(id) {
                return TickOutcome::Stopped;
            }
            if !state.guard.begin_finalize(id) {
                tracing::debug!(
                    job_id = %id,
                    in_flight = state.guard.is_downloading(id),
                    "Finalize already claimed by another tick",
                );
                return TickOutcome::Skipped;
            }
        }

        tracing::info!(job_id = %id, artifact_ref, "Generation finished, finalizing artifact");
        let result = adapter.finalize(artifact_ref).await;

        let mut state = self.lock();
        if token.is_cancelled() {
            return TickOutcome::Stopped;
        }
        match result {
            Ok(url) => {
                state.guard.complete_finalize(id, true);
                self.conclude(&mut state, id, JobUpdate::completed(url));
            }
            Err(e) => {
                tracing::warn!(job_id = %id, error = %e, "Finalize failed");
                state.guard.complete_finalize(id, false);
                let message = format!("{FINALIZE_FAILED_PREFIX}: {e}");
                self.conclude(&mut state, id, JobUpdate::failed(message));
            }
        }
        TickOutcome::Terminal
    }

    /// Apply a terminal update unless the timer was released or another
    /// tick owns the finalize step.
    fn conclude_unclaimed(&self, id: &JobId, token: &CancellationToken, update: JobUpdate) -> TickOutcome {
        let mut state = self.lock();
        if token.is_cancelled() {
            return TickOutcome::Stopped;
        }
        if state.guard.is_claimed(id) {
            return TickOutcome::Skipped;
        }
        self.conclude(&mut state, id, update);
        TickOutcome::Terminal
    }

    /// Apply a terminal update, release the timer, and announce it.
    fn conclude(&self, state: &mut SchedulerState, id: &JobId, update: JobUpdate) {
        let applied = state.registry.update(id, update);
        state.disarm(id);
        if !applied {
            return;
        }
        let Some(record) = state.registry.get(id) else {
            return;
        };
        match record.status {
            JobStatus::Completed => {
                let artifact_url = record.artifact_url.clone().unwrap_or_default();
                tracing::info!(job_id = %id, artifact_url = %artifact_url, "Job completed");
                self.emit(JobEvent::Completed {
                    job_id: id.clone(),
                    artifact_url,
                });
            }
            JobStatus::Failed => {
                let error = record.error_message.clone().unwrap_or_default();
                if error == TIMEOUT_MESSAGE {
                    tracing::warn!(job_id = %id, "Job timed out");
                } else {
                    tracing::warn!(job_id = %id, error = %error, "Job failed");
                }
                self.emit(JobEvent::Failed {
                    job_id: id.clone(),
                    error,
                });
            }
            JobStatus::Queued | JobStatus::Processing => {}
        }
    }

    /// Release every timer and drop the finalize guard's state.
    ///
    /// No tick mutates the registry after this returns.
    pub(crate) fn stop_all(&self) -> usize {
        let mut state = self.lock();
        state.shut_down = true;
        let released = state.timers.len();
        for (_, timer) in state.timers.drain() {
            timer.release();
        }
        state.guard.clear();
        self.cancel.cancel();
        self.tasks.close();
        released
    }

    /// Wait for spawned timer and tick tasks to exit.
    ///
    /// Returns `false` if they did not all exit within `timeout`.
    pub(crate) async fn drain(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.tasks.wait()).await.is_ok()
    }
}

/// Timer loop for one job: spawn a tick every `interval` until released.
async fn run_timer(
    scheduler: Weak<Scheduler>,
    id: JobId,
    interval: Duration,
    token: CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                let Some(scheduler) = scheduler.upgrade() else {
                    break;
                };
                scheduler.spawn_tick(id.clone(), token.clone());
            }
        }
    }

    tracing::trace!(job_id = %id, "Poll timer task exited");
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use futures::future::join_all;
    use genjobs_core::job::JobMetadata;
    use genjobs_core::provider::PollPolicy;
    use genjobs_providers::ProviderError;

    use super::*;

    /// Always reports success after `delay`; counts finalize calls.
    struct AlwaysDone {
        delay: Duration,
        max_polls: u32,
        finalize_calls: AtomicU32,
    }

    #[async_trait]
    impl ProviderAdapter for AlwaysDone {
        fn provider(&self) -> Provider {
            Provider::Veo
        }

        fn poll_policy(&self) -> PollPolicy {
            PollPolicy::new(Duration::from_secs(3600), self.max_polls)
        }

        async fn check_status(&self, _handle: &str) -> Result<StatusResult, ProviderError> {
            tokio::time::sleep(self.delay).await;
            Ok(StatusResult::Succeeded {
                artifact_ref: "r1".into(),
            })
        }

        async fn finalize(&self, artifact_ref: &str) -> Result<String, ProviderError> {
            self.finalize_calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(2)).await;
            Ok(format!("https://cdn/{artifact_ref}.mp4"))
        }
    }

    fn setup(max_polls: u32) -> (Arc<Scheduler>, Arc<AlwaysDone>, JobId, CancellationToken) {
        let adapter = Arc::new(AlwaysDone {
            delay: Duration::from_millis(500),
            max_polls,
            finalize_calls: AtomicU32::new(0),
        });
        let scheduler = Scheduler::new(AdapterSet::new().with(adapter.clone()), 16);
        let (id, token) = {
            let mut state = scheduler.lock();
            let id = state
                .registry
                .create(Provider::Veo, "op1", JobMetadata::new("p", "veo-3.0"))
                .id;
            let token = scheduler.arm(&mut state, &id, Duration::from_secs(3600));
            (id, token)
        };
        (scheduler, adapter, id, token)
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_ticks_finalize_once() {
        let (scheduler, adapter, id, token) = setup(100);

        let ticks = (0..8).map(|_| scheduler.run_tick(&id, &token));
        let outcomes = join_all(ticks).await;

        assert_eq!(adapter.finalize_calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            outcomes.iter().filter(|o| **o == TickOutcome::Terminal).count(),
            1
        );
        assert_eq!(
            outcomes.iter().filter(|o| **o == TickOutcome::Skipped).count(),
            7
        );

        let state = scheduler.lock();
        let record = state.registry.get(&id).unwrap();
        assert_eq!(record.status, JobStatus::Completed);
        assert_eq!(record.artifact_url.as_deref(), Some("https://cdn/r1.mp4"));
        assert!(state.guard.is_finalized(&id));
        assert!(!state.is_armed(&id));
        assert!(token.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn tick_after_finalize_is_skipped() {
        let (scheduler, adapter, id, token) = setup(100);
        assert_eq!(scheduler.run_tick(&id, &token).await, TickOutcome::Terminal);

        let fresh = CancellationToken::new();
        assert_eq!(scheduler.run_tick(&id, &fresh).await, TickOutcome::Skipped);
        assert_eq!(adapter.finalize_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn tick_for_cleared_job_stops() {
        let (scheduler, adapter, id, token) = setup(100);
        {
            let mut state = scheduler.lock();
            state.registry.remove(&id);
        }
        assert_eq!(scheduler.run_tick(&id, &token).await, TickOutcome::Stopped);
        assert!(!scheduler.lock().is_armed(&id));
        assert_eq!(adapter.finalize_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn released_token_blocks_mutation() {
        let (scheduler, adapter, id, token) = setup(100);
        scheduler.lock().disarm(&id);
        assert_eq!(scheduler.run_tick(&id, &token).await, TickOutcome::Stopped);

        let state = scheduler.lock();
        assert_eq!(state.registry.get(&id).unwrap().status, JobStatus::Queued);
        assert_eq!(state.registry.tick_count(&id), Some(0));
        assert_eq!(adapter.finalize_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn tick_past_budget_times_out_without_status_check() {
        let (scheduler, adapter, id, token) = setup(1);
        scheduler.lock().registry.record_tick(&id);

        assert_eq!(scheduler.run_tick(&id, &token).await, TickOutcome::Terminal);
        let state = scheduler.lock();
        let record = state.registry.get(&id).unwrap();
        assert_eq!(record.status, JobStatus::Failed);
        assert_eq!(record.error_message.as_deref(), Some(TIMEOUT_MESSAGE));
        assert_eq!(adapter.finalize_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_all_releases_timers_and_guard() {
        let (scheduler, _adapter, id, token) = setup(100);
        scheduler.lock().guard.begin_finalize(&id);

        assert_eq!(scheduler.stop_all(), 1);
        assert!(token.is_cancelled());
        assert!(scheduler.drain(Duration::from_secs(1)).await);

        let state = scheduler.lock();
        assert!(state.is_shut_down());
        assert!(!state.is_armed(&id));
        assert!(!state.guard.is_claimed(&id));
        assert!(state.registry.contains(&id));
    }
}
