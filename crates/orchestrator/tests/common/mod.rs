use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use genjobs_core::provider::{PollPolicy, Provider, StatusResult};
use genjobs_orchestrator::{JobOrchestrator, OrchestratorConfig};
use genjobs_providers::{AdapterSet, ProviderAdapter, ProviderError};

/// One scripted status answer.
#[derive(Debug, Clone)]
pub enum Step {
    Pending(Option<u8>),
    Succeeded(&'static str),
    Failed(&'static str),
    TransportError,
}

/// Provider adapter that replays a script of status answers.
///
/// Once the script runs out, `fallback` is returned forever.
pub struct ScriptedAdapter {
    provider: Provider,
    policy: PollPolicy,
    script: Mutex<VecDeque<Step>>,
    fallback: Step,
    status_delay: Duration,
    finalize_delay: Duration,
    finalize_result: Result<String, String>,
    status_calls: AtomicU32,
    finalize_calls: AtomicU32,
    finalized_refs: Mutex<Vec<String>>,
}

impl ScriptedAdapter {
    pub fn new(provider: Provider, interval_secs: u64, max_polls: u32) -> Self {
        Self {
            provider,
            policy: PollPolicy::new(Duration::from_secs(interval_secs), max_polls),
            script: Mutex::new(VecDeque::new()),
            fallback: Step::Pending(None),
            status_delay: Duration::ZERO,
            finalize_delay: Duration::ZERO,
            finalize_result: Ok("https://cdn.example.com/a.mp4".to_string()),
            status_calls: AtomicU32::new(0),
            finalize_calls: AtomicU32::new(0),
            finalized_refs: Mutex::new(Vec::new()),
        }
    }

    pub fn script(self, steps: impl IntoIterator<Item = Step>) -> Self {
        *self.script.lock().unwrap() = steps.into_iter().collect();
        self
    }

    pub fn fallback(mut self, step: Step) -> Self {
        self.fallback = step;
        self
    }

    pub fn status_delay(mut self, delay: Duration) -> Self {
        self.status_delay = delay;
        self
    }

    pub fn finalize_delay(mut self, delay: Duration) -> Self {
        self.finalize_delay = delay;
        self
    }

    pub fn finalize_result(mut self, result: Result<&str, &str>) -> Self {
        self.finalize_result = result.map(str::to_string).map_err(str::to_string);
        self
    }

    pub fn status_calls(&self) -> u32 {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn finalize_calls(&self) -> u32 {
        self.finalize_calls.load(Ordering::SeqCst)
    }

    pub fn finalized_refs(&self) -> Vec<String> {
        self.finalized_refs.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProviderAdapter for ScriptedAdapter {
    fn provider(&self) -> Provider {
        self.provider
    }

    fn poll_policy(&self) -> PollPolicy {
        self.policy
    }

    async fn check_status(&self, _handle: &str) -> Result<StatusResult, ProviderError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let step = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        if !self.status_delay.is_zero() {
            tokio::time::sleep(self.status_delay).await;
        }
        match step {
            Step::Pending(progress) => Ok(StatusResult::Pending { progress }),
            Step::Succeeded(artifact_ref) => Ok(StatusResult::Succeeded {
                artifact_ref: artifact_ref.to_string(),
            }),
            Step::Failed(reason) => Ok(StatusResult::Failed {
                reason: reason.to_string(),
            }),
            Step::TransportError => Err(ProviderError::MalformedResponse(
                "connection reset".to_string(),
            )),
        }
    }

    async fn finalize(&self, artifact_ref: &str) -> Result<String, ProviderError> {
        self.finalize_calls.fetch_add(1, Ordering::SeqCst);
        self.finalized_refs
            .lock()
            .unwrap()
            .push(artifact_ref.to_string());
        if !self.finalize_delay.is_zero() {
            tokio::time::sleep(self.finalize_delay).await;
        }
        self.finalize_result
            .clone()
            .map_err(ProviderError::Rejected)
    }
}

/// Build an orchestrator over the given adapters with default settings.
pub fn orchestrator(adapters: Vec<Arc<ScriptedAdapter>>) -> JobOrchestrator {
    let mut set = AdapterSet::new();
    for adapter in adapters {
        set.register(adapter);
    }
    JobOrchestrator::new(set, &OrchestratorConfig::default())
}

/// Let virtual time run forward by `secs`, running every task due.
pub async fn advance(secs: u64) {
    tokio::time::sleep(Duration::from_secs(secs)).await;
}
