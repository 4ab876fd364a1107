//! `genjobs-worker` -- tracks generation jobs named on the command line.
//!
//! Usage: `genjobs-worker veo:<operation> sora:<video_id> ...`
//!
//! Polls each job until every one is finished (or Ctrl-C), then prints a
//! JSON snapshot of all job records to stdout.
//!
//! # Environment variables
//!
//! | Variable              | Required | Default | Description                        |
//! |-----------------------|----------|---------|------------------------------------|
//! | `GENJOBS_BACKEND_URL` | yes      | --      | Backend exposing the status/download routes |
//! | `LOG_FORMAT`          | no       | `text`  | `json` for structured log lines    |
//! | `RUST_LOG`            | no       | `genjobs_worker=info,genjobs_orchestrator=info` | Log filter |
//!
//! See [`GenJobsConfig::from_env`] for the polling and timeout settings.

use anyhow::Context;
use genjobs_orchestrator::{GenJobsConfig, JobOrchestrator};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use genjobs_worker::{build_adapters, log_event, parse_args};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    // --- Configuration ---
    let jobs = parse_args(std::env::args().skip(1))?;
    let config = GenJobsConfig::from_env().context("Failed to load configuration")?;
    tracing::info!(
        backend_url = %config.backend_url,
        request_timeout_secs = config.request_timeout.as_secs(),
        jobs = jobs.len(),
        "Loaded worker configuration",
    );

    // --- Orchestrator ---
    let adapters = build_adapters(&config).context("Failed to build provider adapters")?;
    let orchestrator = JobOrchestrator::new(adapters, &config.orchestrator);
    let mut events = orchestrator.subscribe();

    for job in &jobs {
        let id = orchestrator
            .start_job(job.provider, job.handle.as_str(), job.metadata())
            .with_context(|| format!("Failed to start {}:{}", job.provider, job.handle))?;
        tracing::debug!(job_id = %id, "Job submitted");
    }

    // --- Wait for completion or Ctrl-C ---
    tokio::select! {
        () = async {
            while orchestrator.is_anything_processing() {
                match events.recv().await {
                    Ok(event) => log_event(&event),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Event receiver lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        } => {
            tracing::info!("All jobs finished");
        }
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to install Ctrl-C handler")?;
            tracing::info!("Received SIGINT (Ctrl-C), shutting down");
        }
    }

    orchestrator.shutdown().await;

    // --- Final snapshot ---
    let mut records = orchestrator.completed_jobs();
    records.extend(orchestrator.active_jobs());
    println!("{}", serde_json::to_string_pretty(&records)?);

    Ok(())
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "genjobs_worker=info,genjobs_orchestrator=info".into());
    let registry = tracing_subscriber::registry().with(filter);

    if std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json")) {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
