use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::api;
use crate::config::Config;
use crate::error::Result;
use crate::runner::{JobRunner, RunnerConfig};
use crate::scheduler::Scheduler;
use crate::service::JobService;
use crate::store::JobStore;

/// How long in-flight REST connections get to finish once a shutdown
/// signal arrives.
const REST_DRAIN_GRACE: Duration = Duration::from_secs(60);

/// Token cancelled on the first SIGINT/SIGTERM. Cancellation kicks off the
/// first phase of shutdown (the REST drain); `run` stops the scheduler and
/// the runner only after the drain settles, so jobs keep firing while
/// connections close out.
fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let signal_token = token.clone();

    tokio::spawn(async move {
        use tokio::signal::unix::{signal, SignalKind};

        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(t), Ok(i)) => (t, i),
                (Err(e), _) | (_, Err(e)) => {
                    tracing::error!(error = %e, "Could not install signal handlers; shutdown only via server error");
                    return;
                }
            };

        let received = tokio::select! {
            _ = sigterm.recv() => "SIGTERM",
            _ = sigint.recv() => "SIGINT",
        };
        tracing::info!(signal = received, "Shutdown requested, draining REST connections");
        signal_token.cancel();
    });

    token
}

/// Main daemon that wires all components.
pub struct Daemon {
    config: Config,
    port: u16,
}

impl Daemon {
    pub fn new(config: Config, port: u16) -> Self {
        Self { config, port }
    }

    /// Run the daemon until a shutdown signal or a server error.
    ///
    /// Startup order: store → load persisted jobs → runner + seeded
    /// scheduler → REST. Shutdown order is the reverse of what matters:
    /// drain REST (bounded), stop the scheduler loop, stop the runner
    /// (SIGTERM to children, bounded grace).
    pub async fn run(self) -> Result<()> {
        std::fs::create_dir_all(self.config.resource_directory())?;

        let store = Arc::new(JobStore::new(self.config.jobs_file()));
        let seed = store.load().await?;
        tracing::info!(
            jobs = seed.len(),
            file = %store.path().display(),
            "Loaded persisted jobs"
        );

        let runner_config = RunnerConfig {
            max_running_jobs: self.config.max_running_jobs as usize,
            ..RunnerConfig::default()
        };
        let (run_tx, run_rx) = mpsc::channel(runner_config.run_channel_buffer);
        let (runner, runner_handle) = JobRunner::new(&runner_config, store.clone(), run_rx);
        let (scheduler, scheduler_handle) = Scheduler::new(
            seed.into_values().collect(),
            run_tx,
            store.clone(),
            self.config.cron_timezone()?,
        );

        let runner_task = tokio::spawn(runner.start());
        let scheduler_task = tokio::spawn(scheduler.run());

        let service = JobService::new(store, scheduler_handle.clone());
        let app = api::router(service);

        let token = shutdown_token();
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!(addr = %addr, "REST server listening");

        let drain_token = token.clone();
        let server = axum::serve(listener, app)
            .with_graceful_shutdown(async move { drain_token.cancelled().await });
        let server = async move { server.await };

        // The drain is bounded: a connection that outlives the grace period
        // does not hold up scheduler and runner shutdown.
        let server_result = tokio::select! {
            result = server => result.map_err(Into::into),
            _ = async {
                token.cancelled().await;
                tokio::time::sleep(REST_DRAIN_GRACE).await;
            } => {
                tracing::warn!("REST drain grace period expired with connections still open");
                Ok(())
            }
        };

        tracing::info!("Stopping the scheduler");
        scheduler_handle.stop();
        if let Err(e) = scheduler_task.await {
            tracing::error!(error = %e, "Scheduler task panicked");
        }

        if let Err(e) = runner_handle.stop().await {
            tracing::error!(error = %e, "Job runner did not stop cleanly");
        }
        if let Err(e) = runner_task.await {
            tracing::error!(error = %e, "Runner task panicked");
        }

        tracing::info!("Shutdown complete");
        server_result
    }
}
