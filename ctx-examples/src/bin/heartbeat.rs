use std::error::Error;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use ctx::context::{self, background};
use ctx::interrupt;
use ctx::{Context, Doner, MergePolicy, RefCounter, Signal, link, merge, tick, tick_every_with};
use ctx_config::shared::{IntervalConfig, ShutdownConfig};
use ctx_config::{Config, load_config, load_config_from};
use ctx_telemetry::metrics::init_metrics_handle;
use ctx_telemetry::tracing::init_tracing;
use futures::StreamExt;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Runs a pool of workers with a heartbeat until Ctrl+C, SIGTERM or `--run-for-ms`
/// elapses, then drains the workers within the configured grace period.
#[derive(Debug, Parser)]
#[command(name = "heartbeat", version, about)]
struct AppArgs {
    /// Directory holding `base.yaml` and `{dev,prod}.yaml` (default: ./configuration)
    #[arg(long)]
    config_dir: Option<PathBuf>,
    /// Override the number of workers from the configuration
    #[arg(long)]
    workers: Option<usize>,
    /// Stop on our own after this many milliseconds instead of waiting for a signal
    #[arg(long)]
    run_for_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct HeartbeatConfig {
    workers: usize,
    work_ms: u64,
    #[serde(default)]
    interval: IntervalConfig,
    #[serde(default)]
    shutdown: ShutdownConfig,
}

impl Config for HeartbeatConfig {}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let log_flusher = init_tracing("heartbeat")?;

    if let Err(e) = main_impl().await {
        error!("{e}");
        // `exit` skips destructors, so flush buffered log lines first.
        drop(log_flusher);
        std::process::exit(1);
    }

    Ok(())
}

async fn main_impl() -> Result<(), Box<dyn Error>> {
    let args = AppArgs::parse();

    let metrics_handle = init_metrics_handle()?;
    ctx::metrics::register_metrics();

    let mut config: HeartbeatConfig = match &args.config_dir {
        Some(dir) => load_config_from(dir)?,
        None => load_config()?,
    };
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    config.shutdown.validate()?;

    info!(
        workers = config.workers,
        period_ms = config.interval.period_ms,
        grace_period_ms = config.shutdown.grace_period_ms,
        "starting heartbeat"
    );

    // Stops on the first interrupt or when the optional run time elapses.
    let (stop, stop_now) = match args.run_for_ms {
        Some(ms) => context::with_timeout(background(), Duration::from_millis(ms)),
        None => context::with_cancel(background()),
    };
    let (root, cancel_root) = merge(interrupt::context()?, stop, MergePolicy::Or);

    let (drained, workers) = spawn_workers(
        config.workers,
        &root.done(),
        Duration::from_millis(config.work_ms),
    );

    let heartbeat_workers = workers.clone();
    let heartbeat = tick_every_with(&root, &config.interval, move || {
        let workers = heartbeat_workers.clone();
        async move { info!(active_workers = workers.count(), "heartbeat") }
    })?;

    ctx::defer(&root, || info!("shutdown requested, draining workers"));

    root.done().await;
    wait_for_task("heartbeat", heartbeat).await;
    info!(reason = ?root.err(), "stopped accepting work");

    let (grace, _) = context::with_timeout(background(), config.shutdown.grace_period());
    link([drained.clone(), grace.done()]).await;

    if config.workers == 0 {
        info!("no workers to drain");
    } else if drained.is_done() {
        info!("all workers drained");
    } else {
        warn!(
            remaining = workers.count(),
            reason = ?grace.err(),
            "grace period elapsed before all workers drained"
        );
    }

    cancel_root.cancel();
    stop_now.cancel();

    debug!(metrics = %metrics_handle.render(), "final metrics");

    Ok(())
}

/// Spawns `count` workers that stop with `stop`.
///
/// The returned signal completes once every worker has stopped, and immediately when
/// there are none.
fn spawn_workers(count: usize, stop: &Signal, work: Duration) -> (Signal, RefCounter) {
    let parent = if count == 0 {
        Signal::completed()
    } else {
        Signal::never()
    };

    let (drained, workers) = ctx::with_ref_count(&parent);
    workers.add(count as i64);
    for id in 0..count {
        tokio::spawn(run_worker(id, stop.clone(), workers.clone(), work));
    }

    (drained, workers)
}

/// Awaits a background task, returning `false` if it panicked or was cancelled.
async fn wait_for_task(name: &'static str, handle: JoinHandle<()>) -> bool {
    match handle.await {
        Ok(()) => true,
        Err(err) => {
            warn!(task = name, %err, "background task failed");
            false
        }
    }
}

async fn run_worker(id: usize, stop: Signal, workers: RefCounter, work: Duration) {
    let mut ticks = tick(&stop);
    let mut units: u64 = 0;

    while ticks.next().await.is_some() {
        tokio::time::sleep(work).await;
        units += 1;
    }

    info!(id, units, "worker stopped");
    workers.decr();
}
