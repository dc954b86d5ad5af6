//! synd-worker - Publishing pipeline daemon
//!
//! Runs the schedule poller, the retry reclaimer, and a pool of queue
//! workers in one process. Several daemons may run side by side against the
//! same database; the conditional status claims keep every attempt on a
//! single worker.

use clap::Parser;
use libsyndicate::logging::{LogFormat, LoggingConfig};
use libsyndicate::platforms::registry_from_config;
use libsyndicate::service::{QueueWorker, RetryReclaimer, SchedulePoller};
use libsyndicate::{Config, PublishPipeline, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info};

#[derive(Parser, Debug)]
#[command(name = "synd-worker")]
#[command(version)]
#[command(about = "Publishing pipeline daemon")]
#[command(long_about = "\
synd-worker - Publishing pipeline daemon

DESCRIPTION:
    synd-worker drives the scheduled publishing pipeline. It polls for due
    publish attempts, admits them to the execution queue, runs queue workers
    that deliver content through the configured platform publishers, and
    periodically re-admits retryable failures.

USAGE:
    # Run in foreground (logs to stderr)
    synd-worker

    # Faster polling, more workers
    synd-worker --poll-interval 10 --workers 4

    # Run one full pass and exit (for scripts and tests)
    synd-worker --once

SIGNALS:
    SIGTERM, SIGINT - Graceful shutdown (running executions finish)

CONFIGURATION:
    Configuration file: ~/.config/syndicate/config.toml
    Database location:  ~/.local/share/syndicate/syndicate.db

    Override with environment variables:
        SYNDICATE_CONFIG     - Path to config file
        SYNDICATE_DB_PATH    - Path to database file
        SYNDICATE_LOG_FORMAT - text or json
        SYNDICATE_LOG_LEVEL  - error, warn, info, debug, trace

EXIT CODES:
    0 - Clean shutdown
    1 - Runtime error
    2 - Configuration error
")]
struct Cli {
    /// Poll interval in seconds (overrides config)
    #[arg(long, value_name = "SECONDS")]
    #[arg(help = "How often to look for due attempts (default: 60)")]
    poll_interval: Option<u64>,

    /// Number of queue worker loops (overrides config)
    #[arg(long, value_name = "COUNT")]
    workers: Option<usize>,

    /// Enable verbose logging to stderr
    #[arg(short, long)]
    verbose: bool,

    /// Run one full pass and exit (for testing)
    #[arg(long)]
    #[arg(help = "Poll, reclaim, drain the queue once, then exit")]
    once: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

fn init_logging(verbose: bool) {
    if verbose {
        LoggingConfig::new(LogFormat::Text, "debug".to_string(), true).init();
    } else {
        libsyndicate::logging::init_default();
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let registry = registry_from_config(&config);
    let pipeline = PublishPipeline::from_config(&config, registry).await?;

    info!("synd-worker daemon starting");

    if cli.once {
        let now = chrono::Utc::now().timestamp();
        let summary = pipeline.run_cycle(now).await?;
        info!(
            "Processed once: admitted={} reclaimed={} executed={}",
            summary.admitted, summary.reclaimed, summary.executed
        );
        return Ok(());
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    setup_signal_handlers(shutdown.clone())?;

    let poll_interval = cli.poll_interval.unwrap_or(config.scheduler.poll_interval);
    let reclaim_interval = config.scheduler.reclaim_interval;
    let workers = cli.workers.unwrap_or(config.scheduler.workers).max(1);
    info!(
        "Poll interval: {}s, reclaim interval: {}s, workers: {}",
        poll_interval, reclaim_interval, workers
    );

    let mut handles = Vec::new();

    for worker_id in 0..workers {
        let worker = pipeline.worker().clone();
        let shutdown = shutdown.clone();
        handles.push(tokio::spawn(async move {
            worker_loop(worker_id, worker, shutdown).await;
        }));
    }

    {
        let reclaimer = pipeline.reclaimer().clone();
        let shutdown = shutdown.clone();
        handles.push(tokio::spawn(async move {
            reclaimer_loop(reclaimer, reclaim_interval, shutdown).await;
        }));
    }

    // The poller cadence runs on the main task.
    poller_loop(pipeline.poller().clone(), poll_interval, shutdown).await;

    futures::future::join_all(handles).await;

    info!("synd-worker daemon stopped");
    Ok(())
}

/// Set up signal handlers for graceful shutdown
fn setup_signal_handlers(shutdown: Arc<AtomicBool>) -> Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM]).map_err(|e| {
        libsyndicate::SyndicateError::InvalidInput(format!("Signal setup failed: {}", e))
    })?;

    let shutdown_clone = shutdown.clone();
    std::thread::spawn(move || {
        for sig in signals.forever() {
            match sig {
                SIGTERM | SIGINT => {
                    info!("Received shutdown signal, stopping gracefully...");
                    shutdown_clone.store(true, Ordering::Relaxed);
                    break;
                }
                _ => {}
            }
        }
    });

    Ok(())
}

async fn poller_loop(poller: SchedulePoller, interval: u64, shutdown: Arc<AtomicBool>) {
    loop {
        if shutdown.load(Ordering::Relaxed) {
            info!("Shutdown requested, stopping poller");
            break;
        }

        let now = chrono::Utc::now().timestamp();
        match poller.tick(now).await {
            Ok(0) => {}
            Ok(admitted) => info!("Admitted {} due attempt(s)", admitted),
            Err(e) => error!("Poller tick failed: {}", e),
        }

        sleep_with_shutdown(interval, &shutdown).await;
    }
}

async fn reclaimer_loop(reclaimer: RetryReclaimer, interval: u64, shutdown: Arc<AtomicBool>) {
    loop {
        if shutdown.load(Ordering::Relaxed) {
            debug!("Shutdown requested, stopping reclaimer");
            break;
        }

        let now = chrono::Utc::now().timestamp();
        match reclaimer.tick(now).await {
            Ok(0) => {}
            Ok(reclaimed) => info!("Reclaimed {} failed attempt(s)", reclaimed),
            Err(e) => error!("Reclaimer tick failed: {}", e),
        }

        sleep_with_shutdown(interval, &shutdown).await;
    }
}

async fn worker_loop(worker_id: usize, worker: QueueWorker, shutdown: Arc<AtomicBool>) {
    loop {
        if shutdown.load(Ordering::Relaxed) {
            debug!("Shutdown requested, stopping worker {}", worker_id);
            break;
        }

        let now = chrono::Utc::now().timestamp();
        match worker.run_once(now).await {
            // Processed a task; immediately look for the next one.
            Ok(true) => {}
            Ok(false) => sleep_with_shutdown(1, &shutdown).await,
            Err(e) => {
                error!("Worker {} failed: {}", worker_id, e);
                sleep_with_shutdown(1, &shutdown).await;
            }
        }
    }
}

/// Sleep for `secs`, waking once a second to notice a shutdown request.
async fn sleep_with_shutdown(secs: u64, shutdown: &Arc<AtomicBool>) {
    for _ in 0..secs {
        if shutdown.load(Ordering::Relaxed) {
            break;
        }
        sleep(Duration::from_secs(1)).await;
    }
}
