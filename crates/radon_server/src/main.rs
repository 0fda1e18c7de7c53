//! Radon job-engine daemon.
//!
//! Hosts the in-process job engine that the REST front-end submits work
//! to. The daemon runs until it receives a termination signal, then
//! drains in-flight steps and joins the worker pool.

use anyhow::Result;
use clap::Parser;
use radon_jobs::{EngineConfig, JobsEngine, JobsRegistry};
use radon_logging::{init_logging, LogConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "radon-server", about = "Job engine daemon for the Radon imaging server")]
struct Args {
    /// Number of worker threads
    #[arg(long, default_value_t = 4)]
    workers: usize,

    /// Completed jobs retained for inspection (0 keeps all)
    #[arg(long, default_value_t = 10)]
    max_completed_jobs: usize,

    /// Also write logs to a file under the Radon home directory
    #[arg(long)]
    log_file: bool,

    /// Verbose console logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(LogConfig {
        app_name: "radon-server",
        verbose: args.verbose,
        log_to_file: args.log_file,
    })?;

    info!("Starting the Radon job engine");
    info!("  Workers: {}", args.workers);
    info!("  Retained completed jobs: {}", args.max_completed_jobs);

    let registry = Arc::new(JobsRegistry::new());
    registry.set_max_completed_jobs(args.max_completed_jobs);

    let engine = JobsEngine::start(
        Arc::clone(&registry),
        EngineConfig {
            worker_count: args.workers,
            ..EngineConfig::default()
        },
    );

    let shutdown = Arc::new(AtomicBool::new(false));
    install_signal_handlers(&shutdown)?;

    while !shutdown.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(100));
    }

    info!("Shutting down");
    engine.stop();
    Ok(())
}

#[cfg(unix)]
fn install_signal_handlers(shutdown: &Arc<AtomicBool>) -> Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    let shutdown = Arc::clone(shutdown);
    std::thread::spawn(move || {
        if let Some(signal) = signals.forever().next() {
            info!("Received signal {}, initiating shutdown...", signal);
            shutdown.store(true, Ordering::SeqCst);
        }
    });
    Ok(())
}

#[cfg(windows)]
fn install_signal_handlers(shutdown: &Arc<AtomicBool>) -> Result<()> {
    let shutdown = Arc::clone(shutdown);
    ctrlc::set_handler(move || {
        info!("Received Ctrl+C, initiating shutdown...");
        shutdown.store(true, Ordering::SeqCst);
    })?;
    Ok(())
}
