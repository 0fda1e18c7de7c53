//! Worker pool driving the registry.

use crate::job::JobStepResult;
use crate::registry::{JobsRegistry, RunningJob};
use crate::status::JobStatus;
use radon_protocol::ErrorCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Tuning knobs of the engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Number of worker threads.
    pub worker_count: usize,
    /// How long a worker waits for pending work before rechecking the
    /// stop flag.
    pub lease_timeout: Duration,
    /// Period of the retry scheduler.
    pub retry_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            lease_timeout: Duration::from_millis(100),
            retry_interval: Duration::from_millis(100),
        }
    }
}

/// Fixed pool of worker threads plus one retry-scheduler thread.
///
/// Stopping does not forcibly cancel in-flight jobs: a worker finishes
/// the job it holds, commits normally, and exits at its next acquisition
/// timeout.
pub struct JobsEngine {
    registry: Arc<JobsRegistry>,
    stop: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
    retry_scheduler: Option<JoinHandle<()>>,
}

impl JobsEngine {
    /// Spawn the worker pool and the retry scheduler.
    pub fn start(registry: Arc<JobsRegistry>, config: EngineConfig) -> Self {
        let stop = Arc::new(AtomicBool::new(false));

        let workers = (0..config.worker_count.max(1))
            .map(|index| {
                let registry = Arc::clone(&registry);
                let stop = Arc::clone(&stop);
                let lease_timeout = config.lease_timeout;
                thread::Builder::new()
                    .name(format!("job-worker-{index}"))
                    .spawn(move || worker_loop(&registry, &stop, lease_timeout))
                    .expect("failed to spawn worker thread")
            })
            .collect();

        let retry_scheduler = {
            let registry = Arc::clone(&registry);
            let stop = Arc::clone(&stop);
            let interval = config.retry_interval;
            thread::Builder::new()
                .name("retry-scheduler".to_string())
                .spawn(move || {
                    while !stop.load(Ordering::SeqCst) {
                        registry.schedule_retries();
                        thread::sleep(interval);
                    }
                })
                .expect("failed to spawn retry scheduler thread")
        };

        info!("Jobs engine started with {} workers", config.worker_count.max(1));
        Self {
            registry,
            stop,
            workers,
            retry_scheduler: Some(retry_scheduler),
        }
    }

    pub fn registry(&self) -> &Arc<JobsRegistry> {
        &self.registry
    }

    /// Stop the pool and join every thread.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if self.stop.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Stopping the jobs engine");

        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                warn!("A worker thread terminated abnormally");
            }
        }
        if let Some(scheduler) = self.retry_scheduler.take() {
            if scheduler.join().is_err() {
                warn!("The retry scheduler terminated abnormally");
            }
        }

        info!("Jobs engine stopped");
    }
}

impl Drop for JobsEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(registry: &JobsRegistry, stop: &AtomicBool, lease_timeout: Duration) {
    while !stop.load(Ordering::SeqCst) {
        let Some(lease) = registry.take_running_job(lease_timeout) else {
            continue;
        };
        run_leased_job(lease);
    }
    debug!("Worker exiting");
}

/// Step the leased job until it resolves; dropping the lease commits the
/// outcome.
fn run_leased_job(mut lease: RunningJob<'_>) {
    loop {
        if lease.is_cancel_scheduled() {
            record_status(&lease, ErrorCode::InternalError);
            lease.mark_failure();
            return;
        }

        if lease.is_pause_scheduled() {
            lease.job_mut().release_resources();
            lease.mark_pause();
            return;
        }

        match lease.job_mut().execute_step() {
            Ok(JobStepResult::Success) => {
                record_status(&lease, ErrorCode::Success);
                lease.mark_success();
                return;
            }
            Ok(JobStepResult::Failure) => {
                record_status(&lease, ErrorCode::InternalError);
                lease.mark_failure();
                return;
            }
            Ok(JobStepResult::Continue) => {
                record_status(&lease, ErrorCode::Success);
            }
            Ok(JobStepResult::Retry { delay }) => {
                record_status(&lease, ErrorCode::Success);
                lease.mark_retry(delay);
                return;
            }
            Err(err) => {
                warn!("Job {} failed while stepping: {}", lease.id(), err);
                record_status(&lease, err.code());
                lease.mark_failure();
                return;
            }
        }
    }
}

/// Store the status observed after a step. The step outcome stands even
/// when the job misreports its progress: the value is clamped to
/// `[0, 1]` and a warning is logged.
fn record_status(lease: &RunningJob<'_>, code: ErrorCode) {
    let progress = lease.job().progress();
    let description = lease.job().format_status();

    let clamped = progress.clamp(0.0, 1.0);
    if clamped != progress {
        warn!(
            "Job {} reported a progress of {} outside [0, 1]",
            lease.id(),
            progress
        );
    }

    if let Ok(status) = JobStatus::new(code, clamped, description) {
        lease.update_status(status);
    }
}
