//! The capability implemented by every unit of work.

use radon_protocol::JobError;
use std::fmt;
use std::time::Duration;

/// Outcome of one incremental step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStepResult {
    /// The job has terminated successfully.
    Success,
    /// The job has terminated in error.
    Failure,
    /// More steps remain; the worker keeps the lease and steps again.
    Continue,
    /// Park the job and make it pending again once the delay has elapsed.
    Retry { delay: Duration },
}

impl JobStepResult {
    /// Retry eligible at the next scheduler tick.
    pub fn retry_now() -> Self {
        JobStepResult::Retry {
            delay: Duration::ZERO,
        }
    }
}

/// A user-supplied unit of work.
///
/// A job must be interruptible at step boundaries; it is never preempted
/// mid-step. Calling back into the registry on the job's own id from
/// within `execute_step` is undefined.
pub trait Job: Send {
    /// Perform one bounded unit of work.
    ///
    /// An `Err` is mapped by the worker to a `Failure` outcome carrying
    /// the error's code; the worker thread itself survives.
    fn execute_step(&mut self) -> Result<JobStepResult, JobError>;

    /// Release external handles (sockets, file descriptors) so they can
    /// be reacquired on resume. Called when the job leaves `Running`
    /// because of a pause; not on terminal states or retry.
    fn release_resources(&mut self);

    /// Completion fraction in `[0, 1]`.
    fn progress(&self) -> f32;

    /// Opaque document describing the job's public state, stored as the
    /// last observed status after every step.
    fn format_status(&self) -> serde_json::Value;

    /// Self-describing document for jobs that choose to be restorable.
    /// The default is not restorable.
    fn serialize(&self) -> Option<serde_json::Value> {
        None
    }
}

impl fmt::Debug for dyn Job + '_ {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("dyn Job").finish_non_exhaustive()
    }
}
