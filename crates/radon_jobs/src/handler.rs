//! Registry-owned record wrapping one job.

use crate::job::Job;
use crate::status::JobStatus;
use chrono::{DateTime, Duration, Utc};
use radon_protocol::{JobError, JobId, JobState};

/// Interruption requested on a running handler, observed by the worker at
/// the next step boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interruption {
    /// Release resources and transition to `Paused`.
    Pause,
    /// Abandon the job and transition to `Failure`.
    Cancel,
}

/// Wraps a [`Job`] with identity, priority, state and bookkeeping.
///
/// The embedded job box is `None` while a worker lease has it checked
/// out; all other fields stay behind the registry mutex for the
/// handler's entire life.
pub(crate) struct JobHandler {
    id: JobId,
    state: JobState,
    job: Option<Box<dyn Job>>,
    priority: i32,
    creation_time: DateTime<Utc>,
    last_state_change: DateTime<Utc>,
    runtime: Duration,
    retry_time: DateTime<Utc>,
    scheduled: Option<Interruption>,
    last_status: JobStatus,
}

impl JobHandler {
    pub fn new(job: Box<dyn Job>, priority: i32) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            state: JobState::Pending,
            job: Some(job),
            priority,
            creation_time: now,
            last_state_change: now,
            runtime: Duration::zero(),
            retry_time: now,
            scheduled: None,
            last_status: JobStatus::default(),
        }
    }

    pub fn id(&self) -> &JobId {
        &self.id
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn set_priority(&mut self, priority: i32) {
        self.priority = priority;
    }

    pub fn creation_time(&self) -> DateTime<Utc> {
        self.creation_time
    }

    pub fn runtime(&self) -> Duration {
        self.runtime
    }

    pub fn last_status(&self) -> &JobStatus {
        &self.last_status
    }

    pub fn set_last_status(&mut self, status: JobStatus) {
        self.last_status = status;
    }

    pub fn last_status_mut(&mut self) -> &mut JobStatus {
        &mut self.last_status
    }

    /// Accumulates Running time and clears any scheduled interruption.
    fn change_state(&mut self, state: JobState) {
        let now = Utc::now();
        if self.state == JobState::Running {
            self.runtime = self.runtime + (now - self.last_state_change);
        }
        self.state = state;
        self.last_state_change = now;
        self.scheduled = None;
    }

    /// Transition to any state but `Retry`; that one goes through
    /// [`JobHandler::set_retry_state`] so the wake-up time is recorded.
    pub fn set_state(&mut self, state: JobState) {
        debug_assert!(state != JobState::Retry, "use set_retry_state");
        self.change_state(state);
    }

    /// Only a running job may ask to be retried.
    pub fn set_retry_state(&mut self, delay: std::time::Duration) -> Result<(), JobError> {
        if self.state != JobState::Running {
            return Err(JobError::BadSequenceOfCalls(format!(
                "retry requested for job {} in state {}",
                self.id, self.state
            )));
        }
        self.change_state(JobState::Retry);
        self.retry_time = Utc::now() + Duration::milliseconds(delay.as_millis() as i64);
        Ok(())
    }

    /// Only a running job may have an interruption scheduled.
    pub fn schedule(&mut self, interruption: Interruption) -> Result<(), JobError> {
        if self.state != JobState::Running {
            return Err(JobError::BadSequenceOfCalls(format!(
                "interruption scheduled for job {} in state {}",
                self.id, self.state
            )));
        }
        self.scheduled = Some(interruption);
        Ok(())
    }

    pub fn scheduled(&self) -> Option<Interruption> {
        self.scheduled
    }

    pub fn is_retry_ready(&self, now: DateTime<Utc>) -> bool {
        debug_assert_eq!(self.state, JobState::Retry);
        self.retry_time <= now
    }

    /// Move the job out for the duration of a lease.
    pub fn take_job(&mut self) -> Option<Box<dyn Job>> {
        self.job.take()
    }

    /// Return the job after a lease commits.
    pub fn put_back_job(&mut self, job: Box<dyn Job>) {
        debug_assert!(self.job.is_none(), "job already present");
        self.job = Some(job);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobStepResult;
    use std::time::Duration as StdDuration;

    struct Nop;

    impl Job for Nop {
        fn execute_step(&mut self) -> Result<JobStepResult, JobError> {
            Ok(JobStepResult::Success)
        }
        fn release_resources(&mut self) {}
        fn progress(&self) -> f32 {
            0.0
        }
        fn format_status(&self) -> serde_json::Value {
            serde_json::Value::Object(Default::default())
        }
    }

    #[test]
    fn retry_requires_running() {
        let mut handler = JobHandler::new(Box::new(Nop), 0);
        let err = handler.set_retry_state(StdDuration::ZERO).unwrap_err();
        assert_eq!(err.code(), radon_protocol::ErrorCode::BadSequenceOfCalls);

        handler.set_state(JobState::Running);
        handler.set_retry_state(StdDuration::ZERO).unwrap();
        assert_eq!(handler.state(), JobState::Retry);
        assert!(handler.is_retry_ready(Utc::now()));
    }

    #[test]
    fn interruption_requires_running() {
        let mut handler = JobHandler::new(Box::new(Nop), 0);
        assert!(handler.schedule(Interruption::Pause).is_err());

        handler.set_state(JobState::Running);
        handler.schedule(Interruption::Pause).unwrap();
        assert_eq!(handler.scheduled(), Some(Interruption::Pause));

        // Any state change drains the flag.
        handler.set_state(JobState::Paused);
        assert_eq!(handler.scheduled(), None);
    }

    #[test]
    fn runtime_accumulates_over_running_intervals() {
        let mut handler = JobHandler::new(Box::new(Nop), 0);
        assert_eq!(handler.runtime(), Duration::zero());

        handler.set_state(JobState::Running);
        std::thread::sleep(StdDuration::from_millis(5));
        handler.set_state(JobState::Paused);
        let first = handler.runtime();
        assert!(first > Duration::zero());

        // Paused time does not count.
        std::thread::sleep(StdDuration::from_millis(5));
        handler.set_state(JobState::Pending);
        assert_eq!(handler.runtime(), first);

        handler.set_state(JobState::Running);
        std::thread::sleep(StdDuration::from_millis(5));
        handler.set_state(JobState::Success);
        assert!(handler.runtime() > first);
    }
}
