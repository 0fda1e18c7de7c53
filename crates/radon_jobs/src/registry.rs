//! Concurrent job store: submission, priority queue, retry set,
//! completed ring, state machine.
//!
//! # Lock discipline
//!
//! One mutex guards all registry structures; every state read or write
//! takes it. `execute_step` is never called with the lock held: the
//! worker checks the job out of its handler through a [`RunningJob`]
//! lease and steps it outside the mutex. Two condition variables signal
//! pending-availability (worker wake-up) and completion (for
//! `submit_and_wait` callers).

use crate::handler::{Interruption, JobHandler};
use crate::info::JobInfo;
use crate::job::Job;
use crate::status::JobStatus;
use chrono::Utc;
use radon_protocol::{ErrorCode, JobError, JobId, JobState};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

const LOCK_POISONED: &str = "jobs registry lock poisoned";

/// Default number of completed jobs retained for inspection.
const DEFAULT_MAX_COMPLETED_JOBS: usize = 10;

/// Entry of the pending max-heap.
///
/// `seq` only gives the ordering a total key; callers get no guarantee
/// about the order among equal priorities.
#[derive(Debug, Clone, Eq, PartialEq)]
struct PendingEntry {
    priority: i32,
    seq: u64,
    id: JobId,
}

impl Ord for PendingEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for PendingEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

struct RegistryState {
    index: HashMap<JobId, JobHandler>,
    pending: BinaryHeap<PendingEntry>,
    retries: HashSet<JobId>,
    completed: VecDeque<JobId>,
    max_completed_jobs: usize,
    next_seq: u64,
}

impl RegistryState {
    fn new(max_completed_jobs: usize) -> Self {
        Self {
            index: HashMap::new(),
            pending: BinaryHeap::new(),
            retries: HashSet::new(),
            completed: VecDeque::new(),
            max_completed_jobs,
            next_seq: 0,
        }
    }

    fn push_pending(&mut self, id: &JobId, priority: i32) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.pending.push(PendingEntry {
            priority,
            seq,
            id: id.clone(),
        });
    }

    /// The standard binary heap does not support arbitrary removal or key
    /// update; these paths are rare, so drain and rebuild.
    fn rebuild_pending<F>(&mut self, mut adjust: F)
    where
        F: FnMut(PendingEntry) -> Option<PendingEntry>,
    {
        let entries = std::mem::take(&mut self.pending).into_vec();
        self.pending = entries.into_iter().filter_map(&mut adjust).collect();
    }

    fn forget_old_completed(&mut self) {
        if self.max_completed_jobs == 0 {
            return;
        }
        while self.completed.len() > self.max_completed_jobs {
            if let Some(id) = self.completed.pop_front() {
                debug!("Forgetting the oldest completed job: {}", id);
                self.index.remove(&id);
            }
        }
    }

    fn mark_running_as_completed(&mut self, id: &JobId, success: bool) {
        info!(
            "Job has completed with {}: {}",
            if success { "success" } else { "failure" },
            id
        );
        let handler = self
            .index
            .get_mut(id)
            .expect("running job vanished from the index");
        debug_assert_eq!(handler.state(), JobState::Running);
        handler.set_state(if success {
            JobState::Success
        } else {
            JobState::Failure
        });
        self.completed.push_back(id.clone());
        self.forget_old_completed();
    }

    fn mark_running_as_retry(&mut self, id: &JobId, delay: Duration) {
        info!("Job scheduled for retry in {}ms: {}", delay.as_millis(), id);
        let handler = self
            .index
            .get_mut(id)
            .expect("running job vanished from the index");
        handler
            .set_retry_state(delay)
            .expect("retry committed for a job that is not running");
        self.retries.insert(id.clone());
    }

    fn mark_running_as_paused(&mut self, id: &JobId) {
        info!("Job paused: {}", id);
        let handler = self
            .index
            .get_mut(id)
            .expect("running job vanished from the index");
        debug_assert_eq!(handler.state(), JobState::Running);
        handler.set_state(JobState::Paused);
    }

    /// Forced failure of a handler that is not running: move it straight
    /// to the completed ring with an internal error recorded.
    fn force_failure(&mut self, id: &JobId) {
        let handler = self
            .index
            .get_mut(id)
            .expect("cancelled job vanished from the index");
        handler.last_status_mut().set_error_code(ErrorCode::InternalError);
        handler.set_state(JobState::Failure);
        self.completed.push_back(id.clone());
        self.forget_old_completed();
    }

    #[cfg(debug_assertions)]
    fn is_pending(&self, id: &JobId) -> bool {
        self.pending.iter().any(|entry| entry.id == *id)
    }

    #[cfg(debug_assertions)]
    fn is_completed(&self, id: &JobId) -> bool {
        self.completed.contains(id)
    }

    #[cfg(debug_assertions)]
    fn check_invariants(&self) {
        for entry in self.pending.iter() {
            let handler = self
                .index
                .get(&entry.id)
                .expect("pending entry without handler");
            assert_eq!(handler.state(), JobState::Pending);
        }

        if self.max_completed_jobs != 0 {
            assert!(self.completed.len() <= self.max_completed_jobs);
        }

        for id in &self.completed {
            let handler = self.index.get(id).expect("completed id without handler");
            assert!(handler.state().is_terminal());
        }

        for id in &self.retries {
            let handler = self.index.get(id).expect("retry id without handler");
            assert_eq!(handler.state(), JobState::Retry);
        }

        for (id, handler) in &self.index {
            assert_eq!(handler.id(), id);
            let pending = self.is_pending(id);
            let completed = self.is_completed(id);
            let retry = self.retries.contains(id);
            match handler.state() {
                JobState::Pending => assert!(pending && !completed && !retry),
                JobState::Success | JobState::Failure => {
                    assert!(!pending && completed && !retry)
                }
                JobState::Retry => assert!(!pending && !completed && retry),
                JobState::Running | JobState::Paused => {
                    assert!(!pending && !completed && !retry)
                }
            }
        }
    }

    #[cfg(not(debug_assertions))]
    fn check_invariants(&self) {}
}

/// Concurrent store of every submitted job.
///
/// The registry exclusively owns each [`JobHandler`] and its embedded
/// job for the handler's entire life; workers borrow one job at a time
/// through [`RunningJob`].
pub struct JobsRegistry {
    inner: Mutex<RegistryState>,
    pending_available: Condvar,
    completion: Condvar,
}

impl Default for JobsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl JobsRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryState::new(DEFAULT_MAX_COMPLETED_JOBS)),
            pending_available: Condvar::new(),
            completion: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.inner.lock().expect(LOCK_POISONED)
    }

    /// Submit a job with the given priority (larger is higher). Returns
    /// the fresh identifier; never blocks.
    pub fn submit(&self, job: Box<dyn Job>, priority: i32) -> JobId {
        let handler = JobHandler::new(job, priority);
        let id = handler.id().clone();

        let mut state = self.lock();
        state.check_invariants();

        state.push_pending(&id, priority);
        state.index.insert(id.clone(), handler);
        self.pending_available.notify_one();

        info!("New job submitted: {}", id);
        state.check_invariants();
        id
    }

    /// Submit, then block until the job reaches a terminal state.
    ///
    /// Returns the final status document on success and the recorded
    /// error on failure. Multiple waiters on the same registry are fine.
    pub fn submit_and_wait(
        &self,
        job: Box<dyn Job>,
        priority: i32,
    ) -> Result<serde_json::Value, JobError> {
        let id = self.submit(job, priority);

        let mut state = self.lock();
        loop {
            match state.index.get(&id) {
                None => {
                    // Pruned from the completed ring before we observed it.
                    return Err(JobError::Internal(format!(
                        "job {id} was evicted before its completion was observed"
                    )));
                }
                Some(handler) => match handler.state() {
                    JobState::Success => {
                        return Ok(handler.last_status().description().clone());
                    }
                    JobState::Failure => {
                        let code = handler.last_status().error_code();
                        return Err(JobError::from_code(
                            code,
                            format!("job {id} failed with {code}"),
                        ));
                    }
                    _ => {}
                },
            }
            state = self.completion.wait(state).expect(LOCK_POISONED);
        }
    }

    /// Snapshot of all known identifiers.
    pub fn list_jobs(&self) -> Vec<JobId> {
        let state = self.lock();
        state.check_invariants();
        state.index.keys().cloned().collect()
    }

    /// Snapshot of one handler, or `None` for an unknown id.
    pub fn job_info(&self, id: &JobId) -> Option<JobInfo> {
        let state = self.lock();
        state.check_invariants();
        state.index.get(id).map(JobInfo::from_handler)
    }

    /// Fast-path state query.
    pub fn state_of(&self, id: &JobId) -> Option<JobState> {
        let state = self.lock();
        state.check_invariants();
        state.index.get(id).map(|handler| handler.state())
    }

    /// Change a job's priority. For a pending job the heap is rebuilt so
    /// the ordering reflects the change; otherwise only the stored
    /// priority is updated.
    pub fn set_priority(&self, id: &JobId, priority: i32) {
        info!("Changing priority to {} for job: {}", priority, id);

        let mut state = self.lock();
        state.check_invariants();

        let is_pending = match state.index.get_mut(id) {
            None => {
                warn!("Unknown job: {}", id);
                None
            }
            Some(handler) => {
                handler.set_priority(priority);
                Some(handler.state() == JobState::Pending)
            }
        };

        // A pending job moved in the heap: rebuild so the ordering
        // reflects the new priority.
        if is_pending == Some(true) {
            state.rebuild_pending(|mut entry| {
                if entry.id == *id {
                    entry.priority = priority;
                }
                Some(entry)
            });
        }

        state.check_invariants();
    }

    /// Pause a job. Pending and retrying jobs pause immediately; a
    /// running job has the pause scheduled and drains at the next step
    /// boundary; paused and terminal jobs are left untouched.
    pub fn pause(&self, id: &JobId) {
        info!("Pausing job: {}", id);

        let mut state = self.lock();
        state.check_invariants();

        match state.index.get(id).map(|handler| handler.state()) {
            None => warn!("Unknown job: {}", id),
            Some(JobState::Pending) => {
                state.rebuild_pending(|entry| (entry.id != *id).then_some(entry));
                state
                    .index
                    .get_mut(id)
                    .expect("handler disappeared under the lock")
                    .set_state(JobState::Paused);
            }
            Some(JobState::Retry) => {
                state.retries.remove(id);
                state
                    .index
                    .get_mut(id)
                    .expect("handler disappeared under the lock")
                    .set_state(JobState::Paused);
            }
            Some(JobState::Running) => {
                state
                    .index
                    .get_mut(id)
                    .expect("handler disappeared under the lock")
                    .schedule(Interruption::Pause)
                    .expect("pause scheduled for a job that is not running");
            }
            Some(JobState::Paused) | Some(JobState::Success) | Some(JobState::Failure) => {
                // Nothing to be done.
            }
        }

        state.check_invariants();
    }

    /// Resume a paused job; warns and does nothing from any other state.
    pub fn resume(&self, id: &JobId) {
        info!("Resuming job: {}", id);

        let mut state = self.lock();
        state.check_invariants();

        match state.index.get(id).map(|handler| handler.state()) {
            None => warn!("Unknown job: {}", id),
            Some(JobState::Paused) => {
                let priority = {
                    let handler = state
                        .index
                        .get_mut(id)
                        .expect("handler disappeared under the lock");
                    handler.set_state(JobState::Pending);
                    handler.priority()
                };
                state.push_pending(id, priority);
                self.pending_available.notify_one();
            }
            Some(_) => warn!("Cannot resume a job that is not paused: {}", id),
        }

        state.check_invariants();
    }

    /// Resubmit a failed job; warns and does nothing from any other
    /// state.
    pub fn resubmit(&self, id: &JobId) {
        info!("Resubmitting failed job: {}", id);

        let mut state = self.lock();
        state.check_invariants();

        match state.index.get(id).map(|handler| handler.state()) {
            None => warn!("Unknown job: {}", id),
            Some(JobState::Failure) => {
                let position = state
                    .completed
                    .iter()
                    .position(|completed| completed == id)
                    .expect("failed job missing from the completed ring");
                let _ = state.completed.remove(position);

                let priority = {
                    let handler = state
                        .index
                        .get_mut(id)
                        .expect("handler disappeared under the lock");
                    handler.set_state(JobState::Pending);
                    handler.priority()
                };
                state.push_pending(id, priority);
                self.pending_available.notify_one();
            }
            Some(_) => warn!("Cannot resubmit a job that has not failed: {}", id),
        }

        state.check_invariants();
    }

    /// Force a transition to `Failure` from any non-terminal state. A
    /// running job drains at its next step boundary.
    pub fn cancel(&self, id: &JobId) {
        info!("Cancelling job: {}", id);

        let mut state = self.lock();
        state.check_invariants();

        let mut completed = false;
        match state.index.get(id).map(|handler| handler.state()) {
            None => warn!("Unknown job: {}", id),
            Some(JobState::Pending) => {
                state.rebuild_pending(|entry| (entry.id != *id).then_some(entry));
                state.force_failure(id);
                completed = true;
            }
            Some(JobState::Retry) => {
                state.retries.remove(id);
                state.force_failure(id);
                completed = true;
            }
            Some(JobState::Paused) => {
                state.force_failure(id);
                completed = true;
            }
            Some(JobState::Running) => {
                state
                    .index
                    .get_mut(id)
                    .expect("handler disappeared under the lock")
                    .schedule(Interruption::Cancel)
                    .expect("cancel scheduled for a job that is not running");
            }
            Some(JobState::Success) | Some(JobState::Failure) => {
                // Already terminal.
            }
        }

        state.check_invariants();
        drop(state);
        if completed {
            self.completion.notify_all();
        }
    }

    /// Update the retention cap and immediately prune any excess oldest
    /// completions. A cap of 0 disables pruning.
    pub fn set_max_completed_jobs(&self, max: usize) {
        let mut state = self.lock();
        state.check_invariants();

        state.max_completed_jobs = max;
        state.forget_old_completed();

        state.check_invariants();
    }

    /// Move every retrying job whose wake-up time has elapsed back into
    /// the pending queue.
    pub fn schedule_retries(&self) {
        let mut state = self.lock();
        state.check_invariants();

        let now = Utc::now();
        let due: Vec<JobId> = state
            .retries
            .iter()
            .filter(|id| {
                state
                    .index
                    .get(*id)
                    .expect("retry id without handler")
                    .is_retry_ready(now)
            })
            .cloned()
            .collect();

        for id in due {
            info!("Retrying job: {}", id);
            state.retries.remove(&id);
            let priority = {
                let handler = state
                    .index
                    .get_mut(&id)
                    .expect("handler disappeared under the lock");
                handler.set_state(JobState::Pending);
                handler.priority()
            };
            state.push_pending(&id, priority);
            self.pending_available.notify_one();
        }

        state.check_invariants();
    }

    /// Acquire the highest-priority pending job as a [`RunningJob`]
    /// lease, blocking until one is available. A zero timeout means
    /// infinite; otherwise `None` is returned once the timeout elapses
    /// with no pending work.
    pub fn take_running_job(&self, timeout: Duration) -> Option<RunningJob<'_>> {
        let mut state = self.lock();

        while state.pending.is_empty() {
            if timeout.is_zero() {
                state = self.pending_available.wait(state).expect(LOCK_POISONED);
            } else {
                let (guard, wait) = self
                    .pending_available
                    .wait_timeout(state, timeout)
                    .expect(LOCK_POISONED);
                state = guard;
                if wait.timed_out() && state.pending.is_empty() {
                    return None;
                }
            }
        }

        state.check_invariants();

        let entry = state.pending.pop().expect("pending heap emptied under the lock");
        let handler = state
            .index
            .get_mut(&entry.id)
            .expect("pending entry without handler");
        debug_assert_eq!(handler.state(), JobState::Pending);
        handler.set_state(JobState::Running);

        let job = handler
            .take_job()
            .expect("pending job already checked out by another lease");
        let id = handler.id().clone();
        let priority = handler.priority();

        state.check_invariants();
        Some(RunningJob {
            registry: self,
            id,
            priority,
            job: Some(job),
            target: Target::Failure,
        })
    }
}

#[derive(Debug, Clone, Copy)]
enum Target {
    Success,
    Failure,
    Paused,
    Retry(Duration),
}

/// Scoped exclusive borrow of one pending job by a worker.
///
/// The embedded job is checked out of its handler for the duration of
/// the lease, so `execute_step` runs without the registry lock held.
/// Dropping the lease commits the marked outcome under the lock; if the
/// worker neglects to choose, the job is recorded as a failure.
pub struct RunningJob<'a> {
    registry: &'a JobsRegistry,
    id: JobId,
    priority: i32,
    job: Option<Box<dyn Job>>,
    target: Target,
}

impl RunningJob<'_> {
    pub fn id(&self) -> &JobId {
        &self.id
    }

    /// Priority snapshot taken at acquisition.
    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// Mutable access to the leased job, for stepping it.
    pub fn job_mut(&mut self) -> &mut dyn Job {
        self.job.as_deref_mut().expect("lease without a job")
    }

    pub fn job(&self) -> &dyn Job {
        self.job.as_deref().expect("lease without a job")
    }

    fn scheduled(&self) -> Option<Interruption> {
        let state = self.registry.lock();
        state.check_invariants();
        state
            .index
            .get(&self.id)
            .expect("running job vanished from the index")
            .scheduled()
    }

    /// Whether a pause was requested since the last step boundary.
    pub fn is_pause_scheduled(&self) -> bool {
        self.scheduled() == Some(Interruption::Pause)
    }

    /// Whether a cancellation was requested since the last step boundary.
    pub fn is_cancel_scheduled(&self) -> bool {
        self.scheduled() == Some(Interruption::Cancel)
    }

    /// Record the status observed after a step.
    pub fn update_status(&self, status: JobStatus) {
        let mut state = self.registry.lock();
        state
            .index
            .get_mut(&self.id)
            .expect("running job vanished from the index")
            .set_last_status(status);
    }

    pub fn mark_success(&mut self) {
        self.target = Target::Success;
    }

    pub fn mark_failure(&mut self) {
        self.target = Target::Failure;
    }

    pub fn mark_pause(&mut self) {
        self.target = Target::Paused;
    }

    pub fn mark_retry(&mut self, delay: Duration) {
        self.target = Target::Retry(delay);
    }
}

impl Drop for RunningJob<'_> {
    fn drop(&mut self) {
        let Some(job) = self.job.take() else {
            return;
        };

        let mut state = self.registry.lock();
        state.check_invariants();

        state
            .index
            .get_mut(&self.id)
            .expect("running job vanished from the index")
            .put_back_job(job);

        let mut completed = false;
        match self.target {
            Target::Success => {
                state.mark_running_as_completed(&self.id, true);
                completed = true;
            }
            Target::Failure => {
                state.mark_running_as_completed(&self.id, false);
                completed = true;
            }
            Target::Paused => state.mark_running_as_paused(&self.id),
            Target::Retry(delay) => state.mark_running_as_retry(&self.id, delay),
        }

        state.check_invariants();
        drop(state);
        if completed {
            self.registry.completion.notify_all();
        }
    }
}
