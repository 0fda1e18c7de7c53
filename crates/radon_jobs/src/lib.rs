//! In-process job engine.
//!
//! Long-running operations submitted through the REST API run here as
//! jobs: priority-ordered, pausable, retryable units of work executed by
//! a pool of worker threads.
//!
//! # Architecture
//!
//! - [`Job`] is the capability implemented by every work item; it
//!   executes one bounded step at a time so pause and cancellation can
//!   take effect at step boundaries.
//! - [`JobsRegistry`] owns every submitted job for its whole life and
//!   serializes all state under one mutex: a pending max-heap, a retry
//!   set, a bounded ring of completed jobs, and the id index.
//! - [`RunningJob`] is the scoped lease a worker holds while stepping a
//!   job; dropping the lease commits the marked outcome.
//! - [`JobsEngine`] drives the registry with a fixed pool of worker
//!   threads plus a retry scheduler.
//! - [`SetOfInstancesJob`] is the common multi-item job shape used by
//!   the REST command handlers.
//!
//! # Concurrency
//!
//! Worker threads are plain OS threads. `execute_step` runs without the
//! registry lock held; every metadata read or write takes it.

mod engine;
mod handler;
mod info;
mod instances;
mod job;
mod registry;
mod serialization;
mod status;
pub mod submission;

pub use engine::{EngineConfig, JobsEngine};
pub use handler::Interruption;
pub use info::JobInfo;
pub use instances::{InstanceProcessor, SetOfInstancesJob};
pub use job::{Job, JobStepResult};
pub use registry::{JobsRegistry, RunningJob};
pub use serialization::UnserializerRegistry;
pub use status::JobStatus;
pub use submission::{SubmissionOptions, SubmissionOutcome};
