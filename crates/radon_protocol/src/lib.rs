//! Canonical types shared across the Radon server crates.
//!
//! Everything that crosses a crate boundary (job identifiers, job states,
//! error codes) is defined here once, so the engine, the REST handlers and
//! the daemon agree on one vocabulary.

pub mod error;
pub mod types;

pub use error::{ErrorCode, JobError, Result};
pub use types::{JobId, JobState};
