//! Job identifiers and lifecycle states.

use crate::error::JobError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Opaque job identifier: a canonical UUID v4 string.
///
/// Identifiers are globally unique within a process lifetime; once a
/// completed job is pruned from the registry its identifier becomes
/// unknown.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Generate a fresh identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Validate and wrap an identifier received from the REST layer.
    pub fn parse(value: &str) -> Result<Self, JobError> {
        Uuid::parse_str(value)
            .map_err(|e| JobError::ParameterOutOfRange(format!("invalid job ID '{value}': {e}")))?;
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for JobId {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Lifecycle state of a job in the registry.
///
/// `Success` and `Failure` are terminal, modulo an explicit resubmission
/// of a failed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum JobState {
    #[default]
    Pending,
    Running,
    Success,
    Failure,
    Paused,
    Retry,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "Pending",
            JobState::Running => "Running",
            JobState::Success => "Success",
            JobState::Failure => "Failure",
            JobState::Paused => "Paused",
            JobState::Retry => "Retry",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Success | JobState::Failure)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JobState {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(JobState::Pending),
            "Running" => Ok(JobState::Running),
            "Success" => Ok(JobState::Success),
            "Failure" => Ok(JobState::Failure),
            "Paused" => Ok(JobState::Paused),
            "Retry" => Ok(JobState::Retry),
            _ => Err(JobError::ParameterOutOfRange(format!(
                "invalid job state: '{s}'"
            ))),
        }
    }
}
