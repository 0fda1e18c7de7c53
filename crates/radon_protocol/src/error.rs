//! Error taxonomy of the job engine.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, JobError>;

/// Error kind recorded in job statuses and rendered in REST documents.
///
/// `Success` is a sentinel, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ErrorCode {
    #[default]
    Success,
    /// Catch-all for unexpected step failures
    InternalError,
    /// A required job object was not provided
    NullPointer,
    /// Value outside its legal range (progress, unknown id where required)
    ParameterOutOfRange,
    /// Operation invoked in a state that does not allow it
    BadSequenceOfCalls,
    /// Malformed submission body or unparseable step input
    BadFileFormat,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Success => "Success",
            ErrorCode::InternalError => "InternalError",
            ErrorCode::NullPointer => "NullPointer",
            ErrorCode::ParameterOutOfRange => "ParameterOutOfRange",
            ErrorCode::BadSequenceOfCalls => "BadSequenceOfCalls",
            ErrorCode::BadFileFormat => "BadFileFormat",
        }
    }

    /// Numeric code rendered on the wire next to the symbolic name.
    pub fn numeric(&self) -> i32 {
        match self {
            ErrorCode::Success => 0,
            ErrorCode::InternalError => -1,
            ErrorCode::NullPointer => 1,
            ErrorCode::ParameterOutOfRange => 2,
            ErrorCode::BadSequenceOfCalls => 3,
            ErrorCode::BadFileFormat => 4,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ErrorCode::Success)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error raised by the engine and by jobs, carrying its taxonomy kind.
#[derive(Error, Debug)]
pub enum JobError {
    #[error("no job provided")]
    NullPointer,

    #[error("parameter out of range: {0}")]
    ParameterOutOfRange(String),

    #[error("bad sequence of calls: {0}")]
    BadSequenceOfCalls(String),

    #[error("bad file format: {0}")]
    BadFileFormat(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl JobError {
    /// The taxonomy kind of this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            JobError::NullPointer => ErrorCode::NullPointer,
            JobError::ParameterOutOfRange(_) => ErrorCode::ParameterOutOfRange,
            JobError::BadSequenceOfCalls(_) => ErrorCode::BadSequenceOfCalls,
            JobError::BadFileFormat(_) => ErrorCode::BadFileFormat,
            JobError::Internal(_) => ErrorCode::InternalError,
        }
    }

    /// Reconstruct an error from a recorded code, e.g. when reporting the
    /// failure of an awaited job.
    pub fn from_code(code: ErrorCode, message: impl Into<String>) -> Self {
        let message = message.into();
        match code {
            ErrorCode::NullPointer => JobError::NullPointer,
            ErrorCode::ParameterOutOfRange => JobError::ParameterOutOfRange(message),
            ErrorCode::BadSequenceOfCalls => JobError::BadSequenceOfCalls(message),
            ErrorCode::BadFileFormat => JobError::BadFileFormat(message),
            ErrorCode::Success | ErrorCode::InternalError => JobError::Internal(message),
        }
    }
}

impl From<serde_json::Error> for JobError {
    fn from(err: serde_json::Error) -> Self {
        JobError::BadFileFormat(err.to_string())
    }
}
