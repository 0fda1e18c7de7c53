//! Last observed status of a job.

use radon_protocol::{ErrorCode, JobError};

/// The `{error code, progress, description}` tuple recorded after every
/// step of a job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobStatus {
    error_code: ErrorCode,
    progress: f32,
    description: serde_json::Value,
}

impl Default for JobStatus {
    fn default() -> Self {
        Self {
            error_code: ErrorCode::Success,
            progress: 0.0,
            description: serde_json::Value::Object(Default::default()),
        }
    }
}

impl JobStatus {
    pub fn new(
        error_code: ErrorCode,
        progress: f32,
        description: serde_json::Value,
    ) -> Result<Self, JobError> {
        if !(0.0..=1.0).contains(&progress) {
            return Err(JobError::ParameterOutOfRange(format!(
                "progress {progress} outside [0, 1]"
            )));
        }
        Ok(Self {
            error_code,
            progress,
            description,
        })
    }

    pub fn error_code(&self) -> ErrorCode {
        self.error_code
    }

    pub fn progress(&self) -> f32 {
        self.progress
    }

    pub fn description(&self) -> &serde_json::Value {
        &self.description
    }

    pub(crate) fn set_error_code(&mut self, code: ErrorCode) {
        self.error_code = code;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_progress_bounds() {
        assert!(JobStatus::new(ErrorCode::Success, 0.0, json!({})).is_ok());
        assert!(JobStatus::new(ErrorCode::Success, 1.0, json!({})).is_ok());
    }

    #[test]
    fn rejects_out_of_range_progress() {
        let err = JobStatus::new(ErrorCode::Success, 1.5, json!({})).unwrap_err();
        assert_eq!(err.code(), ErrorCode::ParameterOutOfRange);
        let err = JobStatus::new(ErrorCode::Success, -0.1, json!({})).unwrap_err();
        assert_eq!(err.code(), ErrorCode::ParameterOutOfRange);
    }
}
