//! Immutable snapshot of a handler for external reporting.

use crate::handler::JobHandler;
use crate::status::JobStatus;
use chrono::{DateTime, Duration, Utc};
use radon_protocol::{ErrorCode, JobId, JobState};
use serde_json::json;

/// Everything the REST layer renders for `GET /jobs/{id}`.
#[derive(Debug, Clone)]
pub struct JobInfo {
    id: JobId,
    priority: i32,
    state: JobState,
    info_time: DateTime<Utc>,
    creation_time: DateTime<Utc>,
    runtime: Duration,
    eta: DateTime<Utc>,
    status: JobStatus,
}

impl JobInfo {
    pub(crate) fn from_handler(handler: &JobHandler) -> Self {
        let info_time = Utc::now();
        let status = handler.last_status().clone();

        // ETA = now + (1 - progress) x runtime, clamped at "now".
        let runtime = handler.runtime();
        let remaining_ms =
            ((1.0 - f64::from(status.progress())) * runtime.num_milliseconds() as f64).max(0.0);
        let eta = info_time + Duration::milliseconds(remaining_ms as i64);

        Self {
            id: handler.id().clone(),
            priority: handler.priority(),
            state: handler.state(),
            info_time,
            creation_time: handler.creation_time(),
            runtime,
            eta,
            status,
        }
    }

    pub fn id(&self) -> &JobId {
        &self.id
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn error_code(&self) -> ErrorCode {
        self.status.error_code()
    }

    pub fn info_time(&self) -> DateTime<Utc> {
        self.info_time
    }

    pub fn creation_time(&self) -> DateTime<Utc> {
        self.creation_time
    }

    /// Cumulative time spent in `Running`.
    pub fn runtime(&self) -> Duration {
        self.runtime
    }

    pub fn estimated_time_of_arrival(&self) -> DateTime<Utc> {
        self.eta
    }

    pub fn status(&self) -> &JobStatus {
        &self.status
    }

    /// The `/jobs/{id}` document.
    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "ID": self.id.as_str(),
            "Priority": self.priority,
            "State": self.state.as_str(),
            "ErrorCode": self.status.error_code().numeric(),
            "ErrorDescription": self.status.error_code().as_str(),
            "CreationTime": self.creation_time.to_rfc3339(),
            "Runtime": self.runtime.num_milliseconds(),
            "EstimatedTimeOfArrival": self.eta.to_rfc3339(),
            "Progress": f64::from(self.status.progress()),
            "Status": self.status.description().clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{Job, JobStepResult};
    use radon_protocol::JobError;

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
    fn eta_is_never_in_the_past() {
        let handler = JobHandler::new(Box::new(Nop), 7);
        let info = JobInfo::from_handler(&handler);
        assert!(info.estimated_time_of_arrival() >= info.info_time());
        assert_eq!(info.priority(), 7);
        assert_eq!(info.state(), JobState::Pending);
    }

    #[test]
    fn document_shape() {
        let handler = JobHandler::new(Box::new(Nop), 0);
        let doc = JobInfo::from_handler(&handler).to_json();
        assert_eq!(doc["ID"].as_str().unwrap(), handler.id().as_str());
        assert_eq!(doc["State"], "Pending");
        assert_eq!(doc["ErrorCode"], 0);
        assert_eq!(doc["ErrorDescription"], "Success");
        assert_eq!(doc["Runtime"], 0);
        assert!(doc["Status"].is_object());
    }
}
