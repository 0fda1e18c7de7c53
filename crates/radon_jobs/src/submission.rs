//! Submission contract between the REST handlers and the registry.
//!
//! The HTTP dispatcher lives elsewhere; this module owns the semantics
//! of a command-style submission body and the shape of the responses.

use crate::instances::{InstanceProcessor, SetOfInstancesJob};
use crate::registry::JobsRegistry;
use radon_protocol::{JobError, JobId};
use serde_json::{json, Value};

const KEY_PERMISSIVE: &str = "Permissive";
const KEY_PRIORITY: &str = "Priority";
const KEY_SYNCHRONOUS: &str = "Synchronous";
const KEY_ASYNCHRONOUS: &str = "Asynchronous";

/// Options carried by a submission body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmissionOptions {
    /// Continue past per-item failures.
    pub permissive: bool,
    /// Larger is higher.
    pub priority: i32,
    /// `None` defers to the job type's default.
    pub synchronous: Option<bool>,
}

impl Default for SubmissionOptions {
    fn default() -> Self {
        Self {
            permissive: false,
            priority: 0,
            synchronous: None,
        }
    }
}

impl SubmissionOptions {
    /// Parse a submission body. A missing body (`null`) means all
    /// defaults; anything else must be a JSON object with correctly
    /// typed keys.
    pub fn from_body(body: &Value) -> Result<Self, JobError> {
        if body.is_null() {
            return Ok(Self::default());
        }

        let object = body.as_object().ok_or_else(|| {
            JobError::BadFileFormat("submission body is not a JSON object".to_string())
        })?;

        let mut options = Self::default();

        if let Some(value) = object.get(KEY_PERMISSIVE) {
            options.permissive = value.as_bool().ok_or_else(|| bad_key(KEY_PERMISSIVE))?;
        }

        if let Some(value) = object.get(KEY_PRIORITY) {
            let priority = value.as_i64().ok_or_else(|| bad_key(KEY_PRIORITY))?;
            options.priority = i32::try_from(priority)
                .map_err(|_| JobError::ParameterOutOfRange(format!("priority {priority}")))?;
        }

        // "Synchronous" wins over "Asynchronous" when both are present.
        if let Some(value) = object.get(KEY_SYNCHRONOUS) {
            options.synchronous = Some(value.as_bool().ok_or_else(|| bad_key(KEY_SYNCHRONOUS))?);
        } else if let Some(value) = object.get(KEY_ASYNCHRONOUS) {
            options.synchronous =
                Some(!value.as_bool().ok_or_else(|| bad_key(KEY_ASYNCHRONOUS))?);
        }

        Ok(options)
    }

    pub fn is_synchronous(&self, default_synchronous: bool) -> bool {
        self.synchronous.unwrap_or(default_synchronous)
    }
}

fn bad_key(key: &str) -> JobError {
    JobError::BadFileFormat(format!("field '{key}' has the wrong type"))
}

/// What the REST dispatcher sends back.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmissionOutcome {
    /// Synchronous execution succeeded; the job's final status document.
    Completed(Value),
    /// The job was queued; the caller polls `/jobs/{id}`.
    Accepted { id: JobId, path: String },
}

impl SubmissionOutcome {
    pub fn to_json(&self) -> Value {
        match self {
            SubmissionOutcome::Completed(document) => document.clone(),
            SubmissionOutcome::Accepted { id, path } => json!({
                "ID": id.as_str(),
                "Path": path,
            }),
        }
    }
}

/// Submit a command-style job built by a REST handler.
///
/// `job` is `None` when the handler could not build one, reported as
/// `NullPointer`. A synchronous submission blocks until the job
/// terminates and surfaces a failure as an error (HTTP 500 at the
/// dispatcher); an asynchronous one returns the id immediately.
pub fn submit_instances_job<P>(
    registry: &JobsRegistry,
    job: Option<SetOfInstancesJob<P>>,
    default_synchronous: bool,
    body: &Value,
) -> Result<SubmissionOutcome, JobError>
where
    P: InstanceProcessor + 'static,
{
    let mut job = job.ok_or(JobError::NullPointer)?;
    let options = SubmissionOptions::from_body(body)?;

    job.set_description("REST API");
    job.set_permissive(options.permissive)?;

    if options.is_synchronous(default_synchronous) {
        let document = registry.submit_and_wait(Box::new(job), options.priority)?;
        Ok(SubmissionOutcome::Completed(document))
    } else {
        let id = registry.submit(Box::new(job), options.priority);
        let path = format!("/jobs/{id}");
        Ok(SubmissionOutcome::Accepted { id, path })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use radon_protocol::ErrorCode;
    use serde_json::json;

    #[test]
    fn defaults_when_body_is_empty() {
        for body in [json!(null), json!({})] {
            let options = SubmissionOptions::from_body(&body).unwrap();
            assert!(!options.permissive);
            assert_eq!(options.priority, 0);
            assert_eq!(options.synchronous, None);
            assert!(options.is_synchronous(true));
            assert!(!options.is_synchronous(false));
        }
    }

    #[test]
    fn parses_all_keys() {
        let body = json!({ "Permissive": true, "Priority": -3, "Synchronous": false });
        let options = SubmissionOptions::from_body(&body).unwrap();
        assert!(options.permissive);
        assert_eq!(options.priority, -3);
        assert_eq!(options.synchronous, Some(false));
    }

    #[test]
    fn asynchronous_key_is_inverted() {
        let body = json!({ "Asynchronous": true });
        let options = SubmissionOptions::from_body(&body).unwrap();
        assert_eq!(options.synchronous, Some(false));
    }

    #[test]
    fn synchronous_wins_over_asynchronous() {
        let body = json!({ "Synchronous": true, "Asynchronous": true });
        let options = SubmissionOptions::from_body(&body).unwrap();
        assert_eq!(options.synchronous, Some(true));
    }

    #[test]
    fn rejects_malformed_bodies() {
        let err = SubmissionOptions::from_body(&json!([1, 2])).unwrap_err();
        assert_eq!(err.code(), ErrorCode::BadFileFormat);

        let err = SubmissionOptions::from_body(&json!({ "Permissive": "yes" })).unwrap_err();
        assert_eq!(err.code(), ErrorCode::BadFileFormat);

        let err = SubmissionOptions::from_body(&json!({ "Priority": "high" })).unwrap_err();
        assert_eq!(err.code(), ErrorCode::BadFileFormat);

        let err =
            SubmissionOptions::from_body(&json!({ "Priority": 1_i64 << 40 })).unwrap_err();
        assert_eq!(err.code(), ErrorCode::ParameterOutOfRange);
    }

    #[test]
    fn accepted_document_shape() {
        let id = JobId::new();
        let outcome = SubmissionOutcome::Accepted {
            path: format!("/jobs/{id}"),
            id: id.clone(),
        };
        let document = outcome.to_json();
        assert_eq!(document["ID"].as_str().unwrap(), id.as_str());
        assert_eq!(
            document["Path"].as_str().unwrap(),
            format!("/jobs/{}", id.as_str())
        );
    }
}
