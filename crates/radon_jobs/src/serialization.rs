//! Reconstruction of serialized jobs.

use crate::job::Job;
use radon_protocol::JobError;
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

type JobConstructor = Box<dyn Fn(&Value) -> Result<Box<dyn Job>, JobError> + Send + Sync>;

/// Maps the `"Type"` tag of a serialized job document to the function
/// that rebuilds the job.
///
/// Job classes register themselves at startup; unknown tags are reported
/// as `BadFileFormat`.
#[derive(Default)]
pub struct UnserializerRegistry {
    constructors: HashMap<String, JobConstructor>,
}

impl UnserializerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, job_type: impl Into<String>, constructor: F)
    where
        F: Fn(&Value) -> Result<Box<dyn Job>, JobError> + Send + Sync + 'static,
    {
        let job_type = job_type.into();
        debug!("Registering job unserializer: {}", job_type);
        self.constructors.insert(job_type, Box::new(constructor));
    }

    pub fn unserialize(&self, document: &Value) -> Result<Box<dyn Job>, JobError> {
        let job_type = document
            .get("Type")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                JobError::BadFileFormat("serialized job without a 'Type' tag".to_string())
            })?;

        match self.constructors.get(job_type) {
            Some(constructor) => constructor(document),
            None => Err(JobError::BadFileFormat(format!(
                "unknown job type: '{job_type}'"
            ))),
        }
    }
}
