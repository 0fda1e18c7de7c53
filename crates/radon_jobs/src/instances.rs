//! Multi-item jobs iterating a fixed sequence of instance identifiers.

use crate::job::{Job, JobStepResult};
use radon_protocol::JobError;
use serde_json::{json, Value};
use std::collections::BTreeSet;
use tracing::warn;

/// Domain logic of a [`SetOfInstancesJob`]: how one instance is handled
/// and what runs after the last one.
pub trait InstanceProcessor: Send {
    /// Tag identifying the job class in serialized documents.
    fn job_type(&self) -> &'static str;

    /// Process one instance. `Ok(false)` and `Err(_)` both count as a
    /// sub-step failure.
    fn handle_instance(&mut self, instance: &str) -> Result<bool, JobError>;

    /// Finalization step, run once after every instance when the job was
    /// created with a trailing step.
    fn handle_trailing_step(&mut self) -> Result<bool, JobError>;

    /// Release external handles before a pause.
    fn release_resources(&mut self) {}
}

/// A job iterating an ordered sequence of opaque instance identifiers,
/// plus an optional trailing finalization step.
///
/// In permissive mode a failing sub-step records the instance and moves
/// on; the job still terminates with success, and the failed set is
/// surfaced in the public status document. Non-permissive jobs stop at
/// the first sub-step failure.
pub struct SetOfInstancesJob<P: InstanceProcessor> {
    processor: P,
    has_trailing_step: bool,
    started: bool,
    instances: Vec<String>,
    permissive: bool,
    position: usize,
    failed_instances: BTreeSet<String>,
    description: String,
}

impl<P: InstanceProcessor> SetOfInstancesJob<P> {
    pub fn new(processor: P, has_trailing_step: bool) -> Self {
        Self {
            processor,
            has_trailing_step,
            started: false,
            instances: Vec::new(),
            permissive: false,
            position: 0,
            failed_instances: BTreeSet::new(),
            description: String::new(),
        }
    }

    /// Reconstruct a job from its serialization document.
    pub fn from_document(processor: P, document: &Value) -> Result<Self, JobError> {
        let expected = processor.job_type();
        let found = read_str(document, "Type")?;
        if found != expected {
            return Err(JobError::BadFileFormat(format!(
                "expected a document of type '{expected}', got '{found}'"
            )));
        }

        let instances = read_string_array(document, "Instances")?;
        let failed_instances: BTreeSet<String> = read_string_array(document, "FailedInstances")?
            .into_iter()
            .collect();
        let has_trailing_step = read_bool(document, "TrailingStep")?;
        let position = read_u64(document, "Position")? as usize;

        let steps = instances.len() + usize::from(has_trailing_step);
        if position > steps {
            return Err(JobError::BadFileFormat(format!(
                "position {position} beyond the {steps} steps of the job"
            )));
        }

        Ok(Self {
            processor,
            has_trailing_step,
            started: position > 0,
            instances,
            permissive: read_bool(document, "Permissive")?,
            position,
            failed_instances,
            description: read_str(document, "Description")?.to_string(),
        })
    }

    pub fn has_trailing_step(&self) -> bool {
        self.has_trailing_step
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = description.into();
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn reserve(&mut self, capacity: usize) {
        self.instances.reserve(capacity);
    }

    pub fn instances_count(&self) -> usize {
        self.instances.len()
    }

    /// Instances plus the trailing step, if any.
    pub fn steps_count(&self) -> usize {
        self.instances.len() + usize::from(self.has_trailing_step)
    }

    pub fn add_instance(&mut self, instance: impl Into<String>) -> Result<(), JobError> {
        if self.started {
            return Err(JobError::BadSequenceOfCalls(
                "cannot add instances to a started job".to_string(),
            ));
        }
        self.instances.push(instance.into());
        Ok(())
    }

    pub fn instance(&self, index: usize) -> Option<&str> {
        self.instances.get(index).map(String::as_str)
    }

    pub fn is_permissive(&self) -> bool {
        self.permissive
    }

    pub fn set_permissive(&mut self, permissive: bool) -> Result<(), JobError> {
        if self.started {
            return Err(JobError::BadSequenceOfCalls(
                "cannot change the permissive flag of a started job".to_string(),
            ));
        }
        self.permissive = permissive;
        Ok(())
    }

    pub fn failed_instances(&self) -> &BTreeSet<String> {
        &self.failed_instances
    }

    pub fn is_failed_instance(&self, instance: &str) -> bool {
        self.failed_instances.contains(instance)
    }

    /// Return the job to its initial position so it can run again after
    /// a full completion.
    pub fn reset(&mut self) {
        self.started = false;
        self.position = 0;
        self.failed_instances.clear();
    }

    pub fn processor(&self) -> &P {
        &self.processor
    }
}

impl<P: InstanceProcessor> Job for SetOfInstancesJob<P> {
    fn execute_step(&mut self) -> Result<JobStepResult, JobError> {
        self.started = true;

        let steps = self.steps_count();
        if self.position >= steps {
            // Nothing left to handle (including the empty job).
            return Ok(JobStepResult::Success);
        }

        if self.position < self.instances.len() {
            let instance = self.instances[self.position].clone();
            let outcome = self.processor.handle_instance(&instance);
            match outcome {
                Ok(true) => {}
                Ok(false) => {
                    if self.permissive {
                        warn!("Ignoring the failed instance: {}", instance);
                        self.failed_instances.insert(instance);
                    } else {
                        return Ok(JobStepResult::Failure);
                    }
                }
                Err(err) => {
                    if self.permissive {
                        warn!("Ignoring the failed instance {}: {}", instance, err);
                        self.failed_instances.insert(instance);
                    } else {
                        return Err(err);
                    }
                }
            }
        } else if !self.processor.handle_trailing_step()? {
            return Ok(JobStepResult::Failure);
        }

        self.position += 1;
        if self.position == steps {
            Ok(JobStepResult::Success)
        } else {
            Ok(JobStepResult::Continue)
        }
    }

    fn release_resources(&mut self) {
        self.processor.release_resources();
    }

    fn progress(&self) -> f32 {
        let steps = self.steps_count();
        if steps == 0 {
            1.0
        } else {
            self.position as f32 / steps as f32
        }
    }

    fn format_status(&self) -> Value {
        json!({
            "Description": self.description,
            "InstancesCount": self.instances.len(),
            "FailedInstancesCount": self.failed_instances.len(),
            "FailedInstances": self.failed_instances.iter().collect::<Vec<_>>(),
        })
    }

    fn serialize(&self) -> Option<Value> {
        Some(json!({
            "Type": self.processor.job_type(),
            "Permissive": self.permissive,
            "Position": self.position,
            "Instances": self.instances,
            "FailedInstances": self.failed_instances.iter().collect::<Vec<_>>(),
            "TrailingStep": self.has_trailing_step,
            "Description": self.description,
        }))
    }
}

fn read_str<'a>(document: &'a Value, key: &str) -> Result<&'a str, JobError> {
    document
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| JobError::BadFileFormat(format!("missing or invalid field '{key}'")))
}

fn read_bool(document: &Value, key: &str) -> Result<bool, JobError> {
    document
        .get(key)
        .and_then(Value::as_bool)
        .ok_or_else(|| JobError::BadFileFormat(format!("missing or invalid field '{key}'")))
}

fn read_u64(document: &Value, key: &str) -> Result<u64, JobError> {
    document
        .get(key)
        .and_then(Value::as_u64)
        .ok_or_else(|| JobError::BadFileFormat(format!("missing or invalid field '{key}'")))
}

fn read_string_array(document: &Value, key: &str) -> Result<Vec<String>, JobError> {
    let items = document
        .get(key)
        .and_then(Value::as_array)
        .ok_or_else(|| JobError::BadFileFormat(format!("missing or invalid field '{key}'")))?;
    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(str::to_string)
                .ok_or_else(|| JobError::BadFileFormat(format!("non-string entry in '{key}'")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records handled instances; identifiers containing "bad" fail.
    struct Recorder {
        handled: Vec<String>,
        trailing_done: bool,
    }

    impl Recorder {
        fn new() -> Self {
            Self {
                handled: Vec::new(),
                trailing_done: false,
            }
        }
    }

    impl InstanceProcessor for Recorder {
        fn job_type(&self) -> &'static str {
            "Recorder"
        }

        fn handle_instance(&mut self, instance: &str) -> Result<bool, JobError> {
            self.handled.push(instance.to_string());
            Ok(!instance.contains("bad"))
        }

        fn handle_trailing_step(&mut self) -> Result<bool, JobError> {
            self.trailing_done = true;
            Ok(true)
        }
    }

    fn job_with(instances: &[&str], trailing: bool) -> SetOfInstancesJob<Recorder> {
        let mut job = SetOfInstancesJob::new(Recorder::new(), trailing);
        for instance in instances {
            job.add_instance(*instance).unwrap();
        }
        job
    }

    fn run_to_completion(job: &mut SetOfInstancesJob<Recorder>) -> JobStepResult {
        loop {
            match job.execute_step().unwrap_or(JobStepResult::Failure) {
                JobStepResult::Continue => {}
                other => return other,
            }
        }
    }

    #[test]
    fn steps_through_all_instances() {
        let mut job = job_with(&["a", "b", "c"], false);
        assert_eq!(job.steps_count(), 3);
        assert_eq!(job.progress(), 0.0);

        assert_eq!(job.execute_step().unwrap(), JobStepResult::Continue);
        assert_eq!(job.execute_step().unwrap(), JobStepResult::Continue);
        assert!((job.progress() - 2.0 / 3.0).abs() < 1e-6);
        assert_eq!(job.execute_step().unwrap(), JobStepResult::Success);
        assert_eq!(job.progress(), 1.0);
        assert_eq!(job.processor().handled, vec!["a", "b", "c"]);
    }

    #[test]
    fn trailing_step_runs_last() {
        let mut job = job_with(&["a"], true);
        assert_eq!(job.steps_count(), 2);

        assert_eq!(job.execute_step().unwrap(), JobStepResult::Continue);
        assert!(!job.processor().trailing_done);
        assert_eq!(job.execute_step().unwrap(), JobStepResult::Success);
        assert!(job.processor().trailing_done);
    }

    #[test]
    fn empty_job_succeeds_immediately() {
        let mut job = job_with(&[], false);
        assert_eq!(job.progress(), 1.0);
        assert_eq!(job.execute_step().unwrap(), JobStepResult::Success);
    }

    #[test]
    fn non_permissive_job_stops_at_first_failure() {
        let mut job = job_with(&["a", "bad1", "c"], false);
        assert_eq!(run_to_completion(&mut job), JobStepResult::Failure);
        assert_eq!(job.processor().handled, vec!["a", "bad1"]);
        assert!(job.failed_instances().is_empty());
    }

    #[test]
    fn permissive_job_records_failures_and_succeeds() {
        let mut job = job_with(&["a", "bad1", "c", "bad2"], false);
        job.set_permissive(true).unwrap();

        assert_eq!(run_to_completion(&mut job), JobStepResult::Success);
        assert_eq!(job.failed_instances().len(), 2);
        assert!(job.is_failed_instance("bad1"));
        assert!(job.is_failed_instance("bad2"));
        assert!(!job.is_failed_instance("a"));

        let status = job.format_status();
        assert_eq!(status["InstancesCount"], 4);
        assert_eq!(status["FailedInstancesCount"], 2);
        assert_eq!(status["FailedInstances"][0], "bad1");
    }

    #[test]
    fn permissive_flag_frozen_after_start() {
        let mut job = job_with(&["a", "b"], false);
        assert_eq!(job.execute_step().unwrap(), JobStepResult::Continue);

        assert!(job.set_permissive(true).is_err());
        assert!(job.add_instance("c").is_err());
    }

    #[test]
    fn reset_allows_a_second_run() {
        let mut job = job_with(&["a", "bad1"], false);
        job.set_permissive(true).unwrap();
        assert_eq!(run_to_completion(&mut job), JobStepResult::Success);

        job.reset();
        assert_eq!(job.position(), 0);
        assert!(job.failed_instances().is_empty());
        assert!(!job.is_started());
        assert_eq!(run_to_completion(&mut job), JobStepResult::Success);
    }

    #[test]
    fn serialization_round_trip_is_byte_equal() {
        let mut job = job_with(&["a", "bad1", "c"], true);
        job.set_permissive(true).unwrap();
        job.set_description("round trip");
        assert_eq!(job.execute_step().unwrap(), JobStepResult::Continue);
        assert_eq!(job.execute_step().unwrap(), JobStepResult::Continue);

        let first = job.serialize().unwrap();
        let restored = SetOfInstancesJob::from_document(Recorder::new(), &first).unwrap();
        let second = restored.serialize().unwrap();

        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
        assert_eq!(restored.position(), 2);
        assert!(restored.is_started());
        assert!(restored.is_permissive());
        assert!(restored.is_failed_instance("bad1"));
    }

    #[test]
    fn rejects_malformed_documents() {
        let missing = json!({ "Type": "Recorder", "Permissive": false });
        assert!(SetOfInstancesJob::from_document(Recorder::new(), &missing).is_err());

        let wrong_type = json!({
            "Type": "SomethingElse",
            "Permissive": false,
            "Position": 0,
            "Instances": [],
            "FailedInstances": [],
            "TrailingStep": false,
            "Description": "",
        });
        assert!(SetOfInstancesJob::from_document(Recorder::new(), &wrong_type).is_err());

        let bad_position = json!({
            "Type": "Recorder",
            "Permissive": false,
            "Position": 5,
            "Instances": ["a"],
            "FailedInstances": [],
            "TrailingStep": false,
            "Description": "",
        });
        assert!(SetOfInstancesJob::from_document(Recorder::new(), &bad_position).is_err());
    }
}
