use std::collections::BTreeMap;

use ezbatch_job::JobDescriptor;
use ezbatch_remote::{JobControl, RemoteError, SubmitRequest};
use serde::Serialize;
use tracing::{error, info, instrument, warn};

use crate::error::{CleanupError, DeregisterFailure, SubmitError};
use crate::run_id::RunIdGenerator;
use crate::workflow::Workflow;

pub const TAG_WORKFLOW_NAME: &str = "workflowName";
pub const TAG_JOB: &str = "job";
pub const TAG_WORKFLOW_ID: &str = "ezbatchWorkflowId";
pub const TAG_JOB_ID: &str = "ezbatchJobId";

/// Bookkeeping for one `submit` call. All maps are keyed by job key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionRecord {
  pub workflow: String,
  pub run_id: String,
  /// Submission order.
  pub order: Vec<String>,
  /// `{workflow}-{runId}-{jobKey}-{jobRunId}`.
  pub names: BTreeMap<String, String>,
  pub definition_ids: BTreeMap<String, String>,
  /// Full names of each job's prerequisites.
  pub dependency_names: BTreeMap<String, Vec<String>>,
  pub submission_ids: BTreeMap<String, String>,
}

/// Where submission stopped, before cleanup is accounted for.
enum Abort {
  Register { job: String, source: RemoteError },
  Submit { job: String, source: RemoteError },
  Unregistered { job: String },
}

impl Workflow {
  /// Register a definition per job, submit the jobs in dependency order,
  /// then deregister every registered definition.
  ///
  /// The order and the queue of every job are checked before any remote
  /// call. Cleanup runs whether or not registration and submission
  /// succeeded. Submitted jobs are left running.
  #[instrument(
    name = "workflow_submit",
    skip(self, control, ids, default_queue),
    fields(workflow = %self.name, default_queue = ?default_queue)
  )]
  pub async fn submit(
    &mut self,
    control: &dyn JobControl,
    ids: &dyn RunIdGenerator,
    default_queue: Option<&str>,
  ) -> Result<SubmissionRecord, SubmitError> {
    self.session = SubmissionRecord {
      workflow: self.name.clone(),
      ..SubmissionRecord::default()
    };

    let order = self.submission_order()?;
    let queues = self.queues(default_queue)?;

    let run_id = ids.generate();
    let stamped = self.stamp(&run_id, ids);
    self.session.run_id = run_id;
    self.session.order = order;

    info!(
      workflow = %self.name,
      run_id = %self.session.run_id,
      jobs = stamped.len(),
      "workflow_submission_started"
    );

    let outcome = match self.register_all(control, &stamped).await {
      Ok(()) => self.submit_all(control, &stamped, &queues).await,
      Err(abort) => Err(abort),
    };
    let cleanup = self.deregister_all(control).await;

    match (outcome, cleanup) {
      (Ok(()), None) => {
        info!(
          workflow = %self.name,
          run_id = %self.session.run_id,
          "workflow_submission_completed"
        );
        Ok(self.session.clone())
      }
      (Ok(()), Some(cleanup)) => {
        error!(workflow = %self.name, error = %cleanup, "workflow_cleanup_failed");
        Err(SubmitError::Cleanup(cleanup))
      }
      (Err(abort), cleanup) => {
        let err = match abort {
          Abort::Register { job, source } => SubmitError::Register {
            job,
            source,
            cleanup,
          },
          Abort::Submit { job, source } => SubmitError::Submit {
            job,
            source,
            cleanup,
          },
          Abort::Unregistered { job } => SubmitError::Unregistered { job, cleanup },
        };
        error!(workflow = %self.name, error = %err, "workflow_submission_failed");
        Err(err)
      }
    }
  }

  /// Queue per job: its override, else the default.
  fn queues(&self, default_queue: Option<&str>) -> Result<BTreeMap<String, String>, SubmitError> {
    self
      .jobs
      .iter()
      .map(|(key, job)| {
        job
          .queue_override()
          .or(default_queue)
          .map(|queue| (key.clone(), queue.to_string()))
          .ok_or_else(|| SubmitError::MissingQueue { job: key.clone() })
      })
      .collect()
  }

  /// Private copies of every job carrying their full name and identity tags.
  fn stamp(&mut self, run_id: &str, ids: &dyn RunIdGenerator) -> BTreeMap<String, JobDescriptor> {
    let mut stamped = BTreeMap::new();
    for (key, job) in &self.jobs {
      let job_run_id = ids.generate();
      let name = format!("{}-{run_id}-{key}-{job_run_id}", self.name);
      let tags = [
        (TAG_WORKFLOW_NAME, self.name.clone()),
        (TAG_JOB, key.clone()),
        (TAG_WORKFLOW_ID, run_id.to_string()),
        (TAG_JOB_ID, job_run_id),
      ];
      self.session.names.insert(key.clone(), name.clone());
      stamped.insert(key.clone(), job.stamped(name, tags));
    }
    stamped
  }

  async fn register_all(
    &mut self,
    control: &dyn JobControl,
    stamped: &BTreeMap<String, JobDescriptor>,
  ) -> Result<(), Abort> {
    for (key, job) in stamped {
      let payload = job.to_definition();
      match control.register_definition(&payload).await {
        Ok(definition_id) => {
          info!(job = %key, definition = %payload.job_name, %definition_id, "job_definition_registered");
          self.session.definition_ids.insert(key.clone(), definition_id);
        }
        Err(source) => {
          error!(job = %key, error = %source, "job_definition_registration_failed");
          return Err(Abort::Register {
            job: key.clone(),
            source,
          });
        }
      }
    }
    Ok(())
  }

  async fn submit_all(
    &mut self,
    control: &dyn JobControl,
    stamped: &BTreeMap<String, JobDescriptor>,
    queues: &BTreeMap<String, String>,
  ) -> Result<(), Abort> {
    let order = self.session.order.clone();
    for key in &order {
      let (Some(job), Some(queue), Some(definition_id)) = (
        stamped.get(key),
        queues.get(key),
        self.session.definition_ids.get(key),
      ) else {
        error!(job = %key, "job_not_registered");
        return Err(Abort::Unregistered { job: key.clone() });
      };

      let mut prerequisites: Vec<&String> = Vec::new();
      for dep in self.dependencies.get(key).into_iter().flatten() {
        if !prerequisites.contains(&dep) {
          prerequisites.push(dep);
        }
      }
      // Every prerequisite precedes its dependents in `order`.
      let depends_on: Vec<String> = prerequisites
        .iter()
        .filter_map(|dep| self.session.submission_ids.get(*dep).cloned())
        .collect();
      let dependency_names: Vec<String> = prerequisites
        .iter()
        .filter_map(|dep| self.session.names.get(*dep).cloned())
        .collect();

      let name = job.definition_name();
      let request = SubmitRequest {
        name,
        queue,
        definition_id,
        depends_on: &depends_on,
        tags: job.tags(),
      };

      match control.submit_job(&request).await {
        Ok(submission_id) => {
          info!(
            job = %key,
            %name,
            %queue,
            depends_on = ?depends_on,
            %submission_id,
            "job_submitted"
          );
          self.session.dependency_names.insert(key.clone(), dependency_names);
          self.session.submission_ids.insert(key.clone(), submission_id);
        }
        Err(source) => {
          error!(job = %key, %name, error = %source, "job_submission_failed");
          return Err(Abort::Submit {
            job: key.clone(),
            source,
          });
        }
      }
    }
    Ok(())
  }

  /// Deregister every definition registered in this session, collecting
  /// failures instead of stopping at the first.
  async fn deregister_all(&self, control: &dyn JobControl) -> Option<CleanupError> {
    let mut failures = Vec::new();
    for (key, definition_id) in &self.session.definition_ids {
      match control.deregister_definition(definition_id).await {
        Ok(()) => info!(job = %key, %definition_id, "job_definition_deregistered"),
        Err(source) => {
          warn!(job = %key, %definition_id, error = %source, "job_definition_deregistration_failed");
          failures.push(DeregisterFailure {
            job: key.clone(),
            definition_id: definition_id.clone(),
            source,
          });
        }
      }
    }
    (!failures.is_empty()).then_some(CleanupError { failures })
  }
}
