use std::collections::BTreeMap;
use std::path::Path;

use ezbatch_job::{JobDescriptor, MountValidator};
use ezbatch_resolver::{ResolveError, resolve};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::WorkflowError;
use crate::submit::SubmissionRecord;

/// A named graph of jobs and their dependency edges.
///
/// Dependency edges point at prerequisites: `{"b": ["a"]}` means `b` runs
/// after `a`. Only `name`, `jobs` and `dependencies` are persisted; the
/// session record of the last submission is not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
  pub(crate) name: String,
  pub(crate) jobs: BTreeMap<String, JobDescriptor>,
  #[serde(default)]
  pub(crate) dependencies: BTreeMap<String, Vec<String>>,
  #[serde(skip)]
  pub(crate) session: SubmissionRecord,
}

impl Workflow {
  /// Create a workflow. Every key and value in `dependencies` must be a job key.
  pub fn new(
    name: impl Into<String>,
    jobs: BTreeMap<String, JobDescriptor>,
    dependencies: BTreeMap<String, Vec<String>>,
  ) -> Result<Self, WorkflowError> {
    let workflow = Self {
      name: name.into(),
      jobs,
      dependencies,
      session: SubmissionRecord::default(),
    };
    workflow.check_dependencies()?;
    Ok(workflow)
  }

  fn check_dependencies(&self) -> Result<(), WorkflowError> {
    for (job, deps) in &self.dependencies {
      if !self.jobs.contains_key(job) {
        return Err(WorkflowError::UnknownJob { job: job.clone() });
      }
      if let Some(dependency) = deps.iter().find(|d| !self.jobs.contains_key(*d)) {
        return Err(WorkflowError::UnknownDependency {
          job: job.clone(),
          dependency: dependency.clone(),
        });
      }
    }
    Ok(())
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn jobs(&self) -> &BTreeMap<String, JobDescriptor> {
    &self.jobs
  }

  pub fn job(&self, key: &str) -> Option<&JobDescriptor> {
    self.jobs.get(key)
  }

  pub fn dependencies(&self) -> &BTreeMap<String, Vec<String>> {
    &self.dependencies
  }

  /// Bookkeeping from the most recent `submit` call, complete or not.
  pub fn session(&self) -> &SubmissionRecord {
    &self.session
  }

  /// The order jobs would be submitted in.
  pub fn submission_order(&self) -> Result<Vec<String>, ResolveError> {
    resolve(self.jobs.keys(), &self.dependencies)
  }

  /// Write the snapshot as pretty JSON.
  pub async fn save(&self, path: impl AsRef<Path>) -> Result<(), WorkflowError> {
    let path = path.as_ref();
    let json = serde_json::to_string_pretty(self).map_err(|source| WorkflowError::Json {
      path: path.to_path_buf(),
      source,
    })?;
    tokio::fs::write(path, json)
      .await
      .map_err(|source| WorkflowError::Io {
        path: path.to_path_buf(),
        source,
      })?;
    info!(workflow = %self.name, path = %path.display(), "workflow_saved");
    Ok(())
  }

  /// Read a snapshot and check its structure, without probing any mounts.
  pub async fn read(path: impl AsRef<Path>) -> Result<Self, WorkflowError> {
    let path = path.as_ref();
    let content = tokio::fs::read_to_string(path)
      .await
      .map_err(|source| WorkflowError::Io {
        path: path.to_path_buf(),
        source,
      })?;
    let snapshot: Workflow = serde_json::from_str(&content).map_err(|source| WorkflowError::Json {
      path: path.to_path_buf(),
      source,
    })?;
    Self::new(snapshot.name, snapshot.jobs, snapshot.dependencies)
  }

  /// Read a snapshot and validate every job's mounts.
  pub async fn load(
    path: impl AsRef<Path>,
    validator: &MountValidator<'_>,
  ) -> Result<Self, WorkflowError> {
    let workflow = Self::read(path).await?;
    for (key, job) in &workflow.jobs {
      job
        .validate(validator)
        .await
        .map_err(|source| WorkflowError::Validation {
          job: key.clone(),
          source,
        })?;
    }
    info!(workflow = %workflow.name, jobs = workflow.jobs.len(), "workflow_loaded");
    Ok(workflow)
  }
}

/// Compares the persisted fields only.
impl PartialEq for Workflow {
  fn eq(&self, other: &Self) -> bool {
    self.name == other.name && self.jobs == other.jobs && self.dependencies == other.dependencies
  }
}

impl Eq for Workflow {}

#[cfg(test)]
mod tests {
  use ezbatch_config::Settings;
  use ezbatch_job::MountDescriptor;
  use ezbatch_remote::StaticProbe;

  use super::*;

  async fn job(image: &str) -> JobDescriptor {
    let probe = StaticProbe::permissive();
    JobDescriptor::builder(image, "true")
      .build(&MountValidator::new(&probe, &Settings::default()))
      .await
      .unwrap()
  }

  fn deps(edges: &[(&str, &[&str])]) -> BTreeMap<String, Vec<String>> {
    edges
      .iter()
      .map(|(job, deps)| (job.to_string(), deps.iter().map(|d| d.to_string()).collect()))
      .collect()
  }

  #[tokio::test]
  async fn test_new_rejects_unknown_dependency() {
    let jobs = BTreeMap::from([("a".to_string(), job("ubuntu").await)]);

    let result = Workflow::new("wf", jobs.clone(), deps(&[("a", &["ghost"])]));
    assert!(matches!(
      result,
      Err(WorkflowError::UnknownDependency { job, dependency }) if job == "a" && dependency == "ghost"
    ));

    let result = Workflow::new("wf", jobs, deps(&[("ghost", &["a"])]));
    assert!(matches!(result, Err(WorkflowError::UnknownJob { job }) if job == "ghost"));
  }

  #[tokio::test]
  async fn test_submission_order() {
    let jobs = BTreeMap::from([
      ("extract".to_string(), job("etl/extract").await),
      ("load".to_string(), job("etl/load").await),
      ("transform".to_string(), job("etl/transform").await),
    ]);
    let workflow = Workflow::new(
      "etl",
      jobs,
      deps(&[("load", &["transform"]), ("transform", &["extract"])]),
    )
    .unwrap();

    assert_eq!(
      workflow.submission_order().unwrap(),
      vec!["extract", "transform", "load"]
    );
  }

  #[tokio::test]
  async fn test_snapshot_layout() {
    let jobs = BTreeMap::from([("a".to_string(), job("ubuntu").await)]);
    let workflow = Workflow::new("wf", jobs, BTreeMap::new()).unwrap();

    let json = serde_json::to_value(&workflow).unwrap();
    let object = json.as_object().unwrap();
    assert_eq!(object.len(), 3);
    assert_eq!(json["name"], "wf");
    assert_eq!(json["jobs"]["a"]["image"], "ubuntu");
    assert_eq!(json["jobs"]["a"]["memoryMiB"], 2048);
    assert_eq!(json["dependencies"], serde_json::json!({}));
  }

  #[tokio::test]
  async fn test_load_validates_mounts() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("workflow.json");

    let permissive = StaticProbe::permissive();
    let settings = Settings::default();
    let job = JobDescriptor::builder("ubuntu", "true")
      .read_mount(MountDescriptor::new("s3://bucket/input", "/mnt/input"))
      .build(&MountValidator::new(&permissive, &settings))
      .await
      .unwrap();
    let workflow =
      Workflow::new("wf", BTreeMap::from([("a".to_string(), job)]), BTreeMap::new()).unwrap();
    workflow.save(&path).await.unwrap();

    let missing = StaticProbe {
      readable: false,
      writable: true,
    };
    let result = Workflow::load(&path, &MountValidator::new(&missing, &settings)).await;
    assert!(matches!(result, Err(WorkflowError::Validation { job, .. }) if job == "a"));

    let loaded = Workflow::read(&path).await.unwrap();
    assert_eq!(loaded, workflow);
  }

  #[tokio::test]
  async fn test_read_rejects_bad_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("workflow.json");

    tokio::fs::write(&path, "{ not json").await.unwrap();
    assert!(matches!(Workflow::read(&path).await, Err(WorkflowError::Json { .. })));

    tokio::fs::write(
      &path,
      r#"{"name": "wf", "jobs": {}, "dependencies": {"a": []}}"#,
    )
    .await
    .unwrap();
    assert!(matches!(
      Workflow::read(&path).await,
      Err(WorkflowError::UnknownJob { .. })
    ));

    let missing = dir.path().join("missing.json");
    assert!(matches!(Workflow::read(&missing).await, Err(WorkflowError::Io { .. })));
  }
}
