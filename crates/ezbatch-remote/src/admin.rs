use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use ezbatch_config::{Platform, Settings};
use serde::Serialize;
use tracing::info;

use crate::error::{Operation, RemoteError};

/// Whether a compute environment or job queue accepts work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResourceState {
  Enabled,
  Disabled,
}

impl ResourceState {
  pub fn toggled(self) -> Self {
    match self {
      ResourceState::Enabled => ResourceState::Disabled,
      ResourceState::Disabled => ResourceState::Enabled,
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      ResourceState::Enabled => "ENABLED",
      ResourceState::Disabled => "DISABLED",
    }
  }

  /// Parse the provider's `ENABLED`/`DISABLED` wire value.
  pub fn parse(value: &str) -> Option<Self> {
    match value {
      "ENABLED" => Some(ResourceState::Enabled),
      "DISABLED" => Some(ResourceState::Disabled),
      _ => None,
    }
  }
}

impl fmt::Display for ResourceState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A managed compute environment to create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputeEnvironmentSpec {
  pub name: String,
  pub platform: Platform,
  pub max_vcpus: u32,
  pub subnets: Vec<String>,
  pub security_group_ids: Vec<String>,
  pub service_role: Option<String>,
  /// Only EC2 environments use an instance role.
  pub instance_role: Option<String>,
  pub tags: BTreeMap<String, String>,
}

impl ComputeEnvironmentSpec {
  /// A spec named `name` with every other field taken from `settings`.
  pub fn from_settings(name: impl Into<String>, platform: Platform, settings: &Settings) -> Self {
    Self {
      name: name.into(),
      platform,
      max_vcpus: settings.max_vcpus,
      subnets: settings.subnets.clone(),
      security_group_ids: settings.security_group_ids.clone(),
      service_role: settings.service_role.clone(),
      instance_role: settings.instance_role.clone(),
      tags: BTreeMap::new(),
    }
  }
}

/// A job queue to create, fed by a single compute environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSpec {
  pub name: String,
  /// Compute environment name or ARN.
  pub compute_environment: String,
  pub tags: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputeEnvironmentSummary {
  pub name: String,
  pub arn: String,
  pub state: ResourceState,
  /// `FARGATE`, `EC2`, or a spot variant.
  pub kind: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub max_vcpus: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueSummary {
  pub name: String,
  pub arn: String,
  pub state: ResourceState,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub priority: Option<i32>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub status: Option<String>,
  /// Name of the first compute environment feeding the queue.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub compute_environment: Option<String>,
}

/// Compute environment and job queue management.
#[async_trait]
pub trait BatchAdmin: Send + Sync {
  /// Create an ENABLED managed compute environment and return its ARN.
  async fn create_compute_environment(
    &self,
    spec: &ComputeEnvironmentSpec,
  ) -> Result<String, RemoteError>;

  async fn compute_environments(&self) -> Result<Vec<ComputeEnvironmentSummary>, RemoteError>;

  /// Look up one compute environment by name or ARN.
  async fn compute_environment(
    &self,
    name: &str,
  ) -> Result<Option<ComputeEnvironmentSummary>, RemoteError>;

  async fn set_compute_environment_state(
    &self,
    name: &str,
    state: ResourceState,
  ) -> Result<(), RemoteError>;

  async fn delete_compute_environment(&self, name: &str) -> Result<(), RemoteError>;

  /// Create an ENABLED job queue and return its ARN.
  async fn create_queue(&self, spec: &QueueSpec) -> Result<String, RemoteError>;

  async fn queues(&self) -> Result<Vec<QueueSummary>, RemoteError>;

  /// Look up one job queue by name or ARN.
  async fn queue(&self, name: &str) -> Result<Option<QueueSummary>, RemoteError>;

  async fn set_queue_state(&self, name: &str, state: ResourceState) -> Result<(), RemoteError>;

  async fn delete_queue(&self, name: &str) -> Result<(), RemoteError>;

  /// Flip a compute environment between ENABLED and DISABLED and return the
  /// new state.
  async fn toggle_compute_environment(&self, name: &str) -> Result<ResourceState, RemoteError> {
    let current = self.compute_environment(name).await?.ok_or_else(|| {
      RemoteError::new(
        Operation::UpdateComputeEnvironment,
        format!("compute environment {name} does not exist"),
      )
    })?;
    let state = current.state.toggled();
    self.set_compute_environment_state(name, state).await?;
    info!(compute_environment = %name, %state, "compute_environment_toggled");
    Ok(state)
  }

  /// Flip a job queue between ENABLED and DISABLED and return the new state.
  async fn toggle_queue(&self, name: &str) -> Result<ResourceState, RemoteError> {
    let current = self.queue(name).await?.ok_or_else(|| {
      RemoteError::new(Operation::UpdateQueue, format!("job queue {name} does not exist"))
    })?;
    let state = current.state.toggled();
    self.set_queue_state(name, state).await?;
    info!(queue = %name, %state, "queue_toggled");
    Ok(state)
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Mutex;

  use super::*;

  /// In-memory admin keyed by name.
  #[derive(Default)]
  struct MemoryAdmin {
    environments: Mutex<BTreeMap<String, ComputeEnvironmentSummary>>,
    queues: Mutex<BTreeMap<String, QueueSummary>>,
  }

  fn missing(operation: Operation, name: &str) -> RemoteError {
    RemoteError::new(operation, format!("{name} does not exist"))
  }

  #[async_trait]
  impl BatchAdmin for MemoryAdmin {
    async fn create_compute_environment(
      &self,
      spec: &ComputeEnvironmentSpec,
    ) -> Result<String, RemoteError> {
      let arn = format!("arn:test:compute-environment/{}", spec.name);
      self.environments.lock().unwrap().insert(
        spec.name.clone(),
        ComputeEnvironmentSummary {
          name: spec.name.clone(),
          arn: arn.clone(),
          state: ResourceState::Enabled,
          kind: spec.platform.to_string(),
          max_vcpus: Some(spec.max_vcpus),
        },
      );
      Ok(arn)
    }

    async fn compute_environments(&self) -> Result<Vec<ComputeEnvironmentSummary>, RemoteError> {
      Ok(self.environments.lock().unwrap().values().cloned().collect())
    }

    async fn compute_environment(
      &self,
      name: &str,
    ) -> Result<Option<ComputeEnvironmentSummary>, RemoteError> {
      Ok(self.environments.lock().unwrap().get(name).cloned())
    }

    async fn set_compute_environment_state(
      &self,
      name: &str,
      state: ResourceState,
    ) -> Result<(), RemoteError> {
      let mut environments = self.environments.lock().unwrap();
      let environment = environments
        .get_mut(name)
        .ok_or_else(|| missing(Operation::UpdateComputeEnvironment, name))?;
      environment.state = state;
      Ok(())
    }

    async fn delete_compute_environment(&self, name: &str) -> Result<(), RemoteError> {
      self
        .environments
        .lock()
        .unwrap()
        .remove(name)
        .map(|_| ())
        .ok_or_else(|| missing(Operation::DeleteComputeEnvironment, name))
    }

    async fn create_queue(&self, spec: &QueueSpec) -> Result<String, RemoteError> {
      let arn = format!("arn:test:job-queue/{}", spec.name);
      self.queues.lock().unwrap().insert(
        spec.name.clone(),
        QueueSummary {
          name: spec.name.clone(),
          arn: arn.clone(),
          state: ResourceState::Enabled,
          priority: Some(1),
          status: Some("VALID".to_string()),
          compute_environment: Some(spec.compute_environment.clone()),
        },
      );
      Ok(arn)
    }

    async fn queues(&self) -> Result<Vec<QueueSummary>, RemoteError> {
      Ok(self.queues.lock().unwrap().values().cloned().collect())
    }

    async fn queue(&self, name: &str) -> Result<Option<QueueSummary>, RemoteError> {
      Ok(self.queues.lock().unwrap().get(name).cloned())
    }

    async fn set_queue_state(&self, name: &str, state: ResourceState) -> Result<(), RemoteError> {
      let mut queues = self.queues.lock().unwrap();
      let queue = queues
        .get_mut(name)
        .ok_or_else(|| missing(Operation::UpdateQueue, name))?;
      queue.state = state;
      Ok(())
    }

    async fn delete_queue(&self, name: &str) -> Result<(), RemoteError> {
      self
        .queues
        .lock()
        .unwrap()
        .remove(name)
        .map(|_| ())
        .ok_or_else(|| missing(Operation::DeleteQueue, name))
    }
  }

  #[test]
  fn test_state_wire_values() {
    assert_eq!(ResourceState::parse("ENABLED"), Some(ResourceState::Enabled));
    assert_eq!(ResourceState::parse("DISABLED"), Some(ResourceState::Disabled));
    assert_eq!(ResourceState::parse("enabled"), None);
    assert_eq!(ResourceState::Enabled.toggled(), ResourceState::Disabled);
    assert_eq!(
      serde_json::to_string(&ResourceState::Disabled).unwrap(),
      "\"DISABLED\""
    );
  }

  #[test]
  fn test_spec_from_settings() {
    let settings = Settings {
      service_role: Some("arn:aws:iam::123:role/batch".to_string()),
      subnets: vec!["subnet-1".to_string()],
      security_group_ids: vec!["sg-1".to_string()],
      max_vcpus: 64,
      ..Settings::default()
    };

    let spec = ComputeEnvironmentSpec::from_settings("fargate-env", Platform::Fargate, &settings);

    assert_eq!(spec.name, "fargate-env");
    assert_eq!(spec.max_vcpus, 64);
    assert_eq!(spec.subnets, vec!["subnet-1"]);
    assert_eq!(spec.security_group_ids, vec!["sg-1"]);
    assert_eq!(spec.service_role.as_deref(), Some("arn:aws:iam::123:role/batch"));
    assert!(spec.tags.is_empty());
  }

  #[tokio::test]
  async fn test_toggle_compute_environment() {
    let admin = MemoryAdmin::default();
    let spec = ComputeEnvironmentSpec::from_settings("env", Platform::Fargate, &Settings::default());
    admin.create_compute_environment(&spec).await.unwrap();

    assert_eq!(
      admin.toggle_compute_environment("env").await.unwrap(),
      ResourceState::Disabled
    );
    assert_eq!(
      admin.toggle_compute_environment("env").await.unwrap(),
      ResourceState::Enabled
    );
    let listed = admin.compute_environments().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].state, ResourceState::Enabled);
  }

  #[tokio::test]
  async fn test_toggle_missing_resource_fails() {
    let admin = MemoryAdmin::default();

    let err = admin.toggle_compute_environment("ghost").await.unwrap_err();
    assert_eq!(err.operation, Operation::UpdateComputeEnvironment);
    assert_eq!(err.message, "compute environment ghost does not exist");

    let err = admin.toggle_queue("ghost").await.unwrap_err();
    assert_eq!(err.operation, Operation::UpdateQueue);
  }

  #[tokio::test]
  async fn test_toggle_queue() {
    let admin = MemoryAdmin::default();
    admin
      .create_queue(&QueueSpec {
        name: "DefaultFargateQueue".to_string(),
        compute_environment: "env".to_string(),
        tags: BTreeMap::new(),
      })
      .await
      .unwrap();

    assert_eq!(
      admin.toggle_queue("DefaultFargateQueue").await.unwrap(),
      ResourceState::Disabled
    );
    assert_eq!(
      admin.queue("DefaultFargateQueue").await.unwrap().unwrap().state,
      ResourceState::Disabled
    );
  }
}
