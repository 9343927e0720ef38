use std::collections::BTreeMap;

use ezbatch_config::Platform;
use serde::{Deserialize, Serialize};

use crate::error::{Operation, RemoteError};

/// Ephemeral storage a Fargate task gets when the job sets none.
pub const FARGATE_EPHEMERAL_STORAGE_GIB: u32 = 30;

/// A provider-agnostic job definition: everything a backend needs to register
/// a single-container definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDefinitionPayload {
  /// Definition name.
  pub job_name: String,
  /// Container name, restricted to `[A-Za-z0-9_]`.
  pub container_name: String,
  pub image: String,
  /// Argument vector for the container.
  pub command: Vec<String>,
  pub environment: BTreeMap<String, String>,
  /// Always a vCPU entry followed by a memory entry.
  pub resources: Vec<ResourceRequirement>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub ephemeral_storage_gib: Option<u32>,
  pub platform: Platform,
  pub tags: BTreeMap<String, String>,
}

impl JobDefinitionPayload {
  /// Look up the value of the first resource requirement of `kind`.
  pub fn resource(&self, kind: ResourceKind) -> Option<&str> {
    self
      .resources
      .iter()
      .find(|r| r.kind == kind)
      .map(|r| r.value.as_str())
  }

  /// Ephemeral storage to request from the provider: the job's own size, else
  /// [`FARGATE_EPHEMERAL_STORAGE_GIB`] on Fargate, else none.
  ///
  /// The provider takes a signed 32-bit size, so larger values are rejected.
  pub fn storage_request_gib(&self) -> Result<Option<i32>, RemoteError> {
    let size = self
      .ephemeral_storage_gib
      .or((self.platform == Platform::Fargate).then_some(FARGATE_EPHEMERAL_STORAGE_GIB));
    size
      .map(|gib| {
        i32::try_from(gib).map_err(|_| {
          RemoteError::new(
            Operation::RegisterDefinition,
            format!("ephemeral storage of {gib} GiB is out of range"),
          )
        })
      })
      .transpose()
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceKind {
  Vcpu,
  Memory,
}

/// A resource requirement with its value string-encoded, as the batch
/// service expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRequirement {
  #[serde(rename = "type")]
  pub kind: ResourceKind,
  pub value: String,
}

impl ResourceRequirement {
  pub fn vcpu(count: u32) -> Self {
    Self {
      kind: ResourceKind::Vcpu,
      value: count.to_string(),
    }
  }

  pub fn memory(mib: u32) -> Self {
    Self {
      kind: ResourceKind::Memory,
      value: mib.to_string(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_resource_requirement_serialization() {
    let json = serde_json::to_value(ResourceRequirement::vcpu(2)).unwrap();
    assert_eq!(json, serde_json::json!({"type": "VCPU", "value": "2"}));

    let json = serde_json::to_value(ResourceRequirement::memory(4096)).unwrap();
    assert_eq!(json, serde_json::json!({"type": "MEMORY", "value": "4096"}));
  }

  fn payload(platform: Platform, ephemeral_storage_gib: Option<u32>) -> JobDefinitionPayload {
    JobDefinitionPayload {
      job_name: "ubuntu-job".to_string(),
      container_name: "ubuntu".to_string(),
      image: "ubuntu".to_string(),
      command: vec!["true".to_string()],
      environment: BTreeMap::new(),
      resources: vec![ResourceRequirement::vcpu(1), ResourceRequirement::memory(2048)],
      ephemeral_storage_gib,
      platform,
      tags: BTreeMap::new(),
    }
  }

  #[test]
  fn test_unset_storage_is_not_serialized() {
    let json = serde_json::to_value(payload(Platform::Fargate, None)).unwrap();
    assert!(json.as_object().unwrap().get("ephemeral_storage_gib").is_none());
    assert_eq!(json["platform"], "FARGATE");

    let json = serde_json::to_value(payload(Platform::Fargate, Some(50))).unwrap();
    assert_eq!(json["ephemeral_storage_gib"], 50);
  }

  #[test]
  fn test_storage_request() {
    assert_eq!(
      payload(Platform::Fargate, None).storage_request_gib().unwrap(),
      Some(30)
    );
    assert_eq!(
      payload(Platform::Fargate, Some(100)).storage_request_gib().unwrap(),
      Some(100)
    );
    assert_eq!(payload(Platform::Ec2, None).storage_request_gib().unwrap(), None);
    assert_eq!(
      payload(Platform::Ec2, Some(40)).storage_request_gib().unwrap(),
      Some(40)
    );
  }

  #[test]
  fn test_storage_request_out_of_range() {
    let err = payload(Platform::Ec2, Some(u32::MAX))
      .storage_request_gib()
      .unwrap_err();
    assert_eq!(err.operation, Operation::RegisterDefinition);
    assert!(err.message.contains("out of range"), "{err}");
  }

  #[test]
  fn test_resource_lookup() {
    let payload = JobDefinitionPayload {
      job_name: "ubuntu-job".to_string(),
      container_name: "ubuntu_22_04".to_string(),
      image: "ubuntu:22.04".to_string(),
      command: vec!["true".to_string()],
      environment: BTreeMap::new(),
      resources: vec![ResourceRequirement::vcpu(1), ResourceRequirement::memory(2048)],
      ephemeral_storage_gib: None,
      platform: Platform::Fargate,
      tags: BTreeMap::new(),
    };
    assert_eq!(payload.resource(ResourceKind::Vcpu), Some("1"));
    assert_eq!(payload.resource(ResourceKind::Memory), Some("2048"));
  }
}
