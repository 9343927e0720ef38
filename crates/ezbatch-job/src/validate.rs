use ezbatch_config::{ProbeFailurePolicy, ServerSideEncryption, Settings};
use ezbatch_remote::{LocationProbe, ObjectLocation, RemoteError};
use tracing::{debug, warn};

use crate::error::ValidationError;
use crate::mount::{MountDescriptor, MountSet};

/// Checks mount locations against the object store.
///
/// Encryption for write probes comes from the mount itself, falling back to
/// the settings defaults.
pub struct MountValidator<'a> {
  probe: &'a dyn LocationProbe,
  policy: ProbeFailurePolicy,
  default_sse: ServerSideEncryption,
  default_kms_key_id: Option<String>,
}

impl<'a> MountValidator<'a> {
  pub fn new(probe: &'a dyn LocationProbe, settings: &Settings) -> Self {
    Self {
      probe,
      policy: settings.probe_failure,
      default_sse: settings.sse,
      default_kms_key_id: settings.sse_kms_key_id.clone(),
    }
  }

  /// Override the probe failure policy from settings.
  pub fn with_policy(mut self, policy: ProbeFailurePolicy) -> Self {
    self.policy = policy;
    self
  }

  /// Validate every read and write mount in order.
  pub async fn validate_mounts(&self, mounts: &MountSet) -> Result<(), ValidationError> {
    for mount in mounts.iter() {
      self.validate_mount(mount).await?;
    }
    Ok(())
  }

  /// Validate one mount: an object-store source must exist and an
  /// object-store destination must be writable.
  pub async fn validate_mount(&self, mount: &MountDescriptor) -> Result<(), ValidationError> {
    if ObjectLocation::is_object_store(mount.source()) {
      let location = parse(mount.source())?;
      let answer = self.probe.readable(&location).await;
      if !self.accept(mount.source(), answer)? {
        return Err(ValidationError::SourceNotFound {
          uri: mount.source().to_string(),
        });
      }
    }

    if ObjectLocation::is_object_store(mount.destination()) {
      let location = parse(mount.destination())?;
      let encryption = mount.server_side_encryption().unwrap_or(self.default_sse);
      let kms_key_id = mount
        .kms_key_id()
        .or(self.default_kms_key_id.as_deref());
      let answer = self
        .probe
        .writable(&location.bucket, encryption, kms_key_id)
        .await;
      if !self.accept(mount.destination(), answer)? {
        return Err(ValidationError::DestinationNotWritable {
          uri: mount.destination().to_string(),
        });
      }
    }

    debug!(source = %mount.source(), destination = %mount.destination(), "mount validated");
    Ok(())
  }

  /// Apply the failure policy to a probe answer.
  fn accept(&self, uri: &str, answer: Result<bool, RemoteError>) -> Result<bool, ValidationError> {
    match answer {
      Ok(ok) => Ok(ok),
      Err(source) => match self.policy {
        ProbeFailurePolicy::Deny => Err(ValidationError::ProbeFailed {
          uri: uri.to_string(),
          source,
        }),
        ProbeFailurePolicy::Allow => {
          warn!(%uri, error = %source, "location probe failed, assuming valid");
          Ok(true)
        }
      },
    }
  }
}

fn parse(uri: &str) -> Result<ObjectLocation, ValidationError> {
  ObjectLocation::parse(uri).ok_or_else(|| ValidationError::MalformedLocation {
    uri: uri.to_string(),
  })
}

#[cfg(test)]
mod tests {
  use std::sync::Mutex;

  use async_trait::async_trait;
  use ezbatch_remote::Operation;

  use super::*;
  use crate::mount::TransferFlags;

  /// Probe that records what it was asked and answers from fixed results.
  struct MockProbe {
    readable: Result<bool, RemoteError>,
    writable: Result<bool, RemoteError>,
    read_calls: Mutex<Vec<String>>,
    write_calls: Mutex<Vec<(String, ServerSideEncryption, Option<String>)>>,
  }

  impl MockProbe {
    fn new(readable: Result<bool, RemoteError>, writable: Result<bool, RemoteError>) -> Self {
      Self {
        readable,
        writable,
        read_calls: Mutex::new(Vec::new()),
        write_calls: Mutex::new(Vec::new()),
      }
    }
  }

  #[async_trait]
  impl LocationProbe for MockProbe {
    async fn readable(&self, location: &ObjectLocation) -> Result<bool, RemoteError> {
      self.read_calls.lock().unwrap().push(location.to_string());
      self.readable.clone()
    }

    async fn writable(
      &self,
      bucket: &str,
      encryption: ServerSideEncryption,
      kms_key_id: Option<&str>,
    ) -> Result<bool, RemoteError> {
      self.write_calls.lock().unwrap().push((
        bucket.to_string(),
        encryption,
        kms_key_id.map(str::to_string),
      ));
      self.writable.clone()
    }
  }

  fn probe_error() -> RemoteError {
    RemoteError::new(Operation::ProbeRead, "connection reset")
  }

  #[tokio::test]
  async fn test_valid_mount_probes_both_sides() {
    let probe = MockProbe::new(Ok(true), Ok(true));
    let validator = MountValidator::new(&probe, &Settings::default());

    let mount = MountDescriptor::with_flags(
      "s3://source-bucket/path",
      "s3://destination-bucket/path",
      TransferFlags {
        server_side_encryption: Some(ServerSideEncryption::Aes256),
        kms_key_id: Some("test-key-id".to_string()),
        ..TransferFlags::default()
      },
    );
    validator.validate_mount(&mount).await.unwrap();

    assert_eq!(
      *probe.read_calls.lock().unwrap(),
      vec!["s3://source-bucket/path".to_string()]
    );
    assert_eq!(
      *probe.write_calls.lock().unwrap(),
      vec![(
        "destination-bucket".to_string(),
        ServerSideEncryption::Aes256,
        Some("test-key-id".to_string())
      )]
    );
  }

  #[tokio::test]
  async fn test_local_paths_are_not_probed() {
    let probe = MockProbe::new(Ok(false), Ok(false));
    let validator = MountValidator::new(&probe, &Settings::default());

    validator
      .validate_mount(&MountDescriptor::new("/mnt/a", "/mnt/b"))
      .await
      .unwrap();

    assert!(probe.read_calls.lock().unwrap().is_empty());
    assert!(probe.write_calls.lock().unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_missing_source_is_rejected() {
    let probe = MockProbe::new(Ok(false), Ok(true));
    let validator = MountValidator::new(&probe, &Settings::default());

    let result = validator
      .validate_mount(&MountDescriptor::new("s3://source-bucket/path", "/destination/path"))
      .await;

    assert!(matches!(result, Err(ValidationError::SourceNotFound { .. })));
  }

  #[tokio::test]
  async fn test_unwritable_destination_is_rejected() {
    let probe = MockProbe::new(Ok(true), Ok(false));
    let validator = MountValidator::new(&probe, &Settings::default());

    let result = validator
      .validate_mount(&MountDescriptor::new(
        "/mnt/out",
        "s3://destination-bucket/path",
      ))
      .await;

    assert!(matches!(
      result,
      Err(ValidationError::DestinationNotWritable { uri }) if uri == "s3://destination-bucket/path"
    ));
  }

  #[tokio::test]
  async fn test_write_probe_uses_settings_defaults() {
    let probe = MockProbe::new(Ok(true), Ok(true));
    let settings = Settings {
      sse: ServerSideEncryption::Kms,
      sse_kms_key_id: Some("default-key".to_string()),
      ..Settings::default()
    };
    let validator = MountValidator::new(&probe, &settings);

    validator
      .validate_mount(&MountDescriptor::new("/mnt/out", "s3://bucket/out"))
      .await
      .unwrap();

    assert_eq!(
      *probe.write_calls.lock().unwrap(),
      vec![(
        "bucket".to_string(),
        ServerSideEncryption::Kms,
        Some("default-key".to_string())
      )]
    );
  }

  #[tokio::test]
  async fn test_malformed_location() {
    let probe = MockProbe::new(Ok(true), Ok(true));
    let validator = MountValidator::new(&probe, &Settings::default());

    let result = validator
      .validate_mount(&MountDescriptor::new("s3:///no-bucket", "/mnt"))
      .await;

    assert!(matches!(result, Err(ValidationError::MalformedLocation { .. })));
    assert!(probe.read_calls.lock().unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_probe_failure_denied_by_default() {
    let probe = MockProbe::new(Err(probe_error()), Ok(true));
    let validator = MountValidator::new(&probe, &Settings::default());

    let result = validator
      .validate_mount(&MountDescriptor::new("s3://bucket/in", "/mnt/in"))
      .await;

    assert!(matches!(result, Err(ValidationError::ProbeFailed { .. })));
  }

  #[tokio::test]
  async fn test_probe_failure_allowed_when_fail_open() {
    let probe = MockProbe::new(Err(probe_error()), Err(probe_error()));
    let validator =
      MountValidator::new(&probe, &Settings::default()).with_policy(ProbeFailurePolicy::Allow);

    validator
      .validate_mount(&MountDescriptor::new("s3://bucket/in", "s3://bucket/out"))
      .await
      .unwrap();
  }

  #[tokio::test]
  async fn test_validate_mounts_stops_at_first_failure() {
    let probe = MockProbe::new(Ok(false), Ok(true));
    let validator = MountValidator::new(&probe, &Settings::default());

    let mounts = MountSet {
      read: vec![
        MountDescriptor::new("s3://bucket/a", "/mnt/a"),
        MountDescriptor::new("s3://bucket/b", "/mnt/b"),
      ],
      write: vec![],
    };
    let result = validator.validate_mounts(&mounts).await;

    assert!(matches!(result, Err(ValidationError::SourceNotFound { uri }) if uri == "s3://bucket/a"));
    assert_eq!(probe.read_calls.lock().unwrap().len(), 1);
  }
}
