use ezbatch_config::ServerSideEncryption;
use serde::{Deserialize, Serialize};

/// Transfer flags for a [`MountDescriptor`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferFlags {
  pub recursive: Option<bool>,
  pub server_side_encryption: Option<ServerSideEncryption>,
  pub kms_key_id: Option<String>,
}

/// A single transfer between the object store and a path inside the container.
///
/// `options` is derived from the transfer flags when the descriptor is built
/// and never changes afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "MountSpec", into = "MountSpec")]
pub struct MountDescriptor {
  source: String,
  destination: String,
  flags: TransferFlags,
  options: String,
}

impl MountDescriptor {
  /// A plain, non-recursive transfer with no explicit encryption.
  pub fn new(source: impl Into<String>, destination: impl Into<String>) -> Self {
    Self::with_flags(source, destination, TransferFlags::default())
  }

  pub fn with_flags(
    source: impl Into<String>,
    destination: impl Into<String>,
    flags: TransferFlags,
  ) -> Self {
    let options = build_options(&flags);
    Self {
      source: source.into(),
      destination: destination.into(),
      flags,
      options,
    }
  }

  pub fn source(&self) -> &str {
    &self.source
  }

  pub fn destination(&self) -> &str {
    &self.destination
  }

  pub fn recursive(&self) -> Option<bool> {
    self.flags.recursive
  }

  pub fn server_side_encryption(&self) -> Option<ServerSideEncryption> {
    self.flags.server_side_encryption
  }

  pub fn kms_key_id(&self) -> Option<&str> {
    self.flags.kms_key_id.as_deref()
  }

  /// Flags passed to the copy command, e.g. `--quiet --recursive --sse AES256`.
  pub fn options(&self) -> &str {
    &self.options
  }

  /// The form handed to the preload agent: only source, destination, options.
  pub(crate) fn to_agent_value(&self) -> serde_json::Value {
    serde_json::json!({
      "source": self.source,
      "destination": self.destination,
      "options": self.options,
    })
  }
}

fn build_options(flags: &TransferFlags) -> String {
  let mut options = vec!["--quiet".to_string()];
  if flags.recursive == Some(true) {
    options.push("--recursive".to_string());
  }
  if let Some(value) = flags.server_side_encryption.and_then(|sse| sse.cli_value()) {
    options.push(format!("--sse {value}"));
  }
  if let Some(key) = &flags.kms_key_id {
    options.push(format!("--sse-kms-key-id {key}"));
  }
  options.join(" ")
}

/// Snapshot form of a mount. `options` is recomputed on load.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MountSpec {
  source: String,
  destination: String,
  recursive: Option<bool>,
  server_side_encryption: Option<ServerSideEncryption>,
  kms_key_id: Option<String>,
}

impl From<MountSpec> for MountDescriptor {
  fn from(spec: MountSpec) -> Self {
    Self::with_flags(
      spec.source,
      spec.destination,
      TransferFlags {
        recursive: spec.recursive,
        server_side_encryption: spec.server_side_encryption,
        kms_key_id: spec.kms_key_id,
      },
    )
  }
}

impl From<MountDescriptor> for MountSpec {
  fn from(mount: MountDescriptor) -> Self {
    Self {
      source: mount.source,
      destination: mount.destination,
      recursive: mount.flags.recursive,
      server_side_encryption: mount.flags.server_side_encryption,
      kms_key_id: mount.flags.kms_key_id,
    }
  }
}

/// Read and write mounts of a job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountSet {
  #[serde(default)]
  pub read: Vec<MountDescriptor>,
  #[serde(default)]
  pub write: Vec<MountDescriptor>,
}

impl MountSet {
  pub fn iter(&self) -> impl Iterator<Item = &MountDescriptor> {
    self.read.iter().chain(self.write.iter())
  }

  /// JSON handed to the preload agent via the environment.
  pub fn to_agent_json(&self) -> String {
    let list = |mounts: &[MountDescriptor]| -> Vec<serde_json::Value> {
      mounts.iter().map(MountDescriptor::to_agent_value).collect()
    };
    serde_json::json!({
      "read": list(&self.read),
      "write": list(&self.write),
    })
    .to_string()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_default_options() {
    let mount = MountDescriptor::new("s3://source-bucket/path", "/destination/path");
    assert_eq!(mount.options(), "--quiet");
    assert_eq!(mount.recursive(), None);
    assert_eq!(mount.server_side_encryption(), None);
    assert_eq!(mount.kms_key_id(), None);
  }

  #[test]
  fn test_all_options() {
    let mount = MountDescriptor::with_flags(
      "s3://source-bucket/path",
      "/destination/path",
      TransferFlags {
        recursive: Some(true),
        server_side_encryption: Some(ServerSideEncryption::Kms),
        kms_key_id: Some("test-key-id".to_string()),
      },
    );
    assert_eq!(
      mount.options(),
      "--quiet --recursive --sse aws:kms --sse-kms-key-id test-key-id"
    );
  }

  #[test]
  fn test_no_encryption_and_non_recursive_add_no_flags() {
    let mount = MountDescriptor::with_flags(
      "/mnt/out",
      "s3://bucket/out",
      TransferFlags {
        recursive: Some(false),
        server_side_encryption: Some(ServerSideEncryption::None),
        kms_key_id: None,
      },
    );
    assert_eq!(mount.options(), "--quiet");
  }

  #[test]
  fn test_snapshot_form_omits_options() {
    let mount = MountDescriptor::with_flags(
      "s3://bucket/in",
      "/mnt/in",
      TransferFlags {
        recursive: Some(true),
        ..TransferFlags::default()
      },
    );
    let json = serde_json::to_value(&mount).unwrap();
    assert_eq!(
      json,
      serde_json::json!({
        "source": "s3://bucket/in",
        "destination": "/mnt/in",
        "recursive": true,
        "serverSideEncryption": null,
        "kmsKeyId": null,
      })
    );

    let restored: MountDescriptor = serde_json::from_value(json).unwrap();
    assert_eq!(restored, mount);
    assert_eq!(restored.options(), "--quiet --recursive");
  }

  #[test]
  fn test_snapshot_form_accepts_missing_flags() {
    let restored: MountDescriptor =
      serde_json::from_str(r#"{"source": "/mnt/out", "destination": "s3://bucket/out"}"#).unwrap();
    assert_eq!(restored.options(), "--quiet");
  }

  #[test]
  fn test_agent_json_only_carries_transfer_fields() {
    let mounts = MountSet {
      read: vec![MountDescriptor::with_flags(
        "s3://read-bucket/path",
        "/read/path",
        TransferFlags {
          recursive: Some(true),
          server_side_encryption: Some(ServerSideEncryption::Aes256),
          kms_key_id: Some("test-key-id".to_string()),
        },
      )],
      write: vec![MountDescriptor::new("/write/path", "s3://write-bucket/path")],
    };

    let json: serde_json::Value = serde_json::from_str(&mounts.to_agent_json()).unwrap();

    let read = &json["read"][0];
    assert_eq!(read["source"], "s3://read-bucket/path");
    assert_eq!(read["destination"], "/read/path");
    assert_eq!(
      read["options"],
      "--quiet --recursive --sse AES256 --sse-kms-key-id test-key-id"
    );
    assert!(read.get("recursive").is_none());
    assert!(read.get("serverSideEncryption").is_none());
    assert!(read.get("kmsKeyId").is_none());

    assert_eq!(json["write"][0]["destination"], "s3://write-bucket/path");
    assert_eq!(json["write"].as_array().unwrap().len(), 1);
  }
}
