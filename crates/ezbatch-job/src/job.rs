use std::collections::BTreeMap;
use std::num::NonZeroU32;

use ezbatch_config::Platform;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::mount::{MountDescriptor, MountSet};
use crate::validate::MountValidator;

pub const DEFAULT_VCPUS: u32 = 1;
pub const DEFAULT_MEMORY_MIB: u32 = 2048;

/// One unit of containerized work.
///
/// Built with [`JobDescriptor::builder`], which validates mounts once, or
/// deserialized from a workflow snapshot. The internal name is derived from
/// the image when the descriptor is created and never changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "JobSpec", into = "JobSpec")]
pub struct JobDescriptor {
  image: String,
  command: String,
  environment: BTreeMap<String, String>,
  mounts: MountSet,
  vcpus: NonZeroU32,
  memory_mib: NonZeroU32,
  ephemeral_storage_gib: Option<NonZeroU32>,
  platform: Platform,
  tags: BTreeMap<String, String>,
  preload: bool,
  queue_override: Option<String>,
  internal_name: String,
  /// Provider-facing name, set only on stamped copies.
  submission_name: Option<String>,
}

impl JobDescriptor {
  pub fn builder(image: impl Into<String>, command: impl Into<String>) -> JobBuilder {
    JobBuilder {
      spec: JobSpec {
        image: image.into(),
        command: command.into(),
        environment: BTreeMap::new(),
        mounts: MountSet::default(),
        vcpus: DEFAULT_VCPUS,
        memory_mib: DEFAULT_MEMORY_MIB,
        ephemeral_storage_gib: None,
        platform: Platform::default(),
        tags: BTreeMap::new(),
        preload: false,
        queue_override: None,
      },
    }
  }

  pub fn image(&self) -> &str {
    &self.image
  }

  pub fn command(&self) -> &str {
    &self.command
  }

  pub fn environment(&self) -> &BTreeMap<String, String> {
    &self.environment
  }

  pub fn mounts(&self) -> &MountSet {
    &self.mounts
  }

  pub fn vcpus(&self) -> u32 {
    self.vcpus.get()
  }

  pub fn memory_mib(&self) -> u32 {
    self.memory_mib.get()
  }

  pub fn ephemeral_storage_gib(&self) -> Option<u32> {
    self.ephemeral_storage_gib.map(NonZeroU32::get)
  }

  pub fn platform(&self) -> Platform {
    self.platform
  }

  pub fn tags(&self) -> &BTreeMap<String, String> {
    &self.tags
  }

  pub fn preload(&self) -> bool {
    self.preload
  }

  pub fn queue_override(&self) -> Option<&str> {
    self.queue_override.as_deref()
  }

  /// `<image basename>-job`.
  pub fn internal_name(&self) -> &str {
    &self.internal_name
  }

  pub fn submission_name(&self) -> Option<&str> {
    self.submission_name.as_deref()
  }

  /// Name the job definition is registered under.
  pub fn definition_name(&self) -> &str {
    self.submission_name.as_deref().unwrap_or(&self.internal_name)
  }

  /// Last path segment of the image reference.
  pub fn image_basename(&self) -> &str {
    image_basename(&self.image)
  }

  /// Validate every mount against the object store.
  pub async fn validate(&self, validator: &MountValidator<'_>) -> Result<(), ValidationError> {
    validator.validate_mounts(&self.mounts).await
  }

  /// A copy carrying the submission name and the extra tags merged over its
  /// own. `self` is left untouched.
  pub fn stamped<I, K, V>(&self, submission_name: impl Into<String>, tags: I) -> Self
  where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
  {
    let mut copy = self.clone();
    copy.submission_name = Some(submission_name.into());
    copy
      .tags
      .extend(tags.into_iter().map(|(k, v)| (k.into(), v.into())));
    copy
  }
}

fn image_basename(image: &str) -> &str {
  image.rsplit_once('/').map_or(image, |(_, last)| last)
}

/// Builder for [`JobDescriptor`]. Defaults: 1 vCPU, 2048 MiB, Fargate.
#[derive(Debug, Clone)]
pub struct JobBuilder {
  spec: JobSpec,
}

impl JobBuilder {
  pub fn env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.spec.environment.insert(name.into(), value.into());
    self
  }

  pub fn environment(mut self, environment: BTreeMap<String, String>) -> Self {
    self.spec.environment = environment;
    self
  }

  pub fn read_mount(mut self, mount: MountDescriptor) -> Self {
    self.spec.mounts.read.push(mount);
    self
  }

  pub fn write_mount(mut self, mount: MountDescriptor) -> Self {
    self.spec.mounts.write.push(mount);
    self
  }

  pub fn mounts(mut self, mounts: MountSet) -> Self {
    self.spec.mounts = mounts;
    self
  }

  pub fn vcpus(mut self, vcpus: u32) -> Self {
    self.spec.vcpus = vcpus;
    self
  }

  pub fn memory_mib(mut self, memory_mib: u32) -> Self {
    self.spec.memory_mib = memory_mib;
    self
  }

  pub fn ephemeral_storage_gib(mut self, size: u32) -> Self {
    self.spec.ephemeral_storage_gib = Some(size);
    self
  }

  pub fn platform(mut self, platform: Platform) -> Self {
    self.spec.platform = platform;
    self
  }

  pub fn tag(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.spec.tags.insert(name.into(), value.into());
    self
  }

  pub fn preload(mut self, preload: bool) -> Self {
    self.spec.preload = preload;
    self
  }

  pub fn queue(mut self, queue: impl Into<String>) -> Self {
    self.spec.queue_override = Some(queue.into());
    self
  }

  /// Check the resource shape, then validate the mounts.
  pub async fn build(self, validator: &MountValidator<'_>) -> Result<JobDescriptor, ValidationError> {
    let job = JobDescriptor::try_from(self.spec)?;
    job.validate(validator).await?;
    Ok(job)
  }
}

/// Snapshot form of a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobSpec {
  image: String,
  command: String,
  #[serde(default)]
  environment: BTreeMap<String, String>,
  #[serde(default)]
  mounts: MountSet,
  #[serde(default = "default_vcpus")]
  vcpus: u32,
  #[serde(rename = "memoryMiB", default = "default_memory_mib")]
  memory_mib: u32,
  #[serde(rename = "ephemeralStorageGiB", default)]
  ephemeral_storage_gib: Option<u32>,
  #[serde(default)]
  platform: Platform,
  #[serde(default)]
  tags: BTreeMap<String, String>,
  #[serde(default)]
  preload: bool,
  #[serde(default)]
  queue_override: Option<String>,
}

fn default_vcpus() -> u32 {
  DEFAULT_VCPUS
}

fn default_memory_mib() -> u32 {
  DEFAULT_MEMORY_MIB
}

fn positive(value: u32, field: &'static str) -> Result<NonZeroU32, ValidationError> {
  NonZeroU32::new(value).ok_or(ValidationError::NotPositive { field })
}

impl TryFrom<JobSpec> for JobDescriptor {
  type Error = ValidationError;

  fn try_from(spec: JobSpec) -> Result<Self, Self::Error> {
    if spec.image.trim().is_empty() {
      return Err(ValidationError::EmptyImage);
    }
    let vcpus = positive(spec.vcpus, "vcpus")?;
    let memory_mib = positive(spec.memory_mib, "memoryMiB")?;
    let ephemeral_storage_gib = spec
      .ephemeral_storage_gib
      .map(|size| positive(size, "ephemeralStorageGiB"))
      .transpose()?;
    let internal_name = format!("{}-job", image_basename(&spec.image));

    Ok(Self {
      image: spec.image,
      command: spec.command,
      environment: spec.environment,
      mounts: spec.mounts,
      vcpus,
      memory_mib,
      ephemeral_storage_gib,
      platform: spec.platform,
      tags: spec.tags,
      preload: spec.preload,
      queue_override: spec.queue_override,
      internal_name,
      submission_name: None,
    })
  }
}

impl From<JobDescriptor> for JobSpec {
  fn from(job: JobDescriptor) -> Self {
    Self {
      image: job.image,
      command: job.command,
      environment: job.environment,
      mounts: job.mounts,
      vcpus: job.vcpus.get(),
      memory_mib: job.memory_mib.get(),
      ephemeral_storage_gib: job.ephemeral_storage_gib.map(NonZeroU32::get),
      platform: job.platform,
      tags: job.tags,
      preload: job.preload,
      queue_override: job.queue_override,
    }
  }
}
