use ezbatch_remote::{JobDefinitionPayload, ResourceRequirement};

use crate::job::JobDescriptor;

/// Environment variable carrying the original command into a preloaded container.
pub const COMMAND_ENV: &str = "EZBATCH_COMMAND";

/// Environment variable carrying the serialized mounts into a preloaded container.
pub const MOUNTS_ENV: &str = "EZBATCH_S3_MOUNTS";

/// Bootstrap script run in place of the command when preload is enabled.
/// Contains no single quote, so it can be embedded in `echo '...'`.
pub const PRELOAD_SCRIPT: &str = include_str!("preload.sh");

/// Writes [`PRELOAD_SCRIPT`] to `/tmp/preload.sh` inside the container and runs it.
pub fn preload_command() -> Vec<String> {
  vec![
    "/bin/bash".to_string(),
    "-c".to_string(),
    format!(
      "echo '{PRELOAD_SCRIPT}' > /tmp/preload.sh; chmod +x /tmp/preload.sh; /tmp/preload.sh"
    ),
  ]
}

/// Replace everything outside `[A-Za-z0-9]` with `_`.
pub fn sanitize_name(name: &str) -> String {
  name
    .chars()
    .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
    .collect()
}

impl JobDescriptor {
  /// Translate into a definition payload. Makes no remote calls.
  pub fn to_definition(&self) -> JobDefinitionPayload {
    let mut environment = self.environment().clone();
    let command = if self.preload() {
      environment.insert(COMMAND_ENV.to_string(), self.command().to_string());
      environment.insert(MOUNTS_ENV.to_string(), self.mounts().to_agent_json());
      preload_command()
    } else {
      self
        .command()
        .split_whitespace()
        .map(str::to_string)
        .collect()
    };

    JobDefinitionPayload {
      job_name: self.definition_name().to_string(),
      container_name: sanitize_name(self.image_basename()),
      image: self.image().to_string(),
      command,
      environment,
      resources: vec![
        ResourceRequirement::vcpu(self.vcpus()),
        ResourceRequirement::memory(self.memory_mib()),
      ],
      ephemeral_storage_gib: self.ephemeral_storage_gib(),
      platform: self.platform(),
      tags: self.tags().clone(),
    }
  }
}
