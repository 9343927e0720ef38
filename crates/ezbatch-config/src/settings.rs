use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::enums::{ProbeFailurePolicy, ServerSideEncryption};
use crate::error::ConfigError;

/// Environment variable that overrides the settings file location.
pub const CONFIG_PATH_ENV: &str = "EZBATCH_CONFIG_PATH";

/// Default maximum vCPUs for new compute environments.
pub const DEFAULT_MAX_VCPUS: u32 = 256;

const CONFIG_FILE_NAME: &str = "ezbatch.toml";

const TASK_EXECUTION_ROLE: &str = "ecsTaskExecutionRole";
const BATCH_SERVICE_ROLE: &str = "aws-service-role/batch.amazonaws.com/AWSServiceRoleForBatch";
const INSTANCE_ROLE: &str = "ecsInstanceRole";

/// User settings for ezbatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
  /// Execution role attached to every registered job definition. Fargate
  /// definitions cannot be registered without one.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub execution_role_arn: Option<String>,

  /// Task role attached to every registered job definition.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub task_role_arn: Option<String>,

  /// Service role for new compute environments.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub service_role: Option<String>,

  /// Instance role for EC2 compute environments.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub instance_role: Option<String>,

  /// Defaults for new compute environments.
  pub max_vcpus: u32,
  pub security_group_ids: Vec<String>,
  pub subnets: Vec<String>,

  /// Encryption used for write mounts that don't specify their own.
  pub sse: ServerSideEncryption,

  /// KMS key used for write mounts that don't specify their own.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub sse_kms_key_id: Option<String>,

  /// Queue used when neither the job nor the command line names one.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub default_queue: Option<String>,

  pub probe_failure: ProbeFailurePolicy,

  #[serde(skip_serializing_if = "Option::is_none")]
  pub region: Option<String>,
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      execution_role_arn: None,
      task_role_arn: None,
      service_role: None,
      instance_role: None,
      max_vcpus: DEFAULT_MAX_VCPUS,
      security_group_ids: Vec::new(),
      subnets: Vec::new(),
      sse: ServerSideEncryption::default(),
      sse_kms_key_id: None,
      default_queue: None,
      probe_failure: ProbeFailurePolicy::default(),
      region: None,
    }
  }
}

/// On-disk layout: everything lives under a `[settings]` table.
#[derive(Debug, Default, Serialize, Deserialize)]
struct SettingsFile {
  #[serde(default)]
  settings: Settings,
}

impl Settings {
  /// Location of the settings file, honouring `$EZBATCH_CONFIG_PATH`.
  pub fn default_path() -> Result<PathBuf, ConfigError> {
    resolve_path(std::env::var_os(CONFIG_PATH_ENV), dirs::config_dir())
  }

  /// Parse settings from TOML text.
  pub fn from_toml(content: &str, path: &Path) -> Result<Self, ConfigError> {
    let file: SettingsFile = toml::from_str(content).map_err(|source| ConfigError::Parse {
      path: path.to_path_buf(),
      source,
    })?;
    Ok(file.settings)
  }

  /// Render settings as TOML text.
  pub fn to_toml(&self) -> Result<String, ConfigError> {
    let file = SettingsFile {
      settings: self.clone(),
    };
    Ok(toml::to_string_pretty(&file)?)
  }

  /// Load settings from `path`.
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
      path: path.to_path_buf(),
      source,
    })?;
    Self::from_toml(&content, path)
  }

  /// Write settings to `path`, creating parent directories.
  pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
    let io_err = |source| ConfigError::Io {
      path: path.to_path_buf(),
      source,
    };
    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent).map_err(io_err)?;
    }
    fs::write(path, self.to_toml()?).map_err(io_err)
  }

  /// Whether any role is unset and would need [`Settings::with_account_defaults`].
  pub fn has_unset_roles(&self) -> bool {
    self.execution_role_arn.is_none()
      || self.task_role_arn.is_none()
      || self.service_role.is_none()
      || self.instance_role.is_none()
  }

  /// A copy with every unset role filled with the conventional role of
  /// `account`. Roles that are already set are kept.
  pub fn with_account_defaults(&self, account: &str) -> Settings {
    let role = |name: &str| format!("arn:aws:iam::{account}:role/{name}");
    let mut settings = self.clone();
    settings
      .execution_role_arn
      .get_or_insert_with(|| role(TASK_EXECUTION_ROLE));
    settings
      .task_role_arn
      .get_or_insert_with(|| role(TASK_EXECUTION_ROLE));
    settings
      .service_role
      .get_or_insert_with(|| role(BATCH_SERVICE_ROLE));
    settings
      .instance_role
      .get_or_insert_with(|| role(INSTANCE_ROLE));
    settings
  }

  /// Load settings from `path`, writing the defaults there first if the file
  /// does not exist yet.
  pub fn load_or_init(path: &Path) -> Result<Self, ConfigError> {
    if !path.exists() {
      info!(path = %path.display(), "settings file not found, creating defaults");
      Settings::default().save(path)?;
    }
    Self::load(path)
  }
}

fn resolve_path(
  env_override: Option<OsString>,
  config_dir: Option<PathBuf>,
) -> Result<PathBuf, ConfigError> {
  if let Some(path) = env_override.filter(|p| !p.is_empty()) {
    return Ok(PathBuf::from(path));
  }
  config_dir
    .map(|dir| dir.join(CONFIG_FILE_NAME))
    .ok_or(ConfigError::NoConfigDir)
}
