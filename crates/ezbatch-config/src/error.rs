use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while locating, reading or writing settings.
#[derive(Debug, Error)]
pub enum ConfigError {
  /// No config directory could be determined for this platform.
  #[error("could not determine a config directory; set EZBATCH_CONFIG_PATH")]
  NoConfigDir,

  /// Reading or writing the settings file failed.
  #[error("settings file error at {path}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  /// The settings file is not valid TOML for [`crate::Settings`].
  #[error("failed to parse settings file {path}")]
  Parse {
    path: PathBuf,
    #[source]
    source: toml::de::Error,
  },

  /// A platform name other than FARGATE or EC2.
  #[error("unknown platform {0:?}, expected FARGATE or EC2")]
  UnknownPlatform(String),

  /// The settings could not be rendered as TOML.
  #[error("failed to serialize settings")]
  Serialize(#[from] toml::ser::Error),
}
