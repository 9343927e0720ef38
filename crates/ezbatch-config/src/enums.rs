use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Compute platform a job definition targets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Platform {
  #[default]
  Fargate,
  Ec2,
}

impl Platform {
  pub fn as_str(&self) -> &'static str {
    match self {
      Platform::Fargate => "FARGATE",
      Platform::Ec2 => "EC2",
    }
  }
}

impl fmt::Display for Platform {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Platform {
  type Err = ConfigError;

  fn from_str(value: &str) -> Result<Self, Self::Err> {
    match value.to_ascii_uppercase().as_str() {
      "FARGATE" => Ok(Platform::Fargate),
      "EC2" => Ok(Platform::Ec2),
      _ => Err(ConfigError::UnknownPlatform(value.to_string())),
    }
  }
}

/// Server-side encryption mode for objects written to the object store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerSideEncryption {
  None,
  #[default]
  Aes256,
  Kms,
  KmsDsse,
}

impl ServerSideEncryption {
  /// The value the object store CLI expects after `--sse`.
  ///
  /// Returns `None` for [`ServerSideEncryption::None`], which is expressed by
  /// omitting the flag entirely.
  pub fn cli_value(&self) -> Option<&'static str> {
    match self {
      ServerSideEncryption::None => None,
      ServerSideEncryption::Aes256 => Some("AES256"),
      ServerSideEncryption::Kms => Some("aws:kms"),
      ServerSideEncryption::KmsDsse => Some("aws:kms:dsse"),
    }
  }
}

impl fmt::Display for ServerSideEncryption {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.cli_value().unwrap_or("none"))
  }
}

/// What to do when a mount location probe itself fails (network error,
/// missing credentials) rather than answering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeFailurePolicy {
  /// Fail closed: a probe error is a validation error.
  #[default]
  Deny,
  /// Fail open: a probe error is logged and the location is assumed valid.
  Allow,
}
