//! Ezbatch Config
//!
//! This crate contains the settings object and the small enums shared by every
//! other ezbatch crate.
//!
//! Settings are loaded from a TOML file:
//! - `$EZBATCH_CONFIG_PATH` when set
//! - otherwise `ezbatch.toml` in the platform config directory
//!
//! Nothing here is global. The loaded [`Settings`] value is handed to the mount
//! validator, the remote backends and the CLI explicitly.

mod enums;
mod error;
mod settings;

pub use enums::{Platform, ProbeFailurePolicy, ServerSideEncryption};
pub use error::ConfigError;
pub use settings::{CONFIG_PATH_ENV, DEFAULT_MAX_VCPUS, Settings};
