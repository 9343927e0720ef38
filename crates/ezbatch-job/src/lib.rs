//! Ezbatch Job
//!
//! Job and mount descriptors, their validation against the object store, and
//! their translation into provider-agnostic job definitions.

mod definition;
mod error;
mod job;
mod mount;
mod validate;

pub use definition::{COMMAND_ENV, MOUNTS_ENV, PRELOAD_SCRIPT, preload_command, sanitize_name};
pub use error::ValidationError;
pub use job::{DEFAULT_MEMORY_MIB, DEFAULT_VCPUS, JobBuilder, JobDescriptor};
pub use mount::{MountDescriptor, MountSet, TransferFlags};
pub use validate::MountValidator;
