//! Ezbatch Remote
//!
//! The boundary between ezbatch and the managed batch service. Everything the
//! workflow core needs from the outside world goes through two traits:
//!
//! - [`JobControl`] registers and deregisters job definitions and submits jobs.
//! - [`LocationProbe`] answers whether an object-store location can be read
//!   from or written to.
//!
//! [`BatchAdmin`] manages the compute environments and job queues jobs run on.
//!
//! Implementations:
//! - [`DryRunJobControl`] / [`StaticProbe`]: in-process, never touch the network
//! - `aws::BatchJobControl` / `aws::S3Probe` / `aws::BatchAdminClient`: AWS
//!   Batch and S3 (feature `aws`)

mod admin;
#[cfg(feature = "aws")]
pub mod aws;
mod control;
mod dry_run;
mod error;
mod payload;
mod probe;

pub use admin::{
  BatchAdmin, ComputeEnvironmentSpec, ComputeEnvironmentSummary, QueueSpec, QueueSummary,
  ResourceState,
};
pub use control::{JobControl, SubmitRequest};
pub use dry_run::{DryRunCall, DryRunJobControl};
pub use error::{Operation, RemoteError};
pub use payload::{
  FARGATE_EPHEMERAL_STORAGE_GIB, JobDefinitionPayload, ResourceKind, ResourceRequirement,
};
pub use probe::{LocationProbe, OBJECT_STORE_SCHEME, ObjectLocation, StaticProbe};
