//! Ezbatch Workflow
//!
//! A [`Workflow`] is a named set of [`ezbatch_job::JobDescriptor`]s plus the
//! dependency edges between them. Submitting it:
//!
//! 1. resolves the submission order and checks every job has a queue
//! 2. assigns a run id per workflow and per job, and stamps private copies of
//!    the jobs with their full names and identity tags
//! 3. registers one job definition per job
//! 4. submits the jobs in order, each referencing the submission ids of its
//!    prerequisites
//! 5. deregisters every definition it registered, whatever happened before
//!
//! Calls to the batch service are awaited one at a time. `submit` takes
//! `&mut self`, so a workflow can't be submitted twice concurrently.

mod error;
mod run_id;
mod submit;
mod workflow;

pub use error::{CleanupError, DeregisterFailure, SubmitError, WorkflowError};
pub use run_id::{RunIdGenerator, SequentialIds, WordPairIds};
pub use submit::{
  SubmissionRecord, TAG_JOB, TAG_JOB_ID, TAG_WORKFLOW_ID, TAG_WORKFLOW_NAME,
};
pub use workflow::Workflow;
