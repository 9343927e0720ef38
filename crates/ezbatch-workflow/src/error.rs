use std::fmt;
use std::path::PathBuf;

use ezbatch_job::ValidationError;
use ezbatch_remote::RemoteError;
use ezbatch_resolver::ResolveError;
use thiserror::Error;

/// Errors raised while constructing, saving or loading a workflow.
#[derive(Debug, Error)]
pub enum WorkflowError {
  #[error("dependencies declared for unknown job '{job}'")]
  UnknownJob { job: String },

  #[error("job '{job}' depends on unknown job '{dependency}'")]
  UnknownDependency { job: String, dependency: String },

  #[error("job '{job}' failed validation")]
  Validation {
    job: String,
    #[source]
    source: ValidationError,
  },

  #[error("failed to access workflow file {}", .path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("invalid workflow snapshot {}", .path.display())]
  Json {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },
}

/// A definition that could not be deregistered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeregisterFailure {
  pub job: String,
  pub definition_id: String,
  pub source: RemoteError,
}

impl fmt::Display for DeregisterFailure {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} ({}): {}", self.job, self.definition_id, self.source)
  }
}

/// Every deregistration that failed during cleanup. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to deregister {} job definition(s): {}", .failures.len(), render_failures(.failures))]
pub struct CleanupError {
  pub failures: Vec<DeregisterFailure>,
}

fn render_failures(failures: &[DeregisterFailure]) -> String {
  failures
    .iter()
    .map(ToString::to_string)
    .collect::<Vec<_>>()
    .join("; ")
}

fn render_cleanup(cleanup: &Option<CleanupError>) -> String {
  match cleanup {
    Some(cleanup) => format!(" (cleanup also failed: {cleanup})"),
    None => String::new(),
  }
}

/// Errors raised by `Workflow::submit`.
///
/// Once any definition has been registered, cleanup has already run by the
/// time one of these is returned. Cleanup failures ride along on the
/// original error, or stand alone as [`SubmitError::Cleanup`].
#[derive(Debug, Error)]
pub enum SubmitError {
  /// The dependency map is cyclic or references unknown jobs.
  #[error(transparent)]
  Resolve(#[from] ResolveError),

  /// A job has no queue override and no default queue was given.
  #[error("job '{job}' has no queue: a queue is required at the workflow or job level")]
  MissingQueue { job: String },

  #[error("failed to register job definition for '{job}'{}", render_cleanup(.cleanup))]
  Register {
    job: String,
    #[source]
    source: RemoteError,
    cleanup: Option<CleanupError>,
  },

  #[error("failed to submit job '{job}'{}", render_cleanup(.cleanup))]
  Submit {
    job: String,
    #[source]
    source: RemoteError,
    cleanup: Option<CleanupError>,
  },

  /// A job in the submission order had no staged copy, queue or registered
  /// definition. Nothing from that job on was submitted.
  #[error("job '{job}' has no registered definition to submit{}", render_cleanup(.cleanup))]
  Unregistered {
    job: String,
    cleanup: Option<CleanupError>,
  },

  /// Every job was submitted, but cleanup failed.
  #[error(transparent)]
  Cleanup(CleanupError),
}

impl SubmitError {
  /// Cleanup failures attached to this error, if any.
  pub fn cleanup(&self) -> Option<&CleanupError> {
    match self {
      SubmitError::Register { cleanup, .. }
      | SubmitError::Submit { cleanup, .. }
      | SubmitError::Unregistered { cleanup, .. } => cleanup.as_ref(),
      SubmitError::Cleanup(cleanup) => Some(cleanup),
      SubmitError::Resolve(_) | SubmitError::MissingQueue { .. } => None,
    }
  }
}
