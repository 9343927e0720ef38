use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::error::RemoteError;
use crate::payload::JobDefinitionPayload;

/// Everything needed to enqueue one job.
#[derive(Debug, Clone, Copy)]
pub struct SubmitRequest<'a> {
  /// Provider-facing job name.
  pub name: &'a str,
  /// Queue name or ARN.
  pub queue: &'a str,
  /// Identifier returned by [`JobControl::register_definition`].
  pub definition_id: &'a str,
  /// Provider-assigned IDs of the jobs this one waits for.
  pub depends_on: &'a [String],
  pub tags: &'a BTreeMap<String, String>,
}

/// Remote job-control service.
///
/// Every call is a single blocking round trip from the caller's point of view;
/// callers await them one at a time.
#[async_trait]
pub trait JobControl: Send + Sync {
  /// Register a job definition and return its identifier.
  async fn register_definition(&self, payload: &JobDefinitionPayload)
  -> Result<String, RemoteError>;

  /// Deregister a previously registered definition.
  async fn deregister_definition(&self, definition_id: &str) -> Result<(), RemoteError>;

  /// Submit a job and return the provider-assigned job ID.
  async fn submit_job(&self, request: &SubmitRequest<'_>) -> Result<String, RemoteError>;
}
