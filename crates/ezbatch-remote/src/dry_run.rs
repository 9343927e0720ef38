use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use tracing::info;

use crate::control::{JobControl, SubmitRequest};
use crate::error::RemoteError;
use crate::payload::JobDefinitionPayload;

/// A call received by [`DryRunJobControl`].
#[derive(Debug, Clone, PartialEq)]
pub enum DryRunCall {
  Register {
    definition_id: String,
    payload: JobDefinitionPayload,
  },
  Deregister {
    definition_id: String,
  },
  Submit {
    job_id: String,
    name: String,
    queue: String,
    definition_id: String,
    depends_on: Vec<String>,
    tags: BTreeMap<String, String>,
  },
}

/// Job control that records calls instead of making them.
///
/// Identifiers are deterministic: `dry-run:definition:N` and `dry-run:job:N`,
/// counting from 1.
#[derive(Debug, Default)]
pub struct DryRunJobControl {
  calls: Mutex<Vec<DryRunCall>>,
}

impl DryRunJobControl {
  pub fn new() -> Self {
    Self::default()
  }

  /// All calls received so far, in order.
  pub fn calls(&self) -> Vec<DryRunCall> {
    self.lock().clone()
  }

  fn lock(&self) -> MutexGuard<'_, Vec<DryRunCall>> {
    self.calls.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
  }

  fn count(calls: &[DryRunCall], f: impl Fn(&DryRunCall) -> bool) -> usize {
    calls.iter().filter(|c| f(c)).count()
  }
}

#[async_trait]
impl JobControl for DryRunJobControl {
  async fn register_definition(
    &self,
    payload: &JobDefinitionPayload,
  ) -> Result<String, RemoteError> {
    let mut calls = self.lock();
    let n = Self::count(&calls, |c| matches!(c, DryRunCall::Register { .. })) + 1;
    let definition_id = format!("dry-run:definition:{n}");
    info!(job_name = %payload.job_name, %definition_id, "dry_run_register_definition");
    calls.push(DryRunCall::Register {
      definition_id: definition_id.clone(),
      payload: payload.clone(),
    });
    Ok(definition_id)
  }

  async fn deregister_definition(&self, definition_id: &str) -> Result<(), RemoteError> {
    info!(%definition_id, "dry_run_deregister_definition");
    self.lock().push(DryRunCall::Deregister {
      definition_id: definition_id.to_string(),
    });
    Ok(())
  }

  async fn submit_job(&self, request: &SubmitRequest<'_>) -> Result<String, RemoteError> {
    let mut calls = self.lock();
    let n = Self::count(&calls, |c| matches!(c, DryRunCall::Submit { .. })) + 1;
    let job_id = format!("dry-run:job:{n}");
    info!(
      name = %request.name,
      queue = %request.queue,
      depends_on = ?request.depends_on,
      %job_id,
      "dry_run_submit_job"
    );
    calls.push(DryRunCall::Submit {
      job_id: job_id.clone(),
      name: request.name.to_string(),
      queue: request.queue.to_string(),
      definition_id: request.definition_id.to_string(),
      depends_on: request.depends_on.to_vec(),
      tags: request.tags.clone(),
    });
    Ok(job_id)
  }
}
