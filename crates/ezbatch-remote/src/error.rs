use std::fmt;

use thiserror::Error;

/// The boundary operation a [`RemoteError`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
  RegisterDefinition,
  DeregisterDefinition,
  SubmitJob,
  ProbeRead,
  ProbeWrite,
  ResolveAccount,
  CreateComputeEnvironment,
  DescribeComputeEnvironments,
  UpdateComputeEnvironment,
  DeleteComputeEnvironment,
  CreateQueue,
  DescribeQueues,
  UpdateQueue,
  DeleteQueue,
}

impl fmt::Display for Operation {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      Operation::RegisterDefinition => "register definition",
      Operation::DeregisterDefinition => "deregister definition",
      Operation::SubmitJob => "submit job",
      Operation::ProbeRead => "probe read location",
      Operation::ProbeWrite => "probe write location",
      Operation::ResolveAccount => "resolve caller account",
      Operation::CreateComputeEnvironment => "create compute environment",
      Operation::DescribeComputeEnvironments => "describe compute environments",
      Operation::UpdateComputeEnvironment => "update compute environment",
      Operation::DeleteComputeEnvironment => "delete compute environment",
      Operation::CreateQueue => "create job queue",
      Operation::DescribeQueues => "describe job queues",
      Operation::UpdateQueue => "update job queue",
      Operation::DeleteQueue => "delete job queue",
    };
    f.write_str(name)
  }
}

/// Any failure reported by the remote job-control or object-store service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{operation} failed: {message}")]
pub struct RemoteError {
  pub operation: Operation,
  pub message: String,
}

impl RemoteError {
  pub fn new(operation: Operation, message: impl Into<String>) -> Self {
    Self {
      operation,
      message: message.into(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_display() {
    let err = RemoteError::new(Operation::SubmitJob, "queue is disabled");
    assert_eq!(err.to_string(), "submit job failed: queue is disabled");
  }
}
