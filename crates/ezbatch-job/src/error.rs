use ezbatch_remote::RemoteError;
use thiserror::Error;

/// Errors raised while constructing or validating a job descriptor.
#[derive(Debug, Error)]
pub enum ValidationError {
  /// Looks like an object-store URI but can't be parsed as one.
  #[error("malformed object store location: {uri}")]
  MalformedLocation { uri: String },

  /// Nothing exists under a read location.
  #[error("invalid source location: {uri} does not exist")]
  SourceNotFound { uri: String },

  /// The destination bucket rejected a test write.
  #[error("destination location {uri} is not writable")]
  DestinationNotWritable { uri: String },

  /// The probe itself failed and the failure policy is to deny.
  #[error("could not validate location {uri}")]
  ProbeFailed {
    uri: String,
    #[source]
    source: RemoteError,
  },

  /// A resource field that must be positive was zero.
  #[error("{field} must be a positive integer")]
  NotPositive { field: &'static str },

  /// The container image reference is empty.
  #[error("job image must not be empty")]
  EmptyImage,
}
