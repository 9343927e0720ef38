use std::fmt;

use async_trait::async_trait;
use ezbatch_config::ServerSideEncryption;

use crate::error::RemoteError;

/// URI scheme of the durable object store.
pub const OBJECT_STORE_SCHEME: &str = "s3://";

/// A parsed `s3://bucket/prefix` location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectLocation {
  pub bucket: String,
  /// Key prefix, without a leading slash. May be empty.
  pub prefix: String,
}

impl ObjectLocation {
  /// Returns true if `uri` names the object store rather than a local path.
  pub fn is_object_store(uri: &str) -> bool {
    uri.starts_with(OBJECT_STORE_SCHEME)
  }

  /// Parse an object-store URI.
  ///
  /// Returns `None` if `uri` isn't an object-store URI or has no bucket.
  pub fn parse(uri: &str) -> Option<Self> {
    let rest = uri.strip_prefix(OBJECT_STORE_SCHEME)?;
    let (bucket, prefix) = match rest.split_once('/') {
      Some((bucket, prefix)) => (bucket, prefix),
      None => (rest, ""),
    };
    if bucket.is_empty() {
      return None;
    }
    Some(Self {
      bucket: bucket.to_string(),
      prefix: prefix.to_string(),
    })
  }
}

impl fmt::Display for ObjectLocation {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}{}/{}", OBJECT_STORE_SCHEME, self.bucket, self.prefix)
  }
}

/// Probes object-store locations before a job is allowed to mount them.
///
/// `Ok(false)` is a definitive "no". `Err` means the probe itself could not be
/// carried out; the caller decides whether that is fatal.
#[async_trait]
pub trait LocationProbe: Send + Sync {
  /// Does anything exist under `location`?
  async fn readable(&self, location: &ObjectLocation) -> Result<bool, RemoteError>;

  /// Can objects be written to `bucket` with the given encryption?
  async fn writable(
    &self,
    bucket: &str,
    encryption: ServerSideEncryption,
    kms_key_id: Option<&str>,
  ) -> Result<bool, RemoteError>;
}

/// A probe that gives the same answer for every location.
#[derive(Debug, Clone, Copy)]
pub struct StaticProbe {
  pub readable: bool,
  pub writable: bool,
}

impl StaticProbe {
  /// Accepts every location.
  pub fn permissive() -> Self {
    Self {
      readable: true,
      writable: true,
    }
  }
}

#[async_trait]
impl LocationProbe for StaticProbe {
  async fn readable(&self, _location: &ObjectLocation) -> Result<bool, RemoteError> {
    Ok(self.readable)
  }

  async fn writable(
    &self,
    _bucket: &str,
    _encryption: ServerSideEncryption,
    _kms_key_id: Option<&str>,
  ) -> Result<bool, RemoteError> {
    Ok(self.writable)
  }
}
