use std::fmt::Debug;
use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;

/// A handle to a bucket that has been created or opened.
///
/// Obtained once from [`Storage::create_or_open_container`] and then shared read-only by all
/// workers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Container {
    name: String,
}

impl Container {
    /// Wraps the name of a bucket that is known to exist.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// The bucket name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// The operations a load generator needs from a storage service.
#[async_trait::async_trait]
pub trait Storage: Debug + Send + Sync + 'static {
    /// The storage name, used for diagnostics.
    fn name(&self) -> &'static str;

    /// Creates the bucket, or opens it if it already exists and belongs to us.
    async fn create_or_open_container(&self, name: &str) -> StorageResult<Container>;

    /// Grants anonymous read access to the bucket.
    async fn set_public_read_access(&self, container: &Container) -> StorageResult<()>;

    /// Writes a single object. Implementations must not retry.
    async fn put_object(&self, container: &Container, key: &str, payload: Bytes)
    -> StorageResult<()>;
}

/// Errors reported by a [`Storage`].
///
/// The `Display` output is a plain description of the failure, as it ends up verbatim in
/// telemetry records.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The request never produced a response: DNS, connect or I/O failures.
    #[error("{0}")]
    Transport(String),

    /// The request did not complete in time.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The service answered with an error.
    #[error("{message}")]
    Service {
        /// Machine readable error code, e.g. `NoSuchBucket`.
        code: Option<String>,
        /// Human readable description.
        message: String,
    },
}

impl StorageError {
    /// Returns `true` if the service itself rejected the request.
    pub fn is_service_error(&self) -> bool {
        matches!(self, Self::Service { .. })
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
