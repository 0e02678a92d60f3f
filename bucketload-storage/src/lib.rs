//! The storage layer that load generators write objects into.
//!
//! Workers only need three operations from a storage service: create (or open) a bucket, make
//! it publicly readable, and put an object into it. These are modeled by the [`Storage`] trait so
//! that the load generator can be pointed at any S3-compatible endpoint, or at an in-memory store
//! in tests.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;

mod backend;

pub use backend::{
    Container, InMemoryStorage, S3CompatibleStorage, Storage, StorageError, StorageResult,
};

/// A type-erased [`Storage`] instance shared by all workers.
pub type SharedStorage = Arc<dyn Storage>;

/// Configuration to initialize a [`SharedStorage`].
#[derive(Debug)]
pub enum StorageConfig {
    /// Keep everything in memory. Objects are counted but their payload is dropped.
    InMemory,
    /// Talk to an S3-compatible service.
    S3Compatible(S3Config),
}

/// Connection settings for an S3-compatible endpoint.
#[derive(Debug)]
pub struct S3Config {
    /// Host name of the service.
    pub host: String,
    /// TCP port of the service.
    pub port: u16,
    /// Whether to use `https`.
    pub secure: bool,
    /// Access key id; empty credentials are used if unset.
    pub access_key: Option<SecretString>,
    /// Secret access key.
    pub secret_key: Option<SecretString>,
    /// Timeout for a single operation, including the transfer of the payload.
    pub request_timeout: Option<Duration>,
}

impl S3Config {
    /// The endpoint URL derived from host, port and scheme.
    pub fn endpoint_url(&self) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!("{scheme}://{}:{}", self.host, self.port)
    }
}

/// Creates the storage described by `config`.
pub fn connect(config: StorageConfig) -> SharedStorage {
    match config {
        StorageConfig::InMemory => Arc::new(InMemoryStorage::new()),
        StorageConfig::S3Compatible(config) => Arc::new(S3CompatibleStorage::new(&config)),
    }
}
