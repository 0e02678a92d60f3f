//! A scriptable [`Storage`] for exercising workers without a real service.
//!
//! ```
//! use std::time::Duration;
//! use bucketload_test::storage::StubStorage;
//!
//! let storage = StubStorage::new()
//!     .with_latency(Duration::from_millis(5))
//!     .failing_with("connection refused");
//! assert_eq!(storage.put_calls(), 0);
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use bucketload_storage::{Container, InMemoryStorage, Storage, StorageError, StorageResult};
use bytes::Bytes;

/// A storage that delays every call and optionally fails it.
///
/// Successful writes are forwarded to an [`InMemoryStorage`], which can be inspected through
/// [`StubStorage::inner`]. Clones share all state, so a test can keep one handle while the
/// workers own another.
#[derive(Clone, Debug, Default)]
pub struct StubStorage {
    inner: InMemoryStorage,
    latency: Duration,
    put_failure: Option<String>,
    init_failure: Option<String>,
    put_calls: Arc<AtomicUsize>,
}

impl StubStorage {
    /// Creates a stub that succeeds immediately.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleeps for `latency` in every call before answering.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Fails every object write with a transport error carrying `message`.
    pub fn failing_with(mut self, message: impl Into<String>) -> Self {
        self.put_failure = Some(message.into());
        self
    }

    /// Fails bucket creation with a service error carrying `message`.
    pub fn failing_init(mut self, message: impl Into<String>) -> Self {
        self.init_failure = Some(message.into());
        self
    }

    /// Number of `put_object` calls received so far, including failed ones.
    pub fn put_calls(&self) -> usize {
        self.put_calls.load(Ordering::SeqCst)
    }

    /// The backing store holding successfully written objects.
    pub fn inner(&self) -> &InMemoryStorage {
        &self.inner
    }

    async fn delay(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

#[async_trait::async_trait]
impl Storage for StubStorage {
    fn name(&self) -> &'static str {
        "stub"
    }

    async fn create_or_open_container(&self, name: &str) -> StorageResult<Container> {
        self.delay().await;
        if let Some(message) = &self.init_failure {
            return Err(StorageError::Service {
                code: Some("AccessDenied".into()),
                message: message.clone(),
            });
        }
        self.inner.create_or_open_container(name).await
    }

    async fn set_public_read_access(&self, container: &Container) -> StorageResult<()> {
        self.delay().await;
        self.inner.set_public_read_access(container).await
    }

    async fn put_object(
        &self,
        container: &Container,
        key: &str,
        payload: Bytes,
    ) -> StorageResult<()> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);
        self.delay().await;
        match &self.put_failure {
            Some(message) => Err(StorageError::Transport(message.clone())),
            None => self.inner.put_object(container, key, payload).await,
        }
    }
}
