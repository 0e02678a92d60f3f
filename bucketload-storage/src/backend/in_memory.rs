//! In-memory storage for tests and dry runs.
//!
//! Buckets and object sizes are kept in a `HashMap`; payloads are dropped after their length is
//! recorded. The storage is [`Clone`] so tests can hold a handle for direct inspection while the
//! workers own a shared copy.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;

use super::common::{Container, Storage, StorageError, StorageResult};

#[derive(Debug, Default)]
struct Bucket {
    public_read: bool,
    objects: HashMap<String, usize>,
}

/// A [`Storage`] that keeps bucket state in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStorage {
    buckets: Arc<Mutex<HashMap<String, Bucket>>>,
}

impl InMemoryStorage {
    /// Creates an empty storage without any buckets.
    pub fn new() -> Self {
        Self::default()
    }

    fn buckets(&self) -> MutexGuard<'_, HashMap<String, Bucket>> {
        // A panic while holding the lock leaves the maps consistent, so poisoning is ignored.
        self.buckets.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Returns `true` if a bucket with the given name exists.
    pub fn has_bucket(&self, name: &str) -> bool {
        self.buckets().contains_key(name)
    }

    /// Returns `true` if the bucket exists and grants public read access.
    pub fn is_public(&self, name: &str) -> bool {
        self.buckets().get(name).is_some_and(|b| b.public_read)
    }

    /// Returns the number of objects stored in the bucket.
    pub fn object_count(&self, name: &str) -> usize {
        self.buckets().get(name).map_or(0, |b| b.objects.len())
    }

    /// Returns the size of a stored object.
    pub fn object_size(&self, name: &str, key: &str) -> Option<usize> {
        self.buckets().get(name)?.objects.get(key).copied()
    }
}

fn no_such_bucket(name: &str) -> StorageError {
    StorageError::Service {
        code: Some("NoSuchBucket".into()),
        message: format!("bucket {name} does not exist"),
    }
}

#[async_trait::async_trait]
impl Storage for InMemoryStorage {
    fn name(&self) -> &'static str {
        "in-memory"
    }

    async fn create_or_open_container(&self, name: &str) -> StorageResult<Container> {
        self.buckets().entry(name.to_owned()).or_default();
        Ok(Container::new(name))
    }

    async fn set_public_read_access(&self, container: &Container) -> StorageResult<()> {
        let mut buckets = self.buckets();
        let bucket = buckets
            .get_mut(container.name())
            .ok_or_else(|| no_such_bucket(container.name()))?;
        bucket.public_read = true;
        Ok(())
    }

    async fn put_object(
        &self,
        container: &Container,
        key: &str,
        payload: Bytes,
    ) -> StorageResult<()> {
        let mut buckets = self.buckets();
        let bucket = buckets
            .get_mut(container.name())
            .ok_or_else(|| no_such_bucket(container.name()))?;
        bucket.objects.insert(key.to_owned(), payload.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stores_object_sizes() {
        let storage = InMemoryStorage::new();
        let container = storage.create_or_open_container("bench").await.unwrap();
        storage.set_public_read_access(&container).await.unwrap();
        storage
            .put_object(&container, "abc", Bytes::from(vec![0; 1024]))
            .await
            .unwrap();

        assert!(storage.is_public("bench"));
        assert_eq!(storage.object_count("bench"), 1);
        assert_eq!(storage.object_size("bench", "abc"), Some(1024));
    }

    #[tokio::test]
    async fn reopening_keeps_contents() {
        let storage = InMemoryStorage::new();
        let container = storage.create_or_open_container("bench").await.unwrap();
        storage
            .put_object(&container, "abc", Bytes::new())
            .await
            .unwrap();

        let reopened = storage.create_or_open_container("bench").await.unwrap();
        assert_eq!(reopened, container);
        assert_eq!(storage.object_count("bench"), 1);
    }

    #[tokio::test]
    async fn unknown_bucket_is_a_service_error() {
        let storage = InMemoryStorage::new();
        let error = storage
            .put_object(&Container::new("missing"), "abc", Bytes::new())
            .await
            .unwrap_err();
        assert!(error.is_service_error());
        assert_eq!(error.to_string(), "bucket missing does not exist");
    }
}
