//! The per-worker load loop.

use std::panic::AssertUnwindSafe;
use std::time::Instant;

use bucketload_storage::{Container, SharedStorage};
use futures::FutureExt;
use tokio_util::sync::CancellationToken;

use crate::telemetry::Emitter;
use crate::upload::{self, panic_message};
use crate::workload::Workload;

/// One independent upload loop.
///
/// A worker repeatedly generates a task, uploads it and emits the telemetry record for that
/// attempt, with no pause in between. Failures of a single iteration never end the loop; only
/// cancellation does.
#[derive(Debug)]
pub struct Worker {
    index: usize,
    storage: SharedStorage,
    container: Container,
    workload: Workload,
    emitter: Emitter,
}

impl Worker {
    /// Creates a worker that writes into an already initialized `container`.
    pub fn new(
        index: usize,
        storage: SharedStorage,
        container: Container,
        workload: Workload,
        emitter: Emitter,
    ) -> Self {
        Self {
            index,
            storage,
            container,
            workload,
            emitter,
        }
    }

    /// Runs until `cancel` is triggered.
    ///
    /// Cancellation is checked before every iteration, so an in-flight upload is completed and
    /// reported before the worker returns.
    pub async fn run(mut self, cancel: CancellationToken) {
        tracing::debug!(worker = self.index, "worker started");

        let mut iterations = 0u64;
        while !cancel.is_cancelled() {
            if let Err(payload) = AssertUnwindSafe(self.iteration()).catch_unwind().await {
                tracing::error!(
                    worker = self.index,
                    error = %panic_message(payload.as_ref()),
                    "worker iteration panicked"
                );
            }
            iterations += 1;

            // Storage that never suspends would otherwise starve the other tasks on this thread.
            tokio::task::yield_now().await;
        }

        tracing::debug!(worker = self.index, iterations, "worker stopped");
    }

    async fn iteration(&mut self) {
        let generate_start = Instant::now();
        let task = self.workload.next_task();
        tracing::debug!(
            worker = self.index,
            size = task.size_bytes,
            elapsed = ?generate_start.elapsed(),
            "generated payload"
        );

        let attempt = upload::upload(self.storage.as_ref(), &self.container, task).await;
        self.emitter.emit(&attempt).await;
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use bucketload_storage::{InMemoryStorage, Storage};
    use bucketload_types::TelemetryRecord;

    use super::*;
    use crate::telemetry::TelemetryChannel;

    #[derive(Debug, Clone, Default)]
    struct Recording(Arc<Mutex<Vec<String>>>);

    #[async_trait::async_trait]
    impl TelemetryChannel for Recording {
        async fn send(&mut self, datagram: &[u8]) -> io::Result<()> {
            let record = String::from_utf8_lossy(datagram).into_owned();
            self.0.lock().unwrap().push(record);
            Ok(())
        }
    }

    #[tokio::test]
    async fn runs_until_cancelled() {
        let storage = InMemoryStorage::new();
        let container = storage.create_or_open_container("bench").await.unwrap();
        let records = Recording::default();

        let worker = Worker::new(
            0,
            Arc::new(storage.clone()),
            container,
            Workload::builder().size_distribution(1, 0).build().unwrap(),
            Emitter::new(0, "node", "host", "bench", Box::new(records.clone())),
        );

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(worker.run(cancel.clone()));
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
        handle.await.unwrap();

        let records = records.0.lock().unwrap();
        assert!(!records.is_empty());
        assert_eq!(records.len(), storage.object_count("bench"));
        for record in records.iter() {
            let record: TelemetryRecord = record.parse().unwrap();
            assert_eq!(record.worker_node, "node");
            assert_eq!(record.size_bytes, 1024);
            assert_eq!(record.error_text, "");
        }
    }

    #[tokio::test]
    async fn cancelled_worker_does_nothing() {
        let storage = InMemoryStorage::new();
        let container = storage.create_or_open_container("bench").await.unwrap();
        let records = Recording::default();

        let worker = Worker::new(
            0,
            Arc::new(storage.clone()),
            container,
            Workload::builder().build().unwrap(),
            Emitter::new(0, "node", "host", "bench", Box::new(records.clone())),
        );

        let cancel = CancellationToken::new();
        cancel.cancel();
        worker.run(cancel).await;

        assert!(records.0.lock().unwrap().is_empty());
        assert_eq!(storage.object_count("bench"), 0);
    }
}
