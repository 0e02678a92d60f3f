//! Bucket initialization and the fixed-size worker pool.

use std::sync::Arc;

use bucketload_storage::{SharedStorage, StorageError};
use rand_distr::NormalError;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::telemetry::{Emitter, TelemetryTarget};
use crate::worker::Worker;
use crate::workload::Workload;

/// Everything the pool needs to know about the load it generates.
#[derive(Clone, Debug)]
pub struct PoolSettings {
    /// Storage endpoint host, reported in every telemetry record.
    pub endpoint_host: String,
    /// Bucket that objects are written to.
    pub bucket_name: String,
    /// Number of concurrent workers.
    pub num_workers: usize,
    /// Mean object size in KiB.
    pub object_mean_kb: u64,
    /// Standard deviation of the object size in KiB.
    pub object_stddev_kb: u64,
    /// Grant anonymous read access on the bucket before starting.
    pub public_read: bool,
}

/// Errors that prevent the pool from starting. No worker runs if any of these occurs.
#[derive(Debug, Error)]
pub enum InitializationError {
    /// The bucket could not be created or opened.
    #[error("failed to create or open bucket {bucket}")]
    Container {
        /// Name of the bucket.
        bucket: String,
        /// The storage error.
        #[source]
        source: StorageError,
    },

    /// The bucket exists but its access policy could not be set.
    #[error("failed to grant public read access on bucket {bucket}")]
    AccessPolicy {
        /// Name of the bucket.
        bucket: String,
        /// The storage error.
        #[source]
        source: StorageError,
    },

    /// The object size distribution is invalid.
    #[error("invalid object size distribution")]
    Workload(#[from] NormalError),
}

/// Initializes the bucket and runs `settings.num_workers` workers until `cancel` fires.
///
/// The bucket is created (or opened) and its access policy applied exactly once, before any
/// worker starts. If that fails, the error is returned and nothing is uploaded. Otherwise this
/// returns after all workers have stopped.
pub async fn run(
    settings: PoolSettings,
    storage: SharedStorage,
    telemetry: Arc<dyn TelemetryTarget>,
    node: String,
    cancel: CancellationToken,
) -> Result<(), InitializationError> {
    let bucket = settings.bucket_name.as_str();

    // Validate the distribution once so that every worker can build its own without failing.
    let workload = || {
        Workload::builder()
            .size_distribution(settings.object_mean_kb, settings.object_stddev_kb)
            .build()
    };
    workload()?;

    let container = storage
        .create_or_open_container(bucket)
        .await
        .map_err(|source| InitializationError::Container {
            bucket: bucket.to_owned(),
            source,
        })?;

    if settings.public_read {
        storage
            .set_public_read_access(&container)
            .await
            .map_err(|source| InitializationError::AccessPolicy {
                bucket: bucket.to_owned(),
                source,
            })?;
    }

    tracing::info!(
        storage = storage.name(),
        bucket,
        node = %node,
        workers = settings.num_workers,
        "starting workers"
    );

    let mut tasks = Vec::with_capacity(settings.num_workers);
    for index in 0..settings.num_workers {
        let emitter = Emitter::new(
            index,
            node.as_str(),
            settings.endpoint_host.as_str(),
            bucket,
            telemetry.open(index),
        );
        let worker = Worker::new(
            index,
            Arc::clone(&storage),
            container.clone(),
            workload()?,
            emitter,
        );

        let span = tracing::info_span!("worker", index);
        tasks.push(tokio::spawn(worker.run(cancel.clone()).instrument(span)));
    }

    for result in futures::future::join_all(tasks).await {
        if let Err(error) = result {
            tracing::error!(%error, "worker task failed");
        }
    }

    tracing::info!("all workers stopped");
    Ok(())
}
