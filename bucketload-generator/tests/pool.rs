use std::collections::BTreeMap;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bucketload_generator::pool::{self, InitializationError, PoolSettings};
use bucketload_generator::telemetry::{TelemetryChannel, TelemetryTarget, UdpCollector};
use bucketload_test::collector::TestCollector;
use bucketload_test::storage::StubStorage;
use bucketload_types::TelemetryRecord;
use tokio_util::sync::CancellationToken;

/// Collects the records of all workers, tagged with the worker index.
#[derive(Clone, Debug, Default)]
struct RecordingTarget {
    records: Arc<Mutex<Vec<(usize, String)>>>,
}

impl RecordingTarget {
    fn by_worker(&self) -> BTreeMap<usize, Vec<TelemetryRecord>> {
        let mut by_worker = BTreeMap::<_, Vec<_>>::new();
        for (worker, record) in self.records.lock().unwrap().iter() {
            by_worker
                .entry(*worker)
                .or_default()
                .push(record.parse().unwrap());
        }
        by_worker
    }

    fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }
}

#[derive(Debug)]
struct RecordingChannel {
    worker: usize,
    records: Arc<Mutex<Vec<(usize, String)>>>,
}

#[async_trait::async_trait]
impl TelemetryChannel for RecordingChannel {
    async fn send(&mut self, datagram: &[u8]) -> io::Result<()> {
        let record = String::from_utf8(datagram.to_vec()).map_err(io::Error::other)?;
        self.records.lock().unwrap().push((self.worker, record));
        Ok(())
    }
}

impl TelemetryTarget for RecordingTarget {
    fn open(&self, worker: usize) -> Box<dyn TelemetryChannel> {
        Box::new(RecordingChannel {
            worker,
            records: Arc::clone(&self.records),
        })
    }
}

fn settings(num_workers: usize) -> PoolSettings {
    PoolSettings {
        endpoint_host: "s3.example.com".into(),
        bucket_name: "bench".into(),
        num_workers,
        object_mean_kb: 10,
        object_stddev_kb: 0,
        public_read: true,
    }
}

/// Runs the pool for `duration`, then cancels it and waits for all workers to stop.
async fn run_for(
    settings: PoolSettings,
    storage: StubStorage,
    telemetry: Arc<dyn TelemetryTarget>,
    duration: Duration,
) -> Result<(), InitializationError> {
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(pool::run(
        settings,
        Arc::new(storage),
        telemetry,
        "node-a".into(),
        cancel.clone(),
    ));

    tokio::time::sleep(duration).await;
    cancel.cancel();
    handle.await.unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn steady_load_with_fast_storage() {
    bucketload_test::tracing::init();

    let storage = StubStorage::new().with_latency(Duration::from_millis(5));
    let target = RecordingTarget::default();

    run_for(
        settings(2),
        storage.clone(),
        Arc::new(target.clone()),
        Duration::from_secs(1),
    )
    .await
    .unwrap();

    let by_worker = target.by_worker();
    assert_eq!(by_worker.keys().copied().collect::<Vec<_>>(), [0, 1]);

    for (worker, records) in by_worker {
        assert!(
            records.len() >= 100,
            "worker {worker} emitted only {} records",
            records.len()
        );
        for record in records {
            assert_eq!(record.worker_node, "node-a");
            assert_eq!(record.endpoint_host, "s3.example.com");
            assert_eq!(record.bucket_name, "bench");
            assert_eq!(record.size_bytes, 10240);
            assert_eq!(record.error_text, "");
            assert!(record.duration_seconds >= 0.005);
        }
    }

    assert!(storage.inner().is_public("bench"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn every_failure_is_reported() {
    bucketload_test::tracing::init();

    let storage = StubStorage::new()
        .with_latency(Duration::from_millis(1))
        .failing_with("connection refused");
    let target = RecordingTarget::default();

    run_for(
        settings(2),
        storage.clone(),
        Arc::new(target.clone()),
        Duration::from_millis(200),
    )
    .await
    .unwrap();

    let records: Vec<_> = target.by_worker().into_values().flatten().collect();
    assert!(!records.is_empty());
    for record in records {
        assert_eq!(record.size_bytes, -1);
        assert_eq!(record.error_text, "connection refused");
    }
    assert_eq!(storage.inner().object_count("bench"), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn one_record_per_attempt() {
    let storage = StubStorage::new().with_latency(Duration::from_millis(2));
    let target = RecordingTarget::default();

    run_for(
        settings(4),
        storage.clone(),
        Arc::new(target.clone()),
        Duration::from_millis(300),
    )
    .await
    .unwrap();

    assert_eq!(target.len(), storage.put_calls());
    assert_eq!(target.len(), storage.inner().object_count("bench"));
    assert_eq!(target.by_worker().len(), 4);
}

#[tokio::test]
async fn failed_initialization_starts_no_workers() {
    let storage = StubStorage::new().failing_init("Access Denied");
    let target = RecordingTarget::default();

    let error = run_for(
        settings(2),
        storage.clone(),
        Arc::new(target.clone()),
        Duration::from_millis(100),
    )
    .await
    .unwrap_err();

    assert!(matches!(error, InitializationError::Container { .. }));
    assert_eq!(storage.put_calls(), 0);
    assert_eq!(target.len(), 0);
}

#[tokio::test]
async fn private_bucket_skips_access_policy() {
    let storage = StubStorage::new();
    let target = RecordingTarget::default();
    let settings = PoolSettings {
        public_read: false,
        ..settings(1)
    };

    run_for(
        settings,
        storage.clone(),
        Arc::new(target.clone()),
        Duration::from_millis(50),
    )
    .await
    .unwrap();

    assert!(storage.inner().has_bucket("bench"));
    assert!(!storage.inner().is_public("bench"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn records_reach_udp_collector() {
    let collector = TestCollector::new().await;
    let storage = StubStorage::new().with_latency(Duration::from_millis(10));
    let target = UdpCollector::new(collector.host(), collector.port());

    let cancel = CancellationToken::new();
    let handle = tokio::spawn(pool::run(
        settings(1),
        Arc::new(storage),
        Arc::new(target),
        "node-a".into(),
        cancel.clone(),
    ));

    let datagram = collector.recv().await;
    cancel.cancel();
    handle.await.unwrap().unwrap();

    let fields: Vec<_> = datagram.split(',').collect();
    assert_eq!(fields.len(), 7);
    assert_eq!(fields[0], "node-a");
    assert!(fields[1].contains('.'));
    assert_eq!(fields[2..5], ["s3.example.com", "bench", "10240"]);
    assert!(fields[5].contains('.'));
    assert_eq!(fields[6], "");
}
