//! Timing and error capture around a single object write.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use bucketload_storage::{Container, Storage};
use bucketload_types::Outcome;
use futures::FutureExt;

use crate::workload::WorkTask;

/// The measured result of one upload.
#[derive(Clone, Debug, PartialEq)]
pub struct Attempt {
    /// Seconds since the Unix epoch, captured right before the storage call.
    pub start_timestamp: f64,
    /// Time spent in the storage call until it returned or failed.
    pub duration: Duration,
    /// Uploaded size or error description.
    pub outcome: Outcome,
}

/// Writes the task's payload under its key and measures how long that took.
///
/// Payload generation is not included in the measurement. Failures, including a panic inside the
/// storage client, are captured in the returned [`Attempt`] and never retried.
pub async fn upload(storage: &dyn Storage, container: &Container, task: WorkTask) -> Attempt {
    let WorkTask {
        key,
        size_bytes,
        payload,
    } = task;

    let start_timestamp = unix_timestamp();
    let start = Instant::now();
    let result = AssertUnwindSafe(storage.put_object(container, key.as_str(), payload))
        .catch_unwind()
        .await;
    let duration = start.elapsed();

    let outcome = match result {
        Ok(Ok(())) => Outcome::Success(size_bytes as i64),
        Ok(Err(error)) => Outcome::Failure(error.to_string()),
        Err(payload) => Outcome::Failure(panic_message(payload.as_ref())),
    };

    Attempt {
        start_timestamp,
        duration,
        outcome,
    }
}

fn unix_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0.0, |elapsed| elapsed.as_secs_f64())
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("panicked: {message}")
    } else {
        "panicked".to_owned()
    }
}
