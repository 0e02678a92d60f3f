//! The randomized workload that each worker draws its upload tasks from.

use bucketload_types::ObjectKey;
use bytes::{Bytes, BytesMut};
use rand::rngs::SmallRng;
use rand::{RngCore, SeedableRng};
use rand_distr::{Distribution, Normal, NormalError};

/// A builder for creating a [`Workload`].
#[derive(Debug)]
pub struct WorkloadBuilder {
    mean_kb: f64,
    stddev_kb: f64,
    seed: Option<u64>,
}

impl WorkloadBuilder {
    /// Distribution of object sizes, in KiB.
    pub fn size_distribution(mut self, mean_kb: u64, stddev_kb: u64) -> Self {
        self.mean_kb = mean_kb as f64;
        self.stddev_kb = stddev_kb as f64;
        self
    }

    /// Makes the workload deterministic. By default, every workload is seeded from the OS.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Creates the workload instance.
    pub fn build(self) -> Result<Workload, NormalError> {
        let size_distribution = Normal::new(self.mean_kb, self.stddev_kb)?;
        let rng = match self.seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_os_rng(),
        };

        Ok(Workload {
            rng,
            size_distribution,
        })
    }
}

/// An endless source of [`WorkTask`]s.
///
/// Every worker owns its own workload, so no state is shared between them.
#[derive(Debug)]
pub struct Workload {
    /// The RNG driving the size distribution and payload contents.
    rng: SmallRng,
    /// Object sizes in KiB.
    size_distribution: Normal<f64>,
}

impl Workload {
    /// Constructs a new workload builder with 1 KiB objects of fixed size.
    pub fn builder() -> WorkloadBuilder {
        WorkloadBuilder {
            mean_kb: 1.0,
            stddev_kb: 0.0,
            seed: None,
        }
    }

    /// Samples an object size in bytes.
    ///
    /// The sample is not rejected when it falls below zero, so the result may be negative.
    pub fn sample_size(&mut self) -> i64 {
        (self.size_distribution.sample(&mut self.rng) * 1024.0) as i64
    }

    /// Generates the next upload task.
    ///
    /// Negative sizes are clamped to zero, which results in an empty object.
    pub fn next_task(&mut self) -> WorkTask {
        let sampled = self.sample_size();
        let size_bytes = usize::try_from(sampled).unwrap_or(0);
        if sampled < 0 {
            tracing::debug!(sampled, "clamping negative object size to zero");
        }

        let mut payload = BytesMut::zeroed(size_bytes);
        self.rng.fill_bytes(&mut payload);

        WorkTask {
            key: ObjectKey::random(),
            size_bytes,
            payload: payload.freeze(),
        }
    }
}

/// A single object write.
#[derive(Clone, Debug)]
pub struct WorkTask {
    /// Name of the object, unique across all workers.
    pub key: ObjectKey,
    /// Length of `payload`.
    pub size_bytes: usize,
    /// Pseudo-random object contents.
    pub payload: Bytes,
}
