//! Offline analysis of load test telemetry.
//!
//! The collector stores one [`TelemetryRecord`](bucketload_types::TelemetryRecord) per line.
//! This crate reads those files together with the Deployment manifest of the run
//! ([`metadata`]), aggregates them into a [`Summary`](report::Summary) and renders a coloured
//! text report: error rates, duration percentiles, and request rates, throughput and errors over
//! time.

pub mod dataset;
pub mod metadata;
pub mod report;

use std::path::Path;

use anyhow::{Context, Result};

use crate::dataset::Dataset;
use crate::report::Summary;

/// Loads every data file and renders its report, in the given order.
pub fn analyze<P: AsRef<Path>>(paths: &[P]) -> Result<String> {
    let mut out = String::new();

    for (index, path) in paths.iter().enumerate() {
        let path = path.as_ref();
        let dataset = Dataset::load(path)
            .with_context(|| format!("failed to load dataset {}", path.display()))?;
        tracing::info!(
            path = %path.display(),
            records = dataset.records.len(),
            skipped = dataset.skipped,
            "loaded dataset"
        );

        let summary = Summary::from_records(&dataset.records);
        if index > 0 {
            out.push('\n');
        }
        out.push_str(&report::render(&dataset, &summary));
    }

    Ok(out)
}
