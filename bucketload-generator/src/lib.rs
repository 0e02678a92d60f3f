//! A parallel load generator for S3-compatible object storage.
//!
//! A fixed pool of [workers](worker) continuously generates randomly sized objects from a
//! [`Workload`](workload::Workload), [uploads](upload) them into a single bucket and reports
//! every attempt as a [`TelemetryRecord`](bucketload_types::TelemetryRecord) to a remote
//! collector through the [`telemetry`] module.
//!
//! The entry point for the binary is [`cli::execute`]; tests and embedders can drive the pool
//! directly through [`pool::run`].
#![warn(missing_debug_implementations)]

pub mod cli;
pub mod config;
pub mod observability;
pub mod pool;
pub mod telemetry;
pub mod upload;
pub mod worker;
pub mod workload;
