//! Test utilities for the bucketload tools.
//!
//! This crate provides stand-ins for the remote systems a load generator talks to: a storage
//! service with configurable latency and failures, and a telemetry collector listening on a
//! local UDP port. See the modules for all available utilities.

pub mod collector;
pub mod storage;
pub mod tracing;
