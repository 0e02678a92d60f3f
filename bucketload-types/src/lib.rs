//! Shared types of the bucketload tools.
//!
//! The load generator produces [`TelemetryRecord`]s and the offline analyzer consumes them, so the
//! wire format lives here where both sides can agree on it. See the modules for details.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod key;
pub mod record;

pub use key::ObjectKey;
pub use record::{Outcome, RecordParseError, TelemetryRecord};
