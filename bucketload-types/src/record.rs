//! The telemetry record exchanged between load generators and the collector.
//!
//! # Wire format
//!
//! One record per UDP datagram, UTF-8 text, comma separated, no trailing newline:
//!
//! ```text
//! <workerNode>,<startTimestamp>,<endpointHost>,<bucketName>,<sizeBytes>,<durationSeconds>,<errorText>
//! ```
//!
//! `sizeBytes` is `-1` for failed attempts and `errorText` is empty for successful ones. Older
//! collectors stored records without the trailing `errorText` field; [`TelemetryRecord::from_str`]
//! accepts both shapes.

use std::fmt;
use std::str::FromStr;

/// Number of fields in a complete record.
pub const FIELD_COUNT: usize = 7;

/// Number of fields in a record that predates the `errorText` field.
pub const LEGACY_FIELD_COUNT: usize = 6;

/// The `sizeBytes` value reported for failed attempts.
pub const FAILED_SIZE: i64 = -1;

/// The result of a single upload attempt.
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    /// The object was written; carries the uploaded size in bytes.
    Success(i64),
    /// The write failed; carries a human readable description.
    Failure(String),
}

/// One completed upload attempt, as reported to the collector.
#[derive(Clone, Debug, PartialEq)]
pub struct TelemetryRecord {
    /// Host (or container) running the worker pool.
    pub worker_node: String,
    /// Seconds since the Unix epoch, captured right before the upload call.
    pub start_timestamp: f64,
    /// Storage endpoint host the object was written to.
    pub endpoint_host: String,
    /// Target bucket.
    pub bucket_name: String,
    /// Uploaded size, or [`FAILED_SIZE`].
    pub size_bytes: i64,
    /// Wall-clock time spent inside the upload call.
    pub duration_seconds: f64,
    /// Empty for successful attempts.
    pub error_text: String,
}

impl TelemetryRecord {
    /// Builds a record from an attempt outcome.
    ///
    /// Failure descriptions are sanitized so they cannot break the framing, and an empty
    /// description is replaced so that `size_bytes == -1` always pairs with a non-empty
    /// `error_text`.
    pub fn new(
        worker_node: impl Into<String>,
        start_timestamp: f64,
        endpoint_host: impl Into<String>,
        bucket_name: impl Into<String>,
        outcome: Outcome,
        duration_seconds: f64,
    ) -> Self {
        let (size_bytes, error_text) = match outcome {
            Outcome::Success(size) => (size.max(0), String::new()),
            Outcome::Failure(error) => {
                let error = sanitize_error(&error);
                let error = if error.is_empty() {
                    "unknown error".to_owned()
                } else {
                    error
                };
                (FAILED_SIZE, error)
            }
        };

        Self {
            worker_node: worker_node.into(),
            start_timestamp,
            endpoint_host: endpoint_host.into(),
            bucket_name: bucket_name.into(),
            size_bytes,
            duration_seconds,
            error_text,
        }
    }

    /// Returns `true` if the attempt succeeded.
    pub fn is_success(&self) -> bool {
        self.size_bytes >= 0
    }

    /// Serializes the record into the datagram payload.
    pub fn to_datagram(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }
}

impl fmt::Display for TelemetryRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{},{},{},{}",
            self.worker_node,
            Seconds(self.start_timestamp),
            self.endpoint_host,
            self.bucket_name,
            self.size_bytes,
            Seconds(self.duration_seconds),
            self.error_text
        )
    }
}

/// Errors that can occur when parsing a [`TelemetryRecord`].
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum RecordParseError {
    /// The line does not contain enough fields.
    #[error("expected {FIELD_COUNT} fields, found {0}")]
    FieldCount(usize),

    /// A numeric field could not be parsed.
    #[error("invalid {field} value {value:?}")]
    InvalidNumber {
        /// Name of the offending field.
        field: &'static str,
        /// The raw text.
        value: String,
    },
}

impl FromStr for TelemetryRecord {
    type Err = RecordParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim_end_matches(['\r', '\n']);
        // The error text is last, so any stray commas in it end up in that field.
        let fields: Vec<&str> = s.splitn(FIELD_COUNT, ',').collect();
        if fields.len() < LEGACY_FIELD_COUNT {
            return Err(RecordParseError::FieldCount(fields.len()));
        }

        Ok(Self {
            worker_node: fields[0].to_owned(),
            start_timestamp: parse_number("startTimestamp", fields[1])?,
            endpoint_host: fields[2].to_owned(),
            bucket_name: fields[3].to_owned(),
            size_bytes: parse_number("sizeBytes", fields[4])?,
            duration_seconds: parse_number("durationSeconds", fields[5])?,
            error_text: fields.get(6).copied().unwrap_or_default().to_owned(),
        })
    }
}

fn parse_number<T: FromStr>(field: &'static str, value: &str) -> Result<T, RecordParseError> {
    value
        .trim()
        .parse()
        .map_err(|_| RecordParseError::InvalidNumber {
            field,
            value: value.to_owned(),
        })
}

/// Replaces characters that would break the comma separated framing.
fn sanitize_error(error: &str) -> String {
    error
        .trim()
        .chars()
        .map(|c| match c {
            ',' => ';',
            '\r' | '\n' => ' ',
            c => c,
        })
        .collect()
}

/// Renders seconds as a decimal float that always carries a fractional part (`3.0`, not `3`).
struct Seconds(f64);

impl fmt::Display for Seconds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_finite() && self.0.fract() == 0.0 {
            write!(f, "{:.1}", self.0)
        } else {
            write!(f, "{}", self.0)
        }
    }
}
