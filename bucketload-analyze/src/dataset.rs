//! Loading telemetry records captured by the collector.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use bucketload_types::TelemetryRecord;
use thiserror::Error;

use crate::metadata::{MetadataError, RunMetadata};

/// Errors loading a [`Dataset`].
#[derive(Debug, Error)]
pub enum DatasetError {
    /// The data file could not be read.
    #[error("failed to read {path}")]
    Io {
        /// Path of the data file.
        path: PathBuf,
        /// The I/O error.
        #[source]
        source: io::Error,
    },

    /// The sibling Deployment manifest is broken.
    #[error("invalid metadata for {path}")]
    Metadata {
        /// Path of the data file.
        path: PathBuf,
        /// The metadata error.
        #[source]
        source: MetadataError,
    },
}

/// All records of one load test run.
#[derive(Clone, Debug)]
pub struct Dataset {
    /// The data file the records were read from.
    pub path: PathBuf,
    /// Deployment metadata, empty if no manifest was found.
    pub metadata: RunMetadata,
    /// Records in file order.
    pub records: Vec<TelemetryRecord>,
    /// Number of lines that could not be parsed.
    pub skipped: usize,
}

impl Dataset {
    /// Reads a data file and its optional Deployment manifest.
    pub fn load(path: &Path) -> Result<Self, DatasetError> {
        let io_error = |source| DatasetError::Io {
            path: path.to_owned(),
            source,
        };

        let file = File::open(path).map_err(io_error)?;
        let (records, skipped) = parse_records(BufReader::new(file)).map_err(io_error)?;

        let metadata = RunMetadata::load_for(path)
            .map_err(|source| DatasetError::Metadata {
                path: path.to_owned(),
                source,
            })?
            .unwrap_or_default();

        Ok(Self {
            path: path.to_owned(),
            metadata,
            records,
            skipped,
        })
    }

    /// The endpoint under test: from the manifest, otherwise from the records.
    pub fn endpoint_host(&self) -> &str {
        self.metadata
            .endpoint_host
            .as_deref()
            .or_else(|| self.records.first().map(|r| r.endpoint_host.as_str()))
            .unwrap_or("unknown")
    }

    /// Human readable name, for example `s3.example.com 4p*8t`.
    pub fn label(&self) -> String {
        format!("{} {}", self.endpoint_host(), self.metadata)
    }
}

/// Parses one record per line.
///
/// Blank lines are ignored. An unparsable first line is treated as a header; any other
/// unparsable line is logged and counted in the returned number of skipped lines.
pub fn parse_records(reader: impl BufRead) -> io::Result<(Vec<TelemetryRecord>, usize)> {
    let mut records = Vec::new();
    let mut skipped = 0;

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }

        match line.parse::<TelemetryRecord>() {
            Ok(record) => records.push(record),
            Err(_) if index == 0 => tracing::debug!(header = line, "skipping header"),
            Err(error) => {
                tracing::warn!(line = index + 1, %error, "skipping malformed record");
                skipped += 1;
            }
        }
    }

    Ok((records, skipped))
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    const DATA: &str = "\
hostname,timestamp,endpoint,bucket,size,duration,error
pod-1,1536593412.5,s3.example.com,bench,10240,0.25,
pod-2,1536593413.0,s3.example.com,bench,-1,1.5,connection refused
pod-1,1536593414.0,s3.example.com,bench,2048,0.125
";

    #[test]
    fn skips_header_and_accepts_legacy_records() {
        let (records, skipped) = parse_records(Cursor::new(DATA)).unwrap();

        assert_eq!(skipped, 0);
        assert_eq!(records.len(), 3);
        assert_eq!(records[1].error_text, "connection refused");
        assert_eq!(records[2].size_bytes, 2048);
        assert_eq!(records[2].error_text, "");
    }

    #[test]
    fn counts_malformed_lines() {
        let data = "\
pod-1,1536593412.5,s3.example.com,bench,10240,0.25,

garbage
pod-1,1536593412.5,s3.example.com,bench,lots,0.25,
";
        let (records, skipped) = parse_records(Cursor::new(data)).unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(skipped, 2);
    }

    #[test]
    fn loads_file_with_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.csv");
        std::fs::write(&path, DATA).unwrap();
        std::fs::write(
            dir.path().join("run.yaml"),
            "spec:\n  replicas: 2\n  template:\n    spec:\n      containers:\n        - env:\n            - name: ENDPOINT_HOSTNAME\n              value: ceph.example.com\n",
        )
        .unwrap();

        let dataset = Dataset::load(&path).unwrap();

        assert_eq!(dataset.records.len(), 3);
        assert_eq!(dataset.endpoint_host(), "ceph.example.com");
        assert_eq!(dataset.label(), "ceph.example.com 2p*?t");
    }

    #[test]
    fn endpoint_falls_back_to_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.csv");
        std::fs::write(&path, DATA).unwrap();

        let dataset = Dataset::load(&path).unwrap();
        assert_eq!(dataset.endpoint_host(), "s3.example.com");
    }

    #[test]
    fn missing_file() {
        let error = Dataset::load(Path::new("/nonexistent/run.csv")).unwrap_err();
        assert!(matches!(error, DatasetError::Io { .. }));
    }
}
