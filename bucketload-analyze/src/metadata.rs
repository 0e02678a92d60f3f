//! Run metadata taken from the Kubernetes Deployment that generated a dataset.
//!
//! Every data file `data_2018_09_10_15_50_12.csv` may have the Deployment manifest used for that
//! run stored next to it as `data_2018_09_10_15_50_12.yaml`. Only a few fields are read:
//!
//! ```yaml
//! spec:
//!   replicas: 4
//!   template:
//!     spec:
//!       containers:
//!         - env:
//!             - name: ENDPOINT_HOSTNAME
//!               value: s3.example.com
//!             - name: NUM_THREADS
//!               value: "8"
//! ```

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// Errors reading a Deployment manifest.
#[derive(Debug, Error)]
pub enum MetadataError {
    /// The manifest exists but could not be read.
    #[error("failed to read {path}")]
    Io {
        /// Path of the manifest.
        path: PathBuf,
        /// The I/O error.
        #[source]
        source: io::Error,
    },

    /// The manifest is not a Deployment.
    #[error("failed to parse deployment manifest")]
    Yaml(#[from] serde_yaml::Error),
}

#[derive(Debug, Deserialize)]
struct Deployment {
    spec: DeploymentSpec,
}

#[derive(Debug, Deserialize)]
struct DeploymentSpec {
    replicas: Option<u64>,
    template: PodTemplate,
}

#[derive(Debug, Deserialize)]
struct PodTemplate {
    spec: PodSpec,
}

#[derive(Debug, Deserialize)]
struct PodSpec {
    containers: Vec<ContainerSpec>,
}

#[derive(Debug, Deserialize)]
struct ContainerSpec {
    #[serde(default)]
    env: Vec<EnvVar>,
}

#[derive(Debug, Deserialize)]
struct EnvVar {
    name: String,
    #[serde(default)]
    value: Option<serde_yaml::Value>,
}

impl EnvVar {
    fn text(&self) -> Option<String> {
        match self.value.as_ref()? {
            serde_yaml::Value::String(value) => Some(value.clone()),
            serde_yaml::Value::Number(value) => Some(value.to_string()),
            _ => None,
        }
    }
}

/// What is known about the load generators behind a dataset.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RunMetadata {
    /// The storage endpoint under test.
    pub endpoint_host: Option<String>,
    /// Number of load generator pods.
    pub pods: Option<u64>,
    /// Workers per pod.
    pub threads: Option<u64>,
}

impl RunMetadata {
    /// Parses a Deployment manifest.
    pub fn from_yaml(yaml: &str) -> Result<Self, MetadataError> {
        let deployment: Deployment = serde_yaml::from_str(yaml)?;
        let mut metadata = RunMetadata {
            pods: deployment.spec.replicas,
            ..Default::default()
        };

        let env = deployment
            .spec
            .template
            .spec
            .containers
            .into_iter()
            .next()
            .map(|container| container.env)
            .unwrap_or_default();

        for var in env {
            match var.name.as_str() {
                "ENDPOINT_HOSTNAME" => metadata.endpoint_host = var.text(),
                "NUM_THREADS" => metadata.threads = var.text().and_then(|t| t.parse().ok()),
                _ => (),
            }
        }

        Ok(metadata)
    }

    /// Loads the manifest stored next to `data_file`, if there is one.
    pub fn load_for(data_file: &Path) -> Result<Option<Self>, MetadataError> {
        let path = data_file.with_extension("yaml");
        let yaml = match std::fs::read_to_string(&path) {
            Ok(yaml) => yaml,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(MetadataError::Io { path, source }),
        };

        Self::from_yaml(&yaml).map(Some)
    }
}

/// Renders as `<pods>p*<threads>t`, with `?` for unknown values.
impl fmt::Display for RunMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.pods {
            Some(pods) => write!(f, "{pods}p")?,
            None => f.write_str("?p")?,
        }
        match self.threads {
            Some(threads) => write!(f, "*{threads}t"),
            None => f.write_str("*?t"),
        }
    }
}
