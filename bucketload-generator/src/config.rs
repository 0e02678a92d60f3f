//! Configuration for the load generator.
//!
//! The load shape is configured through plain environment variables, so that a container
//! deployment only needs an `env` section:
//!
//! | Variable | Description |
//! |---|---|
//! | `ENDPOINT_HOSTNAME` | storage service host |
//! | `ENDPOINT_PORT` | storage service port |
//! | `IS_SECURE` | `1` (default) for `https`, `0` for `http` |
//! | `BUCKET_NAME` | bucket that objects are written to |
//! | `NUM_THREADS` | number of concurrent workers |
//! | `OBJ_MEAN_KB` | mean object size in KiB |
//! | `OBJ_STDDEV_KB` | standard deviation of the object size in KiB |
//! | `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY` | optional storage credentials |
//!
//! Everything else is ambient and uses the `BUCKETLOAD__` prefix with double underscores (`__`)
//! to denote nested structures, for example:
//!
//! - `BUCKETLOAD__LOGGING__LEVEL=debug`
//! - `BUCKETLOAD__LOGGING__FORMAT=json`
//! - `BUCKETLOAD__STORAGE__REQUEST_TIMEOUT=30s`
//! - `BUCKETLOAD__STORAGE__TYPE=memory`
//! - `BUCKETLOAD__PUBLIC_READ=false`
//!
//! All settings can also be given in a YAML file passed with `-c`, using the lowercase names:
//!
//! ```yaml
//! endpoint_hostname: s3.example.com
//! endpoint_port: 7480
//! bucket_name: stress
//! num_threads: 8
//! obj_mean_kb: 1024
//! obj_stddev_kb: 256
//!
//! logging:
//!   level: debug
//! ```
//!
//! Environment variables take precedence over the file. Unlike most configuration errors,
//! validation does not stop at the first problem: every missing or malformed setting is reported
//! in one [`ConfigErrors`].

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use bucketload_storage::{S3Config, StorageConfig};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use secrecy::{
    CloneableSecret, ExposeSecret, SecretBox, SecretString, SerializableSecret, zeroize::Zeroize,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::pool::PoolSettings;

/// Environment variable prefix for ambient configuration options.
const ENV_PREFIX: &str = "BUCKETLOAD__";

/// Storage service host.
pub const ENDPOINT_HOSTNAME: &str = "ENDPOINT_HOSTNAME";
/// Storage service port.
pub const ENDPOINT_PORT: &str = "ENDPOINT_PORT";
/// Whether to use an encrypted transport.
pub const IS_SECURE: &str = "IS_SECURE";
/// Target bucket.
pub const BUCKET_NAME: &str = "BUCKET_NAME";
/// Number of concurrent workers.
pub const NUM_THREADS: &str = "NUM_THREADS";
/// Mean object size in KiB.
pub const OBJ_MEAN_KB: &str = "OBJ_MEAN_KB";
/// Object size standard deviation in KiB.
pub const OBJ_STDDEV_KB: &str = "OBJ_STDDEV_KB";

/// Unprefixed environment variables picked up verbatim.
const RAW_ENV_KEYS: &[&str] = &[
    ENDPOINT_HOSTNAME,
    ENDPOINT_PORT,
    IS_SECURE,
    BUCKET_NAME,
    NUM_THREADS,
    OBJ_MEAN_KB,
    OBJ_STDDEV_KB,
    "AWS_ACCESS_KEY_ID",
    "AWS_SECRET_ACCESS_KEY",
];

/// Unprefixed variables that are taken as text, even if they look like numbers or booleans.
const TEXT_ENV_KEYS: &[&str] = &[
    ENDPOINT_HOSTNAME,
    BUCKET_NAME,
    "AWS_ACCESS_KEY_ID",
    "AWS_SECRET_ACCESS_KEY",
];

/// Newtype around `String` that protects against accidental logging of credentials. Use with
/// [`secrecy::SecretBox`].
#[derive(Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConfigSecret(String);

impl ConfigSecret {
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<&str> for ConfigSecret {
    fn from(str: &str) -> Self {
        ConfigSecret(str.to_string())
    }
}

impl fmt::Debug for ConfigSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "[redacted]")
    }
}

impl CloneableSecret for ConfigSecret {}
impl SerializableSecret for ConfigSecret {}
impl Zeroize for ConfigSecret {
    fn zeroize(&mut self) {
        self.0.zeroize();
    }
}

/// A single problem with the configuration.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum ConfigError {
    /// A required variable is not set.
    #[error("Missing environment variable {0}")]
    Missing(&'static str),

    /// A variable that must be a non-negative integer is not one.
    #[error("{0} is not an integer value")]
    NotAnInteger(&'static str),

    /// A variable has the right type but an unusable value.
    #[error("{key} must be {expected}")]
    OutOfRange {
        /// The offending variable.
        key: &'static str,
        /// Description of the accepted values.
        expected: &'static str,
    },

    /// The configuration sources could not be read or have the wrong shape.
    #[error("invalid configuration: {0}")]
    Source(String),
}

impl ConfigError {
    /// Name of the setting this error is about, if it concerns a single variable.
    pub fn key(&self) -> Option<&'static str> {
        match self {
            Self::Missing(key) | Self::NotAnInteger(key) | Self::OutOfRange { key, .. } => {
                Some(key)
            }
            Self::Source(_) => None,
        }
    }
}

/// All problems found while loading the configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct ConfigErrors(Vec<ConfigError>);

impl ConfigErrors {
    /// Iterates over the individual errors.
    pub fn iter(&self) -> impl Iterator<Item = &ConfigError> {
        self.0.iter()
    }

    /// Returns `true` if any error concerns the given variable.
    pub fn mentions(&self, key: &str) -> bool {
        self.iter().any(|error| error.key() == Some(key))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ConfigErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} configuration error(s)", self.0.len())?;
        for error in &self.0 {
            write!(f, "; {error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ConfigErrors {}

impl<'a> IntoIterator for &'a ConfigErrors {
    type Item = &'a ConfigError;
    type IntoIter = std::slice::Iter<'a, ConfigError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Log output format.
///
/// Controls how log messages are formatted. The format can be explicitly specified or
/// auto-detected based on whether output is to a TTY.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Auto detect the best format.
    ///
    /// This chooses [`LogFormat::Pretty`] for TTY, otherwise [`LogFormat::Simplified`].
    Auto,

    /// Pretty printing with colors.
    ///
    /// ```text
    ///  INFO  bucketload_generator::pool > started 8 workers
    /// ```
    Pretty,

    /// Simplified plain text output.
    ///
    /// ```text
    /// 2018-09-10T15:50:12Z INFO bucketload_generator::pool: started 8 workers
    /// ```
    Simplified,

    /// Dump out JSON lines.
    Json,
}

/// The logging format parse error.
#[derive(Clone, Debug)]
pub struct FormatParseError(String);

impl fmt::Display for FormatParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            r#"error parsing "{}" as format: expected one of "auto", "pretty", "simplified", "json""#,
            self.0
        )
    }
}

impl std::str::FromStr for LogFormat {
    type Err = FormatParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let result = match s {
            "" => LogFormat::Auto,
            s if s.eq_ignore_ascii_case("auto") => LogFormat::Auto,
            s if s.eq_ignore_ascii_case("pretty") => LogFormat::Pretty,
            s if s.eq_ignore_ascii_case("simplified") => LogFormat::Simplified,
            s if s.eq_ignore_ascii_case("json") => LogFormat::Json,
            s => return Err(FormatParseError(s.into())),
        };

        Ok(result)
    }
}

impl std::error::Error for FormatParseError {}

mod display_fromstr {
    pub fn serialize<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
        T: std::fmt::Display,
    {
        serializer.collect_str(&value)
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
    where
        D: serde::Deserializer<'de>,
        T: std::str::FromStr,
        <T as std::str::FromStr>::Err: std::fmt::Display,
    {
        use serde::Deserialize;
        let s = <std::borrow::Cow<'de, str>>::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Logging configuration.
///
/// Logs are always written to stderr.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Logging {
    /// Minimum log level to output.
    ///
    /// The `RUST_LOG` environment variable provides more granular control per module if needed.
    /// Every upload attempt is logged at `INFO` (or `ERROR` if it failed), so use `WARN` to
    /// silence the per-request lines.
    ///
    /// # Default
    ///
    /// `INFO`
    ///
    /// # Environment Variable
    ///
    /// `BUCKETLOAD__LOGGING__LEVEL`
    #[serde(with = "display_fromstr")]
    pub level: LevelFilter,

    /// Log output format.
    ///
    /// # Default
    ///
    /// `Auto` (pretty for TTY, simplified otherwise)
    ///
    /// # Environment Variable
    ///
    /// `BUCKETLOAD__LOGGING__FORMAT`
    pub format: LogFormat,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            level: LevelFilter::INFO,
            format: LogFormat::Auto,
        }
    }
}

/// Which storage implementation workers write to.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    /// The S3-compatible service at `ENDPOINT_HOSTNAME:ENDPOINT_PORT`.
    #[default]
    S3Compatible,
    /// An in-process store that discards payloads; useful for dry runs of the pipeline.
    Memory,
}

/// Storage client settings.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Storage implementation.
    ///
    /// # Environment Variable
    ///
    /// `BUCKETLOAD__STORAGE__TYPE`
    #[serde(rename = "type")]
    pub kind: StorageKind,

    /// Upper bound for a single upload, including the payload transfer.
    ///
    /// A timed out upload is reported like any other failure.
    ///
    /// # Default
    ///
    /// `None` (no client-side timeout)
    ///
    /// # Environment Variable
    ///
    /// `BUCKETLOAD__STORAGE__REQUEST_TIMEOUT`
    #[serde(with = "humantime_serde")]
    pub request_timeout: Option<Duration>,
}

/// A loosely typed value as it comes out of the environment or YAML.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(untagged)]
enum Setting {
    Unsigned(u64),
    Signed(i64),
    Float(f64),
    Bool(bool),
    Text(String),
}

impl Setting {
    fn to_text(&self) -> String {
        match self {
            Self::Unsigned(value) => value.to_string(),
            Self::Signed(value) => value.to_string(),
            Self::Float(value) => value.to_string(),
            Self::Bool(value) => value.to_string(),
            Self::Text(value) => value.clone(),
        }
    }

    fn to_unsigned(&self) -> Option<u64> {
        match self {
            Self::Unsigned(value) => Some(*value),
            Self::Text(value) if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) => {
                value.parse().ok()
            }
            _ => None,
        }
    }
}

/// The configuration as extracted from all sources, before validation.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
struct RawConfig {
    endpoint_hostname: Option<Setting>,
    endpoint_port: Option<Setting>,
    is_secure: Option<Setting>,
    bucket_name: Option<Setting>,
    num_threads: Option<Setting>,
    obj_mean_kb: Option<Setting>,
    obj_stddev_kb: Option<Setting>,
    aws_access_key_id: Option<SecretBox<ConfigSecret>>,
    aws_secret_access_key: Option<SecretBox<ConfigSecret>>,
    public_read: bool,
    storage: StorageSettings,
    logging: Logging,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            endpoint_hostname: None,
            endpoint_port: None,
            is_secure: None,
            bucket_name: None,
            num_threads: None,
            obj_mean_kb: None,
            obj_stddev_kb: None,
            aws_access_key_id: None,
            aws_secret_access_key: None,
            public_read: true,
            storage: StorageSettings::default(),
            logging: Logging::default(),
        }
    }
}

fn required(key: &'static str, setting: Option<Setting>) -> Result<Setting, ConfigError> {
    setting.ok_or(ConfigError::Missing(key))
}

fn required_text(key: &'static str, setting: Option<Setting>) -> Result<String, ConfigError> {
    let text = required(key, setting)?.to_text();
    if text.is_empty() {
        return Err(ConfigError::Missing(key));
    }
    Ok(text)
}

fn required_unsigned(key: &'static str, setting: Option<Setting>) -> Result<u64, ConfigError> {
    required(key, setting)?
        .to_unsigned()
        .ok_or(ConfigError::NotAnInteger(key))
}

fn positive(key: &'static str, value: u64) -> Result<u64, ConfigError> {
    match value {
        0 => Err(ConfigError::OutOfRange {
            key,
            expected: "greater than zero",
        }),
        value => Ok(value),
    }
}

/// Accumulates errors so that all of them can be reported at once.
#[derive(Default)]
struct Validator {
    errors: Vec<ConfigError>,
}

impl Validator {
    fn check<T>(&mut self, result: Result<T, ConfigError>) -> Option<T> {
        result.map_err(|error| self.errors.push(error)).ok()
    }
}

impl RawConfig {
    fn validate(self) -> Result<Config, ConfigErrors> {
        let mut v = Validator::default();

        let endpoint_host = v.check(required_text(ENDPOINT_HOSTNAME, self.endpoint_hostname));
        let endpoint_port = v.check(
            required_unsigned(ENDPOINT_PORT, self.endpoint_port).and_then(|port| {
                u16::try_from(port)
                    .ok()
                    .filter(|port| *port > 0)
                    .ok_or(ConfigError::OutOfRange {
                        key: ENDPOINT_PORT,
                        expected: "between 1 and 65535",
                    })
            }),
        );
        let secure = v.check(match self.is_secure {
            None => Ok(true),
            Some(Setting::Bool(secure)) => Ok(secure),
            Some(setting) => match setting.to_unsigned() {
                Some(0) => Ok(false),
                Some(1) => Ok(true),
                Some(_) => Err(ConfigError::OutOfRange {
                    key: IS_SECURE,
                    expected: "0 or 1",
                }),
                None => Err(ConfigError::NotAnInteger(IS_SECURE)),
            },
        });
        let bucket_name = v.check(required_text(BUCKET_NAME, self.bucket_name));
        let num_workers = v.check(
            required_unsigned(NUM_THREADS, self.num_threads)
                .and_then(|n| positive(NUM_THREADS, n))
                .and_then(|n| {
                    usize::try_from(n).map_err(|_| ConfigError::OutOfRange {
                        key: NUM_THREADS,
                        expected: "addressable on this platform",
                    })
                }),
        );
        let object_mean_kb = v.check(required_unsigned(OBJ_MEAN_KB, self.obj_mean_kb));
        let object_stddev_kb = v.check(required_unsigned(OBJ_STDDEV_KB, self.obj_stddev_kb));

        match (
            endpoint_host,
            endpoint_port,
            secure,
            bucket_name,
            num_workers,
            object_mean_kb,
            object_stddev_kb,
        ) {
            (
                Some(endpoint_host),
                Some(endpoint_port),
                Some(secure),
                Some(bucket_name),
                Some(num_workers),
                Some(object_mean_kb),
                Some(object_stddev_kb),
            ) if v.errors.is_empty() => Ok(Config {
                endpoint_host,
                endpoint_port,
                secure,
                bucket_name,
                num_workers,
                object_mean_kb,
                object_stddev_kb,
                public_read: self.public_read,
                access_key: self.aws_access_key_id,
                secret_key: self.aws_secret_access_key,
                storage: self.storage,
                logging: self.logging,
            }),
            _ => Err(ConfigErrors(v.errors)),
        }
    }
}

/// The [`TEXT_ENV_KEYS`] exactly as set, bypassing figment's value parsing.
///
/// `Env` would otherwise turn `BUCKET_NAME=00123` into the number `123`.
fn raw_text_env() -> BTreeMap<String, String> {
    Env::raw()
        .only(TEXT_ENV_KEYS)
        .iter()
        .map(|(key, value)| (key.as_str().to_ascii_lowercase(), value))
        .collect()
}

/// Validated, immutable configuration of a load generator process.
#[derive(Debug)]
pub struct Config {
    /// Storage service host, also reported in every telemetry record.
    pub endpoint_host: String,
    /// Storage service port.
    pub endpoint_port: u16,
    /// Use `https` towards the storage service.
    pub secure: bool,
    /// Bucket that objects are written to.
    pub bucket_name: String,
    /// Number of concurrent workers.
    pub num_workers: usize,
    /// Mean object size in KiB.
    pub object_mean_kb: u64,
    /// Standard deviation of the object size in KiB.
    pub object_stddev_kb: u64,
    /// Grant anonymous read access on the bucket before starting.
    pub public_read: bool,
    /// Storage access key id.
    pub access_key: Option<SecretBox<ConfigSecret>>,
    /// Storage secret access key.
    pub secret_key: Option<SecretBox<ConfigSecret>>,
    /// Storage client settings.
    pub storage: StorageSettings,
    /// Logging settings.
    pub logging: Logging,
}

impl Config {
    /// Loads configuration from defaults, an optional YAML file and the environment.
    ///
    /// Configuration is merged in the following order (later sources override earlier ones):
    /// 1. Default values
    /// 2. YAML configuration file (if `path` is given)
    /// 3. The unprefixed variables listed in the [module docs](self)
    /// 4. Environment variables prefixed with `BUCKETLOAD__`
    ///
    /// # Errors
    ///
    /// Returns every problem found, not just the first one.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigErrors> {
        let mut figment = Figment::from(Serialized::defaults(RawConfig::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }

        let raw: RawConfig = figment
            .merge(Env::raw().only(RAW_ENV_KEYS))
            .merge(Serialized::defaults(raw_text_env()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(|error| {
                ConfigErrors(
                    error
                        .into_iter()
                        .map(|error| ConfigError::Source(error.to_string()))
                        .collect(),
                )
            })?;

        raw.validate()
    }

    /// Settings for the storage client.
    pub fn storage_config(&self) -> StorageConfig {
        let expose = |secret: &Option<SecretBox<ConfigSecret>>| -> Option<SecretString> {
            secret
                .as_ref()
                .map(|secret| secret.expose_secret().as_str().to_owned().into())
        };

        match self.storage.kind {
            StorageKind::Memory => StorageConfig::InMemory,
            StorageKind::S3Compatible => StorageConfig::S3Compatible(S3Config {
                host: self.endpoint_host.clone(),
                port: self.endpoint_port,
                secure: self.secure,
                access_key: expose(&self.access_key),
                secret_key: expose(&self.secret_key),
                request_timeout: self.storage.request_timeout,
            }),
        }
    }

    /// Settings for the worker pool.
    pub fn pool_settings(&self) -> PoolSettings {
        PoolSettings {
            endpoint_host: self.endpoint_host.clone(),
            bucket_name: self.bucket_name.clone(),
            num_workers: self.num_workers,
            object_mean_kb: self.object_mean_kb,
            object_stddev_kb: self.object_stddev_kb,
            public_read: self.public_read,
        }
    }
}
