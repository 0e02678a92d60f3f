use std::fmt;
use std::time::Duration;

use aws_sdk_s3::Client;
use aws_sdk_s3::config::retry::RetryConfig;
use aws_sdk_s3::config::timeout::TimeoutConfig;
use aws_sdk_s3::config::{AppName, BehaviorVersion, Credentials, Region};
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::BucketCannedAcl;
use bytes::Bytes;
use secrecy::ExposeSecret;

use super::common::{Container, Storage, StorageError, StorageResult};
use crate::S3Config;

/// Region sent with every request. S3-compatible services other than AWS generally ignore it.
const REGION: &str = "us-east-1";

/// Identifies our requests in the user agent.
const APP_NAME: &str = "bucketload";

/// Storage backed by an S3-compatible service using path-style addressing.
pub struct S3CompatibleStorage {
    client: Client,
    endpoint: String,
    request_timeout: Option<Duration>,
}

impl S3CompatibleStorage {
    /// Creates a client for the endpoint described by `config`.
    ///
    /// No connection is made until the first request.
    pub fn new(config: &S3Config) -> Self {
        let endpoint = config.endpoint_url();

        let access_key = config
            .access_key
            .as_ref()
            .map(|key| key.expose_secret().to_owned())
            .unwrap_or_default();
        let secret_key = config
            .secret_key
            .as_ref()
            .map(|key| key.expose_secret().to_owned())
            .unwrap_or_default();
        if access_key.is_empty() {
            tracing::warn!("no storage credentials configured, signing with empty credentials");
        }
        let credentials = Credentials::new(access_key, secret_key, None, None, APP_NAME);

        let mut timeouts = TimeoutConfig::builder();
        if let Some(timeout) = config.request_timeout {
            timeouts = timeouts.operation_timeout(timeout);
        }

        let mut builder = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(&endpoint)
            .region(Region::new(REGION))
            .credentials_provider(credentials)
            .force_path_style(true)
            // Every upload is attempted exactly once, failures are reported instead.
            .retry_config(RetryConfig::disabled())
            .timeout_config(timeouts.build());
        builder.set_app_name(AppName::new(APP_NAME).ok());

        Self {
            client: Client::from_conf(builder.build()),
            endpoint,
            request_timeout: config.request_timeout,
        }
    }

    fn convert_error<E, R>(&self, context: &str, error: SdkError<E, R>) -> StorageError
    where
        E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
        R: fmt::Debug + Send + Sync + 'static,
    {
        match error {
            SdkError::TimeoutError(_) => {
                StorageError::Timeout(self.request_timeout.unwrap_or_default())
            }
            SdkError::ServiceError(service_error) => {
                let err = service_error.err();
                let code = err.code().map(str::to_owned);
                let message = match (err.code(), err.message()) {
                    (_, Some(message)) => format!("{context}: {message}"),
                    (Some(code), None) => format!("{context}: {code}"),
                    (None, None) => format!("{context}: {}", DisplayErrorContext(err)),
                };
                StorageError::Service { code, message }
            }
            other => StorageError::Transport(format!("{context}: {}", DisplayErrorContext(&other))),
        }
    }
}

impl fmt::Debug for S3CompatibleStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3CompatibleStorage")
            .field("endpoint", &self.endpoint)
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl Storage for S3CompatibleStorage {
    fn name(&self) -> &'static str {
        "s3-compatible"
    }

    #[tracing::instrument(level = "trace", skip(self))]
    async fn create_or_open_container(&self, name: &str) -> StorageResult<Container> {
        tracing::debug!("Creating bucket on s3-compatible storage");
        match self.client.create_bucket().bucket(name).send().await {
            Ok(_) => Ok(Container::new(name)),
            Err(error)
                if error
                    .as_service_error()
                    .is_some_and(|e| e.is_bucket_already_owned_by_you()) =>
            {
                tracing::debug!("Bucket already exists, reusing it");
                Ok(Container::new(name))
            }
            Err(error) => Err(self.convert_error("failed to create bucket", error)),
        }
    }

    #[tracing::instrument(level = "trace", skip_all, fields(bucket = container.name()))]
    async fn set_public_read_access(&self, container: &Container) -> StorageResult<()> {
        tracing::debug!("Setting public-read ACL on s3-compatible storage");
        self.client
            .put_bucket_acl()
            .bucket(container.name())
            .acl(BucketCannedAcl::PublicRead)
            .send()
            .await
            .map_err(|error| self.convert_error("failed to set bucket ACL", error))?;
        Ok(())
    }

    #[tracing::instrument(level = "trace", skip_all, fields(bucket = container.name(), key = key))]
    async fn put_object(
        &self,
        container: &Container,
        key: &str,
        payload: Bytes,
    ) -> StorageResult<()> {
        self.client
            .put_object()
            .bucket(container.name())
            .key(key)
            .body(ByteStream::from(payload))
            .send()
            .await
            .map_err(|error| self.convert_error("failed to write object", error))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage(port: u16) -> S3CompatibleStorage {
        S3CompatibleStorage::new(&S3Config {
            host: "127.0.0.1".into(),
            port,
            secure: false,
            access_key: Some("access".to_owned().into()),
            secret_key: Some("secret".to_owned().into()),
            request_timeout: Some(Duration::from_secs(2)),
        })
    }

    #[test]
    fn debug_hides_client() {
        let debug = format!("{:?}", storage(9000));
        assert!(debug.contains("http://127.0.0.1:9000"));
        assert!(!debug.contains("secret"));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_transport_error() {
        // Bind and drop a listener to find a port that nothing listens on.
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let storage = storage(port);
        let container = Container::new("bench");
        let error = storage
            .put_object(&container, "key", Bytes::from_static(b"data"))
            .await
            .unwrap_err();

        assert!(
            matches!(error, StorageError::Transport(_) | StorageError::Timeout(_)),
            "{error:?}"
        );
        assert!(!error.to_string().is_empty());
    }
}
