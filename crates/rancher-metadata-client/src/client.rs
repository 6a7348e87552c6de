//! HTTP client and retry policy for metadata lookups.
//!
//! The metadata service answers on plain HTTP inside the node; responses
//! are small JSON documents. During container startup the service may not
//! be ready yet, so every failure mode of an attempt (transport, status,
//! decode) is retried on a fixed interval until the caller's deadline has
//! passed, after which the last failure is surfaced as a terminal error.

use std::time::Duration;

use reqwest::header::ACCEPT;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::time::Instant;

use crate::host::HostMetadata;

/// Host name the metadata service is reachable under by default.
pub const DEFAULT_METADATA_HOST: &str = "rancher-metadata";

/// Path of the document describing the host this container runs on.
const SELF_HOST_PATH: &str = "/self/host";

/// Returns the versioned base URL for a metadata host name.
pub fn base_url_for_host(host: &str) -> String {
    format!("http://{}/latest", host)
}

/// Options governing client construction and the retry policy.
#[derive(Debug, Clone)]
pub struct MetadataClientConfig {
    /// Base URL up to and including the API version segment.
    pub base_url: String,
    /// Per-attempt connection timeout.
    pub connect_timeout: Duration,
    /// Per-attempt read timeout.
    pub read_timeout: Duration,
    /// Sleep between failed attempts.
    pub retry_interval: Duration,
}

impl Default for MetadataClientConfig {
    fn default() -> Self {
        Self {
            base_url: base_url_for_host(DEFAULT_METADATA_HOST),
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(5),
            retry_interval: Duration::from_secs(1),
        }
    }
}

/// Error taxonomy for metadata lookups.
#[derive(Debug, Error)]
pub enum MetadataError {
    /// The underlying HTTP client could not be constructed.
    #[error("failed to build metadata HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    /// Transport-level issue (DNS, connect, timeout, socket).
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    /// The service answered with a non-success status.
    #[error("metadata service returned status {0}")]
    Status(StatusCode),
    /// The response body was not the expected JSON document.
    #[error("failed to decode metadata response: {0}")]
    Decode(#[from] serde_json::Error),
    /// Attempts kept failing past the caller's deadline.
    #[error("failed to query metadata service ({path}): {source}")]
    DeadlineExceeded {
        /// Request path of the lookup that was given up on.
        path: String,
        /// Failure of the last attempt made before giving up.
        source: Box<MetadataError>,
    },
}

/// Client for the Rancher Metadata HTTP API.
#[derive(Debug, Clone)]
pub struct MetadataClient {
    /// Underlying HTTP client (shared across attempts).
    client: Client,
    config: MetadataClientConfig,
}

impl MetadataClient {
    /// Builds a client using the supplied configuration.
    pub fn new(config: MetadataClientConfig) -> Result<Self, MetadataError> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .read_timeout(config.read_timeout)
            .build()
            .map_err(MetadataError::Client)?;
        Ok(Self { client, config })
    }

    /// Returns the base URL currently configured for the client.
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// Fetches and decodes a JSON document, retrying failures until `deadline`.
    ///
    /// Attempts are strictly sequential. Transport errors, non-success
    /// statuses, and decode failures are all retried alike. The deadline
    /// gates starting another attempt, not the attempt already in flight;
    /// once it has passed, the next failure is returned as
    /// [`MetadataError::DeadlineExceeded`] carrying the last attempt's error.
    pub async fn fetch<T: DeserializeOwned>(
        &self,
        path: &str,
        deadline: Duration,
    ) -> Result<T, MetadataError> {
        let timeout_at = Instant::now() + deadline;
        loop {
            match self.try_fetch(path).await {
                Ok(document) => return Ok(document),
                Err(error) => {
                    if Instant::now() > timeout_at {
                        return Err(MetadataError::DeadlineExceeded {
                            path: path.to_owned(),
                            source: Box::new(error),
                        });
                    }
                    tracing::debug!(path, error = %error, "metadata request failed, retrying");
                    tokio::time::sleep(self.config.retry_interval).await;
                }
            }
        }
    }

    /// Fetches the host document for the host this container runs on.
    pub async fn self_host(&self, deadline: Duration) -> Result<HostMetadata, MetadataError> {
        self.fetch(SELF_HOST_PATH, deadline).await
    }

    /// Single GET attempt: send, classify the status, decode the body.
    async fn try_fetch<T: DeserializeOwned>(&self, path: &str) -> Result<T, MetadataError> {
        let url = format!("{}{}", self.config.base_url, path);
        let response = self
            .client
            .get(&url)
            .header(ACCEPT, "application/json")
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(MetadataError::Status(status));
        }
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(MetadataError::Decode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_includes_version_segment() {
        assert_eq!(
            base_url_for_host("rancher-metadata"),
            "http://rancher-metadata/latest"
        );
        assert_eq!(
            base_url_for_host("169.254.169.250"),
            "http://169.254.169.250/latest"
        );
    }

    /// Default timeouts match the stock Rancher sidekick configuration.
    #[test]
    fn default_config_matches_stock_timeouts() {
        let config = MetadataClientConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.read_timeout, Duration::from_secs(5));
        assert_eq!(config.retry_interval, Duration::from_secs(1));
        assert_eq!(config.base_url, "http://rancher-metadata/latest");
    }
}
