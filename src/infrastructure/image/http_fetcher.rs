//! HTTP(S) adapter for the network fetcher port.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use tracing::debug;

use crate::domain::errors::{FetchError, FetchResult};
use crate::domain::ports::{ByteStream, NetworkFetcher};

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Fetches image bodies over HTTP(S) with `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Creates a fetcher whose requests give up after `timeout`.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created.
    pub fn new(timeout: Duration) -> FetchResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::network(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl NetworkFetcher for HttpFetcher {
    async fn open(&self, url: &str) -> FetchResult<ByteStream> {
        let parsed =
            reqwest::Url::parse(url).map_err(|e| FetchError::malformed(url, e.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(FetchError::malformed(
                url,
                format!("unsupported scheme {}", parsed.scheme()),
            ));
        }

        debug!(url = %parsed, "Downloading image from network");

        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|e| FetchError::network(format!("Request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(FetchError::network(format!(
                "HTTP {}: {}",
                response.status(),
                response.status().canonical_reason().unwrap_or("Unknown")
            )));
        }

        Ok(response
            .bytes_stream()
            .map(|chunk| {
                chunk.map_err(|e| FetchError::network(format!("Failed to read body: {e}")))
            })
            .boxed())
    }
}
