//! Port definition for fetching raw image bytes.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;

use crate::domain::errors::FetchResult;

/// Body of a fetched resource, delivered in chunks.
///
/// Dropping the stream releases the underlying connection.
pub type ByteStream = BoxStream<'static, FetchResult<Bytes>>;

/// Port for opening remote resources.
#[async_trait]
pub trait NetworkFetcher: Send + Sync {
    /// Opens `url` and returns its body.
    ///
    /// Fails with `MalformedRequest` for unparseable URLs and `Network` for
    /// connection or status failures.
    async fn open(&self, url: &str) -> FetchResult<ByteStream>;
}
