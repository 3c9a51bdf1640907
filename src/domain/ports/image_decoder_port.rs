//! Port definition for decoding encoded image bytes.

use crate::domain::entities::DecodedImage;
use crate::domain::errors::FetchResult;

/// Port for turning encoded bytes into rasters.
///
/// Calls are CPU bound and are made from blocking worker threads.
pub trait ImageDecoder: Send + Sync {
    /// Reads the native dimensions without allocating a pixel buffer.
    fn read_dimensions(&self, bytes: &[u8]) -> FetchResult<(u32, u32)>;

    /// Decodes the image with both dimensions divided by `sample_size`.
    /// A `sample_size` of 1 decodes at native resolution.
    fn decode(&self, bytes: &[u8], sample_size: u32) -> FetchResult<DecodedImage>;
}
