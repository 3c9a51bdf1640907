//! `image` crate adapter for the decoder port.

use std::io::Cursor;

use image::imageops::FilterType;

use crate::domain::entities::DecodedImage;
use crate::domain::errors::{FetchError, FetchResult};
use crate::domain::ports::ImageDecoder;
use crate::domain::services::sampled_dimensions;

/// Decodes PNG, JPEG and WebP bytes, downsampling by an integer factor.
#[derive(Debug, Clone, Copy)]
pub struct RasterDecoder {
    filter: FilterType,
}

impl RasterDecoder {
    /// Creates a decoder that downsamples with `filter`.
    #[must_use]
    pub const fn new(filter: FilterType) -> Self {
        Self { filter }
    }
}

impl Default for RasterDecoder {
    fn default() -> Self {
        Self::new(FilterType::Triangle)
    }
}

impl ImageDecoder for RasterDecoder {
    fn read_dimensions(&self, bytes: &[u8]) -> FetchResult<(u32, u32)> {
        image::ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| FetchError::decode(format!("Failed to read image header: {e}")))?
            .into_dimensions()
            .map_err(|e| FetchError::decode(format!("Failed to read image header: {e}")))
    }

    fn decode(&self, bytes: &[u8], sample_size: u32) -> FetchResult<DecodedImage> {
        let raster = image::load_from_memory(bytes)
            .map_err(|e| FetchError::decode(format!("Failed to decode image: {e}")))?;

        if sample_size <= 1 {
            return Ok(raster.into());
        }

        let (width, height) = sampled_dimensions(raster.width(), raster.height(), sample_size);
        Ok(raster.resize_exact(width, height, self.filter).into())
    }
}

/// Encodes a blank PNG of the given size.
#[cfg(test)]
pub(crate) fn png_fixture(width: u32, height: u32) -> bytes::Bytes {
    let mut buf = Vec::new();
    image::DynamicImage::new_rgb8(width, height)
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .unwrap();
    bytes::Bytes::from(buf)
}
