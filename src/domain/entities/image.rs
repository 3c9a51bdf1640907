//! Domain types for decoded images and fetch requests.

use std::sync::Arc;

use super::CacheKey;

/// A decoded raster held in memory.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    raster: image::DynamicImage,
}

impl DecodedImage {
    /// Wraps a decoded raster.
    #[must_use]
    pub const fn new(raster: image::DynamicImage) -> Self {
        Self { raster }
    }

    /// Width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.raster.width()
    }

    /// Height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.raster.height()
    }

    /// Bytes occupied by the pixel buffer.
    ///
    /// This is the unit the memory cache accounts its budget in.
    #[must_use]
    pub fn footprint(&self) -> usize {
        self.raster.as_bytes().len()
    }

    /// Borrows the underlying raster.
    #[must_use]
    pub const fn raster(&self) -> &image::DynamicImage {
        &self.raster
    }
}

impl From<image::DynamicImage> for DecodedImage {
    fn from(raster: image::DynamicImage) -> Self {
        Self::new(raster)
    }
}

/// Where an image was loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSource {
    /// Loaded from the in-memory LRU cache.
    Memory,
    /// Decoded from bytes already in the persistent store.
    Disk,
    /// Downloaded by this request.
    Network,
}

impl std::fmt::Display for ImageSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Memory => write!(f, "memory"),
            Self::Disk => write!(f, "disk"),
            Self::Network => write!(f, "network"),
        }
    }
}

/// A fully loaded image, ready for display.
#[derive(Debug, Clone)]
pub struct LoadedImage {
    /// Key the image is cached under.
    pub key: CacheKey,
    /// Shared, read-only view of the decoded raster.
    pub image: Arc<DecodedImage>,
    /// Tier that satisfied the request.
    pub source: ImageSource,
}

/// A request for an image sized to fit a target box.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRequest {
    /// Source URL.
    pub url: String,
    /// Width of the box the image will be shown in.
    pub width: u32,
    /// Height of the box the image will be shown in.
    pub height: u32,
}

impl ImageRequest {
    /// Creates a new request.
    #[must_use]
    pub fn new(url: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            url: url.into(),
            width,
            height,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_footprint_counts_every_channel() {
        let rgb = DecodedImage::new(image::DynamicImage::new_rgb8(10, 4));
        let rgba = DecodedImage::new(image::DynamicImage::new_rgba8(10, 4));

        assert_eq!(rgb.footprint(), 10 * 4 * 3);
        assert_eq!(rgba.footprint(), 10 * 4 * 4);
    }

    #[test]
    fn test_source_display() {
        assert_eq!(ImageSource::Memory.to_string(), "memory");
        assert_eq!(ImageSource::Network.to_string(), "network");
    }
}
