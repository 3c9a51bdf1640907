//! Domain entity definitions.

mod cache_key;
mod image;
mod slot;

pub use cache_key::CacheKey;
pub use image::{DecodedImage, ImageRequest, ImageSource, LoadedImage};
pub use slot::SlotId;
