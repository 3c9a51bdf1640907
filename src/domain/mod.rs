//! Domain layer with core entities, errors and port definitions.

/// Entity definitions.
pub mod entities;
/// Error types.
pub mod errors;
/// Port definitions.
pub mod ports;
/// Pure domain rules.
pub mod services;

pub use entities::{CacheKey, DecodedImage, ImageRequest, ImageSource, LoadedImage, SlotId};
pub use errors::{FetchError, FetchResult, StoreError, StoreResult};
pub use ports::{ImageDecoder, NetworkFetcher, PersistentStore, SlotTarget};
