//! Infrastructure layer with adapters for the domain ports.

/// Application configuration.
pub mod config;
/// Image caching and fetch coordination.
pub mod image;

pub use config::{AppConfig, CacheConfig, CliArgs, LogLevel, StorageManager};
pub use image::{
    CacheStats, DiskLruStore, DispatchOutcome, FetchCoordinator, FetchHandle, FetchPool,
    HttpFetcher, ImageCache, MemoryImageCache, RasterDecoder,
};
