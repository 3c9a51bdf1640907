//! Image handling infrastructure.
//!
//! This module provides:
//! - Memory caching of decoded images with LRU eviction
//! - A journaled disk store for raw image bytes
//! - HTTP fetching and size-aware decoding
//! - Slot-aware fetch coordination on a bounded pool

pub mod disk_store;
pub mod fetch_coordinator;
pub mod http_fetcher;
pub mod image_cache;
pub mod image_decoder;
pub mod memory_cache;
pub mod worker_pool;

pub use disk_store::DiskLruStore;
pub use fetch_coordinator::{DispatchOutcome, FetchCoordinator, FetchHandle};
pub use http_fetcher::HttpFetcher;
pub use image_cache::ImageCache;
pub use image_decoder::RasterDecoder;
pub use memory_cache::{CacheStats, MemoryImageCache};
pub use worker_pool::FetchPool;
