//! imgcache - a two-tier image cache with slot-aware fetch coordination.
//!
//! Images are looked up by a content key derived from their URL, first in a
//! byte-budgeted in-memory LRU of decoded rasters, then in a journaled disk
//! store of raw bytes, and finally fetched over the network. A
//! [`FetchCoordinator`](infrastructure::FetchCoordinator) routes requests for
//! recyclable display slots through the cache, coalescing duplicates and
//! dropping results that arrive after the slot moved on.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

/// Domain layer containing entities, errors, and port definitions.
pub mod domain;
/// Infrastructure layer containing adapters for external services.
pub mod infrastructure;

/// Current version of the library.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name.
pub const NAME: &str = "imgcache";
