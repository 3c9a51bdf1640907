//! In-memory LRU image cache bounded by decoded byte size.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use lru::LruCache;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::domain::entities::{CacheKey, DecodedImage};

/// Bytes in one unit of the host's memory class.
const MEMORY_CLASS_UNIT: usize = 1024 * 1024;

/// Share of the memory class given to the cache (one eighth).
const MEMORY_CLASS_DIVISOR: usize = 8;

/// In-memory LRU cache for decoded images.
///
/// Capacity is measured in pixel-buffer bytes rather than entry count. All
/// mutations, including the recency update done by [`Self::get`], happen under
/// one short lock that never spans I/O.
pub struct MemoryImageCache {
    state: Mutex<CacheState>,
    capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

struct CacheState {
    entries: LruCache<CacheKey, Arc<DecodedImage>>,
    footprint: usize,
}

impl MemoryImageCache {
    /// Creates a new cache holding at most `capacity` bytes of decoded pixels.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(CacheState {
                entries: LruCache::unbounded(),
                footprint: 0,
            }),
            capacity,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Creates a cache sized to one eighth of the host's memory class (in MiB).
    #[must_use]
    pub fn from_memory_class(memory_class_mb: usize) -> Self {
        Self::new(memory_budget(memory_class_mb))
    }

    /// Returns an image and marks it most recently used.
    pub fn get(&self, key: &CacheKey) -> Option<Arc<DecodedImage>> {
        let found = self.state.lock().entries.get(key).cloned();
        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            trace!(key = %key, "Memory cache hit");
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            trace!(key = %key, "Memory cache miss");
        }
        found
    }

    /// Peeks at an image without promoting it in the LRU.
    pub fn peek(&self, key: &CacheKey) -> Option<Arc<DecodedImage>> {
        self.state.lock().entries.peek(key).cloned()
    }

    /// Returns true if `key` is resident.
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.state.lock().entries.contains(key)
    }

    /// Inserts `image` unless `key` is already resident, and returns the
    /// resident image.
    ///
    /// The first writer for a key wins: a concurrent second insert gets the
    /// first image back and leaves the accounting untouched. An image larger
    /// than the whole budget is handed back without being retained.
    pub fn put_if_absent(&self, key: CacheKey, image: Arc<DecodedImage>) -> Arc<DecodedImage> {
        let size = image.footprint();
        let mut state = self.state.lock();

        if let Some(existing) = state.entries.get(&key) {
            trace!(key = %key, "Memory cache already holds key");
            return Arc::clone(existing);
        }

        if size > self.capacity {
            debug!(key = %key, size, capacity = self.capacity, "Image exceeds memory budget, not cached");
            return image;
        }

        while state.footprint + size > self.capacity {
            let Some((evicted, old)) = state.entries.pop_lru() else {
                break;
            };
            state.footprint -= old.footprint();
            debug!(key = %evicted, size = old.footprint(), "Evicted image from memory cache");
        }

        state.footprint += size;
        state.entries.put(key.clone(), Arc::clone(&image));
        debug!(key = %key, size, footprint = state.footprint, "Stored image in memory cache");
        image
    }

    /// Removes an image from the cache.
    pub fn remove(&self, key: &CacheKey) -> Option<Arc<DecodedImage>> {
        let mut state = self.state.lock();
        let removed = state.entries.pop(key)?;
        state.footprint -= removed.footprint();
        debug!(key = %key, "Removed image from memory cache");
        Some(removed)
    }

    /// Clears all images from the cache.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.footprint = 0;
        debug!("Cleared memory image cache");
    }

    /// Returns the number of cached images.
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Returns true if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes currently accounted to cached images.
    pub fn footprint(&self) -> usize {
        self.state.lock().footprint
    }

    /// Configured budget in bytes.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns cache statistics.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total > 0 {
            (hits as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        let (size, footprint) = {
            let state = self.state.lock();
            (state.entries.len(), state.footprint)
        };
        CacheStats {
            hits,
            misses,
            hit_rate,
            size,
            footprint,
            capacity: self.capacity,
        }
    }
}

/// Memory budget for a host memory class given in MiB.
#[must_use]
pub const fn memory_budget(memory_class_mb: usize) -> usize {
    memory_class_mb.saturating_mul(MEMORY_CLASS_UNIT) / MEMORY_CLASS_DIVISOR
}

/// Statistics about cache performance.
#[derive(Debug, Clone)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Hit rate as a percentage.
    pub hit_rate: f64,
    /// Current number of cached images.
    pub size: usize,
    /// Bytes accounted to cached images.
    pub footprint: usize,
    /// Budget in bytes.
    pub capacity: usize,
}

impl std::fmt::Display for CacheStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Cache: {} images, {}/{} bytes, {:.1}% hit rate ({} hits, {} misses)",
            self.size, self.footprint, self.capacity, self.hit_rate, self.hits, self.misses
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 10x10 RGB image: 300 bytes.
    fn small_image() -> Arc<DecodedImage> {
        Arc::new(DecodedImage::new(image::DynamicImage::new_rgb8(10, 10)))
    }

    fn key(name: &str) -> CacheKey {
        CacheKey::from_url(name)
    }

    #[test]
    fn test_cache_put_and_get() {
        let cache = MemoryImageCache::new(10_000);
        let id = key("test1");

        cache.put_if_absent(id.clone(), small_image());
        let retrieved = cache.get(&id);

        assert!(retrieved.is_some());
        assert_eq!(retrieved.unwrap().width(), 10);
    }

    #[test]
    fn test_cache_miss() {
        let cache = MemoryImageCache::new(10_000);
        assert!(cache.get(&key("nonexistent")).is_none());
    }

    #[test]
    fn test_double_insert_keeps_footprint() {
        let cache = MemoryImageCache::new(10_000);
        let id = key("test1");
        let first = small_image();

        cache.put_if_absent(id.clone(), Arc::clone(&first));
        let footprint = cache.footprint();
        let resident = cache.put_if_absent(id.clone(), small_image());

        assert_eq!(cache.footprint(), footprint);
        assert_eq!(cache.len(), 1);
        assert!(Arc::ptr_eq(&resident, &first));
    }

    #[test]
    fn test_eviction_by_footprint() {
        // Room for two 300-byte images.
        let cache = MemoryImageCache::new(600);

        cache.put_if_absent(key("test1"), small_image());
        cache.put_if_absent(key("test2"), small_image());
        cache.put_if_absent(key("test3"), small_image());

        assert!(cache.get(&key("test1")).is_none());
        assert!(cache.get(&key("test2")).is_some());
        assert!(cache.get(&key("test3")).is_some());
        assert!(cache.footprint() <= cache.capacity());
    }

    #[test]
    fn test_get_promotes_entry() {
        let cache = MemoryImageCache::new(600);

        cache.put_if_absent(key("test1"), small_image());
        cache.put_if_absent(key("test2"), small_image());
        let _ = cache.get(&key("test1"));
        cache.put_if_absent(key("test3"), small_image());

        assert!(cache.peek(&key("test1")).is_some());
        assert!(cache.peek(&key("test2")).is_none());
    }

    #[test]
    fn test_peek_does_not_promote() {
        let cache = MemoryImageCache::new(600);

        cache.put_if_absent(key("test1"), small_image());
        cache.put_if_absent(key("test2"), small_image());
        let _ = cache.peek(&key("test1"));
        cache.put_if_absent(key("test3"), small_image());

        assert!(cache.peek(&key("test1")).is_none());
    }

    #[test]
    fn test_capacity_invariant_under_mixed_sizes() {
        let cache = MemoryImageCache::new(5_000);

        for i in 0..50u32 {
            let side = 5 + (i % 7) * 4;
            let img = Arc::new(DecodedImage::new(image::DynamicImage::new_rgba8(
                side, side,
            )));
            cache.put_if_absent(key(&format!("img{i}")), img);
            assert!(cache.footprint() <= cache.capacity());
        }
    }

    #[test]
    fn test_oversized_image_not_retained() {
        let cache = MemoryImageCache::new(100);
        let id = key("big");

        let returned = cache.put_if_absent(id.clone(), small_image());

        assert_eq!(returned.width(), 10);
        assert!(!cache.contains(&id));
        assert_eq!(cache.footprint(), 0);
    }

    #[test]
    fn test_remove_and_clear_release_footprint() {
        let cache = MemoryImageCache::new(10_000);
        cache.put_if_absent(key("a"), small_image());
        cache.put_if_absent(key("b"), small_image());

        assert!(cache.remove(&key("a")).is_some());
        assert_eq!(cache.footprint(), 300);

        cache.clear();
        assert_eq!(cache.footprint(), 0);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_cache_stats() {
        let cache = MemoryImageCache::new(10_000);
        let id = key("test1");
        cache.put_if_absent(id.clone(), small_image());

        let _ = cache.get(&id);
        let _ = cache.get(&key("missing"));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.size, 1);
        assert_eq!(stats.footprint, 300);
    }

    #[test]
    fn test_memory_class_budget() {
        assert_eq!(memory_budget(64), 8 * 1024 * 1024);
        assert_eq!(MemoryImageCache::from_memory_class(16).capacity(), 2 * 1024 * 1024);
    }
}
