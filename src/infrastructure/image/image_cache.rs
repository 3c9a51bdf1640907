//! Two-tier image cache orchestrator.
//!
//! Implements a three-step lookup: Memory -> Disk -> Network. Raw encoded
//! bytes are the unit of persistence; decoded pixels only ever live in memory.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Weak};
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::domain::entities::{CacheKey, DecodedImage, ImageSource, LoadedImage};
use crate::domain::errors::{FetchError, FetchResult, StoreError};
use crate::domain::ports::{ByteStream, ImageDecoder, NetworkFetcher, PersistentStore, StoreEditor};
use crate::domain::services::sample_size;
use crate::infrastructure::config::CacheConfig;

use super::disk_store::DiskLruStore;
use super::memory_cache::{CacheStats, MemoryImageCache};

/// On-disk format version. Bumping it discards every persisted entry.
pub const STORE_VERSION: u32 = 1;

/// Slot holding the encoded bytes of an entry.
const VALUE_SLOT: usize = 0;

/// Memory + persistent image cache with size-aware decoding.
pub struct ImageCache {
    memory: Arc<MemoryImageCache>,
    persistent: Option<Arc<PersistentTier>>,
    fetcher: Arc<dyn NetworkFetcher>,
    decoder: Arc<dyn ImageDecoder>,
    /// Per-key write locks, alive only while someone holds or waits on them.
    write_locks: Mutex<HashMap<CacheKey, Weak<AsyncMutex<()>>>>,
}

/// Persistent store plus the directory whose existence gates every use.
struct PersistentTier {
    store: Arc<dyn PersistentStore>,
    directory: PathBuf,
    healthy: AtomicBool,
}

impl PersistentTier {
    /// Returns the store if it is still usable.
    ///
    /// A missing directory disables the tier for the rest of the process;
    /// the directory is never recreated.
    async fn checked(&self) -> Option<&dyn PersistentStore> {
        if !self.healthy.load(Ordering::Acquire) {
            return None;
        }
        if tokio::fs::try_exists(&self.directory).await.unwrap_or(false) {
            Some(self.store.as_ref())
        } else {
            self.demote(&StoreError::Closed(self.directory.display().to_string()));
            None
        }
    }

    fn demote(&self, reason: &StoreError) {
        if self.healthy.swap(false, Ordering::AcqRel) {
            warn!(
                path = %self.directory.display(),
                error = %reason,
                "Persistent image cache unavailable, continuing memory-only"
            );
        }
    }

    fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Acquire)
    }
}

/// What the locked part of a store-backed fetch found.
enum Lookup {
    Stored(ImageSource),
    /// Downloaded but not stored; decode it in memory.
    Unstored(ByteStream),
}

/// Outcome of copying a download into the store.
enum StoreWrite {
    Written,
    /// Nothing was consumed from the body; it can still be decoded in memory.
    Skipped(ByteStream),
    /// The store failed part way; the body is gone.
    Failed,
}

enum CopyFailure {
    Network(FetchError),
    Store(StoreError),
}

impl std::fmt::Debug for ImageCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageCache")
            .field("memory", &self.memory.stats())
            .field(
                "persistent",
                &self.persistent.as_ref().map(|t| t.directory.display().to_string()),
            )
            .finish_non_exhaustive()
    }
}

impl ImageCache {
    /// Creates a memory-only cache.
    #[must_use]
    pub fn new(
        memory: MemoryImageCache,
        fetcher: Arc<dyn NetworkFetcher>,
        decoder: Arc<dyn ImageDecoder>,
    ) -> Self {
        Self {
            memory: Arc::new(memory),
            persistent: None,
            fetcher,
            decoder,
            write_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Creates a cache backed by `store`, whose files live in `directory`.
    #[must_use]
    pub fn with_store(
        memory: MemoryImageCache,
        store: Arc<dyn PersistentStore>,
        directory: PathBuf,
        fetcher: Arc<dyn NetworkFetcher>,
        decoder: Arc<dyn ImageDecoder>,
    ) -> Self {
        let mut cache = Self::new(memory, fetcher, decoder);
        cache.persistent = Some(Arc::new(PersistentTier {
            store,
            directory,
            healthy: AtomicBool::new(true),
        }));
        cache
    }

    /// Builds both tiers from configuration.
    ///
    /// A store that cannot be opened leaves the cache memory-only.
    pub async fn open(
        config: &CacheConfig,
        fetcher: Arc<dyn NetworkFetcher>,
        decoder: Arc<dyn ImageDecoder>,
    ) -> Self {
        let memory = MemoryImageCache::from_memory_class(config.memory_class_mb);

        let Some(directory) = config.cache_dir() else {
            info!(budget = memory.capacity(), "Image cache running memory-only");
            return Self::new(memory, fetcher, decoder);
        };

        match DiskLruStore::open_with_limits(
            directory.clone(),
            STORE_VERSION,
            1,
            config.max_disk_bytes,
            config.max_disk_entries,
        )
        .await
        {
            Ok(store) => {
                info!(
                    path = %directory.display(),
                    budget = memory.capacity(),
                    "Image cache opened"
                );
                Self::with_store(memory, Arc::new(store), directory, fetcher, decoder)
            }
            Err(e) => {
                warn!(
                    path = %directory.display(),
                    error = %e,
                    "Failed to open persistent image cache, continuing memory-only"
                );
                Self::new(memory, fetcher, decoder)
            }
        }
    }

    /// Returns the image for `url`, decoded to fit a `width` x `height` box.
    ///
    /// # Errors
    /// Returns `MalformedRequest`, `Network` or `Decode` errors. Persistent
    /// store failures never surface here; they switch the cache to memory-only.
    pub async fn fetch(&self, url: &str, width: u32, height: u32) -> FetchResult<LoadedImage> {
        let key = CacheKey::from_url(url);

        if let Some(image) = self.memory.get(&key) {
            return Ok(LoadedImage {
                key,
                image,
                source: ImageSource::Memory,
            });
        }

        if let Some(tier) = &self.persistent
            && let Some(loaded) = self
                .fetch_through_store(tier, &key, url, width, height)
                .await?
        {
            return Ok(loaded);
        }

        self.fetch_direct(key, url, width, height).await
    }

    /// Peeks at the memory tier without promoting or touching the network.
    #[must_use]
    pub fn peek(&self, url: &str) -> Option<Arc<DecodedImage>> {
        self.memory.peek(&CacheKey::from_url(url))
    }

    /// Drops `url` from both tiers.
    pub async fn evict(&self, url: &str) {
        let key = CacheKey::from_url(url);
        self.memory.remove(&key);

        if let Some(tier) = &self.persistent
            && let Some(store) = tier.checked().await
            && let Err(e) = store.remove(&key).await
        {
            tier.demote(&e);
        }
    }

    /// Asks the store to persist its index in the background.
    ///
    /// Failures are logged and swallowed. Returns `None` when there is no
    /// usable store or no runtime to run the flush on.
    pub fn flush(&self) -> Option<JoinHandle<()>> {
        let tier = Arc::clone(self.persistent.as_ref()?);
        if !tier.is_healthy() {
            return None;
        }

        let runtime = tokio::runtime::Handle::try_current()
            .inspect_err(|e| debug!(error = %e, "No runtime for image cache flush"))
            .ok()?;

        Some(runtime.spawn(async move {
            if let Some(store) = tier.checked().await
                && let Err(e) = store.flush().await
            {
                debug!(error = %e, "Image cache flush failed");
            }
        }))
    }

    /// Returns true while the persistent tier is in use.
    #[must_use]
    pub fn is_persistent(&self) -> bool {
        self.persistent.as_ref().is_some_and(|t| t.is_healthy())
    }

    /// Returns memory cache statistics.
    #[must_use]
    pub fn memory_stats(&self) -> CacheStats {
        self.memory.stats()
    }

    /// Clears the memory tier.
    pub fn clear_memory(&self) {
        self.memory.clear();
    }

    async fn fetch_through_store(
        &self,
        tier: &PersistentTier,
        key: &CacheKey,
        url: &str,
        width: u32,
        height: u32,
    ) -> FetchResult<Option<LoadedImage>> {
        let lookup = {
            let _guard = self.lock_key(key).await;

            if let Some(image) = self.memory.peek(key) {
                return Ok(Some(LoadedImage {
                    key: key.clone(),
                    image,
                    source: ImageSource::Memory,
                }));
            }

            let Some(store) = tier.checked().await else {
                return Ok(None);
            };

            match store.contains(key).await {
                Ok(true) => Lookup::Stored(ImageSource::Disk),
                Ok(false) => match self.download_into_store(tier, key, url).await? {
                    StoreWrite::Written => Lookup::Stored(ImageSource::Network),
                    StoreWrite::Skipped(body) => Lookup::Unstored(body),
                    StoreWrite::Failed => return Ok(None),
                },
                Err(e) => {
                    tier.demote(&e);
                    return Ok(None);
                }
            }
        };

        let source = match lookup {
            Lookup::Stored(source) => source,
            Lookup::Unstored(body) => {
                let bytes = collect_body(body).await?;
                let image = self.decode(bytes, width, height).await?;
                return Ok(Some(self.admit(key.clone(), image, ImageSource::Network)));
            }
        };

        let Some(store) = tier.checked().await else {
            return Ok(None);
        };

        let bytes = match store.get(key).await {
            Ok(Some(snapshot)) => snapshot.into_value(VALUE_SLOT),
            Ok(None) => None,
            Err(e) => {
                tier.demote(&e);
                return Ok(None);
            }
        };
        let Some(bytes) = bytes else {
            debug!(key = %key, "Entry left the store before it was read");
            return Ok(None);
        };

        let image = self.decode(bytes, width, height).await?;
        debug!(key = %key, source = %source, "Image loaded through disk cache");
        Ok(Some(self.admit(key.clone(), image, source)))
    }

    /// Streams the body of `url` verbatim into the store under `key`.
    async fn download_into_store(
        &self,
        tier: &PersistentTier,
        key: &CacheKey,
        url: &str,
    ) -> FetchResult<StoreWrite> {
        let mut body = self.fetcher.open(url).await?;

        let Some(store) = tier.checked().await else {
            return Ok(StoreWrite::Skipped(body));
        };

        let mut editor = match store.edit(key).await {
            Ok(Some(editor)) => editor,
            Ok(None) => {
                trace!(key = %key, "Store entry busy, decoding in memory");
                return Ok(StoreWrite::Skipped(body));
            }
            Err(e) => {
                tier.demote(&e);
                return Ok(StoreWrite::Skipped(body));
            }
        };

        match copy_body(&mut body, editor.as_mut()).await {
            Ok(size) => {
                if let Err(e) = editor.commit().await {
                    tier.demote(&e);
                    return Ok(StoreWrite::Failed);
                }
                debug!(key = %key, size, "Stored image in disk cache");
                Ok(StoreWrite::Written)
            }
            Err(CopyFailure::Network(e)) => {
                editor.abort().await;
                Err(e)
            }
            Err(CopyFailure::Store(e)) => {
                editor.abort().await;
                tier.demote(&e);
                Ok(StoreWrite::Failed)
            }
        }
    }

    async fn fetch_direct(
        &self,
        key: CacheKey,
        url: &str,
        width: u32,
        height: u32,
    ) -> FetchResult<LoadedImage> {
        let body = self.fetcher.open(url).await?;
        let bytes = collect_body(body).await?;
        let image = self.decode(bytes, width, height).await?;

        debug!(key = %key, source = "network", "Image loaded into memory");
        Ok(self.admit(key, image, ImageSource::Network))
    }

    /// Reads the native size, then decodes with the matching downsample
    /// factor, on a blocking thread.
    async fn decode(&self, bytes: Bytes, width: u32, height: u32) -> FetchResult<DecodedImage> {
        let decoder = Arc::clone(&self.decoder);
        tokio::task::spawn_blocking(move || {
            let (native_width, native_height) = decoder.read_dimensions(&bytes)?;
            let factor = sample_size(native_width, native_height, width, height);
            trace!(native_width, native_height, factor, "Decoding image");
            decoder.decode(&bytes, factor)
        })
        .await
        .map_err(|e| FetchError::decode(format!("Decode task panicked: {e}")))?
    }

    fn admit(&self, key: CacheKey, image: DecodedImage, source: ImageSource) -> LoadedImage {
        let image = self.memory.put_if_absent(key.clone(), Arc::new(image));
        LoadedImage { key, image, source }
    }

    /// Serializes the check-then-write sequence for one key. Other keys are
    /// never held up.
    async fn lock_key(&self, key: &CacheKey) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.write_locks.lock();
            match locks.get(key).and_then(Weak::upgrade) {
                Some(lock) => lock,
                None => {
                    locks.retain(|_, lock| lock.strong_count() > 0);
                    let lock = Arc::new(AsyncMutex::new(()));
                    locks.insert(key.clone(), Arc::downgrade(&lock));
                    lock
                }
            }
        };
        lock.lock_owned().await
    }
}

async fn copy_body(
    body: &mut ByteStream,
    editor: &mut dyn StoreEditor,
) -> Result<u64, CopyFailure> {
    let mut sink = editor
        .new_output_stream(VALUE_SLOT)
        .await
        .map_err(CopyFailure::Store)?;

    let mut written = 0u64;
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(CopyFailure::Network)?;
        sink.write_all(&chunk)
            .await
            .map_err(|e| CopyFailure::Store(e.into()))?;
        written += chunk.len() as u64;
    }
    sink.shutdown()
        .await
        .map_err(|e| CopyFailure::Store(e.into()))?;

    Ok(written)
}

async fn collect_body(mut body: ByteStream) -> FetchResult<Bytes> {
    let mut buf = BytesMut::new();
    while let Some(chunk) = body.next().await {
        buf.extend_from_slice(&chunk?);
    }
    Ok(buf.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::MockPersistentStore;
    use crate::domain::ports::mock::MockFetcher;
    use crate::infrastructure::image::image_decoder::{RasterDecoder, png_fixture};
    use tempfile::TempDir;

    const URL: &str = "https://example.com/photo.png";

    fn memory() -> MemoryImageCache {
        MemoryImageCache::new(16 * 1024 * 1024)
    }

    fn fetcher_serving(url: &str, body: Bytes) -> Arc<MockFetcher> {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.serve(url, body);
        fetcher
    }

    async fn disk_backed(fetcher: Arc<MockFetcher>) -> (ImageCache, DiskLruStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let directory = temp_dir.path().join("images");
        let store = DiskLruStore::open(directory.clone(), STORE_VERSION, 1, 1024 * 1024)
            .await
            .unwrap();
        let cache = ImageCache::with_store(
            memory(),
            Arc::new(store.clone()),
            directory,
            fetcher,
            Arc::new(RasterDecoder::default()),
        );
        (cache, store, temp_dir)
    }

    #[tokio::test]
    async fn test_second_fetch_hits_memory() {
        let fetcher = fetcher_serving(URL, png_fixture(20, 10));
        let cache = ImageCache::new(memory(), fetcher.clone(), Arc::new(RasterDecoder::default()));

        let first = cache.fetch(URL, 100, 100).await.unwrap();
        let second = cache.fetch(URL, 100, 100).await.unwrap();

        assert_eq!(first.source, ImageSource::Network);
        assert_eq!(second.source, ImageSource::Memory);
        assert!(Arc::ptr_eq(&first.image, &second.image));
        assert_eq!(fetcher.open_count(), 1);
    }

    #[tokio::test]
    async fn test_raw_bytes_are_persisted_verbatim() {
        let png = png_fixture(20, 10);
        let fetcher = fetcher_serving(URL, png.clone());
        let (cache, store, _temp) = disk_backed(fetcher).await;

        let loaded = cache.fetch(URL, 100, 100).await.unwrap();

        assert_eq!(loaded.source, ImageSource::Network);
        let snapshot = store.get(&CacheKey::from_url(URL)).await.unwrap().unwrap();
        assert_eq!(snapshot.value(VALUE_SLOT), Some(&png));
    }

    #[tokio::test]
    async fn test_fresh_memory_reads_from_disk() {
        let fetcher = fetcher_serving(URL, png_fixture(20, 10));
        let (cache, store, temp) = disk_backed(fetcher.clone()).await;
        cache.fetch(URL, 100, 100).await.unwrap();

        let reopened = ImageCache::with_store(
            memory(),
            Arc::new(store),
            temp.path().join("images"),
            fetcher.clone(),
            Arc::new(RasterDecoder::default()),
        );
        let loaded = reopened.fetch(URL, 100, 100).await.unwrap();

        assert_eq!(loaded.source, ImageSource::Disk);
        assert_eq!(fetcher.open_count(), 1);
    }

    #[tokio::test]
    async fn test_decode_is_downsampled() {
        let fetcher = fetcher_serving(URL, png_fixture(400, 300));
        let (cache, _store, _temp) = disk_backed(fetcher).await;

        let loaded = cache.fetch(URL, 100, 100).await.unwrap();

        assert_eq!((loaded.image.width(), loaded.image.height()), (133, 100));
    }

    #[tokio::test]
    async fn test_decode_error_leaves_stored_bytes() {
        let fetcher = fetcher_serving(URL, Bytes::from_static(b"<html>not an image</html>"));
        let (cache, store, _temp) = disk_backed(fetcher).await;

        let err = cache.fetch(URL, 100, 100).await.unwrap_err();

        assert!(matches!(err, FetchError::Decode { .. }));
        assert!(store.contains(&CacheKey::from_url(URL)).await.unwrap());
        assert!(cache.peek(URL).is_none());
        assert!(cache.is_persistent());
    }

    #[tokio::test]
    async fn test_network_error_mutates_nothing() {
        let fetcher = Arc::new(MockFetcher::new());
        let (cache, store, _temp) = disk_backed(fetcher).await;

        let err = cache.fetch(URL, 100, 100).await.unwrap_err();

        assert!(err.is_network_error());
        assert!(store.is_empty());
        assert_eq!(cache.memory_stats().size, 0);
    }

    #[tokio::test]
    async fn test_malformed_url() {
        let fetcher = Arc::new(MockFetcher::new());
        let cache = ImageCache::new(memory(), fetcher, Arc::new(RasterDecoder::default()));

        let err = cache.fetch("photo.png", 100, 100).await.unwrap_err();
        assert!(err.is_malformed());
    }

    #[tokio::test]
    async fn test_unopenable_store_falls_back_to_memory() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"file").unwrap();
        let config = CacheConfig {
            base_dir: Some(blocker),
            ..CacheConfig::default()
        };

        let fetcher = fetcher_serving(URL, png_fixture(20, 10));
        let cache = ImageCache::open(&config, fetcher, Arc::new(RasterDecoder::default())).await;

        assert!(!cache.is_persistent());
        let loaded = cache.fetch(URL, 100, 100).await.unwrap();
        assert_eq!(loaded.source, ImageSource::Network);
    }

    #[tokio::test]
    async fn test_memory_only_config() {
        let config = CacheConfig {
            subdir: None,
            ..CacheConfig::default()
        };
        let fetcher = fetcher_serving(URL, png_fixture(20, 10));
        let cache = ImageCache::open(&config, fetcher, Arc::new(RasterDecoder::default())).await;

        assert!(!cache.is_persistent());
        assert!(cache.fetch(URL, 100, 100).await.is_ok());
    }

    #[tokio::test]
    async fn test_deleted_directory_demotes_to_memory_only() {
        let other = "https://example.com/other.png";
        let fetcher = fetcher_serving(URL, png_fixture(20, 10));
        fetcher.serve(other, png_fixture(8, 8));
        let (cache, _store, temp) = disk_backed(fetcher).await;

        std::fs::remove_dir_all(temp.path().join("images")).unwrap();

        assert!(cache.fetch(URL, 100, 100).await.is_ok());
        assert!(!cache.is_persistent());
        assert!(cache.fetch(other, 100, 100).await.is_ok());
        assert!(!temp.path().join("images").exists());
        assert!(cache.flush().is_none());
    }

    #[tokio::test]
    async fn test_store_error_demotes_once() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = MockPersistentStore::new();
        store
            .expect_contains()
            .times(1)
            .returning(|_| Err(StoreError::journal("corrupt index")));

        let fetcher = fetcher_serving(URL, png_fixture(20, 10));
        fetcher.serve("https://example.com/b.png", png_fixture(4, 4));
        let cache = ImageCache::with_store(
            memory(),
            Arc::new(store),
            temp_dir.path().to_path_buf(),
            fetcher,
            Arc::new(RasterDecoder::default()),
        );

        assert!(cache.fetch(URL, 100, 100).await.is_ok());
        assert!(cache.fetch("https://example.com/b.png", 100, 100).await.is_ok());
        assert!(!cache.is_persistent());
    }

    #[tokio::test]
    async fn test_flush_swallows_errors() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = MockPersistentStore::new();
        store
            .expect_flush()
            .times(1)
            .returning(|| Err(StoreError::journal("disk full")));

        let cache = ImageCache::with_store(
            memory(),
            Arc::new(store),
            temp_dir.path().to_path_buf(),
            Arc::new(MockFetcher::new()),
            Arc::new(RasterDecoder::default()),
        );

        cache.flush().unwrap().await.unwrap();
        assert!(cache.is_persistent());
    }

    #[tokio::test]
    async fn test_flush_writes_journal() {
        let fetcher = fetcher_serving(URL, png_fixture(20, 10));
        let (cache, _store, temp) = disk_backed(fetcher).await;
        cache.fetch(URL, 100, 100).await.unwrap();

        cache.flush().unwrap().await.unwrap();

        let journal = std::fs::read_to_string(temp.path().join("images/journal.json")).unwrap();
        assert!(journal.contains(CacheKey::from_url(URL).as_str()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_fetches_account_once() {
        let fetcher = fetcher_serving(URL, png_fixture(32, 32));
        let (cache, _store, _temp) = disk_backed(fetcher).await;
        let cache = Arc::new(cache);

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move { cache.fetch(URL, 100, 100).await })
            })
            .collect();
        for task in tasks {
            assert!(task.await.unwrap().is_ok());
        }

        let stats = cache.memory_stats();
        assert_eq!(stats.size, 1);
        assert_eq!(stats.footprint, 32 * 32 * 3);
    }

    #[tokio::test]
    async fn test_evict_removes_both_tiers() {
        let fetcher = fetcher_serving(URL, png_fixture(20, 10));
        let (cache, store, _temp) = disk_backed(fetcher).await;
        cache.fetch(URL, 100, 100).await.unwrap();

        cache.evict(URL).await;

        assert!(cache.peek(URL).is_none());
        assert!(store.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_stalled_download_does_not_block_other_keys() {
        let slow = "https://example.com/slow.png";
        let fetcher = fetcher_serving(slow, png_fixture(20, 10));
        fetcher.gate(slow);
        let (cache, _store, _temp) = disk_backed(fetcher.clone()).await;
        let cache = Arc::new(cache);

        let stalled = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.fetch(slow, 100, 100).await })
        };
        while fetcher.calls_for(slow) == 0 {
            tokio::task::yield_now().await;
        }

        for id in 0..32 {
            let url = format!("https://example.com/{id}.png");
            fetcher.serve(&url, png_fixture(4, 4));
            let loaded = tokio::time::timeout(
                std::time::Duration::from_secs(5),
                cache.fetch(&url, 100, 100),
            )
            .await
            .expect("unrelated key waited on a stalled download");
            assert!(loaded.is_ok());
        }

        fetcher.release(slow);
        assert!(stalled.await.unwrap().is_ok());
        assert!(
            cache
                .write_locks
                .lock()
                .values()
                .all(|lock| lock.strong_count() == 0)
        );
    }
}
