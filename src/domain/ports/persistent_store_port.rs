//! Port definition for the persistent byte store.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncWrite;

use crate::domain::entities::CacheKey;
use crate::domain::errors::StoreResult;

/// Writable stream for one value slot of an entry being edited.
pub type ByteSink = Box<dyn AsyncWrite + Send + Unpin>;

/// Read-only copy of an entry's values at the time it was read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    key: CacheKey,
    values: Vec<Bytes>,
}

impl Snapshot {
    /// Creates a snapshot from the entry's values, ordered by slot.
    #[must_use]
    pub const fn new(key: CacheKey, values: Vec<Bytes>) -> Self {
        Self { key, values }
    }

    /// Key of the entry.
    #[must_use]
    pub const fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Value stored in `slot`.
    #[must_use]
    pub fn value(&self, slot: usize) -> Option<&Bytes> {
        self.values.get(slot)
    }

    /// Consumes the snapshot and returns the value stored in `slot`.
    #[must_use]
    pub fn into_value(mut self, slot: usize) -> Option<Bytes> {
        (slot < self.values.len()).then(|| self.values.swap_remove(slot))
    }
}

/// In-progress edit of a single entry.
///
/// Nothing becomes visible to readers until [`StoreEditor::commit`] succeeds.
#[async_trait]
pub trait StoreEditor: Send {
    /// Opens a fresh output stream for `slot`, replacing anything written to it
    /// earlier in this edit.
    async fn new_output_stream(&mut self, slot: usize) -> StoreResult<ByteSink>;

    /// Publishes the written values.
    async fn commit(self: Box<Self>) -> StoreResult<()>;

    /// Discards the edit, leaving any previous value untouched.
    async fn abort(self: Box<Self>);
}

/// Port for a bounded, string-keyed byte store with least-recently-used eviction.
/// Implementations must be thread-safe and serialize their own writers.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PersistentStore: Send + Sync {
    /// Returns whether a committed entry exists for `key`.
    async fn contains(&self, key: &CacheKey) -> StoreResult<bool>;

    /// Reads a committed entry, marking it most recently used.
    async fn get(&self, key: &CacheKey) -> StoreResult<Option<Snapshot>>;

    /// Starts editing `key`.
    /// Returns `None` if another edit of the same key is in progress.
    async fn edit(&self, key: &CacheKey) -> StoreResult<Option<Box<dyn StoreEditor>>>;

    /// Removes an entry. Returns whether anything was removed.
    async fn remove(&self, key: &CacheKey) -> StoreResult<bool>;

    /// Durably records the store's index.
    async fn flush(&self) -> StoreResult<()>;

    /// Total bytes of committed values.
    fn size(&self) -> u64;

    /// Number of committed entries.
    fn len(&self) -> usize;

    /// Returns true if the store holds no entries.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
