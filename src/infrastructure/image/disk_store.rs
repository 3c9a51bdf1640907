//! Disk-backed LRU byte store for persistence across sessions.
//!
//! Each entry owns `value_count` files named `<key>.<slot>`. Edits write to
//! `<key>.<slot>.tmp` and are renamed into place on commit, so readers only
//! ever see whole values. The recency order lives in memory and is written to
//! `journal.json` on [`PersistentStore::flush`]; entries committed after the
//! last flush are still picked up on the next open.

use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use bytes::Bytes;
use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, trace, warn};

use crate::domain::entities::CacheKey;
use crate::domain::errors::{StoreError, StoreResult};
use crate::domain::ports::{ByteSink, PersistentStore, Snapshot, StoreEditor};

/// Maximum store size in bytes (200 MB default).
pub const DEFAULT_MAX_STORE_SIZE: u64 = 200 * 1024 * 1024;

/// Maximum number of entries by default.
pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

const JOURNAL_FILE: &str = "journal.json";
const TEMP_SUFFIX: &str = ".tmp";

/// Disk-based LRU store of raw byte values.
#[derive(Clone)]
pub struct DiskLruStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    directory: PathBuf,
    version: u32,
    value_count: usize,
    max_bytes: u64,
    max_entries: usize,
    state: Mutex<IndexState>,
}

struct IndexState {
    entries: LruCache<CacheKey, EntryMeta>,
    size: u64,
    editing: HashSet<CacheKey>,
}

#[derive(Debug, Clone)]
struct EntryMeta {
    lengths: Vec<u64>,
}

impl EntryMeta {
    fn total(&self) -> u64 {
        self.lengths.iter().sum()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Journal {
    version: u32,
    value_count: usize,
    /// Least recently used first.
    entries: Vec<JournalEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct JournalEntry {
    key: String,
    lengths: Vec<u64>,
}

impl DiskLruStore {
    /// Opens the store in `directory`, creating it if needed.
    ///
    /// A journal written with a different `version` or `value_count`
    /// invalidates every existing entry.
    ///
    /// # Errors
    /// Returns error if the directory cannot be created or read.
    pub async fn open(
        directory: PathBuf,
        version: u32,
        value_count: usize,
        max_bytes: u64,
    ) -> StoreResult<Self> {
        Self::open_with_limits(
            directory,
            version,
            value_count,
            max_bytes,
            DEFAULT_MAX_ENTRIES,
        )
        .await
    }

    /// Like [`Self::open`], with an explicit entry-count budget.
    ///
    /// # Errors
    /// Returns error if the directory cannot be created or read.
    pub async fn open_with_limits(
        directory: PathBuf,
        version: u32,
        value_count: usize,
        max_bytes: u64,
        max_entries: usize,
    ) -> StoreResult<Self> {
        if value_count == 0 {
            return Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "value_count must be at least 1",
            )));
        }

        fs::create_dir_all(&directory).await?;

        let scanned = scan_directory(&directory, value_count).await?;
        let entries = match read_journal(&directory).await {
            Some(journal) if journal.version == version && journal.value_count == value_count => {
                order_by_journal(&journal, scanned)
            }
            Some(journal) => {
                debug!(
                    found = journal.version,
                    expected = version,
                    "Store format changed, discarding entries"
                );
                wipe_directory(&directory).await?;
                Vec::new()
            }
            None => scanned,
        };

        let mut index = LruCache::unbounded();
        let mut size = 0u64;
        for (key, meta) in entries {
            size += meta.total();
            index.put(key, meta);
        }

        let store = Self {
            inner: Arc::new(StoreInner {
                directory,
                version,
                value_count,
                max_bytes,
                max_entries,
                state: Mutex::new(IndexState {
                    entries: index,
                    size,
                    editing: HashSet::new(),
                }),
            }),
        };

        store.inner.trim_to_size().await;
        store.flush().await?;

        debug!(
            path = %store.inner.directory.display(),
            entries = store.len(),
            size = store.size(),
            "Opened disk store"
        );

        Ok(store)
    }

    /// Returns the directory the store lives in.
    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.inner.directory
    }
}

impl StoreInner {
    fn value_path(&self, key: &CacheKey, slot: usize) -> PathBuf {
        self.directory.join(format!("{key}.{slot}"))
    }

    fn temp_path(&self, key: &CacheKey, slot: usize) -> PathBuf {
        self.directory.join(format!("{key}.{slot}{TEMP_SUFFIX}"))
    }

    async fn remove_values(&self, key: &CacheKey) {
        for slot in 0..self.value_count {
            let path = self.value_path(key, slot);
            if let Err(e) = fs::remove_file(&path).await
                && e.kind() != std::io::ErrorKind::NotFound
            {
                warn!(path = %path.display(), error = %e, "Failed to remove store file");
            }
        }
    }

    /// Evicts least recently used entries until both budgets hold.
    async fn trim_to_size(&self) {
        let evicted = {
            let mut state = self.state.lock();
            let mut evicted = Vec::new();
            while state.size > self.max_bytes || state.entries.len() > self.max_entries {
                let Some((key, meta)) = state.entries.pop_lru() else {
                    break;
                };
                state.size -= meta.total();
                evicted.push(key);
            }
            evicted
        };

        for key in &evicted {
            self.remove_values(key).await;
            debug!(key = %key, "Evicted entry from disk store");
        }
    }

    fn snapshot_journal(&self) -> Journal {
        let state = self.state.lock();
        let mut entries: Vec<JournalEntry> = state
            .entries
            .iter()
            .map(|(key, meta)| JournalEntry {
                key: key.to_string(),
                lengths: meta.lengths.clone(),
            })
            .collect();
        entries.reverse();
        Journal {
            version: self.version,
            value_count: self.value_count,
            entries,
        }
    }
}

#[async_trait]
impl PersistentStore for DiskLruStore {
    async fn contains(&self, key: &CacheKey) -> StoreResult<bool> {
        Ok(self.inner.state.lock().entries.contains(key))
    }

    async fn get(&self, key: &CacheKey) -> StoreResult<Option<Snapshot>> {
        let Some(meta) = self.inner.state.lock().entries.get(key).cloned() else {
            trace!(key = %key, "Disk store miss");
            return Ok(None);
        };

        let mut values = Vec::with_capacity(meta.lengths.len());
        for slot in 0..self.inner.value_count {
            match fs::read(self.inner.value_path(key, slot)).await {
                Ok(bytes) => values.push(Bytes::from(bytes)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    warn!(key = %key, slot, "Store file vanished, dropping entry");
                    let mut state = self.inner.state.lock();
                    if let Some(lost) = state.entries.pop(key) {
                        state.size -= lost.total();
                    }
                    return Ok(None);
                }
                Err(e) => return Err(e.into()),
            }
        }

        trace!(key = %key, "Disk store hit");
        Ok(Some(Snapshot::new(key.clone(), values)))
    }

    async fn edit(&self, key: &CacheKey) -> StoreResult<Option<Box<dyn StoreEditor>>> {
        if !self.inner.state.lock().editing.insert(key.clone()) {
            trace!(key = %key, "Entry already being edited");
            return Ok(None);
        }

        Ok(Some(Box::new(DiskEditor {
            inner: Arc::clone(&self.inner),
            key: key.clone(),
            written: vec![false; self.inner.value_count],
        })))
    }

    async fn remove(&self, key: &CacheKey) -> StoreResult<bool> {
        let removed = {
            let mut state = self.inner.state.lock();
            let removed = state.entries.pop(key);
            if let Some(meta) = &removed {
                state.size -= meta.total();
            }
            removed.is_some()
        };

        if removed {
            self.inner.remove_values(key).await;
            debug!(key = %key, "Removed entry from disk store");
        }
        Ok(removed)
    }

    async fn flush(&self) -> StoreResult<()> {
        let journal = self.inner.snapshot_journal();
        let directory = self.inner.directory.clone();

        tokio::task::spawn_blocking(move || write_journal(&directory, &journal))
            .await
            .map_err(|e| StoreError::Io(std::io::Error::other(e.to_string())))??;

        trace!("Flushed disk store journal");
        Ok(())
    }

    fn size(&self) -> u64 {
        self.inner.state.lock().size
    }

    fn len(&self) -> usize {
        self.inner.state.lock().entries.len()
    }
}

/// Edit of one entry in a [`DiskLruStore`].
struct DiskEditor {
    inner: Arc<StoreInner>,
    key: CacheKey,
    written: Vec<bool>,
}

#[async_trait]
impl StoreEditor for DiskEditor {
    async fn new_output_stream(&mut self, slot: usize) -> StoreResult<ByteSink> {
        if slot >= self.inner.value_count {
            return Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("slot {slot} out of range"),
            )));
        }

        let file = fs::File::create(self.inner.temp_path(&self.key, slot)).await?;
        self.written[slot] = true;
        Ok(Box::new(file))
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let existing = self.inner.state.lock().entries.peek(&self.key).cloned();
        if existing.is_none() && self.written.iter().any(|w| !w) {
            self.discard_temps().await;
            return Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "new entry is missing values",
            )));
        }

        let mut lengths = Vec::with_capacity(self.inner.value_count);
        for slot in 0..self.inner.value_count {
            let target = self.inner.value_path(&self.key, slot);
            if self.written[slot] {
                fs::rename(self.inner.temp_path(&self.key, slot), &target).await?;
            }
            lengths.push(fs::metadata(&target).await?.len());
        }

        let meta = EntryMeta { lengths };
        let size = meta.total();
        {
            let mut state = self.inner.state.lock();
            if let Some(old) = state.entries.put(self.key.clone(), meta) {
                state.size -= old.total();
            }
            state.size += size;
        }

        debug!(key = %self.key, size, "Committed entry to disk store");
        self.inner.trim_to_size().await;
        Ok(())
    }

    async fn abort(self: Box<Self>) {
        self.discard_temps().await;
        trace!(key = %self.key, "Aborted disk store edit");
    }
}

impl DiskEditor {
    async fn discard_temps(&self) {
        for (slot, written) in self.written.iter().enumerate() {
            if *written {
                let _ = fs::remove_file(self.inner.temp_path(&self.key, slot)).await;
            }
        }
    }
}

impl Drop for DiskEditor {
    fn drop(&mut self) {
        self.inner.state.lock().editing.remove(&self.key);
    }
}

async fn read_journal(directory: &Path) -> Option<Journal> {
    let content = fs::read(directory.join(JOURNAL_FILE)).await.ok()?;
    match serde_json::from_slice(&content) {
        Ok(journal) => Some(journal),
        Err(e) => {
            warn!(error = %e, "Store journal is corrupt, rebuilding from files");
            None
        }
    }
}

fn write_journal(directory: &Path, journal: &Journal) -> StoreResult<()> {
    let content = serde_json::to_vec(journal)?;
    let mut temp_file = tempfile::NamedTempFile::new_in(directory)?;
    temp_file.write_all(&content)?;
    temp_file
        .persist(directory.join(JOURNAL_FILE))
        .map_err(|e| e.error)?;
    Ok(())
}

/// Orders scanned entries by the journal's recency, appending entries the
/// journal never saw (committed after the last flush) as most recent.
fn order_by_journal(
    journal: &Journal,
    scanned: Vec<(CacheKey, EntryMeta)>,
) -> Vec<(CacheKey, EntryMeta)> {
    let rank: HashMap<&str, usize> = journal
        .entries
        .iter()
        .enumerate()
        .map(|(i, entry)| (entry.key.as_str(), i))
        .collect();

    let (mut known, unknown): (Vec<_>, Vec<_>) = scanned
        .into_iter()
        .partition(|(key, _)| rank.contains_key(key.as_str()));
    known.sort_by_key(|(key, _)| rank.get(key.as_str()).copied());
    known.extend(unknown);
    known
}

/// Indexes complete entries found on disk, oldest modification first.
/// Leftover temporary files from interrupted edits are deleted.
async fn scan_directory(
    directory: &Path,
    value_count: usize,
) -> StoreResult<Vec<(CacheKey, EntryMeta)>> {
    let mut found: HashMap<CacheKey, Vec<Option<(u64, SystemTime)>>> = HashMap::new();

    let mut dir = fs::read_dir(directory).await?;
    while let Some(entry) = dir.next_entry().await? {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };

        if name.ends_with(TEMP_SUFFIX) {
            let _ = fs::remove_file(&path).await;
            continue;
        }

        let Some((stem, slot)) = name.rsplit_once('.') else {
            continue;
        };
        let (Some(key), Ok(slot)) = (CacheKey::parse(stem), slot.parse::<usize>()) else {
            continue;
        };
        if slot >= value_count {
            continue;
        }

        if let Ok(meta) = entry.metadata().await {
            let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            found.entry(key).or_insert_with(|| vec![None; value_count])[slot] =
                Some((meta.len(), modified));
        }
    }

    let mut entries: Vec<(CacheKey, EntryMeta, SystemTime)> = found
        .into_iter()
        .filter_map(|(key, slots)| {
            let slots: Option<Vec<_>> = slots.into_iter().collect();
            let slots = slots?;
            let newest = slots.iter().map(|(_, t)| *t).max()?;
            let lengths = slots.into_iter().map(|(len, _)| len).collect();
            Some((key, EntryMeta { lengths }, newest))
        })
        .collect();

    entries.sort_by_key(|(_, _, modified)| *modified);
    Ok(entries
        .into_iter()
        .map(|(key, meta, _)| (key, meta))
        .collect())
}

async fn wipe_directory(directory: &Path) -> StoreResult<()> {
    let mut dir = fs::read_dir(directory).await?;
    while let Some(entry) = dir.next_entry().await? {
        let path = entry.path();
        if path.is_file()
            && let Err(e) = fs::remove_file(&path).await
        {
            warn!(path = %path.display(), error = %e, "Failed to remove stale store file");
        }
    }
    Ok(())
}
