//! Per-slot fetch coordination.
//!
//! Display slots get reused for unrelated images (think recycled list rows).
//! The coordinator tags each slot with the URL it currently owns so repeated
//! requests for that URL are coalesced, and so a slow fetch for an old URL
//! can never paint over a slot that has moved on.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::domain::entities::{ImageRequest, LoadedImage, SlotId};
use crate::domain::errors::FetchResult;
use crate::domain::ports::SlotTarget;

use super::image_cache::ImageCache;
use super::worker_pool::FetchPool;

/// Cooperative cancellation signal shared by a slot tag and its fetch task.
#[derive(Debug, Clone, Default)]
struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// What [`FetchCoordinator::dispatch`] did.
#[derive(Debug)]
pub enum DispatchOutcome {
    /// No URL was given; the slot now shows its placeholder.
    Cleared,
    /// The slot already owns this URL; nothing new was started.
    Coalesced,
    /// A fetch was queued on the pool.
    Started(FetchHandle),
}

impl DispatchOutcome {
    /// Returns the handle of a started fetch.
    #[must_use]
    pub fn into_handle(self) -> Option<FetchHandle> {
        match self {
            Self::Started(handle) => Some(handle),
            Self::Cleared | Self::Coalesced => None,
        }
    }
}

/// Handle to a fetch started for a slot.
#[derive(Debug)]
pub struct FetchHandle {
    cancel: CancelFlag,
    task: JoinHandle<Option<()>>,
}

impl FetchHandle {
    /// Requests cancellation. Work already under way may still finish, but
    /// its result will not reach the slot.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Returns true once cancellation was requested, by this handle or by a
    /// newer request for the same slot.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Waits for the fetch and its delivery to finish.
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            warn!(error = %e, "Fetch task failed");
        }
    }
}

/// Which URL owns a slot, and for which target.
struct SlotTag {
    url: String,
    phase: SlotPhase,
    target: Weak<dyn SlotTarget>,
}

impl SlotTag {
    fn is_owned_by(&self, target: &Arc<dyn SlotTarget>) -> bool {
        self.target
            .upgrade()
            .is_some_and(|owner| Arc::ptr_eq(&owner, target))
    }

    fn cancel(&self) {
        if let SlotPhase::Pending(cancel) = &self.phase {
            cancel.cancel();
        }
    }
}

enum SlotPhase {
    Pending(CancelFlag),
    Shown,
}

/// Routes image requests for display slots through the [`ImageCache`].
#[derive(Clone)]
pub struct FetchCoordinator {
    inner: Arc<CoordinatorInner>,
}

struct CoordinatorInner {
    cache: Arc<ImageCache>,
    pool: FetchPool,
    slots: Mutex<HashMap<SlotId, SlotTag>>,
}

impl std::fmt::Debug for FetchCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchCoordinator")
            .field("pool", &self.inner.pool)
            .field("slots", &self.inner.slots.lock().len())
            .finish_non_exhaustive()
    }
}

impl FetchCoordinator {
    /// Creates a coordinator running fetches on `pool`.
    #[must_use]
    pub fn new(cache: Arc<ImageCache>, pool: FetchPool) -> Self {
        Self {
            inner: Arc::new(CoordinatorInner {
                cache,
                pool,
                slots: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Requests `request` for `slot`, shown on `target`.
    ///
    /// Never blocks on I/O. `None` clears the slot to its placeholder
    /// synchronously. A request for the URL the slot already owns, on the
    /// same live target, is coalesced; anything else cancels the pending
    /// fetch and starts over. Slots whose target was dropped are forgotten.
    pub fn dispatch(
        &self,
        slot: SlotId,
        target: &Arc<dyn SlotTarget>,
        request: Option<ImageRequest>,
    ) -> DispatchOutcome {
        let mut slots = self.inner.slots.lock();
        prune_dead_targets(&mut slots);

        let Some(request) = request else {
            if let Some(tag) = slots.remove(&slot) {
                tag.cancel();
            }
            target.show_placeholder();
            trace!(slot = %slot, "Cleared slot");
            return DispatchOutcome::Cleared;
        };

        if let Some(tag) = slots.get(&slot) {
            if tag.url == request.url && tag.is_owned_by(target) {
                trace!(slot = %slot, url = %request.url, "Coalesced request");
                return DispatchOutcome::Coalesced;
            }
            if matches!(tag.phase, SlotPhase::Pending(_)) {
                tag.cancel();
                debug!(slot = %slot, old = %tag.url, new = %request.url, "Superseded pending fetch");
            }
        }

        let cancel = CancelFlag::default();
        slots.insert(
            slot,
            SlotTag {
                url: request.url.clone(),
                phase: SlotPhase::Pending(cancel.clone()),
                target: Arc::downgrade(target),
            },
        );
        target.show_placeholder();
        drop(slots);

        let task = self.inner.pool.spawn(CoordinatorInner::run(
            Arc::clone(&self.inner),
            slot,
            request,
            cancel.clone(),
        ));

        DispatchOutcome::Started(FetchHandle { cancel, task })
    }

    /// Forgets `slot`, cancelling its pending fetch.
    /// Returns whether the slot was tracked.
    pub fn release(&self, slot: SlotId) -> bool {
        let Some(tag) = self.inner.slots.lock().remove(&slot) else {
            return false;
        };
        tag.cancel();
        true
    }

    /// Cancels every pending fetch.
    pub fn cancel_all(&self) {
        let mut slots = self.inner.slots.lock();
        let before = slots.len();
        slots.retain(|_, tag| match &tag.phase {
            SlotPhase::Pending(cancel) => {
                cancel.cancel();
                false
            }
            SlotPhase::Shown => tag.target.strong_count() > 0,
        });
        let count = before - slots.len();
        if count > 0 {
            debug!(count = count, "Cancelled all pending image fetches");
        }
    }

    /// Returns true if `slot` has a fetch in flight.
    #[must_use]
    pub fn is_pending(&self, slot: SlotId) -> bool {
        self.inner
            .slots
            .lock()
            .get(&slot)
            .is_some_and(|tag| matches!(tag.phase, SlotPhase::Pending(_)))
    }

    /// Returns the number of slots with a fetch in flight.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner
            .slots
            .lock()
            .values()
            .filter(|tag| matches!(tag.phase, SlotPhase::Pending(_)))
            .count()
    }

    /// Returns the cache requests go through.
    #[must_use]
    pub fn cache(&self) -> &Arc<ImageCache> {
        &self.inner.cache
    }
}

impl CoordinatorInner {
    async fn run(
        self: Arc<Self>,
        slot: SlotId,
        request: ImageRequest,
        cancel: CancelFlag,
    ) {
        if cancel.is_cancelled() {
            trace!(slot = %slot, url = %request.url, "Skipping cancelled fetch");
            return;
        }

        let result = self
            .cache
            .fetch(&request.url, request.width, request.height)
            .await;

        self.complete(slot, &request.url, &cancel, result);
    }

    /// Delivers a finished fetch, unless it went stale while in flight.
    fn complete(
        &self,
        slot: SlotId,
        url: &str,
        cancel: &CancelFlag,
        result: FetchResult<LoadedImage>,
    ) {
        let mut slots = self.slots.lock();

        if cancel.is_cancelled() {
            trace!(slot = %slot, url, "Discarding cancelled fetch");
            return;
        }

        let Some(tag) = slots.get_mut(&slot) else {
            trace!(slot = %slot, url, "Discarding fetch for released slot");
            return;
        };
        if tag.url != url {
            trace!(slot = %slot, url, owner = %tag.url, "Discarding stale fetch");
            return;
        }

        let Some(target) = tag.target.upgrade() else {
            debug!(slot = %slot, "Slot target dropped before delivery");
            slots.remove(&slot);
            return;
        };

        match result {
            Ok(image) => {
                target.show_image(&image);
                tag.phase = SlotPhase::Shown;
                debug!(slot = %slot, source = %image.source, "Image delivered");
            }
            Err(e) => {
                if e.is_malformed() {
                    debug!(slot = %slot, error = %e, "Ignoring malformed image request");
                } else {
                    warn!(slot = %slot, url, error = %e, "Image fetch failed");
                }
                target.show_placeholder();
                slots.remove(&slot);
            }
        }
    }
}

/// Forgets slots whose target is gone, cancelling their pending fetches.
fn prune_dead_targets(slots: &mut HashMap<SlotId, SlotTag>) {
    slots.retain(|slot, tag| {
        if tag.target.strong_count() > 0 {
            return true;
        }
        tag.cancel();
        trace!(slot = %slot, "Forgot slot with dropped target");
        false
    });
}
