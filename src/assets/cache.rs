use crate::assets::{Asset, AssetBase, AssetRef, AssetState};
use crate::ulid::Ulid;
use ahash::AHashMap;
use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Asset owned by the cache
struct CacheEntry {
    ptr: NonNull<dyn Asset>,
}

// Safety: assets are Send + Sync, the entry is only a pointer to one
unsafe impl Send for CacheEntry {}
unsafe impl Sync for CacheEntry {}

impl CacheEntry {
    fn asset(&self) -> &dyn Asset {
        // Safety: entries are removed from the map before their asset is freed
        unsafe { self.ptr.as_ref() }
    }
}

#[derive(Clone, Copy, Debug)]
struct UnloadEntry {
    id: Ulid,
    generation: u32,
}

struct UnloadInner {
    entries: VecDeque<UnloadEntry>,
    closed: bool,
}

/// Assets whose last reference was dropped, waiting for the cache to free them.
///
/// Every 1→0 and 0→1 transition of a cached asset's count happens under this
/// queue's lock.
pub struct UnloadQueue {
    inner: Mutex<UnloadInner>,
}

impl UnloadQueue {
    fn new() -> Self {
        Self {
            inner: Mutex::new(UnloadInner {
                entries: VecDeque::new(),
                closed: false,
            }),
        }
    }

    /// Drop what is probably the last reference.
    ///
    /// Returns false when the queue no longer accepts requests, in which case
    /// the caller releases the reference itself.
    pub(crate) fn release(&self, base: &AssetBase) -> bool {
        let mut inner = self.inner.lock();
        if inner.closed {
            return false;
        }
        if base.counter().fetch_sub(1, Ordering::AcqRel) == 1 {
            let generation = base.begin_unload();
            inner.entries.push_back(UnloadEntry {
                id: base.id(),
                generation,
            });
            tracing::trace!("Asset {} requested unload", base.id());
        }
        true
    }

    /// Add a reference on behalf of the cache, reviving a pending unload
    fn retain(&self, base: &AssetBase) {
        let counter = base.counter();
        let mut current = counter.load(Ordering::Acquire);
        while current > 0 {
            match counter.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }

        let _inner = self.inner.lock();
        if counter.fetch_add(1, Ordering::AcqRel) == 0 && base.state() == AssetState::Unloading {
            base.cancel_unload();
            tracing::trace!("Asset {} revived before unload", base.id());
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Cache statistics
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub created: u64,
    pub unloaded: u64,
}

impl CacheStats {
    pub fn hit_ratio(&self) -> f32 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f32 / total as f32
        }
    }
}

#[derive(Default)]
struct AtomicCacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    created: AtomicU64,
    unloaded: AtomicU64,
}

/// Identity to live instance map plus the unload queue that feeds it
pub struct AssetCache {
    entries: RwLock<AHashMap<Ulid, CacheEntry>>,
    unload: Arc<UnloadQueue>,
    stats: AtomicCacheStats,
}

impl AssetCache {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(AHashMap::new()),
            unload: Arc::new(UnloadQueue::new()),
            stats: AtomicCacheStats::default(),
        }
    }

    /// Shared handle to a cached asset
    pub fn get(&self, id: Ulid) -> Option<AssetRef> {
        let entries = self.entries.read();
        match entries.get(&id) {
            Some(entry) => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                Some(self.retain_entry(entry))
            }
            None => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Return the cached asset for `id`, or insert the one built by `create`.
    ///
    /// `create` runs under the cache lock, so concurrent callers for the same
    /// id observe a single instance. The bool is true when `create` ran and
    /// produced the asset; new assets start in [`AssetState::Loading`].
    pub fn get_or_insert_with<F>(&self, id: Ulid, create: F) -> Option<(AssetRef, bool)>
    where
        F: FnOnce() -> Option<Box<dyn Asset>>,
    {
        if let Some(existing) = self.get(id) {
            return Some((existing, false));
        }

        let mut entries = self.entries.write();
        if let Some(entry) = entries.get(&id) {
            return Some((self.retain_entry(entry), false));
        }

        let asset = create()?;
        let handle = self.adopt_new(asset);
        if let Some(ptr) = handle.as_ptr() {
            entries.insert(id, CacheEntry { ptr });
        }
        Some((handle, true))
    }

    /// Insert an asset under its own id, replacing nothing.
    ///
    /// Returns None if the id is already cached.
    pub fn insert(&self, asset: Box<dyn Asset>) -> Option<AssetRef> {
        let id = asset.id();
        let mut entries = self.entries.write();
        if entries.contains_key(&id) {
            return None;
        }
        let handle = self.adopt_new(asset);
        if let Some(ptr) = handle.as_ptr() {
            entries.insert(id, CacheEntry { ptr });
        }
        Some(handle)
    }

    fn adopt_new(&self, asset: Box<dyn Asset>) -> AssetRef {
        let base = asset.base();
        base.set_owner(&self.unload);
        base.set_state(AssetState::Loading);
        base.counter().store(1, Ordering::Release);
        self.stats.created.fetch_add(1, Ordering::Relaxed);
        let ptr = NonNull::from(Box::leak(asset));
        // Safety: the count was set to the single reference handed over here
        unsafe { AssetRef::adopt(ptr) }
    }

    fn retain_entry(&self, entry: &CacheEntry) -> AssetRef {
        self.unload.retain(entry.asset().base());
        // Safety: the reference added above moves into the handle
        unsafe { AssetRef::adopt(entry.ptr) }
    }

    /// Free every asset whose unload request is still current.
    ///
    /// Requests made while draining (e.g. sub-assets released by a freed
    /// asset) are handled in the same call. Returns the number freed.
    pub fn drain_unloads(&self) -> usize {
        let mut freed = 0;
        loop {
            let victims = self.collect_unloads();
            if victims.is_empty() {
                return freed;
            }
            self.stats
                .unloaded
                .fetch_add(victims.len() as u64, Ordering::Relaxed);
            for (id, ptr) in victims {
                tracing::trace!("Unloading asset {id}");
                // Safety: removed from the map with no references left, nothing else can reach it
                drop(unsafe { Box::from_raw(ptr.as_ptr()) });
                freed += 1;
            }
        }
    }

    fn collect_unloads(&self) -> Vec<(Ulid, NonNull<dyn Asset>)> {
        let mut entries = self.entries.write();
        let mut queue = self.unload.inner.lock();
        let mut victims = Vec::new();
        while let Some(request) = queue.entries.pop_front() {
            let Some(entry) = entries.get(&request.id) else {
                tracing::warn!(
                    "Asset {} was marked for unload but wasn't found in asset cache",
                    request.id
                );
                continue;
            };
            let base = entry.asset().base();
            let current = base.state() == AssetState::Unloading
                && base.unload_generation() == request.generation
                && base.ref_count() == 0;
            if !current {
                continue;
            }
            if let Some(entry) = entries.remove(&request.id) {
                victims.push((request.id, entry.ptr));
            }
        }
        victims
    }

    /// Stop accepting unload requests and free everything nothing references.
    ///
    /// Assets still referenced are handed over to their handles, the last of
    /// which frees the asset. Idempotent.
    pub fn shutdown(&self) {
        self.drain_unloads();

        let victims = {
            let mut entries = self.entries.write();
            let mut queue = self.unload.inner.lock();
            if queue.closed {
                return;
            }
            queue.closed = true;

            let mut victims = Vec::new();
            for request in queue.entries.drain(..) {
                let Some(entry) = entries.get(&request.id) else {
                    continue;
                };
                let base = entry.asset().base();
                if base.ref_count() == 0 && base.unload_generation() == request.generation {
                    if let Some(entry) = entries.remove(&request.id) {
                        victims.push(entry.ptr);
                    }
                }
            }

            let still_referenced = entries.len();
            if still_referenced > 0 {
                tracing::debug!(
                    "{still_referenced} assets still referenced at shutdown, released by their last handle"
                );
            }
            entries.clear();
            victims
        };

        for ptr in victims {
            // Safety: removed from the map with no references left
            drop(unsafe { Box::from_raw(ptr.as_ptr()) });
        }
    }

    /// Whether an instance exists for `id`
    pub fn contains(&self, id: Ulid) -> bool {
        self.entries.read().contains_key(&id)
    }

    /// State of the cached instance, without taking a reference
    pub fn state_of(&self, id: Ulid) -> Option<AssetState> {
        self.entries.read().get(&id).map(|entry| entry.asset().state())
    }

    /// Number of live instances
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Number of pending unload requests
    pub fn pending_unloads(&self) -> usize {
        self.unload.len()
    }

    /// Approximate memory used by live instances
    pub fn memory_usage(&self) -> usize {
        self.entries
            .read()
            .values()
            .map(|entry| entry.asset().memory_size())
            .sum()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.stats.hits.load(Ordering::Relaxed),
            misses: self.stats.misses.load(Ordering::Relaxed),
            created: self.stats.created.load(Ordering::Relaxed),
            unloaded: self.stats.unloaded.load(Ordering::Relaxed),
        }
    }
}

impl Default for AssetCache {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for AssetCache {
    fn drop(&mut self) {
        self.shutdown();
    }
}
