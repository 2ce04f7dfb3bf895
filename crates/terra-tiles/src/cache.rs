//! Asynchronous tile texture cache.
//!
//! The cache owns the shared [`TileStore`] (node pool plus load queue) behind
//! a mutex, and one loader thread that services the queue. The render thread
//! locks the store for a traversal pass and enqueues requests; the loader
//! locks it only to copy the queue head and to apply a finished load, and
//! reads archives with the lock released.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use rustc_hash::FxHashSet;
use tracing::{debug, error, trace, warn};

use crate::archive::{AddressingMode, ArchiveKind, TextureArchive};
use crate::error::TileError;
use crate::flags::CapabilityFlags;
use crate::node::{NodeId, TextureHandle, TextureSlot};
use crate::pool::TilePool;

/// Capacity and timing of the cache.
#[derive(Clone, Debug, PartialEq)]
pub struct CacheSettings {
    /// Maximum number of outstanding load requests.
    pub queue_capacity: usize,
    /// Longest time the idle loader sleeps before rechecking the queue.
    pub poll_interval: Duration,
    /// Maximum number of live tile nodes across all bodies.
    pub max_nodes: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            queue_capacity: 10,
            poll_interval: Duration::from_millis(20),
            max_nodes: 1 << 20,
        }
    }
}

/// A queued load, captured when the request is made.
#[derive(Clone, Debug)]
pub struct LoadRequest {
    /// Body whose tile archives hold the textures.
    pub archive_name: Arc<str>,
    pub node: NodeId,
    /// Archive index of the surface texture, if the surface needs loading.
    pub surface: Option<u32>,
    /// Archive index of the mask texture, if the mask needs loading.
    pub mask: Option<u32>,
    pub flags: CapabilityFlags,
}

/// Outcome of a load: the new state of each requested slot.
#[derive(Debug)]
struct LoadResult {
    node: NodeId,
    surface: Option<TextureSlot>,
    mask: Option<TextureSlot>,
}

#[derive(Debug)]
struct LoadQueue {
    requests: VecDeque<LoadRequest>,
    queued: FxHashSet<NodeId>,
    capacity: usize,
    held: bool,
    closed: bool,
}

impl LoadQueue {
    fn new(capacity: usize) -> Self {
        Self {
            requests: VecDeque::with_capacity(capacity),
            queued: FxHashSet::default(),
            capacity,
            held: false,
            closed: false,
        }
    }

    /// Remove the request for `node`, normally the head.
    fn complete(&mut self, node: NodeId) {
        if self.requests.front().is_some_and(|r| r.node == node) {
            self.requests.pop_front();
        } else if let Some(pos) = self.requests.iter().position(|r| r.node == node) {
            self.requests.remove(pos);
        }
        self.queued.remove(&node);
    }
}

/// Node pool and load queue, guarded together by the cache mutex.
pub struct TileStore {
    pool: TilePool,
    queue: LoadQueue,
}

impl TileStore {
    pub(crate) fn new(settings: &CacheSettings) -> Self {
        Self {
            pool: TilePool::new(settings.max_nodes),
            queue: LoadQueue::new(settings.queue_capacity),
        }
    }

    pub fn pool(&self) -> &TilePool {
        &self.pool
    }

    pub fn pool_mut(&mut self) -> &mut TilePool {
        &mut self.pool
    }

    /// Number of outstanding requests.
    pub fn queue_len(&self) -> usize {
        self.queue.requests.len()
    }

    pub fn is_queued(&self, node: NodeId) -> bool {
        self.queue.queued.contains(&node)
    }

    /// Queue the unloaded textures of `node` for loading from `archive_name`.
    ///
    /// Returns `false` if the queue is full or shut down, the node already
    /// has a request outstanding, or it has nothing left to load.
    pub fn enqueue(&mut self, archive_name: &Arc<str>, node: NodeId) -> bool {
        let queue = &mut self.queue;
        if queue.closed || queue.requests.len() >= queue.capacity || queue.queued.contains(&node) {
            return false;
        }
        let Some(tile) = self.pool.get_mut(node) else {
            return false;
        };
        let surface = tile.surface.begin_load();
        let mask = tile.mask.begin_load();
        if surface.is_none() && mask.is_none() {
            return false;
        }
        tile.sync_pending_flag();

        queue.queued.insert(node);
        queue.requests.push_back(LoadRequest {
            archive_name: Arc::clone(archive_name),
            node,
            surface,
            mask,
            flags: tile.flags,
        });
        trace!(?node, queued = queue.requests.len(), "tile load queued");
        true
    }

    /// Free a whole tree and drop any queued requests for its nodes.
    pub fn remove_tree(&mut self, root: NodeId) -> usize {
        let removed = self.pool.remove_tree(root);
        let pool = &self.pool;
        let queued = &mut self.queue.queued;
        self.queue.requests.retain(|r| {
            let live = pool.contains(r.node);
            if !live {
                queued.remove(&r.node);
            }
            live
        });
        removed
    }

    /// Write a finished load into its node.
    ///
    /// Results for nodes freed in the meantime are dropped, releasing their
    /// textures.
    fn apply(&mut self, result: LoadResult) {
        self.queue.complete(result.node);
        let Some(tile) = self.pool.get_mut(result.node) else {
            trace!(node = ?result.node, "discarding load result for freed node");
            return;
        };
        if let Some(slot) = result.surface
            && matches!(tile.surface, TextureSlot::Pending(_))
        {
            tile.surface = slot;
        }
        if let Some(slot) = result.mask
            && matches!(tile.mask, TextureSlot::Pending(_))
        {
            tile.mask = slot;
        }
        tile.sync_pending_flag();
        if !tile.flags.is_pending() {
            tile.flags.remove(CapabilityFlags::LEGACY_ADDRESSING);
        }
    }

    /// Drop every queued request, returning its nodes to `Unloaded`.
    fn discard_queue(&mut self) -> usize {
        let discarded = self.queue.requests.len();
        for request in self.queue.requests.drain(..) {
            if let Some(tile) = self.pool.get_mut(request.node) {
                tile.surface.cancel_load();
                tile.mask.cancel_load();
                tile.sync_pending_flag();
            }
        }
        self.queue.queued.clear();
        discarded
    }
}

struct Shared {
    store: Mutex<TileStore>,
    wake: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, TileStore> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct CacheInner {
    shared: Arc<Shared>,
    archive: Arc<dyn TextureArchive>,
    loader: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for CacheInner {
    fn drop(&mut self) {
        shut_down(&self.shared, &self.loader);
    }
}

/// Handle to the shared tile cache. Clones share one store and one loader.
#[derive(Clone)]
pub struct TileCache {
    inner: Arc<CacheInner>,
}

impl TileCache {
    /// Create the store and start the loader thread.
    pub fn new(archive: Arc<dyn TextureArchive>, settings: &CacheSettings) -> Result<Self, TileError> {
        let shared = Arc::new(Shared {
            store: Mutex::new(TileStore::new(settings)),
            wake: Condvar::new(),
        });

        let loader = {
            let shared = Arc::clone(&shared);
            let archive = Arc::clone(&archive);
            let poll = settings.poll_interval;
            std::thread::Builder::new()
                .name("tile-loader".into())
                .spawn(move || run_loader(&shared, archive.as_ref(), poll))
                .map_err(TileError::LoaderSpawn)?
        };
        debug!(
            capacity = settings.queue_capacity,
            max_nodes = settings.max_nodes,
            "tile cache started"
        );

        Ok(Self {
            inner: Arc::new(CacheInner {
                shared,
                archive,
                loader: Mutex::new(Some(loader)),
            }),
        })
    }

    /// Lock the shared store. A poisoned lock is recovered.
    pub fn lock_store(&self) -> MutexGuard<'_, TileStore> {
        self.inner.shared.lock()
    }

    pub fn archive(&self) -> &Arc<dyn TextureArchive> {
        &self.inner.archive
    }

    /// Queue a load for `node`; see [`TileStore::enqueue`].
    pub fn enqueue(&self, archive_name: &Arc<str>, node: NodeId) -> bool {
        let queued = self.lock_store().enqueue(archive_name, node);
        if queued {
            self.wake();
        }
        queued
    }

    /// Pause (`true`) or resume (`false`) the loader.
    pub fn hold(&self, held: bool) {
        self.lock_store().queue.held = held;
        if !held {
            self.wake();
        }
    }

    /// Wake the loader if it is waiting for work.
    pub fn wake(&self) {
        self.inner.shared.wake.notify_all();
    }

    pub fn queue_len(&self) -> usize {
        self.lock_store().queue_len()
    }

    pub fn is_shut_down(&self) -> bool {
        self.lock_store().queue.closed
    }

    /// Load every unloaded texture of `node` on the calling thread.
    ///
    /// Used for preloading while the loader is held. Returns `false` if the
    /// node had nothing to load or a request for it is already queued.
    pub fn load_blocking(&self, archive_name: &Arc<str>, node: NodeId) -> bool {
        let request = {
            let mut store = self.lock_store();
            if store.queue.queued.contains(&node) {
                return false;
            }
            let Some(tile) = store.pool.get_mut(node) else {
                return false;
            };
            let surface = tile.surface.begin_load();
            let mask = tile.mask.begin_load();
            if surface.is_none() && mask.is_none() {
                return false;
            }
            let flags = tile.flags;
            store.queue.queued.insert(node);
            LoadRequest {
                archive_name: Arc::clone(archive_name),
                node,
                surface,
                mask,
                flags,
            }
        };
        let result = read_request(self.inner.archive.as_ref(), &request);
        self.lock_store().apply(result);
        true
    }

    /// Stop and join the loader, discard queued requests and reject new ones.
    pub fn shut_down(&self) {
        shut_down(&self.inner.shared, &self.inner.loader);
    }
}

fn shut_down(shared: &Shared, loader: &Mutex<Option<JoinHandle<()>>>) {
    shared.lock().queue.closed = true;
    shared.wake.notify_all();

    let handle = loader
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .take();
    let Some(handle) = handle else {
        return;
    };
    if handle.join().is_err() {
        error!("tile loader thread panicked");
    }
    let discarded = shared.lock().discard_queue();
    debug!(discarded, "tile cache shut down");
}

fn run_loader(shared: &Shared, archive: &dyn TextureArchive, poll: Duration) {
    trace!("tile loader running");
    loop {
        let request = {
            let mut store = shared.lock();
            loop {
                if store.queue.closed {
                    return;
                }
                if !store.queue.held
                    && let Some(front) = store.queue.requests.front()
                {
                    break front.clone();
                }
                store = shared
                    .wake
                    .wait_timeout(store, poll)
                    .unwrap_or_else(PoisonError::into_inner)
                    .0;
            }
        };

        let result = read_request(archive, &request);

        let mut store = shared.lock();
        if store.queue.closed {
            // Textures read for this request are dropped here.
            return;
        }
        store.apply(result);
    }
}

fn read_request(archive: &dyn TextureArchive, request: &LoadRequest) -> LoadResult {
    let mode = AddressingMode::for_flags(request.flags);
    let surface = request.surface.map(|index| {
        let name = ArchiveKind::Tile.file_name(&request.archive_name);
        TextureSlot::from(read_texture(archive, &name, index, mode))
    });
    let mask = request.mask.map(|index| {
        if !request.flags.needs_mask() {
            return TextureSlot::Absent;
        }
        let name = ArchiveKind::TileMask.file_name(&request.archive_name);
        TextureSlot::from(read_texture(archive, &name, index, mode))
    });
    LoadResult {
        node: request.node,
        surface,
        mask,
    }
}

fn read_texture(
    archive: &dyn TextureArchive,
    name: &str,
    index: u32,
    mode: AddressingMode,
) -> Option<TextureHandle> {
    let offset = archive.resolve_offset(index, mode)?;
    match archive.read_block(name, offset) {
        Ok(Some(texture)) => Some(Arc::new(texture)),
        Ok(None) => {
            warn!(archive = name, offset, "no texture at archive offset");
            None
        }
        Err(err) => {
            error!(archive = name, offset, %err, "failed to load tile texture");
            None
        }
    }
}
