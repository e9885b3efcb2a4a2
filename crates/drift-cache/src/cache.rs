//! The per-grid chunk cache.

use std::collections::HashMap;
use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use drift_core::{Block, BlockId, FieldId, LoadError};

use crate::chunk::ChunkState;

/// Identifies one payload layer of a chunk: one field at one global time
/// index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerKey {
    /// Owning field.
    pub field: FieldId,
    /// Global snapshot index.
    pub time_index: usize,
}

impl LayerKey {
    /// Construct a layer key.
    pub fn new(field: FieldId, time_index: usize) -> Self {
        Self { field, time_index }
    }
}

#[derive(Debug, Default)]
struct ChunkEntry {
    state: ChunkState,
    layers: HashMap<LayerKey, Arc<Block>>,
}

/// Point-in-time cache counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Layers read through a loader since construction.
    pub loads: u64,
    /// Chunks returned to `NotLoaded` since construction.
    pub evictions: u64,
    /// Chunks currently resident.
    pub resident: usize,
    /// Bytes held by resident layers.
    pub memory_bytes: usize,
}

/// Lifecycle state and payload for every block of one grid.
///
/// Each chunk sits behind its own mutex. A touch holds that mutex across
/// the load, so concurrent first touches of the same block elect exactly
/// one loader and the rest wait for it. Touches of different blocks never
/// contend.
///
/// The retained window is a leaf lock: it is read while a chunk mutex is
/// held, and never held while a chunk mutex is taken.
pub struct ChunkCache {
    chunks: Vec<Mutex<ChunkEntry>>,
    window: RwLock<Option<Range<usize>>>,
    loads: AtomicU64,
    evictions: AtomicU64,
}

// Shared across sampling threads.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<ChunkCache>();
};

impl ChunkCache {
    /// Create a cache with `block_count` chunks, all `NotLoaded`.
    pub fn new(block_count: usize) -> Self {
        Self {
            chunks: (0..block_count).map(|_| Mutex::default()).collect(),
            window: RwLock::new(None),
            loads: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Number of chunks.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Whether the cache has no chunks.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    fn chunk(&self, block: BlockId) -> MutexGuard<'_, ChunkEntry> {
        self.chunks[block.0]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn in_window(&self, time_index: usize) -> bool {
        match &*self.window.read().unwrap_or_else(PoisonError::into_inner) {
            Some(range) => range.contains(&time_index),
            None => true,
        }
    }

    /// Mark `block` as used this step and return the `key` layer.
    ///
    /// If the layer is not resident, `load` is called exactly once while
    /// the chunk is locked. A layer whose time index lies outside the
    /// retained window is returned but not kept. On a load failure the
    /// chunk's state is left as it was.
    ///
    /// # Panics
    ///
    /// Panics if `block` is not a valid id for this cache.
    pub fn touch<F>(&self, block: BlockId, key: LayerKey, load: F) -> Result<Arc<Block>, LoadError>
    where
        F: FnOnce() -> Result<Block, LoadError>,
    {
        let mut entry = self.chunk(block);
        if let Some(layer) = entry.layers.get(&key) {
            let layer = Arc::clone(layer);
            entry.state = entry.state.touched();
            return Ok(layer);
        }

        let prev = entry.state;
        entry.state = ChunkState::LoadRequested;
        let loaded = match load() {
            Ok(b) => Arc::new(b),
            Err(e) => {
                entry.state = prev;
                return Err(e);
            }
        };
        self.loads.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(
            block = %block,
            field = %key.field,
            time_index = key.time_index,
            bytes = loaded.memory_bytes(),
            "loaded block"
        );
        if self.in_window(key.time_index) {
            entry.layers.insert(key, Arc::clone(&loaded));
        }
        entry.state = prev.touched();
        Ok(loaded)
    }

    /// Start a step: every `LoadedTouched` chunk becomes `Deprecated`.
    pub fn begin_step(&self) {
        for chunk in &self.chunks {
            let mut entry = chunk.lock().unwrap_or_else(PoisonError::into_inner);
            entry.state = entry.state.begin_step();
        }
    }

    /// End a step: every chunk still `Deprecated` becomes `NotLoaded` and
    /// its payload is freed. Returns the number of chunks evicted.
    pub fn end_step(&self) -> usize {
        let mut evicted = 0;
        for chunk in &self.chunks {
            let mut entry = chunk.lock().unwrap_or_else(PoisonError::into_inner);
            let next = entry.state.end_step();
            if entry.state == ChunkState::Deprecated && next == ChunkState::NotLoaded {
                entry.layers.clear();
                evicted += 1;
            }
            entry.state = next;
        }
        if evicted > 0 {
            self.evictions.fetch_add(evicted as u64, Ordering::Relaxed);
            tracing::debug!(evicted, "evicted untouched chunks");
        }
        evicted
    }

    /// Keep only layers whose time index lies in `window`; layers loaded
    /// later outside it are not retained. Returns the number of layers
    /// dropped.
    ///
    /// A chunk left with no layers keeps its state; it reloads on its next
    /// touch.
    pub fn retain_window(&self, window: Range<usize>) -> usize {
        *self.window.write().unwrap_or_else(PoisonError::into_inner) = Some(window.clone());
        let mut dropped = 0;
        for chunk in &self.chunks {
            let mut entry = chunk.lock().unwrap_or_else(PoisonError::into_inner);
            let before = entry.layers.len();
            entry.layers.retain(|k, _| window.contains(&k.time_index));
            dropped += before - entry.layers.len();
        }
        dropped
    }

    /// Drop every payload and reset every chunk to `NotLoaded`.
    pub fn clear(&self) {
        *self.window.write().unwrap_or_else(PoisonError::into_inner) = None;
        for chunk in &self.chunks {
            let mut entry = chunk.lock().unwrap_or_else(PoisonError::into_inner);
            entry.layers.clear();
            entry.state = ChunkState::NotLoaded;
        }
    }

    /// Current state of `block`.
    pub fn state(&self, block: BlockId) -> ChunkState {
        self.chunk(block).state
    }

    /// Whether `block` holds at least one layer.
    pub fn is_resident(&self, block: BlockId) -> bool {
        !self.chunk(block).layers.is_empty()
    }

    /// Whether the `key` layer of `block` is resident.
    pub fn has_layer(&self, block: BlockId, key: LayerKey) -> bool {
        self.chunk(block).layers.contains_key(&key)
    }

    /// Number of chunks holding at least one layer.
    pub fn resident_count(&self) -> usize {
        self.chunks
            .iter()
            .filter(|c| {
                !c.lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .layers
                    .is_empty()
            })
            .count()
    }

    /// Bytes held by all resident layers.
    pub fn memory_bytes(&self) -> usize {
        self.chunks
            .iter()
            .map(|c| {
                c.lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .layers
                    .values()
                    .map(|b| b.memory_bytes())
                    .sum::<usize>()
            })
            .sum()
    }

    /// Layers loaded since construction.
    pub fn load_count(&self) -> u64 {
        self.loads.load(Ordering::Relaxed)
    }

    /// Chunks evicted since construction.
    pub fn eviction_count(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    /// Snapshot of all counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            loads: self.load_count(),
            evictions: self.eviction_count(),
            resident: self.resident_count(),
            memory_bytes: self.memory_bytes(),
        }
    }
}

impl std::fmt::Debug for ChunkCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkCache")
            .field("chunks", &self.chunks.len())
            .field("loads", &self.load_count())
            .field("evictions", &self.eviction_count())
            .finish()
    }
}
