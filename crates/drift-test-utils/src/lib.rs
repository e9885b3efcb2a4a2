//! Test utilities for drift development.
//!
//! Provides an in-memory [`BackingStore`] with I/O counters
//! ([`MemoryStore`]), a sink that records every flush ([`RecordingSink`]),
//! grid helpers, and fixture kernels in [`fixtures`].

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use drift_core::{BackingStore, Block, BlockExtent, EntityId, LoadError, SnapshotReader};
use drift_engine::{Entity, EntitySink, OutputBatch, OutputError};
use drift_field::Grid;
use drift_grid::GridIndex;

type ValueFn = Arc<dyn Fn(usize, usize, usize, usize) -> f32 + Send + Sync>;

#[derive(Default)]
struct Counters {
    opens: AtomicUsize,
    closes: AtomicUsize,
    reads: AtomicUsize,
    open: Mutex<BTreeSet<usize>>,
}

/// A backing store computing values from `(time_index, k, j, i)`.
///
/// Counts snapshot opens, closes and block reads. Optionally fails every
/// block read of one time index with [`LoadError::Io`].
pub struct MemoryStore {
    nt: usize,
    value: ValueFn,
    failing: Option<usize>,
    counters: Arc<Counters>,
}

impl MemoryStore {
    pub fn new(
        nt: usize,
        value: impl Fn(usize, usize, usize, usize) -> f32 + Send + Sync + 'static,
    ) -> Self {
        Self {
            nt,
            value: Arc::new(value),
            failing: None,
            counters: Arc::default(),
        }
    }

    /// Every cell of every snapshot holds `v`.
    pub fn constant(nt: usize, v: f32) -> Self {
        Self::new(nt, move |_, _, _, _| v)
    }

    /// Block reads at `time_index` fail.
    pub fn failing_at(mut self, time_index: usize) -> Self {
        self.failing = Some(time_index);
        self
    }

    pub fn opens(&self) -> usize {
        self.counters.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.counters.closes.load(Ordering::SeqCst)
    }

    pub fn reads(&self) -> usize {
        self.counters.reads.load(Ordering::SeqCst)
    }

    /// Time indices with an open reader, ascending.
    pub fn open_indices(&self) -> Vec<usize> {
        self.counters
            .open
            .lock()
            .unwrap()
            .iter()
            .copied()
            .collect()
    }
}

impl BackingStore for MemoryStore {
    fn open_time_slice(&self, time_index: usize) -> Result<Arc<dyn SnapshotReader>, LoadError> {
        if time_index >= self.nt {
            return Err(LoadError::MissingSnapshot { time_index });
        }
        self.counters.opens.fetch_add(1, Ordering::SeqCst);
        self.counters.open.lock().unwrap().insert(time_index);
        Ok(Arc::new(MemoryReader {
            time_index,
            value: Arc::clone(&self.value),
            fails: self.failing == Some(time_index),
            counters: Arc::clone(&self.counters),
        }))
    }
}

struct MemoryReader {
    time_index: usize,
    value: ValueFn,
    fails: bool,
    counters: Arc<Counters>,
}

impl SnapshotReader for MemoryReader {
    fn time_index(&self) -> usize {
        self.time_index
    }

    fn read_block(&self, extent: &BlockExtent) -> Result<Block, LoadError> {
        self.counters.reads.fetch_add(1, Ordering::SeqCst);
        if self.fails {
            return Err(LoadError::Io {
                reason: format!("injected failure at time index {}", self.time_index),
            });
        }
        let [k0, j0, i0] = extent.origin;
        let [nk, nj, ni] = extent.shape;
        let mut data = Vec::with_capacity(extent.cell_count());
        for k in k0..k0 + nk {
            for j in j0..j0 + nj {
                for i in i0..i0 + ni {
                    data.push((self.value)(self.time_index, k, j, i));
                }
            }
        }
        Block::new(*extent, data).ok_or_else(|| LoadError::Io {
            reason: "shape mismatch".into(),
        })
    }

    fn close(&self) {
        self.counters.closes.fetch_add(1, Ordering::SeqCst);
        self.counters.open.lock().unwrap().remove(&self.time_index);
    }
}

/// A grid with unit spacing: `x = 0..nx`, `y = 0..ny`, `z = 0..nz`.
pub fn uniform_index(
    nx: usize,
    ny: usize,
    nz: usize,
    time: Vec<f64>,
    block_shape: [usize; 3],
) -> GridIndex {
    let axis = |n: usize| (0..n).map(|v| v as f64).collect::<Vec<_>>();
    GridIndex::new(axis(nx), axis(ny), axis(nz), time, block_shape).unwrap()
}

/// [`uniform_index`] wrapped in a shared [`Grid`] with the default window.
pub fn uniform_grid(
    nx: usize,
    ny: usize,
    nz: usize,
    time: Vec<f64>,
    block_shape: [usize; 3],
) -> Arc<Grid> {
    Arc::new(Grid::new(uniform_index(nx, ny, nz, time, block_shape)))
}

/// Records every flushed batch. Clones share the record.
#[derive(Clone, Default)]
pub struct RecordingSink {
    batches: Arc<Mutex<Vec<OutputBatch>>>,
    fail: bool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose every flush fails.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn batches(&self) -> Vec<OutputBatch> {
        self.batches.lock().unwrap().clone()
    }

    /// Ids in flush order, across all batches.
    pub fn flushed_ids(&self) -> Vec<EntityId> {
        self.batches
            .lock()
            .unwrap()
            .iter()
            .flat_map(|b| b.entities.iter().map(|e| e.id))
            .collect()
    }

    pub fn times(&self) -> Vec<f64> {
        self.batches.lock().unwrap().iter().map(|b| b.time).collect()
    }
}

impl EntitySink for RecordingSink {
    fn flush(&mut self, entities: &[Entity], time: f64) -> Result<(), OutputError> {
        if self.fail {
            return Err(OutputError::Io {
                reason: "recording sink set to fail".into(),
            });
        }
        self.batches.lock().unwrap().push(OutputBatch {
            time,
            entities: entities.to_vec(),
        });
        Ok(())
    }
}
