//! In-crate fixtures for unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use drift_core::{BackingStore, Block, BlockExtent, LoadError, SnapshotReader};

type ValueFn = Arc<dyn Fn(usize, usize, usize, usize) -> f32 + Send + Sync>;

fn default_value(t: usize, k: usize, j: usize, i: usize) -> f32 {
    (t * 1000 + k * 100 + j * 10 + i) as f32
}

#[derive(Default)]
struct Counters {
    opens: AtomicUsize,
    reads: AtomicUsize,
    closed: Mutex<Vec<usize>>,
}

/// A store with `nt` snapshots whose values are a function of
/// `(time_index, k, j, i)`.
pub(crate) struct CountingStore {
    nt: usize,
    value: ValueFn,
    counters: Arc<Counters>,
}

impl CountingStore {
    pub(crate) fn new(nt: usize) -> Self {
        Self::with_values(nt, default_value)
    }

    pub(crate) fn with_values(
        nt: usize,
        value: impl Fn(usize, usize, usize, usize) -> f32 + Send + Sync + 'static,
    ) -> Self {
        Self {
            nt,
            value: Arc::new(value),
            counters: Arc::default(),
        }
    }

    pub(crate) fn opens(&self) -> usize {
        self.counters.opens.load(Ordering::SeqCst)
    }

    pub(crate) fn reads(&self) -> usize {
        self.counters.reads.load(Ordering::SeqCst)
    }

    pub(crate) fn closed(&self) -> Vec<usize> {
        self.counters.closed.lock().unwrap().clone()
    }
}

impl BackingStore for CountingStore {
    fn open_time_slice(&self, time_index: usize) -> Result<Arc<dyn SnapshotReader>, LoadError> {
        if time_index >= self.nt {
            return Err(LoadError::MissingSnapshot { time_index });
        }
        self.counters.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(CountingReader {
            time_index,
            value: Arc::clone(&self.value),
            counters: Arc::clone(&self.counters),
        }))
    }
}

struct CountingReader {
    time_index: usize,
    value: ValueFn,
    counters: Arc<Counters>,
}

impl SnapshotReader for CountingReader {
    fn time_index(&self) -> usize {
        self.time_index
    }

    fn read_block(&self, extent: &BlockExtent) -> Result<Block, LoadError> {
        self.counters.reads.fetch_add(1, Ordering::SeqCst);
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
        self.counters.closed.lock().unwrap().push(self.time_index);
    }
}
