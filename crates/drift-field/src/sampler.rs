//! Point sampling: grid search, lazy window advance, block touches and
//! interpolation.
//!
//! Sampling is the coupling point between the time window and the chunk
//! cache. A sample resolves its time layers under the field's window read
//! lock, clones the readers it needs and releases the lock before touching
//! any block, so a concurrent slide never waits on a block load that holds
//! the window.

use std::sync::Arc;

use smallvec::SmallVec;

use drift_core::{Block, BlockId, ErrorKind, EvalError, LoadError, SnapshotReader};
use drift_grid::{CellLocation, Stencil};

use crate::field::Field;
use crate::grid::Direction;
use crate::window::TimeWindowBuffer;

/// Anything that can be evaluated at `(t, z, y, x)`.
pub trait FieldSampler: Send + Sync {
    /// Value at the given time and position.
    ///
    /// Positions outside the grid and times the window cannot cover are
    /// per-entity errors; backing-store failures are fatal.
    fn sample(&self, t: f64, z: f64, y: f64, x: f64) -> Result<f64, EvalError>;
}

struct TimeLayer {
    time_index: usize,
    reader: Arc<dyn SnapshotReader>,
}

struct TimeLayers {
    lo: TimeLayer,
    hi: Option<(TimeLayer, f64)>,
}

enum Resolve {
    Ready(TimeLayers),
    Advance(Direction),
}

impl Field {
    /// Value of this field at `(t, z, y, x)`.
    ///
    /// If `t` lies outside the resident window the window is advanced
    /// first, in the direction of `t` relative to the window. A time still
    /// outside afterwards is clamped when the field allows time
    /// extrapolation, and an error otherwise.
    pub fn sample(&self, t: f64, z: f64, y: f64, x: f64) -> Result<f64, EvalError> {
        let loc = self.grid().index().search(z, y, x).map_err(|kind| {
            EvalError::entity(
                kind,
                format!("{} sampled at (z={z}, y={y}, x={x})", self.name()),
            )
        })?;
        let layers = self.time_layers(t)?;
        let v0 = self.sample_layer(&layers.lo, &loc)?;
        match layers.hi {
            Some((hi, frac)) => {
                let v1 = self.sample_layer(&hi, &loc)?;
                Ok(v0 + (v1 - v0) * frac)
            }
            None => Ok(v0),
        }
    }

    fn time_extrapolation(&self, t: f64) -> EvalError {
        EvalError::entity(
            ErrorKind::TimeExtrapolation,
            format!("{} sampled at time {t}", self.name()),
        )
    }

    fn time_layers(&self, t: f64) -> Result<TimeLayers, EvalError> {
        if t.is_nan() {
            return Err(self.time_extrapolation(t));
        }
        let mut advanced = false;
        loop {
            let dir = match self.resolve(t, advanced)? {
                Resolve::Ready(layers) => return Ok(layers),
                Resolve::Advance(dir) => dir,
            };
            self.advance(t, dir)?;
            advanced = true;
        }
    }

    fn resolve(&self, t: f64, advanced: bool) -> Result<Resolve, EvalError> {
        let window = self.read_window();
        let Some(start) = window.start() else {
            if advanced {
                return Err(self.time_extrapolation(t));
            }
            return Ok(Resolve::Advance(Direction::Forward));
        };
        let time = self.grid().index().time();
        let t0 = time.get(start);
        let t1 = time.get(start + window.window_size() - 1);
        let inside = t >= t0 && t <= t1;
        if !inside && !advanced {
            let dir = if t < t0 {
                Direction::Backward
            } else {
                Direction::Forward
            };
            return Ok(Resolve::Advance(dir));
        }
        if !inside && !self.allows_time_extrapolation() {
            return Err(self.time_extrapolation(t));
        }
        self.layers_at(&window, start, t.clamp(t0, t1))
            .map(Resolve::Ready)
    }

    fn layers_at(
        &self,
        window: &TimeWindowBuffer,
        start: usize,
        t: f64,
    ) -> Result<TimeLayers, EvalError> {
        let layer = |time_index: usize| -> Result<TimeLayer, LoadError> {
            let reader = window
                .reader(time_index)
                .ok_or(LoadError::MissingSnapshot { time_index })?;
            Ok(TimeLayer { time_index, reader })
        };
        let w = window.window_size();
        if w == 1 {
            return Ok(TimeLayers {
                lo: layer(start)?,
                hi: None,
            });
        }
        let time = self.grid().index().time();
        let ti = time
            .floor_index(t)
            .unwrap_or(start)
            .clamp(start, start + w - 2);
        let (a, b) = (time.get(ti), time.get(ti + 1));
        let frac = ((t - a) / (b - a)).clamp(0.0, 1.0);
        let hi = if frac > 0.0 {
            Some((layer(ti + 1)?, frac))
        } else {
            None
        };
        Ok(TimeLayers {
            lo: layer(ti)?,
            hi,
        })
    }

    fn sample_layer(&self, layer: &TimeLayer, loc: &CellLocation) -> Result<f64, EvalError> {
        let index = self.grid().index();
        let mut blocks: SmallVec<[(BlockId, Arc<Block>); 8]> = SmallVec::new();
        let mut stencil = Stencil::default();
        for dz in 0..2 {
            for dy in 0..2 {
                for dx in 0..2 {
                    let [k, j, i] = loc.corner(dz, dy, dx);
                    let coord = index.block_of(k, j, i);
                    let id = index.block_id(coord);
                    let block = match blocks.iter().find(|(b, _)| *b == id) {
                        Some((_, block)) => Arc::clone(block),
                        None => {
                            let block = self.touch_block(id, layer.time_index, &layer.reader)?;
                            blocks.push((id, Arc::clone(&block)));
                            block
                        }
                    };
                    let v = block.value(k, j, i).ok_or_else(|| LoadError::CorruptBlock {
                        block: coord,
                        time_index: layer.time_index,
                        reason: format!("cell ({k}, {j}, {i}) missing from block"),
                    })?;
                    stencil.values[dz][dy][dx] = f64::from(v);
                }
            }
        }
        self.interpolator()
            .interpolate(&stencil, loc)
            .ok_or_else(|| {
                EvalError::entity(
                    ErrorKind::Interpolation,
                    format!(
                        "{} could not interpolate with {}",
                        self.name(),
                        self.interpolator().name()
                    ),
                )
            })
    }
}

impl FieldSampler for Field {
    fn sample(&self, t: f64, z: f64, y: f64, x: f64) -> Result<f64, EvalError> {
        Field::sample(self, t, z, y, x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Grid;
    use crate::testing::CountingStore;
    use drift_cache::ChunkState;
    use drift_grid::GridIndex;

    fn field(store: Arc<CountingStore>, times: &[f64], w: usize) -> Field {
        let index = GridIndex::new(
            vec![0.0, 1.0, 2.0, 3.0],
            vec![0.0, 1.0, 2.0, 3.0],
            vec![0.0, 1.0],
            times.to_vec(),
            [1, 2, 2],
        )
        .unwrap();
        let grid = Arc::new(Grid::with_window_size(index, w).unwrap());
        Field::builder("U").grid(grid).store(store).build().unwrap()
    }

    fn kind(r: Result<f64, EvalError>) -> Option<ErrorKind> {
        r.err().and_then(|e| e.kind())
    }

    #[test]
    fn interpolates_in_space_and_time() {
        let store = Arc::new(CountingStore::new(3));
        let f = field(store, &[0.0, 10.0, 20.0], 3);
        // value = 1000 t + 100 k + 10 j + i
        let v = f.sample(5.0, 0.5, 1.5, 2.25).unwrap();
        assert!((v - (500.0 + 50.0 + 15.0 + 2.25)).abs() < 1e-9);
    }

    #[test]
    fn first_sample_pulls_the_window() {
        let store = Arc::new(CountingStore::new(3));
        let f = field(store.clone(), &[0.0, 10.0, 20.0], 2);
        assert!(f.loaded_time_indices().is_empty());
        f.sample(0.0, 0.0, 0.0, 0.0).unwrap();
        assert_eq!(f.loaded_time_indices(), vec![0, 1]);
        assert_eq!(store.opens(), 2);
    }

    #[test]
    fn repeated_samples_do_not_reload() {
        let store = Arc::new(CountingStore::new(2));
        let f = field(store.clone(), &[0.0, 10.0], 2);
        f.grid().begin_step();
        for _ in 0..10 {
            f.sample(0.0, 0.0, 0.5, 0.5).unwrap();
        }
        // Exact snapshot time: one layer, one block per depth level.
        assert_eq!(store.reads(), 2);
        assert_eq!(f.grid().cache().state(BlockId(0)), ChunkState::LoadedTouched);
    }

    #[test]
    fn stencil_across_blocks_touches_each_once() {
        let store = Arc::new(CountingStore::new(2));
        let f = field(store.clone(), &[0.0, 10.0], 2);
        f.sample(0.0, 0.0, 1.5, 1.5).unwrap();
        // Two depth levels, each corner in a different block column.
        assert_eq!(store.reads(), 8);
    }

    #[test]
    fn outside_grid_is_classified() {
        let store = Arc::new(CountingStore::new(2));
        let f = field(store, &[0.0, 10.0], 2);
        assert_eq!(kind(f.sample(0.0, -1.0, 1.0, 1.0)), Some(ErrorKind::ThroughSurface));
        assert_eq!(kind(f.sample(0.0, 0.5, 1.0, 9.0)), Some(ErrorKind::OutOfBounds));
    }

    #[test]
    fn time_outside_data_is_an_error_unless_allowed() {
        let store = Arc::new(CountingStore::new(2));
        let f = field(store, &[0.0, 10.0], 2);
        assert_eq!(kind(f.sample(15.0, 0.0, 0.0, 0.0)), Some(ErrorKind::TimeExtrapolation));

        let store = Arc::new(CountingStore::new(2));
        let index = GridIndex::new(vec![0.0, 1.0], vec![0.0, 1.0], vec![0.0], vec![0.0, 10.0], [1, 2, 2])
            .unwrap();
        let f = Field::builder("U")
            .grid(Arc::new(Grid::with_window_size(index, 2).unwrap()))
            .store(store)
            .allow_time_extrapolation(true)
            .build()
            .unwrap();
        assert_eq!(f.sample(15.0, 0.0, 0.0, 0.0).unwrap(), 1000.0);
    }

    #[test]
    fn single_snapshot_field_ignores_time() {
        let store = Arc::new(CountingStore::new(1));
        let f = field(store, &[0.0], 2);
        assert_eq!(f.sample(1e6, 0.0, 0.0, 1.0).unwrap(), 1.0);
        assert_eq!(f.sample(-1e6, 0.0, 0.0, 1.0).unwrap(), 1.0);
    }

    #[test]
    fn failing_store_is_fatal() {
        let store = Arc::new(CountingStore::new(1));
        let f = field(store, &[0.0, 10.0], 2);
        let err = f.sample(0.0, 0.0, 0.0, 0.0).unwrap_err();
        assert_eq!(err, EvalError::Fatal(LoadError::MissingSnapshot { time_index: 1 }));
    }

    #[test]
    fn nan_values_are_zeroed() {
        let store = Arc::new(CountingStore::with_values(2, |_, _, _, _| f32::NAN));
        let f = field(store, &[0.0, 10.0], 2);
        assert_eq!(f.sample(3.0, 0.0, 0.5, 0.5).unwrap(), 0.0);
    }
}
