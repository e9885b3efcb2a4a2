//! Grids: index, shared window clock and chunk cache.
//!
//! Every field defined on a grid shares the grid's [`ChunkCache`] and its
//! window clock. The clock decides where the time window starts; each
//! field's [`TimeWindowBuffer`](crate::TimeWindowBuffer) then follows it.
//! At most one slide happens per grid per step: once the update status
//! leaves `NotUpdated`, later advances only read the result.

use std::ops::Range;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use drift_cache::ChunkCache;
use drift_core::GridId;
use drift_grid::GridIndex;

use crate::error::FieldError;

/// Default number of resident snapshots.
pub const DEFAULT_WINDOW_SIZE: usize = 3;

static NEXT_GRID_ID: AtomicU32 = AtomicU32::new(0);

/// Per-step window update status of a grid.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum UpdateStatus {
    /// No field has advanced the window this step.
    #[default]
    NotUpdated,
    /// The initial full window load happened this step.
    FirstUpdated,
    /// The window slid this step.
    Updated,
}

/// Travel direction through time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Increasing time.
    Forward,
    /// Decreasing time.
    Backward,
}

impl Direction {
    /// Direction of a signed step; zero counts as forward.
    pub fn of(dt: f64) -> Self {
        if dt < 0.0 {
            Self::Backward
        } else {
            Self::Forward
        }
    }
}

/// Result of advancing a grid's window clock.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WindowPosition {
    /// First global time index in the window.
    pub start: usize,
    /// Time of the next snapshot boundary in the direction of travel, or
    /// `±inf` once the window is pinned against the end of the data.
    pub boundary: f64,
    /// Status after the advance.
    pub status: UpdateStatus,
}

#[derive(Debug, Default)]
struct WindowClock {
    start: Option<usize>,
    status: UpdateStatus,
}

/// A grid shared by one or more fields.
#[derive(Debug)]
pub struct Grid {
    id: GridId,
    index: GridIndex,
    window_size: usize,
    cache: ChunkCache,
    clock: Mutex<WindowClock>,
}

impl Grid {
    /// Wrap `index` with the default window size.
    pub fn new(index: GridIndex) -> Self {
        let window_size = DEFAULT_WINDOW_SIZE.min(index.nt());
        Self::build(index, window_size)
    }

    /// Wrap `index` with `window_size` resident snapshots (2 or 3). Grids
    /// with fewer snapshots use all of them.
    pub fn with_window_size(index: GridIndex, window_size: usize) -> Result<Self, FieldError> {
        if !(2..=3).contains(&window_size) {
            return Err(FieldError::InvalidWindowSize {
                requested: window_size,
            });
        }
        let window_size = window_size.min(index.nt());
        Ok(Self::build(index, window_size))
    }

    fn build(index: GridIndex, window_size: usize) -> Self {
        let cache = ChunkCache::new(index.block_count());
        Self {
            id: GridId(NEXT_GRID_ID.fetch_add(1, Ordering::Relaxed)),
            index,
            window_size,
            cache,
            clock: Mutex::default(),
        }
    }

    /// Process-unique id.
    pub fn id(&self) -> GridId {
        self.id
    }

    /// Axes and block partitioning.
    pub fn index(&self) -> &GridIndex {
        &self.index
    }

    /// The block cache shared by all fields on this grid.
    pub fn cache(&self) -> &ChunkCache {
        &self.cache
    }

    /// Effective number of resident snapshots.
    pub fn window_size(&self) -> usize {
        self.window_size
    }

    fn clock(&self) -> MutexGuard<'_, WindowClock> {
        self.clock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current window start, `None` before the first load.
    pub fn window_start(&self) -> Option<usize> {
        self.clock().start
    }

    /// Global time indices currently in the window.
    pub fn window_range(&self) -> Option<Range<usize>> {
        self.window_start().map(|s| s..s + self.window_size)
    }

    /// This step's update status.
    pub fn update_status(&self) -> UpdateStatus {
        self.clock().status
    }

    /// Clear the update status so the next advance may slide.
    pub fn reset_update_status(&self) {
        self.clock().status = UpdateStatus::NotUpdated;
    }

    /// Start a step: reset the update status and deprecate touched chunks.
    pub fn begin_step(&self) {
        self.reset_update_status();
        self.cache.begin_step();
    }

    /// End a step: evict chunks not touched this step.
    pub fn end_step(&self) -> usize {
        self.cache.end_step()
    }

    /// Window start that keeps `target` covered when travelling in `dir`.
    ///
    /// Forward travel keeps `target` in `[t[s], t[s+1])`, backward travel in
    /// `(t[s+W-2], t[s+W-1]]`, clamped to the data.
    pub fn desired_start(&self, target: f64, dir: Direction) -> usize {
        let time = self.index.time();
        let nt = time.len();
        let max_start = nt - self.window_size;
        match dir {
            Direction::Forward => time.floor_index(target).unwrap_or(0).min(max_start),
            Direction::Backward => {
                let hi = time.ceil_index(target).unwrap_or(nt - 1);
                hi.saturating_sub(self.window_size - 1).min(max_start)
            }
        }
    }

    /// Next boundary for a window starting at `start`.
    pub fn boundary(&self, start: usize, dir: Direction) -> f64 {
        let time = self.index.time();
        let nt = time.len();
        let w = self.window_size;
        match dir {
            Direction::Forward if start + w >= nt => f64::INFINITY,
            Direction::Forward => time.get(start + 1),
            Direction::Backward if start == 0 => f64::NEG_INFINITY,
            Direction::Backward => time.get(start + w.max(2) - 2),
        }
    }

    /// Advance the window clock towards `target`.
    ///
    /// The first call loads the full window (`FirstUpdated`). Later calls
    /// slide only while the status is `NotUpdated` and only in the
    /// direction of travel (`Updated`). Slides prune the cache to the new
    /// window.
    pub fn advance(&self, target: f64, dir: Direction) -> WindowPosition {
        let mut clock = self.clock();
        let desired = self.desired_start(target, dir);
        let start = match clock.start {
            None => {
                clock.status = UpdateStatus::FirstUpdated;
                tracing::debug!(grid = %self.id, start = desired, "initial window load");
                desired
            }
            Some(current) if clock.status != UpdateStatus::NotUpdated => current,
            Some(current) => {
                let slides = match dir {
                    Direction::Forward => desired > current,
                    Direction::Backward => desired < current,
                };
                if slides {
                    clock.status = UpdateStatus::Updated;
                    tracing::debug!(grid = %self.id, from = current, to = desired, "window slide");
                    desired
                } else {
                    current
                }
            }
        };
        if clock.start != Some(start) {
            clock.start = Some(start);
            let dropped = self.cache.retain_window(start..start + self.window_size);
            if dropped > 0 {
                tracing::debug!(grid = %self.id, dropped, "pruned layers outside window");
            }
        }
        WindowPosition {
            start,
            boundary: self.boundary(start, dir),
            status: clock.status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(times: &[f64], w: usize) -> Grid {
        let index = GridIndex::new(
            vec![0.0, 1.0],
            vec![0.0, 1.0],
            vec![0.0],
            times.to_vec(),
            [1, 2, 2],
        )
        .unwrap();
        Grid::with_window_size(index, w).unwrap()
    }

    #[test]
    fn rejects_unsupported_window_sizes() {
        let index = GridIndex::new(vec![0.0], vec![0.0], vec![0.0], vec![0.0], [1, 1, 1]).unwrap();
        assert!(matches!(
            Grid::with_window_size(index, 4),
            Err(FieldError::InvalidWindowSize { requested: 4 })
        ));
    }

    #[test]
    fn first_advance_fills_window() {
        let g = grid(&[0.0, 10.0, 20.0, 30.0], 2);
        let pos = g.advance(5.0, Direction::Forward);
        assert_eq!(pos.start, 0);
        assert_eq!(pos.status, UpdateStatus::FirstUpdated);
        assert_eq!(pos.boundary, 10.0);
    }

    #[test]
    fn one_slide_per_step() {
        let g = grid(&[0.0, 10.0, 20.0, 30.0], 2);
        g.advance(0.0, Direction::Forward);
        g.reset_update_status();
        assert_eq!(g.advance(10.0, Direction::Forward).start, 1);
        assert_eq!(g.update_status(), UpdateStatus::Updated);
        // Already updated this step: reads the result.
        assert_eq!(g.advance(25.0, Direction::Forward).start, 1);
        g.reset_update_status();
        assert_eq!(g.advance(25.0, Direction::Forward).start, 2);
    }

    #[test]
    fn pinned_window_reports_infinite_boundary() {
        let g = grid(&[0.0, 10.0, 20.0], 2);
        g.advance(0.0, Direction::Forward);
        g.reset_update_status();
        let pos = g.advance(10.0, Direction::Forward);
        assert_eq!(pos.start, 1);
        assert_eq!(pos.boundary, f64::INFINITY);
        g.reset_update_status();
        assert_eq!(g.advance(50.0, Direction::Forward).start, 1);
    }

    #[test]
    fn backward_travel_mirrors_forward() {
        let g = grid(&[0.0, 10.0, 20.0, 30.0], 2);
        let pos = g.advance(30.0, Direction::Backward);
        assert_eq!(pos.start, 2);
        assert_eq!(pos.boundary, 20.0);
        g.reset_update_status();
        let pos = g.advance(20.0, Direction::Backward);
        assert_eq!(pos.start, 1);
        assert_eq!(pos.boundary, 10.0);
        g.reset_update_status();
        let pos = g.advance(5.0, Direction::Backward);
        assert_eq!(pos.start, 0);
        assert_eq!(pos.boundary, f64::NEG_INFINITY);
    }

    #[test]
    fn never_slides_against_travel() {
        let g = grid(&[0.0, 10.0, 20.0, 30.0], 3);
        g.advance(15.0, Direction::Forward);
        g.reset_update_status();
        let pos = g.advance(2.0, Direction::Forward);
        assert_eq!(pos.start, 1);
        assert_eq!(pos.status, UpdateStatus::NotUpdated);
    }

    #[test]
    fn single_snapshot_grid_is_always_pinned() {
        let index = GridIndex::new(vec![0.0], vec![0.0], vec![0.0], vec![5.0], [1, 1, 1]).unwrap();
        let g = Grid::new(index);
        assert_eq!(g.window_size(), 1);
        let pos = g.advance(100.0, Direction::Forward);
        assert_eq!(pos.start, 0);
        assert_eq!(pos.boundary, f64::INFINITY);
        assert_eq!(g.advance(-3.0, Direction::Backward).boundary, f64::NEG_INFINITY);
    }
}
