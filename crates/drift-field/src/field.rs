//! Fields: a named variable on a grid, backed by a store.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use drift_cache::LayerKey;
use drift_core::{BackingStore, Block, BlockExtent, BlockId, FieldId, LoadError, SnapshotReader};
use drift_grid::{Interpolator, Linear};

use crate::error::FieldError;
use crate::grid::{Direction, Grid, UpdateStatus};
use crate::window::TimeWindowBuffer;

static NEXT_FIELD_ID: AtomicU32 = AtomicU32::new(0);

/// Per-field loading and sampling options.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldParams {
    /// Clamp sample times to the resident window instead of failing.
    /// `None` allows it only for single-snapshot grids.
    pub allow_time_extrapolation: Option<bool>,
    /// Multiplier applied to every loaded value.
    pub scaling_factor: f64,
    /// Loaded values below this become 0.
    pub vmin: Option<f64>,
    /// Loaded values above this become 0.
    pub vmax: Option<f64>,
}

impl Default for FieldParams {
    fn default() -> Self {
        Self {
            allow_time_extrapolation: None,
            scaling_factor: 1.0,
            vmin: None,
            vmax: None,
        }
    }
}

impl FieldParams {
    /// Check the parameters for internal consistency.
    pub fn validate(&self) -> Result<(), String> {
        if !self.scaling_factor.is_finite() {
            return Err(format!(
                "scaling_factor must be finite, got {}",
                self.scaling_factor
            ));
        }
        if let (Some(lo), Some(hi)) = (self.vmin, self.vmax) {
            if lo > hi {
                return Err(format!("vmin ({lo}) is greater than vmax ({hi})"));
            }
        }
        Ok(())
    }

    /// NaN becomes 0, then values are scaled, then values outside
    /// `[vmin, vmax]` become 0.
    pub fn clean(&self, data: &mut [f32]) {
        let scale = self.scaling_factor as f32;
        let lo = self.vmin.map(|v| v as f32);
        let hi = self.vmax.map(|v| v as f32);
        for v in data.iter_mut() {
            if v.is_nan() {
                *v = 0.0;
            }
            *v *= scale;
            if lo.is_some_and(|lo| *v < lo) || hi.is_some_and(|hi| *v > hi) {
                *v = 0.0;
            }
        }
    }
}

/// A variable defined on a [`Grid`], read from a [`BackingStore`].
///
/// Axis and window accessors forward to the grid; the grid stays the
/// single owner of that state.
pub struct Field {
    id: FieldId,
    name: String,
    grid: Arc<Grid>,
    store: Arc<dyn BackingStore>,
    interpolator: Arc<dyn Interpolator>,
    params: FieldParams,
    window: RwLock<TimeWindowBuffer>,
}

// Sampled from many threads at once.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<Field>();
};

impl Field {
    /// Start building a field called `name`.
    pub fn builder(name: impl Into<String>) -> FieldBuilder {
        FieldBuilder {
            name: name.into(),
            grid: None,
            store: None,
            interpolator: None,
            params: FieldParams::default(),
        }
    }

    /// Process-unique id; also the cache layer owner.
    pub fn id(&self) -> FieldId {
        self.id
    }

    /// Name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The grid this field lives on.
    pub fn grid(&self) -> &Arc<Grid> {
        &self.grid
    }

    /// Loading and sampling options.
    pub fn params(&self) -> &FieldParams {
        &self.params
    }

    /// Spatial interpolator.
    pub fn interpolator(&self) -> &dyn Interpolator {
        &*self.interpolator
    }

    /// Longitudes (x axis).
    pub fn lon(&self) -> &[f64] {
        self.grid.index().x().values()
    }

    /// Latitudes (y axis).
    pub fn lat(&self) -> &[f64] {
        self.grid.index().y().values()
    }

    /// Depths (z axis).
    pub fn depth(&self) -> &[f64] {
        self.grid.index().z().values()
    }

    /// Every snapshot time of the dataset.
    pub fn time_full(&self) -> &[f64] {
        self.grid.index().time().values()
    }

    /// Resident snapshots per window.
    pub fn window_size(&self) -> usize {
        self.grid.window_size()
    }

    /// This step's update status of the grid.
    pub fn update_status(&self) -> UpdateStatus {
        self.grid.update_status()
    }

    /// Whether sample times outside the window are clamped rather than
    /// rejected.
    pub fn allows_time_extrapolation(&self) -> bool {
        self.params
            .allow_time_extrapolation
            .unwrap_or(self.grid.index().nt() == 1)
    }

    pub(crate) fn read_window(&self) -> RwLockReadGuard<'_, TimeWindowBuffer> {
        self.window.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_window(&self) -> RwLockWriteGuard<'_, TimeWindowBuffer> {
        self.window.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Global time indices of the resident snapshots.
    pub fn loaded_time_indices(&self) -> Vec<usize> {
        self.read_window().loaded_time_indices()
    }

    /// Times of the first and last resident snapshot.
    pub fn resident_span(&self) -> Option<(f64, f64)> {
        let start = self.read_window().start()?;
        let time = self.grid.index().time();
        Some((time.get(start), time.get(start + self.window_size() - 1)))
    }

    /// Bring the window into position for `target` when travelling in
    /// `dir`, and return the next snapshot boundary.
    ///
    /// The grid decides the window start (sliding at most once per step);
    /// this field then opens the entering snapshots and closes the leaving
    /// ones. Single-block grids load the whole snapshot eagerly.
    pub fn advance(&self, target: f64, dir: Direction) -> Result<f64, LoadError> {
        let mut window = self.write_window();
        let pos = self.grid.advance(target, dir);
        let opened = window.sync_to(pos.start, &*self.store)?;
        if !opened.is_empty() {
            tracing::debug!(
                field = %self.name,
                start = pos.start,
                opened = ?opened,
                "synced field window"
            );
        }
        if self.grid.index().block_count() == 1 {
            for ti in opened {
                if let Some(reader) = window.reader(ti) {
                    self.touch_block(BlockId(0), ti, &reader)?;
                }
            }
        }
        Ok(pos.boundary)
    }

    /// Close all readers and forget the window position.
    pub fn close(&self) {
        self.write_window().close_all();
    }

    /// Touch one block of the `time_index` layer, loading and cleaning it
    /// through `reader` if it is not resident.
    pub(crate) fn touch_block(
        &self,
        block: BlockId,
        time_index: usize,
        reader: &Arc<dyn SnapshotReader>,
    ) -> Result<Arc<Block>, LoadError> {
        let index = self.grid.index();
        let extent = index.block_extent(index.block_coord(block));
        let key = LayerKey::new(self.id, time_index);
        self.grid
            .cache()
            .touch(block, key, || self.load_block(reader, &extent, time_index))
    }

    fn load_block(
        &self,
        reader: &Arc<dyn SnapshotReader>,
        extent: &BlockExtent,
        time_index: usize,
    ) -> Result<Block, LoadError> {
        let mut block = reader.read_block(extent)?;
        if block.extent() != extent {
            return Err(LoadError::CorruptBlock {
                block: extent.coord,
                time_index,
                reason: format!(
                    "expected origin {:?} shape {:?}, got origin {:?} shape {:?}",
                    extent.origin,
                    extent.shape,
                    block.extent().origin,
                    block.extent().shape
                ),
            });
        }
        self.params.clean(block.data_mut());
        Ok(block)
    }
}

impl std::fmt::Debug for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Field")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("grid", &self.grid.id())
            .field("interpolator", &self.interpolator.name())
            .field("params", &self.params)
            .finish()
    }
}

/// Builder for [`Field`].
pub struct FieldBuilder {
    name: String,
    grid: Option<Arc<Grid>>,
    store: Option<Arc<dyn BackingStore>>,
    interpolator: Option<Arc<dyn Interpolator>>,
    params: FieldParams,
}

impl FieldBuilder {
    /// The grid the field lives on (required).
    pub fn grid(mut self, grid: Arc<Grid>) -> Self {
        self.grid = Some(grid);
        self
    }

    /// The backing store (required).
    pub fn store(mut self, store: Arc<dyn BackingStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Spatial interpolator; [`Linear`] if unset.
    pub fn interpolator(mut self, interpolator: Arc<dyn Interpolator>) -> Self {
        self.interpolator = Some(interpolator);
        self
    }

    /// Replace all parameters.
    pub fn params(mut self, params: FieldParams) -> Self {
        self.params = params;
        self
    }

    /// Multiply loaded values by `factor`.
    pub fn scaling_factor(mut self, factor: f64) -> Self {
        self.params.scaling_factor = factor;
        self
    }

    /// Zero loaded values below `vmin`.
    pub fn vmin(mut self, vmin: f64) -> Self {
        self.params.vmin = Some(vmin);
        self
    }

    /// Zero loaded values above `vmax`.
    pub fn vmax(mut self, vmax: f64) -> Self {
        self.params.vmax = Some(vmax);
        self
    }

    /// Clamp (true) or reject (false) sample times outside the window.
    pub fn allow_time_extrapolation(mut self, allow: bool) -> Self {
        self.params.allow_time_extrapolation = Some(allow);
        self
    }

    /// Validate and build.
    pub fn build(self) -> Result<Field, FieldError> {
        let grid = self.grid.ok_or_else(|| FieldError::Incomplete {
            field: self.name.clone(),
            missing: "grid",
        })?;
        let store = self.store.ok_or_else(|| FieldError::Incomplete {
            field: self.name.clone(),
            missing: "backing store",
        })?;
        self.params
            .validate()
            .map_err(|reason| FieldError::InvalidParams {
                field: self.name.clone(),
                reason,
            })?;
        let window = TimeWindowBuffer::new(grid.window_size());
        Ok(Field {
            id: FieldId(NEXT_FIELD_ID.fetch_add(1, Ordering::Relaxed)),
            name: self.name,
            grid,
            store,
            interpolator: self.interpolator.unwrap_or_else(|| Arc::new(Linear)),
            params: self.params,
            window: RwLock::new(window),
        })
    }
}
