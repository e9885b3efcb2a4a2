//! Named collection of fields, expressions, vector fields and constants.

use std::sync::Arc;

use indexmap::IndexMap;

use drift_cache::CacheStats;
use drift_core::FieldId;

use crate::error::FieldError;
use crate::expr::{FieldExpr, VectorField};
use crate::field::Field;
use crate::grid::{Direction, Grid};
use crate::sampler::FieldSampler;

/// Everything a kernel can sample, by name.
///
/// Names are unique across fields, expressions and vector fields.
/// Constants live in their own namespace.
#[derive(Debug, Default)]
pub struct FieldSet {
    fields: IndexMap<String, Arc<Field>>,
    exprs: IndexMap<String, FieldExpr>,
    vectors: IndexMap<String, VectorField>,
    constants: IndexMap<String, f64>,
    grids: Vec<Arc<Grid>>,
    members: Vec<Arc<Field>>,
}

impl FieldSet {
    /// An empty set.
    pub fn new() -> Self {
        Self::default()
    }

    fn check_name(&self, name: &str) -> Result<(), FieldError> {
        if self.fields.contains_key(name)
            || self.exprs.contains_key(name)
            || self.vectors.contains_key(name)
        {
            return Err(FieldError::DuplicateName {
                name: name.to_string(),
            });
        }
        Ok(())
    }

    fn track(&mut self, field: &Arc<Field>) {
        if !self.members.iter().any(|f| f.id() == field.id()) {
            self.members.push(Arc::clone(field));
        }
        if !self.grids.iter().any(|g| g.id() == field.grid().id()) {
            self.grids.push(Arc::clone(field.grid()));
        }
    }

    /// Register a field under its own name.
    pub fn add_field(&mut self, field: Field) -> Result<Arc<Field>, FieldError> {
        self.add_shared_field(Arc::new(field))
    }

    /// Register a field that is also used elsewhere.
    pub fn add_shared_field(&mut self, field: Arc<Field>) -> Result<Arc<Field>, FieldError> {
        self.check_name(field.name())?;
        self.track(&field);
        self.fields
            .insert(field.name().to_string(), Arc::clone(&field));
        Ok(field)
    }

    /// Register a composite expression under `name`.
    pub fn add_expr(&mut self, name: impl Into<String>, expr: FieldExpr) -> Result<(), FieldError> {
        let name = name.into();
        self.check_name(&name)?;
        for leaf in expr.leaves() {
            self.track(leaf);
        }
        self.exprs.insert(name, expr);
        Ok(())
    }

    /// Register a vector field under its own name.
    pub fn add_vector(&mut self, vector: VectorField) -> Result<(), FieldError> {
        self.check_name(vector.name())?;
        let leaves: Vec<Arc<Field>> = vector.leaves().into_iter().cloned().collect();
        for leaf in &leaves {
            self.track(leaf);
        }
        self.vectors.insert(vector.name().to_string(), vector);
        Ok(())
    }

    /// Set (or replace) a named constant.
    pub fn add_constant(&mut self, name: impl Into<String>, value: f64) {
        self.constants.insert(name.into(), value);
    }

    /// A field by name.
    pub fn field(&self, name: &str) -> Option<&Arc<Field>> {
        self.fields.get(name)
    }

    /// A composite expression by name.
    pub fn expr(&self, name: &str) -> Option<&FieldExpr> {
        self.exprs.get(name)
    }

    /// A field or composite expression by name.
    pub fn sampler(&self, name: &str) -> Option<&dyn FieldSampler> {
        if let Some(f) = self.fields.get(name) {
            return Some(&**f as &dyn FieldSampler);
        }
        self.exprs.get(name).map(|e| e as &dyn FieldSampler)
    }

    /// A vector field by name.
    pub fn vector(&self, name: &str) -> Option<&VectorField> {
        self.vectors.get(name)
    }

    /// A constant by name.
    pub fn constant(&self, name: &str) -> Option<f64> {
        self.constants.get(name).copied()
    }

    /// All named constants.
    pub fn constants(&self) -> &IndexMap<String, f64> {
        &self.constants
    }

    /// Fields registered by name, in insertion order.
    pub fn fields(&self) -> impl Iterator<Item = &Arc<Field>> {
        self.fields.values()
    }

    /// Every distinct field reachable from the set, including those only
    /// used inside expressions.
    pub fn all_fields(&self) -> &[Arc<Field>] {
        &self.members
    }

    /// Whether `id` belongs to any field in the set.
    pub fn contains(&self, id: FieldId) -> bool {
        self.members.iter().any(|f| f.id() == id)
    }

    /// Distinct grids of all fields.
    pub fn grids(&self) -> &[Arc<Grid>] {
        &self.grids
    }

    /// Start a step on every grid.
    pub fn begin_step(&self) {
        for g in &self.grids {
            g.begin_step();
        }
    }

    /// End a step on every grid; returns the chunks evicted.
    pub fn end_step(&self) -> usize {
        self.grids.iter().map(|g| g.end_step()).sum()
    }

    /// Push every field's window to cover `time` for travel along `dt`,
    /// and return how far the run may go before the next advance.
    ///
    /// The result is the nearest snapshot boundary across all fields,
    /// rounded down to a whole number of `dt` steps from `time` unless
    /// that would be zero steps. Infinite boundaries are returned as is.
    pub fn advance_time(&self, time: f64, dt: f64) -> Result<f64, FieldError> {
        let dir = Direction::of(dt);
        for g in &self.grids {
            g.reset_update_status();
        }
        let mut next = match dir {
            Direction::Forward => f64::INFINITY,
            Direction::Backward => f64::NEG_INFINITY,
        };
        for f in &self.members {
            let boundary = f.advance(time, dir)?;
            if boundary == time && dt != 0.0 {
                return Err(FieldError::TimeExtrapolation {
                    field: f.name().to_string(),
                    time,
                });
            }
            next = match dir {
                Direction::Forward => next.min(boundary),
                Direction::Backward => next.max(boundary),
            };
        }
        if next.is_infinite() || dt == 0.0 {
            return Ok(next);
        }
        let steps = ((next - time) / dt).trunc();
        if steps == 0.0 {
            Ok(next)
        } else {
            Ok(time + steps * dt)
        }
    }

    /// Close every field's readers.
    pub fn close(&self) {
        for f in &self.members {
            f.close();
        }
    }

    /// Cache counters summed over all grids.
    pub fn cache_stats(&self) -> CacheStats {
        self.grids
            .iter()
            .map(|g| g.cache().stats())
            .fold(CacheStats::default(), |acc, s| CacheStats {
                loads: acc.loads + s.loads,
                evictions: acc.evictions + s.evictions,
                resident: acc.resident + s.resident,
                memory_bytes: acc.memory_bytes + s.memory_bytes,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::CountingStore;
    use drift_grid::GridIndex;

    fn grid(times: &[f64]) -> Arc<Grid> {
        let index = GridIndex::new(
            vec![0.0, 1.0, 2.0, 3.0],
            vec![0.0, 1.0, 2.0, 3.0],
            vec![0.0],
            times.to_vec(),
            [1, 2, 2],
        )
        .unwrap();
        Arc::new(Grid::with_window_size(index, 2).unwrap())
    }

    fn field(name: &str, g: &Arc<Grid>, nt: usize) -> Field {
        Field::builder(name)
            .grid(Arc::clone(g))
            .store(Arc::new(CountingStore::new(nt)))
            .build()
            .unwrap()
    }

    #[test]
    fn duplicate_names_rejected() {
        let g = grid(&[0.0, 1.0]);
        let mut fs = FieldSet::new();
        fs.add_field(field("U", &g, 2)).unwrap();
        let err = fs.add_field(field("U", &g, 2)).unwrap_err();
        assert_eq!(err, FieldError::DuplicateName { name: "U".into() });
    }

    #[test]
    fn shared_grid_registered_once() {
        let g = grid(&[0.0, 1.0]);
        let mut fs = FieldSet::new();
        fs.add_field(field("U", &g, 2)).unwrap();
        fs.add_field(field("V", &g, 2)).unwrap();
        assert_eq!(fs.grids().len(), 1);
        assert_eq!(fs.all_fields().len(), 2);
    }

    #[test]
    fn expression_leaves_are_tracked() {
        let g = grid(&[0.0, 1.0]);
        let a = Arc::new(field("a", &g, 2));
        let b = Arc::new(field("b", &g, 2));
        let mut fs = FieldSet::new();
        fs.add_expr("ab", FieldExpr::sum(vec![a.into(), b.into()]).unwrap())
            .unwrap();
        assert_eq!(fs.all_fields().len(), 2);
        assert!(fs.sampler("ab").is_some());
        assert!(fs.sampler("a").is_none());
    }

    #[test]
    fn advance_time_rounds_to_whole_steps() {
        let g = grid(&[0.0, 10.0, 20.0, 30.0]);
        let mut fs = FieldSet::new();
        fs.add_field(field("U", &g, 4)).unwrap();
        // Boundary at 10, dt 3: three whole steps.
        assert_eq!(fs.advance_time(0.0, 3.0).unwrap(), 9.0);
        // Less than a step away: the boundary itself.
        assert_eq!(fs.advance_time(9.0, 3.0).unwrap(), 10.0);
        assert_eq!(fs.advance_time(10.0, 3.0).unwrap(), 19.0);
    }

    #[test]
    fn advance_time_backward() {
        let g = grid(&[0.0, 10.0, 20.0, 30.0]);
        let mut fs = FieldSet::new();
        fs.add_field(field("U", &g, 4)).unwrap();
        assert_eq!(fs.advance_time(30.0, -4.0).unwrap(), 22.0);
        assert_eq!(fs.advance_time(5.0, -4.0).unwrap(), f64::NEG_INFINITY);
    }

    #[test]
    fn advance_time_pinned_window_is_unbounded() {
        let g = grid(&[0.0, 10.0]);
        let mut fs = FieldSet::new();
        fs.add_field(field("U", &g, 2)).unwrap();
        assert_eq!(fs.advance_time(0.0, 1.0).unwrap(), f64::INFINITY);
    }

    #[test]
    fn constants_are_separate() {
        let mut fs = FieldSet::new();
        fs.add_constant("U", 1.5);
        assert_eq!(fs.constant("U"), Some(1.5));
        assert!(fs.field("U").is_none());
    }
}
