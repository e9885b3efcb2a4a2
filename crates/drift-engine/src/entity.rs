//! Entities (particles) and the set that owns them.

use smallvec::SmallVec;

use drift_core::{EntityId, ErrorKind, Status};

/// User variables carried by an entity and restored on retries.
pub type Vars = SmallVec<[f64; 4]>;

/// A point advanced through the fields by the kernels.
#[derive(Clone, Debug, PartialEq)]
pub struct Entity {
    /// Stable identity.
    pub id: EntityId,
    /// Own clock.
    pub time: f64,
    /// Depth.
    pub z: f64,
    /// Meridional position.
    pub y: f64,
    /// Zonal position.
    pub x: f64,
    /// Signed step; the engine sets it to the current sub-step before each
    /// kernel call.
    pub dt: f64,
    /// Execution status.
    pub status: Status,
    /// User variables.
    pub vars: Vars,
    next_dt: Option<f64>,
    last_error: Option<String>,
}

impl Entity {
    /// An entity at `(time, z, y, x)` with no step set.
    pub fn new(id: EntityId, time: f64, z: f64, y: f64, x: f64) -> Self {
        Self {
            id,
            time,
            z,
            y,
            x,
            dt: 0.0,
            status: Status::Evaluate,
            vars: Vars::new(),
            next_dt: None,
            last_error: None,
        }
    }

    /// Attach user variables.
    pub fn with_vars(mut self, vars: impl IntoIterator<Item = f64>) -> Self {
        self.vars = vars.into_iter().collect();
        self
    }

    /// Request removal after this step; the entity is flushed first.
    pub fn delete(&mut self) {
        self.status = Status::Delete;
    }

    /// Request a retry of the current step from the pre-step state.
    pub fn repeat(&mut self) {
        self.status = Status::Repeat;
    }

    /// Request that the whole `execute` call stop after this pass.
    pub fn stop(&mut self) {
        self.status = Status::StopExecution;
    }

    /// Mark the entity as failed with `kind`.
    pub fn fail(&mut self, kind: ErrorKind, detail: impl Into<String>) {
        self.status = Status::Error(kind);
        self.last_error = Some(detail.into());
    }

    /// Back to `Evaluate`.
    pub fn reset_status(&mut self) {
        self.status = Status::Evaluate;
    }

    /// Whether the entity reached `Success`.
    pub fn is_computed(&self) -> bool {
        self.status == Status::Success
    }

    /// Schedule `dt` to take effect once the current step completes.
    pub fn update_next_dt(&mut self, dt: f64) {
        self.next_dt = Some(dt);
    }

    /// Apply a scheduled step, if any.
    pub(crate) fn apply_next_dt(&mut self) {
        if let Some(dt) = self.next_dt.take() {
            self.dt = dt;
        }
    }

    /// Detail of the most recent error.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub(crate) fn backup(&self) -> Backup {
        Backup {
            time: self.time,
            z: self.z,
            y: self.y,
            x: self.x,
            vars: self.vars.clone(),
            next_dt: self.next_dt,
        }
    }

    /// Restore everything but `dt` and `status`.
    pub(crate) fn restore(&mut self, b: Backup) {
        self.time = b.time;
        self.z = b.z;
        self.y = b.y;
        self.x = b.x;
        self.vars = b.vars;
        self.next_dt = b.next_dt;
    }

    pub(crate) fn set_last_error(&mut self, detail: String) {
        self.last_error = Some(detail);
    }
}

/// State saved before a kernel call.
#[derive(Clone, Debug)]
pub(crate) struct Backup {
    time: f64,
    z: f64,
    y: f64,
    x: f64,
    vars: Vars,
    next_dt: Option<f64>,
}

/// Owner of all live entities.
#[derive(Clone, Debug, Default)]
pub struct EntitySet {
    entities: Vec<Entity>,
    next_id: u64,
}

impl EntitySet {
    /// An empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Release a new entity at `(time, z, y, x)`.
    pub fn release(&mut self, time: f64, z: f64, y: f64, x: f64) -> EntityId {
        let id = EntityId(self.next_id);
        self.next_id += 1;
        self.entities.push(Entity::new(id, time, z, y, x));
        id
    }

    /// Add a prepared entity. Later releases never reuse its id.
    pub fn add(&mut self, entity: Entity) {
        self.next_id = self.next_id.max(entity.id.0 + 1);
        self.entities.push(entity);
    }

    /// Number of live entities.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Live entities.
    pub fn as_slice(&self) -> &[Entity] {
        &self.entities
    }

    /// Live entities, mutably.
    pub fn as_mut_slice(&mut self) -> &mut [Entity] {
        &mut self.entities
    }

    /// Entity by id.
    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.iter().find(|e| e.id == id)
    }

    /// Iterate over live entities.
    pub fn iter(&self) -> std::slice::Iter<'_, Entity> {
        self.entities.iter()
    }

    /// Set every entity's step.
    pub fn set_dt(&mut self, dt: f64) {
        for e in &mut self.entities {
            e.dt = dt;
        }
    }

    /// Remove every entity with status `Delete`, returning them in order.
    pub fn take_deleted(&mut self) -> Vec<Entity> {
        let (deleted, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.entities)
            .into_iter()
            .partition(|e| e.status == Status::Delete);
        self.entities = kept;
        deleted
    }
}

impl<'a> IntoIterator for &'a EntitySet {
    type Item = &'a Entity;
    type IntoIter = std::slice::Iter<'a, Entity>;

    fn into_iter(self) -> Self::IntoIter {
        self.entities.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn release_assigns_increasing_ids() {
        let mut set = EntitySet::new();
        let a = set.release(0.0, 0.0, 0.0, 0.0);
        let b = set.release(0.0, 0.0, 0.0, 0.0);
        assert_eq!((a, b), (EntityId(0), EntityId(1)));
    }

    #[test]
    fn add_moves_id_counter_past_existing() {
        let mut set = EntitySet::new();
        set.add(Entity::new(EntityId(10), 0.0, 0.0, 0.0, 0.0));
        assert_eq!(set.release(0.0, 0.0, 0.0, 0.0), EntityId(11));
    }

    #[test]
    fn take_deleted_keeps_order_of_survivors() {
        let mut set = EntitySet::new();
        for _ in 0..4 {
            set.release(0.0, 0.0, 0.0, 0.0);
        }
        set.as_mut_slice()[1].delete();
        set.as_mut_slice()[2].delete();
        let gone = set.take_deleted();
        assert_eq!(gone.iter().map(|e| e.id.0).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(set.iter().map(|e| e.id.0).collect::<Vec<_>>(), vec![0, 3]);
    }

    #[test]
    fn restore_keeps_dt_and_status() {
        let mut e = Entity::new(EntityId(0), 0.0, 1.0, 2.0, 3.0).with_vars([7.0]);
        let b = e.backup();
        e.x = 99.0;
        e.vars[0] = 0.0;
        e.dt = 5.0;
        e.repeat();
        e.restore(b);
        assert_eq!((e.x, e.vars[0], e.dt, e.status), (3.0, 7.0, 5.0, Status::Repeat));
    }
}
