//! Recovery functions keyed by error kind.

use std::sync::Arc;

use indexmap::IndexMap;

use drift_core::ErrorKind;

use crate::entity::Entity;
use crate::kernel::KernelContext;

/// A recovery function. It receives the entity with status `Success`
/// and may set any status; leaving `Success` retries the entity.
pub type RecoveryFn = dyn Fn(&mut Entity, &KernelContext<'_>, f64) + Send + Sync;

/// Maps error kinds to recovery functions.
///
/// User registrations take precedence over defaults. A user handler for
/// [`ErrorKind::OutOfBounds`] also handles [`ErrorKind::ThroughSurface`]
/// unless a handler for the latter is registered too.
#[derive(Clone, Default)]
pub struct RecoveryRegistry {
    user: IndexMap<ErrorKind, Arc<RecoveryFn>>,
    defaults: IndexMap<ErrorKind, Arc<RecoveryFn>>,
}

impl RecoveryRegistry {
    /// A registry with no handlers: every error deletes the entity.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry where out-of-bounds and through-surface errors delete
    /// the entity with a warning.
    pub fn with_defaults() -> Self {
        let mut r = Self::new();
        let delete: Arc<RecoveryFn> = Arc::new(delete_with_warning);
        r.defaults.insert(ErrorKind::OutOfBounds, Arc::clone(&delete));
        r.defaults.insert(ErrorKind::ThroughSurface, delete);
        r
    }

    /// Register `f` for `kind`, replacing any earlier registration.
    pub fn register<F>(&mut self, kind: ErrorKind, f: F) -> &mut Self
    where
        F: Fn(&mut Entity, &KernelContext<'_>, f64) + Send + Sync + 'static,
    {
        self.user.insert(kind, Arc::new(f));
        self
    }

    /// Remove the user registration for `kind`. Defaults stay.
    pub fn unregister(&mut self, kind: ErrorKind) -> bool {
        self.user.shift_remove(&kind).is_some()
    }

    /// The handler for `kind`, if any.
    pub fn get(&self, kind: ErrorKind) -> Option<&RecoveryFn> {
        if let Some(f) = self.user.get(&kind) {
            return Some(&**f);
        }
        if kind == ErrorKind::ThroughSurface {
            if let Some(f) = self.user.get(&ErrorKind::OutOfBounds) {
                return Some(&**f);
            }
        }
        self.defaults.get(&kind).map(|f| &**f)
    }

    /// Whether some handler covers `kind`.
    pub fn contains(&self, kind: ErrorKind) -> bool {
        self.get(kind).is_some()
    }
}

impl std::fmt::Debug for RecoveryRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoveryRegistry")
            .field("user", &self.user.keys().collect::<Vec<_>>())
            .field("defaults", &self.defaults.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Default recovery: log and delete.
pub fn delete_with_warning(entity: &mut Entity, _ctx: &KernelContext<'_>, time: f64) {
    tracing::warn!(
        entity = %entity.id,
        time,
        z = entity.z,
        y = entity.y,
        x = entity.x,
        error = entity.last_error().unwrap_or("unknown"),
        "deleting entity that left the domain"
    );
    entity.delete();
}

#[cfg(test)]
mod tests {
    use super::*;
    use drift_core::{EntityId, Status};
    use drift_field::FieldSet;

    fn run(r: &RecoveryRegistry, kind: ErrorKind) -> Status {
        let fs = FieldSet::new();
        let ctx = KernelContext::new(&fs, 0, 0, 1);
        let mut e = Entity::new(EntityId(0), 0.0, 0.0, 0.0, 0.0);
        e.status = Status::Success;
        let f = r.get(kind).unwrap();
        f(&mut e, &ctx, 0.0);
        e.status
    }

    #[test]
    fn defaults_delete_out_of_domain() {
        let r = RecoveryRegistry::with_defaults();
        assert_eq!(run(&r, ErrorKind::OutOfBounds), Status::Delete);
        assert_eq!(run(&r, ErrorKind::ThroughSurface), Status::Delete);
        assert!(!r.contains(ErrorKind::TimeExtrapolation));
    }

    #[test]
    fn out_of_bounds_handler_covers_surface() {
        let mut r = RecoveryRegistry::with_defaults();
        r.register(ErrorKind::OutOfBounds, |e, _, _| e.x = 0.0);
        assert_eq!(run(&r, ErrorKind::ThroughSurface), Status::Success);
    }

    #[test]
    fn explicit_surface_handler_wins() {
        let mut r = RecoveryRegistry::new();
        r.register(ErrorKind::OutOfBounds, |e, _, _| e.x = 0.0);
        r.register(ErrorKind::ThroughSurface, |e, _, _| e.repeat());
        assert_eq!(run(&r, ErrorKind::ThroughSurface), Status::Repeat);
    }

    #[test]
    fn unregister_falls_back_to_default() {
        let mut r = RecoveryRegistry::with_defaults();
        r.register(ErrorKind::OutOfBounds, |_, _, _| {});
        assert!(r.unregister(ErrorKind::OutOfBounds));
        assert_eq!(run(&r, ErrorKind::OutOfBounds), Status::Delete);
    }
}
