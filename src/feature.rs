//! Shared handles to the vector objects held by an engine.

use crate::{Bounds, Geometry, GeometryKind};
use parking_lot::{Mutex, RwLock, RwLockReadGuard};
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

/// Engine-assigned object identifier, unique for the engine's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FeatureId(pub u64);

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A geometry plus the box it is currently indexed under.
///
/// `indexed_bounds` lags behind `geometry` for the duration of an edit and
/// is what removal from the index must be called with.
#[derive(Debug)]
pub struct Feature {
    id: FeatureId,
    kind: GeometryKind,
    geometry: RwLock<Geometry>,
    indexed_bounds: Mutex<Bounds>,
}

impl Feature {
    pub fn id(&self) -> FeatureId {
        self.id
    }

    /// Kind is fixed at creation; edits never change it.
    pub fn kind(&self) -> GeometryKind {
        self.kind
    }

    pub fn geometry(&self) -> RwLockReadGuard<'_, Geometry> {
        self.geometry.read()
    }

    /// Owned copy of the current geometry.
    pub fn snapshot(&self) -> Geometry {
        self.geometry.read().clone()
    }

    pub fn bounds(&self) -> Bounds {
        self.geometry.read().bounds()
    }

    pub fn is_selected(&self) -> bool {
        self.geometry.read().is_selected()
    }

    pub(crate) fn indexed_bounds(&self) -> Bounds {
        *self.indexed_bounds.lock()
    }

    pub(crate) fn set_indexed_bounds(&self, bounds: Bounds) {
        *self.indexed_bounds.lock() = bounds;
    }

    /// Apply `edit` and return `(bounds before, bounds after, edit result)`.
    pub(crate) fn edit<R>(&self, edit: impl FnOnce(&mut Geometry) -> R) -> (Bounds, Bounds, R) {
        let mut geometry = self.geometry.write();
        let before = geometry.bounds();
        let result = edit(&mut geometry);
        (before, geometry.bounds(), result)
    }
}

/// Cheap clonable reference to a [`Feature`].
///
/// Equality is identity: two handles are equal only if they point at the
/// same allocation, which is what index removal matches on.
#[derive(Debug, Clone)]
pub struct FeatureHandle(Arc<Feature>);

impl FeatureHandle {
    pub(crate) fn new(id: FeatureId, geometry: Geometry) -> Self {
        let bounds = geometry.bounds();
        Self(Arc::new(Feature {
            id,
            kind: geometry.kind(),
            geometry: RwLock::new(geometry),
            indexed_bounds: Mutex::new(bounds),
        }))
    }
}

impl Deref for FeatureHandle {
    type Target = Feature;

    fn deref(&self) -> &Feature {
        &self.0
    }
}

impl PartialEq for FeatureHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for FeatureHandle {}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::Coord;

    #[test]
    fn test_identity_equality() {
        let a = FeatureHandle::new(FeatureId(1), Geometry::point(1.0, 1.0));
        let b = FeatureHandle::new(FeatureId(1), Geometry::point(1.0, 1.0));
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }

    #[test]
    fn test_edit_reports_both_bounds() {
        let handle = FeatureHandle::new(
            FeatureId(7),
            Geometry::line_string(vec![(0.0, 0.0), (1.0, 1.0)]),
        );
        let (before, after, old) = handle.edit(|g| g.move_vertex(1, Coord { x: 5.0, y: 1.0 }));
        assert_eq!(before.max_x, 1.0);
        assert_eq!(after.max_x, 5.0);
        assert_eq!(old, Some(Coord { x: 1.0, y: 1.0 }));
        // Indexed bounds only move when the engine reindexes.
        assert_eq!(handle.indexed_bounds(), before);
        assert_eq!(handle.kind(), GeometryKind::LineString);
    }
}
