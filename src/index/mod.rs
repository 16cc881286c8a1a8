//! Thread-safe spatial index over vector objects.
//!
//! [`SpatialIndex`] wraps an [`RTree`] in a single read-write lock: searches
//! share the read lock, insertions and removals take the write lock. Callers
//! that need several mutations in one critical section (remove + re-insert
//! after a vertex edit) take the guard from [`SpatialIndex::write`] and call
//! the tree directly.

pub mod rtree;

pub use rtree::{DEFAULT_MAX_ENTRIES, DEFAULT_MIN_ENTRIES, RTree, check_fanout};

use crate::Bounds;
use crate::error::Result;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

pub struct SpatialIndex<T> {
    tree: RwLock<RTree<T>>,
}

impl<T> Default for SpatialIndex<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SpatialIndex<T> {
    pub fn new() -> Self {
        Self {
            tree: RwLock::new(RTree::new()),
        }
    }

    /// Fails with [`GeoTilesError::InvalidConfig`](crate::GeoTilesError)
    /// for a fan-out the tree cannot split with.
    pub fn with_fanout(min_entries: usize, max_entries: usize) -> Result<Self> {
        Ok(Self {
            tree: RwLock::new(RTree::with_fanout(min_entries, max_entries)?),
        })
    }

    /// Insert under the write lock.
    pub fn insert(&self, item: T, bounds: Bounds) {
        self.tree.write().insert(item, bounds);
    }

    /// Remove under the write lock. See [`RTree::remove`] for the no-op case.
    pub fn remove(&self, item: &T, bounds: &Bounds) -> bool
    where
        T: PartialEq,
    {
        self.tree.write().remove(item, bounds)
    }

    /// Items overlapping `query`, under the read lock.
    pub fn search(&self, query: &Bounds) -> Vec<T>
    where
        T: Clone,
    {
        self.tree.read().search(query)
    }

    pub fn len(&self) -> usize {
        self.tree.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.read().is_empty()
    }

    pub fn depth(&self) -> usize {
        self.tree.read().depth()
    }

    pub fn clear(&self) {
        self.tree.write().clear();
    }

    /// Shared access for several reads against one consistent snapshot.
    pub fn read(&self) -> RwLockReadGuard<'_, RTree<T>> {
        self.tree.read()
    }

    /// Exclusive access for batched mutations.
    ///
    /// The guard's [`RTree::insert`]/[`RTree::remove`] are the lock-free
    /// variants; the lock is released when the guard drops.
    pub fn write(&self) -> RwLockWriteGuard<'_, RTree<T>> {
        self.tree.write()
    }
}
