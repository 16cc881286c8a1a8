//! Bounded LRU tile store keyed by `(zoom, x, y)`.
//!
//! Each [`TileCache`] keeps a nested `zoom -> x -> y` map for O(1) lookups,
//! an arena-backed recency list and a key index pointing into that list.
//! One read-write lock covers all three so they can never disagree. `get`
//! takes the write lock because a hit reorders the recency list; `peek` and
//! `contains` only read.
//!
//! Every removal other than LRU eviction bumps an invalidation epoch.
//! Producers that build a value outside the lock capture [`TileCache::epoch`]
//! first and publish with [`TileCache::set_if_epoch`], so a value computed
//! from data that was invalidated meanwhile is never stored.

mod lru;
mod stats;

pub use stats::CacheStats;

use crate::Bounds;
use crate::projection::{TileCoord, TileRange, tile_range};
use crate::tile::SharedTile;
use log::debug;
use lru::LruList;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

/// Estimated memory cost of a cached value.
pub trait TileWeight {
    fn weight_bytes(&self) -> usize;
}

impl TileWeight for SharedTile {
    fn weight_bytes(&self) -> usize {
        self.byte_size()
    }
}

impl TileWeight for Vec<u8> {
    fn weight_bytes(&self) -> usize {
        self.len()
    }
}

type ZoomMap<V> = FxHashMap<u32, FxHashMap<u32, Slot<V>>>;

struct Slot<V> {
    value: V,
    lru_slot: usize,
    weight: usize,
}

struct Inner<V> {
    entries: FxHashMap<u8, ZoomMap<V>>,
    recency: LruList<TileCoord>,
    bytes: usize,
    hits: u64,
    misses: u64,
    evictions: u64,
    invalidations: u64,
    epoch: u64,
}

impl<V> Inner<V> {
    fn new() -> Self {
        Self {
            entries: FxHashMap::default(),
            recency: LruList::new(),
            bytes: 0,
            hits: 0,
            misses: 0,
            evictions: 0,
            invalidations: 0,
            epoch: 0,
        }
    }

    fn slot(&self, coord: &TileCoord) -> Option<&Slot<V>> {
        self.entries.get(&coord.zoom)?.get(&coord.x)?.get(&coord.y)
    }

    fn slot_mut(&mut self, coord: &TileCoord) -> Option<&mut Slot<V>> {
        self.entries
            .get_mut(&coord.zoom)?
            .get_mut(&coord.x)?
            .get_mut(&coord.y)
    }

    /// Take `coord` out of the map and the recency list, pruning empty
    /// inner maps so `zoom_levels` only reports populated zooms.
    fn take(&mut self, coord: &TileCoord) -> Option<V> {
        let columns = self.entries.get_mut(&coord.zoom)?;
        let rows = columns.get_mut(&coord.x)?;
        let slot = rows.remove(&coord.y)?;
        if rows.is_empty() {
            columns.remove(&coord.x);
        }
        if columns.is_empty() {
            self.entries.remove(&coord.zoom);
        }
        self.recency.remove(slot.lru_slot);
        self.bytes -= slot.weight;
        Some(slot.value)
    }

    /// Cached tiles inside `range`. Walks whichever side is smaller: the
    /// range itself or the tiles resident at that zoom.
    fn keys_in_range(&self, range: &TileRange) -> Vec<TileCoord> {
        let Some(columns) = self.entries.get(&range.zoom) else {
            return Vec::new();
        };
        let resident: usize = columns.values().map(|rows| rows.len()).sum();

        if range.tile_count() <= resident {
            range.iter().filter(|c| self.slot(c).is_some()).collect()
        } else {
            columns
                .iter()
                .flat_map(|(&x, rows)| rows.keys().map(move |&y| TileCoord::new(range.zoom, x, y)))
                .filter(|c| range.contains(c))
                .collect()
        }
    }

    fn invalidate_range(&mut self, range: &TileRange) -> usize {
        self.epoch += 1;
        let keys = self.keys_in_range(range);
        for key in &keys {
            self.take(key);
        }
        self.invalidations += keys.len() as u64;
        keys.len()
    }
}

pub struct TileCache<V> {
    name: String,
    max_tiles: usize,
    inner: RwLock<Inner<V>>,
}

impl<V: Clone + TileWeight> TileCache<V> {
    /// Create a cache holding at most `max_tiles` entries (at least one).
    pub fn new(name: impl Into<String>, max_tiles: usize) -> Self {
        Self {
            name: name.into(),
            max_tiles: max_tiles.max(1),
            inner: RwLock::new(Inner::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn max_tiles(&self) -> usize {
        self.max_tiles
    }

    /// Look up a tile and promote it to most recently used.
    pub fn get(&self, coord: &TileCoord) -> Option<V> {
        let mut inner = self.inner.write();
        match inner.slot(coord).map(|s| (s.lru_slot, s.value.clone())) {
            Some((lru_slot, value)) => {
                inner.recency.move_to_front(lru_slot);
                inner.hits += 1;
                Some(value)
            }
            None => {
                inner.misses += 1;
                None
            }
        }
    }

    /// Look up a tile without touching recency or counters.
    pub fn peek(&self, coord: &TileCoord) -> Option<V> {
        self.inner.read().slot(coord).map(|s| s.value.clone())
    }

    pub fn contains(&self, coord: &TileCoord) -> bool {
        self.inner.read().slot(coord).is_some()
    }

    /// Insert or replace a tile, evicting the least recently used entry
    /// first when a new key would exceed capacity.
    pub fn set(&self, coord: TileCoord, value: V) {
        let mut inner = self.inner.write();
        self.insert_locked(&mut inner, coord, value);
    }

    /// Current invalidation epoch. Capture it before reading the data a
    /// value is built from.
    pub fn epoch(&self) -> u64 {
        self.inner.read().epoch
    }

    /// Store `value` only if nothing was invalidated since `epoch` was
    /// read. Returns whether the value was stored.
    pub fn set_if_epoch(&self, coord: TileCoord, value: V, epoch: u64) -> bool {
        let mut inner = self.inner.write();
        if inner.epoch != epoch {
            return false;
        }
        self.insert_locked(&mut inner, coord, value);
        true
    }

    fn insert_locked(&self, inner: &mut Inner<V>, coord: TileCoord, value: V) {
        let weight = value.weight_bytes();
        if let Some(slot) = inner.slot_mut(&coord) {
            let old_weight = std::mem::replace(&mut slot.weight, weight);
            slot.value = value;
            let lru_slot = slot.lru_slot;
            inner.bytes = inner.bytes - old_weight + weight;
            inner.recency.move_to_front(lru_slot);
            return;
        }

        while inner.recency.len() >= self.max_tiles {
            let Some(victim) = inner.recency.back() else {
                break;
            };
            inner.take(&victim);
            inner.evictions += 1;
            debug!("{} cache evicted tile {}", self.name, victim);
        }

        let lru_slot = inner.recency.push_front(coord);
        inner.bytes += weight;
        inner
            .entries
            .entry(coord.zoom)
            .or_default()
            .entry(coord.x)
            .or_default()
            .insert(
                coord.y,
                Slot {
                    value,
                    lru_slot,
                    weight,
                },
            );
    }

    pub fn remove(&self, coord: &TileCoord) -> Option<V> {
        let mut inner = self.inner.write();
        inner.epoch += 1;
        inner.take(coord)
    }

    /// Drop every cached tile inside `range`. Returns how many were removed.
    pub fn invalidate_range(&self, range: &TileRange) -> usize {
        let removed = self.inner.write().invalidate_range(range);
        if removed > 0 {
            debug!(
                "{} cache invalidated {} tiles at zoom {}",
                self.name, removed, range.zoom
            );
        }
        removed
    }

    /// Drop every cached tile, at every resident zoom, whose pixel rectangle
    /// grown by `pad_px` overlaps `bounds`.
    pub fn invalidate_bounds(&self, bounds: &Bounds, pad_px: f64) -> usize {
        let mut inner = self.inner.write();
        inner.epoch += 1;
        let zooms: Vec<u8> = inner.entries.keys().copied().collect();
        let mut removed = 0;
        for zoom in zooms {
            if let Some(range) = tile_range(bounds, zoom, pad_px) {
                removed += inner.invalidate_range(&range);
            }
        }
        drop(inner);

        if removed > 0 {
            debug!("{} cache invalidated {} tiles", self.name, removed);
        }
        removed
    }

    /// Zoom levels that currently hold at least one tile, ascending.
    pub fn zoom_levels(&self) -> Vec<u8> {
        let mut zooms: Vec<u8> = self.inner.read().entries.keys().copied().collect();
        zooms.sort_unstable();
        zooms
    }

    /// Drop every tile. Counters survive; returns how many were dropped.
    pub fn clear(&self) -> usize {
        let mut inner = self.inner.write();
        let dropped = inner.recency.len();
        inner.epoch += 1;
        inner.entries.clear();
        inner.recency.clear();
        inner.bytes = 0;
        inner.invalidations += dropped as u64;
        dropped
    }

    pub fn len(&self) -> usize {
        self.inner.read().recency.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resident keys from most to least recently used.
    pub fn recency_order(&self) -> Vec<TileCoord> {
        self.inner.read().recency.iter().collect()
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.read();
        CacheStats {
            name: self.name.clone(),
            resident_tiles: inner.recency.len(),
            max_tiles: self.max_tiles,
            estimated_bytes: inner.bytes,
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
            invalidations: inner.invalidations,
        }
    }
}
