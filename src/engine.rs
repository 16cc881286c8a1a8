//! The tile engine: spatial index, four tile caches, renderer and basemap
//! fetcher behind one handle.
//!
//! Every geometry mutation follows the same protocol: apply the edit,
//! reindex the object under a single index write guard, release it, then
//! evict every cached tile of the object's layer that overlaps its old or
//! new bounds (padded by the render margin) at every cached zoom. Evicted
//! tiles are rebuilt lazily on the next request.

use crate::builder::EngineBuilder;
use crate::cache::{CacheStats, TileCache};
use crate::error::{GeoTilesError, Result};
use crate::feature::{FeatureHandle, FeatureId};
use crate::fetch::{BasemapFetcher, FetchStats, RedrawSignal, RequestOutcome, TileProvider};
use crate::index::SpatialIndex;
use crate::projection::{TileCoord, Viewport};
use crate::render::{GeometryTileRenderer, PickHit, hit};
use crate::tile::{SharedTile, TileLayer};
use crate::{Bounds, Geometry, GeometryKind};
use geo::Coord;
use log::{debug, info, warn};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::time::Duration;

/// Snapshot of every cache plus the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    pub points: CacheStats,
    pub lines: CacheStats,
    pub polygons: CacheStats,
    pub basemap: CacheStats,
    pub feature_count: usize,
    pub index_depth: usize,
    pub fetch: Option<FetchStats>,
}

impl EngineStats {
    pub fn total_tiles(&self) -> usize {
        self.caches().iter().map(|c| c.resident_tiles).sum()
    }

    pub fn total_bytes(&self) -> usize {
        self.caches().iter().map(|c| c.estimated_bytes).sum()
    }

    fn caches(&self) -> [&CacheStats; 4] {
        [&self.points, &self.lines, &self.polygons, &self.basemap]
    }
}

pub struct TileEngine {
    index: SpatialIndex<FeatureHandle>,
    features: RwLock<FxHashMap<FeatureId, FeatureHandle>>,
    next_id: AtomicU64,
    points: Arc<TileCache<SharedTile>>,
    lines: Arc<TileCache<SharedTile>>,
    polygons: Arc<TileCache<SharedTile>>,
    basemap: Arc<TileCache<SharedTile>>,
    renderer: GeometryTileRenderer,
    fetcher: Option<BasemapFetcher>,
    signal: Arc<RedrawSignal>,
    zoom: AtomicU8,
    closed: AtomicBool,
}

/// Parts assembled by [`EngineBuilder`].
pub(crate) struct EngineParts {
    pub index: SpatialIndex<FeatureHandle>,
    pub points: Arc<TileCache<SharedTile>>,
    pub lines: Arc<TileCache<SharedTile>>,
    pub polygons: Arc<TileCache<SharedTile>>,
    pub basemap: Arc<TileCache<SharedTile>>,
    pub renderer: GeometryTileRenderer,
    pub fetcher: Option<BasemapFetcher>,
    pub signal: Arc<RedrawSignal>,
}

impl TileEngine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    pub(crate) fn from_parts(parts: EngineParts) -> Self {
        info!(
            "tile engine started (basemap fetch {})",
            if parts.fetcher.is_some() { "enabled" } else { "disabled" }
        );
        Self {
            index: parts.index,
            features: RwLock::new(FxHashMap::default()),
            next_id: AtomicU64::new(1),
            points: parts.points,
            lines: parts.lines,
            polygons: parts.polygons,
            basemap: parts.basemap,
            renderer: parts.renderer,
            fetcher: parts.fetcher,
            signal: parts.signal,
            zoom: AtomicU8::new(0),
            closed: AtomicBool::new(false),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(GeoTilesError::EngineClosed)
        } else {
            Ok(())
        }
    }

    // ===== Features =====

    /// Index a new object and invalidate the tiles it lands on.
    pub fn add_feature(&self, geometry: Geometry) -> Result<FeatureHandle> {
        self.ensure_open()?;
        validate_geometry(&geometry)?;

        let handle = self.new_handle(geometry);
        let bounds = handle.indexed_bounds();
        self.index.insert(handle.clone(), bounds);
        self.features.write().insert(handle.id(), handle.clone());

        self.invalidate_kind(handle.kind(), &bounds);
        Ok(handle)
    }

    /// Remove an object, returning its final geometry.
    pub fn remove_feature(&self, id: FeatureId) -> Result<Geometry> {
        self.ensure_open()?;
        let handle = self
            .features
            .write()
            .remove(&id)
            .ok_or(GeoTilesError::FeatureNotFound(id.0))?;

        let bounds = {
            let mut tree = self.index.write();
            let bounds = handle.indexed_bounds();
            if !tree.remove(&handle, &bounds) {
                warn!("feature {} not found under its indexed bounds, scanning", id);
                tree.remove_anywhere(&handle);
            }
            bounds
        };

        self.invalidate_kind(handle.kind(), &bounds);
        Ok(handle.snapshot())
    }

    pub fn feature(&self, id: FeatureId) -> Option<FeatureHandle> {
        self.features.read().get(&id).cloned()
    }

    /// All live objects, ordered by id.
    pub fn features(&self) -> Vec<FeatureHandle> {
        let mut all: Vec<FeatureHandle> = self.features.read().values().cloned().collect();
        all.sort_by_key(|f| f.id());
        all
    }

    pub fn feature_count(&self) -> usize {
        self.features.read().len()
    }

    /// Objects whose bounds overlap `bounds`.
    pub fn search(&self, bounds: &Bounds) -> Vec<FeatureHandle> {
        self.index.search(bounds)
    }

    /// Drop every object and replace them with `geometries` in one index
    /// rebuild. All geometry caches are cleared.
    pub fn replace_all(&self, geometries: Vec<Geometry>) -> Result<Vec<FeatureHandle>> {
        self.ensure_open()?;
        for geometry in &geometries {
            validate_geometry(geometry)?;
        }

        let handles: Vec<FeatureHandle> = geometries.into_iter().map(|g| self.new_handle(g)).collect();
        {
            let mut tree = self.index.write();
            tree.clear();
            for handle in &handles {
                tree.insert(handle.clone(), handle.indexed_bounds());
            }
        }
        {
            let mut features = self.features.write();
            features.clear();
            features.extend(handles.iter().map(|h| (h.id(), h.clone())));
        }

        self.clear_geometry_caches();
        info!("replaced all features ({} objects)", handles.len());
        Ok(handles)
    }

    /// Remove every object.
    pub fn clear_features(&self) -> Result<()> {
        self.replace_all(Vec::new()).map(|_| ())
    }

    // ===== Vertex Editing =====

    /// Move one vertex, returning its previous position.
    pub fn move_vertex(&self, id: FeatureId, index: usize, to: Coord<f64>) -> Result<Coord<f64>> {
        self.ensure_open()?;
        check_finite(to)?;
        let handle = self.lookup(id)?;
        let (before, after, old) = handle.edit(|g| g.move_vertex(index, to));
        let old = old.ok_or(GeoTilesError::VertexOutOfRange { feature: id.0, index })?;
        self.reindex_and_invalidate(&handle, before, after)?;
        Ok(old)
    }

    /// Insert a vertex before `index`; `index == vertex_count` appends.
    pub fn insert_vertex(&self, id: FeatureId, index: usize, at: Coord<f64>) -> Result<()> {
        self.ensure_open()?;
        check_finite(at)?;
        let handle = self.lookup(id)?;
        if handle.kind() == GeometryKind::Point {
            return Err(GeoTilesError::InvalidInput(format!(
                "feature {} is a point and has a fixed single vertex",
                id
            )));
        }
        let (before, after, inserted) = handle.edit(|g| g.insert_vertex(index, at));
        if !inserted {
            return Err(GeoTilesError::VertexOutOfRange { feature: id.0, index });
        }
        self.reindex_and_invalidate(&handle, before, after)?;
        Ok(())
    }

    /// Delete a vertex, returning its position.
    pub fn delete_vertex(&self, id: FeatureId, index: usize) -> Result<Coord<f64>> {
        self.ensure_open()?;
        let handle = self.lookup(id)?;
        if handle.kind() == GeometryKind::Point {
            return Err(GeoTilesError::InvalidInput(format!(
                "feature {} is a point; remove the feature instead",
                id
            )));
        }
        let (before, after, removed) = handle.edit(|g| g.delete_vertex(index));
        let removed = removed.ok_or(GeoTilesError::VertexOutOfRange { feature: id.0, index })?;
        self.reindex_and_invalidate(&handle, before, after)?;
        Ok(removed)
    }

    /// Change selection, returning the previous state. Bounds are
    /// unchanged but the highlight style differs, so tiles are invalidated.
    pub fn set_selected(&self, id: FeatureId, selected: bool) -> Result<bool> {
        self.ensure_open()?;
        let handle = self.lookup(id)?;
        let (bounds, _, previous) = handle.edit(|g| {
            let previous = g.is_selected();
            g.set_selected(selected);
            previous
        });
        if previous != selected {
            self.invalidate_kind(handle.kind(), &bounds);
        }
        Ok(previous)
    }

    fn lookup(&self, id: FeatureId) -> Result<FeatureHandle> {
        self.feature(id).ok_or(GeoTilesError::FeatureNotFound(id.0))
    }

    fn new_handle(&self, geometry: Geometry) -> FeatureHandle {
        let id = FeatureId(self.next_id.fetch_add(1, Ordering::Relaxed));
        FeatureHandle::new(id, geometry)
    }

    /// Remove and re-insert under one write guard, then invalidate with the
    /// index lock released. A handle that is no longer indexed was removed
    /// concurrently and is left out of the tree.
    fn reindex_and_invalidate(
        &self,
        handle: &FeatureHandle,
        before: Bounds,
        after: Bounds,
    ) -> Result<()> {
        {
            let mut tree = self.index.write();
            let indexed = handle.indexed_bounds();
            let found = tree.remove(handle, &indexed) || {
                warn!(
                    "feature {} not found under its indexed bounds, scanning",
                    handle.id()
                );
                tree.remove_anywhere(handle)
            };
            if !found {
                return Err(GeoTilesError::FeatureNotFound(handle.id().0));
            }
            let current = handle.bounds();
            tree.insert(handle.clone(), current);
            handle.set_indexed_bounds(current);
        }

        self.invalidate_kind(handle.kind(), &before);
        if after != before {
            self.invalidate_kind(handle.kind(), &after);
        }
        Ok(())
    }

    // ===== Invalidation =====

    fn geometry_cache(&self, kind: GeometryKind) -> &TileCache<SharedTile> {
        match kind {
            GeometryKind::Point => &self.points,
            GeometryKind::LineString => &self.lines,
            GeometryKind::Polygon => &self.polygons,
        }
    }

    fn invalidate_kind(&self, kind: GeometryKind, bounds: &Bounds) -> usize {
        let removed = self
            .geometry_cache(kind)
            .invalidate_bounds(bounds, self.renderer.margin_px());
        if removed > 0 {
            self.signal.raise();
        }
        removed
    }

    /// Evict every geometry tile, on all three layers, overlapping `bounds`
    /// padded by the render margin. For collaborators that change what a
    /// region should look like without going through the edit API.
    pub fn invalidate_region(&self, bounds: &Bounds) -> usize {
        GeometryKind::ALL
            .iter()
            .map(|&kind| self.invalidate_kind(kind, bounds))
            .sum()
    }

    fn clear_geometry_caches(&self) {
        let dropped: usize = GeometryKind::ALL
            .iter()
            .map(|&kind| self.geometry_cache(kind).clear())
            .sum();
        debug!("cleared {} geometry tiles", dropped);
        self.signal.raise();
    }

    // ===== Style, Provider, Zoom =====

    /// Toggle ignoring per-object style overrides. Clears all geometry
    /// caches when the flag actually changes.
    pub fn set_default_style(&self, enabled: bool) {
        if self.renderer.set_default_style(enabled) != enabled {
            self.clear_geometry_caches();
        }
    }

    pub fn default_style(&self) -> bool {
        self.renderer.default_style()
    }

    /// Switch basemap imagery. The basemap cache is cleared in bulk.
    pub fn set_provider(&self, provider: Arc<dyn TileProvider>) -> Result<()> {
        self.ensure_open()?;
        match &self.fetcher {
            Some(fetcher) => fetcher.set_provider(provider),
            None => {
                self.basemap.clear();
                self.signal.raise();
            }
        }
        Ok(())
    }

    pub fn provider(&self) -> Option<Arc<dyn TileProvider>> {
        self.fetcher.as_ref().map(|f| f.provider())
    }

    /// Record the viewer's zoom and cancel queued downloads for other
    /// zooms.
    pub fn set_zoom(&self, zoom: u8) {
        let previous = self.zoom.swap(zoom, Ordering::AcqRel);
        if previous != zoom {
            if let Some(fetcher) = &self.fetcher {
                fetcher.on_zoom_changed(zoom);
            }
        }
    }

    pub fn zoom(&self) -> u8 {
        self.zoom.load(Ordering::Acquire)
    }

    // ===== Tiles =====

    /// Tile image for `layer` at `coord`.
    ///
    /// Geometry layers render on a miss, so they always return `Some`.
    /// The basemap returns `None` on a miss and queues a download; draw a
    /// placeholder and try again after the next redraw signal.
    pub fn tile(&self, layer: TileLayer, coord: TileCoord) -> Result<Option<SharedTile>> {
        self.ensure_open()?;
        if !coord.is_valid() {
            return Err(GeoTilesError::InvalidInput(format!("tile {} is outside the grid", coord)));
        }

        match layer.kind() {
            Some(kind) => {
                let cache = self.geometry_cache(kind);
                if let Some(tile) = cache.get(&coord) {
                    return Ok(Some(tile));
                }
                // An edit landing mid-render bumps the epoch; such a tile is
                // returned for this frame but not cached.
                let epoch = cache.epoch();
                let tile = Arc::new(self.renderer.render(&self.index, coord, kind)?);
                if !cache.set_if_epoch(coord, Arc::clone(&tile), epoch) {
                    debug!("{} tile {} went stale while rendering", cache.name(), coord);
                }
                Ok(Some(tile))
            }
            None => {
                if let Some(tile) = self.basemap.get(&coord) {
                    return Ok(Some(tile));
                }
                if let Some(fetcher) = &self.fetcher {
                    if fetcher.request(coord) == RequestOutcome::Closed {
                        return Err(GeoTilesError::EngineClosed);
                    }
                }
                Ok(None)
            }
        }
    }

    /// Every tile of `layer` visible in `viewport`, in screen order. Also
    /// records the viewport's zoom.
    pub fn viewport_tiles(
        &self,
        viewport: &Viewport,
        layer: TileLayer,
    ) -> Result<Vec<(TileCoord, Option<SharedTile>)>> {
        self.set_zoom(viewport.zoom);
        viewport
            .visible_tiles()
            .into_iter()
            .map(|coord| Ok((coord, self.tile(layer, coord)?)))
            .collect()
    }

    pub fn cache(&self, layer: TileLayer) -> &TileCache<SharedTile> {
        match layer.kind() {
            Some(kind) => self.geometry_cache(kind),
            None => &self.basemap,
        }
    }

    // ===== Hit Testing, Frame Polling, Stats =====

    /// Objects painted within `tolerance_px` of `(lat, lon)` at `zoom`,
    /// nearest first.
    pub fn pick(&self, lat: f64, lon: f64, zoom: u8, tolerance_px: f64) -> Vec<PickHit> {
        hit::pick(
            &self.index,
            self.renderer.resolver().as_ref(),
            self.renderer.default_style(),
            lat,
            lon,
            zoom,
            tolerance_px,
        )
    }

    /// Return and clear the redraw flag. Call once per frame.
    pub fn take_redraw(&self) -> bool {
        self.signal.take()
    }

    /// Block until something new is available or `timeout` passes.
    pub fn wait_for_redraw(&self, timeout: Duration) -> bool {
        self.signal.wait_timeout(timeout)
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            points: self.points.stats(),
            lines: self.lines.stats(),
            polygons: self.polygons.stats(),
            basemap: self.basemap.stats(),
            feature_count: self.index.len(),
            index_depth: self.index.depth(),
            fetch: self.fetcher.as_ref().map(|f| f.stats()),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Stop the download workers. Further mutations and tile requests fail
    /// with [`GeoTilesError::EngineClosed`]. Idempotent.
    pub fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(fetcher) = &self.fetcher {
            fetcher.stop();
        }
        info!("tile engine shut down");
    }
}

impl Drop for TileEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn check_finite(coord: Coord<f64>) -> Result<()> {
    if coord.x.is_finite() && coord.y.is_finite() {
        Ok(())
    } else {
        Err(GeoTilesError::InvalidInput(format!(
            "non-finite coordinate ({}, {})",
            coord.x, coord.y
        )))
    }
}

fn validate_geometry(geometry: &Geometry) -> Result<()> {
    geometry.vertices().try_for_each(check_finite)
}
