use geo::Coord;
use geotiles::cache::TileCache;
use geotiles::synthetic::{random_lines, random_points, random_polygons};
use geotiles::{
    Bounds, Config, GeoTilesError, Geometry, GeometryKind, LineGeometry, Rgba, TileCoord,
    TileEngine, TileLayer, Viewport, lat_lon_to_tile,
};
use std::sync::Arc;
use std::thread;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn offline_engine() -> TileEngine {
    init_logging();
    TileEngine::builder()
        .config(Config::default().offline())
        .build()
        .unwrap()
}

#[test]
fn test_vertex_edit_makes_next_request_a_miss() {
    let engine = offline_engine();
    let polygon = engine
        .add_feature(Geometry::polygon(vec![
            (-122.70, 45.50),
            (-122.60, 45.50),
            (-122.60, 45.56),
            (-122.70, 45.56),
        ]))
        .unwrap();

    // Cache the polygon's tiles at two zooms plus one far away tile.
    let low = lat_lon_to_tile(45.53, -122.65, 8);
    let high = lat_lon_to_tile(45.56, -122.60, 13);
    let far = lat_lon_to_tile(-33.9, 151.2, 13);
    for coord in [low, high, far] {
        engine.tile(TileLayer::Polygons, coord).unwrap();
    }
    let misses = engine.cache(TileLayer::Polygons).stats().misses;

    engine
        .move_vertex(polygon.id(), 2, Coord { x: -122.55, y: 45.60 })
        .unwrap();

    let cache = engine.cache(TileLayer::Polygons);
    assert!(!cache.contains(&low));
    assert!(!cache.contains(&high));
    assert!(cache.contains(&far));

    let redrawn = engine.tile(TileLayer::Polygons, high).unwrap().unwrap();
    assert!(!redrawn.is_blank());
    assert_eq!(cache.stats().misses, misses + 1);
    assert_eq!(
        polygon.geometry().vertex(2),
        Some(Coord { x: -122.55, y: 45.60 })
    );
}

#[test]
fn test_removed_feature_disappears_from_tiles() {
    let engine = offline_engine();
    let line = engine
        .add_feature(Geometry::line_string(vec![(2.30, 48.85), (2.40, 48.87)]))
        .unwrap();
    let coord = lat_lon_to_tile(48.86, 2.35, 11);
    assert!(!engine.tile(TileLayer::Lines, coord).unwrap().unwrap().is_blank());

    engine.remove_feature(line.id()).unwrap();
    assert!(!engine.cache(TileLayer::Lines).contains(&coord));
    assert!(engine.tile(TileLayer::Lines, coord).unwrap().unwrap().is_blank());
}

#[test]
fn test_selection_changes_pixels() {
    let engine = offline_engine();
    let point = engine.add_feature(Geometry::point(51.5, -0.12)).unwrap();
    let coord = lat_lon_to_tile(51.5, -0.12, 10);

    let before = engine.tile(TileLayer::Points, coord).unwrap().unwrap();
    assert!(!engine.set_selected(point.id(), true).unwrap());
    let after = engine.tile(TileLayer::Points, coord).unwrap().unwrap();

    assert!(!Arc::ptr_eq(&before, &after));
    assert_ne!(before.pixels(), after.pixels());

    // Re-selecting is a no-op and keeps the cached tile.
    assert!(engine.set_selected(point.id(), true).unwrap());
    assert!(engine.cache(TileLayer::Points).contains(&coord));
}

#[test]
fn test_default_style_ignores_line_overrides() {
    let engine = offline_engine();
    let mut geometry = Geometry::line_string(vec![(10.0, 50.0), (10.2, 50.1)]);
    if let Geometry::LineString(LineGeometry {
        color_override,
        width_override,
        ..
    }) = &mut geometry
    {
        *color_override = Some(Rgba::opaque(255, 0, 0));
        *width_override = Some(8.0);
    }
    engine.add_feature(geometry).unwrap();
    let coord = lat_lon_to_tile(50.05, 10.1, 10);

    let styled = engine.tile(TileLayer::Lines, coord).unwrap().unwrap();
    engine.set_default_style(true);
    assert!(engine.cache(TileLayer::Lines).is_empty());
    let plain = engine.tile(TileLayer::Lines, coord).unwrap().unwrap();
    assert_ne!(styled.pixels(), plain.pixels());

    // Setting the same flag again keeps the caches.
    engine.set_default_style(true);
    assert!(engine.cache(TileLayer::Lines).contains(&coord));
}

#[test]
fn test_viewport_tiles() {
    let engine = offline_engine();
    engine
        .replace_all(random_points(500, Bounds::new(-122.8, 45.4, -122.5, 45.6), 3, 2).unwrap())
        .unwrap();

    let viewport = Viewport::new(45.5, -122.65, 12, 800, 600);
    let tiles = engine.viewport_tiles(&viewport, TileLayer::Points).unwrap();
    assert_eq!(tiles.len(), viewport.visible_tiles().len());
    assert!(tiles.iter().all(|(_, tile)| tile.is_some()));
    assert!(tiles.iter().any(|(_, tile)| !tile.as_ref().unwrap().is_blank()));
    assert_eq!(engine.zoom(), 12);

    // Without a fetcher every basemap tile stays a miss.
    let basemap = engine.viewport_tiles(&viewport, TileLayer::Basemap).unwrap();
    assert!(basemap.iter().all(|(_, tile)| tile.is_none()));
}

#[test]
fn test_pick_through_engine() {
    let engine = offline_engine();
    let point = engine.add_feature(Geometry::point(40.0, -100.0)).unwrap();
    let polygon = engine
        .add_feature(Geometry::polygon(vec![
            (-101.0, 39.0),
            (-99.0, 39.0),
            (-99.0, 41.0),
            (-101.0, 41.0),
        ]))
        .unwrap();

    let hits = engine.pick(40.0, -100.0, 10, 4.0);
    let ids: Vec<_> = hits.iter().map(|h| h.feature.id()).collect();
    assert!(ids.contains(&point.id()));
    assert!(ids.contains(&polygon.id()));

    let hits = engine.pick(39.5, -100.5, 10, 4.0);
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].feature, polygon);
    assert_eq!(hits[0].distance_px, 0.0);

    assert!(engine.pick(0.0, 0.0, 10, 4.0).is_empty());
}

#[test]
fn test_synthetic_dataset_search_matches_scan() {
    let engine = offline_engine();
    let area = Bounds::new(-20.0, -20.0, 20.0, 20.0);
    let mut geometries = random_points(8000, area, 11, 4).unwrap();
    geometries.extend(random_lines(3000, area, 12, 4).unwrap());
    geometries.extend(random_polygons(3000, area, 13, 4).unwrap());

    let handles = engine.replace_all(geometries).unwrap();
    assert_eq!(engine.feature_count(), 14_000);
    assert!(engine.stats().index_depth >= 3);

    let query = Bounds::new(-3.0, -2.0, 4.0, 5.0);
    let mut found: Vec<_> = engine.search(&query).iter().map(|f| f.id()).collect();
    found.sort();
    let expected: Vec<_> = handles
        .iter()
        .filter(|h| h.bounds().intersects(&query))
        .map(|h| h.id())
        .collect();
    assert_eq!(found, expected);

    let kinds = engine.search(&area).iter().filter(|f| f.kind() == GeometryKind::Polygon).count();
    assert_eq!(kinds, 3000);
}

#[test]
fn test_concurrent_edits_and_renders() {
    let engine = Arc::new(offline_engine());
    let area = Bounds::new(0.0, 0.0, 1.0, 1.0);
    let handles = engine.replace_all(random_lines(200, area, 5, 2).unwrap()).unwrap();
    let tiles: Vec<TileCoord> = geotiles::tile_range(&area, 9, 0.0).unwrap().iter().collect();

    thread::scope(|scope| {
        let editor = Arc::clone(&engine);
        let handles = &handles;
        scope.spawn(move || {
            for (i, handle) in handles.iter().enumerate() {
                let to = Coord { x: (i % 100) as f64 / 100.0, y: 0.5 };
                editor.move_vertex(handle.id(), 0, to).unwrap();
            }
        });
        for _ in 0..3 {
            let reader = Arc::clone(&engine);
            let tiles = &tiles;
            scope.spawn(move || {
                for _ in 0..5 {
                    for coord in tiles {
                        assert!(reader.tile(TileLayer::Lines, *coord).unwrap().is_some());
                    }
                }
            });
        }
    });

    for handle in &handles {
        assert_eq!(engine.search(&handle.bounds()).iter().filter(|f| *f == handle).count(), 1);
    }

    // Whatever survived in the cache must match the final geometry.
    let cache = engine.cache(TileLayer::Lines);
    let cached: Vec<_> = tiles.iter().filter_map(|c| cache.peek(c).map(|t| (*c, t))).collect();
    cache.clear();
    for (coord, tile) in cached {
        let fresh = engine.tile(TileLayer::Lines, coord).unwrap().unwrap();
        assert_eq!(tile.pixels(), fresh.pixels(), "tile {} is stale", coord);
    }
}

#[test]
fn test_edits_racing_removal_leave_no_ghosts() {
    let engine = Arc::new(offline_engine());
    for round in 0..50 {
        let coords: Vec<(f64, f64)> = (0..40).map(|i| (i as f64 * 0.01, round as f64 * 0.01)).collect();
        let line = engine.add_feature(Geometry::line_string(coords)).unwrap();
        let id = line.id();

        thread::scope(|scope| {
            let editor = Arc::clone(&engine);
            scope.spawn(move || {
                for i in 0..40 {
                    let to = Coord { x: 5.0 + i as f64 * 0.01, y: 5.0 };
                    if editor.move_vertex(id, i, to).is_err() {
                        break;
                    }
                }
            });
            let remover = Arc::clone(&engine);
            scope.spawn(move || {
                remover.remove_feature(id).unwrap();
            });
        });

        assert!(engine.search(&Bounds::new(-1.0, -1.0, 10.0, 10.0)).iter().all(|f| f.id() != id));
        assert_eq!(engine.stats().feature_count, engine.feature_count());
    }
    assert_eq!(engine.feature_count(), 0);
}

#[test]
fn test_cache_eviction_order() {
    let cache: TileCache<Vec<u8>> = TileCache::new("scenario", 2);
    let a = TileCoord::new(3, 1, 1);
    let b = TileCoord::new(3, 2, 1);
    let c = TileCoord::new(3, 3, 1);

    cache.set(a, vec![1]);
    cache.set(b, vec![2]);
    assert_eq!(cache.get(&a), Some(vec![1]));
    cache.set(c, vec![3]);

    assert!(!cache.contains(&b));
    assert_eq!(cache.recency_order(), vec![c, a]);
    let stats = cache.stats();
    assert_eq!(stats.evictions, 1);
    assert_eq!(stats.resident_tiles, 2);
}

#[test]
fn test_shutdown_rejects_further_work() {
    let engine = offline_engine();
    let point = engine.add_feature(Geometry::point(1.0, 1.0)).unwrap();
    engine.shutdown();
    engine.shutdown();

    assert!(engine.is_closed());
    assert!(matches!(
        engine.add_feature(Geometry::point(2.0, 2.0)),
        Err(GeoTilesError::EngineClosed)
    ));
    assert!(matches!(
        engine.tile(TileLayer::Points, TileCoord::new(0, 0, 0)),
        Err(GeoTilesError::EngineClosed)
    ));
    assert!(engine.remove_feature(point.id()).is_err());
}
