use geotiles::prelude::*;
use geotiles::synthetic::{random_lines, random_points, random_polygons};
use std::path::PathBuf;

fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    // Initialize logging (set RUST_LOG=debug to see cache and fetch logs)
    env_logger::init();

    println!("=== geotiles - Headless Frame Loop ===\n");

    // Basemap downloads only when GEOTILES_ONLINE is set, so the demo runs
    // anywhere.
    let mut config = Config::default().with_workers(2);
    if std::env::var_os("GEOTILES_ONLINE").is_none() {
        config = config.offline();
    }
    let engine = TileEngine::builder()
        .config(config)
        .disk_cache_dir(std::env::temp_dir().join(PathBuf::from("geotiles-demo")))
        .build()?;

    // === SYNTHETIC DATA ===
    println!("1. Loading synthetic data");
    let area = Bounds::new(-122.8, 45.4, -122.5, 45.6);
    let mut geometries = random_points(5_000, area, 1, 4)?;
    geometries.extend(random_lines(1_000, area, 2, 4)?);
    geometries.extend(random_polygons(500, area, 3, 4)?);
    let handles = engine.replace_all(geometries)?;
    println!("   Indexed {} objects\n", handles.len());

    // === FIRST FRAME ===
    println!("2. Rendering a 1024x768 viewport at zoom 13");
    let viewport = Viewport::new(45.5, -122.65, 13, 1024, 768);
    for layer in [TileLayer::Basemap, TileLayer::Polygons, TileLayer::Lines, TileLayer::Points] {
        let tiles = engine.viewport_tiles(&viewport, layer)?;
        let ready = tiles.iter().filter(|(_, tile)| tile.is_some()).count();
        println!("   {:>8}: {}/{} tiles ready", layer.as_str(), ready, tiles.len());
    }
    println!();

    // === EDITING ===
    println!("3. Picking and editing");
    let hits = engine.pick(45.5, -122.65, 13, 6.0);
    match hits.first() {
        Some(hit) => {
            let id = hit.feature.id();
            println!("   Picked {} ({:.1}px away)", id, hit.distance_px);
            engine.set_selected(id, true)?;
            if hit.feature.kind() != GeometryKind::Point {
                engine.delete_vertex(id, 0).ok();
            }
        }
        None => println!("   Nothing under the cursor"),
    }
    let line = engine.add_feature(Geometry::line_string(vec![(-122.70, 45.48), (-122.60, 45.52)]))?;
    engine.move_vertex(line.id(), 1, Coord { x: -122.55, y: 45.55 })?;
    println!("   Redraw needed: {}\n", engine.take_redraw());

    // === SECOND FRAME ===
    println!("4. Second frame after edits");
    for layer in TileLayer::GEOMETRY {
        engine.viewport_tiles(&viewport, layer)?;
    }
    if engine.provider().is_some() {
        engine.wait_for_redraw(Duration::from_secs(2));
        engine.viewport_tiles(&viewport, TileLayer::Basemap)?;
    }

    let stats = engine.stats();
    println!("   {} tiles resident, ~{} KiB", stats.total_tiles(), stats.total_bytes() / 1024);
    for cache in [&stats.points, &stats.lines, &stats.polygons, &stats.basemap] {
        println!(
            "   {:>8}: {} hits, {} misses, {} invalidated",
            cache.name, cache.hits, cache.misses, cache.invalidations
        );
    }
    println!("\n{}", serde_json::to_string_pretty(&stats)?);

    engine.shutdown();
    Ok(())
}
