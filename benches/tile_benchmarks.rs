use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use geo::Coord;
use geotiles::cache::TileCache;
use geotiles::synthetic::{random_lines, random_points, random_polygons};
use geotiles::{Bounds, Config, SpatialIndex, TileCoord, TileEngine, TileLayer, lat_lon_to_tile};

const AREA: Bounds = Bounds::new(-10.0, -10.0, 10.0, 10.0);

fn offline_engine() -> TileEngine {
    TileEngine::builder()
        .config(Config::default().offline())
        .build()
        .unwrap()
}

fn benchmark_index_operations(c: &mut Criterion) {
    let mut group = c.benchmark_group("index_operations");

    let points = random_points(100_000, AREA, 1, 4).unwrap();
    let bounds: Vec<Bounds> = points.iter().map(|p| p.bounds()).collect();

    for size in [1_000usize, 10_000, 100_000] {
        group.bench_with_input(BenchmarkId::new("bulk_insert", size), &size, |b, &size| {
            b.iter(|| {
                let index = SpatialIndex::new();
                for (i, bounds) in bounds.iter().take(size).enumerate() {
                    index.insert(i, *bounds);
                }
                black_box(index.len())
            })
        });
    }

    let index = SpatialIndex::new();
    for (i, bounds) in bounds.iter().enumerate() {
        index.insert(i, *bounds);
    }
    let query = Bounds::new(-0.5, -0.5, 0.5, 0.5);
    group.bench_function("search_small_window", |b| {
        b.iter(|| black_box(index.search(black_box(&query))).len())
    });

    group.bench_function("move_one", |b| {
        let mut counter = 0usize;
        b.iter(|| {
            let i = counter % bounds.len();
            counter += 1;
            let mut tree = index.write();
            tree.remove(&i, &bounds[i]);
            tree.insert(i, bounds[i]);
        })
    });

    group.finish();
}

fn benchmark_cache_operations(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache_operations");

    let cache: TileCache<Vec<u8>> = TileCache::new("bench", 1024);
    for x in 0..1024 {
        cache.set(TileCoord::new(12, x, 0), vec![0; 16]);
    }

    group.bench_function("get_hit", |b| {
        let mut counter = 0u32;
        b.iter(|| {
            counter = (counter + 1) % 1024;
            black_box(cache.get(&TileCoord::new(12, counter, 0)))
        })
    });

    group.bench_function("set_with_eviction", |b| {
        let mut counter = 0u32;
        b.iter(|| {
            counter += 1;
            cache.set(TileCoord::new(13, counter % 4096, counter / 4096), vec![0; 16]);
        })
    });

    group.finish();
}

fn benchmark_tile_rendering(c: &mut Criterion) {
    let mut group = c.benchmark_group("tile_rendering");

    let engine = offline_engine();
    let mut geometries = random_points(20_000, AREA, 2, 4).unwrap();
    geometries.extend(random_lines(5_000, AREA, 3, 4).unwrap());
    geometries.extend(random_polygons(5_000, AREA, 4, 4).unwrap());
    engine.replace_all(geometries).unwrap();

    for (layer, name) in [
        (TileLayer::Points, "points"),
        (TileLayer::Lines, "lines"),
        (TileLayer::Polygons, "polygons"),
    ] {
        for zoom in [6u8, 10] {
            let coord = lat_lon_to_tile(0.5, 0.5, zoom);
            group.bench_with_input(BenchmarkId::new(name, zoom), &coord, |b, coord| {
                b.iter(|| {
                    engine.cache(layer).clear();
                    black_box(engine.tile(layer, *coord).unwrap())
                })
            });
        }
    }

    group.finish();
}

fn benchmark_invalidation(c: &mut Criterion) {
    let mut group = c.benchmark_group("invalidation");

    let engine = offline_engine();
    let handles = engine
        .replace_all(random_lines(10_000, AREA, 5, 4).unwrap())
        .unwrap();
    let zoom = 9;
    let range = geotiles::tile_range(&AREA, zoom, 0.0).unwrap();
    for coord in range.iter() {
        engine.tile(TileLayer::Lines, coord).unwrap();
    }

    let origins: Vec<Coord<f64>> = handles
        .iter()
        .map(|h| h.geometry().vertex(0).unwrap())
        .collect();
    group.bench_function("move_vertex_with_warm_cache", |b| {
        let mut counter = 0usize;
        b.iter(|| {
            let i = counter % handles.len();
            let offset = (counter % 7) as f64 * 0.01;
            counter += 1;
            let at = Coord { x: origins[i].x + offset, y: origins[i].y };
            engine.move_vertex(handles[i].id(), 0, at).unwrap();
        })
    });

    group.bench_function("invalidate_region", |b| {
        let region = Bounds::new(-1.0, -1.0, 1.0, 1.0);
        b.iter(|| black_box(engine.invalidate_region(black_box(&region))))
    });

    group.finish();
}

criterion_group!(
    benches,
    benchmark_index_operations,
    benchmark_cache_operations,
    benchmark_tile_rendering,
    benchmark_invalidation
);

criterion_main!(benches);
