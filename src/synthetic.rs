//! Deterministic synthetic datasets for demos, tests and benchmarks.
//!
//! Generation is split into fixed-size chunks, each with its own seeded
//! RNG, and the chunks are spread over a scoped worker pool. The output
//! depends only on `(count, area, seed)`, never on the worker count.

use crate::error::{GeoTilesError, Result};
use crate::{Bounds, Geometry};
use std::f64::consts::TAU;
use std::thread;

const CHUNK_SIZE: usize = 1024;

/// `count` points uniformly distributed over `area`.
pub fn random_points(count: usize, area: Bounds, seed: u64, workers: usize) -> Result<Vec<Geometry>> {
    generate(count, area, seed, workers, |rng, area| {
        let (lon, lat) = random_coord(rng, area);
        Geometry::point(lat, lon)
    })
}

/// `count` short random-walk polylines of 2 to 8 vertices inside `area`.
pub fn random_lines(count: usize, area: Bounds, seed: u64, workers: usize) -> Result<Vec<Geometry>> {
    generate(count, area, seed, workers, |rng, area| {
        let step = feature_span(area);
        let vertices = rng.usize(2..=8);
        let mut at = random_coord(rng, area);
        let mut line = Vec::with_capacity(vertices);
        line.push(at);
        for _ in 1..vertices {
            at = (
                (at.0 + (rng.f64() - 0.5) * step).clamp(area.min_x, area.max_x),
                (at.1 + (rng.f64() - 0.5) * step).clamp(area.min_y, area.max_y),
            );
            line.push(at);
        }
        Geometry::line_string(line)
    })
}

/// `count` star-shaped polygons of 3 to 8 vertices inside `area`.
pub fn random_polygons(count: usize, area: Bounds, seed: u64, workers: usize) -> Result<Vec<Geometry>> {
    generate(count, area, seed, workers, |rng, area| {
        let radius = feature_span(area) / 2.0;
        let vertices = rng.usize(3..=8);
        let (cx, cy) = random_coord(rng, area);
        let ring = (0..vertices)
            .map(|i| {
                let angle = TAU * i as f64 / vertices as f64;
                let r = radius * (0.5 + rng.f64() * 0.5);
                (
                    (cx + r * angle.cos()).clamp(area.min_x, area.max_x),
                    (cy + r * angle.sin()).clamp(area.min_y, area.max_y),
                )
            })
            .collect();
        Geometry::polygon(ring)
    })
}

fn random_coord(rng: &mut fastrand::Rng, area: &Bounds) -> (f64, f64) {
    (
        area.min_x + rng.f64() * area.width(),
        area.min_y + rng.f64() * area.height(),
    )
}

/// Typical extent of one generated line or polygon.
fn feature_span(area: &Bounds) -> f64 {
    area.width().min(area.height()) / 50.0
}

fn generate<F>(count: usize, area: Bounds, seed: u64, workers: usize, make: F) -> Result<Vec<Geometry>>
where
    F: Fn(&mut fastrand::Rng, &Bounds) -> Geometry + Sync,
{
    if area.is_empty() || !area.min_x.is_finite() || !area.max_x.is_finite() {
        return Err(GeoTilesError::InvalidInput(
            "synthetic data area must be a non-empty finite box".to_string(),
        ));
    }
    if workers == 0 {
        return Err(GeoTilesError::InvalidInput(
            "synthetic data needs at least one worker".to_string(),
        ));
    }

    let chunks = count.div_ceil(CHUNK_SIZE);
    let workers = workers.min(chunks.max(1));
    let make = &make;
    let area = &area;

    let per_worker: Vec<Vec<(usize, Vec<Geometry>)>> = thread::scope(|scope| {
        let handles: Vec<_> = (0..workers)
            .map(|worker| {
                scope.spawn(move || {
                    (worker..chunks)
                        .step_by(workers)
                        .map(|chunk| {
                            let mut rng = fastrand::Rng::with_seed(seed.wrapping_add(chunk as u64));
                            let len = CHUNK_SIZE.min(count - chunk * CHUNK_SIZE);
                            (chunk, (0..len).map(|_| make(&mut rng, area)).collect())
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|h| {
                h.join()
                    .map_err(|_| GeoTilesError::Other("synthetic data worker panicked".to_string()))
            })
            .collect::<Result<Vec<_>>>()
    })?;

    let mut ordered: Vec<(usize, Vec<Geometry>)> = per_worker.into_iter().flatten().collect();
    ordered.sort_unstable_by_key(|(chunk, _)| *chunk);
    Ok(ordered.into_iter().flat_map(|(_, items)| items).collect())
}
