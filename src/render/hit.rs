//! Hit testing against rendered geometry.
//!
//! Distances are measured in pixels at the requested zoom, so the result
//! matches what the user sees on screen.

use super::StyleResolver;
use crate::feature::FeatureHandle;
use crate::index::SpatialIndex;
use crate::projection::{lat_lon_to_pixel, pixel_to_lat_lon};
use crate::{Bounds, Geometry};
use geo::{Contains, Coord, LineString, Point, Polygon};

/// One object under the cursor.
#[derive(Debug, Clone)]
pub struct PickHit {
    pub feature: FeatureHandle,
    /// Pixel distance from the query to the painted edge; 0 when inside.
    pub distance_px: f64,
}

/// Objects within `tolerance_px` of `(lat, lon)` at `zoom`, nearest first.
pub(crate) fn pick(
    index: &SpatialIndex<FeatureHandle>,
    resolver: &dyn StyleResolver,
    default_style: bool,
    lat: f64,
    lon: f64,
    zoom: u8,
    tolerance_px: f64,
) -> Vec<PickHit> {
    let query = lat_lon_to_pixel(lat, lon, zoom);
    let query = Coord {
        x: query.x,
        y: query.y,
    };
    let reach = tolerance_px.max(0.0) + resolver.margin_px() as f64;

    let (max_lat, min_lon) = pixel_to_lat_lon(query.x - reach, query.y - reach, zoom);
    let (min_lat, max_lon) = pixel_to_lat_lon(query.x + reach, query.y + reach, zoom);
    let search = Bounds::new(min_lon, min_lat, max_lon, max_lat);

    let mut hits: Vec<PickHit> = index
        .search(&search)
        .into_iter()
        .filter_map(|feature| {
            let distance = {
                let geometry = feature.geometry();
                let style = resolver.resolve(&geometry, default_style);
                let reach = style.radius as f64 + style.width.max(0.0) as f64 / 2.0;
                (distance_px(&geometry, query, zoom) - reach).max(0.0)
            };
            (distance <= tolerance_px).then_some(PickHit {
                feature,
                distance_px: distance,
            })
        })
        .collect();

    hits.sort_by(|a, b| {
        a.distance_px
            .total_cmp(&b.distance_px)
            .then_with(|| a.feature.id().cmp(&b.feature.id()))
    });
    hits
}

/// Distance from `query` to the geometry's centerline in global pixels.
fn distance_px(geometry: &Geometry, query: Coord<f64>, zoom: u8) -> f64 {
    let project = |c: Coord<f64>| {
        let px = lat_lon_to_pixel(c.y, c.x, zoom);
        Coord { x: px.x, y: px.y }
    };

    match geometry {
        Geometry::Point(p) => {
            let at = project(Coord { x: p.lon, y: p.lat });
            (at.x - query.x).hypot(at.y - query.y)
        }
        Geometry::LineString(l) => {
            let pixels: Vec<Coord<f64>> = l.line.0.iter().map(|&c| project(c)).collect();
            polyline_distance(&pixels, query, false)
        }
        Geometry::Polygon(p) => {
            let pixels: Vec<Coord<f64>> = p.ring.0.iter().map(|&c| project(c)).collect();
            if pixels.len() >= 3 {
                let polygon = Polygon::new(LineString::from(pixels.clone()), vec![]);
                if polygon.contains(&Point::from(query)) {
                    return 0.0;
                }
            }
            polyline_distance(&pixels, query, true)
        }
    }
}

fn polyline_distance(points: &[Coord<f64>], query: Coord<f64>, closed: bool) -> f64 {
    match points {
        [] => f64::INFINITY,
        [only] => (only.x - query.x).hypot(only.y - query.y),
        _ => {
            let open = points
                .windows(2)
                .map(|w| segment_distance(w[0], w[1], query));
            let closing = closed
                .then(|| segment_distance(points[points.len() - 1], points[0], query));
            open.chain(closing).fold(f64::INFINITY, f64::min)
        }
    }
}

fn segment_distance(a: Coord<f64>, b: Coord<f64>, p: Coord<f64>) -> f64 {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let len_sq = dx * dx + dy * dy;
    let t = if len_sq == 0.0 {
        0.0
    } else {
        (((p.x - a.x) * dx + (p.y - a.y) * dy) / len_sq).clamp(0.0, 1.0)
    };
    let cx = a.x + t * dx;
    let cy = a.y + t * dy;
    (p.x - cx).hypot(p.y - cy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::FeatureId;
    use crate::render::DefaultStyleResolver;

    fn index_of(geometries: Vec<Geometry>) -> SpatialIndex<FeatureHandle> {
        let index = SpatialIndex::new();
        for (i, geometry) in geometries.into_iter().enumerate() {
            let handle = FeatureHandle::new(FeatureId(i as u64), geometry);
            index.insert(handle.clone(), handle.bounds());
        }
        index
    }

    #[test]
    fn test_segment_distance() {
        let a = Coord { x: 0.0, y: 0.0 };
        let b = Coord { x: 10.0, y: 0.0 };
        assert_eq!(segment_distance(a, b, Coord { x: 5.0, y: 3.0 }), 3.0);
        assert_eq!(segment_distance(a, b, Coord { x: 13.0, y: 4.0 }), 5.0);
        assert_eq!(segment_distance(a, a, Coord { x: 3.0, y: 4.0 }), 5.0);
    }

    #[test]
    fn test_pick_nearest_first() {
        let index = index_of(vec![
            Geometry::point(45.0, -122.0),
            Geometry::point(45.0, -121.9999),
        ]);
        let resolver = DefaultStyleResolver::default();
        let hits = pick(&index, &resolver, false, 45.0, -121.9999, 18, 20.0);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].feature.id(), FeatureId(1));
        assert_eq!(hits[0].distance_px, 0.0);
    }

    #[test]
    fn test_pick_inside_polygon() {
        let index = index_of(vec![Geometry::polygon(vec![
            (-1.0, -1.0),
            (1.0, -1.0),
            (1.0, 1.0),
            (-1.0, 1.0),
        ])]);
        let resolver = DefaultStyleResolver::default();
        let hits = pick(&index, &resolver, false, 0.0, 0.0, 6, 0.0);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].distance_px, 0.0);
    }

    #[test]
    fn test_pick_misses_far_line() {
        let index = index_of(vec![Geometry::line_string(vec![(10.0, 10.0), (11.0, 11.0)])]);
        let resolver = DefaultStyleResolver::default();
        assert!(pick(&index, &resolver, false, 0.0, 0.0, 8, 5.0).is_empty());
        assert_eq!(pick(&index, &resolver, false, 10.5, 10.5, 8, 5.0).len(), 1);
    }
}
