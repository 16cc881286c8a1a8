//! Rasterization of indexed geometry into 256px tiles.
//!
//! A geometry tile is always drawn from scratch: the renderer projects the
//! tile's pixel rectangle back to degrees, grows it by the style margin so
//! strokes and markers that straddle the edge are included, asks the index
//! for everything in that box and paints the objects of the layer's kind.

pub(crate) mod hit;
pub mod style;

pub use hit::PickHit;
pub use style::{DefaultStyleResolver, Style, StyleResolver};

use crate::error::Result;
use crate::feature::FeatureHandle;
use crate::index::SpatialIndex;
use crate::projection::{TILE_SIZE, TileCoord, lat_lon_to_pixel, tile_bounds};
use crate::tile::{Tile, blank_pixmap};
use crate::{Geometry, GeometryKind, Rgba};
use geo::Coord;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tiny_skia::{
    FillRule, LineCap, LineJoin, Paint, Path, PathBuilder, Pixmap, Stroke, Transform,
};

/// Extra pixels added to the style margin for the anti-aliasing fringe.
const AA_FRINGE_PX: f32 = 1.0;

pub struct GeometryTileRenderer {
    resolver: Arc<dyn StyleResolver>,
    anti_alias: bool,
    default_style: AtomicBool,
}

impl GeometryTileRenderer {
    pub fn new(resolver: Arc<dyn StyleResolver>, anti_alias: bool) -> Self {
        Self {
            resolver,
            anti_alias,
            default_style: AtomicBool::new(false),
        }
    }

    pub fn resolver(&self) -> &Arc<dyn StyleResolver> {
        &self.resolver
    }

    pub fn default_style(&self) -> bool {
        self.default_style.load(Ordering::Acquire)
    }

    /// Returns the previous flag value.
    pub(crate) fn set_default_style(&self, enabled: bool) -> bool {
        self.default_style.swap(enabled, Ordering::AcqRel)
    }

    /// Padding in pixels applied to tile queries and invalidation.
    pub fn margin_px(&self) -> f64 {
        (self.resolver.margin_px() + AA_FRINGE_PX) as f64
    }

    /// Render the `kind` layer of tile `coord` from the current index.
    pub fn render(
        &self,
        index: &SpatialIndex<FeatureHandle>,
        coord: TileCoord,
        kind: GeometryKind,
    ) -> Result<Tile> {
        let bounds = tile_bounds(&coord, self.margin_px());
        let mut features: Vec<FeatureHandle> = index
            .search(&bounds)
            .into_iter()
            .filter(|f| f.kind() == kind)
            .collect();
        // Selected objects paint last so the highlight sits on top.
        features.sort_by_key(|f| (f.is_selected(), f.id()));

        let mut pixmap = blank_pixmap()?;
        let origin = Coord {
            x: coord.x as f64 * TILE_SIZE as f64,
            y: coord.y as f64 * TILE_SIZE as f64,
        };
        let default_style = self.default_style();
        for feature in &features {
            let geometry = feature.geometry();
            let style = self.resolver.resolve(&geometry, default_style);
            self.draw(&mut pixmap, &geometry, &style, origin, coord.zoom);
        }

        Tile::new(coord, bounds, pixmap)
    }

    fn draw(&self, pixmap: &mut Pixmap, geometry: &Geometry, style: &Style, origin: Coord, zoom: u8) {
        let to_local = |c: Coord<f64>| {
            let px = lat_lon_to_pixel(c.y, c.x, zoom);
            ((px.x - origin.x) as f32, (px.y - origin.y) as f32)
        };

        match geometry {
            Geometry::Point(p) => {
                let (x, y) = to_local(Coord { x: p.lon, y: p.lat });
                let Some(path) = PathBuilder::from_circle(x, y, style.radius.max(0.5)) else {
                    return;
                };
                let fill = style.fill.unwrap_or(style.stroke);
                pixmap.fill_path(
                    &path,
                    &self.paint(fill),
                    FillRule::Winding,
                    Transform::identity(),
                    None,
                );
                self.stroke(pixmap, &path, style);
            }
            Geometry::LineString(l) => {
                if let Some(path) = build_path(l.line.0.iter().map(|&c| to_local(c)), false) {
                    self.stroke(pixmap, &path, style);
                }
            }
            Geometry::Polygon(p) => {
                let Some(path) = build_path(p.ring.0.iter().map(|&c| to_local(c)), true) else {
                    return;
                };
                if let Some(fill) = style.fill {
                    pixmap.fill_path(
                        &path,
                        &self.paint(fill),
                        FillRule::EvenOdd,
                        Transform::identity(),
                        None,
                    );
                }
                self.stroke(pixmap, &path, style);
            }
        }
    }

    fn stroke(&self, pixmap: &mut Pixmap, path: &Path, style: &Style) {
        if style.width <= 0.0 {
            return;
        }
        let stroke = Stroke {
            width: style.width,
            line_cap: LineCap::Round,
            line_join: LineJoin::Round,
            ..Default::default()
        };
        pixmap.stroke_path(
            path,
            &self.paint(style.stroke),
            &stroke,
            Transform::identity(),
            None,
        );
    }

    fn paint(&self, color: Rgba) -> Paint<'static> {
        let mut paint = Paint {
            anti_alias: self.anti_alias,
            ..Default::default()
        };
        paint.set_color_rgba8(color.r, color.g, color.b, color.a);
        paint
    }
}

/// Path through `points`; `None` when there are fewer than two.
fn build_path(mut points: impl Iterator<Item = (f32, f32)>, close: bool) -> Option<Path> {
    let (x, y) = points.next()?;
    let mut builder = PathBuilder::new();
    builder.move_to(x, y);
    let mut segments = 0;
    for (x, y) in points {
        builder.line_to(x, y);
        segments += 1;
    }
    if segments == 0 {
        return None;
    }
    if close {
        builder.close();
    }
    builder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::FeatureId;
    use crate::projection::lat_lon_to_tile;

    fn renderer() -> GeometryTileRenderer {
        GeometryTileRenderer::new(Arc::new(DefaultStyleResolver::default()), true)
    }

    fn indexed(geometries: Vec<Geometry>) -> SpatialIndex<FeatureHandle> {
        let index = SpatialIndex::new();
        for (i, geometry) in geometries.into_iter().enumerate() {
            let handle = FeatureHandle::new(FeatureId(i as u64), geometry);
            index.insert(handle.clone(), handle.bounds());
        }
        index
    }

    fn alpha_at(tile: &Tile, x: u32, y: u32) -> u8 {
        tile.image().pixel(x, y).map(|p| p.alpha()).unwrap_or(0)
    }

    #[test]
    fn test_point_lands_in_its_tile() {
        let index = indexed(vec![Geometry::point(45.0, -122.0)]);
        let coord = lat_lon_to_tile(45.0, -122.0, 12);
        let tile = renderer().render(&index, coord, GeometryKind::Point).unwrap();
        assert!(!tile.is_blank());

        let px = lat_lon_to_pixel(45.0, -122.0, 12);
        let local_x = (px.x - coord.x as f64 * 256.0) as u32;
        let local_y = (px.y - coord.y as f64 * 256.0) as u32;
        assert!(alpha_at(&tile, local_x, local_y) > 0);
    }

    #[test]
    fn test_layer_filters_by_kind() {
        let index = indexed(vec![Geometry::point(45.0, -122.0)]);
        let coord = lat_lon_to_tile(45.0, -122.0, 12);
        let tile = renderer().render(&index, coord, GeometryKind::LineString).unwrap();
        assert!(tile.is_blank());
    }

    #[test]
    fn test_marker_across_tile_edge_is_drawn_on_both_sides() {
        // Put the point exactly on the seam between two columns.
        let zoom = 10;
        let seam = crate::projection::pixel_to_lat_lon(300.0 * 256.0, 200.5 * 256.0, zoom);
        let index = indexed(vec![Geometry::point(seam.0, seam.1)]);
        let r = renderer();

        let left = r.render(&index, TileCoord::new(zoom, 299, 200), GeometryKind::Point).unwrap();
        let right = r.render(&index, TileCoord::new(zoom, 300, 200), GeometryKind::Point).unwrap();
        assert!(alpha_at(&left, 255, 128) > 0);
        assert!(alpha_at(&right, 0, 128) > 0);
    }

    #[test]
    fn test_line_and_polygon_render() {
        let index = indexed(vec![
            Geometry::line_string(vec![(-122.7, 45.5), (-122.6, 45.6)]),
            Geometry::polygon(vec![(-122.7, 45.5), (-122.6, 45.5), (-122.6, 45.6), (-122.7, 45.6)]),
        ]);
        let coord = lat_lon_to_tile(45.55, -122.65, 10);
        let r = renderer();
        assert!(!r.render(&index, coord, GeometryKind::LineString).unwrap().is_blank());
        assert!(!r.render(&index, coord, GeometryKind::Polygon).unwrap().is_blank());
        assert!(r.render(&index, TileCoord::new(10, 0, 0), GeometryKind::Polygon).unwrap().is_blank());
    }

    #[test]
    fn test_degenerate_line_is_skipped() {
        let index = indexed(vec![Geometry::line_string(vec![(-122.0, 45.0)])]);
        let coord = lat_lon_to_tile(45.0, -122.0, 8);
        assert!(renderer().render(&index, coord, GeometryKind::LineString).unwrap().is_blank());
    }

    #[test]
    fn test_default_style_flag() {
        let r = renderer();
        assert!(!r.set_default_style(true));
        assert!(r.default_style());
        assert!(r.margin_px() > 9.0);
    }
}
