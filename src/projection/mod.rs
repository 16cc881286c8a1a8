//! Web Mercator projection for 256px slippy-map tiles.
//!
//! Stateless conversions between geographic coordinates (degrees),
//! global pixel coordinates at a zoom level, and tile addresses. Latitudes
//! beyond the Mercator limit are clamped rather than rejected so that
//! invalidation of polar geometry still resolves to edge tiles.

mod types;

pub use types::{
    MAX_LAT, MAX_LON, MAX_ZOOM, MIN_LAT, MIN_LON, PixelCoord, TILE_SIZE, TileCoord, TileRange,
    grid_size,
};

use crate::Bounds;
use std::f64::consts::PI;

/// Edge length of the whole world in pixels at `zoom`.
#[inline]
pub fn map_size(zoom: u8) -> f64 {
    TILE_SIZE as f64 * grid_size(zoom) as f64
}

/// Project a geographic position to global pixel space.
///
/// # Examples
///
/// ```
/// use geotiles::projection::{lat_lon_to_pixel, pixel_to_lat_lon};
///
/// let px = lat_lon_to_pixel(45.0, -122.0, 10);
/// let (lat, lon) = pixel_to_lat_lon(px.x, px.y, 10);
/// assert!((lat - 45.0).abs() < 1e-6);
/// assert!((lon + 122.0).abs() < 1e-6);
/// ```
#[inline]
pub fn lat_lon_to_pixel(lat: f64, lon: f64, zoom: u8) -> PixelCoord {
    let size = map_size(zoom);
    let lat_rad = lat.clamp(MIN_LAT, MAX_LAT).to_radians();

    let x = (lon + 180.0) / 360.0 * size;
    let y = (1.0 - lat_rad.tan().asinh() / PI) / 2.0 * size;

    PixelCoord { x, y }
}

/// Inverse of [`lat_lon_to_pixel`]. Returns `(lat, lon)`.
#[inline]
pub fn pixel_to_lat_lon(x: f64, y: f64, zoom: u8) -> (f64, f64) {
    let size = map_size(zoom);

    let lon = x / size * 360.0 - 180.0;
    let lat = (PI * (1.0 - 2.0 * y / size)).sinh().atan().to_degrees();

    (lat, lon)
}

/// Tile containing a geographic position, clamped to the grid.
pub fn lat_lon_to_tile(lat: f64, lon: f64, zoom: u8) -> TileCoord {
    let px = lat_lon_to_pixel(lat, lon, zoom);
    TileCoord::new(zoom, pixel_to_tile_index(px.x, zoom), pixel_to_tile_index(px.y, zoom))
}

/// Geographic bounds of a tile's pixel rectangle, grown by `pad_px` pixels
/// on every side.
pub fn tile_bounds(tile: &TileCoord, pad_px: f64) -> Bounds {
    let min_px_x = tile.x as f64 * TILE_SIZE as f64 - pad_px;
    let min_px_y = tile.y as f64 * TILE_SIZE as f64 - pad_px;
    let max_px_x = (tile.x + 1) as f64 * TILE_SIZE as f64 + pad_px;
    let max_px_y = (tile.y + 1) as f64 * TILE_SIZE as f64 + pad_px;

    // Pixel y grows southward, so the top pixel edge is the max latitude.
    let (max_lat, min_lon) = pixel_to_lat_lon(min_px_x, min_px_y, tile.zoom);
    let (min_lat, max_lon) = pixel_to_lat_lon(max_px_x, max_px_y, tile.zoom);

    Bounds::new(min_lon, min_lat, max_lon, max_lat)
}

/// Tiles at `zoom` whose rectangles overlap `bounds` grown by `pad_px`
/// pixels. Returns `None` for empty bounds.
pub fn tile_range(bounds: &Bounds, zoom: u8, pad_px: f64) -> Option<TileRange> {
    if bounds.is_empty() {
        return None;
    }

    let top_left = lat_lon_to_pixel(bounds.max_y, bounds.min_x, zoom);
    let bottom_right = lat_lon_to_pixel(bounds.min_y, bounds.max_x, zoom);

    Some(TileRange {
        zoom,
        min_x: pixel_to_tile_index(top_left.x - pad_px, zoom),
        min_y: pixel_to_tile_index(top_left.y - pad_px, zoom),
        max_x: pixel_to_tile_index(bottom_right.x + pad_px, zoom),
        max_y: pixel_to_tile_index(bottom_right.y + pad_px, zoom),
    })
}

/// Degrees of longitude spanned by `pixels` at `zoom`.
pub fn pixels_to_degrees(pixels: f64, zoom: u8) -> f64 {
    pixels * 360.0 / map_size(zoom)
}

#[inline]
fn pixel_to_tile_index(px: f64, zoom: u8) -> u32 {
    let max = grid_size(zoom) - 1;
    let index = (px / TILE_SIZE as f64).floor();
    if index <= 0.0 {
        0
    } else if index >= max as f64 {
        max
    } else {
        index as u32
    }
}

/// Screen-space window onto the map, used by the frame loop to decide which
/// tiles to request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub center_lat: f64,
    pub center_lon: f64,
    pub zoom: u8,
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(center_lat: f64, center_lon: f64, zoom: u8, width: u32, height: u32) -> Self {
        Self {
            center_lat,
            center_lon,
            zoom: zoom.min(MAX_ZOOM),
            width,
            height,
        }
    }

    /// Global pixel of the viewport's top-left corner.
    pub fn origin(&self) -> PixelCoord {
        let center = lat_lon_to_pixel(self.center_lat, self.center_lon, self.zoom);
        PixelCoord {
            x: center.x - self.width as f64 / 2.0,
            y: center.y - self.height as f64 / 2.0,
        }
    }

    /// Geographic area covered by the viewport (not wrapped).
    pub fn bounds(&self) -> Bounds {
        let origin = self.origin();
        let (max_lat, min_lon) = pixel_to_lat_lon(origin.x, origin.y, self.zoom);
        let (min_lat, max_lon) = pixel_to_lat_lon(
            origin.x + self.width as f64,
            origin.y + self.height as f64,
            self.zoom,
        );
        Bounds::new(
            min_lon,
            min_lat.max(MIN_LAT),
            max_lon,
            max_lat.min(MAX_LAT),
        )
    }

    /// Every tile touching the viewport, in row-major screen order.
    ///
    /// Columns wrap across the antimeridian; rows outside the grid are
    /// skipped.
    pub fn visible_tiles(&self) -> Vec<TileCoord> {
        let origin = self.origin();
        let tile = TILE_SIZE as f64;
        let grid = grid_size(self.zoom) as i64;

        let first_col = (origin.x / tile).floor() as i64;
        let last_col = ((origin.x + self.width as f64 - 1.0) / tile).floor() as i64;
        let first_row = (origin.y / tile).floor() as i64;
        let last_row = ((origin.y + self.height as f64 - 1.0) / tile).floor() as i64;

        let mut tiles = Vec::new();
        for row in first_row.max(0)..=last_row.min(grid - 1) {
            let mut seen_cols = 0;
            for col in first_col..=last_col {
                // At low zoom the viewport can be wider than the world.
                if seen_cols >= grid {
                    break;
                }
                seen_cols += 1;
                let wrapped = col.rem_euclid(grid) as u32;
                tiles.push(TileCoord::new(self.zoom, wrapped, row as u32));
            }
        }
        tiles
    }
}
