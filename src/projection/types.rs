//! Tile addressing types.

use std::fmt;

/// Pixel edge length of every tile.
pub const TILE_SIZE: u32 = 256;

/// Web Mercator valid latitude range.
pub const MIN_LAT: f64 = -85.05112878;
pub const MAX_LAT: f64 = 85.05112878;

pub const MIN_LON: f64 = -180.0;
pub const MAX_LON: f64 = 180.0;

/// Deepest zoom level the slippy-map grid is addressed at.
pub const MAX_ZOOM: u8 = 24;

/// Address of a 256px tile in the slippy-map grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileCoord {
    pub zoom: u8,
    /// Column, 0 at the antimeridian going east.
    pub x: u32,
    /// Row, 0 at the north edge.
    pub y: u32,
}

impl TileCoord {
    pub const fn new(zoom: u8, x: u32, y: u32) -> Self {
        Self { zoom, x, y }
    }

    /// Number of tiles along one axis at this tile's zoom.
    pub fn grid_size(&self) -> u32 {
        grid_size(self.zoom)
    }

    pub fn is_valid(&self) -> bool {
        self.zoom <= MAX_ZOOM && self.x < self.grid_size() && self.y < self.grid_size()
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.x, self.y)
    }
}

/// Position in global pixel space at some zoom.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelCoord {
    pub x: f64,
    pub y: f64,
}

/// Inclusive rectangle of tiles at one zoom.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRange {
    pub zoom: u8,
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
}

impl TileRange {
    pub fn contains(&self, coord: &TileCoord) -> bool {
        coord.zoom == self.zoom
            && coord.x >= self.min_x
            && coord.x <= self.max_x
            && coord.y >= self.min_y
            && coord.y <= self.max_y
    }

    pub fn tile_count(&self) -> usize {
        (self.max_x - self.min_x + 1) as usize * (self.max_y - self.min_y + 1) as usize
    }

    /// Row-major iteration over every tile in the range.
    pub fn iter(&self) -> impl Iterator<Item = TileCoord> + '_ {
        (self.min_y..=self.max_y)
            .flat_map(move |y| (self.min_x..=self.max_x).map(move |x| TileCoord::new(self.zoom, x, y)))
    }
}

/// Number of tiles along one axis at `zoom`.
#[inline]
pub fn grid_size(zoom: u8) -> u32 {
    1u32 << zoom.min(MAX_ZOOM)
}
