//! Rendered tile images and the layers they belong to.

use crate::error::{GeoTilesError, Result};
use crate::projection::{TILE_SIZE, TileCoord, tile_bounds};
use crate::{Bounds, GeometryKind};
use std::sync::Arc;
use tiny_skia::Pixmap;

/// One of the four tile caches an engine keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TileLayer {
    Points,
    Lines,
    Polygons,
    Basemap,
}

impl TileLayer {
    pub const GEOMETRY: [TileLayer; 3] = [TileLayer::Points, TileLayer::Lines, TileLayer::Polygons];

    /// Layer a geometry of `kind` is rasterized into.
    pub fn for_kind(kind: GeometryKind) -> Self {
        match kind {
            GeometryKind::Point => TileLayer::Points,
            GeometryKind::LineString => TileLayer::Lines,
            GeometryKind::Polygon => TileLayer::Polygons,
        }
    }

    /// Geometry kind drawn on this layer; `None` for the basemap.
    pub fn kind(&self) -> Option<GeometryKind> {
        match self {
            TileLayer::Points => Some(GeometryKind::Point),
            TileLayer::Lines => Some(GeometryKind::LineString),
            TileLayer::Polygons => Some(GeometryKind::Polygon),
            TileLayer::Basemap => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TileLayer::Points => "points",
            TileLayer::Lines => "lines",
            TileLayer::Polygons => "polygons",
            TileLayer::Basemap => "basemap",
        }
    }
}

/// Immutable 256x256 RGBA tile. Cached behind an `Arc` and replaced
/// wholesale on re-render.
#[derive(Debug, Clone)]
pub struct Tile {
    coord: TileCoord,
    bounds: Bounds,
    image: Pixmap,
}

pub type SharedTile = Arc<Tile>;

impl Tile {
    /// Wrap a rendered pixmap. `bounds` is the geographic area the image
    /// was drawn from, padding included.
    pub fn new(coord: TileCoord, bounds: Bounds, image: Pixmap) -> Result<Self> {
        if image.width() != TILE_SIZE || image.height() != TILE_SIZE {
            return Err(GeoTilesError::InvalidInput(format!(
                "tile {} image is {}x{}, expected {}x{}",
                coord,
                image.width(),
                image.height(),
                TILE_SIZE,
                TILE_SIZE
            )));
        }
        Ok(Self {
            coord,
            bounds,
            image,
        })
    }

    /// Fully transparent tile covering `coord`.
    pub fn blank(coord: TileCoord) -> Result<Self> {
        let image = blank_pixmap()?;
        Ok(Self {
            coord,
            bounds: tile_bounds(&coord, 0.0),
            image,
        })
    }

    pub fn coord(&self) -> TileCoord {
        self.coord
    }

    pub fn zoom(&self) -> u8 {
        self.coord.zoom
    }

    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    pub fn image(&self) -> &Pixmap {
        &self.image
    }

    /// Premultiplied RGBA bytes, row-major.
    pub fn pixels(&self) -> &[u8] {
        self.image.data()
    }

    /// True when every pixel is fully transparent.
    pub fn is_blank(&self) -> bool {
        self.image.pixels().iter().all(|p| p.alpha() == 0)
    }

    /// Approximate heap footprint used for cache accounting.
    pub fn byte_size(&self) -> usize {
        self.image.data().len() + std::mem::size_of::<Self>()
    }

    pub fn encode_png(&self) -> Result<Vec<u8>> {
        self.image
            .encode_png()
            .map_err(|e| GeoTilesError::Other(format!("PNG encode failed for {}: {}", self.coord, e)))
    }
}

pub(crate) fn blank_pixmap() -> Result<Pixmap> {
    Pixmap::new(TILE_SIZE, TILE_SIZE)
        .ok_or_else(|| GeoTilesError::Other("failed to allocate tile pixmap".to_string()))
}
