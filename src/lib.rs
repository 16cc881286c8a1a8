//! Spatially indexed vector overlays and LRU tile caches for interactive
//! slippy-map viewers.
//!
//! Geometry lives in an R-tree and is rasterized on demand into 256px Web
//! Mercator tiles, one cache per layer. Edits invalidate only the tiles the
//! object touched; basemap tiles are downloaded in the background.
//!
//! ```rust
//! use geotiles::{Config, Geometry, TileEngine, TileLayer, lat_lon_to_tile};
//!
//! let engine = TileEngine::builder().config(Config::default().offline()).build()?;
//! let marker = engine.add_feature(Geometry::point(45.52, -122.68))?;
//!
//! let coord = lat_lon_to_tile(45.52, -122.68, 14);
//! let tile = engine.tile(TileLayer::Points, coord)?.expect("geometry tiles always render");
//! assert!(!tile.is_blank());
//!
//! engine.move_vertex(marker.id(), 0, geo::coord! { x: -122.60, y: 45.50 })?;
//! assert!(!engine.cache(TileLayer::Points).contains(&coord));
//! # Ok::<(), geotiles::GeoTilesError>(())
//! ```

pub mod builder;
pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod feature;
pub mod fetch;
pub mod index;
pub mod projection;
pub mod render;
pub mod synthetic;
pub mod tile;

pub use builder::EngineBuilder;
pub use engine::{EngineStats, TileEngine};
pub use error::{FetchError, GeoTilesError, Result};

pub use geotiles_types::{
    Bounds, Geometry, GeometryKind, LineGeometry, PointGeometry, PolygonGeometry, Rgba,
};

pub use cache::{CacheStats, TileCache};
pub use config::{CacheConfig, Config, FetchConfig, IndexConfig, RenderConfig};
pub use feature::{Feature, FeatureHandle, FeatureId};
pub use fetch::{
    BasemapFetcher, DiskTileCache, FetchStats, HttpClient, OfflineClient, RedrawSignal,
    RequestOutcome, TileProvider, UrlTemplateProvider,
};
#[cfg(feature = "http")]
pub use fetch::ReqwestClient;
pub use index::{RTree, SpatialIndex};
pub use projection::{
    PixelCoord, TILE_SIZE, TileCoord, TileRange, Viewport, lat_lon_to_pixel, lat_lon_to_tile,
    pixel_to_lat_lon, tile_bounds, tile_range,
};
pub use render::{DefaultStyleResolver, GeometryTileRenderer, PickHit, Style, StyleResolver};
pub use tile::{SharedTile, Tile, TileLayer};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Common imports
pub mod prelude {

    pub use crate::{EngineBuilder, GeoTilesError, Result, TileEngine};

    pub use crate::{Bounds, Geometry, GeometryKind, Rgba};

    pub use crate::{Config, FeatureHandle, FeatureId, PickHit};

    pub use crate::{SharedTile, Tile, TileCoord, TileLayer, Viewport};

    pub use crate::{TileProvider, UrlTemplateProvider};

    pub use geo::Coord;

    pub use std::time::Duration;
}
