//! # geotiles-types
//!
//! Core geographic types shared by the geotiles tile engine.
//!
//! - **Bounds**: axis-aligned degree rectangle (`x` = longitude, `y` = latitude)
//! - **Geometry**: closed variant over points, line strings and polygons
//! - **Rgba**: straight-alpha color used for per-object style overrides
//!
//! All types are serializable with Serde and interoperate with the `geo`
//! crate's primitives.
//!
//! ## Examples
//!
//! ```rust
//! use geotiles_types::bounds::Bounds;
//! use geotiles_types::geometry::Geometry;
//!
//! let point = Geometry::point(45.0, -122.0);
//! let area = Bounds::new(-123.0, 44.0, -121.0, 46.0);
//! assert!(area.intersects(&point.bounds()));
//! ```

pub mod bounds;
pub mod color;
pub mod geometry;

pub use bounds::Bounds;
pub use color::Rgba;
pub use geometry::{Geometry, GeometryKind, LineGeometry, PointGeometry, PolygonGeometry};
