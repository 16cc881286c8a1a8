use crate::bounds::Bounds;
use crate::color::Rgba;
use geo::{Coord, LineString};
use serde::{Deserialize, Serialize};

/// Padding in degrees applied around a point so its index box is non-zero.
pub const POINT_BOUNDS_PADDING: f64 = 1e-6;

/// Discriminant of [`Geometry`], used to route objects to their tile layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GeometryKind {
    Point,
    LineString,
    Polygon,
}

impl GeometryKind {
    pub const ALL: [GeometryKind; 3] = [
        GeometryKind::Point,
        GeometryKind::LineString,
        GeometryKind::Polygon,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GeometryKind::Point => "point",
            GeometryKind::LineString => "linestring",
            GeometryKind::Polygon => "polygon",
        }
    }
}

/// A single marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointGeometry {
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub selected: bool,
}

/// An open polyline with optional per-object style overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineGeometry {
    pub line: LineString<f64>,
    #[serde(default)]
    pub selected: bool,
    #[serde(default)]
    pub color_override: Option<Rgba>,
    #[serde(default)]
    pub width_override: Option<f32>,
}

/// A polygon given by its exterior ring. The ring is closed implicitly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolygonGeometry {
    pub ring: LineString<f64>,
    #[serde(default)]
    pub selected: bool,
}

/// Vector object drawn on the map.
///
/// # Examples
///
/// ```
/// use geotiles_types::geometry::{Geometry, GeometryKind};
///
/// let line = Geometry::line_string(vec![(-122.0, 45.0), (-121.0, 46.0)]);
/// assert_eq!(line.kind(), GeometryKind::LineString);
/// assert_eq!(line.vertex_count(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Geometry {
    Point(PointGeometry),
    LineString(LineGeometry),
    Polygon(PolygonGeometry),
}

impl Geometry {
    pub fn point(lat: f64, lon: f64) -> Self {
        Geometry::Point(PointGeometry {
            lat,
            lon,
            selected: false,
        })
    }

    /// Build a line string from `(lon, lat)` pairs.
    pub fn line_string(points: Vec<(f64, f64)>) -> Self {
        Geometry::LineString(LineGeometry {
            line: LineString::from(points),
            selected: false,
            color_override: None,
            width_override: None,
        })
    }

    /// Build a polygon from `(lon, lat)` ring vertices.
    pub fn polygon(ring: Vec<(f64, f64)>) -> Self {
        Geometry::Polygon(PolygonGeometry {
            ring: LineString::from(ring),
            selected: false,
        })
    }

    pub fn kind(&self) -> GeometryKind {
        match self {
            Geometry::Point(_) => GeometryKind::Point,
            Geometry::LineString(_) => GeometryKind::LineString,
            Geometry::Polygon(_) => GeometryKind::Polygon,
        }
    }

    /// Bounds derived from the current vertices.
    pub fn bounds(&self) -> Bounds {
        match self {
            Geometry::Point(p) => {
                Bounds::from_coord(Coord { x: p.lon, y: p.lat }).expand(POINT_BOUNDS_PADDING)
            }
            Geometry::LineString(l) => Bounds::from_coords(l.line.0.iter().copied()),
            Geometry::Polygon(p) => Bounds::from_coords(p.ring.0.iter().copied()),
        }
    }

    pub fn is_selected(&self) -> bool {
        match self {
            Geometry::Point(p) => p.selected,
            Geometry::LineString(l) => l.selected,
            Geometry::Polygon(p) => p.selected,
        }
    }

    pub fn set_selected(&mut self, selected: bool) {
        match self {
            Geometry::Point(p) => p.selected = selected,
            Geometry::LineString(l) => l.selected = selected,
            Geometry::Polygon(p) => p.selected = selected,
        }
    }

    pub fn vertex_count(&self) -> usize {
        match self {
            Geometry::Point(_) => 1,
            Geometry::LineString(l) => l.line.0.len(),
            Geometry::Polygon(p) => p.ring.0.len(),
        }
    }

    /// Vertex `index` as `(x = lon, y = lat)`.
    pub fn vertex(&self, index: usize) -> Option<Coord<f64>> {
        match self {
            Geometry::Point(p) => (index == 0).then_some(Coord { x: p.lon, y: p.lat }),
            Geometry::LineString(l) => l.line.0.get(index).copied(),
            Geometry::Polygon(p) => p.ring.0.get(index).copied(),
        }
    }

    /// Move vertex `index`, returning its previous position.
    pub fn move_vertex(&mut self, index: usize, to: Coord<f64>) -> Option<Coord<f64>> {
        match self {
            Geometry::Point(p) => {
                if index != 0 {
                    return None;
                }
                let old = Coord { x: p.lon, y: p.lat };
                p.lon = to.x;
                p.lat = to.y;
                Some(old)
            }
            Geometry::LineString(l) => replace_coord(&mut l.line, index, to),
            Geometry::Polygon(p) => replace_coord(&mut p.ring, index, to),
        }
    }

    /// Insert a vertex before `index` (`index == vertex_count()` appends).
    /// Points have a fixed single vertex and reject insertion.
    pub fn insert_vertex(&mut self, index: usize, at: Coord<f64>) -> bool {
        let coords = match self {
            Geometry::Point(_) => return false,
            Geometry::LineString(l) => &mut l.line.0,
            Geometry::Polygon(p) => &mut p.ring.0,
        };
        if index > coords.len() {
            return false;
        }
        coords.insert(index, at);
        true
    }

    /// Remove vertex `index`. Points cannot lose their only vertex.
    pub fn delete_vertex(&mut self, index: usize) -> Option<Coord<f64>> {
        let coords = match self {
            Geometry::Point(_) => return None,
            Geometry::LineString(l) => &mut l.line.0,
            Geometry::Polygon(p) => &mut p.ring.0,
        };
        (index < coords.len()).then(|| coords.remove(index))
    }

    /// Iterate over vertices as `(x = lon, y = lat)`.
    pub fn vertices(&self) -> Box<dyn Iterator<Item = Coord<f64>> + '_> {
        match self {
            Geometry::Point(p) => Box::new(std::iter::once(Coord { x: p.lon, y: p.lat })),
            Geometry::LineString(l) => Box::new(l.line.0.iter().copied()),
            Geometry::Polygon(p) => Box::new(p.ring.0.iter().copied()),
        }
    }
}

fn replace_coord(line: &mut LineString<f64>, index: usize, to: Coord<f64>) -> Option<Coord<f64>> {
    line.0
        .get_mut(index)
        .map(|slot| std::mem::replace(slot, to))
}
