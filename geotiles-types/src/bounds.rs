use geo::{Coord, Rect};
use serde::{Deserialize, Serialize};

/// A 2D axis-aligned bounding box in degrees.
///
/// `x` is longitude and `y` is latitude. Bounds of geometries without any
/// vertex are [`Bounds::EMPTY`], which intersects nothing and is the identity
/// for [`Bounds::union`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Bounds {
    /// Inverted box used as the starting value for unions.
    pub const EMPTY: Bounds = Bounds {
        min_x: f64::INFINITY,
        min_y: f64::INFINITY,
        max_x: f64::NEG_INFINITY,
        max_y: f64::NEG_INFINITY,
    };

    /// Create a new bounding box from minimum and maximum coordinates.
    ///
    /// # Arguments
    ///
    /// * `min_x` - Minimum longitude
    /// * `min_y` - Minimum latitude
    /// * `max_x` - Maximum longitude
    /// * `max_y` - Maximum latitude
    ///
    /// # Examples
    ///
    /// ```
    /// use geotiles_types::bounds::Bounds;
    ///
    /// let bbox = Bounds::new(-74.0, 40.7, -73.9, 40.8);
    /// assert!(bbox.width() > 0.0);
    /// ```
    pub const fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Zero-area box around a single coordinate.
    pub const fn from_coord(coord: Coord<f64>) -> Self {
        Self::new(coord.x, coord.y, coord.x, coord.y)
    }

    /// Tight box around a sequence of coordinates, [`Bounds::EMPTY`] when
    /// the sequence is empty.
    pub fn from_coords<I>(coords: I) -> Self
    where
        I: IntoIterator<Item = Coord<f64>>,
    {
        coords
            .into_iter()
            .fold(Self::EMPTY, |acc, c| acc.union(&Self::from_coord(c)))
    }

    pub fn is_empty(&self) -> bool {
        self.min_x > self.max_x || self.min_y > self.max_y
    }

    pub fn width(&self) -> f64 {
        if self.is_empty() {
            0.0
        } else {
            self.max_x - self.min_x
        }
    }

    pub fn height(&self) -> f64 {
        if self.is_empty() {
            0.0
        } else {
            self.max_y - self.min_y
        }
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    /// Centre of the box as a `geo` coordinate.
    pub fn center(&self) -> Coord<f64> {
        Coord {
            x: (self.min_x + self.max_x) / 2.0,
            y: (self.min_y + self.max_y) / 2.0,
        }
    }

    /// Box overlap test. Touching edges count as intersecting.
    pub fn intersects(&self, other: &Bounds) -> bool {
        !(self.max_x < other.min_x
            || self.min_x > other.max_x
            || self.max_y < other.min_y
            || self.min_y > other.max_y)
    }

    /// Whether `other` lies entirely within this box.
    pub fn contains(&self, other: &Bounds) -> bool {
        other.min_x >= self.min_x
            && other.max_x <= self.max_x
            && other.min_y >= self.min_y
            && other.max_y <= self.max_y
    }

    pub fn contains_coord(&self, coord: Coord<f64>) -> bool {
        coord.x >= self.min_x
            && coord.x <= self.max_x
            && coord.y >= self.min_y
            && coord.y <= self.max_y
    }

    /// Smallest box covering both inputs.
    pub fn union(&self, other: &Bounds) -> Bounds {
        Bounds {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }

    /// Area growth needed for this box to also cover `other`.
    pub fn enlargement(&self, other: &Bounds) -> f64 {
        self.union(other).area() - self.area()
    }

    /// Expand the bounding box by a given amount in all directions.
    pub fn expand(&self, amount: f64) -> Self {
        if self.is_empty() {
            return *self;
        }
        Self::new(
            self.min_x - amount,
            self.min_y - amount,
            self.max_x + amount,
            self.max_y + amount,
        )
    }

    /// Convert into a `geo::Rect`. Returns `None` for empty bounds.
    pub fn to_rect(&self) -> Option<Rect<f64>> {
        if self.is_empty() {
            return None;
        }
        Some(Rect::new(
            geo::coord! { x: self.min_x, y: self.min_y },
            geo::coord! { x: self.max_x, y: self.max_y },
        ))
    }
}

impl From<Rect<f64>> for Bounds {
    fn from(rect: Rect<f64>) -> Self {
        Self::new(rect.min().x, rect.min().y, rect.max().x, rect.max().y)
    }
}

impl Default for Bounds {
    fn default() -> Self {
        Self::EMPTY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_touching_edges_intersect() {
        let a = Bounds::new(0.0, 0.0, 1.0, 1.0);
        let b = Bounds::new(1.0, 1.0, 2.0, 2.0);
        assert!(a.intersects(&b));
        assert!(!a.intersects(&Bounds::new(1.01, 0.0, 2.0, 1.0)));
    }

    #[test]
    fn test_empty_is_union_identity() {
        let a = Bounds::new(-1.0, -2.0, 3.0, 4.0);
        assert_eq!(Bounds::EMPTY.union(&a), a);
        assert!(!Bounds::EMPTY.intersects(&a));
        assert_eq!(Bounds::EMPTY.area(), 0.0);
    }

    #[test]
    fn test_enlargement() {
        let a = Bounds::new(0.0, 0.0, 2.0, 2.0);
        assert_eq!(a.enlargement(&Bounds::new(0.5, 0.5, 1.0, 1.0)), 0.0);
        assert_eq!(a.enlargement(&Bounds::new(2.0, 0.0, 4.0, 2.0)), 4.0);
    }

    #[test]
    fn test_rect_conversion() {
        let a = Bounds::new(-10.0, -5.0, 10.0, 5.0);
        let rect = a.to_rect().unwrap();
        assert_eq!(Bounds::from(rect), a);
        assert!(Bounds::EMPTY.to_rect().is_none());
    }
}
