//! Per-object drawing styles.

use crate::{Geometry, GeometryKind, Rgba};
use serde::{Deserialize, Serialize};

/// How one object is drawn. Widths and radii are in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Style {
    pub stroke: Rgba,
    pub fill: Option<Rgba>,
    pub width: f32,
    /// Marker radius; only used for points.
    pub radius: f32,
}

impl Style {
    pub const fn stroke(color: Rgba, width: f32) -> Self {
        Self {
            stroke: color,
            fill: None,
            width,
            radius: 0.0,
        }
    }

    pub const fn with_fill(mut self, fill: Rgba) -> Self {
        self.fill = Some(fill);
        self
    }

    pub const fn with_radius(mut self, radius: f32) -> Self {
        self.radius = radius;
        self
    }

    /// Distance in pixels this style can paint beyond the geometry itself.
    pub fn extent_px(&self) -> f32 {
        self.radius.max(0.0) + self.width.max(0.0) / 2.0
    }
}

/// Read-only source of styles for the renderer and hit-tester.
///
/// Implementors supply the per-kind defaults and the selection highlight;
/// [`StyleResolver::resolve`] applies the override rules on top.
pub trait StyleResolver: Send + Sync {
    fn kind_style(&self, kind: GeometryKind) -> Style;

    fn selected_style(&self, kind: GeometryKind) -> Style;

    /// Style for `geometry`. Selection always wins; with `default_style`
    /// set, per-object overrides are ignored.
    fn resolve(&self, geometry: &Geometry, default_style: bool) -> Style {
        let kind = geometry.kind();
        if geometry.is_selected() {
            return self.selected_style(kind);
        }
        let mut style = self.kind_style(kind);
        if default_style {
            return style;
        }
        if let Geometry::LineString(line) = geometry {
            if let Some(color) = line.color_override {
                style.stroke = color;
            }
            if let Some(width) = line.width_override {
                style.width = match self.max_override_width() {
                    Some(limit) => width.clamp(0.0, limit),
                    None => width,
                };
            }
        }
        style
    }

    /// Cap applied to per-object width overrides. `None` leaves them
    /// unbounded, in which case [`StyleResolver::margin_px`] cannot account
    /// for them.
    fn max_override_width(&self) -> Option<f32> {
        None
    }

    /// Render margin in pixels: how far the widest style reaches past a
    /// geometry. Tile queries and invalidation pad by this much.
    fn margin_px(&self) -> f32 {
        let widest = GeometryKind::ALL
            .iter()
            .flat_map(|&kind| [self.kind_style(kind), self.selected_style(kind)])
            .map(|style| style.extent_px())
            .fold(0.0, f32::max);
        widest.max(self.max_override_width().unwrap_or(0.0) / 2.0)
    }
}

/// Fixed palette used when no resolver is injected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefaultStyleResolver {
    pub point: Style,
    pub line: Style,
    pub polygon: Style,
    pub selected: Style,
    /// Upper bound on line width overrides, so the render margin stays
    /// valid for objects with custom widths.
    pub max_override_width: f32,
}

impl Default for DefaultStyleResolver {
    fn default() -> Self {
        Self {
            point: Style::stroke(Rgba::opaque(255, 255, 255), 1.5)
                .with_fill(Rgba::opaque(220, 40, 40))
                .with_radius(5.0),
            line: Style::stroke(Rgba::opaque(30, 90, 200), 3.0),
            polygon: Style::stroke(Rgba::opaque(20, 130, 60), 2.0)
                .with_fill(Rgba::new(20, 130, 60, 80)),
            selected: Style::stroke(Rgba::opaque(255, 200, 0), 4.0)
                .with_fill(Rgba::new(255, 200, 0, 120))
                .with_radius(7.0),
            max_override_width: 12.0,
        }
    }
}

impl StyleResolver for DefaultStyleResolver {
    fn kind_style(&self, kind: GeometryKind) -> Style {
        match kind {
            GeometryKind::Point => self.point,
            GeometryKind::LineString => self.line,
            GeometryKind::Polygon => self.polygon,
        }
    }

    fn selected_style(&self, kind: GeometryKind) -> Style {
        match kind {
            GeometryKind::Point => self.selected,
            // Markers only keep their radius for points.
            GeometryKind::LineString | GeometryKind::Polygon => self.selected.with_radius(0.0),
        }
    }

    fn max_override_width(&self) -> Option<f32> {
        Some(self.max_override_width)
    }
}
