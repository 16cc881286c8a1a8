//! Basemap tile sources.

use crate::error::{GeoTilesError, Result};
use crate::projection::{MAX_ZOOM, TileCoord};

/// A slippy-map imagery source.
///
/// The provider's [`name`](TileProvider::name) doubles as its directory in
/// the disk cache, so it must be stable and filesystem-safe.
pub trait TileProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Download URL for a tile.
    fn url(&self, coord: &TileCoord) -> String;

    /// File extension used for the on-disk copy.
    fn extension(&self) -> &str {
        "png"
    }

    fn min_zoom(&self) -> u8 {
        0
    }

    fn max_zoom(&self) -> u8 {
        19
    }

    fn supports_zoom(&self, zoom: u8) -> bool {
        zoom >= self.min_zoom() && zoom <= self.max_zoom()
    }
}

/// Provider built from a URL template with `{z}`, `{x}`, `{y}` and
/// optionally `{s}` (subdomain) placeholders.
///
/// # Examples
///
/// ```
/// use geotiles::fetch::{TileProvider, UrlTemplateProvider};
/// use geotiles::projection::TileCoord;
///
/// let provider = UrlTemplateProvider::new("topo", "https://{s}.example.com/{z}/{x}/{y}.png")
///     .unwrap()
///     .with_subdomains(["a", "b"]);
/// assert_eq!(
///     provider.url(&TileCoord::new(3, 1, 2)),
///     "https://b.example.com/3/1/2.png"
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlTemplateProvider {
    name: String,
    template: String,
    subdomains: Vec<String>,
    extension: String,
    min_zoom: u8,
    max_zoom: u8,
}

pub const OSM_TEMPLATE: &str = "https://tile.openstreetmap.org/{z}/{x}/{y}.png";

impl UrlTemplateProvider {
    pub fn new(name: impl Into<String>, template: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let template = template.into();

        if name.is_empty()
            || !name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            || name.starts_with('.')
        {
            return Err(GeoTilesError::InvalidInput(format!(
                "provider name '{}' must be non-empty and use only [A-Za-z0-9._-]",
                name
            )));
        }
        for placeholder in ["{z}", "{x}", "{y}"] {
            if !template.contains(placeholder) {
                return Err(GeoTilesError::InvalidInput(format!(
                    "URL template '{}' is missing {}",
                    template, placeholder
                )));
            }
        }

        Ok(Self {
            name,
            template,
            subdomains: Vec::new(),
            extension: "png".to_string(),
            min_zoom: 0,
            max_zoom: 19,
        })
    }

    /// Standard OpenStreetMap raster tiles.
    pub fn openstreetmap() -> Self {
        Self {
            name: "osm".to_string(),
            template: OSM_TEMPLATE.to_string(),
            subdomains: Vec::new(),
            extension: "png".to_string(),
            min_zoom: 0,
            max_zoom: 19,
        }
    }

    pub fn with_subdomains<I, S>(mut self, subdomains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.subdomains = subdomains.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    pub fn with_zoom_range(mut self, min_zoom: u8, max_zoom: u8) -> Self {
        self.min_zoom = min_zoom.min(MAX_ZOOM);
        self.max_zoom = max_zoom.clamp(self.min_zoom, MAX_ZOOM);
        self
    }

    pub fn template(&self) -> &str {
        &self.template
    }
}

impl TileProvider for UrlTemplateProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn url(&self, coord: &TileCoord) -> String {
        let mut url = self
            .template
            .replace("{z}", &coord.zoom.to_string())
            .replace("{x}", &coord.x.to_string())
            .replace("{y}", &coord.y.to_string());
        if !self.subdomains.is_empty() {
            // Spread load deterministically so the same tile always hits
            // the same host.
            let index = (coord.x as usize + coord.y as usize) % self.subdomains.len();
            url = url.replace("{s}", &self.subdomains[index]);
        }
        url
    }

    fn extension(&self) -> &str {
        &self.extension
    }

    fn min_zoom(&self) -> u8 {
        self.min_zoom
    }

    fn max_zoom(&self) -> u8 {
        self.max_zoom
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_osm_preset() {
        let osm = UrlTemplateProvider::openstreetmap();
        assert_eq!(osm.name(), "osm");
        assert_eq!(
            osm.url(&TileCoord::new(16, 19295, 24640)),
            "https://tile.openstreetmap.org/16/19295/24640.png"
        );
        assert!(osm.supports_zoom(19));
        assert!(!osm.supports_zoom(20));
    }

    #[test]
    fn test_template_validation() {
        assert!(UrlTemplateProvider::new("x", "https://h/{z}/{x}.png").is_err());
        assert!(UrlTemplateProvider::new("", "https://h/{z}/{x}/{y}.png").is_err());
        assert!(UrlTemplateProvider::new("../up", "https://h/{z}/{x}/{y}.png").is_err());
        assert!(UrlTemplateProvider::new("sat-v2", "https://h/{z}/{x}/{y}.jpg").is_ok());
    }

    #[test]
    fn test_zoom_range_and_extension() {
        let provider = UrlTemplateProvider::new("sat", "https://h/{z}/{x}/{y}")
            .unwrap()
            .with_extension("jpg")
            .with_zoom_range(3, 40);
        assert_eq!(provider.extension(), "jpg");
        assert_eq!(provider.max_zoom(), MAX_ZOOM);
        assert!(!provider.supports_zoom(2));
    }
}
