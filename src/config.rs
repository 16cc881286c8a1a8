//! Engine configuration.
//!
//! Every field has a default, so an empty JSON object (or TOML document) is
//! a valid configuration. Unknown fields are rejected to catch typos.

use crate::index::{DEFAULT_MAX_ENTRIES, DEFAULT_MIN_ENTRIES};
use serde::de::Error;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Cache sizes above this many tiles get a warning; a 256px RGBA tile is
/// 256 KiB, so 100k tiles is roughly 25 GiB.
const LARGE_CACHE_TILES: usize = 100_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub fetch: FetchConfig,

    #[serde(default)]
    pub index: IndexConfig,

    #[serde(default)]
    pub render: RenderConfig,
}

/// Capacity of each tile cache, in tiles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    #[serde(default = "CacheConfig::default_geometry_tiles")]
    pub points_max_tiles: usize,

    #[serde(default = "CacheConfig::default_geometry_tiles")]
    pub lines_max_tiles: usize,

    #[serde(default = "CacheConfig::default_geometry_tiles")]
    pub polygons_max_tiles: usize,

    #[serde(default = "CacheConfig::default_basemap_tiles")]
    pub basemap_max_tiles: usize,
}

impl CacheConfig {
    const fn default_geometry_tiles() -> usize {
        256
    }

    const fn default_basemap_tiles() -> usize {
        512
    }

    /// Same capacity for all four caches.
    pub fn uniform(max_tiles: usize) -> Self {
        Self {
            points_max_tiles: max_tiles,
            lines_max_tiles: max_tiles,
            polygons_max_tiles: max_tiles,
            basemap_max_tiles: max_tiles,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            points_max_tiles: Self::default_geometry_tiles(),
            lines_max_tiles: Self::default_geometry_tiles(),
            polygons_max_tiles: Self::default_geometry_tiles(),
            basemap_max_tiles: Self::default_basemap_tiles(),
        }
    }
}

/// Basemap download settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FetchConfig {
    /// When false no worker threads are started and basemap misses stay
    /// misses.
    #[serde(default = "FetchConfig::default_enabled")]
    pub enabled: bool,

    #[serde(default = "FetchConfig::default_workers")]
    pub workers: usize,

    #[serde(default = "FetchConfig::default_queue_capacity")]
    pub queue_capacity: usize,

    #[serde(default = "FetchConfig::default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "FetchConfig::default_user_agent")]
    pub user_agent: String,

    /// Root of the on-disk tile cache; `None` disables it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk_cache_dir: Option<PathBuf>,
}

impl FetchConfig {
    const fn default_enabled() -> bool {
        true
    }

    const fn default_workers() -> usize {
        4
    }

    const fn default_queue_capacity() -> usize {
        256
    }

    const fn default_timeout_secs() -> u64 {
        10
    }

    fn default_user_agent() -> String {
        format!("geotiles/{}", env!("CARGO_PKG_VERSION"))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            enabled: Self::default_enabled(),
            workers: Self::default_workers(),
            queue_capacity: Self::default_queue_capacity(),
            timeout_secs: Self::default_timeout_secs(),
            user_agent: Self::default_user_agent(),
            disk_cache_dir: None,
        }
    }
}

/// R-tree node fan-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IndexConfig {
    #[serde(default = "IndexConfig::default_min_entries")]
    pub min_entries: usize,

    #[serde(default = "IndexConfig::default_max_entries")]
    pub max_entries: usize,
}

impl IndexConfig {
    const fn default_min_entries() -> usize {
        DEFAULT_MIN_ENTRIES
    }

    const fn default_max_entries() -> usize {
        DEFAULT_MAX_ENTRIES
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            min_entries: Self::default_min_entries(),
            max_entries: Self::default_max_entries(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RenderConfig {
    #[serde(default = "RenderConfig::default_anti_alias")]
    pub anti_alias: bool,

    /// Start with per-object style overrides ignored.
    #[serde(default)]
    pub default_style: bool,
}

impl RenderConfig {
    const fn default_anti_alias() -> bool {
        true
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            anti_alias: Self::default_anti_alias(),
            default_style: false,
        }
    }
}

impl Config {
    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        for (name, tiles) in [
            ("points", cache.points_max_tiles),
            ("lines", cache.lines_max_tiles),
            ("polygons", cache.polygons_max_tiles),
            ("basemap", cache.basemap_max_tiles),
        ] {
            if tiles > LARGE_CACHE_TILES {
                log::warn!(
                    "{} cache capacity of {} tiles is very large; each tile holds 256 KiB of pixels",
                    name,
                    tiles
                );
            }
        }
        self.cache = cache;
        self
    }

    pub fn with_fetch(mut self, fetch: FetchConfig) -> Self {
        self.fetch = fetch;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.fetch.workers = workers;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.fetch.queue_capacity = capacity;
        self
    }

    pub fn with_disk_cache_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.fetch.disk_cache_dir = Some(dir.into());
        self
    }

    /// Disable basemap downloads entirely.
    pub fn offline(mut self) -> Self {
        self.fetch.enabled = false;
        self
    }

    pub fn with_fanout(mut self, min_entries: usize, max_entries: usize) -> Self {
        self.index = IndexConfig {
            min_entries,
            max_entries,
        };
        self
    }

    pub fn with_render(mut self, render: RenderConfig) -> Self {
        self.render = render;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        let caches = [
            ("points", self.cache.points_max_tiles),
            ("lines", self.cache.lines_max_tiles),
            ("polygons", self.cache.polygons_max_tiles),
            ("basemap", self.cache.basemap_max_tiles),
        ];
        for (name, tiles) in caches {
            if tiles == 0 {
                return Err(format!("{} cache capacity must be greater than zero", name));
            }
        }

        if self.fetch.enabled {
            if self.fetch.workers == 0 {
                return Err("Fetch worker count must be greater than zero".to_string());
            }
            if self.fetch.queue_capacity == 0 {
                return Err("Fetch queue capacity must be greater than zero".to_string());
            }
            if self.fetch.timeout_secs == 0 {
                return Err("Fetch timeout must be greater than zero".to_string());
            }
        }

        crate::index::check_fanout(self.index.min_entries, self.index.max_entries)?;

        Ok(())
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let config: Config = serde_json::from_str(json)?;
        if let Err(e) = config.validate() {
            return Err(Error::custom(e));
        }
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    #[cfg(feature = "toml")]
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        let config: Config = toml::from_str(toml_str)?;
        if let Err(e) = config.validate() {
            return Err(toml::de::Error::custom(e));
        }
        Ok(config)
    }

    #[cfg(feature = "toml")]
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}
