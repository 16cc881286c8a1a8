//! Engine builder for flexible configuration
//!
//! This module provides a builder pattern for assembling a [`TileEngine`]
//! with injected collaborators: basemap provider, HTTP client and style
//! resolver. Anything not injected falls back to a default.

use crate::cache::TileCache;
use crate::config::Config;
use crate::engine::{EngineParts, TileEngine};
use crate::error::{GeoTilesError, Result};
use crate::fetch::{
    BasemapFetcher, DiskTileCache, HttpClient, RedrawSignal, TileProvider, UrlTemplateProvider,
};
use crate::index::SpatialIndex;
use crate::render::{DefaultStyleResolver, GeometryTileRenderer, StyleResolver};
use crate::tile::TileLayer;
use std::path::PathBuf;
use std::sync::Arc;

/// Builder for engine configuration and collaborator injection.
pub struct EngineBuilder {
    config: Config,
    provider: Option<Arc<dyn TileProvider>>,
    client: Option<Arc<dyn HttpClient>>,
    resolver: Option<Arc<dyn StyleResolver>>,
}

impl EngineBuilder {
    /// Create a new builder with the default configuration.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
            provider: None,
            client: None,
            resolver: None,
        }
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Basemap source. Defaults to OpenStreetMap.
    pub fn provider(mut self, provider: Arc<dyn TileProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Transport used by the download workers.
    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.client = Some(client);
        self
    }

    pub fn style_resolver(mut self, resolver: Arc<dyn StyleResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Persist downloaded basemap tiles under `dir`.
    pub fn disk_cache_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config = self.config.with_disk_cache_dir(dir);
        self
    }

    /// Build without download workers.
    pub fn offline(mut self) -> Self {
        self.config = self.config.offline();
        self
    }

    /// Validate the configuration, create the caches and index, and start
    /// the fetch workers if enabled.
    pub fn build(self) -> Result<TileEngine> {
        self.config.validate().map_err(GeoTilesError::InvalidConfig)?;
        let Config {
            cache,
            fetch,
            index,
            render,
        } = self.config;

        let new_cache = |layer: TileLayer, max_tiles| Arc::new(TileCache::new(layer.as_str(), max_tiles));
        let points = new_cache(TileLayer::Points, cache.points_max_tiles);
        let lines = new_cache(TileLayer::Lines, cache.lines_max_tiles);
        let polygons = new_cache(TileLayer::Polygons, cache.polygons_max_tiles);
        let basemap = new_cache(TileLayer::Basemap, cache.basemap_max_tiles);

        let resolver = self
            .resolver
            .unwrap_or_else(|| Arc::new(DefaultStyleResolver::default()));
        let renderer = GeometryTileRenderer::new(resolver, render.anti_alias);
        renderer.set_default_style(render.default_style);

        let signal = Arc::new(RedrawSignal::new());

        let fetcher = if fetch.enabled {
            let client = match self.client {
                Some(client) => client,
                None => default_client(&fetch)?,
            };
            let provider = self
                .provider
                .unwrap_or_else(|| Arc::new(UrlTemplateProvider::openstreetmap()));
            Some(BasemapFetcher::start(
                fetch.workers,
                fetch.queue_capacity,
                provider,
                client,
                fetch.disk_cache_dir.map(DiskTileCache::new),
                Arc::clone(&basemap),
                Arc::clone(&signal),
            )?)
        } else {
            None
        };

        Ok(TileEngine::from_parts(EngineParts {
            index: SpatialIndex::with_fanout(index.min_entries, index.max_entries)?,
            points,
            lines,
            polygons,
            basemap,
            renderer,
            fetcher,
            signal,
        }))
    }
}

#[cfg(feature = "http")]
fn default_client(fetch: &crate::config::FetchConfig) -> Result<Arc<dyn HttpClient>> {
    let client = crate::fetch::ReqwestClient::new(fetch.timeout(), &fetch.user_agent)?;
    Ok(Arc::new(client))
}

#[cfg(not(feature = "http"))]
fn default_client(_fetch: &crate::config::FetchConfig) -> Result<Arc<dyn HttpClient>> {
    log::warn!("built without the `http` feature and no HTTP client injected; basemap fetches will fail");
    Ok(Arc::new(crate::fetch::OfflineClient))
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use crate::fetch::OfflineClient;

    #[test]
    fn test_builder_default_config() {
        let builder = EngineBuilder::new();
        assert_eq!(builder.config, Config::default());
        assert!(builder.provider.is_none());
    }

    #[test]
    fn test_builder_offline() {
        let engine = EngineBuilder::new().offline().build().unwrap();
        assert!(engine.stats().fetch.is_none());
        assert!(engine.provider().is_none());
    }

    #[test]
    fn test_builder_with_config() {
        let config = Config::default()
            .with_cache(CacheConfig::uniform(8))
            .with_fanout(2, 4)
            .offline();
        let engine = EngineBuilder::new().config(config).build().unwrap();
        let stats = engine.stats();
        assert_eq!(stats.points.max_tiles, 8);
        assert_eq!(stats.basemap.max_tiles, 8);
        assert_eq!(stats.basemap.name, "basemap");
    }

    #[test]
    fn test_builder_rejects_invalid_config() {
        let result = EngineBuilder::new()
            .config(Config::default().with_fanout(6, 9))
            .build();
        assert!(matches!(result, Err(GeoTilesError::InvalidConfig(_))));
    }

    #[test]
    fn test_builder_injected_collaborators() {
        let provider = UrlTemplateProvider::new("local", "http://localhost/{z}/{x}/{y}.png").unwrap();
        let engine = EngineBuilder::new()
            .config(Config::default().with_workers(1))
            .provider(Arc::new(provider))
            .http_client(Arc::new(OfflineClient))
            .build()
            .unwrap();
        assert_eq!(engine.provider().unwrap().name(), "local");
        engine.shutdown();
    }
}
