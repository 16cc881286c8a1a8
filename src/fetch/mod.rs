//! Basemap download pipeline.
//!
//! A basemap cache miss on the render thread becomes a [`DownloadRequest`]
//! on a bounded queue. A fixed pool of worker threads takes requests off
//! the queue, serves them from the disk cache or the network, decodes the
//! image and publishes it into the basemap [`TileCache`], then raises the
//! [`RedrawSignal`]. An in-flight set keeps a tile from being queued twice.
//!
//! The render side holds its own receiver clone so it can drain stale
//! requests on a zoom change without waiting for the workers.

mod disk;
mod http;
mod provider;
mod signal;

pub use disk::DiskTileCache;
#[cfg(feature = "http")]
pub use http::ReqwestClient;
pub use http::{HttpClient, OfflineClient};
pub use provider::{OSM_TEMPLATE, TileProvider, UrlTemplateProvider};
pub use signal::RedrawSignal;

use crate::cache::TileCache;
use crate::error::{FetchError, GeoTilesError, Result};
use crate::projection::{TILE_SIZE, TileCoord, tile_bounds};
use crate::tile::{SharedTile, Tile};
use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use tiny_skia::{ColorU8, Pixmap};

/// One queued basemap download.
#[derive(Clone)]
pub struct DownloadRequest {
    pub coord: TileCoord,
    pub provider: Arc<dyn TileProvider>,
    /// Provider generation the request was made under. Results from an
    /// older generation are discarded.
    generation: u64,
    /// Unique per request; owns the in-flight mark it created.
    seq: u64,
}

/// What happened to a [`BasemapFetcher::request`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    Queued,
    AlreadyInFlight,
    /// The queue was full; the tile will be requested again next frame.
    Dropped,
    UnsupportedZoom,
    Closed,
}

/// Counters for the download pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct FetchStats {
    pub queued: u64,
    pub completed: u64,
    pub disk_hits: u64,
    pub failed: u64,
    pub dropped: u64,
    pub cancelled: u64,
    pub discarded: u64,
    pub in_flight: usize,
    pub pending: usize,
}

#[derive(Default)]
struct Counters {
    queued: AtomicU64,
    completed: AtomicU64,
    disk_hits: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
    cancelled: AtomicU64,
    discarded: AtomicU64,
}

/// State shared with the worker threads.
struct Shared {
    cache: Arc<TileCache<SharedTile>>,
    signal: Arc<RedrawSignal>,
    client: Arc<dyn HttpClient>,
    disk: Option<DiskTileCache>,
    provider: RwLock<(Arc<dyn TileProvider>, u64)>,
    /// Tile -> sequence number of the request that marked it.
    in_flight: Mutex<FxHashMap<TileCoord, u64>>,
    next_seq: AtomicU64,
    counters: Counters,
}

impl Shared {
    fn current_generation(&self) -> u64 {
        self.provider.read().1
    }

    /// Clear the mark for `coord` only if request `seq` still owns it. A
    /// later request for the same tile may have re-marked it after a zoom
    /// round trip or provider switch.
    fn clear_mark(&self, coord: &TileCoord, seq: u64) {
        let mut in_flight = self.in_flight.lock();
        if in_flight.get(coord) == Some(&seq) {
            in_flight.remove(coord);
        }
    }

    fn process(&self, request: DownloadRequest) {
        let DownloadRequest {
            coord,
            provider,
            generation,
            seq,
        } = request;

        match self.load(&coord, provider.as_ref()) {
            Ok(tile) => {
                if generation == self.current_generation() {
                    self.counters.completed.fetch_add(1, Ordering::Relaxed);
                    self.cache.set(coord, Arc::new(tile));
                    self.signal.raise();
                } else {
                    self.counters.discarded.fetch_add(1, Ordering::Relaxed);
                    debug!("discarding {} from replaced provider {}", coord, provider.name());
                }
            }
            Err(e) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                warn!("basemap tile {} from {} failed: {}", coord, provider.name(), e);
            }
        }

        // Publish before unmarking so a frame in between sees one or the other.
        self.clear_mark(&coord, seq);
    }

    fn load(&self, coord: &TileCoord, provider: &dyn TileProvider) -> std::result::Result<Tile, FetchError> {
        if !provider.supports_zoom(coord.zoom) {
            return Err(FetchError::UnsupportedZoom(coord.zoom));
        }
        let name = provider.name();
        let extension = provider.extension();

        if let Some(disk) = &self.disk {
            if let Some(data) = disk.read(name, coord, extension)? {
                match decode_tile(*coord, &data) {
                    Ok(tile) => {
                        self.counters.disk_hits.fetch_add(1, Ordering::Relaxed);
                        return Ok(tile);
                    }
                    Err(e) => {
                        warn!("corrupt disk tile {} ({}), refetching", coord, e);
                        disk.remove(name, coord, extension)?;
                    }
                }
            }
        }

        let data = self.client.get(&provider.url(coord))?;
        let tile = decode_tile(*coord, &data)?;
        if let Some(disk) = &self.disk {
            disk.write(name, coord, extension, &data)?;
        }
        Ok(tile)
    }
}

/// Decode an encoded tile image into a premultiplied 256px pixmap.
pub fn decode_tile(coord: TileCoord, data: &[u8]) -> std::result::Result<Tile, FetchError> {
    let rgba = image::load_from_memory(data)?.to_rgba8();
    if rgba.width() != TILE_SIZE || rgba.height() != TILE_SIZE {
        return Err(FetchError::Decode(format!(
            "expected {}x{} image, got {}x{}",
            TILE_SIZE,
            TILE_SIZE,
            rgba.width(),
            rgba.height()
        )));
    }

    let mut pixmap = Pixmap::new(TILE_SIZE, TILE_SIZE)
        .ok_or_else(|| FetchError::Decode("failed to allocate pixmap".to_string()))?;
    for (dst, src) in pixmap.pixels_mut().iter_mut().zip(rgba.pixels()) {
        let [r, g, b, a] = src.0;
        *dst = ColorU8::from_rgba(r, g, b, a).premultiply();
    }

    Tile::new(coord, tile_bounds(&coord, 0.0), pixmap).map_err(|e| FetchError::Decode(e.to_string()))
}

/// Fixed worker pool feeding the basemap cache.
pub struct BasemapFetcher {
    shared: Arc<Shared>,
    sender: Mutex<Option<Sender<DownloadRequest>>>,
    receiver: Receiver<DownloadRequest>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl BasemapFetcher {
    /// Spawn `workers` threads servicing a queue of `queue_capacity`.
    pub fn start(
        workers: usize,
        queue_capacity: usize,
        provider: Arc<dyn TileProvider>,
        client: Arc<dyn HttpClient>,
        disk: Option<DiskTileCache>,
        cache: Arc<TileCache<SharedTile>>,
        signal: Arc<RedrawSignal>,
    ) -> Result<Self> {
        if workers == 0 {
            return Err(GeoTilesError::InvalidConfig(
                "fetch worker count must be at least 1".to_string(),
            ));
        }
        let (sender, receiver) = channel::bounded(queue_capacity.max(1));
        let shared = Arc::new(Shared {
            cache,
            signal,
            client,
            disk,
            provider: RwLock::new((provider, 0)),
            in_flight: Mutex::new(FxHashMap::default()),
            next_seq: AtomicU64::new(0),
            counters: Counters::default(),
        });

        let mut handles = Vec::with_capacity(workers);
        for id in 0..workers {
            let shared = Arc::clone(&shared);
            let receiver = receiver.clone();
            let handle = thread::Builder::new()
                .name(format!("geotiles-fetch-{}", id))
                .spawn(move || {
                    debug!("fetch worker {} started", id);
                    while let Ok(request) = receiver.recv() {
                        shared.process(request);
                    }
                    debug!("fetch worker {} stopped", id);
                })?;
            handles.push(handle);
        }
        info!(
            "basemap fetcher started: {} workers, queue capacity {}",
            workers,
            queue_capacity.max(1)
        );

        Ok(Self {
            shared,
            sender: Mutex::new(Some(sender)),
            receiver,
            workers: Mutex::new(handles),
        })
    }

    /// Queue a download for `coord` unless one is already in flight.
    pub fn request(&self, coord: TileCoord) -> RequestOutcome {
        let (provider, generation) = {
            let guard = self.shared.provider.read();
            (Arc::clone(&guard.0), guard.1)
        };
        if !provider.supports_zoom(coord.zoom) {
            return RequestOutcome::UnsupportedZoom;
        }

        let seq = {
            let mut in_flight = self.shared.in_flight.lock();
            if in_flight.contains_key(&coord) {
                return RequestOutcome::AlreadyInFlight;
            }
            let seq = self.shared.next_seq.fetch_add(1, Ordering::Relaxed);
            in_flight.insert(coord, seq);
            seq
        };

        let sent = match self.sender.lock().as_ref() {
            Some(sender) => sender.try_send(DownloadRequest {
                coord,
                provider,
                generation,
                seq,
            }),
            None => {
                self.shared.clear_mark(&coord, seq);
                return RequestOutcome::Closed;
            }
        };

        match sent {
            Ok(()) => {
                self.shared.counters.queued.fetch_add(1, Ordering::Relaxed);
                RequestOutcome::Queued
            }
            Err(TrySendError::Full(_)) => {
                self.shared.clear_mark(&coord, seq);
                self.shared.counters.dropped.fetch_add(1, Ordering::Relaxed);
                RequestOutcome::Dropped
            }
            Err(TrySendError::Disconnected(_)) => {
                self.shared.clear_mark(&coord, seq);
                RequestOutcome::Closed
            }
        }
    }

    pub fn is_in_flight(&self, coord: &TileCoord) -> bool {
        self.shared.in_flight.lock().contains_key(coord)
    }

    /// Drop queued requests for other zooms and forget their in-flight
    /// marks. Downloads already running are left to finish. Returns the
    /// number of queued requests cancelled.
    pub fn on_zoom_changed(&self, zoom: u8) -> usize {
        let drained: Vec<DownloadRequest> = self.receiver.try_iter().collect();
        let mut cancelled = 0;
        let sender = self.sender.lock();
        for request in drained {
            if request.coord.zoom == zoom {
                // Still wanted; put it back if there is room.
                if let Some(sender) = sender.as_ref() {
                    if let Err(e) = sender.try_send(request) {
                        let request = e.into_inner();
                        self.shared.clear_mark(&request.coord, request.seq);
                        cancelled += 1;
                    }
                }
            } else {
                cancelled += 1;
            }
        }
        drop(sender);

        self.shared.in_flight.lock().retain(|coord, _| coord.zoom == zoom);
        self.shared
            .counters
            .cancelled
            .fetch_add(cancelled as u64, Ordering::Relaxed);
        if cancelled > 0 {
            debug!("zoom changed to {}, cancelled {} queued downloads", zoom, cancelled);
        }
        cancelled
    }

    pub fn provider(&self) -> Arc<dyn TileProvider> {
        Arc::clone(&self.shared.provider.read().0)
    }

    /// Switch imagery source: cancels everything queued, forgets in-flight
    /// marks and empties the basemap cache. Results still arriving from
    /// the old provider are discarded.
    pub fn set_provider(&self, provider: Arc<dyn TileProvider>) {
        {
            let mut guard = self.shared.provider.write();
            info!("switching basemap provider {} -> {}", guard.0.name(), provider.name());
            guard.0 = provider;
            guard.1 += 1;
        }
        let cancelled = self.receiver.try_iter().count();
        self.shared.in_flight.lock().clear();
        self.shared
            .counters
            .cancelled
            .fetch_add(cancelled as u64, Ordering::Relaxed);
        self.shared.cache.clear();
        self.shared.signal.raise();
    }

    pub fn stats(&self) -> FetchStats {
        let c = &self.shared.counters;
        FetchStats {
            queued: c.queued.load(Ordering::Relaxed),
            completed: c.completed.load(Ordering::Relaxed),
            disk_hits: c.disk_hits.load(Ordering::Relaxed),
            failed: c.failed.load(Ordering::Relaxed),
            dropped: c.dropped.load(Ordering::Relaxed),
            cancelled: c.cancelled.load(Ordering::Relaxed),
            discarded: c.discarded.load(Ordering::Relaxed),
            in_flight: self.shared.in_flight.lock().len(),
            pending: self.receiver.len(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.sender.lock().is_some()
    }

    /// Cancel queued work, close the queue and join the workers. Idempotent.
    pub fn stop(&self) {
        let Some(sender) = self.sender.lock().take() else {
            return;
        };
        drop(sender);
        let cancelled = self.receiver.try_iter().count();
        self.shared.in_flight.lock().clear();

        let handles: Vec<JoinHandle<()>> = self.workers.lock().drain(..).collect();
        for handle in handles {
            if handle.join().is_err() {
                warn!("fetch worker panicked during shutdown");
            }
        }
        info!("basemap fetcher stopped ({} queued requests cancelled)", cancelled);
    }
}

impl Drop for BasemapFetcher {
    fn drop(&mut self) {
        self.stop();
    }
}
