use serde::Serialize;

/// Snapshot of one tile cache's counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub name: String,
    pub resident_tiles: usize,
    pub max_tiles: usize,
    /// Sum of [`TileWeight::weight_bytes`](super::TileWeight) over resident tiles.
    pub estimated_bytes: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub invalidations: u64,
}

impl CacheStats {
    /// Fraction of `get` calls that hit, or 0 before any lookups.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn utilization(&self) -> f64 {
        if self.max_tiles == 0 {
            0.0
        } else {
            self.resident_tiles as f64 / self.max_tiles as f64
        }
    }
}
