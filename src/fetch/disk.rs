//! On-disk basemap cache laid out as `<root>/<provider>/<z>/<x>/<y>.<ext>`.

use crate::error::FetchError;
use crate::projection::TileCoord;
use bytes::Bytes;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct DiskTileCache {
    root: PathBuf,
}

impl DiskTileCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, provider: &str, coord: &TileCoord, extension: &str) -> PathBuf {
        self.root
            .join(provider)
            .join(coord.zoom.to_string())
            .join(coord.x.to_string())
            .join(format!("{}.{}", coord.y, extension))
    }

    /// Stored bytes for a tile, or `None` if it was never written.
    pub fn read(
        &self,
        provider: &str,
        coord: &TileCoord,
        extension: &str,
    ) -> Result<Option<Bytes>, FetchError> {
        let path = self.path(provider, coord, extension);
        match fs::read(&path) {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(disk_error("read", &path, e)),
        }
    }

    /// Persist a tile. Data goes to a temp file first and is renamed into
    /// place, so readers never see a partial image.
    pub fn write(
        &self,
        provider: &str,
        coord: &TileCoord,
        extension: &str,
        data: &[u8],
    ) -> Result<(), FetchError> {
        let path = self.path(provider, coord, extension);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| disk_error("create", parent, e))?;
        }

        let temp_path = path.with_extension(format!("{}.tmp", extension));
        let mut file = fs::File::create(&temp_path).map_err(|e| disk_error("create", &temp_path, e))?;
        file.write_all(data)
            .and_then(|_| file.sync_all())
            .map_err(|e| disk_error("write", &temp_path, e))?;
        drop(file);

        fs::rename(&temp_path, &path).map_err(|e| disk_error("rename", &path, e))
    }

    pub fn contains(&self, provider: &str, coord: &TileCoord, extension: &str) -> bool {
        self.path(provider, coord, extension).is_file()
    }

    /// Returns whether a file was removed.
    pub fn remove(&self, provider: &str, coord: &TileCoord, extension: &str) -> Result<bool, FetchError> {
        let path = self.path(provider, coord, extension);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(disk_error("remove", &path, e)),
        }
    }
}

fn disk_error(action: &str, path: &Path, err: io::Error) -> FetchError {
    FetchError::Disk(format!("failed to {} {}: {}", action, path.display(), err))
}
