//! Per-database tile status index (`blocks.idx`).
//!
//! One byte per 1x1-degree tile in global row-major order, south to north
//! then east to west. The index is loaded once on first use of a database;
//! any failure to read it collapses that database to "no data" rather than
//! failing the run.

use std::path::Path;

use tracing::warn;

use crate::TRN_FILE_STATUS_SIZE;

/// Status of one tile within a database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileStatus {
    /// No data for this tile; fall through to the next database.
    NoData,
    /// A tile file should exist on disk.
    Data,
    /// Known seawater: every sample is zero, no file on disk.
    Seawater,
}

impl TileStatus {
    pub fn from_byte(b: u8) -> TileStatus {
        match b {
            1 => TileStatus::Data,
            2 => TileStatus::Seawater,
            _ => TileStatus::NoData,
        }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            TileStatus::NoData => 0,
            TileStatus::Data => 1,
            TileStatus::Seawater => 2,
        }
    }
}

/// A loaded status index.
#[derive(Debug)]
pub struct StatusIndex {
    bytes: Vec<u8>,
}

impl StatusIndex {
    /// File name of the index within a database directory.
    pub const FILE_NAME: &'static str = "blocks.idx";

    /// Load the index. A missing, unreadable, or wrong-sized file yields an
    /// all-no-data index.
    pub fn load(path: &Path) -> StatusIndex {
        match std::fs::read(path) {
            Ok(bytes) if bytes.len() == TRN_FILE_STATUS_SIZE => StatusIndex { bytes },
            Ok(bytes) => {
                warn!(
                    path = %path.display(),
                    len = bytes.len(),
                    expected = TRN_FILE_STATUS_SIZE,
                    "status index has wrong size, database disabled"
                );
                StatusIndex::empty()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "status index unreadable, database disabled"
                );
                StatusIndex::empty()
            }
        }
    }

    /// An index reporting no data everywhere.
    pub fn empty() -> StatusIndex {
        StatusIndex {
            bytes: vec![0; TRN_FILE_STATUS_SIZE],
        }
    }

    /// Status for a 1-degree tile. Latitudes are the tile's south edge in
    /// degrees north, longitudes the tile's east edge in degrees west.
    pub fn status(&self, tile_lat: i32, tile_lon: i32) -> TileStatus {
        if !(-90..90).contains(&tile_lat) || !(-180..180).contains(&tile_lon) {
            return TileStatus::NoData;
        }
        let row = (tile_lat + 90) as usize;
        let col = (tile_lon + 180) as usize;
        TileStatus::from_byte(self.bytes[row * 360 + col])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_index_collapses_to_no_data() {
        let idx = StatusIndex::load(Path::new("/nonexistent/blocks.idx"));
        assert_eq!(idx.status(39, 105), TileStatus::NoData);
    }

    #[test]
    fn test_wrong_size_collapses_to_no_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(StatusIndex::FILE_NAME);
        std::fs::write(&path, vec![1u8; 100]).unwrap();
        let idx = StatusIndex::load(&path);
        assert_eq!(idx.status(0, 0), TileStatus::NoData);
    }

    #[test]
    fn test_status_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(StatusIndex::FILE_NAME);
        let mut bytes = vec![0u8; TRN_FILE_STATUS_SIZE];
        let row = (39 + 90) as usize;
        let col = (105 + 180) as usize;
        bytes[row * 360 + col] = 1;
        bytes[row * 360 + col + 1] = 2;
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(&bytes).unwrap();

        let idx = StatusIndex::load(&path);
        assert_eq!(idx.status(39, 105), TileStatus::Data);
        assert_eq!(idx.status(39, 106), TileStatus::Seawater);
        assert_eq!(idx.status(39, 104), TileStatus::NoData);
        assert_eq!(idx.status(95, 0), TileStatus::NoData);
    }
}
