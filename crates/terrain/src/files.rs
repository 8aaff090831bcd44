//! Round-robin open-file table for tile files.
//!
//! Tile files are opened on demand and kept open in a fixed number of slots;
//! when every slot is taken the next open replaces the slot after the one
//! replaced last. Profile extraction touches a handful of tiles at a time,
//! so a small table keeps the descriptor count bounded without thrashing.

use std::path::Path;

use crate::error::TerrainResult;
use crate::format::{tile_file_name, TileFile};
use crate::TerrainDb;

/// Maximum tile files kept open at once.
pub const MAX_OPEN_FILES: usize = 32;

/// Key identifying one open tile file.
pub type FileKey = (TerrainDb, i32, i32);

/// The open-file table.
#[derive(Debug)]
pub struct OpenFileTable {
    slots: Vec<Option<(FileKey, TileFile)>>,
    next: usize,
}

impl OpenFileTable {
    pub fn new() -> Self {
        Self {
            slots: (0..MAX_OPEN_FILES).map(|_| None).collect(),
            next: 0,
        }
    }

    /// Get the open file for a tile, opening (and possibly evicting) as
    /// needed. `db_dir` is the database directory holding the tile.
    pub fn get(
        &mut self,
        db_dir: &Path,
        db: TerrainDb,
        tile_lat: i32,
        tile_lon: i32,
    ) -> TerrainResult<&mut TileFile> {
        let key: FileKey = (db, tile_lat, tile_lon);

        let slot = match self
            .slots
            .iter()
            .position(|s| matches!(s, Some((k, _)) if *k == key))
        {
            Some(index) => index,
            None => {
                let path = db_dir.join(tile_file_name(tile_lat, tile_lon));
                let file = TileFile::open(&path, tile_lat, tile_lon, db)?;
                let slot = self.next;
                self.next = (self.next + 1) % MAX_OPEN_FILES;
                self.slots[slot] = Some((key, file));
                slot
            }
        };

        match &mut self.slots[slot] {
            Some((_, file)) => Ok(file),
            None => unreachable!(),
        }
    }

    /// Number of currently open files.
    pub fn open_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Drop every open file.
    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
        self.next = 0;
    }
}

impl Default for OpenFileTable {
    fn default() -> Self {
        Self::new()
    }
}
