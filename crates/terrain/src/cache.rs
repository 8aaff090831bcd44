//! Memory-budgeted cell cache over the terrain databases.
//!
//! Cells are keyed by (database, cell latitude index, cell longitude index)
//! in 7.5-arc-minute units and held in an LRU with explicit memory
//! accounting. Cells with no data are cached as markers so a miss is never
//! retried against the same database.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::path::PathBuf;

use lru::LruCache;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{TerrainError, TerrainResult};
use crate::files::OpenFileTable;
use crate::format::{CellRead, Version};
use crate::status::{StatusIndex, TileStatus};
use crate::{TerrainDb, MIN_CACHE_BYTES, TRN_CELLS_PER_DEGREE};

/// Cache key: database plus cell indices (`floor(degrees * 8)`).
pub type CellKey = (TerrainDb, i32, i32);

/// Terrain cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerrainConfig {
    /// Root directory holding one subdirectory per database.
    pub root_dir: PathBuf,

    /// Memory budget for decompressed cell data, bytes.
    pub max_cache_bytes: usize,

    /// Expected decompressed cell size used to size the slot count.
    pub target_cell_bytes: usize,
}

impl TerrainConfig {
    pub fn new(root_dir: impl Into<PathBuf>, max_cache_bytes: usize) -> Self {
        Self {
            root_dir: root_dir.into(),
            max_cache_bytes,
            target_cell_bytes: 1024 * 1024,
        }
    }

    /// Default-budget configuration (the minimum viable cache).
    pub fn with_default_budget(root_dir: impl Into<PathBuf>) -> Self {
        Self::new(root_dir, MIN_CACHE_BYTES)
    }
}

/// Cache counters.
#[derive(Debug, Default, Clone)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub memory_bytes: usize,
}

/// One cached cell.
#[derive(Debug, Clone, PartialEq)]
pub enum CellData {
    /// Negative marker: this database has nothing for the cell.
    Missing,
    /// Known seawater: every sample is zero.
    Seawater,
    /// Uniform cell: a single elevation covers the whole block.
    Uniform { elevation: i16 },
    /// Decompressed sample grid, row-major from the south-east corner
    /// (rows northward, columns westward).
    Grid {
        lat_pts: u16,
        lon_pts: u16,
        pixel_centered: bool,
        samples: Vec<i16>,
    },
}

impl CellData {
    fn memory(&self) -> usize {
        const SLOT_OVERHEAD: usize = 64;
        match self {
            CellData::Grid { samples, .. } => SLOT_OVERHEAD + samples.len() * 2,
            _ => SLOT_OVERHEAD,
        }
    }

    /// Whether this entry can supply elevations.
    pub fn is_usable(&self) -> bool {
        !matches!(self, CellData::Missing)
    }
}

/// The process-wide terrain cache.
#[derive(Debug)]
pub struct TerrainCache {
    config: TerrainConfig,
    cells: LruCache<CellKey, CellData>,
    current_memory: usize,
    hits: u64,
    misses: u64,
    evictions: u64,
    files: OpenFileTable,
    status: HashMap<TerrainDb, StatusIndex>,
    user_terrain_used: bool,
}

impl TerrainCache {
    /// Create a cache. The slot count comes from the memory budget divided
    /// by the expected cell size; actual eviction tracks real sample sizes.
    pub fn new(config: TerrainConfig) -> Self {
        let slots = (config.max_cache_bytes / config.target_cell_bytes).max(16);
        Self {
            cells: LruCache::new(NonZeroUsize::new(slots).unwrap_or(NonZeroUsize::MIN)),
            current_memory: 0,
            hits: 0,
            misses: 0,
            evictions: 0,
            files: OpenFileTable::new(),
            status: HashMap::new(),
            user_terrain_used: false,
            config,
        }
    }

    /// Whether any user-terrain file has been read by this process.
    pub fn user_terrain_used(&self) -> bool {
        self.user_terrain_used
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
            memory_bytes: self.current_memory,
        }
    }

    fn status_index(&mut self, db: TerrainDb) -> &StatusIndex {
        let root = &self.config.root_dir;
        self.status.entry(db).or_insert_with(|| {
            let path = root.join(db.dir_name()).join(StatusIndex::FILE_NAME);
            StatusIndex::load(&path)
        })
    }

    /// Load (or fetch from cache) one cell of one database.
    ///
    /// Missing data comes back as `CellData::Missing`, already cached so the
    /// database is not probed again for this cell. A tile file absent despite
    /// a "data present" index entry is reported up as `MissingFile` after the
    /// marker is cached; callers fall back to the next-coarser database.
    pub fn cell(&mut self, key: CellKey) -> TerrainResult<&CellData> {
        if self.cells.contains(&key) {
            self.hits += 1;
            return Ok(self.cells.get(&key).expect("checked entry"));
        }
        self.misses += 1;

        let (db, cell_lat_idx, cell_lon_idx) = key;
        let tile_lat = cell_lat_idx.div_euclid(TRN_CELLS_PER_DEGREE);
        let tile_lon = cell_lon_idx.div_euclid(TRN_CELLS_PER_DEGREE);

        let data = match self.status_index(db).status(tile_lat, tile_lon) {
            TileStatus::NoData => CellData::Missing,
            TileStatus::Seawater => CellData::Seawater,
            TileStatus::Data => match self.load_from_tile(db, tile_lat, tile_lon, key) {
                Ok(data) => data,
                Err(err @ TerrainError::MissingFile { .. }) => {
                    // Cache the miss so the file is not probed per point.
                    self.insert(key, CellData::Missing);
                    return Err(err);
                }
                Err(err) => return Err(err),
            },
        };

        self.insert(key, data);
        Ok(self.cells.get(&key).expect("just inserted"))
    }

    fn load_from_tile(
        &mut self,
        db: TerrainDb,
        tile_lat: i32,
        tile_lon: i32,
        key: CellKey,
    ) -> TerrainResult<CellData> {
        let db_dir = self.config.root_dir.join(db.dir_name());
        let tile = self.files.get(&db_dir, db, tile_lat, tile_lon)?;
        if tile.version == Version::V2User {
            self.user_terrain_used = true;
        }

        let sub_lat = key.1.rem_euclid(TRN_CELLS_PER_DEGREE) as usize;
        let sub_lon = key.2.rem_euclid(TRN_CELLS_PER_DEGREE) as usize;
        let cell_index = sub_lat * TRN_CELLS_PER_DEGREE as usize + sub_lon;

        Ok(match tile.read_cell(cell_index)? {
            CellRead::NoData => CellData::Missing,
            CellRead::Uniform(elevation) => CellData::Uniform { elevation },
            CellRead::Grid {
                lat_pts,
                lon_pts,
                pixel_centered,
                samples,
            } => CellData::Grid {
                lat_pts,
                lon_pts,
                pixel_centered,
                samples,
            },
        })
    }

    fn insert(&mut self, key: CellKey, data: CellData) {
        let size = data.memory();
        while self.current_memory + size > self.config.max_cache_bytes && !self.cells.is_empty() {
            if let Some((_, evicted)) = self.cells.pop_lru() {
                self.current_memory = self.current_memory.saturating_sub(evicted.memory());
                self.evictions += 1;
            }
        }
        // The slot count is a budget estimate; recycle the tail ourselves so
        // the memory accounting sees every eviction.
        if self.cells.len() == self.cells.cap().get() && !self.cells.contains(&key) {
            if let Some((_, evicted)) = self.cells.pop_lru() {
                self.current_memory = self.current_memory.saturating_sub(evicted.memory());
                self.evictions += 1;
            }
        }
        if let Some(prev) = self.cells.put(key, data) {
            self.current_memory = self.current_memory.saturating_sub(prev.memory());
        }
        self.current_memory += size;
    }

    /// First database with usable data for a cell, in preference order.
    /// `None` means nothing anywhere covers the cell.
    pub fn resolve(&mut self, cell_lat_idx: i32, cell_lon_idx: i32) -> TerrainResult<Option<TerrainDb>> {
        for db in TerrainDb::ALL {
            match self.cell((db, cell_lat_idx, cell_lon_idx)) {
                Ok(data) if data.is_usable() => return Ok(Some(db)),
                Ok(_) => continue,
                Err(TerrainError::MissingFile { file_id }) => {
                    warn!(file_id, db = ?db, "tile promised by index is missing, falling back");
                    continue;
                }
                Err(err) => return Err(err),
            }
        }
        debug!(cell_lat_idx, cell_lon_idx, "no terrain anywhere for cell");
        Ok(None)
    }

    /// Sample one database's cell at a point by bilinear interpolation.
    ///
    /// The caller must have resolved the database for this cell; markers
    /// yield 0.0 (sea level) rather than an error.
    pub fn sample(&mut self, db: TerrainDb, lat: f64, lon: f64) -> TerrainResult<f64> {
        let cells_per_degree = TRN_CELLS_PER_DEGREE as f64;
        let lat_units = lat * cells_per_degree;
        let lon_units = lon * cells_per_degree;
        let cell_lat_idx = lat_units.floor() as i32;
        let cell_lon_idx = lon_units.floor() as i32;
        let frac_lat = lat_units - lat_units.floor();
        let frac_lon = lon_units - lon_units.floor();

        let data = self.cell((db, cell_lat_idx, cell_lon_idx))?;
        Ok(match data {
            CellData::Missing | CellData::Seawater => 0.0,
            CellData::Uniform { elevation } => *elevation as f64,
            CellData::Grid {
                lat_pts,
                lon_pts,
                pixel_centered,
                samples,
            } => bilinear(
                samples,
                *lat_pts as usize,
                *lon_pts as usize,
                *pixel_centered,
                frac_lat,
                frac_lon,
            ),
        })
    }

    /// Elevation at a point through the full database fallback chain. The
    /// global set has complete coverage in production; if literally nothing
    /// covers the point the elevation is sea level.
    pub fn elevation(&mut self, lat: f64, lon: f64) -> TerrainResult<f64> {
        let cell_lat_idx = (lat * TRN_CELLS_PER_DEGREE as f64).floor() as i32;
        let cell_lon_idx = (lon * TRN_CELLS_PER_DEGREE as f64).floor() as i32;
        match self.resolve(cell_lat_idx, cell_lon_idx)? {
            Some(db) => self.sample(db, lat, lon),
            None => Ok(0.0),
        }
    }
}

/// Bilinear interpolation inside a cell's sample grid. Fractions measure
/// northward from the south edge and westward from the east edge; grids are
/// row-major from the south-east corner. Pixel-centred grids apply the
/// half-sample offset, with positions clamped into the (overlap-padded)
/// grid.
fn bilinear(
    samples: &[i16],
    lat_pts: usize,
    lon_pts: usize,
    pixel_centered: bool,
    frac_lat: f64,
    frac_lon: f64,
) -> f64 {
    let pos = |frac: f64, pts: usize| -> f64 {
        let p = if pixel_centered {
            frac * (pts as f64 - 1.0) - 0.5
        } else {
            frac * (pts as f64 - 1.0)
        };
        p.clamp(0.0, pts as f64 - 1.0)
    };

    let y = pos(frac_lat, lat_pts);
    let x = pos(frac_lon, lon_pts);
    let row = (y.floor() as usize).min(lat_pts - 1);
    let col = (x.floor() as usize).min(lon_pts - 1);
    let row1 = (row + 1).min(lat_pts - 1);
    let col1 = (col + 1).min(lon_pts - 1);
    let fy = y - row as f64;
    let fx = x - col as f64;

    let v00 = samples[row * lon_pts + col] as f64;
    let v01 = samples[row * lon_pts + col1] as f64;
    let v10 = samples[row1 * lon_pts + col] as f64;
    let v11 = samples[row1 * lon_pts + col1] as f64;

    let south = v00 * (1.0 - fx) + v01 * fx;
    let north = v10 * (1.0 - fx) + v11 * fx;
    south * (1.0 - fy) + north * fy
}
