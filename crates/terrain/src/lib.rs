//! Multi-resolution terrain elevation cache.
//!
//! Elevation data is stored in one file per 1x1-degree tile, each holding an
//! 8x8 array of 7.5-arc-minute cells. Cells decompress into sample grids that
//! live in a memory-budgeted LRU cache keyed by (database, cell index).
//! Lookups walk the database preference order and fall back per cell on
//! missing data; the 30-arc-second global set is the backstop.

pub mod cache;
pub mod error;
pub mod files;
pub mod format;
pub mod profile;
pub mod status;

pub use cache::{CacheStats, CellKey, TerrainCache, TerrainConfig};
pub use error::{TerrainError, TerrainResult};
pub use format::{TileHeader, Version};
pub use profile::{haat, profile, ProfileRequest};

use serde::{Deserialize, Serialize};

/// Cells per degree along each axis of a tile (7.5-arc-minute cells).
pub const TRN_CELLS_PER_DEGREE: i32 = 8;

/// Size of the per-database tile status index: one byte per 1x1-degree tile
/// in global row-major order.
pub const TRN_FILE_STATUS_SIZE: usize = 180 * 360;

/// Smallest cache the engine will run with, bytes.
pub const MIN_CACHE_BYTES: usize = 3 * 512 * 1024 * 1024;

/// Terrain databases in lookup preference order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TerrainDb {
    /// 1/3-arc-second user-supplied data.
    User13,
    /// 3/4-arc-second Canada (CDED).
    Cded34,
    /// 1-arc-second Mexico (CEM).
    Cem1,
    /// 1-arc-second U.S. (NED).
    Ned1,
    /// 3-arc-second U.S.
    Ned3,
    /// 3-arc-second Canada/Mexico.
    Cded3,
    /// 30-arc-second global (GTOPO); 100% coverage backstop.
    Globe30,
}

impl TerrainDb {
    /// Databases in preference order, finest first.
    pub const ALL: [TerrainDb; 7] = [
        TerrainDb::User13,
        TerrainDb::Cded34,
        TerrainDb::Cem1,
        TerrainDb::Ned1,
        TerrainDb::Ned3,
        TerrainDb::Cded3,
        TerrainDb::Globe30,
    ];

    /// Database number embedded in tile file ids.
    pub fn number(self) -> u32 {
        match self {
            TerrainDb::User13 => 1,
            TerrainDb::Cded34 => 2,
            TerrainDb::Cem1 => 3,
            TerrainDb::Ned1 => 4,
            TerrainDb::Ned3 => 5,
            TerrainDb::Cded3 => 6,
            TerrainDb::Globe30 => 7,
        }
    }

    /// Subdirectory holding this database's tiles.
    pub fn dir_name(self) -> &'static str {
        match self {
            TerrainDb::User13 => "user13",
            TerrainDb::Cded34 => "cded34",
            TerrainDb::Cem1 => "cem1",
            TerrainDb::Ned1 => "ned1",
            TerrainDb::Ned3 => "ned3",
            TerrainDb::Cded3 => "cded3",
            TerrainDb::Globe30 => "globe30",
        }
    }

    /// Whether this is the user-supplied terrain set.
    pub fn is_user(self) -> bool {
        matches!(self, TerrainDb::User13)
    }
}

/// Provision the process-wide terrain memory budget.
///
/// Called exactly once per process with `fraction` equal to the number of
/// parallel engine processes the orchestrator intends to run. The cache
/// claims `total_ram * min(1/2, cap) / fraction`; below [`MIN_CACHE_BYTES`]
/// the process must not run and provisioning fails.
pub fn initialize(
    fraction: usize,
    total_ram_override: Option<u64>,
    cap: f64,
) -> TerrainResult<usize> {
    let total = match total_ram_override {
        Some(v) => v,
        None => detect_total_ram(),
    };
    let share = cap.min(0.5);
    let budget = ((total as f64 * share) / fraction.max(1) as f64) as usize;
    if budget < MIN_CACHE_BYTES {
        return Err(TerrainError::InsufficientMemory {
            budget,
            minimum: MIN_CACHE_BYTES,
        });
    }
    Ok(budget)
}

fn detect_total_ram() -> u64 {
    // MemTotal is reported in kB.
    if let Ok(info) = std::fs::read_to_string("/proc/meminfo") {
        for line in info.lines() {
            if let Some(rest) = line.strip_prefix("MemTotal:") {
                if let Some(kb) = rest.split_whitespace().next().and_then(|v| v.parse::<u64>().ok())
                {
                    return kb * 1024;
                }
            }
        }
    }
    // Unknown platform: assume a workstation-sized machine.
    8 * 1024 * 1024 * 1024
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_preference_order() {
        assert_eq!(TerrainDb::ALL[0], TerrainDb::User13);
        assert_eq!(TerrainDb::ALL[6], TerrainDb::Globe30);
        assert_eq!(TerrainDb::ALL.len(), 7);
    }

    #[test]
    fn test_db_numbers_unique() {
        let mut nums: Vec<u32> = TerrainDb::ALL.iter().map(|d| d.number()).collect();
        nums.sort_unstable();
        nums.dedup();
        assert_eq!(nums.len(), 7);
    }

    #[test]
    fn test_initialize_budget_split() {
        let total = 64u64 * 1024 * 1024 * 1024;
        let budget = initialize(4, Some(total), 0.5).unwrap();
        assert_eq!(budget, 8 * 1024 * 1024 * 1024);
    }

    #[test]
    fn test_initialize_rejects_undersized() {
        let total = 4u64 * 1024 * 1024 * 1024;
        let r = initialize(4, Some(total), 0.5);
        assert!(matches!(r, Err(TerrainError::InsufficientMemory { .. })));
    }

    #[test]
    fn test_initialize_caps_at_half() {
        let total = 16u64 * 1024 * 1024 * 1024;
        let budget = initialize(1, Some(total), 0.9).unwrap();
        assert_eq!(budget, 8 * 1024 * 1024 * 1024);
    }
}
