//! NADCON-style shift grids, memory-mapped and bilinearly interpolated.
//!
//! Table file layout (little-endian):
//!
//! - Offset 0: 32-bit magic `NDCN`
//! - Offset 4: ncols (u32), nrows (u32)
//! - Offset 12: lat_min, lon_min, dlat, dlon (f64, degrees; longitudes
//!   positive west, columns increasing westward)
//! - Offset 44: nrows x ncols f32 latitude shifts, arc-seconds
//! - Then: nrows x ncols f32 longitude shifts, arc-seconds (west-positive)

use std::fs::File;
use std::path::Path;

use byteorder::{ByteOrder, LittleEndian};
use memmap2::Mmap;

use study_common::LatLon;

use crate::error::{DatumError, DatumResult};

/// Magic number at the head of every table file: `NDCN`.
pub const NADCON_MAGIC: u32 = 0x4e43_444e;

const HEADER_LEN: usize = 44;

/// One memory-mapped shift grid.
pub struct NadconTable {
    map: Mmap,
    ncols: usize,
    nrows: usize,
    lat_min: f64,
    lon_min: f64,
    dlat: f64,
    dlon: f64,
}

impl NadconTable {
    /// Map a table file and validate its header.
    pub fn open(path: &Path) -> DatumResult<Self> {
        let file = File::open(path).map_err(|source| DatumError::TableIo {
            path: path.to_path_buf(),
            source,
        })?;
        // Safety: the table files are written once and never mutated while
        // a study runs; the study database lock guarantees it.
        let map = unsafe { Mmap::map(&file) }.map_err(|source| DatumError::TableIo {
            path: path.to_path_buf(),
            source,
        })?;

        if map.len() < HEADER_LEN {
            return Err(DatumError::TableFormat {
                path: path.to_path_buf(),
                reason: format!("truncated header ({} bytes)", map.len()),
            });
        }
        let magic = LittleEndian::read_u32(&map[0..4]);
        if magic != NADCON_MAGIC {
            return Err(DatumError::TableFormat {
                path: path.to_path_buf(),
                reason: format!("bad magic {magic:#010x}"),
            });
        }
        let ncols = LittleEndian::read_u32(&map[4..8]) as usize;
        let nrows = LittleEndian::read_u32(&map[8..12]) as usize;
        let lat_min = LittleEndian::read_f64(&map[12..20]);
        let lon_min = LittleEndian::read_f64(&map[20..28]);
        let dlat = LittleEndian::read_f64(&map[28..36]);
        let dlon = LittleEndian::read_f64(&map[36..44]);

        if ncols < 2 || nrows < 2 || dlat <= 0.0 || dlon <= 0.0 {
            return Err(DatumError::TableFormat {
                path: path.to_path_buf(),
                reason: format!("degenerate grid {ncols}x{nrows}"),
            });
        }
        let need = HEADER_LEN + nrows * ncols * 4 * 2;
        if map.len() < need {
            return Err(DatumError::TableFormat {
                path: path.to_path_buf(),
                reason: format!("file too short: {} < {}", map.len(), need),
            });
        }

        Ok(Self {
            map,
            ncols,
            nrows,
            lat_min,
            lon_min,
            dlat,
            dlon,
        })
    }

    fn sample(&self, grid: usize, row: usize, col: usize) -> f64 {
        let base = HEADER_LEN + grid * self.nrows * self.ncols * 4;
        let off = base + (row * self.ncols + col) * 4;
        LittleEndian::read_f32(&self.map[off..off + 4]) as f64
    }

    /// Apply the grid shift to a NAD27 point. Returns `None` when the point
    /// falls off the grid (callers then try the next declared region).
    pub fn shift(&self, point: LatLon) -> Option<LatLon> {
        let x = (point.lon - self.lon_min) / self.dlon;
        let y = (point.lat - self.lat_min) / self.dlat;
        if x < 0.0 || y < 0.0 || x > (self.ncols - 1) as f64 || y > (self.nrows - 1) as f64 {
            return None;
        }

        let col = (x.floor() as usize).min(self.ncols - 2);
        let row = (y.floor() as usize).min(self.nrows - 2);
        let fx = x - col as f64;
        let fy = y - row as f64;

        let mut shifts = [0.0f64; 2];
        for (grid, out) in shifts.iter_mut().enumerate() {
            let v00 = self.sample(grid, row, col);
            let v01 = self.sample(grid, row, col + 1);
            let v10 = self.sample(grid, row + 1, col);
            let v11 = self.sample(grid, row + 1, col + 1);
            let south = v00 * (1.0 - fx) + v01 * fx;
            let north = v10 * (1.0 - fx) + v11 * fx;
            *out = south * (1.0 - fy) + north * fy;
        }

        Some(LatLon::new(
            point.lat + shifts[0] / 3600.0,
            point.lon + shifts[1] / 3600.0,
        ))
    }
}
