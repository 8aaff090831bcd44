//! Synthetic terrain tile and status-index writers.
//!
//! The writers emit the exact layout the terrain parser reads, including
//! byte-swapped files for endian-detection tests.

use std::io::Write;
use std::path::{Path, PathBuf};

use byteorder::{NativeEndian, WriteBytesExt};

use terrain::format::{self, Version, HEADER_LEN};
use terrain::status::TileStatus;
use terrain::{TerrainDb, TRN_FILE_STATUS_SIZE};

/// Cell payload for a synthetic tile.
#[derive(Debug, Clone)]
pub enum CellSpec {
    NoData,
    Uniform(i16),
    Grid {
        lat_pts: u16,
        lon_pts: u16,
        pixel_centered: bool,
        samples: Vec<i16>,
        compression: Compression,
    },
}

/// Storage form for a grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Uncompressed,
    /// Bit-packed positive deltas above the cell minimum, 1-15 bits.
    BitPacked(u8),
}

/// A synthetic tile description. Cells beyond `cells.len()` are no-data.
#[derive(Debug, Clone)]
pub struct TileSpec {
    pub tile_lat: i32,
    pub tile_lon: i32,
    pub db: TerrainDb,
    pub version: Version,
    pub swapped: bool,
    pub cells: Vec<CellSpec>,
}

impl TileSpec {
    /// A V2 tile with every cell uniform at one elevation.
    pub fn uniform(db: TerrainDb, tile_lat: i32, tile_lon: i32, elevation: i16) -> Self {
        Self {
            tile_lat,
            tile_lon,
            db,
            version: Version::V2,
            swapped: false,
            cells: vec![CellSpec::Uniform(elevation); 64],
        }
    }
}

struct Sink {
    buf: Vec<u8>,
    swapped: bool,
}

impl Sink {
    fn u16(&mut self, v: u16) {
        let v = if self.swapped { v.swap_bytes() } else { v };
        self.buf.write_u16::<NativeEndian>(v).unwrap();
    }
    fn u32(&mut self, v: u32) {
        let v = if self.swapped { v.swap_bytes() } else { v };
        self.buf.write_u32::<NativeEndian>(v).unwrap();
    }
}

/// Write a tile file into `db_dir` and return its path.
pub fn write_tile(db_dir: &Path, spec: &TileSpec) -> PathBuf {
    assert!(spec.cells.len() <= 64, "a tile holds 64 cells");

    let magic = match spec.version {
        Version::V1 => format::MAGIC_V1,
        Version::V2 => format::MAGIC_V2,
        Version::V2User => format::MAGIC_V2_USER,
    };

    let mut flags = [0u8; 64];
    let mut min_elev = [0i16; 64];
    let mut max_elev = [0i16; 64];
    let mut lat_pts = [0u16; 64];
    let mut lon_pts = [0u16; 64];
    let mut rec_size = [0u32; 64];
    let mut rec_offset = [0u32; 64];
    let mut records: Vec<Vec<u8>> = vec![Vec::new(); 64];

    for (i, cell) in spec.cells.iter().enumerate() {
        match cell {
            CellSpec::NoData => {
                flags[i] = format::make_flag(true, false, 0);
            }
            CellSpec::Uniform(elev) => {
                flags[i] = format::make_flag(false, false, 0);
                min_elev[i] = *elev;
                max_elev[i] = *elev;
                lat_pts[i] = 1;
                lon_pts[i] = 1;
            }
            CellSpec::Grid {
                lat_pts: lp,
                lon_pts: np,
                pixel_centered,
                samples,
                compression,
            } => {
                assert_eq!(samples.len(), *lp as usize * *np as usize);
                let base = samples.iter().copied().min().unwrap_or(0);
                let top = samples.iter().copied().max().unwrap_or(0);
                min_elev[i] = base;
                max_elev[i] = top;
                lat_pts[i] = *lp;
                lon_pts[i] = *np;
                match compression {
                    Compression::Uncompressed => {
                        flags[i] = format::make_flag(false, *pixel_centered, 0);
                        let mut sink = Sink {
                            buf: Vec::new(),
                            swapped: spec.swapped,
                        };
                        for s in samples {
                            sink.u16(*s as u16);
                        }
                        records[i] = sink.buf;
                    }
                    Compression::BitPacked(bits) => {
                        assert!((1..=15).contains(bits));
                        flags[i] = format::make_flag(false, *pixel_centered, *bits);
                        let deltas: Vec<u16> = samples
                            .iter()
                            .map(|s| {
                                let d = (*s as i32 - base as i32) as u32;
                                assert!(d < (1 << bits), "delta {d} overflows {bits} bits");
                                d as u16
                            })
                            .collect();
                        records[i] = format::pack_deltas(&deltas, *bits as u32);
                    }
                }
            }
        }
    }

    // Records pack tail-end of the file after the header.
    let mut offset = HEADER_LEN as u32;
    for i in 0..64 {
        if !records[i].is_empty() {
            rec_size[i] = records[i].len() as u32;
            rec_offset[i] = offset;
            offset += rec_size[i];
        }
    }

    let mut sink = Sink {
        buf: Vec::with_capacity(offset as usize),
        swapped: spec.swapped,
    };
    sink.u32(magic);
    sink.u32(format::file_id(
        spec.version,
        spec.tile_lat,
        spec.tile_lon,
        spec.db,
    ));
    sink.buf.extend_from_slice(&flags);
    for v in min_elev {
        sink.u16(v as u16);
    }
    for v in max_elev {
        sink.u16(v as u16);
    }
    for v in lat_pts {
        sink.u16(v);
    }
    for v in lon_pts {
        sink.u16(v);
    }
    for v in rec_size {
        sink.u32(v);
    }
    for v in rec_offset {
        sink.u32(v);
    }
    assert_eq!(sink.buf.len(), HEADER_LEN);
    for rec in &records {
        sink.buf.extend_from_slice(rec);
    }

    std::fs::create_dir_all(db_dir).expect("create db dir");
    let path = db_dir.join(format::tile_file_name(spec.tile_lat, spec.tile_lon));
    let mut f = std::fs::File::create(&path).expect("create tile file");
    f.write_all(&sink.buf).expect("write tile file");
    path
}

/// Write a `blocks.idx` for a database directory. Tiles not listed are
/// no-data.
pub fn write_status_index(db_dir: &Path, entries: &[(i32, i32, TileStatus)]) {
    let mut bytes = vec![0u8; TRN_FILE_STATUS_SIZE];
    for &(tile_lat, tile_lon, status) in entries {
        let row = (tile_lat + 90) as usize;
        let col = (tile_lon + 180) as usize;
        bytes[row * 360 + col] = status.to_byte();
    }
    std::fs::create_dir_all(db_dir).expect("create db dir");
    std::fs::write(db_dir.join("blocks.idx"), bytes).expect("write status index");
}
