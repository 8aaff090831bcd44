//! Terrain tile file format.
//!
//! One file per 1x1-degree tile, holding 64 cells of 7.5 arc-minutes:
//!
//! ```text
//! offset    0  u32        magic (version and byte order)
//! offset    4  u32        file id = latIndex*10000 + lonIndex*10 + dbNumber
//! offset    8  [u8; 64]   cell flag bytes
//! offset   72  [i16; 64]  per-cell minimum elevation, metres
//! offset  200  [i16; 64]  per-cell maximum elevation, metres
//! offset  328  [u16; 64]  per-cell latitude point count
//! offset  456  [u16; 64]  per-cell longitude point count
//! offset  584  [u32; 64]  per-cell record size, bytes
//! offset  840  [u32; 64]  per-cell record offset from start of file
//! offset 1096  cell data records, packed tail-end
//! ```
//!
//! The magic doubles as the byte-order detector: a reader seeing a known
//! magic byte-swapped swaps every 16/32-bit field it reads. Cell flag bits:
//! bit 0 = no data, bit 1 = pixel-centred (vs grid-intersection) samples,
//! bits 2-5 = compression code (0 = uncompressed 16-bit samples, 1-15 =
//! bit-packed positive deltas of that many bits above the cell minimum). A
//! 1x1 point count marks a uniform cell whose single elevation is the cell
//! minimum; such cells carry no data record.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use byteorder::{ByteOrder, NativeEndian};

use crate::error::{TerrainError, TerrainResult};
use crate::TerrainDb;

/// Header length in bytes.
pub const HEADER_LEN: usize = 1096;

/// Magic for legacy files covering the north-west hemisphere quadrant only.
pub const MAGIC_V1: u32 = 0x5452_4e31; // "TRN1"
/// Magic for current files with signed hemisphere indices.
pub const MAGIC_V2: u32 = 0x5452_4e32; // "TRN2"
/// Magic for user-supplied terrain files (V2 layout).
pub const MAGIC_V2_USER: u32 = 0x5452_4e55; // "TRNU"

/// Cell flag bit: cell has no data in this database.
pub const FLAG_NO_DATA: u8 = 0x01;
/// Cell flag bit: samples are pixel-centred, with a half-sample offset and
/// overlap rows on the south/east edges.
pub const FLAG_PIXEL_CENTERED: u8 = 0x02;

/// Extract the 4-bit compression code from a cell flag byte.
pub fn compression_code(flag: u8) -> u8 {
    (flag >> 2) & 0x0f
}

/// Compose a cell flag byte.
pub fn make_flag(no_data: bool, pixel_centered: bool, compression: u8) -> u8 {
    let mut flag = (compression & 0x0f) << 2;
    if no_data {
        flag |= FLAG_NO_DATA;
    }
    if pixel_centered {
        flag |= FLAG_PIXEL_CENTERED;
    }
    flag
}

/// File format version, decoded from the magic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    V1,
    V2,
    V2User,
}

/// Parsed tile header.
#[derive(Debug, Clone)]
pub struct TileHeader {
    pub file_id: u32,
    pub flags: [u8; 64],
    pub min_elev: [i16; 64],
    pub max_elev: [i16; 64],
    pub lat_pts: [u16; 64],
    pub lon_pts: [u16; 64],
    pub rec_size: [u32; 64],
    pub rec_offset: [u32; 64],
}

/// Result of reading one cell from a tile.
#[derive(Debug, Clone, PartialEq)]
pub enum CellRead {
    /// The cell has no data in this database.
    NoData,
    /// Uniform cell: one elevation for the whole 7.5-minute block.
    Uniform(i16),
    /// A decompressed sample grid, row-major from the south-east corner.
    Grid {
        lat_pts: u16,
        lon_pts: u16,
        pixel_centered: bool,
        samples: Vec<i16>,
    },
}

/// Expected file id for a tile.
///
/// V2 indices are offset to stay non-negative over the full globe; V1 files
/// predate the south/east hemispheres and use the raw north/west degrees.
pub fn file_id(version: Version, tile_lat: i32, tile_lon: i32, db: TerrainDb) -> u32 {
    let (lat_index, lon_index) = match version {
        Version::V1 => (tile_lat, tile_lon),
        Version::V2 | Version::V2User => (tile_lat + 90, tile_lon + 180),
    };
    (lat_index as u32) * 10_000 + (lon_index as u32) * 10 + db.number()
}

/// Tile file name under the database directory, e.g. `n39w105.trn`.
pub fn tile_file_name(tile_lat: i32, tile_lon: i32) -> String {
    let ns = if tile_lat < 0 { 's' } else { 'n' };
    let ew = if tile_lon < 0 { 'e' } else { 'w' };
    format!("{}{:02}{}{:03}.trn", ns, tile_lat.abs(), ew, tile_lon.abs())
}

fn read_u16_at(buf: &[u8], off: usize, swapped: bool) -> u16 {
    let v = NativeEndian::read_u16(&buf[off..off + 2]);
    if swapped {
        v.swap_bytes()
    } else {
        v
    }
}

fn read_u32_at(buf: &[u8], off: usize, swapped: bool) -> u32 {
    let v = NativeEndian::read_u32(&buf[off..off + 4]);
    if swapped {
        v.swap_bytes()
    } else {
        v
    }
}

/// An open tile file with its parsed header.
#[derive(Debug)]
pub struct TileFile {
    file: File,
    path: PathBuf,
    pub version: Version,
    pub swapped: bool,
    pub header: TileHeader,
}

impl TileFile {
    /// Open a tile file, detect version and byte order from the magic, and
    /// validate the file id against the tile this path was derived from.
    pub fn open(path: &Path, tile_lat: i32, tile_lon: i32, db: TerrainDb) -> TerrainResult<Self> {
        let mut file = File::open(path).map_err(|source| match source.kind() {
            std::io::ErrorKind::NotFound => TerrainError::MissingFile {
                file_id: file_id(Version::V2, tile_lat, tile_lon, db),
            },
            _ => TerrainError::Io {
                path: path.to_path_buf(),
                source,
            },
        })?;

        let mut buf = vec![0u8; HEADER_LEN];
        file.read_exact(&mut buf).map_err(|source| TerrainError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let raw_magic = NativeEndian::read_u32(&buf[0..4]);
        let (version, swapped) = match raw_magic {
            MAGIC_V1 => (Version::V1, false),
            MAGIC_V2 => (Version::V2, false),
            MAGIC_V2_USER => (Version::V2User, false),
            m if m == MAGIC_V1.swap_bytes() => (Version::V1, true),
            m if m == MAGIC_V2.swap_bytes() => (Version::V2, true),
            m if m == MAGIC_V2_USER.swap_bytes() => (Version::V2User, true),
            m => {
                return Err(TerrainError::BadMagic {
                    path: path.to_path_buf(),
                    magic: m,
                })
            }
        };

        let found_id = read_u32_at(&buf, 4, swapped);
        let expected = file_id(version, tile_lat, tile_lon, db);
        if found_id != expected {
            return Err(TerrainError::BadFileId {
                path: path.to_path_buf(),
                expected,
                found: found_id,
            });
        }

        let mut header = TileHeader {
            file_id: found_id,
            flags: [0; 64],
            min_elev: [0; 64],
            max_elev: [0; 64],
            lat_pts: [0; 64],
            lon_pts: [0; 64],
            rec_size: [0; 64],
            rec_offset: [0; 64],
        };
        header.flags.copy_from_slice(&buf[8..72]);
        for i in 0..64 {
            header.min_elev[i] = read_u16_at(&buf, 72 + i * 2, swapped) as i16;
            header.max_elev[i] = read_u16_at(&buf, 200 + i * 2, swapped) as i16;
            header.lat_pts[i] = read_u16_at(&buf, 328 + i * 2, swapped);
            header.lon_pts[i] = read_u16_at(&buf, 456 + i * 2, swapped);
            header.rec_size[i] = read_u32_at(&buf, 584 + i * 4, swapped);
            header.rec_offset[i] = read_u32_at(&buf, 840 + i * 4, swapped);
        }

        Ok(Self {
            file,
            path: path.to_path_buf(),
            version,
            swapped,
            header,
        })
    }

    /// Read and decompress one cell (0..64) from the tile.
    pub fn read_cell(&mut self, cell: usize) -> TerrainResult<CellRead> {
        let flag = self.header.flags[cell];
        if flag & FLAG_NO_DATA != 0 {
            return Ok(CellRead::NoData);
        }

        let lat_pts = self.header.lat_pts[cell];
        let lon_pts = self.header.lon_pts[cell];
        let base = self.header.min_elev[cell];
        if lat_pts == 1 && lon_pts == 1 {
            return Ok(CellRead::Uniform(base));
        }

        let count = lat_pts as usize * lon_pts as usize;
        let size = self.header.rec_size[cell] as usize;
        let mut raw = vec![0u8; size];
        self.file
            .seek(SeekFrom::Start(self.header.rec_offset[cell] as u64))
            .and_then(|_| self.file.read_exact(&mut raw))
            .map_err(|source| match source.kind() {
                std::io::ErrorKind::UnexpectedEof => TerrainError::Truncated {
                    path: self.path.clone(),
                    wanted: size,
                    got: 0,
                },
                _ => TerrainError::Io {
                    path: self.path.clone(),
                    source,
                },
            })?;

        let code = compression_code(flag);
        let samples = match code {
            0 => {
                if size < count * 2 {
                    return Err(TerrainError::Truncated {
                        path: self.path.clone(),
                        wanted: count * 2,
                        got: size,
                    });
                }
                let mut out = Vec::with_capacity(count);
                for i in 0..count {
                    out.push(read_u16_at(&raw, i * 2, self.swapped) as i16);
                }
                out
            }
            bits @ 1..=15 => {
                let deltas = unpack_deltas(&raw, bits as u32, count).ok_or_else(|| {
                    TerrainError::Truncated {
                        path: self.path.clone(),
                        wanted: (count * bits as usize).div_ceil(8),
                        got: size,
                    }
                })?;
                deltas
                    .into_iter()
                    .map(|d| base.wrapping_add(d as i16))
                    .collect()
            }
            code => {
                return Err(TerrainError::UnknownCompression {
                    path: self.path.clone(),
                    code,
                })
            }
        };

        Ok(CellRead::Grid {
            lat_pts,
            lon_pts,
            pixel_centered: flag & FLAG_PIXEL_CENTERED != 0,
            samples,
        })
    }
}

/// Extract `count` bit-packed values of `bits` bits each from a byte stream.
///
/// Values are packed most-significant-bit first; each sample is pulled from a
/// 32-bit window loaded at the sample's byte offset, so a group of 8 samples
/// advances the stream by exactly `bits` bytes. Returns `None` when the
/// stream is too short.
pub fn unpack_deltas(data: &[u8], bits: u32, count: usize) -> Option<Vec<u16>> {
    let mask = (1u32 << bits) - 1;
    let total_bits = data.len() * 8;
    let mut out = Vec::with_capacity(count);
    let mut bitpos = 0usize;
    for _ in 0..count {
        if bitpos + bits as usize > total_bits {
            return None;
        }
        let byte = bitpos >> 3;
        let phase = (bitpos & 7) as u32;
        let mut window = 0u32;
        for k in 0..4 {
            window <<= 8;
            window |= *data.get(byte + k).unwrap_or(&0) as u32;
        }
        let shift = 32 - bits - phase;
        out.push(((window >> shift) & mask) as u16);
        bitpos += bits as usize;
    }
    Some(out)
}

/// Pack values into the bit stream format read by [`unpack_deltas`].
pub fn pack_deltas(values: &[u16], bits: u32) -> Vec<u8> {
    let total_bits = values.len() * bits as usize;
    let mut out = vec![0u8; total_bits.div_ceil(8)];
    let mut bitpos = 0usize;
    for &v in values {
        let v = (v as u32) & ((1u32 << bits) - 1);
        for b in 0..bits {
            // Bit b of the sample, MSB first.
            if v & (1 << (bits - 1 - b)) != 0 {
                let pos = bitpos + b as usize;
                out[pos >> 3] |= 0x80 >> (pos & 7);
            }
        }
        bitpos += bits as usize;
    }
    out
}
