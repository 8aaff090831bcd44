//! Binary record layouts shared by the cache files.

use byteorder::{NativeEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read};

use study_common::Country;

use crate::error::{CacheError, CacheResult};

/// Magic number at the head (and, for desired files, tail) of cache files.
pub const CACHE_MAGIC: u32 = 0x5243_4831; // "RCH1"

/// Cache format version; a mismatch drops the cache silently.
pub const CACHE_VERSION: u32 = 3;

/// Cache file header length, bytes.
pub const HEADER_LEN: usize = 20;

/// Cell record length, bytes.
pub const CELL_RECORD_LEN: usize = 92;

/// Header common to every cache file of a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheHeader {
    pub version: u32,
    pub source_key: u32,
    /// Version stamp of the user terrain data when this cache was written.
    pub user_terrain_version: u32,
    /// Whether the writing run had user terrain enabled.
    pub user_terrain_requested: bool,
    /// Whether the writing run actually read user terrain.
    pub user_terrain_used: bool,
}

impl CacheHeader {
    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.write_u32::<NativeEndian>(CACHE_MAGIC).expect("vec write");
        out.write_u32::<NativeEndian>(self.version).expect("vec write");
        out.write_u32::<NativeEndian>(self.source_key).expect("vec write");
        out.write_u32::<NativeEndian>(self.user_terrain_version)
            .expect("vec write");
        out.push(self.user_terrain_requested as u8);
        out.push(self.user_terrain_used as u8);
        out.push(0);
        out.push(0);
    }

    pub fn read_from(path: &std::path::Path, buf: &[u8]) -> CacheResult<CacheHeader> {
        if buf.len() < HEADER_LEN {
            return Err(CacheError::corrupt(path, "truncated header"));
        }
        let mut c = Cursor::new(buf);
        let magic = c.read_u32::<NativeEndian>().expect("sized read");
        if magic != CACHE_MAGIC {
            return Err(CacheError::corrupt(path, format!("bad magic {magic:#010x}")));
        }
        let version = c.read_u32::<NativeEndian>().expect("sized read");
        let source_key = c.read_u32::<NativeEndian>().expect("sized read");
        let user_terrain_version = c.read_u32::<NativeEndian>().expect("sized read");
        let requested = buf[16] != 0;
        let used = buf[17] != 0;
        Ok(CacheHeader {
            version,
            source_key,
            user_terrain_version,
            user_terrain_requested: requested,
            user_terrain_used: used,
        })
    }
}

/// One cached study-point field record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellRecord {
    pub lat: f64,
    pub lon: f64,
    /// Cell south edge, arc-seconds (globally aligned in global mode).
    pub cell_lat: i32,
    /// Cell east edge, arc-seconds.
    pub cell_lon: i32,
    pub population: u32,
    pub households: u32,
    pub area_sqkm: f64,
    pub elevation_m: f64,
    pub bearing_deg: f64,
    pub reverse_bearing_deg: f64,
    pub distance_km: f64,
    pub field_dbu: f64,
    pub source_key: u32,
    pub country: u8,
    pub clutter: u8,
    pub percent_time: u8,
    /// Negative = uncalculated, zero or positive = calculated.
    pub status: i8,
    /// Running XOR checksum as of this record.
    pub checksum: u32,
}

impl CellRecord {
    pub fn country_enum(&self) -> Country {
        match self.country {
            1 => Country::Ca,
            2 => Country::Mx,
            _ => Country::Us,
        }
    }

    pub fn write_to(&self, out: &mut Vec<u8>) {
        let start = out.len();
        out.write_f64::<NativeEndian>(self.lat).expect("vec write");
        out.write_f64::<NativeEndian>(self.lon).expect("vec write");
        out.write_i32::<NativeEndian>(self.cell_lat).expect("vec write");
        out.write_i32::<NativeEndian>(self.cell_lon).expect("vec write");
        out.write_u32::<NativeEndian>(self.population).expect("vec write");
        out.write_u32::<NativeEndian>(self.households).expect("vec write");
        out.write_f64::<NativeEndian>(self.area_sqkm).expect("vec write");
        out.write_f64::<NativeEndian>(self.elevation_m).expect("vec write");
        out.write_f64::<NativeEndian>(self.bearing_deg).expect("vec write");
        out.write_f64::<NativeEndian>(self.reverse_bearing_deg)
            .expect("vec write");
        out.write_f64::<NativeEndian>(self.distance_km).expect("vec write");
        out.write_f64::<NativeEndian>(self.field_dbu).expect("vec write");
        out.write_u32::<NativeEndian>(self.source_key).expect("vec write");
        out.push(self.country);
        out.push(self.clutter);
        out.push(self.percent_time);
        out.push(self.status as u8);
        out.write_u32::<NativeEndian>(self.checksum).expect("vec write");
        debug_assert_eq!(out.len() - start, CELL_RECORD_LEN);
    }

    pub fn read_from<R: Read>(r: &mut R) -> std::io::Result<CellRecord> {
        let lat = r.read_f64::<NativeEndian>()?;
        let lon = r.read_f64::<NativeEndian>()?;
        let cell_lat = r.read_i32::<NativeEndian>()?;
        let cell_lon = r.read_i32::<NativeEndian>()?;
        let population = r.read_u32::<NativeEndian>()?;
        let households = r.read_u32::<NativeEndian>()?;
        let area_sqkm = r.read_f64::<NativeEndian>()?;
        let elevation_m = r.read_f64::<NativeEndian>()?;
        let bearing_deg = r.read_f64::<NativeEndian>()?;
        let reverse_bearing_deg = r.read_f64::<NativeEndian>()?;
        let distance_km = r.read_f64::<NativeEndian>()?;
        let field_dbu = r.read_f64::<NativeEndian>()?;
        let source_key = r.read_u32::<NativeEndian>()?;
        let mut bytes = [0u8; 4];
        r.read_exact(&mut bytes)?;
        let checksum = r.read_u32::<NativeEndian>()?;
        Ok(CellRecord {
            lat,
            lon,
            cell_lat,
            cell_lon,
            population,
            households,
            area_sqkm,
            elevation_m,
            bearing_deg,
            reverse_bearing_deg,
            distance_km,
            field_dbu,
            source_key,
            country: bytes[0],
            clutter: bytes[1],
            percent_time: bytes[2],
            status: bytes[3] as i8,
            checksum,
        })
    }
}

/// Country code byte for a record.
pub fn country_byte(country: Country) -> u8 {
    match country {
        Country::Us => 0,
        Country::Ca => 1,
        Country::Mx => 2,
    }
}

/// Compare two doubles by their 64-bit representations, treating a spread
/// of up to 16 ULPs as equal. Used when checking re-read cached values
/// against live ones.
pub fn is_diff(a: f64, b: f64) -> bool {
    let ia = a.to_bits() as i64 as i128;
    let ib = b.to_bits() as i64 as i128;
    (ia - ib).abs() > 16
}

/// Write helpers shared by the encoders.
pub(crate) fn write_f64_vec(out: &mut Vec<u8>, v: f64) {
    out.write_f64::<NativeEndian>(v).expect("vec write");
}

pub(crate) fn write_u32_vec(out: &mut Vec<u8>, v: u32) {
    out.write_u32::<NativeEndian>(v).expect("vec write");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> CellRecord {
        CellRecord {
            lat: 39.1234,
            lon: 105.5678,
            cell_lat: 140_850,
            cell_lon: 380_120,
            population: 412,
            households: 170,
            area_sqkm: 3.95,
            elevation_m: 1621.5,
            bearing_deg: 123.4,
            reverse_bearing_deg: 303.9,
            distance_km: 87.2,
            field_dbu: 41.7,
            source_key: 55,
            country: 0,
            clutter: 4,
            percent_time: 10,
            status: 0,
            checksum: 0xdead_beef,
        }
    }

    #[test]
    fn test_cell_record_round_trip() {
        let rec = sample_record();
        let mut buf = Vec::new();
        rec.write_to(&mut buf);
        assert_eq!(buf.len(), CELL_RECORD_LEN);
        let back = CellRecord::read_from(&mut Cursor::new(&buf)).unwrap();
        assert_eq!(rec, back);
    }

    #[test]
    fn test_header_round_trip() {
        let header = CacheHeader {
            version: CACHE_VERSION,
            source_key: 99,
            user_terrain_version: 7,
            user_terrain_requested: true,
            user_terrain_used: false,
        };
        let mut buf = Vec::new();
        header.write_to(&mut buf);
        assert_eq!(buf.len(), HEADER_LEN);
        let back = CacheHeader::read_from(std::path::Path::new("x"), &buf).unwrap();
        assert_eq!(header, back);
    }

    #[test]
    fn test_header_rejects_bad_magic() {
        let mut buf = vec![0u8; HEADER_LEN];
        buf[0] = 0x12;
        let r = CacheHeader::read_from(std::path::Path::new("x"), &buf);
        assert!(matches!(r, Err(CacheError::Corrupt { .. })));
    }

    #[test]
    fn test_is_diff_ulp_window() {
        let a = 1.0f64;
        let mut b = a;
        for _ in 0..16 {
            b = f64::from_bits(b.to_bits() + 1);
        }
        assert!(!is_diff(a, b), "16 ULPs apart is still equal");
        let c = f64::from_bits(b.to_bits() + 1);
        assert!(is_diff(a, c), "17 ULPs apart differs");
        assert!(!is_diff(2.5, 2.5));
        assert!(is_diff(2.5, 2.5000001));
    }
}
