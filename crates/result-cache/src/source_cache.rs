//! Source cache records: full parameter serialization and live comparison.
//!
//! The `source/<key>` file holds the header, one full record for the source,
//! and for DTS parents a second full record for the reference facility plus
//! one abbreviated record per child. On read, every parameter is compared
//! field by field against the live source; any mismatch drops the whole
//! cache for that source.

use byteorder::{NativeEndian, ReadBytesExt};
use std::io::Cursor;
use std::path::Path;

use study_common::{
    Band, Contour, Country, DtsParent, EmissionMask, FmClass, Geography, GeographyKind,
    HorizontalPattern, LatLon, MatrixPattern, Sector, ServiceKind, Source, VerticalPattern,
};

use crate::error::{CacheError, CacheResult};
use crate::records::{country_byte, is_diff, write_f64_vec, write_u32_vec};

/// Abbreviated record for one DTS child.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChildBrief {
    pub key: u32,
    pub lat: f64,
    pub lon: f64,
    pub erp_kw: f64,
    pub height_amsl: f64,
    pub height_aat: f64,
}

impl ChildBrief {
    pub fn of(source: &Source) -> ChildBrief {
        ChildBrief {
            key: source.key,
            lat: source.position.lat,
            lon: source.position.lon,
            erp_kw: source.erp_kw,
            height_amsl: source.height_amsl,
            height_aat: source.height_aat,
        }
    }

    pub fn matches(&self, live: &Source) -> bool {
        self.key == live.key
            && !is_diff(self.lat, live.position.lat)
            && !is_diff(self.lon, live.position.lon)
            && !is_diff(self.erp_kw, live.erp_kw)
            && !is_diff(self.height_amsl, live.height_amsl)
            && !is_diff(self.height_aat, live.height_aat)
    }
}

fn band_byte(band: Band) -> u8 {
    match band {
        Band::VhfLow => 0,
        Band::VhfHigh => 1,
        Band::Uhf => 2,
        Band::Fm => 3,
        Band::Wireless => 4,
    }
}

fn byte_band(b: u8) -> Option<Band> {
    Some(match b {
        0 => Band::VhfLow,
        1 => Band::VhfHigh,
        2 => Band::Uhf,
        3 => Band::Fm,
        4 => Band::Wireless,
        _ => return None,
    })
}

fn byte_country(b: u8) -> Option<Country> {
    Some(match b {
        0 => Country::Us,
        1 => Country::Ca,
        2 => Country::Mx,
        _ => return None,
    })
}

fn mask_byte(mask: EmissionMask) -> u8 {
    match mask {
        EmissionMask::Full => 0,
        EmissionMask::Simple => 1,
        EmissionMask::Stringent => 2,
    }
}

fn byte_mask(b: u8) -> Option<EmissionMask> {
    Some(match b {
        0 => EmissionMask::Full,
        1 => EmissionMask::Simple,
        2 => EmissionMask::Stringent,
        _ => return None,
    })
}

fn class_byte(class: FmClass) -> u8 {
    match class {
        FmClass::A => 0,
        FmClass::B1 => 1,
        FmClass::B => 2,
        FmClass::C3 => 3,
        FmClass::C2 => 4,
        FmClass::C1 => 5,
        FmClass::C0 => 6,
        FmClass::C => 7,
        FmClass::D => 8,
    }
}

fn byte_class(b: u8) -> Option<FmClass> {
    Some(match b {
        0 => FmClass::A,
        1 => FmClass::B1,
        2 => FmClass::B,
        3 => FmClass::C3,
        4 => FmClass::C2,
        5 => FmClass::C1,
        6 => FmClass::C0,
        7 => FmClass::C,
        8 => FmClass::D,
        _ => return None,
    })
}

/// Append a full source record to a buffer.
pub fn encode_source(out: &mut Vec<u8>, source: &Source) {
    write_u32_vec(out, source.key);
    out.push(band_byte(source.band));
    out.push(country_byte(source.country));

    match &source.service {
        ServiceKind::Tv {
            channel,
            emission_mask,
            dts,
        } => {
            out.push(0);
            out.extend_from_slice(&channel.to_ne_bytes());
            out.push(mask_byte(*emission_mask));
            match dts {
                Some(d) => {
                    out.push(1);
                    write_u32_vec(out, d.children.len() as u32);
                    for c in &d.children {
                        write_u32_vec(out, *c);
                    }
                    write_u32_vec(out, d.reference_facility);
                }
                None => out.push(0),
            }
        }
        ServiceKind::Fm { channel, class } => {
            out.push(1);
            out.extend_from_slice(&channel.to_ne_bytes());
            out.push(class_byte(*class));
        }
        ServiceKind::Wireless { frequency_mhz } => {
            out.push(2);
            write_f64_vec(out, *frequency_mhz);
        }
    }

    write_f64_vec(out, source.position.lat);
    write_f64_vec(out, source.position.lon);
    write_f64_vec(out, source.erp_kw);
    write_f64_vec(out, source.height_amsl);
    write_f64_vec(out, source.height_aat);

    match &source.horizontal_pattern {
        Some(p) => {
            out.push(1);
            for v in p.values() {
                write_f64_vec(out, *v);
            }
        }
        None => out.push(0),
    }

    match &source.vertical_pattern {
        Some(p) => {
            out.push(1);
            write_u32_vec(out, p.entries().len() as u32);
            for (a, f) in p.entries() {
                write_f64_vec(out, *a);
                write_f64_vec(out, *f);
            }
        }
        None => out.push(0),
    }

    match &source.matrix_pattern {
        Some(m) => {
            out.push(1);
            encode_matrix(out, m);
        }
        None => out.push(0),
    }

    match &source.contour {
        Some(c) => {
            out.push(1);
            write_u32_vec(out, c.len() as u32);
            for d in c.distances() {
                write_f64_vec(out, *d);
            }
        }
        None => out.push(0),
    }

    match &source.geography {
        Some(g) => {
            out.push(1);
            encode_geography(out, g);
        }
        None => out.push(0),
    }
}

fn encode_matrix(out: &mut Vec<u8>, matrix: &MatrixPattern) {
    // Matrix patterns re-encode through their lookup surface: tabulated as
    // (azimuth, vertical pattern) slices.
    let slices = matrix_slices(matrix);
    write_u32_vec(out, slices.len() as u32);
    for (az, entries) in slices {
        write_f64_vec(out, az);
        write_u32_vec(out, entries.len() as u32);
        for (a, f) in entries {
            write_f64_vec(out, a);
            write_f64_vec(out, f);
        }
    }
}

fn matrix_slices(matrix: &MatrixPattern) -> Vec<(f64, Vec<(f64, f64)>)> {
    matrix
        .slices()
        .iter()
        .map(|(az, vp)| (*az, vp.entries().to_vec()))
        .collect()
}

fn encode_geography(out: &mut Vec<u8>, geography: &Geography) {
    match geography.kind() {
        GeographyKind::Circle { radius_km } => {
            out.push(0);
            write_f64_vec(out, *radius_km);
        }
        GeographyKind::Box {
            width_km,
            height_km,
        } => {
            out.push(1);
            write_f64_vec(out, *width_km);
            write_f64_vec(out, *height_km);
        }
        GeographyKind::Sectors(sectors) => {
            out.push(2);
            write_u32_vec(out, sectors.len() as u32);
            for s in sectors {
                write_f64_vec(out, s.azimuth);
                write_f64_vec(out, s.radius_km);
            }
        }
        GeographyKind::Polygon(vertices) => {
            out.push(3);
            write_u32_vec(out, vertices.len() as u32);
            for v in vertices {
                write_f64_vec(out, v.lat);
                write_f64_vec(out, v.lon);
            }
        }
    }
}

/// Append an abbreviated child record.
pub fn encode_child(out: &mut Vec<u8>, brief: &ChildBrief) {
    write_u32_vec(out, brief.key);
    write_f64_vec(out, brief.lat);
    write_f64_vec(out, brief.lon);
    write_f64_vec(out, brief.erp_kw);
    write_f64_vec(out, brief.height_amsl);
    write_f64_vec(out, brief.height_aat);
}

fn bad(path: &Path, what: &str) -> CacheError {
    CacheError::corrupt(path, format!("bad source record: {what}"))
}

/// Decode one full source record from a cursor.
pub fn decode_source(path: &Path, c: &mut Cursor<&[u8]>) -> CacheResult<Source> {
    let io = |_e: std::io::Error| CacheError::corrupt(path, "truncated source record");

    let key = c.read_u32::<NativeEndian>().map_err(io)?;
    let band = byte_band(c.read_u8().map_err(io)?).ok_or_else(|| bad(path, "band"))?;
    let country = byte_country(c.read_u8().map_err(io)?).ok_or_else(|| bad(path, "country"))?;

    let service = match c.read_u8().map_err(io)? {
        0 => {
            let channel = c.read_u16::<NativeEndian>().map_err(io)?;
            let emission_mask =
                byte_mask(c.read_u8().map_err(io)?).ok_or_else(|| bad(path, "emission mask"))?;
            let dts = if c.read_u8().map_err(io)? != 0 {
                let count = c.read_u32::<NativeEndian>().map_err(io)? as usize;
                if count > 64 {
                    return Err(bad(path, "dts child count"));
                }
                let mut children = Vec::with_capacity(count);
                for _ in 0..count {
                    children.push(c.read_u32::<NativeEndian>().map_err(io)?);
                }
                let reference = c.read_u32::<NativeEndian>().map_err(io)?;
                Some(DtsParent::new(children, reference).map_err(|_| bad(path, "dts"))?)
            } else {
                None
            };
            ServiceKind::Tv {
                channel,
                emission_mask,
                dts,
            }
        }
        1 => {
            let channel = c.read_u16::<NativeEndian>().map_err(io)?;
            let class =
                byte_class(c.read_u8().map_err(io)?).ok_or_else(|| bad(path, "fm class"))?;
            ServiceKind::Fm { channel, class }
        }
        2 => ServiceKind::Wireless {
            frequency_mhz: c.read_f64::<NativeEndian>().map_err(io)?,
        },
        _ => return Err(bad(path, "service tag")),
    };

    let lat = c.read_f64::<NativeEndian>().map_err(io)?;
    let lon = c.read_f64::<NativeEndian>().map_err(io)?;
    let erp_kw = c.read_f64::<NativeEndian>().map_err(io)?;
    let height_amsl = c.read_f64::<NativeEndian>().map_err(io)?;
    let height_aat = c.read_f64::<NativeEndian>().map_err(io)?;

    let horizontal_pattern = if c.read_u8().map_err(io)? != 0 {
        let mut values = Vec::with_capacity(360);
        for _ in 0..360 {
            values.push(c.read_f64::<NativeEndian>().map_err(io)?);
        }
        Some(HorizontalPattern::new(values).map_err(|_| bad(path, "hpat"))?)
    } else {
        None
    };

    let vertical_pattern = if c.read_u8().map_err(io)? != 0 {
        Some(decode_vpat(path, c)?)
    } else {
        None
    };

    let matrix_pattern = if c.read_u8().map_err(io)? != 0 {
        let count = c.read_u32::<NativeEndian>().map_err(io)? as usize;
        if count > 360 {
            return Err(bad(path, "matrix slice count"));
        }
        let mut slices = Vec::with_capacity(count);
        for _ in 0..count {
            let az = c.read_f64::<NativeEndian>().map_err(io)?;
            let vp = decode_vpat(path, c)?;
            slices.push((az, vp));
        }
        Some(MatrixPattern::new(slices).map_err(|_| bad(path, "matrix"))?)
    } else {
        None
    };

    let contour = if c.read_u8().map_err(io)? != 0 {
        let count = c.read_u32::<NativeEndian>().map_err(io)? as usize;
        if count > 3600 {
            return Err(bad(path, "contour count"));
        }
        let mut distances = Vec::with_capacity(count);
        for _ in 0..count {
            distances.push(c.read_f64::<NativeEndian>().map_err(io)?);
        }
        Some(Contour::new(distances).map_err(|_| bad(path, "contour"))?)
    } else {
        None
    };

    let geography = if c.read_u8().map_err(io)? != 0 {
        Some(decode_geography(path, c)?)
    } else {
        None
    };

    Ok(Source {
        key,
        position: LatLon::new(lat, lon),
        erp_kw,
        height_amsl,
        height_aat,
        horizontal_pattern,
        vertical_pattern,
        matrix_pattern,
        band,
        country,
        service,
        contour,
        geography,
    })
}

fn decode_vpat(path: &Path, c: &mut Cursor<&[u8]>) -> CacheResult<VerticalPattern> {
    let io = |_e: std::io::Error| CacheError::corrupt(path, "truncated source record");
    let count = c.read_u32::<NativeEndian>().map_err(io)? as usize;
    if count > 3600 {
        return Err(bad(path, "vpat count"));
    }
    let mut entries = Vec::with_capacity(count);
    for _ in 0..count {
        let a = c.read_f64::<NativeEndian>().map_err(io)?;
        let f = c.read_f64::<NativeEndian>().map_err(io)?;
        entries.push((a, f));
    }
    VerticalPattern::new(entries).map_err(|_| bad(path, "vpat"))
}

fn decode_geography(path: &Path, c: &mut Cursor<&[u8]>) -> CacheResult<Geography> {
    let io = |_e: std::io::Error| CacheError::corrupt(path, "truncated source record");
    let kind = match c.read_u8().map_err(io)? {
        0 => GeographyKind::Circle {
            radius_km: c.read_f64::<NativeEndian>().map_err(io)?,
        },
        1 => GeographyKind::Box {
            width_km: c.read_f64::<NativeEndian>().map_err(io)?,
            height_km: c.read_f64::<NativeEndian>().map_err(io)?,
        },
        2 => {
            let count = c.read_u32::<NativeEndian>().map_err(io)? as usize;
            if count > 360 {
                return Err(bad(path, "sector count"));
            }
            let mut sectors = Vec::with_capacity(count);
            for _ in 0..count {
                sectors.push(Sector {
                    azimuth: c.read_f64::<NativeEndian>().map_err(io)?,
                    radius_km: c.read_f64::<NativeEndian>().map_err(io)?,
                });
            }
            GeographyKind::Sectors(sectors)
        }
        3 => {
            let count = c.read_u32::<NativeEndian>().map_err(io)? as usize;
            if count > 100_000 {
                return Err(bad(path, "polygon count"));
            }
            let mut vertices = Vec::with_capacity(count);
            for _ in 0..count {
                let lat = c.read_f64::<NativeEndian>().map_err(io)?;
                let lon = c.read_f64::<NativeEndian>().map_err(io)?;
                vertices.push(LatLon::new(lat, lon));
            }
            GeographyKind::Polygon(vertices)
        }
        _ => return Err(bad(path, "geography kind")),
    };
    Geography::new(kind).map_err(|_| bad(path, "geography"))
}

/// Decode an abbreviated child record.
pub fn decode_child(path: &Path, c: &mut Cursor<&[u8]>) -> CacheResult<ChildBrief> {
    let io = |_e: std::io::Error| CacheError::corrupt(path, "truncated child record");
    Ok(ChildBrief {
        key: c.read_u32::<NativeEndian>().map_err(io)?,
        lat: c.read_f64::<NativeEndian>().map_err(io)?,
        lon: c.read_f64::<NativeEndian>().map_err(io)?,
        erp_kw: c.read_f64::<NativeEndian>().map_err(io)?,
        height_amsl: c.read_f64::<NativeEndian>().map_err(io)?,
        height_aat: c.read_f64::<NativeEndian>().map_err(io)?,
    })
}

/// Field-by-field comparison of a cached source against the live one.
/// Doubles compare through the 16-ULP window; everything else exactly.
pub fn sources_match(cached: &Source, live: &Source) -> bool {
    if cached.key != live.key
        || cached.band != live.band
        || cached.country != live.country
    {
        return false;
    }
    if is_diff(cached.position.lat, live.position.lat)
        || is_diff(cached.position.lon, live.position.lon)
        || is_diff(cached.erp_kw, live.erp_kw)
        || is_diff(cached.height_amsl, live.height_amsl)
        || is_diff(cached.height_aat, live.height_aat)
    {
        return false;
    }
    if !service_matches(&cached.service, &live.service) {
        return false;
    }
    if !option_matches(&cached.horizontal_pattern, &live.horizontal_pattern, |a, b| {
        a.values().len() == b.values().len()
            && a.values()
                .iter()
                .zip(b.values())
                .all(|(x, y)| !is_diff(*x, *y))
    }) {
        return false;
    }
    if !option_matches(&cached.vertical_pattern, &live.vertical_pattern, vpat_matches) {
        return false;
    }
    if !option_matches(&cached.matrix_pattern, &live.matrix_pattern, |a, b| {
        let sa = a.slices();
        let sb = b.slices();
        sa.len() == sb.len()
            && sa.iter().zip(sb).all(|((aza, vpa), (azb, vpb))| {
                !is_diff(*aza, *azb) && vpat_matches(vpa, vpb)
            })
    }) {
        return false;
    }
    if !option_matches(&cached.contour, &live.contour, |a, b| {
        a.len() == b.len()
            && a.distances()
                .iter()
                .zip(b.distances())
                .all(|(x, y)| !is_diff(*x, *y))
    }) {
        return false;
    }
    option_matches(&cached.geography, &live.geography, geography_matches)
}

fn option_matches<T>(a: &Option<T>, b: &Option<T>, eq: impl Fn(&T, &T) -> bool) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(x), Some(y)) => eq(x, y),
        _ => false,
    }
}

fn vpat_matches(a: &VerticalPattern, b: &VerticalPattern) -> bool {
    a.entries().len() == b.entries().len()
        && a.entries()
            .iter()
            .zip(b.entries())
            .all(|((aa, fa), (ab, fb))| !is_diff(*aa, *ab) && !is_diff(*fa, *fb))
}

fn service_matches(a: &ServiceKind, b: &ServiceKind) -> bool {
    match (a, b) {
        (
            ServiceKind::Tv {
                channel: ca,
                emission_mask: ma,
                dts: da,
            },
            ServiceKind::Tv {
                channel: cb,
                emission_mask: mb,
                dts: db,
            },
        ) => ca == cb && ma == mb && da == db,
        (
            ServiceKind::Fm {
                channel: ca,
                class: la,
            },
            ServiceKind::Fm {
                channel: cb,
                class: lb,
            },
        ) => ca == cb && la == lb,
        (
            ServiceKind::Wireless { frequency_mhz: fa },
            ServiceKind::Wireless { frequency_mhz: fb },
        ) => !is_diff(*fa, *fb),
        _ => false,
    }
}

fn geography_matches(a: &Geography, b: &Geography) -> bool {
    match (a.kind(), b.kind()) {
        (GeographyKind::Circle { radius_km: ra }, GeographyKind::Circle { radius_km: rb }) => {
            !is_diff(*ra, *rb)
        }
        (
            GeographyKind::Box {
                width_km: wa,
                height_km: ha,
            },
            GeographyKind::Box {
                width_km: wb,
                height_km: hb,
            },
        ) => !is_diff(*wa, *wb) && !is_diff(*ha, *hb),
        (GeographyKind::Sectors(sa), GeographyKind::Sectors(sb)) => {
            sa.len() == sb.len()
                && sa.iter().zip(sb).all(|(x, y)| {
                    !is_diff(x.azimuth, y.azimuth) && !is_diff(x.radius_km, y.radius_km)
                })
        }
        (GeographyKind::Polygon(pa), GeographyKind::Polygon(pb)) => {
            pa.len() == pb.len()
                && pa
                    .iter()
                    .zip(pb)
                    .all(|(x, y)| !is_diff(x.lat, y.lat) && !is_diff(x.lon, y.lon))
        }
        _ => false,
    }
}
