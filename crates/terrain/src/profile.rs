//! Terrain profile extraction and HAAT.
//!
//! A profile walks a radial in 16-km segments: only segment endpoints pay
//! for the full spherical destination-point calculation, and points inside a
//! segment advance by linear latitude/longitude deltas. Database fallback is
//! decided once per cell transition, never inside a cell.

use study_common::{coordinates, LatLon};

use crate::cache::TerrainCache;
use crate::error::TerrainResult;
use crate::{TerrainDb, TRN_CELLS_PER_DEGREE};

/// Segment length for spherical anchor points, km.
const SEGMENT_KM: f64 = 16.0;

/// Radial averaging window for HAAT, km (inner edge, outer edge).
const HAAT_WINDOW_KM: (f64, f64) = (3.0, 16.0);

/// Sample spacing along HAAT radials, points per km.
const HAAT_POINTS_PER_KM: f64 = 2.0;

/// One profile request.
#[derive(Debug, Clone)]
pub struct ProfileRequest {
    pub start: LatLon,
    pub bearing: f64,
    pub distance_km: f64,
    pub points_per_km: f64,
    pub km_per_degree: f64,
}

/// Extract elevations along a radial. The result holds
/// `round(distance * points_per_km) + 1` points including both endpoints.
pub fn profile(cache: &mut TerrainCache, req: &ProfileRequest) -> TerrainResult<Vec<f64>> {
    let n = (req.distance_km * req.points_per_km).round() as usize + 1;
    let step_km = 1.0 / req.points_per_km;
    let pts_per_seg = ((SEGMENT_KM * req.points_per_km).round() as usize).max(1);

    // Lay out point coordinates segment by segment.
    let mut points = Vec::with_capacity(n);
    let mut seg_start = 0usize;
    while seg_start < n.saturating_sub(1) {
        let seg_end = (seg_start + pts_per_seg).min(n - 1);
        let a = anchor(req, seg_start as f64 * step_km);
        let b = anchor(req, seg_end as f64 * step_km);
        let span = (seg_end - seg_start) as f64;
        for i in seg_start..seg_end {
            let t = (i - seg_start) as f64 / span;
            points.push(LatLon::new(
                a.lat + (b.lat - a.lat) * t,
                a.lon + (b.lon - a.lon) * t,
            ));
        }
        seg_start = seg_end;
    }
    points.push(anchor(req, (n - 1) as f64 * step_km));

    // Resolve the database once per cell transition; points inside a cell
    // all sample the same database.
    let mut out = Vec::with_capacity(n);
    let mut current: Option<((i32, i32), Option<TerrainDb>)> = None;
    for p in points {
        let cell = (
            (p.lat * TRN_CELLS_PER_DEGREE as f64).floor() as i32,
            (p.lon * TRN_CELLS_PER_DEGREE as f64).floor() as i32,
        );
        let db = match &current {
            Some((c, db)) if *c == cell => *db,
            _ => {
                let db = cache.resolve(cell.0, cell.1)?;
                current = Some((cell, db));
                db
            }
        };
        out.push(match db {
            Some(db) => cache.sample(db, p.lat, p.lon)?,
            None => 0.0,
        });
    }
    Ok(out)
}

fn anchor(req: &ProfileRequest, distance_km: f64) -> LatLon {
    if distance_km == 0.0 {
        req.start
    } else {
        coordinates(
            req.start.lat,
            req.start.lon,
            req.bearing,
            distance_km,
            req.km_per_degree,
        )
    }
}

/// Average terrain elevation along evenly spaced radials, 3 to 16 km out.
pub fn haat_radials(
    cache: &mut TerrainCache,
    position: LatLon,
    radial_count: usize,
    km_per_degree: f64,
) -> TerrainResult<Vec<f64>> {
    let mut averages = Vec::with_capacity(radial_count);
    for r in 0..radial_count {
        let bearing = 360.0 * r as f64 / radial_count as f64;
        let req = ProfileRequest {
            start: position,
            bearing,
            distance_km: HAAT_WINDOW_KM.1,
            points_per_km: HAAT_POINTS_PER_KM,
            km_per_degree,
        };
        let elevations = profile(cache, &req)?;
        let skip = (HAAT_WINDOW_KM.0 * HAAT_POINTS_PER_KM) as usize;
        let window = &elevations[skip..];
        let avg = window.iter().sum::<f64>() / window.len() as f64;
        averages.push(avg);
    }
    Ok(averages)
}

/// Height above average terrain: antenna height AMSL minus the mean of the
/// radial terrain averages.
pub fn haat(
    cache: &mut TerrainCache,
    position: LatLon,
    height_amsl: f64,
    radial_count: usize,
    km_per_degree: f64,
) -> TerrainResult<f64> {
    let radials = haat_radials(cache, position, radial_count, km_per_degree)?;
    let mean = radials.iter().sum::<f64>() / radials.len() as f64;
    Ok(height_amsl - mean)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::TerrainConfig;
    use study_common::DEFAULT_KM_PER_DEGREE;

    fn empty_cache() -> (tempfile::TempDir, TerrainCache) {
        let dir = tempfile::tempdir().unwrap();
        let cache = TerrainCache::new(TerrainConfig::with_default_budget(dir.path()));
        (dir, cache)
    }

    #[test]
    fn test_profile_point_count() {
        let (_dir, mut cache) = empty_cache();
        let req = ProfileRequest {
            start: LatLon::new(39.0, 105.0),
            bearing: 45.0,
            distance_km: 50.0,
            points_per_km: 1.0,
            km_per_degree: DEFAULT_KM_PER_DEGREE,
        };
        let prof = profile(&mut cache, &req).unwrap();
        assert_eq!(prof.len(), 51);
    }

    #[test]
    fn test_profile_zero_distance() {
        let (_dir, mut cache) = empty_cache();
        let req = ProfileRequest {
            start: LatLon::new(39.0, 105.0),
            bearing: 0.0,
            distance_km: 0.0,
            points_per_km: 10.0,
            km_per_degree: DEFAULT_KM_PER_DEGREE,
        };
        let prof = profile(&mut cache, &req).unwrap();
        assert_eq!(prof.len(), 1);
    }

    #[test]
    fn test_haat_over_sea_level_equals_amsl() {
        let (_dir, mut cache) = empty_cache();
        let h = haat(
            &mut cache,
            LatLon::new(39.0, 105.0),
            450.0,
            8,
            DEFAULT_KM_PER_DEGREE,
        )
        .unwrap();
        assert!((h - 450.0).abs() < 1e-9);
    }
}
