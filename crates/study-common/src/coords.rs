//! Spherical bearing, distance, and destination-point calculations.
//!
//! All routines take the kilometres-per-degree figure as an argument; the
//! study configuration carries the value used for a run so contour projection
//! and grid layout stay consistent.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Kilometres per degree of great-circle arc used when a study does not
/// configure its own value.
pub const DEFAULT_KM_PER_DEGREE: f64 = 111.195;

const DEG_TO_RAD: f64 = PI / 180.0;
const RAD_TO_DEG: f64 = 180.0 / PI;

/// A geographic position, degrees positive north / positive west.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

impl LatLon {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Latitude index in whole arc-seconds (`floor(degrees * 3600)`).
pub fn lat_index(lat_deg: f64) -> i32 {
    (lat_deg * 3600.0).floor() as i32
}

/// Longitude index in whole arc-seconds (`floor(degrees * 3600)`).
///
/// Longitudes are positive west, so indices increase westward and a grid's
/// east bound is the smaller index.
pub fn lon_index(lon_deg: f64) -> i32 {
    (lon_deg * 3600.0).floor() as i32
}

/// Bearing and distance between two points on a sphere.
///
/// Returns `(bearing_deg, reverse_bearing_deg, distance_km)`. Bearings are
/// degrees true. The longitude delta is normalised to [-180, 180] before use;
/// when the path is degenerate (coincident points or a pole start) the
/// bearing is reported as 0.
pub fn bear_distance(
    lat1: f64,
    lon1: f64,
    lat2: f64,
    lon2: f64,
    km_per_degree: f64,
) -> (f64, f64, f64) {
    let rlat1 = lat1 * DEG_TO_RAD;
    let rlat2 = lat2 * DEG_TO_RAD;

    // Positive delta means point 2 lies east of point 1 (west-positive lons).
    let mut delta = (lon1 - lon2) * DEG_TO_RAD;
    while delta > PI {
        delta -= 2.0 * PI;
    }
    while delta < -PI {
        delta += 2.0 * PI;
    }

    let cos_di =
        (rlat1.sin() * rlat2.sin() + rlat1.cos() * rlat2.cos() * delta.cos()).clamp(-1.0, 1.0);
    let di = cos_di.acos();
    let distance = di * RAD_TO_DEG * km_per_degree;

    let bearing = bearing_from(rlat1, rlat2, cos_di, di, delta);
    let reverse = bearing_from(rlat2, rlat1, cos_di, di, -delta);

    (bearing, reverse, distance)
}

fn bearing_from(rlat_from: f64, rlat_to: f64, cos_di: f64, di: f64, delta: f64) -> f64 {
    let denom = di.sin() * rlat_from.cos();
    if denom.abs() < 1e-30 {
        return 0.0;
    }
    let cos_b = ((rlat_to.sin() - rlat_from.sin() * cos_di) / denom).clamp(-1.0, 1.0);
    let b = cos_b.acos() * RAD_TO_DEG;
    if delta < 0.0 {
        360.0 - b
    } else {
        b
    }
}

/// Destination point from a start, bearing, and distance.
///
/// The returned longitude is intentionally never wrapped across +/-180; a
/// westbound path may produce a longitude beyond 180 and the grid index
/// arithmetic downstream depends on that.
pub fn coordinates(
    lat: f64,
    lon: f64,
    bearing_deg: f64,
    distance_km: f64,
    km_per_degree: f64,
) -> LatLon {
    let rlat = lat * DEG_TO_RAD;
    let rbear = bearing_deg * DEG_TO_RAD;
    let rdist = (distance_km / km_per_degree) * DEG_TO_RAD;

    let sin_lat2 =
        (rlat.sin() * rdist.cos() + rlat.cos() * rdist.sin() * rbear.cos()).clamp(-1.0, 1.0);
    let rlat2 = sin_lat2.asin();

    let denom = rlat.cos() * rlat2.cos();
    let dlon = if denom.abs() < 1e-30 {
        0.0
    } else {
        ((rdist.cos() - rlat.sin() * sin_lat2) / denom)
            .clamp(-1.0, 1.0)
            .acos()
    };

    // Bearings east of north move toward smaller west longitudes.
    let mut b = bearing_deg % 360.0;
    if b < 0.0 {
        b += 360.0;
    }
    let lon2 = if b < 180.0 {
        lon - dlon * RAD_TO_DEG
    } else {
        lon + dlon * RAD_TO_DEG
    };

    LatLon::new(rlat2 * RAD_TO_DEG, lon2)
}
