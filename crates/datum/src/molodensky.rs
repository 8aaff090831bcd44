//! Abridged Molodensky datum shift formulas.

use study_common::LatLon;

/// Datum shift parameters for the abridged Molodensky transformation from a
/// source datum to NAD83/GRS80: ECEF origin shifts in metres plus the source
/// ellipsoid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DatumShift {
    pub dx: f64,
    pub dy: f64,
    pub dz: f64,
    /// Source ellipsoid semi-major axis, metres.
    pub a: f64,
    /// Source ellipsoid flattening.
    pub f: f64,
}

/// GRS80 semi-major axis (NAD83), metres.
pub const GRS80_A: f64 = 6_378_137.0;
/// GRS80 flattening.
pub const GRS80_F: f64 = 1.0 / 298.257_222_101;

/// Clarke 1866 ellipsoid (NAD27).
pub const CLARKE_1866_A: f64 = 6_378_206.4;
pub const CLARKE_1866_F: f64 = 1.0 / 294.978_698_2;

/// WGS72 ellipsoid.
pub const WGS72_A: f64 = 6_378_135.0;
pub const WGS72_F: f64 = 1.0 / 298.26;

const ARC_SECOND: f64 = std::f64::consts::PI / (180.0 * 3600.0);

/// Apply the abridged Molodensky shift to a point on the source datum,
/// returning NAD83 coordinates.
///
/// The formulas work in east-positive longitude; the workspace convention is
/// west-positive, so the longitude sign flips at the boundary.
pub fn abridged(point: LatLon, shift: &DatumShift) -> LatLon {
    let phi = point.lat.to_radians();
    let lam = (-point.lon).to_radians();

    let da = GRS80_A - shift.a;
    let df = GRS80_F - shift.f;

    let sin_phi = phi.sin();
    let cos_phi = phi.cos();
    let sin_lam = lam.sin();
    let cos_lam = lam.cos();

    let e2 = 2.0 * shift.f - shift.f * shift.f;
    let w = (1.0 - e2 * sin_phi * sin_phi).sqrt();
    // Meridian and prime-vertical radii of curvature.
    let rm = shift.a * (1.0 - e2) / (w * w * w);
    let rn = shift.a / w;

    let dphi_sec = (-shift.dx * sin_phi * cos_lam - shift.dy * sin_phi * sin_lam
        + shift.dz * cos_phi
        + (shift.a * df + shift.f * da) * (2.0 * phi).sin())
        / (rm * ARC_SECOND);
    let dlam_sec = (-shift.dx * sin_lam + shift.dy * cos_lam) / (rn * cos_phi * ARC_SECOND);

    let lat = point.lat + dphi_sec / 3600.0;
    let lon_east = -point.lon + dlam_sec / 3600.0;
    LatLon::new(lat, -lon_east)
}

/// WGS72 to NAD83/WGS84: the ellipsoid change plus the 4.5 m Z-origin shift,
/// applied through the same abridged formulas.
pub fn wgs72_to_nad83(point: LatLon) -> LatLon {
    const SHIFT: DatumShift = DatumShift {
        dx: 0.0,
        dy: 0.0,
        dz: 4.5,
        a: WGS72_A,
        f: WGS72_F,
    };
    abridged(point, &SHIFT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_conus_scale_shift() {
        // A CONUS-style NAD27 shift moves points by a few tens of metres,
        // i.e. on the order of one arc-second.
        let shift = DatumShift {
            dx: -8.0,
            dy: 160.0,
            dz: 176.0,
            a: CLARKE_1866_A,
            f: CLARKE_1866_F,
        };
        let p = abridged(LatLon::new(39.0, 98.0), &shift);
        let dlat_sec = (p.lat - 39.0) * 3600.0;
        let dlon_sec = (p.lon - 98.0) * 3600.0;
        assert!(dlat_sec.abs() < 10.0, "dlat {dlat_sec}");
        assert!(dlon_sec.abs() < 10.0, "dlon {dlon_sec}");
        assert!(dlat_sec.abs() > 0.01 || dlon_sec.abs() > 0.01);
    }

    #[test]
    fn test_zero_shift_same_ellipsoid_is_identity() {
        let shift = DatumShift {
            dx: 0.0,
            dy: 0.0,
            dz: 0.0,
            a: GRS80_A,
            f: GRS80_F,
        };
        let p = abridged(LatLon::new(45.0, 120.0), &shift);
        assert_abs_diff_eq!(p.lat, 45.0, epsilon = 1e-12);
        assert_abs_diff_eq!(p.lon, 120.0, epsilon = 1e-12);
    }

    #[test]
    fn test_wgs72_latitude_shift_northward() {
        // The +Z shift moves mid-northern-latitude points slightly north.
        let p = wgs72_to_nad83(LatLon::new(40.0, 105.0));
        assert!(p.lat > 40.0);
        assert_abs_diff_eq!(p.lat, 40.0, epsilon = 1e-3);
    }
}
