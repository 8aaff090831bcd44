//! Source and geometry fixtures.

use study_common::{
    Band, Contour, Country, EmissionMask, Geography, GeographyKind, LatLon, ServiceKind, Source,
    SourceKey,
};

/// A square-ish contour: the same distance on every tabulated azimuth.
pub fn square_contour(distance_km: f64, points: usize) -> Contour {
    Contour::new(vec![distance_km; points]).expect("fixture contour")
}

/// An omnidirectional TV source with a circular service geography.
pub fn omni_tv_source(key: SourceKey, lat: f64, lon: f64, radius_km: f64) -> Source {
    Source {
        key,
        position: LatLon::new(lat, lon),
        erp_kw: 100.0,
        height_amsl: 500.0,
        height_aat: 300.0,
        horizontal_pattern: None,
        vertical_pattern: None,
        matrix_pattern: None,
        band: Band::VhfHigh,
        country: Country::Us,
        service: ServiceKind::Tv {
            channel: 9,
            emission_mask: EmissionMask::Full,
            dts: None,
        },
        contour: None,
        geography: Some(
            Geography::new(GeographyKind::Circle { radius_km }).expect("fixture geography"),
        ),
    }
}

/// An omnidirectional TV source bounded by a tabulated contour instead of a
/// named geography.
pub fn contour_source(key: SourceKey, lat: f64, lon: f64, contour_km: f64) -> Source {
    let mut source = omni_tv_source(key, lat, lon, contour_km);
    source.geography = None;
    source.contour = Some(square_contour(contour_km, 72));
    source
}
