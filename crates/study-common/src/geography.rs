//! Service-area geographies: circle, box, sectors, polygon.
//!
//! Circle, box, and sector geographies are positioned relative to an origin
//! (the source location); polygons carry absolute vertices.

use serde::{Deserialize, Serialize};

use crate::coords::{bear_distance, LatLon};
use crate::error::{ModelError, ModelResult};

/// One sector entry: this radius applies from this azimuth up to the next
/// entry's azimuth (the last entry closes back to the first).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sector {
    pub azimuth: f64,
    pub radius_km: f64,
}

/// Geometry payload of a geography.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GeographyKind {
    Circle { radius_km: f64 },
    Box { width_km: f64, height_km: f64 },
    Sectors(Vec<Sector>),
    Polygon(Vec<LatLon>),
}

/// A validated service-area geography.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geography {
    kind: GeographyKind,
}

impl Geography {
    /// Validate and wrap a geometry.
    pub fn new(kind: GeographyKind) -> ModelResult<Self> {
        match &kind {
            GeographyKind::Circle { radius_km } => {
                if *radius_km <= 0.0 {
                    return Err(ModelError::BadRadius(*radius_km));
                }
            }
            GeographyKind::Box {
                width_km,
                height_km,
            } => {
                if *width_km <= 0.0 || *height_km <= 0.0 {
                    return Err(ModelError::BadBox {
                        width: *width_km,
                        height: *height_km,
                    });
                }
            }
            GeographyKind::Sectors(sectors) => {
                let mut last = f64::NEG_INFINITY;
                for (index, s) in sectors.iter().enumerate() {
                    if !(0.0..360.0).contains(&s.azimuth) {
                        return Err(ModelError::SectorAzimuth(s.azimuth));
                    }
                    if s.azimuth <= last {
                        return Err(ModelError::SectorOrder {
                            index,
                            azimuth: s.azimuth,
                        });
                    }
                    if s.radius_km <= 0.0 {
                        return Err(ModelError::BadRadius(s.radius_km));
                    }
                    last = s.azimuth;
                }
                if sectors.is_empty() {
                    return Err(ModelError::SectorOrder {
                        index: 0,
                        azimuth: 0.0,
                    });
                }
            }
            GeographyKind::Polygon(vertices) => {
                if vertices.len() < 3 {
                    return Err(ModelError::PolygonTooSmall(vertices.len()));
                }
            }
        }
        Ok(Self { kind })
    }

    pub fn kind(&self) -> &GeographyKind {
        &self.kind
    }

    /// Whether a point lies inside the geography, relative to `origin` for
    /// the origin-relative kinds.
    pub fn contains(&self, point: LatLon, origin: LatLon, km_per_degree: f64) -> bool {
        match &self.kind {
            GeographyKind::Circle { radius_km } => {
                let (_, _, dist) =
                    bear_distance(origin.lat, origin.lon, point.lat, point.lon, km_per_degree);
                dist <= *radius_km
            }
            GeographyKind::Box {
                width_km,
                height_km,
            } => {
                let dlat_km = (point.lat - origin.lat) * km_per_degree;
                let dlon_km = (point.lon - origin.lon)
                    * km_per_degree
                    * (origin.lat.to_radians().cos());
                dlat_km.abs() <= height_km / 2.0 && dlon_km.abs() <= width_km / 2.0
            }
            GeographyKind::Sectors(sectors) => {
                let (bear, _, dist) =
                    bear_distance(origin.lat, origin.lon, point.lat, point.lon, km_per_degree);
                dist <= sector_radius(sectors, bear)
            }
            GeographyKind::Polygon(vertices) => point_in_polygon(point, vertices),
        }
    }
}

/// Radius applying at a bearing: the sector whose start azimuth is the
/// largest not exceeding the bearing, closing from the last entry back
/// around to the first.
fn sector_radius(sectors: &[Sector], bearing: f64) -> f64 {
    let mut az = bearing % 360.0;
    if az < 0.0 {
        az += 360.0;
    }
    let mut radius = sectors[sectors.len() - 1].radius_km;
    for s in sectors {
        if s.azimuth <= az {
            radius = s.radius_km;
        } else {
            break;
        }
    }
    radius
}

/// Ray-casting point-in-polygon in the lat/lon plane; the polygon is treated
/// as closed whether or not the last vertex repeats the first.
fn point_in_polygon(point: LatLon, vertices: &[LatLon]) -> bool {
    let mut inside = false;
    let n = vertices.len();
    let mut j = n - 1;
    for i in 0..n {
        let vi = vertices[i];
        let vj = vertices[j];
        if (vi.lat > point.lat) != (vj.lat > point.lat) {
            let cross =
                (vj.lon - vi.lon) * (point.lat - vi.lat) / (vj.lat - vi.lat) + vi.lon;
            if point.lon < cross {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::coordinates;
    use crate::DEFAULT_KM_PER_DEGREE;

    const ORIGIN: LatLon = LatLon {
        lat: 40.0,
        lon: 100.0,
    };

    #[test]
    fn test_circle_contains() {
        let g = Geography::new(GeographyKind::Circle { radius_km: 50.0 }).unwrap();
        let near = coordinates(ORIGIN.lat, ORIGIN.lon, 45.0, 30.0, DEFAULT_KM_PER_DEGREE);
        let far = coordinates(ORIGIN.lat, ORIGIN.lon, 45.0, 60.0, DEFAULT_KM_PER_DEGREE);
        assert!(g.contains(near, ORIGIN, DEFAULT_KM_PER_DEGREE));
        assert!(!g.contains(far, ORIGIN, DEFAULT_KM_PER_DEGREE));
    }

    #[test]
    fn test_box_contains() {
        let g = Geography::new(GeographyKind::Box {
            width_km: 40.0,
            height_km: 20.0,
        })
        .unwrap();
        let inside = LatLon::new(ORIGIN.lat + 9.0 / DEFAULT_KM_PER_DEGREE, ORIGIN.lon);
        let outside = LatLon::new(ORIGIN.lat + 11.0 / DEFAULT_KM_PER_DEGREE, ORIGIN.lon);
        assert!(g.contains(inside, ORIGIN, DEFAULT_KM_PER_DEGREE));
        assert!(!g.contains(outside, ORIGIN, DEFAULT_KM_PER_DEGREE));
    }

    #[test]
    fn test_sectors_closure() {
        let g = Geography::new(GeographyKind::Sectors(vec![
            Sector {
                azimuth: 0.0,
                radius_km: 10.0,
            },
            Sector {
                azimuth: 90.0,
                radius_km: 50.0,
            },
            Sector {
                azimuth: 180.0,
                radius_km: 10.0,
            },
        ]))
        .unwrap();
        let east = coordinates(ORIGIN.lat, ORIGIN.lon, 100.0, 40.0, DEFAULT_KM_PER_DEGREE);
        let north = coordinates(ORIGIN.lat, ORIGIN.lon, 10.0, 40.0, DEFAULT_KM_PER_DEGREE);
        // 270 degrees falls in the implicit closure of the last sector.
        let west = coordinates(ORIGIN.lat, ORIGIN.lon, 270.0, 40.0, DEFAULT_KM_PER_DEGREE);
        assert!(g.contains(east, ORIGIN, DEFAULT_KM_PER_DEGREE));
        assert!(!g.contains(north, ORIGIN, DEFAULT_KM_PER_DEGREE));
        assert!(!g.contains(west, ORIGIN, DEFAULT_KM_PER_DEGREE));
    }

    #[test]
    fn test_sectors_require_increasing_azimuths() {
        let r = Geography::new(GeographyKind::Sectors(vec![
            Sector {
                azimuth: 90.0,
                radius_km: 10.0,
            },
            Sector {
                azimuth: 45.0,
                radius_km: 10.0,
            },
        ]));
        assert!(r.is_err());
    }

    #[test]
    fn test_polygon_contains_auto_closed() {
        let g = Geography::new(GeographyKind::Polygon(vec![
            LatLon::new(39.0, 99.0),
            LatLon::new(41.0, 99.0),
            LatLon::new(41.0, 101.0),
            LatLon::new(39.0, 101.0),
        ]))
        .unwrap();
        assert!(g.contains(LatLon::new(40.0, 100.0), ORIGIN, DEFAULT_KM_PER_DEGREE));
        assert!(!g.contains(LatLon::new(42.0, 100.0), ORIGIN, DEFAULT_KM_PER_DEGREE));
    }
}
