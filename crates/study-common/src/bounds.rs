//! Integer index bounds with unit-square semantics.
//!
//! An index point (r, c) stands for the unit square [r, r+1) x [c, c+1). A
//! point is inside a bounds iff `south <= r < north` and `east <= c < west`
//! (south/east edges closed, north/west edges open). Longitudes are positive
//! west, so the west limit is the larger index.

use serde::{Deserialize, Serialize};

use crate::coords::{self, coordinates};

/// Rectangular bounds in integer index units (usually arc-seconds).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexBounds {
    pub south_lat: i32,
    pub north_lat: i32,
    pub east_lon: i32,
    pub west_lon: i32,
}

impl IndexBounds {
    /// Empty bounds: contains nothing until the first `extend_*` call.
    pub fn initialize() -> Self {
        Self {
            south_lat: i32::MAX,
            north_lat: i32::MIN,
            east_lon: i32::MAX,
            west_lon: i32::MIN,
        }
    }

    /// Extend to cover the unit square of an index point.
    ///
    /// The north/west edges of a point's square lie outside the square, so
    /// those limits are pushed one past the index.
    pub fn extend_by_index(&mut self, lat_idx: i32, lon_idx: i32) {
        if lat_idx < self.south_lat {
            self.south_lat = lat_idx;
        }
        if lat_idx + 1 > self.north_lat {
            self.north_lat = lat_idx + 1;
        }
        if lon_idx < self.east_lon {
            self.east_lon = lon_idx;
        }
        if lon_idx + 1 > self.west_lon {
            self.west_lon = lon_idx + 1;
        }
    }

    /// Extend to cover a point given in degrees.
    pub fn extend_by_point(&mut self, lat_deg: f64, lon_deg: f64) {
        self.extend_by_index(coords::lat_index(lat_deg), coords::lon_index(lon_deg));
    }

    /// Union with another bounds.
    pub fn extend_by_bounds(&mut self, other: &IndexBounds) {
        if other.south_lat < self.south_lat {
            self.south_lat = other.south_lat;
        }
        if other.north_lat > self.north_lat {
            self.north_lat = other.north_lat;
        }
        if other.east_lon < self.east_lon {
            self.east_lon = other.east_lon;
        }
        if other.west_lon > self.west_lon {
            self.west_lon = other.west_lon;
        }
    }

    /// Extend to cover a circle by its four cardinal-point destinations.
    ///
    /// Adequate while the radius is small against the earth radius; the
    /// extreme latitudes/longitudes of a small circle sit on the cardinal
    /// radials to within the index resolution.
    pub fn extend_by_radius(
        &mut self,
        lat_deg: f64,
        lon_deg: f64,
        radius_km: f64,
        km_per_degree: f64,
    ) {
        for bearing in [0.0, 90.0, 180.0, 270.0] {
            let p = coordinates(lat_deg, lon_deg, bearing, radius_km, km_per_degree);
            self.extend_by_point(p.lat, p.lon);
        }
    }

    /// Whether an index point lies inside (south/east closed, north/west open).
    pub fn contains_index(&self, lat_idx: i32, lon_idx: i32) -> bool {
        lat_idx >= self.south_lat
            && lat_idx < self.north_lat
            && lon_idx >= self.east_lon
            && lon_idx < self.west_lon
    }

    /// Whether a point in degrees lies inside.
    pub fn contains_point(&self, lat_deg: f64, lon_deg: f64) -> bool {
        self.contains_index(coords::lat_index(lat_deg), coords::lon_index(lon_deg))
    }

    /// Whether another bounds lies entirely inside this one.
    pub fn contains_bounds(&self, other: &IndexBounds) -> bool {
        other.south_lat >= self.south_lat
            && other.north_lat <= self.north_lat
            && other.east_lon >= self.east_lon
            && other.west_lon <= self.west_lon
    }

    /// Whether another bounds overlaps this one anywhere.
    pub fn overlaps_bounds(&self, other: &IndexBounds) -> bool {
        other.south_lat < self.north_lat
            && other.north_lat > self.south_lat
            && other.east_lon < self.west_lon
            && other.west_lon > self.east_lon
    }

    /// Latitude extent in index units.
    pub fn height(&self) -> i32 {
        self.north_lat - self.south_lat
    }

    /// Longitude extent in index units.
    pub fn width(&self) -> i32 {
        self.west_lon - self.east_lon
    }
}

impl Default for IndexBounds {
    fn default() -> Self {
        Self::initialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_bounds_contain_nothing() {
        let b = IndexBounds::initialize();
        assert!(!b.contains_point(0.0, 0.0));
        assert!(!b.contains_point(37.5, 122.5));
        assert!(!b.contains_index(i32::MIN, i32::MIN));
    }

    #[test]
    fn test_extend_by_point_unit_square() {
        let mut b = IndexBounds::initialize();
        b.extend_by_point(37.5, 122.5);
        assert!(b.contains_point(37.5, 122.5));
        // North edge of the unit square is open.
        assert!(!b.contains_point(37.501, 122.5));
        assert_eq!(b.height(), 1);
        assert_eq!(b.width(), 1);
    }

    #[test]
    fn test_extend_keeps_contained_points() {
        let mut b = IndexBounds::initialize();
        b.extend_by_point(37.5, 122.5);
        b.extend_by_point(39.25, 120.0);
        b.extend_by_radius(36.0, 121.0, 50.0, crate::DEFAULT_KM_PER_DEGREE);
        assert!(b.contains_point(37.5, 122.5));
        assert!(b.contains_point(39.25, 120.0));
        assert!(b.contains_point(36.0, 121.0));
    }

    #[test]
    fn test_extend_by_bounds_union() {
        let mut a = IndexBounds::initialize();
        a.extend_by_index(10, 20);
        let mut b = IndexBounds::initialize();
        b.extend_by_index(-5, 40);
        a.extend_by_bounds(&b);
        assert_eq!(a.south_lat, -5);
        assert_eq!(a.north_lat, 11);
        assert_eq!(a.east_lon, 20);
        assert_eq!(a.west_lon, 41);
    }

    #[test]
    fn test_contains_and_overlaps_bounds() {
        let mut outer = IndexBounds::initialize();
        outer.extend_by_index(0, 0);
        outer.extend_by_index(9, 9);

        let mut inner = IndexBounds::initialize();
        inner.extend_by_index(2, 2);
        inner.extend_by_index(4, 4);

        let mut disjoint = IndexBounds::initialize();
        disjoint.extend_by_index(20, 20);

        assert!(outer.contains_bounds(&inner));
        assert!(!inner.contains_bounds(&outer));
        assert!(outer.overlaps_bounds(&inner));
        assert!(!outer.overlaps_bounds(&disjoint));
    }

    #[test]
    fn test_extend_by_radius_covers_cardinals() {
        let mut b = IndexBounds::initialize();
        b.extend_by_radius(40.0, 105.0, 30.0, crate::DEFAULT_KM_PER_DEGREE);
        let north = coordinates(40.0, 105.0, 0.0, 30.0, crate::DEFAULT_KM_PER_DEGREE);
        let west = coordinates(40.0, 105.0, 270.0, 30.0, crate::DEFAULT_KM_PER_DEGREE);
        assert!(b.contains_point(north.lat, north.lon));
        assert!(b.contains_point(west.lat, west.lon));
    }
}
