//! Comprehensive tests for IndexBounds and the coordinate routines backing it.

use study_common::{bear_distance, coordinates, IndexBounds, DEFAULT_KM_PER_DEGREE};

// ============================================================================
// Unit-square invariant
// ============================================================================

#[test]
fn test_point_occupies_unit_square() {
    let mut b = IndexBounds::initialize();
    b.extend_by_point(37.5, 122.5);

    // Everything inside [r, r+1) x [c, c+1) arc-seconds is contained.
    assert!(b.contains_point(37.5, 122.5));
    assert!(b.contains_point(37.5 + 0.9 / 3600.0, 122.5));
    assert!(b.contains_point(37.5, 122.5 + 0.9 / 3600.0));

    // The north and west edges are open.
    assert!(!b.contains_point(37.5 + 1.5 / 3600.0, 122.5));
    assert!(!b.contains_point(37.5, 122.5 + 1.5 / 3600.0));
    assert!(!b.contains_point(37.501, 122.5));
}

#[test]
fn test_south_east_edges_closed() {
    let mut b = IndexBounds::initialize();
    b.extend_by_index(100, 200);
    assert!(b.contains_index(100, 200));
    assert!(!b.contains_index(99, 200));
    assert!(!b.contains_index(100, 199));
}

// ============================================================================
// Extend never loses contained points
// ============================================================================

#[test]
fn test_extend_monotone() {
    let probes = [
        (37.5, 122.5),
        (38.0, 121.0),
        (36.25, 123.75),
        (39.9, 120.1),
    ];
    let mut b = IndexBounds::initialize();
    for &(lat, lon) in &probes {
        b.extend_by_point(lat, lon);
    }
    // Further extension in any direction keeps every probe contained.
    b.extend_by_radius(42.0, 118.0, 80.0, DEFAULT_KM_PER_DEGREE);
    let mut other = IndexBounds::initialize();
    other.extend_by_point(30.0, 130.0);
    b.extend_by_bounds(&other);
    for &(lat, lon) in &probes {
        assert!(b.contains_point(lat, lon), "lost ({lat}, {lon})");
    }
}

#[test]
fn test_initial_bounds_empty() {
    let b = IndexBounds::initialize();
    for &(lat, lon) in &[(0.0, 0.0), (75.0, 180.0), (-89.0, -179.0)] {
        assert!(!b.contains_point(lat, lon));
    }
}

// ============================================================================
// Over-range longitudes from unwrapped destinations
// ============================================================================

#[test]
fn test_bounds_accept_over_range_longitude() {
    // A westbound destination past the antimeridian produces lon > 180; the
    // bounds arithmetic must keep working in plain index units.
    let p = coordinates(45.0, 179.9, 270.0, 100.0, DEFAULT_KM_PER_DEGREE);
    assert!(p.lon > 180.0);

    let mut b = IndexBounds::initialize();
    b.extend_by_point(45.0, 179.9);
    b.extend_by_point(p.lat, p.lon);
    assert!(b.contains_point(45.0, 179.9));
    assert!(b.contains_point(p.lat, p.lon));
    assert!(b.width() > 1);
}

// ============================================================================
// Spot checks against the spherical routines
// ============================================================================

#[test]
fn test_one_degree_north_is_111_195_km() {
    let (bear, _, dist) = bear_distance(37.0, 122.0, 38.0, 122.0, DEFAULT_KM_PER_DEGREE);
    assert!((bear - 0.0).abs() < 1e-5);
    assert!((dist - 111.195).abs() < 1e-6);
}

#[test]
fn test_radius_extension_spans_diameter() {
    let mut b = IndexBounds::initialize();
    b.extend_by_radius(40.0, 105.0, 55.5975, DEFAULT_KM_PER_DEGREE);
    // 55.5975 km is half a degree of latitude; the bounds should span about
    // one degree (3600 arc-seconds) north-south.
    let h = b.height();
    assert!((3598..=3602).contains(&h), "height {h}");
}
