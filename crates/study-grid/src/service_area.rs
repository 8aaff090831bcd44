//! Service-area membership tests.

use std::collections::HashMap;

use study_common::{bear_distance, LatLon, Source, SourceKey};

/// Whether a point lies inside a source's service area.
///
/// Non-DTS sources test against their named geography when present, else
/// against the interpolated contour distance at the source-to-point bearing.
/// A DTS parent passes wherever any child passes; with `truncate_dts` set
/// and a parent geography present, the point must additionally lie inside
/// the parent geography or within the reference facility's contour from the
/// reference facility's coordinates.
pub fn service_area_contains(
    source: &Source,
    all_sources: &HashMap<SourceKey, Source>,
    point: LatLon,
    truncate_dts: bool,
    km_per_degree: f64,
) -> bool {
    if let Some(dts) = source.dts() {
        let in_any_child = dts.children.iter().any(|key| {
            all_sources
                .get(key)
                .map(|child| plain_contains(child, point, km_per_degree))
                .unwrap_or(false)
        });
        if !in_any_child {
            return false;
        }
        if truncate_dts {
            if let Some(geography) = &source.geography {
                if geography.contains(point, source.position, km_per_degree) {
                    return true;
                }
                return all_sources
                    .get(&dts.reference_facility)
                    .map(|reference| contour_contains(reference, point, km_per_degree))
                    .unwrap_or(false);
            }
        }
        return true;
    }
    plain_contains(source, point, km_per_degree)
}

fn plain_contains(source: &Source, point: LatLon, km_per_degree: f64) -> bool {
    if let Some(geography) = &source.geography {
        return geography.contains(point, source.position, km_per_degree);
    }
    contour_contains(source, point, km_per_degree)
}

fn contour_contains(source: &Source, point: LatLon, km_per_degree: f64) -> bool {
    match &source.contour {
        Some(contour) => {
            let (bearing, _, distance) = bear_distance(
                source.position.lat,
                source.position.lon,
                point.lat,
                point.lon,
                km_per_degree,
            );
            distance <= contour.distance_at(bearing)
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use study_common::{
        coordinates, DtsParent, EmissionMask, Geography, GeographyKind, ServiceKind,
        DEFAULT_KM_PER_DEGREE,
    };
    use test_utils::{contour_source, omni_tv_source};

    fn point_at(source: &Source, bearing: f64, distance: f64) -> LatLon {
        coordinates(
            source.position.lat,
            source.position.lon,
            bearing,
            distance,
            DEFAULT_KM_PER_DEGREE,
        )
    }

    #[test]
    fn test_geography_source() {
        let s = omni_tv_source(1, 40.0, 100.0, 50.0);
        let sources = HashMap::new();
        assert!(service_area_contains(
            &s,
            &sources,
            point_at(&s, 120.0, 40.0),
            false,
            DEFAULT_KM_PER_DEGREE
        ));
        assert!(!service_area_contains(
            &s,
            &sources,
            point_at(&s, 120.0, 60.0),
            false,
            DEFAULT_KM_PER_DEGREE
        ));
    }

    #[test]
    fn test_contour_source() {
        let s = contour_source(2, 40.0, 100.0, 45.0);
        let sources = HashMap::new();
        assert!(service_area_contains(
            &s,
            &sources,
            point_at(&s, 200.0, 44.0),
            false,
            DEFAULT_KM_PER_DEGREE
        ));
        assert!(!service_area_contains(
            &s,
            &sources,
            point_at(&s, 200.0, 46.0),
            false,
            DEFAULT_KM_PER_DEGREE
        ));
    }

    fn dts_family() -> (Source, HashMap<SourceKey, Source>) {
        // Two children 30 km apart, a reference facility, and a parent
        // with a wide circular geography.
        let child_a = omni_tv_source(11, 40.0, 100.0, 25.0);
        let child_b = omni_tv_source(12, 40.0, 100.4, 25.0);
        let reference = contour_source(13, 40.0, 100.0, 40.0);

        let mut parent = omni_tv_source(10, 40.0, 100.2, 80.0);
        parent.service = ServiceKind::Tv {
            channel: 30,
            emission_mask: EmissionMask::Full,
            dts: Some(DtsParent::new(vec![11, 12], 13).unwrap()),
        };
        parent.geography =
            Some(Geography::new(GeographyKind::Circle { radius_km: 80.0 }).unwrap());

        let mut map = HashMap::new();
        for s in [child_a, child_b, reference.clone()] {
            map.insert(s.key, s);
        }
        (parent, map)
    }

    #[test]
    fn test_dts_parent_passes_on_any_child() {
        let (parent, sources) = dts_family();
        // Near child A, far from child B.
        let near_a = LatLon::new(40.05, 100.0);
        assert!(service_area_contains(
            &parent,
            &sources,
            near_a,
            false,
            DEFAULT_KM_PER_DEGREE
        ));
        // Outside both children.
        let outside = LatLon::new(41.5, 100.2);
        assert!(!service_area_contains(
            &parent,
            &sources,
            outside,
            false,
            DEFAULT_KM_PER_DEGREE
        ));
    }

    #[test]
    fn test_truncate_dts_requires_parent_geography_or_reference() {
        let (mut parent, sources) = dts_family();
        // Shrink the parent geography so a point in child B's area falls
        // outside it, and move the reference contour away from it too.
        parent.geography =
            Some(Geography::new(GeographyKind::Circle { radius_km: 5.0 }).unwrap());

        let near_b = LatLon::new(40.05, 100.45);
        // Without truncation the child-area test is enough.
        assert!(service_area_contains(
            &parent,
            &sources,
            near_b,
            false,
            DEFAULT_KM_PER_DEGREE
        ));
        // With truncation: outside the 5-km parent circle, but still inside
        // the reference facility's 40-km contour.
        assert!(service_area_contains(
            &parent,
            &sources,
            near_b,
            true,
            DEFAULT_KM_PER_DEGREE
        ));

        // A point in child B's area but beyond the reference contour fails
        // under truncation.
        let far_b = LatLon::new(40.0, 100.55);
        let (_, _, d_ref) = bear_distance(40.0, 100.0, far_b.lat, far_b.lon, DEFAULT_KM_PER_DEGREE);
        assert!(d_ref > 40.0, "fixture: point must be outside the reference contour");
        assert!(service_area_contains(
            &parent,
            &sources,
            far_b,
            false,
            DEFAULT_KM_PER_DEGREE
        ));
        assert!(!service_area_contains(
            &parent,
            &sources,
            far_b,
            true,
            DEFAULT_KM_PER_DEGREE
        ));
    }
}
