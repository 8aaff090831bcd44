//! End-to-end engine tests against an in-memory station database.

use std::collections::HashMap;

use study_common::{
    Country, DtsParent, EmissionMask, IndexBounds, LatLon, ServiceKind, Source, SourceKey,
};
use study_engine::{EngineError, EngineResult, Scenario, StationDb, Study, StudyConfig};
use study_grid::aggregate::CensusRow;
use study_grid::FieldStatus;
use test_utils::{contour_source, omni_tv_source};

/// In-memory station database.
#[derive(Debug)]
struct MemoryDb {
    sources: Vec<Source>,
    scenarios: Vec<Scenario>,
    census: Vec<(Country, CensusRow)>,
}

impl StationDb for MemoryDb {
    fn study_sources(&mut self) -> EngineResult<Vec<Source>> {
        Ok(self.sources.clone())
    }

    fn scenarios(&mut self) -> EngineResult<Vec<Scenario>> {
        Ok(self.scenarios.clone())
    }

    fn population(
        &mut self,
        bounds: &IndexBounds,
        country: Country,
    ) -> EngineResult<Vec<CensusRow>> {
        Ok(self
            .census
            .iter()
            .filter(|(c, row)| *c == country && bounds.contains_index(row.lat_index, row.lon_index))
            .map(|(_, row)| row.clone())
            .collect())
    }
}

fn census_row(lat: f64, lon: f64, population: u32) -> (Country, CensusRow) {
    (
        Country::Us,
        CensusRow {
            lat_index: (lat * 3600.0).floor() as i32,
            lon_index: (lon * 3600.0).floor() as i32,
            position: LatLon::new(lat, lon),
            population,
            households: population / 3,
            block_id: (population as u64) << 8,
        },
    )
}

fn test_config(study_dir: &std::path::Path, terrain_dir: &std::path::Path) -> StudyConfig {
    let mut config = StudyConfig::default();
    config.study_dir = study_dir.to_path_buf();
    config.terrain_dir = terrain_dir.to_path_buf();
    config.total_ram_bytes = Some(16 * 1024 * 1024 * 1024);
    config.process_count = 1;
    config
}

fn single_source_db() -> MemoryDb {
    MemoryDb {
        sources: vec![omni_tv_source(1, 40.0, 100.0, 10.0)],
        scenarios: vec![Scenario {
            key: 1,
            name: "baseline".into(),
            desired: vec![1],
            undesired: vec![],
        }],
        census: vec![
            census_row(40.01, 100.01, 900),
            census_row(40.02, 99.98, 300),
            // Outside the 10-km service circle.
            census_row(40.5, 100.5, 5000),
        ],
    }
}

// ============================================================================
// Baseline scenario
// ============================================================================

#[test]
fn test_scenario_covers_population_inside_service_area() {
    let study_dir = test_utils::temp_study_dir();
    let terrain_dir = test_utils::temp_test_dir();
    let config = test_config(study_dir.path(), terrain_dir.path());

    let mut study = Study::open(config, single_source_db()).unwrap();
    let totals = study.run_scenario(1).unwrap();

    let us = totals.country(Country::Us);
    assert_eq!(us.population, 1200, "only in-circle population is served");
    assert_eq!(us.households, 300 + 100);
    assert!(us.served_points > 0);
    assert!(us.area_sqkm > 0.0);
    assert!(totals.total_population() == 1200);
    study.close();
}

#[test]
fn test_served_points_hold_calculated_fields() {
    let study_dir = test_utils::temp_study_dir();
    let terrain_dir = test_utils::temp_test_dir();
    let config = test_config(study_dir.path(), terrain_dir.path());

    let mut study = Study::open(config, single_source_db()).unwrap();
    study.run_scenario(1).unwrap();

    let store = study.store();
    let mut calculated = 0;
    for index in store.all_points() {
        if let Some(f) = store.find_field(index, 1, 0) {
            let field = store.fields.get(f);
            assert_eq!(field.status, FieldStatus::Calculated);
            assert!(field.field_dbu.is_finite());
            calculated += 1;
        }
    }
    assert!(calculated > 0);
}

#[test]
fn test_unknown_scenario_is_fatal() {
    let study_dir = test_utils::temp_study_dir();
    let terrain_dir = test_utils::temp_test_dir();
    let config = test_config(study_dir.path(), terrain_dir.path());

    let mut study = Study::open(config, single_source_db()).unwrap();
    let err = study.run_scenario(99).unwrap_err();
    assert!(matches!(err, EngineError::UnknownScenario(99)));
    assert!(err.class_code() < 0);
}

#[test]
fn test_undersized_memory_refuses_to_open() {
    let study_dir = test_utils::temp_study_dir();
    let terrain_dir = test_utils::temp_test_dir();
    let mut config = test_config(study_dir.path(), terrain_dir.path());
    config.total_ram_bytes = Some(1024 * 1024 * 1024);
    config.process_count = 4;

    let err = Study::open(config, single_source_db()).unwrap_err();
    assert!(matches!(err, EngineError::OutOfMemory(_)));
}

// ============================================================================
// Off-curve policy selection
// ============================================================================

/// Field at the study point closest to the source after one scenario run.
fn closest_field_dbu(policy: fcc_curves::MinDistancePolicy) -> f64 {
    let study_dir = test_utils::temp_study_dir();
    let terrain_dir = test_utils::temp_test_dir();
    let mut config = test_config(study_dir.path(), terrain_dir.path());
    config.min_distance_policy = policy;

    // A census block well inside the curve-table minimum distance.
    let mut db = single_source_db();
    db.census.push(census_row(40.001, 100.001, 50));

    let mut study = Study::open(config, db).unwrap();
    study.run_scenario(1).unwrap();

    let store = study.store();
    let mut best: Option<(f64, f64)> = None;
    for index in store.all_points() {
        if let Some(f) = store.find_field(index, 1, 0) {
            let field = store.fields.get(f);
            if best.map(|(d, _)| field.distance_km < d).unwrap_or(true) {
                best = Some((field.distance_km, field.field_dbu));
            }
        }
    }
    let (distance, value) = best.expect("a served point exists");
    assert!(distance < 1.5, "closest point must sit inside the curve minimum");
    value
}

#[test]
fn test_min_distance_policy_is_honoured() {
    let free_space = closest_field_dbu(fcc_curves::MinDistancePolicy::FreeSpace);
    let clamped = closest_field_dbu(fcc_curves::MinDistancePolicy::Clamp);
    let scaled = closest_field_dbu(fcc_curves::MinDistancePolicy::ScaledFreeSpace);
    // Plain free space sits well above the held curve-minimum value this
    // close in; the scaled extension never leaves that band.
    assert!(free_space > clamped + 1.0, "{free_space} vs {clamped}");
    assert!(scaled >= clamped && scaled <= free_space, "{scaled}");
}

// ============================================================================
// Result-cache round trips through the engine
// ============================================================================

#[test]
fn test_second_run_restores_from_cache() {
    let study_dir = test_utils::temp_study_dir();
    let terrain_dir = test_utils::temp_test_dir();

    let totals_first = {
        let config = test_config(study_dir.path(), terrain_dir.path());
        let mut study = Study::open(config, single_source_db()).unwrap();
        let t = study.run_scenario(1).unwrap();
        study.close();
        t
    };
    assert!(study_dir.path().join("desired_cell").join("1").exists());

    // A fresh process over the same cache directory restores the fields
    // instead of recomputing, with identical totals.
    let config = test_config(study_dir.path(), terrain_dir.path());
    let mut study = Study::open(config, single_source_db()).unwrap();
    let totals_second = study.run_scenario(1).unwrap();
    assert_eq!(
        totals_first.country(Country::Us).population,
        totals_second.country(Country::Us).population
    );
    assert_eq!(
        totals_first.country(Country::Us).served_points,
        totals_second.country(Country::Us).served_points
    );
}

#[test]
fn test_changed_source_invalidates_cache() {
    let study_dir = test_utils::temp_study_dir();
    let terrain_dir = test_utils::temp_test_dir();

    {
        let config = test_config(study_dir.path(), terrain_dir.path());
        let mut study = Study::open(config, single_source_db()).unwrap();
        study.run_scenario(1).unwrap();
        study.close();
    }

    // Same study, but the station moved: the cached fields must be dropped
    // and recomputed, and the run still succeeds.
    let mut db = single_source_db();
    db.sources[0].erp_kw = 250.0;
    let config = test_config(study_dir.path(), terrain_dir.path());
    let mut study = Study::open(config, db).unwrap();
    let totals = study.run_scenario(1).unwrap();
    assert_eq!(totals.country(Country::Us).population, 1200);
}

// ============================================================================
// Undesired pass
// ============================================================================

#[test]
fn test_undesired_fields_attach_to_served_points() {
    let study_dir = test_utils::temp_study_dir();
    let terrain_dir = test_utils::temp_test_dir();
    let config = test_config(study_dir.path(), terrain_dir.path());

    let mut db = single_source_db();
    db.sources.push(contour_source(2, 40.3, 100.3, 60.0));
    db.scenarios[0].undesired = vec![2];

    let mut study = Study::open(config, db).unwrap();
    study.run_scenario(1).unwrap();

    let store = study.store();
    let mut undesired = 0;
    for index in store.all_points() {
        if store.find_field(index, 1, 0).is_some() {
            if let Some(f) = store.find_field(index, 2, 10) {
                assert!(store.fields.get(f).is_undesired);
                undesired += 1;
            }
        }
    }
    assert!(undesired > 0, "undesired fields should exist at served points");
    // The appendable cache landed on disk.
    assert!(study_dir.path().join("undesired_cell").join("2").exists());
}

// ============================================================================
// DTS
// ============================================================================

#[test]
fn test_dts_parent_placeholder_fields() {
    let study_dir = test_utils::temp_study_dir();
    let terrain_dir = test_utils::temp_test_dir();
    let config = test_config(study_dir.path(), terrain_dir.path());

    let child_a = omni_tv_source(11, 40.0, 100.0, 8.0);
    let child_b = omni_tv_source(12, 40.0, 100.15, 8.0);
    let reference = contour_source(13, 40.0, 100.0, 30.0);
    let mut parent = omni_tv_source(10, 40.0, 100.07, 40.0);
    parent.service = ServiceKind::Tv {
        channel: 30,
        emission_mask: EmissionMask::Full,
        dts: Some(DtsParent::new(vec![11, 12], 13).unwrap()),
    };

    let db = MemoryDb {
        sources: vec![parent, child_a, child_b, reference],
        scenarios: vec![Scenario {
            key: 1,
            name: "dts".into(),
            desired: vec![10],
            undesired: vec![],
        }],
        census: vec![census_row(40.01, 100.01, 500)],
    };

    let mut study = Study::open(config, db).unwrap();
    let totals = study.run_scenario(1).unwrap();
    assert_eq!(totals.country(Country::Us).population, 500);

    let store = study.store();
    let mut placeholders = 0;
    let mut child_fields = 0;
    for index in store.all_points() {
        if let Some(f) = store.find_field(index, 10, 0) {
            let field = store.fields.get(f);
            // The parent's placeholder: cached, calculated, field zero.
            assert!(field.cached);
            assert_eq!(field.status, FieldStatus::Calculated);
            assert_eq!(field.field_dbu, 0.0);
            placeholders += 1;
            if store.find_field(index, 11, 0).is_some() || store.find_field(index, 12, 0).is_some()
            {
                child_fields += 1;
            }
        }
    }
    assert!(placeholders > 0);
    assert!(child_fields > 0, "children compute real fields at parent points");
}

/// Missing keys referenced by a scenario degrade gracefully.
#[test]
fn test_scenario_with_unknown_source_key_is_skipped() {
    let study_dir = test_utils::temp_study_dir();
    let terrain_dir = test_utils::temp_test_dir();
    let config = test_config(study_dir.path(), terrain_dir.path());

    let mut db = single_source_db();
    db.scenarios[0].desired.push(42);

    let mut study = Study::open(config, db).unwrap();
    let totals = study.run_scenario(1).unwrap();
    assert_eq!(totals.country(Country::Us).population, 1200);
}

/// A HashMap sanity check for the fixture helpers.
#[test]
fn test_sources_load_into_study() {
    let study_dir = test_utils::temp_study_dir();
    let terrain_dir = test_utils::temp_test_dir();
    let config = test_config(study_dir.path(), terrain_dir.path());
    let study = Study::open(config, single_source_db()).unwrap();
    let keys: HashMap<SourceKey, _> = study.sources().iter().map(|(k, s)| (*k, s.key)).collect();
    assert_eq!(keys.len(), 1);
    assert!(keys.contains_key(&1));
}
