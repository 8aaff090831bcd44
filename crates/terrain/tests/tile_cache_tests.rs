//! Integration tests for tile parsing, the cell cache, and profiles.

use study_common::{LatLon, DEFAULT_KM_PER_DEGREE};
use terrain::format::Version;
use terrain::profile::{profile, ProfileRequest};
use terrain::status::TileStatus;
use terrain::{TerrainCache, TerrainConfig, TerrainDb};
use test_utils::{write_status_index, write_tile, CellSpec, Compression, TileSpec};

fn cache_at(root: &std::path::Path) -> TerrainCache {
    TerrainCache::new(TerrainConfig::with_default_budget(root))
}

// ============================================================================
// Uniform tiles
// ============================================================================

#[test]
fn test_uniform_tile_elevation() {
    let dir = test_utils::temp_test_dir();
    let db_dir = dir.path().join(TerrainDb::Ned1.dir_name());
    write_tile(&db_dir, &TileSpec::uniform(TerrainDb::Ned1, 39, 105, 1625));
    write_status_index(&db_dir, &[(39, 105, TileStatus::Data)]);

    let mut cache = cache_at(dir.path());
    let elev = cache.elevation(39.5, 105.5).unwrap();
    assert_eq!(elev, 1625.0);
}

#[test]
fn test_seawater_tile_is_zero() {
    let dir = test_utils::temp_test_dir();
    let db_dir = dir.path().join(TerrainDb::Globe30.dir_name());
    write_status_index(&db_dir, &[(39, 105, TileStatus::Seawater)]);

    let mut cache = cache_at(dir.path());
    assert_eq!(cache.elevation(39.5, 105.5).unwrap(), 0.0);
    // The shared seawater cell is a cache hit afterwards.
    assert_eq!(cache.elevation(39.6, 105.6).unwrap(), 0.0);
}

// ============================================================================
// Grid cells and compression forms
// ============================================================================

fn gradient_tile(compression: Compression) -> TileSpec {
    // Cell 0 of the (39, 105) tile: 2x2 grid spanning the cell corners.
    let mut cells = vec![CellSpec::NoData; 64];
    cells[0] = CellSpec::Grid {
        lat_pts: 2,
        lon_pts: 2,
        pixel_centered: false,
        samples: vec![100, 200, 300, 400],
        compression,
    };
    TileSpec {
        tile_lat: 39,
        tile_lon: 105,
        db: TerrainDb::Ned1,
        version: Version::V2,
        swapped: false,
        cells,
    }
}

#[test]
fn test_grid_cell_bilinear_uncompressed() {
    let dir = test_utils::temp_test_dir();
    let db_dir = dir.path().join(TerrainDb::Ned1.dir_name());
    write_tile(&db_dir, &gradient_tile(Compression::Uncompressed));
    write_status_index(&db_dir, &[(39, 105, TileStatus::Data)]);

    let mut cache = cache_at(dir.path());
    // South-east corner of cell 0.
    let se = cache.elevation(39.0, 105.0).unwrap();
    assert!((se - 100.0).abs() < 1e-9, "se {se}");
    // Cell centre: 7.5' cell, centre at +3.75'.
    let mid = cache.elevation(39.0625, 105.0625).unwrap();
    assert!((mid - 250.0).abs() < 1e-6, "mid {mid}");
}

#[test]
fn test_grid_cell_bit_packed_matches_uncompressed() {
    let dir_a = test_utils::temp_test_dir();
    let dir_b = test_utils::temp_test_dir();
    let db_a = dir_a.path().join(TerrainDb::Ned1.dir_name());
    let db_b = dir_b.path().join(TerrainDb::Ned1.dir_name());
    write_tile(&db_a, &gradient_tile(Compression::Uncompressed));
    write_tile(&db_b, &gradient_tile(Compression::BitPacked(9)));
    write_status_index(&db_a, &[(39, 105, TileStatus::Data)]);
    write_status_index(&db_b, &[(39, 105, TileStatus::Data)]);

    let mut cache_a = cache_at(dir_a.path());
    let mut cache_b = cache_at(dir_b.path());
    for (lat, lon) in [(39.01, 105.02), (39.05, 105.11), (39.12, 105.0)] {
        let a = cache_a.elevation(lat, lon).unwrap();
        let b = cache_b.elevation(lat, lon).unwrap();
        assert!((a - b).abs() < 1e-9, "({lat},{lon}): {a} vs {b}");
    }
}

#[test]
fn test_byte_swapped_tile_detected() {
    let dir = test_utils::temp_test_dir();
    let db_dir = dir.path().join(TerrainDb::Ned1.dir_name());
    let mut spec = gradient_tile(Compression::Uncompressed);
    spec.swapped = true;
    write_tile(&db_dir, &spec);
    write_status_index(&db_dir, &[(39, 105, TileStatus::Data)]);

    let mut cache = cache_at(dir.path());
    let se = cache.elevation(39.0, 105.0).unwrap();
    assert!((se - 100.0).abs() < 1e-9, "se {se}");
}

// ============================================================================
// User terrain flag and fallback
// ============================================================================

#[test]
fn test_user_tile_sets_flag() {
    let dir = test_utils::temp_test_dir();
    let db_dir = dir.path().join(TerrainDb::User13.dir_name());
    let mut spec = TileSpec::uniform(TerrainDb::User13, 40, 100, 800);
    spec.version = Version::V2User;
    write_tile(&db_dir, &spec);
    write_status_index(&db_dir, &[(40, 100, TileStatus::Data)]);

    let mut cache = cache_at(dir.path());
    assert!(!cache.user_terrain_used());
    assert_eq!(cache.elevation(40.5, 100.5).unwrap(), 800.0);
    assert!(cache.user_terrain_used());
}

#[test]
fn test_missing_promised_file_falls_back() {
    let dir = test_utils::temp_test_dir();
    // Fine database promises the tile but has no file on disk.
    let fine_dir = dir.path().join(TerrainDb::Ned1.dir_name());
    write_status_index(&fine_dir, &[(39, 105, TileStatus::Data)]);
    // Coarse database actually has it.
    let coarse_dir = dir.path().join(TerrainDb::Globe30.dir_name());
    write_tile(&coarse_dir, &TileSpec::uniform(TerrainDb::Globe30, 39, 105, 444));
    write_status_index(&coarse_dir, &[(39, 105, TileStatus::Data)]);

    let mut cache = cache_at(dir.path());
    assert_eq!(cache.elevation(39.5, 105.5).unwrap(), 444.0);
}

#[test]
fn test_per_cell_fallback_on_no_data() {
    let dir = test_utils::temp_test_dir();
    // Fine database has the tile but cell 0 is no-data.
    let mut fine = TileSpec::uniform(TerrainDb::Ned1, 39, 105, 1000);
    fine.cells[0] = CellSpec::NoData;
    let fine_dir = dir.path().join(TerrainDb::Ned1.dir_name());
    write_tile(&fine_dir, &fine);
    write_status_index(&fine_dir, &[(39, 105, TileStatus::Data)]);

    let coarse_dir = dir.path().join(TerrainDb::Globe30.dir_name());
    write_tile(&coarse_dir, &TileSpec::uniform(TerrainDb::Globe30, 39, 105, 2000));
    write_status_index(&coarse_dir, &[(39, 105, TileStatus::Data)]);

    let mut cache = cache_at(dir.path());
    // Cell 0 falls back to the coarse set; its neighbours stay fine.
    assert_eq!(cache.elevation(39.01, 105.01).unwrap(), 2000.0);
    assert_eq!(cache.elevation(39.2, 105.2).unwrap(), 1000.0);
}

// ============================================================================
// Profiles
// ============================================================================

#[test]
fn test_profile_across_uniform_tile() {
    let dir = test_utils::temp_test_dir();
    let db_dir = dir.path().join(TerrainDb::Ned1.dir_name());
    write_tile(&db_dir, &TileSpec::uniform(TerrainDb::Ned1, 39, 105, 750));
    write_status_index(&db_dir, &[(39, 105, TileStatus::Data)]);

    let mut cache = cache_at(dir.path());
    let req = ProfileRequest {
        start: LatLon::new(39.4, 105.5),
        bearing: 0.0,
        distance_km: 20.0,
        points_per_km: 2.0,
        km_per_degree: DEFAULT_KM_PER_DEGREE,
    };
    let prof = profile(&mut cache, &req).unwrap();
    assert_eq!(prof.len(), 41);
    assert!(prof.iter().all(|&e| e == 750.0), "profile {prof:?}");
}
