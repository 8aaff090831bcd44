//! Study configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use datum::Datum;
use fcc_curves::{CurveSet, MinDistancePolicy};
use study_common::{Country, DEFAULT_KM_PER_DEGREE};
use study_grid::{AggregationMethod, GridConfig, GridMode};

/// Configuration for one engine process running one study.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudyConfig {
    /// Study working directory holding the cache subdirectories.
    pub study_dir: PathBuf,

    /// Root directory of the terrain databases.
    pub terrain_dir: PathBuf,

    /// Grid mode and cell sizing.
    pub grid: GridConfig,

    /// How Census points become study points.
    pub aggregation: AggregationMethod,

    /// DTS truncation rule: restrict parent coverage to the parent geography
    /// or the reference facility's contour.
    pub truncate_dts: bool,

    /// Behaviour below the curve-table minimum distance.
    pub min_distance_policy: MinDistancePolicy,

    /// Curve set for desired fields.
    pub desired_set: CurveSet,

    /// Curve set for undesired (interfering) fields.
    pub undesired_set: CurveSet,

    /// Datum the station records arrive in; positions are converted to
    /// NAD83 when the study opens.
    pub source_datum: Datum,

    /// Directory of NADCON shift tables for datum conversion.
    pub datum_table_dir: PathBuf,

    /// Countries whose population is loaded.
    pub countries: Vec<Country>,

    /// Number of parallel engine processes the orchestrator runs; the
    /// terrain memory budget divides by this.
    pub process_count: usize,

    /// Cap on the fraction of RAM the terrain cache may claim.
    pub memory_cap: f64,

    /// Total RAM override for the terrain budget, bytes. `None` detects.
    pub total_ram_bytes: Option<u64>,

    /// User terrain data version stamp, for cache invalidation.
    pub user_terrain_version: u32,

    /// Whether user terrain is enabled for this study.
    pub user_terrain_requested: bool,
}

impl Default for StudyConfig {
    fn default() -> Self {
        Self {
            study_dir: PathBuf::from("."),
            terrain_dir: PathBuf::from("terrain"),
            grid: GridConfig::new(GridMode::Global, 2.0, DEFAULT_KM_PER_DEGREE),
            aggregation: AggregationMethod::Centroid { snap: false },
            truncate_dts: false,
            min_distance_policy: MinDistancePolicy::ScaledFreeSpace,
            desired_set: CurveSet::F5050,
            undesired_set: CurveSet::F5010,
            source_datum: Datum::Nad83,
            datum_table_dir: PathBuf::from("nadcon"),
            countries: vec![Country::Us, Country::Ca, Country::Mx],
            process_count: 1,
            memory_cap: 0.5,
            total_ram_bytes: None,
            user_terrain_version: 0,
            user_terrain_requested: false,
        }
    }
}

impl StudyConfig {
    /// Apply environment overrides for the operational knobs.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("STUDY_DIR") {
            config.study_dir = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("TERRAIN_DIR") {
            config.terrain_dir = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("STUDY_CELL_SIZE_KM") {
            if let Ok(size) = val.parse() {
                config.grid.cell_size_km = size;
            }
        }
        if let Ok(val) = std::env::var("STUDY_PROCESS_COUNT") {
            if let Ok(count) = val.parse() {
                config.process_count = count;
            }
        }
        if let Ok(val) = std::env::var("STUDY_MEMORY_CAP") {
            if let Ok(cap) = val.parse() {
                config.memory_cap = cap;
            }
        }
        if let Ok(val) = std::env::var("STUDY_TRUNCATE_DTS") {
            config.truncate_dts = val == "1" || val.eq_ignore_ascii_case("true");
        }

        config
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.process_count == 0 {
            return Err("process_count must be > 0".to_string());
        }
        if !(0.0..=1.0).contains(&self.memory_cap) {
            return Err("memory_cap must be within [0, 1]".to_string());
        }
        if self.countries.is_empty() {
            return Err("at least one country must be enabled".to_string());
        }
        self.grid.validate().map_err(|e| e.to_string())
    }
}
