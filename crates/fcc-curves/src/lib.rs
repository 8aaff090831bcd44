//! FCC propagation-curve lookup.
//!
//! Field strengths are tabulated per band family (low-VHF/FM, high-VHF, UHF)
//! and time-variability set (F(50,50), F(50,10), F(50,90)) over a
//! height-by-distance grid, and interpolated with a piecewise-cubic surface
//! fit. Three lookup modes cover the engine's needs: field from distance and
//! power, power from field and distance, and distance from field and power
//! (iterative sweep-and-refine).

pub mod error;
pub mod lookup;
pub mod surface;
pub mod tables;

pub use error::{CurveError, CurveResult};
pub use lookup::{
    distance_for_field, field_at_distance, power_for_field, Advisories, CurveParams,
    CurveValue, MinDistancePolicy,
};
pub use tables::{table, CurveBand, CurveSet, CurveTable, HEIGHTS};

use study_common::Band;

/// Free-space field in dBu for 1 kW ERP at a distance in km.
pub fn free_space_field(distance_km: f64) -> f64 {
    106.92 - 20.0 * distance_km.max(0.001).log10()
}

/// Distance in km at which free space yields a field (dBu at 1 kW ERP).
pub fn free_space_distance(field_dbu: f64) -> f64 {
    10f64.powf((106.92 - field_dbu) / 20.0)
}

impl CurveBand {
    /// Curve family for a channel band. FM shares the low-VHF curves;
    /// wireless services are treated as UHF.
    pub fn for_band(band: Band) -> CurveBand {
        match band {
            Band::VhfLow | Band::Fm => CurveBand::VhfLowFm,
            Band::VhfHigh => CurveBand::VhfHigh,
            Band::Uhf | Band::Wireless => CurveBand::Uhf,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_free_space_round_trip() {
        let f = free_space_field(100.0);
        assert_abs_diff_eq!(f, 66.92, epsilon = 1e-9);
        assert_abs_diff_eq!(free_space_distance(f), 100.0, epsilon = 1e-9);
    }

    #[test]
    fn test_band_mapping() {
        assert_eq!(CurveBand::for_band(Band::Fm), CurveBand::VhfLowFm);
        assert_eq!(CurveBand::for_band(Band::VhfHigh), CurveBand::VhfHigh);
        assert_eq!(CurveBand::for_band(Band::Wireless), CurveBand::Uhf);
    }
}
