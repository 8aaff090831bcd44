//! Tabulated propagation-curve families.
//!
//! Each band family and time-variability set tabulates field strength (dB
//! above 1 uV/m for 1 kW ERP) over a shared 13-entry height vector and a
//! per-set distance vector. The tables are built once on first use from a
//! smooth parametric fit of the published curve families; every lookup then
//! treats them as opaque tabulated data.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// Antenna heights above average terrain shared by every set, metres.
pub const HEIGHTS: [f64; 13] = [
    30.48, 50.0, 75.0, 100.0, 150.0, 200.0, 300.0, 400.0, 500.0, 600.0, 700.0, 1000.0, 1524.0,
];

/// F(50,50) distances, km.
pub const DIST_F5050: [f64; 25] = [
    1.5, 2.0, 3.0, 4.0, 5.0, 10.0, 15.0, 20.0, 25.0, 30.0, 40.0, 50.0, 60.0, 70.0, 80.0, 90.0,
    100.0, 120.0, 140.0, 160.0, 180.0, 200.0, 225.0, 250.0, 300.0,
];

/// F(50,10) distances, km.
pub const DIST_F5010: [f64; 30] = [
    15.0, 20.0, 25.0, 30.0, 35.0, 40.0, 45.0, 50.0, 55.0, 60.0, 65.0, 70.0, 80.0, 90.0, 100.0,
    110.0, 120.0, 130.0, 140.0, 150.0, 160.0, 180.0, 200.0, 220.0, 240.0, 260.0, 280.0, 300.0,
    400.0, 500.0,
];

/// F(50,90) distances, km.
pub const DIST_F5090: [f64; 20] = [
    15.0, 20.0, 25.0, 30.0, 40.0, 50.0, 60.0, 70.0, 80.0, 90.0, 100.0, 110.0, 120.0, 140.0, 160.0,
    180.0, 200.0, 220.0, 250.0, 300.0,
];

/// Curve band families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CurveBand {
    /// Channels 2-6 and the FM band.
    VhfLowFm,
    /// Channels 7-13.
    VhfHigh,
    /// Channels 14 and up.
    Uhf,
}

/// Time-variability sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CurveSet {
    F5050,
    F5010,
    F5090,
}

impl CurveSet {
    pub const ALL: [CurveSet; 3] = [CurveSet::F5050, CurveSet::F5010, CurveSet::F5090];

    fn index(self) -> usize {
        match self {
            CurveSet::F5050 => 0,
            CurveSet::F5010 => 1,
            CurveSet::F5090 => 2,
        }
    }
}

impl CurveBand {
    fn index(self) -> usize {
        match self {
            CurveBand::VhfLowFm => 0,
            CurveBand::VhfHigh => 1,
            CurveBand::Uhf => 2,
        }
    }
}

/// One tabulated height-by-distance surface.
#[derive(Debug, Clone)]
pub struct CurveTable {
    pub distances: &'static [f64],
    pub heights: &'static [f64],
    /// `fields[height_index][distance_index]`, dBu for 1 kW ERP.
    pub fields: Vec<Vec<f64>>,
}

impl CurveTable {
    pub fn min_distance(&self) -> f64 {
        self.distances[0]
    }

    pub fn max_distance(&self) -> f64 {
        self.distances[self.distances.len() - 1]
    }
}

/// Attenuation-shape term: grows with the log of distance, with a quadratic
/// term steepening the far field.
fn distance_shape(d: f64) -> f64 {
    let l = (d / 1.5).log10().max(0.0);
    l + 0.35 * l * l
}

/// Height term: 0 at the bottom of the height vector, 1 at the top.
fn height_factor(h: f64) -> f64 {
    (h / HEIGHTS[0]).ln() / (HEIGHTS[12] / HEIGHTS[0]).ln()
}

/// The parametric fit behind the tables.
fn generator(band: CurveBand, set: CurveSet, d: f64, h: f64) -> f64 {
    let g = height_factor(h.clamp(HEIGHTS[0], HEIGHTS[12]));
    // Attenuation slope per unit shape, interpolated in height.
    let u = 10.72 - (10.72 - 2.7) * g;
    let band_factor = match band {
        CurveBand::VhfLowFm => 0.9,
        CurveBand::VhfHigh => 1.0,
        CurveBand::Uhf => 1.25,
    };
    let set_factor = match set {
        CurveSet::F5050 => 1.0,
        CurveSet::F5010 => 0.85,
        CurveSet::F5090 => 1.15,
    };
    let free_space = 106.92 - 20.0 * d.log10();
    free_space - u * band_factor * set_factor * distance_shape(d)
}

fn build_table(band: CurveBand, set: CurveSet) -> CurveTable {
    let distances: &'static [f64] = match set {
        CurveSet::F5050 => &DIST_F5050,
        CurveSet::F5010 => &DIST_F5010,
        CurveSet::F5090 => &DIST_F5090,
    };
    let fields = HEIGHTS
        .iter()
        .map(|&h| distances.iter().map(|&d| generator(band, set, d, h)).collect())
        .collect();
    CurveTable {
        distances,
        heights: &HEIGHTS,
        fields,
    }
}

static TABLES: Lazy<Vec<CurveTable>> = Lazy::new(|| {
    let mut tables = Vec::with_capacity(9);
    for band in [CurveBand::VhfLowFm, CurveBand::VhfHigh, CurveBand::Uhf] {
        for set in CurveSet::ALL {
            tables.push(build_table(band, set));
        }
    }
    tables
});

/// The tabulated surface for a band family and set.
pub fn table(band: CurveBand, set: CurveSet) -> &'static CurveTable {
    &TABLES[band.index() * 3 + set.index()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_shapes() {
        assert_eq!(table(CurveBand::VhfHigh, CurveSet::F5050).distances.len(), 25);
        assert_eq!(table(CurveBand::VhfHigh, CurveSet::F5010).distances.len(), 30);
        assert_eq!(table(CurveBand::VhfHigh, CurveSet::F5090).distances.len(), 20);
        for band in [CurveBand::VhfLowFm, CurveBand::VhfHigh, CurveBand::Uhf] {
            for set in CurveSet::ALL {
                let t = table(band, set);
                assert_eq!(t.fields.len(), 13);
                for row in &t.fields {
                    assert_eq!(row.len(), t.distances.len());
                }
            }
        }
    }

    #[test]
    fn test_fields_decrease_with_distance() {
        for band in [CurveBand::VhfLowFm, CurveBand::VhfHigh, CurveBand::Uhf] {
            for set in CurveSet::ALL {
                let t = table(band, set);
                for row in &t.fields {
                    for pair in row.windows(2) {
                        assert!(pair[0] > pair[1], "not decreasing: {pair:?}");
                    }
                }
            }
        }
    }

    #[test]
    fn test_fields_increase_with_height() {
        let t = table(CurveBand::Uhf, CurveSet::F5050);
        for d in 0..t.distances.len() {
            for h in 0..12 {
                assert!(t.fields[h][d] <= t.fields[h + 1][d]);
            }
        }
    }

    #[test]
    fn test_sets_ordered_high_median_low() {
        // At any shared tabulated point: F(50,10) >= F(50,50) >= F(50,90).
        let d = 100.0;
        let median = table(CurveBand::VhfHigh, CurveSet::F5050);
        let high = table(CurveBand::VhfHigh, CurveSet::F5010);
        let low = table(CurveBand::VhfHigh, CurveSet::F5090);
        let di_m = median.distances.iter().position(|&x| x == d).unwrap();
        let di_h = high.distances.iter().position(|&x| x == d).unwrap();
        let di_l = low.distances.iter().position(|&x| x == d).unwrap();
        for h in 0..13 {
            assert!(high.fields[h][di_h] >= median.fields[h][di_m]);
            assert!(median.fields[h][di_m] >= low.fields[h][di_l]);
        }
    }
}
