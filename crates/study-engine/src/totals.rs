//! Scenario result totals.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use study_common::Country;

/// Counts of the advisory conditions met during a scenario run; attached to
/// the totals as the status block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvisoryCounts {
    pub switched_to_median: u64,
    pub used_free_space: u64,
    pub clamped_to_max: u64,
    pub outside_data_area: u64,
    pub iteration_did_not_converge: u64,
}

impl AdvisoryCounts {
    pub fn absorb(&mut self, adv: fcc_curves::Advisories) {
        if adv.switched_to_median {
            self.switched_to_median += 1;
        }
        if adv.used_free_space {
            self.used_free_space += 1;
        }
        if adv.clamped_to_max {
            self.clamped_to_max += 1;
        }
    }
}

/// Coverage totals for one country.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CountryTotals {
    pub study_points: u64,
    pub served_points: u64,
    pub area_sqkm: f64,
    pub population: u64,
    pub households: u64,
}

/// Totals for one scenario run, aggregated by country.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioTotals {
    pub scenario_key: u32,
    pub by_country: [CountryTotals; 3],
    pub advisories: AdvisoryCounts,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ScenarioTotals {
    pub fn country(&self, country: Country) -> &CountryTotals {
        &self.by_country[country.index()]
    }

    pub fn country_mut(&mut self, country: Country) -> &mut CountryTotals {
        &mut self.by_country[country.index()]
    }

    /// Grand totals across countries.
    pub fn total_population(&self) -> u64 {
        self.by_country.iter().map(|c| c.population).sum()
    }

    pub fn total_area_sqkm(&self) -> f64 {
        self.by_country.iter().map(|c| c.area_sqkm).sum()
    }
}
