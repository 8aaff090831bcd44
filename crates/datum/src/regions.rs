//! Declared NAD27 conversion regions.
//!
//! Regions are tried in declaration order and the first one containing the
//! input point wins; overlaps between neighbouring regions are resolved by
//! that ordering (the grid-based regions are declared ahead of the wider
//! Molodensky boxes they overlap).

use study_common::LatLon;

use crate::molodensky::{DatumShift, CLARKE_1866_A, CLARKE_1866_F};

/// Conversion method for one region.
#[derive(Debug, Clone, PartialEq)]
pub enum RegionMethod {
    /// NADCON shift-grid file under the table directory.
    Nadcon { file: &'static str },
    /// Abridged Molodensky with fixed datum shifts.
    Molodensky(DatumShift),
}

/// One rectangular conversion region, degrees, longitudes positive west.
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    pub name: &'static str,
    pub lat_min: f64,
    pub lat_max: f64,
    pub lon_min: f64,
    pub lon_max: f64,
    pub method: RegionMethod,
}

impl Region {
    pub fn contains(&self, p: LatLon) -> bool {
        p.lat >= self.lat_min
            && p.lat <= self.lat_max
            && p.lon >= self.lon_min
            && p.lon <= self.lon_max
    }
}

fn molodensky(dx: f64, dy: f64, dz: f64) -> RegionMethod {
    RegionMethod::Molodensky(DatumShift {
        dx,
        dy,
        dz,
        a: CLARKE_1866_A,
        f: CLARKE_1866_F,
    })
}

/// The eleven declared regions, in match order.
pub fn declared_regions() -> Vec<Region> {
    vec![
        Region {
            name: "conus",
            lat_min: 20.0,
            lat_max: 50.0,
            lon_min: 63.0,
            lon_max: 131.0,
            method: RegionMethod::Nadcon { file: "conus.ndc" },
        },
        Region {
            name: "alaska",
            lat_min: 46.0,
            lat_max: 77.0,
            lon_min: 128.0,
            lon_max: 194.0,
            method: RegionMethod::Nadcon { file: "alaska.ndc" },
        },
        Region {
            name: "hawaii",
            lat_min: 18.0,
            lat_max: 23.0,
            lon_min: 154.0,
            lon_max: 161.0,
            method: RegionMethod::Nadcon { file: "hawaii.ndc" },
        },
        Region {
            name: "prvi",
            lat_min: 17.0,
            lat_max: 19.0,
            lon_min: 64.0,
            lon_max: 68.0,
            method: RegionMethod::Nadcon { file: "prvi.ndc" },
        },
        Region {
            name: "stgeorge",
            lat_min: 56.0,
            lat_max: 57.0,
            lon_min: 169.0,
            lon_max: 171.0,
            method: RegionMethod::Nadcon { file: "stgeorge.ndc" },
        },
        Region {
            name: "stlrnc",
            lat_min: 62.0,
            lat_max: 64.0,
            lon_min: 168.0,
            lon_max: 172.0,
            method: RegionMethod::Nadcon { file: "stlrnc.ndc" },
        },
        Region {
            name: "stpaul",
            lat_min: 57.0,
            lat_max: 58.0,
            lon_min: 169.0,
            lon_max: 171.0,
            method: RegionMethod::Nadcon { file: "stpaul.ndc" },
        },
        Region {
            name: "canada",
            lat_min: 40.0,
            lat_max: 84.0,
            lon_min: 50.0,
            lon_max: 141.0,
            method: molodensky(-10.0, 158.0, 187.0),
        },
        Region {
            name: "mexico",
            lat_min: 12.0,
            lat_max: 33.0,
            lon_min: 86.0,
            lon_max: 118.0,
            method: molodensky(-12.0, 130.0, 190.0),
        },
        Region {
            name: "central-america",
            lat_min: 5.0,
            lat_max: 18.0,
            lon_min: 77.0,
            lon_max: 94.0,
            method: molodensky(0.0, 125.0, 194.0),
        },
        Region {
            name: "caribbean",
            lat_min: 8.0,
            lat_max: 27.0,
            lon_min: 58.0,
            lon_max: 90.0,
            method: molodensky(-7.0, 152.0, 178.0),
        },
    ]
}
