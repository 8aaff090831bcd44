//! Study-point assembly from Census points.

use serde::{Deserialize, Serialize};

use study_common::{Country, LatLon};

use crate::layout::StudyGrid;
use crate::points::{CenPointStatus, CensusPoint, PointStore, StudyPoint};

/// How the Census points inside one cell become study points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregationMethod {
    /// One point per (cell, country) at the population-weighted centroid,
    /// optionally snapped to the nearest Census point.
    Centroid { snap: bool },
    /// One point per (cell, country) at the largest Census point.
    Largest,
    /// One point per (cell, country) at the geometric cell centre,
    /// optionally snapped to the nearest Census point.
    Center { snap: bool },
    /// One study point per Census point, coordinates preserved exactly.
    All,
}

/// One Census row from the population query.
#[derive(Debug, Clone)]
pub struct CensusRow {
    pub lat_index: i32,
    pub lon_index: i32,
    pub position: LatLon,
    pub population: u32,
    pub households: u32,
    pub block_id: u64,
}

/// Build the study point(s) for one (cell, country) from its Census rows.
/// Returns the created study-point indices; nothing is created for an empty
/// row set (empty cells get their implicit centre point lazily, when a
/// source's service area is found to cover them).
pub fn aggregate_cell(
    store: &mut PointStore,
    grid: &StudyGrid,
    row: usize,
    col: usize,
    country: Country,
    rows: &[CensusRow],
    method: AggregationMethod,
) -> Vec<u32> {
    if rows.is_empty() {
        return Vec::new();
    }

    let cell_area = grid.cell_area(row);
    let total_pop: u64 = rows.iter().map(|r| r.population as u64).sum();
    let total_hh: u64 = rows.iter().map(|r| r.households as u64).sum();

    match method {
        AggregationMethod::All => {
            let mut out = Vec::with_capacity(rows.len());
            for r in rows {
                // Area splits in proportion to population; with no
                // population anywhere it splits evenly.
                let share = if total_pop > 0 {
                    r.population as f64 / total_pop as f64
                } else {
                    1.0 / rows.len() as f64
                };
                let index = store.add_study_point(
                    row,
                    col,
                    StudyPoint {
                        position: r.position,
                        country: Some(country),
                        area_sqkm: cell_area * share,
                        population: r.population,
                        households: r.households,
                        cen_point_status: CenPointStatus::Complete,
                        ..Default::default()
                    },
                );
                attach_census(store, index, std::slice::from_ref(r));
                out.push(index);
            }
            out
        }
        method => {
            let position = match method {
                AggregationMethod::Centroid { snap } => {
                    let centroid = weighted_centroid(rows, total_pop);
                    if snap {
                        nearest_row(rows, centroid).position
                    } else {
                        centroid
                    }
                }
                AggregationMethod::Largest => {
                    rows.iter()
                        .max_by_key(|r| r.population)
                        .map(|r| r.position)
                        .unwrap_or_else(|| grid.cell_center(row, col))
                }
                AggregationMethod::Center { snap } => {
                    let center = grid.cell_center(row, col);
                    if snap {
                        nearest_row(rows, center).position
                    } else {
                        center
                    }
                }
                AggregationMethod::All => unreachable!(),
            };

            let index = store.add_study_point(
                row,
                col,
                StudyPoint {
                    position,
                    country: Some(country),
                    area_sqkm: cell_area,
                    population: total_pop as u32,
                    households: total_hh as u32,
                    cen_point_status: CenPointStatus::Complete,
                    ..Default::default()
                },
            );
            attach_census(store, index, rows);
            vec![index]
        }
    }
}

/// Create the implicit centre point of a cell with no population. The whole
/// cell area goes to this one point.
pub fn ensure_center_point(
    store: &mut PointStore,
    grid: &StudyGrid,
    row: usize,
    col: usize,
    country: Country,
) -> u32 {
    if let Some(head) = store.cell_head(row, col) {
        return head;
    }
    store.add_study_point(
        row,
        col,
        StudyPoint {
            position: grid.cell_center(row, col),
            country: Some(country),
            area_sqkm: grid.cell_area(row),
            cen_point_status: CenPointStatus::Complete,
            ..Default::default()
        },
    )
}

fn weighted_centroid(rows: &[CensusRow], total_pop: u64) -> LatLon {
    if total_pop == 0 {
        let n = rows.len() as f64;
        let lat = rows.iter().map(|r| r.position.lat).sum::<f64>() / n;
        let lon = rows.iter().map(|r| r.position.lon).sum::<f64>() / n;
        return LatLon::new(lat, lon);
    }
    let w = total_pop as f64;
    let lat = rows
        .iter()
        .map(|r| r.position.lat * r.population as f64)
        .sum::<f64>()
        / w;
    let lon = rows
        .iter()
        .map(|r| r.position.lon * r.population as f64)
        .sum::<f64>()
        / w;
    LatLon::new(lat, lon)
}

fn nearest_row(rows: &[CensusRow], to: LatLon) -> &CensusRow {
    let mut best = &rows[0];
    let mut best_d = f64::MAX;
    for r in rows {
        let dlat = r.position.lat - to.lat;
        let dlon = r.position.lon - to.lon;
        let d = dlat * dlat + dlon * dlon;
        if d < best_d {
            best_d = d;
            best = r;
        }
    }
    best
}

fn attach_census(store: &mut PointStore, point: u32, rows: &[CensusRow]) {
    for r in rows {
        store.add_census_point(
            point,
            CensusPoint {
                position: r.position,
                lat_index: r.lat_index,
                lon_index: r.lon_index,
                population: r.population,
                households: r.households,
                block_id: r.block_id,
                ..Default::default()
            },
        );
    }
}
