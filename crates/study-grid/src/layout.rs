//! Grid cell layout: local and global modes.

use serde::{Deserialize, Serialize};

use study_common::{IndexBounds, LatLon};

use crate::error::{GridError, GridResult};

/// Studies may not run closer to the poles than this.
pub const GRID_MAX_LATITUDE: f64 = 75.0;

/// Most bands a global layout will generate.
const MAX_BANDS: usize = 100;

/// Per-band area drift allowance; each band starts 1% large and ends 1%
/// small against the target cell width.
const BAND_DRIFT: f64 = 1.01;

/// Grid layout mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GridMode {
    /// One grid per source, uniform cell size in both axes.
    Local,
    /// One grid for many sources, globally aligned cell edges with
    /// latitude-banded longitude cell sizes.
    Global,
}

/// Grid configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridConfig {
    pub mode: GridMode,
    /// Target cell size, km.
    pub cell_size_km: f64,
    pub km_per_degree: f64,
}

impl GridConfig {
    pub fn new(mode: GridMode, cell_size_km: f64, km_per_degree: f64) -> Self {
        Self {
            mode,
            cell_size_km,
            km_per_degree,
        }
    }

    pub fn validate(&self) -> GridResult<()> {
        if self.cell_size_km <= 0.0 {
            return Err(GridError::BadConfig(format!(
                "cell size must be positive, got {}",
                self.cell_size_km
            )));
        }
        if self.km_per_degree <= 0.0 {
            return Err(GridError::BadConfig(format!(
                "km per degree must be positive, got {}",
                self.km_per_degree
            )));
        }
        Ok(())
    }

    /// Latitude cell size in whole arc-seconds.
    pub fn lat_size_seconds(&self) -> i32 {
        ((self.cell_size_km / self.km_per_degree * 3600.0).round() as i32).max(1)
    }

    /// The real (unrounded) target cell width in arc-seconds.
    fn target_seconds(&self) -> f64 {
        self.cell_size_km / self.km_per_degree * 3600.0
    }
}

/// One latitude band of the global layout.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatBand {
    /// Band start (inclusive), degrees of |latitude|.
    pub start_deg: f64,
    /// Longitude cell size, arc-seconds.
    pub lon_size: i32,
}

/// Lay out the global-mode latitude bands for a configuration.
///
/// Starting from the equator with cosLat = 1, each band's longitude cell
/// size is the rounded target width inflated by 1/cosLat, kept strictly
/// increasing (bumping by one arc-second and back-solving cosLat when
/// rounding stalls). A band ends where its real width has shrunk 2% from
/// the target; cosLat then drops by the same factor for the next band.
pub fn global_bands(config: &GridConfig) -> Vec<LatBand> {
    let target = config.target_seconds() * BAND_DRIFT;
    let mut bands = Vec::new();
    let mut cos_lat = 1.0f64;
    let mut prev_size = 0i32;
    let mut start_deg = 0.0f64;

    for _ in 0..MAX_BANDS {
        let mut lon_size = ((target / cos_lat).round() as i32).max(1);
        if lon_size <= prev_size {
            lon_size = prev_size + 1;
            cos_lat = target / lon_size as f64;
        }
        bands.push(LatBand {
            start_deg,
            lon_size,
        });
        prev_size = lon_size;

        let cos_break = (target * 0.98 / lon_size as f64).clamp(-1.0, 1.0);
        let break_deg = cos_break.acos().to_degrees();
        if break_deg >= GRID_MAX_LATITUDE {
            break;
        }
        start_deg = break_deg;
        cos_lat *= 0.98;
    }
    bands
}

fn band_lon_size(bands: &[LatBand], lat_deg: f64) -> i32 {
    let a = lat_deg.abs();
    let mut size = bands[0].lon_size;
    for b in bands {
        if b.start_deg <= a {
            size = b.lon_size;
        } else {
            break;
        }
    }
    size
}

/// One grid row.
#[derive(Debug, Clone, PartialEq)]
pub struct RowInfo {
    /// Longitude cell size, arc-seconds.
    pub lon_size: i32,
    /// East-longitude anchor: the largest lon_size-aligned index not
    /// exceeding the grid's east bound. May sit outside the nominal bounds.
    pub east_lon: i32,
    /// Cells in this row; never more than the grid width.
    pub cell_count: usize,
    /// Actual cell area from the spherical cosine, square km.
    pub cell_area_sqkm: f64,
}

/// A laid-out study grid.
#[derive(Debug, Clone)]
pub struct StudyGrid {
    pub mode: GridMode,
    /// Grid bounds in arc-seconds, latitude edges aligned to the cell size.
    pub bounds: IndexBounds,
    /// Latitude cell size, arc-seconds.
    pub lat_size: i32,
    pub rows: Vec<RowInfo>,
    /// Widest row; the cell array is `rows.len() * width` with trailing
    /// slots of shorter rows left empty.
    pub width: usize,
    pub km_per_degree: f64,
}

impl StudyGrid {
    /// Lay a grid over coverage bounds (arc-second indices).
    pub fn layout(config: &GridConfig, coverage: &IndexBounds) -> GridResult<StudyGrid> {
        config.validate()?;
        let north_deg = coverage.north_lat as f64 / 3600.0;
        let south_deg = coverage.south_lat as f64 / 3600.0;
        if north_deg.abs() > GRID_MAX_LATITUDE || south_deg.abs() > GRID_MAX_LATITUDE {
            return Err(GridError::LatitudeCeiling(north_deg.abs().max(south_deg.abs())));
        }

        let lat_size = config.lat_size_seconds();

        // Latitude edges align to an integer multiple of the cell size.
        let south = coverage.south_lat.div_euclid(lat_size) * lat_size;
        let north_cells = (coverage.north_lat - south + lat_size - 1) / lat_size;
        let north = south + north_cells.max(1) * lat_size;
        let row_count = ((north - south) / lat_size) as usize;

        let bands = match config.mode {
            GridMode::Global => global_bands(config),
            GridMode::Local => Vec::new(),
        };

        let mut rows = Vec::with_capacity(row_count);
        let mut width = 0usize;
        for r in 0..row_count {
            let row_south = south + r as i32 * lat_size;
            let center_lat_deg = (row_south as f64 + lat_size as f64 / 2.0) / 3600.0;
            let lon_size = match config.mode {
                GridMode::Local => lat_size,
                GridMode::Global => band_lon_size(&bands, center_lat_deg),
            };

            let east_lon = coverage.east_lon.div_euclid(lon_size) * lon_size;
            let cell_count =
                (((coverage.west_lon - east_lon) + lon_size - 1) / lon_size).max(1) as usize;

            let lat_step_km = lat_size as f64 / 3600.0 * config.km_per_degree;
            let lon_step_km = lon_size as f64 / 3600.0
                * config.km_per_degree
                * center_lat_deg.to_radians().cos();

            rows.push(RowInfo {
                lon_size,
                east_lon,
                cell_count,
                cell_area_sqkm: lat_step_km * lon_step_km,
            });
            width = width.max(cell_count);
        }

        let mut bounds = IndexBounds::initialize();
        bounds.extend_by_index(south, coverage.east_lon);
        bounds.extend_by_index(north - 1, coverage.west_lon - 1);

        tracing::debug!(rows = row_count, width, lat_size, "grid laid out");

        Ok(StudyGrid {
            mode: config.mode,
            bounds,
            lat_size,
            rows,
            width,
            km_per_degree: config.km_per_degree,
        })
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Total cell-array slots (`rows * width`), including the empty trailing
    /// slots of short rows.
    pub fn slot_count(&self) -> usize {
        self.rows.len() * self.width
    }

    /// Flat slot index for a cell.
    pub fn slot(&self, row: usize, col: usize) -> usize {
        row * self.width + col
    }

    /// Grid cell holding a point, or `None` outside the grid.
    pub fn cell_for(&self, lat_deg: f64, lon_deg: f64) -> Option<(usize, usize)> {
        let lat_idx = study_common::lat_index(lat_deg);
        let lon_idx = study_common::lon_index(lon_deg);
        self.cell_for_index(lat_idx, lon_idx)
    }

    /// Grid cell holding an arc-second index point.
    pub fn cell_for_index(&self, lat_idx: i32, lon_idx: i32) -> Option<(usize, usize)> {
        if lat_idx < self.bounds.south_lat || lat_idx >= self.bounds.north_lat {
            return None;
        }
        let row = ((lat_idx - self.bounds.south_lat) / self.lat_size) as usize;
        let info = &self.rows[row];
        if lon_idx < info.east_lon {
            return None;
        }
        let col = ((lon_idx - info.east_lon) / info.lon_size) as usize;
        if col >= info.cell_count {
            return None;
        }
        Some((row, col))
    }

    /// Geometric centre of a cell, degrees.
    pub fn cell_center(&self, row: usize, col: usize) -> LatLon {
        let info = &self.rows[row];
        let lat = (self.bounds.south_lat + row as i32 * self.lat_size) as f64
            + self.lat_size as f64 / 2.0;
        let lon = (info.east_lon + col as i32 * info.lon_size) as f64 + info.lon_size as f64 / 2.0;
        LatLon::new(lat / 3600.0, lon / 3600.0)
    }

    /// Cell area, square km.
    pub fn cell_area(&self, row: usize) -> f64 {
        self.rows[row].cell_area_sqkm
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use study_common::DEFAULT_KM_PER_DEGREE;

    fn coverage(south: f64, north: f64, east: f64, west: f64) -> IndexBounds {
        let mut b = IndexBounds::initialize();
        b.extend_by_point(south, east);
        b.extend_by_point(north, west);
        b
    }

    #[test]
    fn test_global_bands_first_band_matches_lat_size() {
        let config = GridConfig::new(GridMode::Global, 2.0, DEFAULT_KM_PER_DEGREE);
        let bands = global_bands(&config);
        assert_eq!(bands[0].start_deg, 0.0);
        assert_eq!(bands[0].lon_size, config.lat_size_seconds());
        assert!(bands.len() <= 100);
    }

    #[test]
    fn test_global_bands_strictly_increasing() {
        let config = GridConfig::new(GridMode::Global, 2.0, DEFAULT_KM_PER_DEGREE);
        let bands = global_bands(&config);
        for pair in bands.windows(2) {
            assert!(pair[1].lon_size > pair[0].lon_size);
            assert!(pair[1].start_deg > pair[0].start_deg);
        }
        let last = bands.last().unwrap();
        assert!(last.start_deg <= GRID_MAX_LATITUDE);
    }

    #[test]
    fn test_global_band_area_drift_small() {
        let config = GridConfig::new(GridMode::Global, 2.0, DEFAULT_KM_PER_DEGREE);
        let bands = global_bands(&config);
        let target = 2.0;
        // At each band start, the real cell width stays within ~2% of target.
        for b in &bands {
            let width_km = b.lon_size as f64 / 3600.0
                * DEFAULT_KM_PER_DEGREE
                * b.start_deg.to_radians().cos();
            let drift = (width_km - target).abs() / target;
            assert!(drift <= 0.025, "band at {} drifts {drift}", b.start_deg);
        }
    }

    #[test]
    fn test_local_layout_uniform() {
        let config = GridConfig::new(GridMode::Local, 1.0, DEFAULT_KM_PER_DEGREE);
        let grid = StudyGrid::layout(&config, &coverage(38.9, 39.4, 104.8, 105.6)).unwrap();
        assert_eq!(grid.mode, GridMode::Local);
        for row in &grid.rows {
            assert_eq!(row.lon_size, grid.lat_size);
            assert_eq!(row.east_lon, grid.rows[0].east_lon);
        }
        // Cell edges aligned to the cell size.
        assert_eq!(grid.bounds.south_lat % grid.lat_size, 0);
        assert_eq!(grid.rows[0].east_lon % grid.rows[0].lon_size, 0);
    }

    #[test]
    fn test_global_rows_offset_by_band() {
        let config = GridConfig::new(GridMode::Global, 2.0, DEFAULT_KM_PER_DEGREE);
        // Straddle a band break so rows get different lon sizes.
        let grid = StudyGrid::layout(&config, &coverage(9.0, 10.5, 104.0, 106.0)).unwrap();
        let sizes: Vec<i32> = grid.rows.iter().map(|r| r.lon_size).collect();
        assert!(
            sizes.iter().any(|&s| s != sizes[0]),
            "expected banded sizes, got {sizes:?}"
        );
        // Anchors align to each row's own size.
        for row in &grid.rows {
            assert_eq!(row.east_lon.rem_euclid(row.lon_size), 0);
        }
    }

    #[test]
    fn test_cell_index_round_trip() {
        let config = GridConfig::new(GridMode::Global, 2.0, DEFAULT_KM_PER_DEGREE);
        let grid = StudyGrid::layout(&config, &coverage(38.9, 39.4, 104.8, 105.6)).unwrap();
        for row in 0..grid.row_count() {
            for col in 0..grid.rows[row].cell_count {
                let c = grid.cell_center(row, col);
                let back = grid.cell_for(c.lat, c.lon);
                assert_eq!(back, Some((row, col)), "center of ({row},{col})");
            }
        }
    }

    #[test]
    fn test_cell_index_formula() {
        let config = GridConfig::new(GridMode::Global, 2.0, DEFAULT_KM_PER_DEGREE);
        let grid = StudyGrid::layout(&config, &coverage(38.9, 39.4, 104.8, 105.6)).unwrap();
        let (lat, lon) = (39.1234, 105.2345);
        let (row, col) = grid.cell_for(lat, lon).unwrap();
        let lat_idx = (lat * 3600.0).floor() as i32;
        let lon_idx = (lon * 3600.0).floor() as i32;
        assert_eq!(row as i32, (lat_idx - grid.bounds.south_lat) / grid.lat_size);
        assert_eq!(
            col as i32,
            (lon_idx - grid.rows[row].east_lon) / grid.rows[row].lon_size
        );
    }

    #[test]
    fn test_latitude_ceiling() {
        let config = GridConfig::new(GridMode::Global, 2.0, DEFAULT_KM_PER_DEGREE);
        let r = StudyGrid::layout(&config, &coverage(74.0, 76.5, 100.0, 101.0));
        assert!(matches!(r, Err(GridError::LatitudeCeiling(_))));
    }

    #[test]
    fn test_width_covers_widest_row() {
        let config = GridConfig::new(GridMode::Global, 2.0, DEFAULT_KM_PER_DEGREE);
        let grid = StudyGrid::layout(&config, &coverage(9.0, 10.5, 104.0, 106.0)).unwrap();
        assert_eq!(
            grid.width,
            grid.rows.iter().map(|r| r.cell_count).max().unwrap()
        );
        for row in &grid.rows {
            assert!(row.cell_count <= grid.width);
        }
    }
}
