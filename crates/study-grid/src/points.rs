//! Slab-pooled study points, census points, and field records.
//!
//! The three record kinds are drawn from arena pools with `u32` indices in
//! place of pointers; list membership (points in a cell, fields on a point,
//! census points behind a study point) is threaded through `next` indices.
//! Resetting a pool is a counter reset; slab memory is retained across
//! scenarios.

use study_common::{Country, LatLon, SourceKey};

use crate::error::{GridError, GridResult};
use crate::layout::StudyGrid;

/// Study points allocated per slab.
pub const STUDY_POINT_SLAB: usize = 50_000;
/// Census points allocated per slab.
pub const CENSUS_POINT_SLAB: usize = 100_000;
/// Field records allocated per slab.
pub const FIELD_SLAB: usize = 200_000;

/// A fixed-slab arena pool indexed by `u32`.
#[derive(Debug)]
pub struct Pool<T> {
    slabs: Vec<Vec<T>>,
    slab_size: usize,
    len: usize,
}

impl<T> Pool<T> {
    pub fn new(slab_size: usize) -> Self {
        Self {
            slabs: Vec::new(),
            slab_size,
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Allocate one record, reusing retained slab memory when available.
    pub fn alloc(&mut self, value: T) -> u32 {
        let slab = self.len / self.slab_size;
        let offset = self.len % self.slab_size;
        if slab == self.slabs.len() {
            self.slabs.push(Vec::with_capacity(self.slab_size));
        }
        if offset < self.slabs[slab].len() {
            self.slabs[slab][offset] = value;
        } else {
            self.slabs[slab].push(value);
        }
        let index = self.len as u32;
        self.len += 1;
        index
    }

    pub fn get(&self, index: u32) -> &T {
        let i = index as usize;
        &self.slabs[i / self.slab_size][i % self.slab_size]
    }

    pub fn get_mut(&mut self, index: u32) -> &mut T {
        let i = index as usize;
        &mut self.slabs[i / self.slab_size][i % self.slab_size]
    }

    /// Reset the free index; slab memory is kept for the next scenario.
    pub fn reset(&mut self) {
        self.len = 0;
    }
}

/// Construction status of a study point's census-point list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CenPointStatus {
    /// Point restored from cache without its census points.
    #[default]
    CachedPartial,
    /// Census points are being attached.
    Constructing,
    /// List complete.
    Complete,
}

/// Calculation status of a field record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FieldStatus {
    #[default]
    Uncalculated,
    Calculated,
}

/// One study point: a representative location inside a grid cell.
#[derive(Debug, Clone, Default)]
pub struct StudyPoint {
    pub position: LatLon,
    pub row: u32,
    pub col: u32,
    pub country: Option<Country>,
    pub elevation_m: f64,
    pub clutter: u8,
    pub area_sqkm: f64,
    pub population: u32,
    pub households: u32,
    /// Head of this point's field list.
    pub first_field: Option<u32>,
    /// Head of this point's census-point list.
    pub first_census: Option<u32>,
    pub cen_point_status: CenPointStatus,
    /// Next study point in the same cell.
    pub next: Option<u32>,
}

/// One census point.
#[derive(Debug, Clone, Default)]
pub struct CensusPoint {
    pub position: LatLon,
    pub lat_index: i32,
    pub lon_index: i32,
    pub population: u32,
    pub households: u32,
    pub block_id: u64,
    /// Next census point behind the same study point.
    pub next: Option<u32>,
}

/// One field-strength record on a study point.
#[derive(Debug, Clone, Default)]
pub struct Field {
    pub source_key: SourceKey,
    /// 0 for the desired field; the variability percentile otherwise.
    pub percent_time: u8,
    pub bearing_deg: f64,
    pub reverse_bearing_deg: f64,
    pub distance_km: f64,
    pub field_dbu: f64,
    pub status: FieldStatus,
    pub cached: bool,
    pub is_undesired: bool,
    /// Next field on the same study point.
    pub next: Option<u32>,
}

/// Pools plus the per-cell study-point list heads for one scenario.
#[derive(Debug)]
pub struct PointStore {
    pub study_points: Pool<StudyPoint>,
    pub census_points: Pool<CensusPoint>,
    pub fields: Pool<Field>,
    cell_heads: Vec<Option<u32>>,
    width: usize,
}

impl PointStore {
    pub fn new() -> Self {
        Self {
            study_points: Pool::new(STUDY_POINT_SLAB),
            census_points: Pool::new(CENSUS_POINT_SLAB),
            fields: Pool::new(FIELD_SLAB),
            cell_heads: Vec::new(),
            width: 0,
        }
    }

    /// Reset for a new scenario's grid. Pool memory is retained.
    pub fn reset(&mut self, grid: &StudyGrid) {
        self.study_points.reset();
        self.census_points.reset();
        self.fields.reset();
        self.cell_heads.clear();
        self.cell_heads.resize(grid.slot_count(), None);
        self.width = grid.width;
    }

    /// Add a study point to a cell's list. Returns its pool index.
    pub fn add_study_point(&mut self, row: usize, col: usize, mut point: StudyPoint) -> u32 {
        let slot = row * self.width + col;
        point.row = row as u32;
        point.col = col as u32;
        point.next = self.cell_heads[slot];
        let index = self.study_points.alloc(point);
        self.cell_heads[slot] = Some(index);
        index
    }

    /// Head of a cell's study-point list.
    pub fn cell_head(&self, row: usize, col: usize) -> Option<u32> {
        self.cell_heads[row * self.width + col]
    }

    /// Indices of every study point in a cell.
    pub fn points_in_cell(&self, row: usize, col: usize) -> Vec<u32> {
        let mut out = Vec::new();
        let mut cursor = self.cell_head(row, col);
        while let Some(i) = cursor {
            out.push(i);
            cursor = self.study_points.get(i).next;
        }
        out
    }

    /// Indices of every study point in the store.
    pub fn all_points(&self) -> Vec<u32> {
        (0..self.study_points.len() as u32).collect()
    }

    /// Find a point's field record for (source, percent-time).
    pub fn find_field(&self, point: u32, source: SourceKey, percent_time: u8) -> Option<u32> {
        let mut cursor = self.study_points.get(point).first_field;
        while let Some(i) = cursor {
            let f = self.fields.get(i);
            if f.source_key == source && f.percent_time == percent_time {
                return Some(i);
            }
            cursor = f.next;
        }
        None
    }

    /// Attach a field record to a point. A second record for the same
    /// (source, percent-time) is fatal.
    pub fn add_field(&mut self, point: u32, mut field: Field) -> GridResult<u32> {
        if self.find_field(point, field.source_key, field.percent_time).is_some() {
            return Err(GridError::DuplicateField {
                point,
                source_key: field.source_key,
                percent_time: field.percent_time,
            });
        }
        field.next = self.study_points.get(point).first_field;
        let index = self.fields.alloc(field);
        self.study_points.get_mut(point).first_field = Some(index);
        Ok(index)
    }

    /// Attach a census point to a study point's list.
    pub fn add_census_point(&mut self, point: u32, mut census: CensusPoint) -> u32 {
        census.next = self.study_points.get(point).first_census;
        let index = self.census_points.alloc(census);
        self.study_points.get_mut(point).first_census = Some(index);
        index
    }
}

impl Default for PointStore {
    fn default() -> Self {
        Self::new()
    }
}
