//! The study context and scenario runner.

use std::collections::HashMap;

use chrono::Utc;
use tracing::{debug, info, warn};

use datum::{Datum, DatumConverter, DatumError};
use fcc_curves::{field_at_distance, CurveBand, CurveParams, CurveSet};
use result_cache::records::{country_byte, is_diff, CellRecord};
use result_cache::ResultCache;
use study_common::{bear_distance, IndexBounds, LatLon, Source, SourceKey};
use study_grid::aggregate::{aggregate_cell, ensure_center_point, CensusRow};
use study_grid::{
    service_area_contains, CenPointStatus, Field, FieldStatus, GridMode, PointStore, StudyGrid,
    StudyPoint,
};
use terrain::{haat, TerrainCache, TerrainConfig};

use crate::config::StudyConfig;
use crate::db::{Scenario, StationDb};
use crate::error::{EngineError, EngineResult};
use crate::totals::{AdvisoryCounts, ScenarioTotals};

/// Floor on a horizontal pattern value before conversion to dB.
const PATTERN_FLOOR: f64 = 0.01;

/// Radials used when a source arrives without a height above average
/// terrain.
const HAAT_RADIALS: usize = 8;

/// Which study points a field-computation pass visits.
enum PointFilter<'a> {
    /// Points inside a source's service area; empty cells covered by the
    /// area get their implicit centre point created on the way.
    ServiceArea(&'a Source),
    /// Points already holding a desired field for a source.
    HasField(SourceKey),
}

/// An open study: the three-call engine contract is `open`, any number of
/// `run_scenario` calls, then `close`.
#[derive(Debug)]
pub struct Study<D: StationDb> {
    config: StudyConfig,
    db: D,
    sources: HashMap<SourceKey, Source>,
    scenarios: Vec<Scenario>,
    terrain: TerrainCache,
    cache: ResultCache,
    store: PointStore,
    advisories: AdvisoryCounts,
}

impl<D: StationDb> Study<D> {
    /// Open a study: provision the terrain budget, load sources and
    /// scenarios through the collaborator, and convert source positions to
    /// NAD83 when the records arrive on another datum.
    pub fn open(config: StudyConfig, mut db: D) -> EngineResult<Study<D>> {
        config
            .validate()
            .map_err(|e| EngineError::Grid(format!("configuration: {e}")))?;

        let budget = terrain::initialize(
            config.process_count,
            config.total_ram_bytes,
            config.memory_cap,
        )?;
        let terrain = TerrainCache::new(TerrainConfig::new(&config.terrain_dir, budget));

        for sub in ["source", "desired_cell", "undesired_cell"] {
            let dir = config.study_dir.join(sub);
            std::fs::create_dir_all(&dir)
                .map_err(|e| EngineError::CacheCorrupt(format!("{}: {e}", dir.display())))?;
        }

        let mut advisories = AdvisoryCounts::default();
        let mut source_list = db.study_sources()?;
        if config.source_datum != Datum::Nad83 {
            let converter = DatumConverter::new(&config.datum_table_dir);
            for source in &mut source_list {
                match converter.to_nad83(config.source_datum, source.position) {
                    Ok(p) => source.position = p,
                    // The caller retains the input coordinates on the
                    // non-fatal conversion outcomes.
                    Err(DatumError::OutsideDataArea) => advisories.outside_data_area += 1,
                    Err(DatumError::IterationDidNotConverge) => {
                        advisories.iteration_did_not_converge += 1
                    }
                    Err(e) => return Err(EngineError::DatabaseIo(e.to_string())),
                }
            }
        }
        let sources: HashMap<SourceKey, Source> =
            source_list.into_iter().map(|s| (s.key, s)).collect();
        let scenarios = db.scenarios()?;
        info!(
            sources = sources.len(),
            scenarios = scenarios.len(),
            "study opened"
        );

        let cache = ResultCache::new(
            &config.study_dir,
            config.user_terrain_version,
            config.user_terrain_requested,
        );

        Ok(Study {
            config,
            db,
            sources,
            scenarios,
            terrain,
            cache,
            store: PointStore::new(),
            advisories,
        })
    }

    /// Close the study. Locks release with the last cache handle; this
    /// mostly exists to make the end of the contract explicit.
    pub fn close(self) {
        let stats = self.terrain.stats();
        info!(
            terrain_hits = stats.hits,
            terrain_misses = stats.misses,
            terrain_evictions = stats.evictions,
            "study closed"
        );
    }

    pub fn sources(&self) -> &HashMap<SourceKey, Source> {
        &self.sources
    }

    pub fn store(&self) -> &PointStore {
        &self.store
    }

    /// Run one scenario: lay out the grid, load population, compute or
    /// restore every desired field, add undesired contributions, and
    /// aggregate totals by country.
    pub fn run_scenario(&mut self, scenario_key: u32) -> EngineResult<ScenarioTotals> {
        let started_at = Utc::now();
        let scenario = self
            .scenarios
            .iter()
            .find(|s| s.key == scenario_key)
            .cloned()
            .ok_or(EngineError::UnknownScenario(scenario_key))?;
        info!(scenario = scenario_key, name = %scenario.name, "running scenario");

        let grid = self.layout_grid(&scenario)?;
        self.store.reset(&grid);
        self.load_population(&grid)?;

        for key in &scenario.desired {
            self.cell_setup(&grid, *key)?;
        }

        for und_key in &scenario.undesired {
            for des_key in &scenario.desired {
                self.undesired_setup(&grid, *und_key, *des_key)?;
            }
        }

        let mut totals = self.aggregate_totals(scenario_key, started_at);
        totals.finished_at = Utc::now();
        Ok(totals)
    }

    /// Coverage bounds for a scenario: the union of every desired source's
    /// (and DTS children's) coverage.
    fn layout_grid(&self, scenario: &Scenario) -> EngineResult<StudyGrid> {
        let mut bounds = IndexBounds::initialize();
        for key in &scenario.desired {
            let source = match self.sources.get(key) {
                Some(s) => s,
                None => {
                    warn!(key, "scenario names an unknown source");
                    continue;
                }
            };
            self.extend_by_source(&mut bounds, source);
            if let Some(dts) = source.dts() {
                for child in &dts.children {
                    if let Some(c) = self.sources.get(child) {
                        self.extend_by_source(&mut bounds, c);
                    }
                }
            }
        }
        if bounds.north_lat == i32::MIN {
            return Err(EngineError::Grid("scenario has no coverage area".into()));
        }
        Ok(StudyGrid::layout(&self.config.grid, &bounds)?)
    }

    fn extend_by_source(&self, bounds: &mut IndexBounds, source: &Source) {
        let km_per_degree = self.config.grid.km_per_degree;
        use study_common::GeographyKind;
        if let Some(geography) = &source.geography {
            match geography.kind() {
                GeographyKind::Polygon(vertices) => {
                    for v in vertices {
                        bounds.extend_by_point(v.lat, v.lon);
                    }
                    return;
                }
                GeographyKind::Circle { radius_km } => {
                    bounds.extend_by_radius(
                        source.position.lat,
                        source.position.lon,
                        *radius_km,
                        km_per_degree,
                    );
                    return;
                }
                GeographyKind::Box {
                    width_km,
                    height_km,
                } => {
                    let half_diagonal = (width_km * width_km + height_km * height_km).sqrt() / 2.0;
                    bounds.extend_by_radius(
                        source.position.lat,
                        source.position.lon,
                        half_diagonal,
                        km_per_degree,
                    );
                    return;
                }
                GeographyKind::Sectors(sectors) => {
                    let max = sectors.iter().map(|s| s.radius_km).fold(0.0, f64::max);
                    bounds.extend_by_radius(
                        source.position.lat,
                        source.position.lon,
                        max,
                        km_per_degree,
                    );
                    return;
                }
            }
        }
        if let Some(contour) = &source.contour {
            bounds.extend_by_radius(
                source.position.lat,
                source.position.lon,
                contour.max_distance(),
                km_per_degree,
            );
        }
    }

    /// Load population into the grid through the collaborator, one query per
    /// enabled country, and assign ground elevations to the new points.
    fn load_population(&mut self, grid: &StudyGrid) -> EngineResult<()> {
        for country in self.config.countries.clone() {
            let rows = self.db.population(&grid.bounds, country)?;
            let mut by_cell: HashMap<(usize, usize), Vec<CensusRow>> = HashMap::new();
            for row in rows {
                match grid.cell_for_index(row.lat_index, row.lon_index) {
                    Some(cell) => by_cell.entry(cell).or_default().push(row),
                    None => continue,
                }
            }
            for ((row, col), cell_rows) in by_cell {
                let created = aggregate_cell(
                    &mut self.store,
                    grid,
                    row,
                    col,
                    country,
                    &cell_rows,
                    self.config.aggregation,
                );
                for index in created {
                    let pos = self.store.study_points.get(index).position;
                    let elevation = self.terrain.elevation(pos.lat, pos.lon)?;
                    self.store.study_points.get_mut(index).elevation_m = elevation;
                }
            }
        }
        debug!(points = self.store.study_points.len(), "population loaded");
        Ok(())
    }

    /// Per-source setup: restore the desired fields from cache when the
    /// cached parameters still match, else compute and rewrite the cache.
    /// Calling this again after a successful cache read is a no-op for
    /// every point already holding this source's desired field.
    fn cell_setup(&mut self, grid: &StudyGrid, key: SourceKey) -> EngineResult<()> {
        let source = match self.sources.get(&key) {
            Some(s) => s.clone(),
            None => {
                warn!(key, "desired source missing from study");
                return Ok(());
            }
        };

        let cache_ok = self.cache.read_source(key, &source, &self.sources)?;
        if cache_ok {
            match self.cache.read_desired(key, grid) {
                Ok(Some(records)) => {
                    debug!(key, records = records.len(), "desired fields from cache");
                    self.apply_cached_records(grid, &records, true)?;
                    return Ok(());
                }
                Ok(None) => {}
                // CellOutsideGrid in particular: a hard error, logged by
                // the cache layer, and the file survives for inspection.
                Err(err) => return Err(err.into()),
            }
        }

        let mut records = if source.is_dts_parent() {
            self.compute_dts_parent(grid, &source)?
        } else {
            let height = self.effective_haat(&source)?;
            self.compute_fields(
                grid,
                &source,
                height,
                PointFilter::ServiceArea(&source),
                self.config.desired_set,
                0,
                false,
            )?
        };

        // Cache writes are best-effort: the computation never depends on
        // them landing.
        let used = self.terrain.user_terrain_used();
        if let Err(e) = self.cache.write_source(&source, &self.sources, used) {
            warn!(key, error = %e, "source cache write abandoned");
        } else if let Err(e) = self.cache.write_desired(key, used, &mut records) {
            warn!(key, error = %e, "desired cache write abandoned");
        }
        Ok(())
    }

    /// DTS parent: a placeholder desired field at every point in the parent
    /// service area (value 0, cached and calculated), then real fields for
    /// each child at those points, cached under the child's own key.
    fn compute_dts_parent(
        &mut self,
        grid: &StudyGrid,
        parent: &Source,
    ) -> EngineResult<Vec<CellRecord>> {
        let records = self.compute_fields(
            grid,
            parent,
            0.0,
            PointFilter::ServiceArea(parent),
            self.config.desired_set,
            0,
            false,
        )?;

        let children: Vec<Source> = parent
            .dts()
            .map(|d| {
                d.children
                    .iter()
                    .filter_map(|k| self.sources.get(k).cloned())
                    .collect()
            })
            .unwrap_or_default();
        for child in children {
            let height = self.effective_haat(&child)?;
            let mut child_records = self.compute_fields(
                grid,
                &child,
                height,
                PointFilter::HasField(parent.key),
                self.config.desired_set,
                0,
                false,
            )?;
            let used = self.terrain.user_terrain_used();
            if let Err(e) = self.cache.write_source(&child, &self.sources, used) {
                warn!(key = child.key, error = %e, "child source cache write abandoned");
            } else if let Err(e) = self.cache.write_desired(child.key, used, &mut child_records) {
                warn!(key = child.key, error = %e, "child desired cache write abandoned");
            }
        }
        Ok(records)
    }

    /// Undesired contribution of one source against one desired source's
    /// points, restored from the append-only cache where possible.
    fn undesired_setup(
        &mut self,
        grid: &StudyGrid,
        und_key: SourceKey,
        des_key: SourceKey,
    ) -> EngineResult<()> {
        let und = match self.sources.get(&und_key) {
            Some(s) => s.clone(),
            None => {
                warn!(key = und_key, "undesired source missing from study");
                return Ok(());
            }
        };
        let file_key = match grid.mode {
            GridMode::Global => None,
            GridMode::Local => Some(des_key),
        };

        let cache_ok = self.cache.read_source(und_key, &und, &self.sources)?;
        if cache_ok {
            if let Some(records) = self.cache.read_undesired(und_key, file_key, grid)? {
                self.apply_cached_records(grid, &records, false)?;
            }
        }

        let height = self.effective_haat(&und)?;
        let new_records = self.compute_fields(
            grid,
            &und,
            height,
            PointFilter::HasField(des_key),
            self.config.undesired_set,
            percent_byte(self.config.undesired_set),
            true,
        )?;

        if new_records.is_empty() {
            return Ok(());
        }
        let used = self.terrain.user_terrain_used();
        if !cache_ok {
            if let Err(e) = self.cache.write_source(&und, &self.sources, used) {
                warn!(key = und_key, error = %e, "undesired source cache write abandoned");
                return Ok(());
            }
        }
        match self.cache.append_undesired(und_key, file_key, used, &new_records) {
            Ok(true) => {}
            Ok(false) => debug!(key = und_key, "undesired append abandoned to another process"),
            Err(e) => warn!(key = und_key, error = %e, "undesired cache write abandoned"),
        }
        Ok(())
    }

    /// Source height above average terrain, deriving it from radial terrain
    /// averages when the record carries none.
    fn effective_haat(&mut self, source: &Source) -> EngineResult<f64> {
        if source.height_aat > 0.0 {
            return Ok(source.height_aat);
        }
        let computed = haat(
            &mut self.terrain,
            source.position,
            source.height_amsl,
            HAAT_RADIALS,
            self.config.grid.km_per_degree,
        )?;
        Ok(computed)
    }

    /// The shared field-computation pass. Visits the filtered points, skips
    /// any that already hold the (source, percent-time) field, computes and
    /// attaches the rest, and returns the freshly computed cell records in
    /// cache layout.
    #[allow(clippy::too_many_arguments)]
    fn compute_fields(
        &mut self,
        grid: &StudyGrid,
        source: &Source,
        height: f64,
        filter: PointFilter<'_>,
        set: CurveSet,
        percent_time: u8,
        is_undesired: bool,
    ) -> EngineResult<Vec<CellRecord>> {
        let km_per_degree = self.config.grid.km_per_degree;
        let truncate_dts = self.config.truncate_dts;
        let min_distance_policy = self.config.min_distance_policy;
        let placeholder = source.is_dts_parent() && !is_undesired;
        let mut records = Vec::new();

        for row in 0..grid.row_count() {
            for col in 0..grid.rows[row].cell_count {
                // An empty cell only gets its implicit centre point when a
                // source's service area is found to cover it.
                if let PointFilter::ServiceArea(s) = &filter {
                    if self.store.cell_head(row, col).is_none() {
                        let center = grid.cell_center(row, col);
                        if service_area_contains(
                            s,
                            &self.sources,
                            center,
                            truncate_dts,
                            km_per_degree,
                        ) {
                            let index = ensure_center_point(
                                &mut self.store,
                                grid,
                                row,
                                col,
                                study_common::Country::Us,
                            );
                            let elevation = self.terrain.elevation(center.lat, center.lon)?;
                            self.store.study_points.get_mut(index).elevation_m = elevation;
                        }
                    }
                }

                for point_index in self.store.points_in_cell(row, col) {
                    let point_pos = self.store.study_points.get(point_index).position;
                    let visit = match &filter {
                        PointFilter::ServiceArea(s) => service_area_contains(
                            s,
                            &self.sources,
                            point_pos,
                            truncate_dts,
                            km_per_degree,
                        ),
                        PointFilter::HasField(key) => self
                            .store
                            .find_field(point_index, *key, 0)
                            .is_some(),
                    };
                    if !visit {
                        continue;
                    }
                    if self
                        .store
                        .find_field(point_index, source.key, percent_time)
                        .is_some()
                    {
                        continue;
                    }

                    let field = if placeholder {
                        Field {
                            source_key: source.key,
                            percent_time,
                            field_dbu: 0.0,
                            status: FieldStatus::Calculated,
                            cached: true,
                            is_undesired,
                            ..Default::default()
                        }
                    } else {
                        let (bearing, reverse, distance) = bear_distance(
                            source.position.lat,
                            source.position.lon,
                            point_pos.lat,
                            point_pos.lon,
                            km_per_degree,
                        );
                        let hpat_db =
                            20.0 * source.horizontal_field_at(bearing).max(PATTERN_FLOOR).log10();
                        let mut params = CurveParams::new(CurveBand::for_band(source.band), set)
                            .with_source(source, bearing);
                        params.min_distance_policy = min_distance_policy;
                        let value =
                            field_at_distance(source.erp_dbk() + hpat_db, distance, height, &params);
                        self.advisories.absorb(value.advisories);
                        Field {
                            source_key: source.key,
                            percent_time,
                            bearing_deg: bearing,
                            reverse_bearing_deg: reverse,
                            distance_km: distance,
                            field_dbu: value.value,
                            status: FieldStatus::Calculated,
                            cached: false,
                            is_undesired,
                            ..Default::default()
                        }
                    };
                    records.push(self.make_record(grid, point_index, &field));
                    self.store.add_field(point_index, field)?;
                }
            }
        }
        Ok(records)
    }

    fn make_record(&self, grid: &StudyGrid, point_index: u32, field: &Field) -> CellRecord {
        let point = self.store.study_points.get(point_index);
        let row = point.row as usize;
        let cell_lat = grid.bounds.south_lat + point.row as i32 * grid.lat_size;
        let cell_lon = grid.rows[row].east_lon + point.col as i32 * grid.rows[row].lon_size;
        CellRecord {
            lat: point.position.lat,
            lon: point.position.lon,
            cell_lat,
            cell_lon,
            population: point.population,
            households: point.households,
            area_sqkm: point.area_sqkm,
            elevation_m: point.elevation_m,
            bearing_deg: field.bearing_deg,
            reverse_bearing_deg: field.reverse_bearing_deg,
            distance_km: field.distance_km,
            field_dbu: field.field_dbu,
            source_key: field.source_key,
            country: country_byte(point.country.unwrap_or(study_common::Country::Us)),
            clutter: point.clutter,
            percent_time: field.percent_time,
            status: match field.status {
                FieldStatus::Calculated => 0,
                FieldStatus::Uncalculated => -1,
            },
            checksum: 0,
        }
    }

    /// Replay cached cell records into the point store. Desired records may
    /// create points that were cached without their census detail; undesired
    /// records only attach to points that already exist.
    fn apply_cached_records(
        &mut self,
        grid: &StudyGrid,
        records: &[CellRecord],
        create_points: bool,
    ) -> EngineResult<()> {
        for rec in records {
            let (row, col) = match grid.cell_for_index(rec.cell_lat, rec.cell_lon) {
                Some(cell) => cell,
                None => continue,
            };
            let existing = self.store.points_in_cell(row, col).into_iter().find(|&i| {
                let p = self.store.study_points.get(i);
                !is_diff(p.position.lat, rec.lat) && !is_diff(p.position.lon, rec.lon)
            });
            let point_index = match existing {
                Some(i) => i,
                None if create_points => self.store.add_study_point(
                    row,
                    col,
                    StudyPoint {
                        position: LatLon::new(rec.lat, rec.lon),
                        country: Some(rec.country_enum()),
                        elevation_m: rec.elevation_m,
                        clutter: rec.clutter,
                        area_sqkm: rec.area_sqkm,
                        population: rec.population,
                        households: rec.households,
                        cen_point_status: CenPointStatus::CachedPartial,
                        ..Default::default()
                    },
                ),
                None => continue,
            };
            if self
                .store
                .find_field(point_index, rec.source_key, rec.percent_time)
                .is_some()
            {
                continue;
            }
            self.store.add_field(
                point_index,
                Field {
                    source_key: rec.source_key,
                    percent_time: rec.percent_time,
                    bearing_deg: rec.bearing_deg,
                    reverse_bearing_deg: rec.reverse_bearing_deg,
                    distance_km: rec.distance_km,
                    field_dbu: rec.field_dbu,
                    status: if rec.status < 0 {
                        FieldStatus::Uncalculated
                    } else {
                        FieldStatus::Calculated
                    },
                    cached: true,
                    is_undesired: rec.percent_time != 0,
                    ..Default::default()
                },
            )?;
        }
        Ok(())
    }

    /// Sum the scenario's coverage by country: a point counts as served when
    /// it holds any calculated desired field.
    fn aggregate_totals(
        &mut self,
        scenario_key: u32,
        started_at: chrono::DateTime<Utc>,
    ) -> ScenarioTotals {
        let mut totals = ScenarioTotals {
            scenario_key,
            by_country: Default::default(),
            advisories: self.advisories,
            started_at,
            finished_at: started_at,
        };
        for index in self.store.all_points() {
            let point = self.store.study_points.get(index);
            let country = point.country.unwrap_or(study_common::Country::Us);
            let entry = totals.country_mut(country);
            entry.study_points += 1;

            let mut served = false;
            let mut cursor = point.first_field;
            while let Some(i) = cursor {
                let f = self.store.fields.get(i);
                if f.percent_time == 0 && f.status == FieldStatus::Calculated {
                    served = true;
                    break;
                }
                cursor = f.next;
            }
            if served {
                entry.served_points += 1;
                entry.area_sqkm += point.area_sqkm;
                entry.population += point.population as u64;
                entry.households += point.households as u64;
            }
        }
        totals
    }
}

/// Percent-time byte for an undesired field record.
fn percent_byte(set: CurveSet) -> u8 {
    match set {
        CurveSet::F5050 => 50,
        CurveSet::F5010 => 10,
        CurveSet::F5090 => 90,
    }
}
