//! Station-database collaborator interface.

use study_common::{Country, IndexBounds, Source, SourceKey};
use study_grid::aggregate::CensusRow;

use crate::error::EngineResult;

/// One scenario of a study: the sources whose coverage is characterised and
/// the sources that may interfere with them.
#[derive(Debug, Clone)]
pub struct Scenario {
    pub key: u32,
    pub name: String,
    pub desired: Vec<SourceKey>,
    pub undesired: Vec<SourceKey>,
}

/// The relational query layer supplying station records and population.
///
/// Implementations are expected to hold the study's shared database lock for
/// the life of the study, which is what makes the cached source parameters
/// trustworthy across cooperating processes.
pub trait StationDb {
    /// Every source of the study, including DTS children.
    fn study_sources(&mut self) -> EngineResult<Vec<Source>>;

    /// The study's scenarios.
    fn scenarios(&mut self) -> EngineResult<Vec<Scenario>>;

    /// Population rows for one country inside an index bounding box:
    /// `(latIndex, lonIndex, position, population, households, blockID)`.
    fn population(
        &mut self,
        bounds: &IndexBounds,
        country: Country,
    ) -> EngineResult<Vec<CensusRow>>;
}
