//! The coverage study engine.
//!
//! One engine process runs one study at a time through a three-call
//! contract: open the study, run scenarios, close the study. Everything the
//! engine needs from the station database arrives through the [`StationDb`]
//! collaborator trait; terrain, curves, grid, and the result cache are the
//! in-process subsystems wired together here.

pub mod config;
pub mod db;
pub mod error;
pub mod study;
pub mod totals;

pub use config::StudyConfig;
pub use db::{Scenario, StationDb};
pub use error::{EngineError, EngineResult};
pub use study::Study;
pub use totals::{AdvisoryCounts, CountryTotals, ScenarioTotals};
