#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Upstream data collaborators.
//!
//! The exposure pipeline never parses raw EPA, satellite, or census files
//! itself. It asks these traits for already-parsed records. [`CsvDirSource`]
//! implements all of them over a directory of normalized CSV and `GeoJSON`
//! files; tests implement them in memory.

pub mod csv_dir;

use std::collections::BTreeMap;

use moncov_geography_models::{
    AnnualSummary, BlockInfo, MonitorSite, MortalityRecord, NaaqsAssessmentSite, NaaqsRule,
};
use moncov_grid::GridValue;
use moncov_spatial::{BlockShape, SpatialError};

pub use csv_dir::CsvDirSource;

/// Boolean flags keyed by id then year (nonattainment per block, validity
/// per monitor). Absent entries mean "not flagged / unknown".
pub type FlagPanel = BTreeMap<String, BTreeMap<i32, bool>>;

/// Errors that can occur while loading upstream data.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// An input file could not be opened.
    #[error("I/O error reading {path}: {source}")]
    Io {
        /// File path.
        path: std::path::PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// CSV parsing failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Block geometry could not be read.
    #[error("Geometry error: {0}")]
    Spatial(#[from] SpatialError),

    /// Data conversion error.
    #[error("Conversion error: {message}")]
    Conversion {
        /// Description of what went wrong.
        message: String,
    },
}

/// Census block geometry and population.
pub trait CensusSource {
    /// Every block summarized to a representative point and area.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the block table cannot be loaded.
    fn blocks_shape_info(&self) -> Result<Vec<BlockInfo>, SourceError>;

    /// Population per block id.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the population table cannot be loaded.
    fn blocks_population(&self) -> Result<BTreeMap<String, u64>, SourceError>;

    /// Full block polygons for one state (two-digit FIPS).
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the state's geometry cannot be loaded.
    fn block_shapes(&self, state_fips: &str) -> Result<Vec<BlockShape>, SourceError>;
}

/// Satellite PM2.5 surfaces.
pub trait SatelliteSource {
    /// Current multi-satellite CONUS annual surface.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the year's grid cannot be loaded.
    fn multisat_conus_year(&self, year: i32) -> Result<Vec<GridValue>, SourceError>;

    /// North America single-year surface.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the year's grid cannot be loaded.
    fn msat_northamer_1year(&self, year: i32) -> Result<Vec<GridValue>, SourceError>;

    /// Legacy v04NA01 North America three-year surface, CONUS subset.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the year's grid cannot be loaded.
    fn msat_northamer_conus_3year(&self, year: i32) -> Result<Vec<GridValue>, SourceError>;
}

/// EPA monitors and regulatory bookkeeping.
pub trait EpaSource {
    /// Monitor metadata.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the monitor listing cannot be loaded.
    fn monitors_data(&self) -> Result<Vec<MonitorSite>, SourceError>;

    /// Annual summary readings for `year`.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the year's summary cannot be loaded.
    fn monitors_annual_summary(&self, year: i32) -> Result<Vec<AnnualSummary>, SourceError>;

    /// Block × year nonattainment designations under `rule`.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the designations cannot be loaded.
    fn nonattainment_block_panel(&self, rule: NaaqsRule) -> Result<FlagPanel, SourceError>;

    /// Monitor × year flag: did the reading count toward a NAAQS design
    /// value.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the flags cannot be loaded.
    fn valid_flag_panel(&self) -> Result<FlagPanel, SourceError>;

    /// Sites on the NAAQS assessment list.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the list cannot be loaded.
    fn naaqs_assessment_monitors(&self) -> Result<Vec<NaaqsAssessmentSite>, SourceError>;
}

/// County mortality.
pub trait MortalitySource {
    /// County × year deaths and rates.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the table cannot be loaded.
    fn mortality(&self) -> Result<Vec<MortalityRecord>, SourceError>;
}

/// Everything the pipeline reads.
pub trait DataSource: CensusSource + SatelliteSource + EpaSource + MortalitySource {}

impl<T: CensusSource + SatelliteSource + EpaSource + MortalitySource> DataSource for T {}
