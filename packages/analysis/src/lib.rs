#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Monitor coverage analysis.
//!
//! Fuses satellite PM2.5 grids, census blocks, and EPA monitors into
//! block, block-group, and county panels, then classifies areas whose
//! satellite exposure exceeds the NAAQS while their regulatory status says
//! attainment.
//!
//! Every stage has two faces: a pure function over in-memory tables (used
//! by the tests and callable without any cache) and a method on
//! [`Analysis`] that pulls inputs from a [`DataSource`] and memoizes the
//! result in an [`ArtifactCache`] under a key built from the stage name and
//! its arguments.

pub mod exposure;
pub mod misclass;
pub mod monitors;
pub mod mortality;
pub mod panels;
pub mod sample;

#[cfg(test)]
mod testing;

use moncov_cache::{ArtifactCache, CacheError};
use moncov_config::YearsConfig;
use moncov_geography_models::{GeoIdError, NaaqsRule};
use moncov_panel::PanelError;
use moncov_source::{DataSource, SourceError};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Errors raised by the analysis pipeline.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    /// Upstream data could not be loaded.
    #[error(transparent)]
    Source(#[from] SourceError),

    /// A cached artifact could not be read or written.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// A panel operation failed.
    #[error(transparent)]
    Panel(#[from] PanelError),

    /// A geographic id or unit name was malformed.
    #[error(transparent)]
    GeoId(#[from] GeoIdError),

    /// A monitor fell outside every county block and the state-wide search
    /// did not find exactly one block either.
    #[error(
        "Monitor {monitor_id} in state {state} county {county} matched {matches} blocks state-wide, expected exactly 1"
    )]
    UnresolvedMonitor {
        /// Monitor id.
        monitor_id: String,
        /// Two-digit state FIPS.
        state: String,
        /// Three-digit county code.
        county: String,
        /// Number of state-wide matches.
        matches: usize,
    },

    /// A monitor point fell inside more than one block of its county.
    #[error("Monitor {monitor_id} in county {county} is inside overlapping blocks {blocks:?}")]
    OverlappingBlocks {
        /// Monitor id.
        monitor_id: String,
        /// Five-digit county FIPS.
        county: String,
        /// Every block containing the point.
        blocks: Vec<String>,
    },

    /// The monitor listing repeats a monitor id.
    #[error("Monitor {monitor_id} is listed more than once")]
    DuplicateMonitor {
        /// Monitor id.
        monitor_id: String,
    },

    /// A population join left an id without a population.
    #[error("No population for {id}")]
    MissingPopulation {
        /// Block, block group, or county id.
        id: String,
    },

    /// The monitor summary panel has two readings for one monitor and year.
    #[error("Duplicate reading for monitor {monitor_id} in {year}")]
    DuplicateMonitorYear {
        /// Monitor id.
        monitor_id: String,
        /// Year.
        year: i32,
    },

    /// A panel does not have the requested year column.
    #[error("Year {year} is not in the panel")]
    MissingYear {
        /// Requested year.
        year: i32,
    },

    /// A rule name was not recognized.
    #[error("Unknown rule: {value}")]
    UnknownRule {
        /// The unrecognized name.
        value: String,
    },

    /// An exposure source name was not recognized.
    #[error("Unknown exposure source: {value}, expected multisatpm or msatna")]
    UnknownExposureSource {
        /// The unrecognized name.
        value: String,
    },

    /// Data conversion error.
    #[error("Conversion error: {message}")]
    Conversion {
        /// Description of what went wrong.
        message: String,
    },
}

/// Satellite product feeding the block exposure used for classification.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
pub enum ExposureSource {
    /// Multi-satellite CONUS product, three-year lagged block panel.
    #[strum(serialize = "multisatpm")]
    #[serde(rename = "multisatpm")]
    Multisatpm,
    /// North America single-year product, three-year lagged grid joined
    /// onto blocks.
    #[strum(serialize = "msatna")]
    #[serde(rename = "msatna")]
    Msatna,
}

impl ExposureSource {
    /// Parses an exposure source name.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError::UnknownExposureSource`] for any name other
    /// than `multisatpm` or `msatna`.
    pub fn parse(value: &str) -> Result<Self, AnalysisError> {
        value.parse().map_err(|_| AnalysisError::UnknownExposureSource {
            value: value.to_string(),
        })
    }
}

/// Parses a rule name (`pm25_97`, `pm25_06`, `pm25_12`).
///
/// # Errors
///
/// Returns [`AnalysisError::UnknownRule`] for any other name.
pub fn parse_rule(value: &str) -> Result<NaaqsRule, AnalysisError> {
    value.parse().map_err(|_| AnalysisError::UnknownRule {
        value: value.to_string(),
    })
}

/// Pipeline context: where data comes from, where artifacts are memoized,
/// and which years panels span.
pub struct Analysis<S> {
    source: S,
    cache: ArtifactCache,
    years: YearsConfig,
}

impl<S: DataSource> Analysis<S> {
    /// Creates a pipeline over `source`.
    #[must_use]
    pub const fn new(source: S, cache: ArtifactCache, years: YearsConfig) -> Self {
        Self {
            source,
            cache,
            years,
        }
    }

    /// Upstream data source.
    #[must_use]
    pub const fn source(&self) -> &S {
        &self.source
    }

    /// Artifact cache.
    #[must_use]
    pub const fn cache(&self) -> &ArtifactCache {
        &self.cache
    }

    /// Panel year ranges.
    #[must_use]
    pub const fn years(&self) -> &YearsConfig {
        &self.years
    }
}
