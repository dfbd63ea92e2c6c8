#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Census geography identifiers and the upstream record types consumed by
//! the exposure pipeline.
//!
//! Census geography nests by id prefix: a 15-character block id contains its
//! 12-character block group id, which contains its 5-character county
//! (FIPS) id. Every aggregation in the pipeline leans on that containment.

pub mod fips;
pub mod naaqs;

pub use naaqs::NaaqsRule;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Length of a census block id (`SSCCCTTTTTTBBBB`).
pub const BLOCK_ID_LEN: usize = 15;
/// Length of a census block group id.
pub const BLOCK_GROUP_ID_LEN: usize = 12;
/// Length of a county FIPS id.
pub const COUNTY_ID_LEN: usize = 5;
/// Length of a state FIPS id.
pub const STATE_ID_LEN: usize = 2;

/// EPA parameter code for PM2.5 (FRM/FEM mass).
pub const PM25_PARAMETER_CODE: u32 = 88_101;

/// Errors raised when a geographic identifier or unit name is malformed.
#[derive(Debug, thiserror::Error)]
pub enum GeoIdError {
    /// An id did not have the expected length or was not all digits.
    #[error("Invalid {unit} id '{id}'")]
    InvalidId {
        /// Granularity the id was expected to have.
        unit: GeoUnit,
        /// The offending id.
        id: String,
    },

    /// An aggregation target name was not recognized.
    #[error("Invalid geounit: {value}")]
    InvalidGeoUnit {
        /// The unrecognized name.
        value: String,
    },
}

/// Granularity of a geographic unit.
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
pub enum GeoUnit {
    /// Census block (15 characters).
    #[strum(serialize = "block")]
    #[serde(rename = "block")]
    Block,
    /// Census block group (12 characters).
    #[strum(serialize = "bg")]
    #[serde(rename = "bg")]
    BlockGroup,
    /// County (5 characters).
    #[strum(serialize = "fips")]
    #[serde(rename = "fips")]
    County,
}

impl GeoUnit {
    /// Parses an aggregation target name (`"block"`, `"bg"`, `"fips"`).
    ///
    /// # Errors
    ///
    /// Returns [`GeoIdError::InvalidGeoUnit`] for any other name.
    pub fn parse(value: &str) -> Result<Self, GeoIdError> {
        value.parse().map_err(|_| GeoIdError::InvalidGeoUnit {
            value: value.to_string(),
        })
    }

    /// Number of leading block-id characters identifying this unit.
    #[must_use]
    pub const fn id_len(self) -> usize {
        match self {
            Self::Block => BLOCK_ID_LEN,
            Self::BlockGroup => BLOCK_GROUP_ID_LEN,
            Self::County => COUNTY_ID_LEN,
        }
    }

    /// Truncates a block id to the id of the containing unit of this
    /// granularity.
    ///
    /// Returns `None` if `block_id` is shorter than the unit's id.
    #[must_use]
    pub fn from_block(self, block_id: &str) -> Option<&str> {
        block_id.get(..self.id_len())
    }

    /// Checks that `id` is a well-formed id of this granularity.
    ///
    /// # Errors
    ///
    /// Returns [`GeoIdError::InvalidId`] if the id has the wrong length or
    /// contains non-digit characters.
    pub fn validate(self, id: &str) -> Result<(), GeoIdError> {
        if id.len() == self.id_len() && id.bytes().all(|b| b.is_ascii_digit()) {
            Ok(())
        } else {
            Err(GeoIdError::InvalidId {
                unit: self,
                id: id.to_string(),
            })
        }
    }
}

/// Block group id (first 12 characters) of a block id.
#[must_use]
pub fn block_group_id(block_id: &str) -> Option<&str> {
    GeoUnit::BlockGroup.from_block(block_id)
}

/// County FIPS id (first 5 characters) of a block id.
#[must_use]
pub fn county_id(block_id: &str) -> Option<&str> {
    GeoUnit::County.from_block(block_id)
}

/// State FIPS id (first 2 characters) of any census id.
#[must_use]
pub fn state_id(geoid: &str) -> Option<&str> {
    geoid.get(..STATE_ID_LEN)
}

/// A census block summarized to a representative point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockInfo {
    /// 15-character block id.
    pub block_id: String,
    /// Representative longitude.
    pub x: f64,
    /// Representative latitude.
    pub y: f64,
    /// Land area.
    pub area: f64,
}

/// EPA monitor metadata (one row per monitor).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorSite {
    /// Monitor id (`SSCCC_S_PPPPPP` style).
    pub monitor_id: String,
    /// Site id as `"SSCCC_N"`.
    pub site_id: String,
    /// Raw state code; `"CC"` for Canada.
    pub state_code: String,
    /// Raw county code.
    pub county_code: String,
    /// EPA parameter code.
    pub parameter_code: u32,
    /// Latitude, when reported.
    pub latitude: Option<f64>,
    /// Longitude, when reported.
    pub longitude: Option<f64>,
    /// `"Y"` when the monitor is the site's NAAQS primary monitor.
    #[serde(default)]
    pub naaqs_primary_monitor: String,
}

impl MonitorSite {
    /// Whether this is the site's NAAQS primary monitor.
    #[must_use]
    pub fn is_primary(&self) -> bool {
        self.naaqs_primary_monitor == "Y"
    }

    /// Five-digit county FIPS, if the raw codes are numeric.
    #[must_use]
    pub fn fips(&self) -> Option<String> {
        fips::county_fips_from_raw(&self.state_code, &self.county_code)
    }
}

/// One EPA annual summary reading (monitor × year × standard).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnualSummary {
    /// Monitor id.
    pub monitor_id: String,
    /// Reading year.
    pub year: i32,
    /// Raw state code; `"CC"` for Canada.
    pub state_code: String,
    /// Raw county code.
    pub county_code: String,
    /// EPA parameter code.
    pub parameter_code: u32,
    /// Pollutant standard (e.g. `"PM25 Annual 2006"`).
    pub pollutant_standard: String,
    /// Exceptional event handling (e.g. `"No Events"`).
    pub event_type: String,
    /// Latitude.
    pub latitude: Option<f64>,
    /// Longitude.
    pub longitude: Option<f64>,
    /// Annual arithmetic mean concentration.
    pub arithmetic_mean: f64,
}

impl AnnualSummary {
    /// Five-digit county FIPS, if the raw codes are numeric.
    #[must_use]
    pub fn fips(&self) -> Option<String> {
        fips::county_fips_from_raw(&self.state_code, &self.county_code)
    }
}

/// A site listed in the NAAQS assessment monitor list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NaaqsAssessmentSite {
    /// County FIPS of the assessed area.
    pub fips: String,
    /// Normalized site id (`SSCCC` + 4-digit site number).
    pub site_id: String,
}

/// County mortality for one year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MortalityRecord {
    /// County FIPS.
    pub fips: String,
    /// Year.
    pub year: i32,
    /// Deaths.
    pub deaths: u64,
    /// Population.
    pub population: u64,
    /// Crude rate per 100,000.
    pub rate: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLOCK: &str = "060371234561001";

    #[test]
    fn hierarchy_is_prefix_containment() {
        assert_eq!(block_group_id(BLOCK), Some("060371234561"));
        assert_eq!(county_id(BLOCK), Some("06037"));
        assert_eq!(state_id(BLOCK), Some("06"));

        let bg = block_group_id(BLOCK).unwrap();
        assert!(GeoUnit::BlockGroup.validate(bg).is_ok());
        assert!(GeoUnit::County.validate(county_id(bg).unwrap()).is_ok());
        assert!(BLOCK.starts_with(bg));
        assert!(bg.starts_with(county_id(BLOCK).unwrap()));
    }

    #[test]
    fn short_ids_have_no_parent() {
        assert_eq!(block_group_id("0603"), None);
        assert_eq!(county_id("0603"), None);
    }

    #[test]
    fn validate_rejects_malformed_ids() {
        assert!(GeoUnit::Block.validate(BLOCK).is_ok());
        assert!(GeoUnit::Block.validate("06037").is_err());
        assert!(GeoUnit::County.validate("06a37").is_err());
    }

    #[test]
    fn geounit_parse() {
        assert_eq!(GeoUnit::parse("block").unwrap(), GeoUnit::Block);
        assert_eq!(GeoUnit::parse("bg").unwrap(), GeoUnit::BlockGroup);
        assert_eq!(GeoUnit::parse("fips").unwrap(), GeoUnit::County);
        let err = GeoUnit::parse("tract").unwrap_err();
        assert_eq!(err.to_string(), "Invalid geounit: tract");
    }

    #[test]
    fn monitor_fips_and_primary_flag() {
        let site = MonitorSite {
            monitor_id: "06037_1103_881011".to_string(),
            site_id: "06037_1103".to_string(),
            state_code: "6".to_string(),
            county_code: "37".to_string(),
            parameter_code: PM25_PARAMETER_CODE,
            latitude: Some(34.06),
            longitude: Some(-118.22),
            naaqs_primary_monitor: "Y".to_string(),
        };
        assert!(site.is_primary());
        assert_eq!(site.fips().as_deref(), Some("06037"));
    }
}
