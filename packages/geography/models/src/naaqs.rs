//! PM2.5 annual NAAQS rules.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// A PM2.5 annual standard revision.
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
pub enum NaaqsRule {
    /// 1997 standard (15 µg/m³).
    #[strum(serialize = "pm25_97")]
    #[serde(rename = "pm25_97")]
    Pm25_97,
    /// 2006 revision (15 µg/m³ annual).
    #[strum(serialize = "pm25_06")]
    #[serde(rename = "pm25_06")]
    Pm25_06,
    /// 2012 revision (12 µg/m³).
    #[strum(serialize = "pm25_12")]
    #[serde(rename = "pm25_12")]
    Pm25_12,
}

impl NaaqsRule {
    /// All rules, oldest first.
    pub const ALL: [Self; 3] = [Self::Pm25_97, Self::Pm25_06, Self::Pm25_12];

    /// Year nonattainment designations under the rule took effect.
    #[must_use]
    pub const fn implementation_year(self) -> i32 {
        match self {
            Self::Pm25_97 => 2005,
            Self::Pm25_06 => 2009,
            Self::Pm25_12 => 2015,
        }
    }

    /// Year the standard was promulgated.
    #[must_use]
    pub const fn rule_year(self) -> i32 {
        match self {
            Self::Pm25_97 => 1997,
            Self::Pm25_06 => 2006,
            Self::Pm25_12 => 2012,
        }
    }

    /// Rule promulgated in `year`, if any.
    #[must_use]
    pub fn from_rule_year(year: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|rule| rule.rule_year() == year)
    }

    /// Annual concentration threshold in µg/m³.
    #[must_use]
    pub const fn threshold(self) -> f64 {
        match self {
            Self::Pm25_12 => 12.0,
            Self::Pm25_97 | Self::Pm25_06 => 15.0,
        }
    }
}
