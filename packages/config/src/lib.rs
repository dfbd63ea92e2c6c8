#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Process-level configuration.
//!
//! Resolved once at startup from a TOML file and environment overrides, then
//! handed to the pipeline. Nothing below this crate looks at the
//! environment or the host it runs on.
//!
//! ```toml
//! data_dir = "/mnt/data/mon-coverage"
//! gis_src_dir = "/mnt/data/gis"
//! out_dir = "/home/me/research/mon-coverage/out"
//!
//! [years]
//! block_start = 2000
//! block_end = 2016
//! ```

use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

use chrono::Datelike;
use serde::{Deserialize, Serialize};

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "MONCOV_CONFIG";
/// Environment variable overriding [`Config::data_dir`].
pub const DATA_DIR_ENV: &str = "MONCOV_DATA_DIR";

/// Errors raised while resolving configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("Failed to read config {path}: {source}")]
    Io {
        /// Config path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The config file is not valid TOML for [`Config`].
    #[error("Invalid config: {0}")]
    Toml(#[from] toml::de::Error),

    /// An output directory could not be created.
    #[error("Failed to create output directory {path}: {source}")]
    OutputDir {
        /// Directory path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
}

/// Year ranges used when assembling panels and monitor samples.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct YearsConfig {
    /// First year of block / block-group exposure panels.
    pub block_start: i32,
    /// Last year of block / block-group exposure panels.
    pub block_end: i32,
    /// First year of satellite grid panels.
    pub grid_start: i32,
    /// Last year of satellite grid panels.
    pub grid_end: i32,
    /// First year of the monitor summary panel.
    pub monitor_start: i32,
    /// Last year with monitor data.
    pub monitor_max_year: i32,
    /// Half-width of the constant-monitor window around a rule's
    /// implementation year.
    pub constant_range_diff: i32,
    /// Extra years before the constant window kept by the semi-constant
    /// monitor sample.
    pub sample_back_diff: i32,
}

impl Default for YearsConfig {
    fn default() -> Self {
        Self {
            block_start: 2000,
            block_end: 2016,
            grid_start: 2002,
            grid_end: 2016,
            monitor_start: 2000,
            monitor_max_year: 2017,
            constant_range_diff: 2,
            sample_back_diff: 5,
        }
    }
}

impl YearsConfig {
    /// Years of block / block-group panels.
    #[must_use]
    pub const fn block_years(&self) -> RangeInclusive<i32> {
        self.block_start..=self.block_end
    }

    /// Years of satellite grid panels.
    #[must_use]
    pub const fn grid_years(&self) -> RangeInclusive<i32> {
        self.grid_start..=self.grid_end
    }

    /// Years of the monitor summary panel.
    #[must_use]
    pub const fn monitor_years(&self) -> RangeInclusive<i32> {
        self.monitor_start..=self.monitor_max_year
    }
}

/// Resolved pipeline configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root of derived artifacts; raw inputs live under `src/`.
    pub data_dir: PathBuf,
    /// Root of GIS inputs (block shapefiles converted to `GeoJSON`).
    /// Defaults to `data_dir/gis`, following any `data_dir` override.
    pub gis_src_dir: Option<PathBuf>,
    /// Root of analysis outputs; results go into a `YYMM` subdirectory.
    pub out_dir: PathBuf,
    /// Year ranges.
    pub years: YearsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            gis_src_dir: None,
            out_dir: PathBuf::from("out"),
            years: YearsConfig::default(),
        }
    }
}

impl Config {
    /// Parses a TOML document; missing keys take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Toml`] if the document is malformed.
    pub fn from_toml_str(toml_str: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Resolves the configuration: `path` if given, else the file named by
    /// `MONCOV_CONFIG`, else defaults. `MONCOV_DATA_DIR` then overrides
    /// [`Config::data_dir`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the chosen file cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));

        let mut config = match path {
            Some(path) => {
                log::info!("Loading config from {}", path.display());
                let contents = std::fs::read_to_string(&path)
                    .map_err(|source| ConfigError::Io { path, source })?;
                Self::from_toml_str(&contents)?
            }
            None => Self::default(),
        };

        if let Some(dir) = std::env::var_os(DATA_DIR_ENV) {
            config.data_dir = PathBuf::from(dir);
        }

        Ok(config)
    }

    /// Directory holding memoized derived artifacts.
    #[must_use]
    pub fn artifact_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Directory of raw inputs, `data_dir/src`.
    #[must_use]
    pub fn src_dir(&self) -> PathBuf {
        self.data_dir.join("src")
    }

    /// Directory of GIS inputs.
    #[must_use]
    pub fn gis_dir(&self) -> PathBuf {
        self.gis_src_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("gis"))
    }

    /// Output directory for the month of `date` (`out_dir/YYMM`).
    #[must_use]
    pub fn out_month_dir(&self, date: impl Datelike) -> PathBuf {
        self.out_dir
            .join(format!("{:02}{:02}", date.year().rem_euclid(100), date.month()))
    }

    /// Path of an output file in the current month's directory, creating
    /// the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::OutputDir`] if the directory cannot be created.
    pub fn out_path(&self, name: &str) -> Result<PathBuf, ConfigError> {
        let dir = self.out_month_dir(chrono::Local::now().date_naive());
        if !dir.is_dir() {
            std::fs::create_dir_all(&dir)
                .map_err(|source| ConfigError::OutputDir { path: dir.clone(), source })?;
        }
        Ok(dir.join(name))
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    #[test]
    fn default_year_ranges() {
        let config = Config::default();
        assert_eq!(config.years.block_years(), 2000..=2016);
        assert_eq!(config.years.grid_years(), 2002..=2016);
        assert_eq!(config.years.monitor_years(), 2000..=2017);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = Config::from_toml_str(
            r#"
            data_dir = "/mnt/data"

            [years]
            block_end = 2014
            "#,
        )
        .unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/mnt/data"));
        assert_eq!(config.years.block_years(), 2000..=2014);
        assert_eq!(config.years.grid_start, 2002);
        assert_eq!(config.out_dir, PathBuf::from("out"));
    }

    #[test]
    fn malformed_toml_is_rejected() {
        assert!(matches!(
            Config::from_toml_str("data_dir = 5"),
            Err(ConfigError::Toml(_))
        ));
    }

    #[test]
    fn path_helpers() {
        let config = Config {
            data_dir: PathBuf::from("/d"),
            gis_src_dir: Some(PathBuf::from("/g")),
            out_dir: PathBuf::from("/o"),
            years: YearsConfig::default(),
        };
        assert_eq!(config.artifact_dir(), Path::new("/d"));
        assert_eq!(config.src_dir(), PathBuf::from("/d/src"));
        assert_eq!(config.gis_dir(), PathBuf::from("/g"));
        let date = NaiveDate::from_ymd_opt(2018, 3, 9).unwrap();
        assert_eq!(config.out_month_dir(date), PathBuf::from("/o/1803"));
    }

    #[test]
    fn gis_dir_follows_data_dir_unless_set() {
        let mut config = Config::from_toml_str(r#"data_dir = "/mnt/data""#).unwrap();
        assert_eq!(config.gis_dir(), PathBuf::from("/mnt/data/gis"));

        // what an env override of the data directory does after parsing
        config.data_dir = PathBuf::from("/scratch");
        assert_eq!(config.gis_dir(), PathBuf::from("/scratch/gis"));
        assert_eq!(config.src_dir(), PathBuf::from("/scratch/src"));

        let config = Config::from_toml_str(
            r#"
            data_dir = "/mnt/data"
            gis_src_dir = "/mnt/gis"
            "#,
        )
        .unwrap();
        assert_eq!(config.gis_dir(), PathBuf::from("/mnt/gis"));
    }

    #[test]
    fn out_path_creates_month_dir() {
        let tmp = std::env::temp_dir().join("moncov_config_out_test");
        let _ = std::fs::remove_dir_all(&tmp);

        let config = Config {
            out_dir: tmp.clone(),
            ..Config::default()
        };
        let path = config.out_path("calc_mortality.txt").unwrap();
        assert!(path.parent().unwrap().is_dir());
        assert!(path.starts_with(&tmp));

        let _ = std::fs::remove_dir_all(&tmp);
    }
}
