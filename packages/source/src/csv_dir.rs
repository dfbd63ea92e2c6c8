//! Directory-of-files data source.
//!
//! Layout under the source directory:
//!
//! | file | columns |
//! |---|---|
//! | `blocks_shape_info.csv` | `block_id,x,y,area` |
//! | `blocks_population.csv` | `block_id,pop` |
//! | `multisat/{year}.csv`, `msat_northamer_1year/{year}.csv`, `msat_northamer_conus_3year/{year}.csv` | `x,y,exposure` |
//! | `monitors.csv` | [`MonitorSite`] fields |
//! | `annual_summary/{year}.csv` | [`AnnualSummary`] fields |
//! | `nonattainment/{rule}.csv` | `block_id,year,nonattain` |
//! | `valid_flags.csv` | `monitor_id,year,is_valid` |
//! | `naaqs_assessment_monitors.csv` | `fips,site_id` |
//! | `mortality.csv` | `fips,year,deaths,population,rate` |
//!
//! Block polygons are read from `{gis_dir}/blocks/{state_fips}.geojson`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use moncov_geography_models::{
    AnnualSummary, BlockInfo, MonitorSite, MortalityRecord, NaaqsAssessmentSite, NaaqsRule,
};
use moncov_grid::GridValue;
use moncov_spatial::{BlockShape, parse_block_shapes};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::{CensusSource, EpaSource, FlagPanel, MortalitySource, SatelliteSource, SourceError};

/// Reads every upstream table from files on disk.
#[derive(Debug, Clone)]
pub struct CsvDirSource {
    src_dir: PathBuf,
    gis_dir: PathBuf,
}

#[derive(Deserialize)]
struct PopulationRow {
    block_id: String,
    pop: u64,
}

#[derive(Deserialize)]
struct NonattainmentRow {
    block_id: String,
    year: i32,
    nonattain: bool,
}

#[derive(Deserialize)]
struct ValidFlagRow {
    monitor_id: String,
    year: i32,
    is_valid: bool,
}

impl CsvDirSource {
    /// Creates a source reading tables from `src_dir` and block polygons
    /// from `gis_dir`.
    #[must_use]
    pub fn new(src_dir: impl Into<PathBuf>, gis_dir: impl Into<PathBuf>) -> Self {
        Self {
            src_dir: src_dir.into(),
            gis_dir: gis_dir.into(),
        }
    }

    fn read_csv<T: DeserializeOwned>(&self, relative: &str) -> Result<Vec<T>, SourceError> {
        let path = self.src_dir.join(relative);
        log::debug!("Reading {}", path.display());
        read_records(&path)
    }

    fn grid_year(&self, product_dir: &str, year: i32) -> Result<Vec<GridValue>, SourceError> {
        self.read_csv(&format!("{product_dir}/{year}.csv"))
    }
}

fn read_records<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, SourceError> {
    let file = std::fs::File::open(path).map_err(|source| SourceError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut reader = csv::Reader::from_reader(std::io::BufReader::new(file));
    reader
        .deserialize()
        .collect::<Result<Vec<T>, csv::Error>>()
        .map_err(SourceError::from)
}

impl CensusSource for CsvDirSource {
    fn blocks_shape_info(&self) -> Result<Vec<BlockInfo>, SourceError> {
        self.read_csv("blocks_shape_info.csv")
    }

    fn blocks_population(&self) -> Result<BTreeMap<String, u64>, SourceError> {
        let rows: Vec<PopulationRow> = self.read_csv("blocks_population.csv")?;
        Ok(rows.into_iter().map(|r| (r.block_id, r.pop)).collect())
    }

    fn block_shapes(&self, state_fips: &str) -> Result<Vec<BlockShape>, SourceError> {
        let path = self.gis_dir.join("blocks").join(format!("{state_fips}.geojson"));
        let contents = std::fs::read_to_string(&path)
            .map_err(|source| SourceError::Io { path, source })?;
        Ok(parse_block_shapes(&contents)?)
    }
}

impl SatelliteSource for CsvDirSource {
    fn multisat_conus_year(&self, year: i32) -> Result<Vec<GridValue>, SourceError> {
        self.grid_year("multisat", year)
    }

    fn msat_northamer_1year(&self, year: i32) -> Result<Vec<GridValue>, SourceError> {
        self.grid_year("msat_northamer_1year", year)
    }

    fn msat_northamer_conus_3year(&self, year: i32) -> Result<Vec<GridValue>, SourceError> {
        self.grid_year("msat_northamer_conus_3year", year)
    }
}

impl EpaSource for CsvDirSource {
    fn monitors_data(&self) -> Result<Vec<MonitorSite>, SourceError> {
        self.read_csv("monitors.csv")
    }

    fn monitors_annual_summary(&self, year: i32) -> Result<Vec<AnnualSummary>, SourceError> {
        self.read_csv(&format!("annual_summary/{year}.csv"))
    }

    fn nonattainment_block_panel(&self, rule: NaaqsRule) -> Result<FlagPanel, SourceError> {
        let rows: Vec<NonattainmentRow> = self.read_csv(&format!("nonattainment/{rule}.csv"))?;
        let mut panel = FlagPanel::new();
        for row in rows {
            panel.entry(row.block_id).or_default().insert(row.year, row.nonattain);
        }
        Ok(panel)
    }

    fn valid_flag_panel(&self) -> Result<FlagPanel, SourceError> {
        let rows: Vec<ValidFlagRow> = self.read_csv("valid_flags.csv")?;
        let mut panel = FlagPanel::new();
        for row in rows {
            panel.entry(row.monitor_id).or_default().insert(row.year, row.is_valid);
        }
        Ok(panel)
    }

    fn naaqs_assessment_monitors(&self) -> Result<Vec<NaaqsAssessmentSite>, SourceError> {
        self.read_csv("naaqs_assessment_monitors.csv")
    }
}

impl MortalitySource for CsvDirSource {
    fn mortality(&self) -> Result<Vec<MortalityRecord>, SourceError> {
        self.read_csv("mortality.csv")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture_dir(name: &str) -> PathBuf {
        let tmp = std::env::temp_dir().join(name);
        let _ = std::fs::remove_dir_all(&tmp);
        std::fs::create_dir_all(tmp.join("src/multisat")).unwrap();
        std::fs::create_dir_all(tmp.join("src/nonattainment")).unwrap();
        std::fs::create_dir_all(tmp.join("gis/blocks")).unwrap();
        tmp
    }

    #[test]
    fn reads_tables_preserving_leading_zeros() {
        let tmp = fixture_dir("moncov_csv_dir_tables");
        std::fs::write(
            tmp.join("src/blocks_population.csv"),
            "block_id,pop\n010010201001000,100\n010010201001001,0\n",
        )
        .unwrap();
        std::fs::write(
            tmp.join("src/multisat/2012.csv"),
            "x,y,exposure\n-86.5,32.4,10.5\n",
        )
        .unwrap();
        std::fs::write(
            tmp.join("src/nonattainment/pm25_12.csv"),
            "block_id,year,nonattain\n010010201001000,2015,true\n",
        )
        .unwrap();

        let source = CsvDirSource::new(tmp.join("src"), tmp.join("gis"));

        let pop = source.blocks_population().unwrap();
        assert_eq!(pop.get("010010201001000"), Some(&100));
        assert_eq!(pop.get("010010201001001"), Some(&0));

        let grid = source.multisat_conus_year(2012).unwrap();
        assert_eq!(grid.len(), 1);
        assert!((grid[0].exposure - 10.5).abs() < f64::EPSILON);

        let nonattain = source.nonattainment_block_panel(NaaqsRule::Pm25_12).unwrap();
        assert_eq!(nonattain["010010201001000"][&2015], true);

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn missing_files_report_their_path() {
        let tmp = fixture_dir("moncov_csv_dir_missing");
        let source = CsvDirSource::new(tmp.join("src"), tmp.join("gis"));

        let err = source.monitors_annual_summary(1999).unwrap_err();
        assert!(err.to_string().contains("annual_summary"));
        assert!(source.block_shapes("01").is_err());

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn reads_block_shapes() {
        let tmp = fixture_dir("moncov_csv_dir_shapes");
        std::fs::write(
            tmp.join("gis/blocks/11.geojson"),
            r#"{"type":"FeatureCollection","features":[{"type":"Feature",
                "properties":{"GEOID10":"110010001001000","COUNTYFP10":"001"},
                "geometry":{"type":"Polygon","coordinates":[[[0,0],[1,0],[1,1],[0,1],[0,0]]]}}]}"#,
        )
        .unwrap();

        let source = CsvDirSource::new(tmp.join("src"), tmp.join("gis"));
        let shapes = source.block_shapes("11").unwrap();
        assert_eq!(shapes.len(), 1);
        assert_eq!(shapes[0].county_fp, "001");

        let _ = std::fs::remove_dir_all(&tmp);
    }
}
