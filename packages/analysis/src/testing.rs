//! In-memory data source for pipeline tests.

use std::collections::BTreeMap;

use moncov_cache::ArtifactCache;
use moncov_config::YearsConfig;
use moncov_geography_models::{
    AnnualSummary, BlockInfo, MonitorSite, MortalityRecord, NaaqsAssessmentSite, NaaqsRule,
};
use moncov_grid::GridValue;
use moncov_source::{
    CensusSource, EpaSource, FlagPanel, MortalitySource, SatelliteSource, SourceError,
};
use moncov_spatial::{BlockShape, parse_block_shapes};

use crate::Analysis;

#[derive(Default)]
pub struct FakeSource {
    pub blocks: Vec<BlockInfo>,
    pub population: BTreeMap<String, u64>,
    /// `GeoJSON` feature collections keyed by state FIPS.
    pub shapes: BTreeMap<String, String>,
    pub multisat: BTreeMap<i32, Vec<GridValue>>,
    pub msat_1year: BTreeMap<i32, Vec<GridValue>>,
    pub msat_3year: BTreeMap<i32, Vec<GridValue>>,
    pub monitors: Vec<MonitorSite>,
    pub summaries: BTreeMap<i32, Vec<AnnualSummary>>,
    pub nonattainment: BTreeMap<NaaqsRule, FlagPanel>,
    pub valid_flags: FlagPanel,
    pub assessment: Vec<NaaqsAssessmentSite>,
    pub mortality: Vec<MortalityRecord>,
}

impl CensusSource for FakeSource {
    fn blocks_shape_info(&self) -> Result<Vec<BlockInfo>, SourceError> {
        Ok(self.blocks.clone())
    }

    fn blocks_population(&self) -> Result<BTreeMap<String, u64>, SourceError> {
        Ok(self.population.clone())
    }

    fn block_shapes(&self, state_fips: &str) -> Result<Vec<BlockShape>, SourceError> {
        match self.shapes.get(state_fips) {
            Some(geojson) => Ok(parse_block_shapes(geojson)?),
            None => Ok(Vec::new()),
        }
    }
}

impl SatelliteSource for FakeSource {
    fn multisat_conus_year(&self, year: i32) -> Result<Vec<GridValue>, SourceError> {
        Ok(self.multisat.get(&year).cloned().unwrap_or_default())
    }

    fn msat_northamer_1year(&self, year: i32) -> Result<Vec<GridValue>, SourceError> {
        Ok(self.msat_1year.get(&year).cloned().unwrap_or_default())
    }

    fn msat_northamer_conus_3year(&self, year: i32) -> Result<Vec<GridValue>, SourceError> {
        Ok(self.msat_3year.get(&year).cloned().unwrap_or_default())
    }
}

impl EpaSource for FakeSource {
    fn monitors_data(&self) -> Result<Vec<MonitorSite>, SourceError> {
        Ok(self.monitors.clone())
    }

    fn monitors_annual_summary(&self, year: i32) -> Result<Vec<AnnualSummary>, SourceError> {
        Ok(self.summaries.get(&year).cloned().unwrap_or_default())
    }

    fn nonattainment_block_panel(&self, rule: NaaqsRule) -> Result<FlagPanel, SourceError> {
        Ok(self.nonattainment.get(&rule).cloned().unwrap_or_default())
    }

    fn valid_flag_panel(&self) -> Result<FlagPanel, SourceError> {
        Ok(self.valid_flags.clone())
    }

    fn naaqs_assessment_monitors(&self) -> Result<Vec<NaaqsAssessmentSite>, SourceError> {
        Ok(self.assessment.clone())
    }
}

impl MortalitySource for FakeSource {
    fn mortality(&self) -> Result<Vec<MortalityRecord>, SourceError> {
        Ok(self.mortality.clone())
    }
}

pub fn analysis(source: FakeSource, years: YearsConfig) -> Analysis<FakeSource> {
    Analysis::new(source, ArtifactCache::in_memory(), years)
}

pub fn block(block_id: &str, x: f64, y: f64) -> BlockInfo {
    BlockInfo {
        block_id: block_id.to_string(),
        x,
        y,
        area: 1.0,
    }
}

pub fn cell(x: f64, y: f64, exposure: f64) -> GridValue {
    GridValue { x, y, exposure }
}

pub fn monitor(monitor_id: &str, state: &str, county: &str, lng: f64, lat: f64) -> MonitorSite {
    MonitorSite {
        monitor_id: monitor_id.to_string(),
        site_id: format!("{state:0>2}{county:0>3}_1"),
        state_code: state.to_string(),
        county_code: county.to_string(),
        parameter_code: 88_101,
        latitude: Some(lat),
        longitude: Some(lng),
        naaqs_primary_monitor: "Y".to_string(),
    }
}

pub fn summary(monitor_id: &str, year: i32, state: &str, county: &str, mean: f64) -> AnnualSummary {
    AnnualSummary {
        monitor_id: monitor_id.to_string(),
        year,
        state_code: state.to_string(),
        county_code: county.to_string(),
        parameter_code: 88_101,
        pollutant_standard: "PM25 Annual 2006".to_string(),
        event_type: "No Events".to_string(),
        latitude: None,
        longitude: None,
        arithmetic_mean: mean,
    }
}

/// Axis-aligned square block polygon as a `GeoJSON` feature.
pub fn square_feature(block_id: &str, county_fp: &str, x0: f64, y0: f64, size: f64) -> String {
    let (x1, y1) = (x0 + size, y0 + size);
    format!(
        r#"{{"type":"Feature","properties":{{"GEOID10":"{block_id}","COUNTYFP10":"{county_fp}"}},"geometry":{{"type":"Polygon","coordinates":[[[{x0},{y0}],[{x1},{y0}],[{x1},{y1}],[{x0},{y1}],[{x0},{y0}]]]}}}}"#
    )
}

pub fn feature_collection(features: &[String]) -> String {
    format!(
        r#"{{"type":"FeatureCollection","features":[{}]}}"#,
        features.join(",")
    )
}

pub fn flags(entries: &[(&str, i32, bool)]) -> FlagPanel {
    let mut panel = FlagPanel::new();
    for (id, year, flag) in entries {
        panel.entry((*id).to_string()).or_default().insert(*year, *flag);
    }
    panel
}
