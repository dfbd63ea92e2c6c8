//! Monitor locations against census geography.
//!
//! Two different joins live here. [`match_monitors_to_blocks`] is exact:
//! point-in-polygon against block shapes, used to attribute a monitor to a
//! block and therefore to that block's nonattainment status.
//! [`block_has_monitor`] is coarse: a block "has" a monitor when both bin
//! into the same satellite grid cell.

use std::collections::{BTreeMap, BTreeSet};

use moncov_cache::CacheKey;
use moncov_geography_models::fips::{state_fips, us_state_code};
use moncov_geography_models::{AnnualSummary, BlockInfo, MonitorSite, PM25_PARAMETER_CODE};
use moncov_grid::{GridKey, GridProduct};
use moncov_panel::Year;
use moncov_source::DataSource;
use moncov_spatial::{BlockIndex, BlockShape};

use crate::{Analysis, AnalysisError};

/// Pollutant standard of the annual PM2.5 design value.
pub const PM25_ANNUAL_STANDARD: &str = "PM25 Annual 2006";
/// Event type of readings with no exceptional events.
pub const NO_EVENTS: &str = "No Events";
/// Event type of readings with concurred exceptional events removed.
pub const CONCURRED_EVENTS_EXCLUDED: &str = "Concurred Events Excluded";

/// Resolves every matchable monitor to the block containing it.
///
/// Only US PM2.5 monitors with coordinates are matched; the rest are left
/// out of the result. Monitors are grouped by state and `load_state` is
/// called once per state for that state's block polygons.
///
/// Within a county: one containing block is accepted; none falls back to a
/// state-wide search that must find exactly one; more than one is an error.
///
/// # Errors
///
/// Returns [`AnalysisError::OverlappingBlocks`],
/// [`AnalysisError::UnresolvedMonitor`], or
/// [`AnalysisError::DuplicateMonitor`] on integrity failures, or whatever
/// `load_state` fails with.
pub fn match_monitors_to_blocks<E>(
    monitors: &[MonitorSite],
    mut load_state: impl FnMut(&str) -> Result<Vec<BlockShape>, E>,
) -> Result<BTreeMap<String, String>, AnalysisError>
where
    AnalysisError: From<E>,
{
    let mut by_state: BTreeMap<u16, BTreeMap<String, Vec<(&MonitorSite, f64, f64)>>> = BTreeMap::new();
    let mut seen = BTreeSet::new();

    for monitor in monitors {
        let Some(state) = us_state_code(&monitor.state_code) else {
            continue;
        };
        if !seen.insert(monitor.monitor_id.as_str()) {
            return Err(AnalysisError::DuplicateMonitor {
                monitor_id: monitor.monitor_id.clone(),
            });
        }
        if monitor.parameter_code != PM25_PARAMETER_CODE {
            continue;
        }
        let (Some(lng), Some(lat)) = (monitor.longitude, monitor.latitude) else {
            log::warn!("Monitor {} has no coordinates, skipping", monitor.monitor_id);
            continue;
        };

        let county = format!("{:0>3}", monitor.county_code.trim());
        by_state
            .entry(state)
            .or_default()
            .entry(county)
            .or_default()
            .push((monitor, lng, lat));
    }

    let mut matched = BTreeMap::new();

    for (state, counties) in by_state {
        let state = state_fips(state);
        log::info!("Loading block shapes for state {state}...");
        let index = BlockIndex::new(&state, load_state(&state)?);

        for (county, county_monitors) in counties {
            log::debug!("Finding {} monitors in county {state}{county}", county_monitors.len());

            for (monitor, lng, lat) in county_monitors {
                let block_id = match index.blocks_containing_in_county(lng, lat, &county).as_slice() {
                    [only] => (*only).to_string(),
                    [] => match index.blocks_containing(lng, lat).as_slice() {
                        [only] => (*only).to_string(),
                        hits => {
                            return Err(AnalysisError::UnresolvedMonitor {
                                monitor_id: monitor.monitor_id.clone(),
                                state,
                                county,
                                matches: hits.len(),
                            });
                        }
                    },
                    hits => {
                        return Err(AnalysisError::OverlappingBlocks {
                            monitor_id: monitor.monitor_id.clone(),
                            county: format!("{state}{county}"),
                            blocks: hits.iter().map(|b| (*b).to_string()).collect(),
                        });
                    }
                };
                matched.insert(monitor.monitor_id.clone(), block_id);
            }
        }
    }

    log::info!("Matched {} monitors to blocks", matched.len());
    Ok(matched)
}

/// Annual PM2.5 readings without exceptional events, keeping only the
/// highest-reading monitor in each county. Keyed by county FIPS.
#[must_use]
pub fn counties_monitor(summaries: &[AnnualSummary]) -> BTreeMap<String, AnnualSummary> {
    let mut top: BTreeMap<String, AnnualSummary> = BTreeMap::new();

    let eligible = summaries.iter().filter(|s| {
        s.parameter_code == PM25_PARAMETER_CODE
            && s.pollutant_standard == PM25_ANNUAL_STANDARD
            && s.event_type == NO_EVENTS
    });

    for summary in eligible {
        let Some(fips) = summary.fips() else {
            continue;
        };
        match top.get(&fips) {
            // ties go to the later reading
            Some(best) if best.arithmetic_mean > summary.arithmetic_mean => {}
            _ => {
                top.insert(fips, summary.clone());
            }
        }
    }

    top
}

/// Flags each block whose grid cell also holds one of `monitors`.
///
/// Monitors without coordinates cannot share a cell and are ignored.
#[must_use]
pub fn block_has_monitor<'a>(
    blocks: &[BlockInfo],
    monitors: impl IntoIterator<Item = &'a AnnualSummary>,
) -> BTreeMap<String, bool> {
    let cells: BTreeSet<GridKey> = monitors
        .into_iter()
        .filter_map(|m| Some(GridProduct::Multisat.key(m.longitude?, m.latitude?)))
        .collect();

    blocks
        .iter()
        .map(|block| {
            let key = GridProduct::Multisat.key(block.x, block.y);
            (block.block_id.clone(), cells.contains(&key))
        })
        .collect()
}

impl<S: DataSource> Analysis<S> {
    /// Monitor id → containing block id for every matchable monitor.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError`] if inputs cannot be loaded or a monitor
    /// cannot be resolved.
    pub fn monitors_block(&self) -> Result<BTreeMap<String, String>, AnalysisError> {
        let key = CacheKey::new("monitors_block");
        self.cache.load_or_build(&key, || {
            let monitors = self.source.monitors_data()?;
            match_monitors_to_blocks(&monitors, |state| self.source.block_shapes(state))
        })
    }

    /// Highest-reading monitor per county in `year`.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError`] if the annual summary cannot be loaded.
    pub fn counties_monitor(&self, year: Year) -> Result<BTreeMap<String, AnnualSummary>, AnalysisError> {
        Ok(counties_monitor(&self.source.monitors_annual_summary(year)?))
    }

    /// Whether each block shares a grid cell with its county's top monitor
    /// in `year`.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError`] if inputs cannot be loaded.
    pub fn block_has_monitor(&self, year: Year) -> Result<BTreeMap<String, bool>, AnalysisError> {
        let key = CacheKey::new("block_has_monitor").arg(year);
        self.cache.load_or_build(&key, || {
            let monitors = self.counties_monitor(year)?;
            let blocks = self.source.blocks_shape_info()?;
            Ok(block_has_monitor(&blocks, monitors.values()))
        })
    }
}

#[cfg(test)]
mod tests {
    use moncov_config::YearsConfig;
    use moncov_source::SourceError;
    use moncov_spatial::parse_block_shapes;

    use super::*;
    use crate::testing::{
        FakeSource, analysis, block, feature_collection, monitor, square_feature, summary,
    };

    /// State 11 with two counties: county 001 holds blocks A (0..1) and
    /// B (1..2); county 003 holds block C (5..6).
    fn state_11() -> String {
        feature_collection(&[
            square_feature("110010001001000", "001", 0.0, 0.0, 1.0),
            square_feature("110010001001001", "001", 1.0, 0.0, 1.0),
            square_feature("110030001001000", "003", 5.0, 0.0, 1.0),
        ])
    }

    fn loader(geojson: String) -> impl FnMut(&str) -> Result<Vec<BlockShape>, SourceError> {
        move |_| Ok(parse_block_shapes(&geojson)?)
    }

    #[test]
    fn matches_within_county() {
        let monitors = vec![monitor("m1", "11", "1", 1.5, 0.5)];
        let matched = match_monitors_to_blocks(&monitors, loader(state_11())).unwrap();
        assert_eq!(matched["m1"], "110010001001001");
    }

    #[test]
    fn falls_back_to_state_when_county_has_no_match() {
        // recorded in county 001 but sits inside county 003's block
        let monitors = vec![monitor("m1", "11", "001", 5.5, 0.5)];
        let matched = match_monitors_to_blocks(&monitors, loader(state_11())).unwrap();
        assert_eq!(matched["m1"], "110030001001000");
    }

    #[test]
    fn no_match_anywhere_is_fatal() {
        let monitors = vec![monitor("m1", "11", "001", 50.0, 50.0)];
        let err = match_monitors_to_blocks(&monitors, loader(state_11())).unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::UnresolvedMonitor { ref county, matches: 0, .. } if county == "001"
        ));
    }

    #[test]
    fn overlapping_blocks_are_fatal() {
        let shapes = feature_collection(&[
            square_feature("110010001001000", "001", 0.0, 0.0, 2.0),
            square_feature("110010001001001", "001", 1.0, 0.0, 2.0),
        ]);
        let monitors = vec![monitor("m1", "11", "001", 1.5, 0.5)];
        let err = match_monitors_to_blocks(&monitors, loader(shapes)).unwrap_err();
        match err {
            AnalysisError::OverlappingBlocks { blocks, county, .. } => {
                assert_eq!(county, "11001");
                assert_eq!(blocks, vec!["110010001001000", "110010001001001"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn foreign_other_pollutant_and_unlocated_monitors_are_skipped() {
        let mut no_coords = monitor("m2", "11", "001", 0.5, 0.5);
        no_coords.longitude = None;
        let mut ozone = monitor("m3", "11", "001", 0.5, 0.5);
        ozone.parameter_code = 44_201;
        let monitors = vec![
            monitor("m1", "11", "001", 0.5, 0.5),
            no_coords,
            ozone,
            monitor("c1", "CC", "001", 0.5, 0.5),
            monitor("x1", "80", "001", 0.5, 0.5),
        ];

        let matched = match_monitors_to_blocks(&monitors, loader(state_11())).unwrap();
        assert_eq!(matched.len(), 1);
        assert_eq!(matched["m1"], "110010001001000");
    }

    #[test]
    fn duplicate_monitor_ids_are_rejected() {
        let monitors = vec![
            monitor("m1", "11", "001", 0.5, 0.5),
            monitor("m1", "11", "001", 1.5, 0.5),
        ];
        assert!(matches!(
            match_monitors_to_blocks(&monitors, loader(state_11())),
            Err(AnalysisError::DuplicateMonitor { .. })
        ));
    }

    #[test]
    fn counties_keep_their_highest_monitor() {
        let mut event = summary("m4", 2012, "6", "37", 30.0);
        event.event_type = "Events Included".to_string();
        let summaries = vec![
            summary("m1", 2012, "6", "37", 11.0),
            summary("m2", 2012, "6", "37", 14.0),
            summary("m3", 2012, "6", "59", 9.0),
            event,
            summary("m5", 2012, "CC", "1", 40.0),
        ];

        let top = counties_monitor(&summaries);
        assert_eq!(top.len(), 2);
        assert_eq!(top["06037"].monitor_id, "m2");
        assert_eq!(top["06059"].monitor_id, "m3");
    }

    #[test]
    fn block_shares_cell_with_monitor() {
        let mut near = summary("m1", 2012, "6", "37", 11.0);
        near.longitude = Some(-118.2451);
        near.latitude = Some(34.0519);
        let blocks = vec![
            block("060371234561001", -118.2456, 34.0512),
            block("060371234561002", -118.2356, 34.0512),
        ];

        let flags = block_has_monitor(&blocks, [&near]);
        assert!(flags["060371234561001"]);
        assert!(!flags["060371234561002"]);
    }

    #[test]
    fn monitors_block_is_cached() {
        let source = FakeSource {
            shapes: [("11".to_string(), state_11())].into_iter().collect(),
            monitors: vec![monitor("m1", "11", "001", 0.5, 0.5)],
            ..FakeSource::default()
        };
        let analysis = analysis(source, YearsConfig::default());

        let first = analysis.monitors_block().unwrap();
        let second = analysis.monitors_block().unwrap();
        assert_eq!(first, second);
        assert_eq!(first["m1"], "110010001001000");
    }
}
