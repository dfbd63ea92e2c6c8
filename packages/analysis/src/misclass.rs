//! Blocks and counties misclassified as attainment.
//!
//! A block is misclassified when its satellite exposure meets the rule's
//! threshold but it was not designated nonattainment. A county is flagged
//! when any of its non-designated blocks is over the threshold.

use std::collections::BTreeMap;

use moncov_cache::CacheKey;
use moncov_geography_models::{GeoUnit, NaaqsRule};
use moncov_panel::stats::weighted_quantiles;
use moncov_panel::{Series, Year};
use moncov_source::DataSource;
use serde::{Deserialize, Serialize};

use crate::exposure::{merge_population, unit_id};
use crate::panels::{Smoothing, panel_year};
use crate::{Analysis, AnalysisError, ExposureSource};

/// Per-block classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct MisclassRow {
    /// Block id.
    pub block_id: String,
    /// Lagged satellite exposure; missing outside coverage.
    pub exp: Option<f64>,
    /// County FIPS.
    pub fips: String,
    /// The block shares a grid cell with its county's top monitor.
    pub has_mon_block: bool,
    /// Any block in the county does.
    pub has_mon_fips: bool,
    /// Block population.
    pub pop: u64,
    /// Population of the county's blocks in this table.
    pub fips_pop: u64,
    /// Designated nonattainment in the rule's implementation year.
    pub nonattain: bool,
    /// Any block in the county is.
    pub has_nonattain: bool,
    /// Exposure meets the threshold.
    pub is_over: bool,
    /// Any block in the county does.
    pub has_over: bool,
    /// `is_over` and not `nonattain`.
    pub misclassified_block: bool,
}

#[derive(Default)]
struct CountyFlags {
    pop: u64,
    has_mon: bool,
    has_nonattain: bool,
    has_over: bool,
}

/// Classifies every block of `exposure` against `threshold`.
///
/// Blocks absent from `has_monitor` or `nonattain` count as having no
/// monitor and being in attainment. Missing exposure is never over.
///
/// # Errors
///
/// Returns [`AnalysisError::MissingPopulation`] if a block has no
/// population, or [`AnalysisError::GeoId`] for a malformed block id.
pub fn classify_blocks(
    exposure: &Series<String>,
    has_monitor: &BTreeMap<String, bool>,
    population: &BTreeMap<String, u64>,
    nonattain: &BTreeMap<String, bool>,
    threshold: f64,
) -> Result<Vec<MisclassRow>, AnalysisError> {
    let merged = merge_population(exposure, population)?;

    let mut rows = Vec::with_capacity(merged.len());
    let mut counties: BTreeMap<String, CountyFlags> = BTreeMap::new();

    for (block_id, (exp, pop)) in merged {
        let fips = unit_id(&block_id, GeoUnit::County)?.to_string();
        let has_mon_block = has_monitor.get(&block_id).copied().unwrap_or(false);
        let block_nonattain = nonattain.get(&block_id).copied().unwrap_or(false);
        let is_over = exp.is_some_and(|e| e >= threshold);

        let county = counties.entry(fips.clone()).or_default();
        county.pop += pop;
        county.has_mon |= has_mon_block;
        county.has_nonattain |= block_nonattain;
        county.has_over |= is_over;

        rows.push(MisclassRow {
            block_id,
            exp,
            fips,
            has_mon_block,
            has_mon_fips: false,
            pop,
            fips_pop: 0,
            nonattain: block_nonattain,
            has_nonattain: false,
            is_over,
            has_over: false,
            misclassified_block: is_over && !block_nonattain,
        });
    }

    for row in &mut rows {
        if let Some(county) = counties.get(&row.fips) {
            row.has_mon_fips = county.has_mon;
            row.fips_pop = county.pop;
            row.has_nonattain = county.has_nonattain;
            row.has_over = county.has_over;
        }
    }

    Ok(rows)
}

/// County flag: does any block outside designated nonattainment exceed the
/// threshold. Counties whose every block is designated are absent.
#[must_use]
pub fn fips_misclass_flag(rows: &[MisclassRow]) -> BTreeMap<String, bool> {
    let mut flags = BTreeMap::new();
    for row in rows.iter().filter(|r| !r.nonattain) {
        *flags.entry(row.fips.clone()).or_insert(false) |= row.is_over;
    }
    flags
}

/// Population-weighted quantiles of block exposure, skipping blocks with
/// missing exposure.
///
/// # Errors
///
/// Returns [`AnalysisError::Panel`] if a quantile is outside (0, 1) or no
/// block has exposure.
#[allow(clippy::cast_precision_loss)]
pub fn exposure_quantiles(rows: &[MisclassRow], qs: &[f64]) -> Result<Vec<f64>, AnalysisError> {
    let sample: Vec<(f64, f64)> = rows
        .iter()
        .filter_map(|r| Some((r.exp?, r.pop as f64)))
        .collect();
    Ok(weighted_quantiles(&sample, qs)?)
}

impl<S: DataSource> Analysis<S> {
    /// Lagged block exposure in `year` from `data`.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError`] if the panel cannot be built or does not
    /// reach `year`.
    pub fn block_exposure_3lag(&self, year: Year, data: ExposureSource) -> Result<Series<String>, AnalysisError> {
        match data {
            ExposureSource::Multisatpm => {
                panel_year(&self.prep_multisatpm_3year(GeoUnit::Block, Smoothing::Lag3)?, year)
            }
            ExposureSource::Msatna => self.msatna_blocks_3lag_year(year),
        }
    }

    /// Per-block classification for `year` under `rule` using `data`.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError`] if any input cannot be produced.
    pub fn blocks_misclass_flag(
        &self,
        year: Year,
        rule: NaaqsRule,
        data: ExposureSource,
    ) -> Result<Vec<MisclassRow>, AnalysisError> {
        let key = CacheKey::new("tmp_blocks_misclass_df")
            .arg(year)
            .arg(rule)
            .arg(data);
        self.cache.load_or_build(&key, || {
            let exposure = self.block_exposure_3lag(year, data)?;
            let has_monitor = self.block_has_monitor(year)?;
            let population = self.source.blocks_population()?;

            let imp_year = rule.implementation_year();
            let nonattain: BTreeMap<String, bool> = self
                .source
                .nonattainment_block_panel(rule)?
                .into_iter()
                .filter_map(|(block_id, years)| Some((block_id, *years.get(&imp_year)?)))
                .collect();

            let rows = classify_blocks(&exposure, &has_monitor, &population, &nonattain, rule.threshold())?;
            log::info!(
                "{year} {rule} {data}: {} of {} blocks misclassified",
                rows.iter().filter(|r| r.misclassified_block).count(),
                rows.len()
            );
            Ok(rows)
        })
    }

    /// See [`fips_misclass_flag`].
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError`] if the block table cannot be produced.
    pub fn fips_misclass_flag(
        &self,
        year: Year,
        rule: NaaqsRule,
        data: ExposureSource,
    ) -> Result<BTreeMap<String, bool>, AnalysisError> {
        Ok(fips_misclass_flag(&self.blocks_misclass_flag(year, rule, data)?))
    }
}
