//! Excess mortality in misclassified counties.
//!
//! County deaths are spread over blocks by population share. Deaths
//! attributable to an exposure change `x` use a log-linear dose response,
//! `exp(β·x) − 1` with β = 0.014 per µg/m³.

use std::collections::BTreeMap;

use moncov_geography_models::fips::state_name;
use moncov_geography_models::{MortalityRecord, NaaqsRule, state_id};
use moncov_panel::Year;
use moncov_source::DataSource;
use serde::{Deserialize, Serialize};

use crate::misclass::MisclassRow;
use crate::{Analysis, AnalysisError, ExposureSource};

/// Mortality increase per µg/m³ (1.4% per 10 µg/m³).
pub const DOSE_RATE: f64 = 0.14 / 10.0;

/// Value of a statistical life, millions of dollars.
pub const VSL: f64 = 9.0;

/// Share of baseline deaths attributable to an exposure change of `x`.
#[must_use]
pub fn dose_rate(x: f64) -> f64 {
    (DOSE_RATE * x).exp_m1()
}

/// Year whose exposure and deaths are used for `rule`.
#[must_use]
pub const fn exposure_year(rule: NaaqsRule) -> Year {
    match rule {
        NaaqsRule::Pm25_12 => 2014,
        NaaqsRule::Pm25_97 | NaaqsRule::Pm25_06 => 2007,
    }
}

/// A non-designated block in a misclassified county, with its share of
/// county deaths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExposureDeathsRow {
    /// 15-digit census block id.
    pub block_id: String,
    /// County FIPS of the block.
    pub fips: String,
    /// Block exposure, when a grid cell covers it.
    pub exp: Option<f64>,
    /// Block population.
    pub pop: u64,
    /// Total population of the county.
    pub fips_pop: u64,
    /// The block's exposure is at or over the threshold.
    pub is_over: bool,
    /// County deaths in the exposure year, when reported.
    pub deaths: Option<u64>,
    /// County crude rate in the exposure year, when reported.
    pub rate: Option<f64>,
    /// `pop × deaths / fips_pop`.
    pub block_deaths: Option<f64>,
}

/// Joins county deaths for `year` onto the block classification and keeps
/// only blocks outside designated nonattainment in counties where at least
/// one such block is over the threshold.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn prep_exposure_data(rows: Vec<MisclassRow>, mortality: &[MortalityRecord], year: Year) -> Vec<ExposureDeathsRow> {
    let county_deaths: BTreeMap<&str, (u64, f64)> = mortality
        .iter()
        .filter(|m| m.year == year)
        .map(|m| (m.fips.as_str(), (m.deaths, m.rate)))
        .collect();

    let attainment: Vec<MisclassRow> = rows.into_iter().filter(|r| !r.nonattain).collect();

    let mut misclassified_counties: BTreeMap<&str, bool> = BTreeMap::new();
    for row in &attainment {
        *misclassified_counties.entry(row.fips.as_str()).or_insert(false) |= row.is_over;
    }

    attainment
        .iter()
        .filter(|r| misclassified_counties.get(r.fips.as_str()).copied().unwrap_or(false))
        .map(|r| {
            let reported = county_deaths.get(r.fips.as_str()).copied();
            let block_deaths = reported
                .filter(|_| r.fips_pop > 0)
                .map(|(deaths, _)| r.pop as f64 * deaths as f64 / r.fips_pop as f64);
            ExposureDeathsRow {
                block_id: r.block_id.clone(),
                fips: r.fips.clone(),
                exp: r.exp,
                pop: r.pop,
                fips_pop: r.fips_pop,
                is_over: r.is_over,
                deaths: reported.map(|(deaths, _)| deaths),
                rate: reported.map(|(_, rate)| rate),
                block_deaths,
            }
        })
        .collect()
}

/// Deaths attributable to one counterfactual reduction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Counterfactual {
    /// Attributable deaths.
    pub deaths: f64,
    /// Mean exposure reduction over the blocks it applies to.
    pub mean_decrease: f64,
}

impl Counterfactual {
    /// Value of the deaths in millions of dollars.
    #[must_use]
    pub fn value(&self) -> f64 {
        self.deaths * VSL
    }
}

#[allow(clippy::cast_precision_loss)]
fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn attributable_deaths(rows: &[ExposureDeathsRow], reduction: impl Fn(&ExposureDeathsRow) -> Option<f64>) -> f64 {
    rows.iter()
        .filter_map(|r| Some(dose_rate(reduction(r)?) * r.block_deaths?))
        .sum()
}

/// Lowers every block to the threshold and no further.
#[must_use]
pub fn peak_shaving(rows: &[ExposureDeathsRow], threshold: f64) -> Counterfactual {
    let to_naaqs = |r: &ExposureDeathsRow| r.exp.map(|e| (e - threshold).max(0.0));
    let decreases: Vec<f64> = rows.iter().filter_map(to_naaqs).filter(|d| *d > 0.0).collect();
    Counterfactual {
        deaths: attributable_deaths(rows, to_naaqs),
        mean_decrease: mean(&decreases),
    }
}

/// Scales each county down so its highest block sits at the threshold.
#[must_use]
pub fn county_scaling(rows: &[ExposureDeathsRow], threshold: f64) -> Counterfactual {
    let mut county_max: BTreeMap<&str, f64> = BTreeMap::new();
    for row in rows {
        if let Some(exp) = row.exp {
            let max = county_max.entry(row.fips.as_str()).or_insert(exp);
            *max = max.max(exp);
        }
    }

    let scale_diff = |r: &ExposureDeathsRow| {
        let max = county_max.get(r.fips.as_str())?;
        Some(r.exp? * (1.0 - threshold / max))
    };
    let decreases: Vec<f64> = rows.iter().filter_map(scale_diff).collect();
    Counterfactual {
        deaths: attributable_deaths(rows, scale_diff),
        mean_decrease: mean(&decreases),
    }
}

/// Extra deaths from estimated regulatory effects: `targeted` applies to
/// blocks over the threshold, `untargeted` to the rest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectDeaths {
    /// Extra deaths over every block.
    pub total: f64,
    /// Extra deaths in blocks over the threshold.
    pub targeted: f64,
    /// Extra deaths in blocks under the threshold.
    pub untargeted: f64,
    /// Extra deaths keyed by state name.
    pub by_state: BTreeMap<String, f64>,
}

/// Attributes deaths to per-block exposure effects.
#[must_use]
pub fn effect_deaths(rows: &[ExposureDeathsRow], targeted: f64, untargeted: f64) -> EffectDeaths {
    let mut out = EffectDeaths {
        total: 0.0,
        targeted: 0.0,
        untargeted: 0.0,
        by_state: BTreeMap::new(),
    };

    for row in rows {
        let Some(block_deaths) = row.block_deaths else {
            continue;
        };
        let coeff = if row.is_over { targeted } else { untargeted };
        let extra = dose_rate(coeff) * block_deaths;

        out.total += extra;
        if row.is_over {
            out.targeted += extra;
        } else {
            out.untargeted += extra;
        }
        let state = state_id(&row.fips).map_or("Unknown", state_name);
        *out.by_state.entry(state.to_string()).or_insert(0.0) += extra;
    }

    out
}

impl<S: DataSource> Analysis<S> {
    /// Block exposure and deaths for the mortality estimates under `rule`.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError`] if the block classification or mortality
    /// table cannot be produced.
    pub fn prep_exposure_data(
        &self,
        rule: NaaqsRule,
        data: ExposureSource,
    ) -> Result<Vec<ExposureDeathsRow>, AnalysisError> {
        let year = exposure_year(rule);
        let rows = self.blocks_misclass_flag(year, rule, data)?;
        let out = prep_exposure_data(rows, &self.source.mortality()?, year);
        log::info!("{rule} {data}: {} blocks in misclassified counties", out.len());
        Ok(out)
    }
}
