//! Monitor sample for the regulatory-response regressions.
//!
//! Builds the monitor × year reading panel, restricts it to monitors
//! observed continuously around a rule's implementation year, determines
//! which monitors counted toward NAAQS design values, and derives the
//! treatment flags the regression layer consumes.

use std::collections::{BTreeMap, BTreeSet};

use moncov_cache::CacheKey;
use moncov_geography_models::{
    AnnualSummary, MonitorSite, NaaqsAssessmentSite, NaaqsRule, PM25_PARAMETER_CODE,
};
use moncov_panel::Year;
use moncov_source::{DataSource, FlagPanel};
use serde::{Deserialize, Serialize};

use crate::monitors::{CONCURRED_EVENTS_EXCLUDED, NO_EVENTS, PM25_ANNUAL_STANDARD};
use crate::{Analysis, AnalysisError};

/// Monitor excluded from every analysis sample.
pub const EXCLUDED_MONITOR: &str = "06031_4_881011";

/// One monitor's annual reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorReading {
    /// Monitor id.
    pub monitor_id: String,
    /// Year.
    pub year: Year,
    /// County FIPS.
    pub fips: String,
    /// Exceptional event handling of the reading.
    pub event_type: String,
    /// Annual mean concentration.
    pub arithmetic_mean: f64,
}

/// A reading with the rule-specific flags attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct MonitorAnalysisRow {
    /// Site identifier.
    pub monitor_id: String,
    /// Year of the reading.
    pub year: Year,
    /// County FIPS of the site.
    pub fips: String,
    /// Annual mean concentration.
    pub arithmetic_mean: f64,
    /// The monitor's block was designated nonattainment in the
    /// implementation year.
    pub nonattain: bool,
    /// The monitor counted toward a design value the year before
    /// implementation.
    pub used_for_naaqs: bool,
    /// The monitor's reading in the implementation year.
    pub imp_year_mean: Option<f64>,
    /// The reading falls after the implementation year.
    pub post: bool,
    /// `nonattain && post`.
    pub nonattain_post: bool,
    /// The implementation-year reading is at or over the limit.
    pub over_naaqs: bool,
    /// The implementation-year reading is under the limit.
    pub under_naaqs: bool,
    /// `nonattain && over_naaqs`.
    pub nonattain_over: bool,
    /// `nonattain && under_naaqs`.
    pub nonattain_under: bool,
    /// A design-value monitor over the limit in a nonattainment block.
    pub targeted: bool,
    /// A nonattainment monitor that is not targeted.
    pub untargeted: bool,
    /// `targeted && post`.
    pub targeted_post: bool,
    /// `untargeted && post`.
    pub untargeted_post: bool,
}

/// Annual PM2.5 readings eligible for the sample, sorted by year then
/// monitor.
///
/// # Errors
///
/// Returns [`AnalysisError::DuplicateMonitorYear`] if a monitor has two
/// eligible readings in one year.
pub fn summary_panel(
    summaries: impl IntoIterator<Item = AnnualSummary>,
) -> Result<Vec<MonitorReading>, AnalysisError> {
    let mut readings = BTreeMap::new();

    for summary in summaries {
        if summary.parameter_code != PM25_PARAMETER_CODE
            || summary.pollutant_standard != PM25_ANNUAL_STANDARD
            || !(summary.event_type == NO_EVENTS || summary.event_type == CONCURRED_EVENTS_EXCLUDED)
        {
            continue;
        }
        // Canadian sites have no county FIPS
        let Some(fips) = summary.fips() else {
            continue;
        };

        let key = (summary.year, summary.monitor_id.clone());
        if readings.contains_key(&key) {
            return Err(AnalysisError::DuplicateMonitorYear {
                monitor_id: summary.monitor_id,
                year: summary.year,
            });
        }
        readings.insert(
            key,
            MonitorReading {
                monitor_id: summary.monitor_id,
                year: summary.year,
                fips,
                event_type: summary.event_type,
                arithmetic_mean: summary.arithmetic_mean,
            },
        );
    }

    Ok(readings.into_values().collect())
}

/// Year bounds of a monitor sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleWindow {
    /// First year kept.
    pub start: Year,
    /// First year of the window a monitor must be observed in every year.
    pub constant_start: Year,
    /// Last year kept.
    pub end: Year,
}

impl SampleWindow {
    /// Window around `rule`'s implementation year. The semi-constant
    /// sample reaches `sample_back_diff` years back but only requires
    /// continuity over the constant window.
    #[must_use]
    pub fn new(
        rule: NaaqsRule,
        constant_range_diff: i32,
        sample_back_diff: i32,
        monitor_max_year: Year,
        semi: bool,
    ) -> Self {
        let imp_year = rule.implementation_year();
        let constant_start = imp_year - constant_range_diff;
        let end = (imp_year + constant_range_diff).min(monitor_max_year);
        let start = if semi {
            imp_year - sample_back_diff
        } else {
            constant_start
        };
        Self {
            start,
            constant_start,
            end,
        }
    }
}

/// Keeps readings inside `window` from monitors with a reading in every
/// year of the constant window.
#[must_use]
pub fn restrict_to_continuous(readings: &[MonitorReading], window: SampleWindow) -> Vec<MonitorReading> {
    let required = usize::try_from(window.end - window.constant_start + 1).unwrap_or(0);

    let mut years_seen: BTreeMap<&str, BTreeSet<Year>> = BTreeMap::new();
    for reading in readings {
        if (window.constant_start..=window.end).contains(&reading.year) {
            years_seen
                .entry(reading.monitor_id.as_str())
                .or_default()
                .insert(reading.year);
        }
    }

    readings
        .iter()
        .filter(|r| (window.start..=window.end).contains(&r.year))
        .filter(|r| {
            years_seen
                .get(r.monitor_id.as_str())
                .is_some_and(|years| years.len() >= required)
        })
        .cloned()
        .collect()
}

/// Normalizes an EPA site id: `"SSCCC_N"` becomes `"SSCCC"` followed by
/// `N` zero-padded to four digits.
///
/// # Errors
///
/// Returns [`AnalysisError::Conversion`] unless the id has exactly one `_`.
pub fn fix_site_id(site_id: &str) -> Result<String, AnalysisError> {
    match site_id.split('_').collect::<Vec<_>>().as_slice() {
        [county, site] => Ok(format!("{county}{site:0>4}")),
        _ => Err(AnalysisError::Conversion {
            message: format!("Malformed site id '{site_id}'"),
        }),
    }
}

/// Whether a monitor's validity flags pass: every flag present in
/// `year-3..=year-1` is true (and at least one is present) when `lag3`,
/// otherwise the flag for `year` itself is true.
#[must_use]
pub fn is_valid(flags: Option<&BTreeMap<Year, bool>>, year: Year, lag3: bool) -> bool {
    let Some(flags) = flags else {
        return false;
    };
    if lag3 {
        let mut window = flags.range(year - 3..=year - 1).peekable();
        window.peek().is_some() && window.all(|(_, valid)| *valid)
    } else {
        flags.get(&year).copied().unwrap_or(false)
    }
}

/// NAAQS primary PM2.5 monitors whose readings counted toward design
/// values around `year`.
///
/// A monitor in a county on the assessment list is kept only if its own
/// site is listed; monitors in unlisted counties are kept. Returned site ids
/// are normalized with [`fix_site_id`].
///
/// # Errors
///
/// Returns [`AnalysisError::Conversion`] for a malformed site id.
pub fn valid_naaqs_monitors(
    monitors: &[MonitorSite],
    valid_flags: &FlagPanel,
    assessment: &[NaaqsAssessmentSite],
    year: Year,
    lag3: bool,
) -> Result<Vec<MonitorSite>, AnalysisError> {
    let listed_counties: BTreeSet<&str> = assessment.iter().map(|s| s.fips.as_str()).collect();
    let listed_sites: BTreeSet<&str> = assessment.iter().map(|s| s.site_id.as_str()).collect();

    let mut kept = Vec::new();
    for monitor in monitors {
        if monitor.parameter_code != PM25_PARAMETER_CODE
            || !is_valid(valid_flags.get(&monitor.monitor_id), year, lag3)
        {
            continue;
        }

        let site_id = fix_site_id(&monitor.site_id)?;
        let county_listed = monitor
            .fips()
            .is_some_and(|fips| listed_counties.contains(fips.as_str()));
        let dropped_by_list = county_listed && !listed_sites.contains(site_id.as_str());

        if monitor.is_primary() && !dropped_by_list {
            kept.push(MonitorSite {
                site_id,
                ..monitor.clone()
            });
        }
    }

    Ok(kept)
}

/// Attaches the rule's treatment flags to each reading.
///
/// `nonattain` maps monitor ids to their block's designation in the
/// implementation year (absent means attainment); `used_for_naaqs` holds
/// the monitors that counted toward a design value the year before.
#[must_use]
pub fn flag_readings(
    readings: &[MonitorReading],
    rule: NaaqsRule,
    nonattain: &BTreeMap<String, bool>,
    used_for_naaqs: &BTreeSet<String>,
) -> Vec<MonitorAnalysisRow> {
    let imp_year = rule.implementation_year();
    let limit = rule.threshold();

    let imp_year_means: BTreeMap<&str, f64> = readings
        .iter()
        .filter(|r| r.year == imp_year)
        .map(|r| (r.monitor_id.as_str(), r.arithmetic_mean))
        .collect();

    readings
        .iter()
        .filter(|r| r.monitor_id != EXCLUDED_MONITOR)
        .map(|r| {
            let nonattain = nonattain.get(&r.monitor_id).copied().unwrap_or(false);
            let used_for_naaqs = used_for_naaqs.contains(&r.monitor_id);
            let imp_year_mean = imp_year_means.get(r.monitor_id.as_str()).copied();
            let post = r.year > imp_year;
            let over_naaqs = imp_year_mean.is_some_and(|m| m >= limit);
            let under_naaqs = imp_year_mean.is_some_and(|m| m < limit);
            let nonattain_over = nonattain && over_naaqs;
            let targeted = used_for_naaqs && nonattain_over;
            let untargeted = nonattain && !targeted;

            MonitorAnalysisRow {
                monitor_id: r.monitor_id.clone(),
                year: r.year,
                fips: r.fips.clone(),
                arithmetic_mean: r.arithmetic_mean,
                nonattain,
                used_for_naaqs,
                imp_year_mean,
                post,
                nonattain_post: nonattain && post,
                over_naaqs,
                under_naaqs,
                nonattain_over,
                nonattain_under: nonattain && under_naaqs,
                targeted,
                untargeted,
                targeted_post: targeted && post,
                untargeted_post: untargeted && post,
            }
        })
        .collect()
}

impl<S: DataSource> Analysis<S> {
    /// Eligible annual readings over the configured monitor years.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError`] if a year cannot be loaded or a reading is
    /// duplicated.
    pub fn monitors_summary_panel(&self) -> Result<Vec<MonitorReading>, AnalysisError> {
        let key = CacheKey::new("tmp_monitor_summ_panel");
        self.cache.load_or_build(&key, || {
            let mut summaries = Vec::new();
            for year in self.years.monitor_years() {
                summaries.extend(self.source.monitors_annual_summary(year)?);
            }
            let panel = summary_panel(summaries)?;
            log::info!("{} eligible monitor-year readings", panel.len());
            Ok(panel)
        })
    }

    /// Sample window for `rule` from the configured year settings.
    #[must_use]
    pub fn sample_window(&self, rule: NaaqsRule, semi: bool) -> SampleWindow {
        SampleWindow::new(
            rule,
            self.years.constant_range_diff,
            self.years.sample_back_diff,
            self.years.monitor_max_year,
            semi,
        )
    }

    /// Monitors observed in every year around `rule`'s implementation.
    ///
    /// # Errors
    ///
    /// See [`Self::monitors_summary_panel`].
    pub fn constant_monitor_panel(&self, rule: NaaqsRule) -> Result<Vec<MonitorReading>, AnalysisError> {
        let readings = self.monitors_summary_panel()?;
        Ok(restrict_to_continuous(&readings, self.sample_window(rule, false)))
    }

    /// [`Self::constant_monitor_panel`] plus the earlier years of those
    /// monitors, where readings may be missing.
    ///
    /// # Errors
    ///
    /// See [`Self::monitors_summary_panel`].
    pub fn semi_constant_monitor_panel(&self, rule: NaaqsRule) -> Result<Vec<MonitorReading>, AnalysisError> {
        let readings = self.monitors_summary_panel()?;
        Ok(restrict_to_continuous(&readings, self.sample_window(rule, true)))
    }

    /// See [`valid_naaqs_monitors`].
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError`] if inputs cannot be loaded or a site id is
    /// malformed.
    pub fn valid_naaqs_monitors(&self, year: Year, lag3: bool) -> Result<Vec<MonitorSite>, AnalysisError> {
        valid_naaqs_monitors(
            &self.source.monitors_data()?,
            &self.source.valid_flag_panel()?,
            &self.source.naaqs_assessment_monitors()?,
            year,
            lag3,
        )
    }

    /// Flags `readings` for the monitor regressions under `rule`.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError`] if monitor blocks, designations, or
    /// validity flags cannot be produced.
    pub fn prep_monitor_analysis(
        &self,
        readings: &[MonitorReading],
        rule: NaaqsRule,
    ) -> Result<Vec<MonitorAnalysisRow>, AnalysisError> {
        let imp_year = rule.implementation_year();

        let designations = self.source.nonattainment_block_panel(rule)?;
        let nonattain: BTreeMap<String, bool> = self
            .monitors_block()?
            .into_iter()
            .map(|(monitor_id, block_id)| {
                let flag = designations
                    .get(&block_id)
                    .and_then(|years| years.get(&imp_year))
                    .copied()
                    .unwrap_or(false);
                (monitor_id, flag)
            })
            .collect();

        let used_for_naaqs: BTreeSet<String> = self
            .valid_naaqs_monitors(imp_year - 1, true)?
            .into_iter()
            .map(|m| m.monitor_id)
            .collect();

        Ok(flag_readings(readings, rule, &nonattain, &used_for_naaqs))
    }
}
