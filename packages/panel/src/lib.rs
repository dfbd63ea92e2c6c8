#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Entity × year exposure panels.
//!
//! A [`Panel`] is a wide table: one row per entity (block, block group,
//! grid cell), one column per year. Missing values are represented by
//! absence and are never coerced to zero; an entity can be present with
//! every year missing.
//!
//! Panels are assembled year by year with [`build_panel`] (an outer join on
//! the entity key) and smoothed with the three-year transforms in
//! [`transform`].

pub mod stats;
pub mod transform;

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

pub use transform::{panel_to_3lag, panel_to_3nolag};

/// Calendar year used as a panel column.
pub type Year = i32;

/// One year's values keyed by entity. `None` marks an entity that is known
/// but has no value (e.g. a block outside satellite coverage).
pub type Series<K> = BTreeMap<K, Option<f64>>;

/// Errors raised by panel operations.
#[derive(Debug, thiserror::Error)]
pub enum PanelError {
    /// A rolling transform was asked for on a panel with too few years.
    #[error("{transform} needs at least {required} year columns, panel has {available}")]
    InsufficientHistory {
        /// Transform name.
        transform: &'static str,
        /// Minimum number of year columns.
        required: usize,
        /// Year columns present.
        available: usize,
    },

    /// A quantile outside the open interval (0, 1).
    #[error("Quantiles must be between 0 and 1 (got {q})")]
    InvalidQuantile {
        /// The rejected quantile.
        q: f64,
    },

    /// A weighted quantile was requested over no data.
    #[error("Cannot compute a weighted quantile of an empty sample")]
    EmptySample,
}

/// Wide entity × year table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Panel<K: Ord> {
    years: BTreeSet<Year>,
    rows: BTreeMap<K, BTreeMap<Year, f64>>,
}

impl<K: Ord> Default for Panel<K> {
    fn default() -> Self {
        Self {
            years: BTreeSet::new(),
            rows: BTreeMap::new(),
        }
    }
}

impl<K: Ord + Clone> Panel<K> {
    /// Creates an empty panel.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Year columns, ascending.
    #[must_use]
    pub const fn years(&self) -> &BTreeSet<Year> {
        &self.years
    }

    /// Entity keys, ascending.
    pub fn entities(&self) -> impl Iterator<Item = &K> {
        self.rows.keys()
    }

    /// Number of entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the panel has no entities.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Whether `key` is a row of the panel.
    #[must_use]
    pub fn contains(&self, key: &K) -> bool {
        self.rows.contains_key(key)
    }

    /// Value at `(key, year)`, `None` if missing.
    #[must_use]
    pub fn get(&self, key: &K, year: Year) -> Option<f64> {
        self.rows.get(key).and_then(|row| row.get(&year).copied())
    }

    /// Non-missing values of one row.
    #[must_use]
    pub fn row(&self, key: &K) -> Option<&BTreeMap<Year, f64>> {
        self.rows.get(key)
    }

    /// Iterates rows in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &BTreeMap<Year, f64>)> {
        self.rows.iter()
    }

    /// Declares a year column without adding values.
    pub fn add_year(&mut self, year: Year) {
        self.years.insert(year);
    }

    /// Sets one cell. `None` registers the entity and the year but leaves
    /// the cell missing.
    pub fn set(&mut self, key: K, year: Year, value: Option<f64>) {
        self.years.insert(year);
        let row = self.rows.entry(key).or_default();
        match value {
            Some(v) if !v.is_nan() => {
                row.insert(year, v);
            }
            _ => {
                row.remove(&year);
            }
        }
    }

    /// Outer-joins one year's series onto the panel. Entities absent from
    /// `series` stay missing for `year`; entities new to the panel are
    /// missing for every earlier year.
    pub fn push_column(&mut self, year: Year, series: Series<K>) {
        self.years.insert(year);
        for (key, value) in series {
            self.set(key, year, value);
        }
    }

    /// One year as a series covering every entity.
    #[must_use]
    pub fn column(&self, year: Year) -> Series<K> {
        self.rows
            .iter()
            .map(|(key, row)| (key.clone(), row.get(&year).copied()))
            .collect()
    }

    /// Keeps only entities matching `keep`.
    pub fn retain(&mut self, mut keep: impl FnMut(&K) -> bool) {
        self.rows.retain(|key, _| keep(key));
    }

    /// Left join onto new row keys: each `(new_key, old_key)` pair produces
    /// a row holding `old_key`'s values, or an all-missing row when
    /// `old_key` is not in the panel.
    #[must_use]
    pub fn reindex<N: Ord + Clone>(&self, mapping: impl IntoIterator<Item = (N, K)>) -> Panel<N> {
        let rows = mapping
            .into_iter()
            .map(|(new_key, old_key)| {
                let row = self.rows.get(&old_key).cloned().unwrap_or_default();
                (new_key, row)
            })
            .collect();

        Panel {
            years: self.years.clone(),
            rows,
        }
    }

    /// Mean of the non-missing values of `key` in years `lo..=hi`; `None`
    /// when every year in the window is missing.
    #[must_use]
    pub fn window_mean(&self, key: &K, lo: Year, hi: Year) -> Option<f64> {
        let row = self.rows.get(key)?;
        mean(row.range(lo..=hi).map(|(_, v)| *v))
    }
}

/// Arithmetic mean skipping nothing; `None` for an empty iterator.
#[allow(clippy::cast_precision_loss)]
fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

/// Builds a panel by calling `per_year` for every year and outer-joining
/// the results on the entity key.
///
/// Years are independent; the result does not depend on evaluation order.
///
/// # Errors
///
/// Propagates the first error returned by `per_year`.
pub fn build_panel<K, E, F>(years: impl IntoIterator<Item = Year>, mut per_year: F) -> Result<Panel<K>, E>
where
    K: Ord + Clone,
    F: FnMut(Year) -> Result<Series<K>, E>,
{
    let mut panel = Panel::new();
    for year in years {
        let series = per_year(year)?;
        log::debug!("Panel year {year}: {} entities", series.len());
        panel.push_column(year, series);
    }
    Ok(panel)
}
