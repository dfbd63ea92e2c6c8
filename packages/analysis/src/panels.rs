//! Multi-year exposure panels.
//!
//! Block and block-group panels come from the multi-satellite product with
//! zero-population units filtered out year by year. Grid panels keep the
//! satellite cells themselves, keyed with the current product's binning, and
//! are joined onto blocks after smoothing.

use moncov_cache::CacheKey;
use moncov_geography_models::{BlockInfo, GeoUnit};
use moncov_grid::{GridKey, GridProduct};
use moncov_panel::{Panel, Series, Year, build_panel, panel_to_3lag, panel_to_3nolag};
use moncov_source::DataSource;
use strum_macros::{AsRefStr, Display, EnumString};

use crate::exposure::{
    grid_lookup, population_weighted, unit_label, unit_population, with_positive_population,
};
use crate::{Analysis, AnalysisError, ExposureSource};

/// Three-year smoothing applied to a panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr)]
pub enum Smoothing {
    /// Unsmoothed annual values.
    #[strum(serialize = "raw")]
    Raw,
    /// Mean of the three preceding years.
    #[strum(serialize = "3lag")]
    Lag3,
    /// Mean of the year and the two before it.
    #[strum(serialize = "3nolag")]
    NoLag3,
}

impl Smoothing {
    /// Applies the smoothing to `panel`.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError::Panel`] when the panel is too short.
    pub fn apply<K: Ord + Clone>(self, panel: &Panel<K>) -> Result<Panel<K>, AnalysisError> {
        Ok(match self {
            Self::Raw => panel.clone(),
            Self::Lag3 => panel_to_3lag(panel)?,
            Self::NoLag3 => panel_to_3nolag(panel)?,
        })
    }
}

/// Extracts one year of a panel.
///
/// # Errors
///
/// Returns [`AnalysisError::MissingYear`] when `year` is not a column.
pub fn panel_year<K: Ord + Clone>(panel: &Panel<K>, year: Year) -> Result<Series<K>, AnalysisError> {
    if panel.years().contains(&year) {
        Ok(panel.column(year))
    } else {
        Err(AnalysisError::MissingYear { year })
    }
}

/// Joins a grid panel onto blocks: each block takes the row of the cell its
/// point bins into, or an all-missing row.
#[must_use]
pub fn merge_blocks_grid(blocks: &[BlockInfo], grid_panel: &Panel<GridKey>) -> Panel<String> {
    grid_panel.reindex(blocks.iter().map(|block| {
        (
            block.block_id.clone(),
            GridProduct::Multisat.key(block.x, block.y),
        )
    }))
}

impl<S: DataSource> Analysis<S> {
    /// Multi-satellite exposure of units with positive population.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError`] if inputs cannot be loaded or a unit has no
    /// population.
    pub fn multisatpm_withpop(&self, year: Year, unit: GeoUnit) -> Result<Series<String>, AnalysisError> {
        let key = CacheKey::new(&format!("{}_multisatpm_withpop", unit_label(unit))).arg(year);
        self.cache.load_or_build(&key, || {
            let exposure = self.multisatpm_exposure(year, unit)?;
            let population = unit_population(&self.source.blocks_population()?, unit)?;
            with_positive_population(&exposure, &population)
        })
    }

    /// [`Self::multisatpm_withpop`] over the configured block years.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError`] if any year fails.
    pub fn multisatpm_withpop_panel(&self, unit: GeoUnit) -> Result<Panel<String>, AnalysisError> {
        let key = CacheKey::new(&format!("{}_multisatpm_withpop_panel", unit_label(unit)));
        self.cache.load_or_build(&key, || {
            build_panel(self.years.block_years(), |year| self.multisatpm_withpop(year, unit))
        })
    }

    /// Smoothed multi-satellite panel for blocks or block groups.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError`] if the panel cannot be built or is too
    /// short for the smoothing.
    pub fn prep_multisatpm_3year(
        &self,
        unit: GeoUnit,
        smoothing: Smoothing,
    ) -> Result<Panel<String>, AnalysisError> {
        let label = match smoothing {
            Smoothing::Raw => return self.multisatpm_withpop_panel(unit),
            Smoothing::Lag3 => "wlag",
            Smoothing::NoLag3 => "nolag",
        };
        let key = CacheKey::new(&format!("tmp_multisatpm_3year_{label}_{unit}"));
        self.cache.load_or_build(&key, || {
            smoothing.apply(&self.multisatpm_withpop_panel(unit)?)
        })
    }

    /// Satellite grid panel over the configured grid years. Cells are keyed
    /// with the current product's binning whichever product supplies them.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError`] if a year's grid cannot be loaded.
    pub fn satellite_panel(&self, data: ExposureSource) -> Result<Panel<GridKey>, AnalysisError> {
        build_panel(self.years.grid_years(), |year| {
            let grid = match data {
                ExposureSource::Multisatpm => self.source.multisat_conus_year(year)?,
                ExposureSource::Msatna => self.source.msat_northamer_1year(year)?,
            };
            Ok::<_, AnalysisError>(
                grid_lookup(&grid, GridProduct::Multisat)
                    .into_iter()
                    .map(|(key, value)| (key, Some(value)))
                    .collect(),
            )
        })
    }

    /// Three-year lagged grid panel.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError`] if the grid panel cannot be built.
    pub fn satellite_3lag_panel(&self, data: ExposureSource) -> Result<Panel<GridKey>, AnalysisError> {
        let key = CacheKey::new(&format!("tmp_{data}_3lag_panel"));
        self.cache
            .load_or_build(&key, || Ok(panel_to_3lag(&self.satellite_panel(data)?)?))
    }

    /// One year of [`Self::satellite_3lag_panel`].
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError::MissingYear`] if the lagged panel does not
    /// reach `year`.
    pub fn satellite_3lag_year(&self, data: ExposureSource, year: Year) -> Result<Series<GridKey>, AnalysisError> {
        let key = CacheKey::new(&format!("tmp_{data}_3lag")).arg(year);
        self.cache
            .load_or_build(&key, || panel_year(&self.satellite_3lag_panel(data)?, year))
    }

    /// North America grid panel joined onto blocks.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError`] if inputs cannot be loaded.
    pub fn msatna_blocks_panel(&self) -> Result<Panel<String>, AnalysisError> {
        let key = CacheKey::new("tmp_msatna_blocks_panel");
        self.cache.load_or_build(&key, || {
            let grid = self.satellite_panel(ExposureSource::Msatna)?;
            Ok(merge_blocks_grid(&self.source.blocks_shape_info()?, &grid))
        })
    }

    /// Lagged North America grid panel joined onto blocks.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError`] if inputs cannot be loaded.
    pub fn msatna_blocks_3lag_panel(&self) -> Result<Panel<String>, AnalysisError> {
        let key = CacheKey::new("tmp_msatna_blocks_3lag_panel");
        self.cache.load_or_build(&key, || {
            let grid = self.satellite_3lag_panel(ExposureSource::Msatna)?;
            Ok(merge_blocks_grid(&self.source.blocks_shape_info()?, &grid))
        })
    }

    /// One year of [`Self::msatna_blocks_3lag_panel`].
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError::MissingYear`] if the lagged panel does not
    /// reach `year`.
    pub fn msatna_blocks_3lag_year(&self, year: Year) -> Result<Series<String>, AnalysisError> {
        let key = CacheKey::new("tmp_msatna_blocks_3lag").arg(year);
        self.cache
            .load_or_build(&key, || panel_year(&self.msatna_blocks_3lag_panel()?, year))
    }

    /// Lagged North America exposure weighted up to block groups.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError`] if inputs cannot be loaded or a block has no
    /// population.
    pub fn msatna_bg_3lag_year(&self, year: Year) -> Result<Series<String>, AnalysisError> {
        let key = CacheKey::new("tmp_msatna_bg_3lag").arg(year);
        self.cache.load_or_build(&key, || {
            let blocks = self.msatna_blocks_3lag_year(year)?;
            population_weighted(&blocks, &self.source.blocks_population()?, GeoUnit::BlockGroup)
        })
    }
}
