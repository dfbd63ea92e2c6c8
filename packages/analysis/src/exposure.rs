//! Satellite exposure joined onto census geography.
//!
//! Block exposure is a left join of blocks onto grid cells through a
//! [`GridKey`]: a block whose cell is absent from the satellite grid keeps a
//! missing value. Coarser units are population-weighted sums over their
//! member blocks, `Σ exposure × pop / unit_pop`, where blocks with missing
//! exposure contribute nothing and the weights are not renormalized.

use std::collections::{BTreeMap, btree_map::Entry};

use moncov_cache::CacheKey;
use moncov_geography_models::{BlockInfo, GeoIdError, GeoUnit};
use moncov_grid::{GridKey, GridProduct, GridValue};
use moncov_panel::{Series, Year};
use moncov_source::DataSource;

use crate::{Analysis, AnalysisError};

/// Indexes a satellite grid by cell key. When two cells bin to the same
/// key the first one wins.
#[must_use]
pub fn grid_lookup(grid: &[GridValue], product: GridProduct) -> BTreeMap<GridKey, f64> {
    let mut lookup = BTreeMap::new();
    let mut duplicates = 0usize;

    for cell in grid.iter().filter(|cell| !cell.exposure.is_nan()) {
        match lookup.entry(product.key(cell.x, cell.y)) {
            Entry::Vacant(slot) => {
                slot.insert(cell.exposure);
            }
            Entry::Occupied(_) => duplicates += 1,
        }
    }

    if duplicates > 0 {
        log::warn!("{duplicates} {product} grid cells share a key with an earlier cell, kept the first");
    }

    lookup
}

/// Block exposure: each block takes the value of the grid cell its
/// representative point bins into, or missing when there is none.
#[must_use]
pub fn block_exposure(blocks: &[BlockInfo], grid: &[GridValue], product: GridProduct) -> Series<String> {
    let lookup = grid_lookup(grid, product);
    blocks
        .iter()
        .map(|block| {
            let key = product.key(block.x, block.y);
            (block.block_id.clone(), lookup.get(&key).copied())
        })
        .collect()
}

/// Truncates `block_id` to the id of its `unit`.
///
/// # Errors
///
/// Returns [`GeoIdError::InvalidId`] unless `block_id` is exactly 15
/// digits. A block id that lost a leading zero would otherwise prefix into
/// the wrong block group and county.
pub fn unit_id(block_id: &str, unit: GeoUnit) -> Result<&str, GeoIdError> {
    GeoUnit::Block.validate(block_id)?;
    unit.from_block(block_id).ok_or_else(|| GeoIdError::InvalidId {
        unit: GeoUnit::Block,
        id: block_id.to_string(),
    })
}

/// Population of every `unit` as the sum of its member blocks.
///
/// # Errors
///
/// Returns [`AnalysisError::GeoId`] for a malformed block id.
pub fn unit_population(
    population: &BTreeMap<String, u64>,
    unit: GeoUnit,
) -> Result<BTreeMap<String, u64>, AnalysisError> {
    let mut totals = BTreeMap::new();
    for (block_id, pop) in population {
        *totals
            .entry(unit_id(block_id, unit)?.to_string())
            .or_insert(0) += pop;
    }
    Ok(totals)
}

/// Attaches a population to every entry of `values`.
///
/// # Errors
///
/// Returns [`AnalysisError::MissingPopulation`] for the first id that has no
/// population.
pub fn merge_population<V: Clone>(
    values: &BTreeMap<String, V>,
    population: &BTreeMap<String, u64>,
) -> Result<BTreeMap<String, (V, u64)>, AnalysisError> {
    values
        .iter()
        .map(|(id, value)| {
            let pop = population
                .get(id)
                .copied()
                .ok_or_else(|| AnalysisError::MissingPopulation { id: id.clone() })?;
            Ok((id.clone(), (value.clone(), pop)))
        })
        .collect()
}

/// Keeps the entries of `series` whose population is positive.
///
/// # Errors
///
/// Returns [`AnalysisError::MissingPopulation`] if an id has no population.
pub fn with_positive_population(
    series: &Series<String>,
    population: &BTreeMap<String, u64>,
) -> Result<Series<String>, AnalysisError> {
    Ok(merge_population(series, population)?
        .into_iter()
        .filter(|(_, (_, pop))| *pop > 0)
        .map(|(id, (value, _))| (id, value))
        .collect())
}

/// Population-weighted aggregation of block exposure to `unit`.
///
/// Every block in `blocks` counts toward its unit's population whether or
/// not its exposure is known. Units with zero population are dropped;
/// units where no member block has exposure come out missing.
///
/// # Errors
///
/// Returns [`AnalysisError::MissingPopulation`] if a block has no
/// population, or [`AnalysisError::GeoId`] for a malformed block id.
#[allow(clippy::cast_precision_loss)]
pub fn population_weighted(
    blocks: &Series<String>,
    population: &BTreeMap<String, u64>,
    unit: GeoUnit,
) -> Result<Series<String>, AnalysisError> {
    let merged = merge_population(blocks, population)?;

    let mut groups: BTreeMap<&str, (u64, Option<f64>)> = BTreeMap::new();
    for (block_id, (exposure, pop)) in &merged {
        let group = groups.entry(unit_id(block_id, unit)?).or_insert((0, None));
        group.0 += pop;
        if let Some(exposure) = exposure {
            group.1 = Some(group.1.unwrap_or(0.0) + exposure * *pop as f64);
        }
    }

    Ok(groups
        .into_iter()
        .filter(|(_, (unit_pop, _))| *unit_pop > 0)
        .map(|(id, (unit_pop, weighted))| {
            (id.to_string(), weighted.map(|sum| sum / unit_pop as f64))
        })
        .collect())
}

/// Aggregates block exposure to any unit.
///
/// # Errors
///
/// See [`population_weighted`].
pub fn aggregate_exposure(
    blocks: Series<String>,
    population: &BTreeMap<String, u64>,
    unit: GeoUnit,
) -> Result<Series<String>, AnalysisError> {
    match unit {
        GeoUnit::Block => Ok(blocks),
        GeoUnit::BlockGroup | GeoUnit::County => population_weighted(&blocks, population, unit),
    }
}

/// Plural label used in artifact names (`blocks`, `bg`, `fips`).
#[must_use]
pub const fn unit_label(unit: GeoUnit) -> &'static str {
    match unit {
        GeoUnit::Block => "blocks",
        GeoUnit::BlockGroup => "bg",
        GeoUnit::County => "fips",
    }
}

impl<S: DataSource> Analysis<S> {
    /// Multi-satellite exposure for every CONUS unit in `year`.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError`] if inputs cannot be loaded or a population
    /// join fails.
    pub fn multisatpm_exposure(&self, year: Year, unit: GeoUnit) -> Result<Series<String>, AnalysisError> {
        let key = CacheKey::new(&format!("multisatpm_exposure_{unit}_conus")).arg(year);
        self.cache.load_or_build(&key, || {
            let grid = self.source.multisat_conus_year(year)?;
            let blocks = self.source.blocks_shape_info()?;
            let exposure = block_exposure(&blocks, &grid, GridProduct::Multisat);
            log::debug!("{year}: {} blocks, {} grid cells", blocks.len(), grid.len());

            if unit == GeoUnit::Block {
                return Ok(exposure);
            }
            let population = self.source.blocks_population()?;
            aggregate_exposure(exposure, &population, unit)
        })
    }

    /// Block exposure from the legacy v04NA01 three-year product, binned
    /// with that product's own rule.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError`] if inputs cannot be loaded.
    pub fn msatna_v04na01_exposure_block(&self, year: Year) -> Result<Series<String>, AnalysisError> {
        let key = CacheKey::new("msat_v04NA01_exposure_block_conus").arg(year);
        self.cache.load_or_build(&key, || {
            let grid = self.source.msat_northamer_conus_3year(year)?;
            let blocks = self.source.blocks_shape_info()?;
            Ok(block_exposure(&blocks, &grid, GridProduct::MsatV04na01))
        })
    }

    /// Joins block populations onto `values`.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError::MissingPopulation`] if a block has none.
    pub fn merge_blocks_pop<V: Clone>(
        &self,
        values: &BTreeMap<String, V>,
    ) -> Result<BTreeMap<String, (V, u64)>, AnalysisError> {
        merge_population(values, &self.source.blocks_population()?)
    }

    /// Joins block-group populations onto `values`.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError::MissingPopulation`] if a block group has
    /// none.
    pub fn merge_bg_pop<V: Clone>(
        &self,
        values: &BTreeMap<String, V>,
    ) -> Result<BTreeMap<String, (V, u64)>, AnalysisError> {
        let population = unit_population(&self.source.blocks_population()?, GeoUnit::BlockGroup)?;
        merge_population(values, &population)
    }
}
