#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Command-line driver for the monitor coverage pipeline.
//!
//! Reads normalised inputs from the configured data directory, memoizes
//! derived tables under it, and writes each result as a CSV file into the
//! current month's output directory.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use moncov_analysis::exposure::aggregate_exposure;
use moncov_analysis::misclass::exposure_quantiles;
use moncov_analysis::mortality::{VSL, county_scaling, effect_deaths, peak_shaving};
use moncov_analysis::panels::Smoothing;
use moncov_analysis::{Analysis, ExposureSource, parse_rule};
use moncov_cache::ArtifactCache;
use moncov_config::Config;
use moncov_geography_models::GeoUnit;
use moncov_grid::GridProduct;
use moncov_source::{CensusSource, CsvDirSource};
use serde::Serialize;

#[derive(Parser)]
#[command(name = "moncov", about = "EPA PM2.5 monitor coverage pipeline")]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Rebuild every derived table instead of reading memoized copies
    #[arg(long, global = true)]
    no_cache: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Match PM2.5 monitors to the census block containing them
    MonitorsBlock,
    /// One year of satellite exposure with the population of each unit
    BlockExposure {
        #[arg(long)]
        year: i32,
        /// `multisat`, or `msat_v04na01` for the legacy three-year product
        #[arg(long, default_value = "multisat")]
        product: String,
        /// `block` or `bg`
        #[arg(long, default_value = "block")]
        level: String,
    },
    /// Exposure panel for blocks or block groups
    BlockPanel {
        /// `block` or `bg`
        #[arg(long, default_value = "block")]
        level: String,
        /// `raw`, `3lag`, or `3nolag`
        #[arg(long, default_value = "3lag")]
        transform: String,
        /// `multisatpm`, or `msatna` (blocks only, `raw` or `3lag`)
        #[arg(long, default_value = "multisatpm")]
        data: String,
    },
    /// Lagged satellite grid for one year
    GridExposure {
        #[arg(long)]
        year: i32,
        #[arg(long, default_value = "multisatpm")]
        data: String,
    },
    /// Per-block monitor coverage classification
    Misclass {
        #[arg(long)]
        year: i32,
        /// `pm25_97`, `pm25_06`, or `pm25_12`
        #[arg(long)]
        rule: String,
        /// `multisatpm` or `msatna`
        #[arg(long, default_value = "multisatpm")]
        data: String,
    },
    /// Counties containing a misclassified block
    FipsMisclass {
        #[arg(long)]
        year: i32,
        #[arg(long)]
        rule: String,
        #[arg(long, default_value = "multisatpm")]
        data: String,
    },
    /// Flagged monitor readings around a rule's implementation
    MonitorSample {
        #[arg(long)]
        rule: String,
        /// Start the window further back
        #[arg(long)]
        semi: bool,
    },
    /// Block exposure and deaths in misclassified counties
    MortalityExposure {
        #[arg(long)]
        rule: String,
        #[arg(long, default_value = "multisatpm")]
        data: String,
        /// Estimated effect on blocks over the threshold
        #[arg(long, requires = "untargeted")]
        targeted: Option<f64>,
        /// Estimated effect on blocks under the threshold
        #[arg(long, requires = "targeted")]
        untargeted: Option<f64>,
    },
}

#[derive(Serialize)]
struct MonitorBlockRow {
    monitor_id: String,
    block_id: String,
}

#[derive(Serialize)]
struct PanelRow<'a> {
    id: &'a str,
    year: i32,
    exp: f64,
}

#[derive(Serialize)]
struct ExposureRow {
    id: String,
    exp: Option<f64>,
    pop: u64,
}

#[derive(Serialize)]
struct GridRow {
    x: f64,
    y: f64,
    exp: Option<f64>,
}

#[derive(Serialize)]
struct FipsMisclassRow {
    fips: String,
    misclassified: bool,
}

#[derive(Serialize)]
struct DeathsRow<'a> {
    method: &'a str,
    deaths: f64,
    value_millions: f64,
    mean_decrease: Option<f64>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref())?;
    let source = CsvDirSource::new(config.src_dir(), config.gis_dir());
    let cache = if cli.no_cache {
        ArtifactCache::disabled()
    } else {
        ArtifactCache::on_disk(config.artifact_dir())
    };
    let analysis = Analysis::new(source, cache, config.years.clone());

    match cli.command {
        Commands::MonitorsBlock => {
            let rows = analysis
                .monitors_block()?
                .into_iter()
                .map(|(monitor_id, block_id)| MonitorBlockRow { monitor_id, block_id });
            write_csv(&config.out_path("monitors_block.csv")?, rows)?;
        }
        Commands::BlockExposure { year, product, level } => {
            let product: GridProduct = product.parse()?;
            let unit = GeoUnit::parse(&level)?;
            let exposure = match product {
                GridProduct::Multisat => analysis.multisatpm_exposure(year, unit)?,
                GridProduct::MsatV04na01 => aggregate_exposure(
                    analysis.msatna_v04na01_exposure_block(year)?,
                    &analysis.source().blocks_population()?,
                    unit,
                )?,
            };
            let merged = match unit {
                GeoUnit::Block => analysis.merge_blocks_pop(&exposure)?,
                GeoUnit::BlockGroup => analysis.merge_bg_pop(&exposure)?,
                GeoUnit::County => return Err("block-exposure supports --level block or bg".into()),
            };
            let rows = merged
                .into_iter()
                .map(|(id, (exp, pop))| ExposureRow { id, exp, pop });
            write_csv(&config.out_path(&format!("{product}_exposure_{unit}_{year}.csv"))?, rows)?;
        }
        Commands::BlockPanel { level, transform, data } => {
            let unit = GeoUnit::parse(&level)?;
            let smoothing: Smoothing = transform.parse()?;
            let data = ExposureSource::parse(&data)?;
            let panel = match (data, unit, smoothing) {
                (ExposureSource::Multisatpm, _, _) => analysis.prep_multisatpm_3year(unit, smoothing)?,
                (ExposureSource::Msatna, GeoUnit::Block, Smoothing::Raw) => analysis.msatna_blocks_panel()?,
                (ExposureSource::Msatna, GeoUnit::Block, Smoothing::Lag3) => analysis.msatna_blocks_3lag_panel()?,
                (ExposureSource::Msatna, _, _) => {
                    return Err("msatna panels support --level block with --transform raw or 3lag".into());
                }
            };
            let rows = panel.iter().flat_map(|(id, years)| {
                years.iter().map(move |(&year, &exp)| PanelRow { id, year, exp })
            });
            write_csv(&config.out_path(&format!("{data}_{smoothing}_{unit}.csv"))?, rows)?;
        }
        Commands::GridExposure { year, data } => {
            let data = ExposureSource::parse(&data)?;
            let rows = analysis
                .satellite_3lag_year(data, year)?
                .into_iter()
                .map(|(key, exp)| {
                    let (x, y) = key.center();
                    GridRow { x, y, exp }
                });
            write_csv(&config.out_path(&format!("{data}_3lag_grid_{year}.csv"))?, rows)?;
        }
        Commands::Misclass { year, rule, data } => {
            let rule = parse_rule(&rule)?;
            let data = ExposureSource::parse(&data)?;
            let rows = analysis.blocks_misclass_flag(year, rule, data)?;
            write_csv(&config.out_path(&format!("blocks_misclass_{year}_{rule}_{data}.csv"))?, &rows)?;
            match exposure_quantiles(&rows, &[0.1, 0.5, 0.9]) {
                Ok(quantiles) => log::info!("Population-weighted exposure p10/p50/p90: {quantiles:?}"),
                Err(e) => log::warn!("No exposure quantiles for {year} {rule} {data}: {e}"),
            }
        }
        Commands::FipsMisclass { year, rule, data } => {
            let rule = parse_rule(&rule)?;
            let data = ExposureSource::parse(&data)?;
            let rows = analysis
                .fips_misclass_flag(year, rule, data)?
                .into_iter()
                .map(|(fips, misclassified)| FipsMisclassRow { fips, misclassified });
            write_csv(&config.out_path(&format!("fips_misclass_{year}_{rule}_{data}.csv"))?, rows)?;
        }
        Commands::MonitorSample { rule, semi } => {
            let rule = parse_rule(&rule)?;
            let readings = if semi {
                analysis.semi_constant_monitor_panel(rule)?
            } else {
                analysis.constant_monitor_panel(rule)?
            };
            let rows = analysis.prep_monitor_analysis(&readings, rule)?;
            let name = if semi { "semi_constant" } else { "constant" };
            write_csv(&config.out_path(&format!("monitor_sample_{name}_{rule}.csv"))?, rows)?;
        }
        Commands::MortalityExposure {
            rule,
            data,
            targeted,
            untargeted,
        } => {
            let rule = parse_rule(&rule)?;
            let data = ExposureSource::parse(&data)?;
            let rows = analysis.prep_exposure_data(rule, data)?;

            let shaved = peak_shaving(&rows, rule.threshold());
            let scaled = county_scaling(&rows, rule.threshold());
            let mut summary = vec![
                DeathsRow {
                    method: "peak_shaving",
                    deaths: shaved.deaths,
                    value_millions: shaved.value(),
                    mean_decrease: Some(shaved.mean_decrease),
                },
                DeathsRow {
                    method: "county_scaling",
                    deaths: scaled.deaths,
                    value_millions: scaled.value(),
                    mean_decrease: Some(scaled.mean_decrease),
                },
            ];

            if let (Some(targeted), Some(untargeted)) = (targeted, untargeted) {
                let effects = effect_deaths(&rows, targeted, untargeted);
                for (state, deaths) in &effects.by_state {
                    log::info!("{state}: {deaths:.1} deaths");
                }
                for (method, deaths) in [
                    ("effects_total", effects.total),
                    ("effects_targeted", effects.targeted),
                    ("effects_untargeted", effects.untargeted),
                ] {
                    summary.push(DeathsRow {
                        method,
                        deaths,
                        value_millions: deaths * VSL,
                        mean_decrease: None,
                    });
                }
            }

            write_csv(&config.out_path(&format!("mortality_exposure_{rule}_{data}.csv"))?, rows)?;
            write_csv(&config.out_path(&format!("mortality_deaths_{rule}_{data}.csv"))?, summary)?;
        }
    }

    Ok(())
}

/// Writes `rows` as a headed CSV file.
fn write_csv<T: Serialize>(
    path: &Path,
    rows: impl IntoIterator<Item = T>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut writer = csv::Writer::from_path(path)?;
    let mut count = 0_usize;
    for row in rows {
        writer.serialize(row)?;
        count += 1;
    }
    writer.flush()?;

    log::info!("Wrote {count} rows to {}", path.display());
    Ok(())
}
