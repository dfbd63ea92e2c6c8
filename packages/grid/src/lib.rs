#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Coordinate binning onto satellite PM2.5 grids.
//!
//! Satellite exposure rasters and census block points only meet through an
//! integer grid key. Each satellite product bins coordinates with its own
//! rule, so a [`GridKey`] remembers which [`GridProduct`] produced it and
//! keys from different products never compare equal.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Native resolution of both supported products, in degrees.
pub const BIN_WIDTH_DEG: f64 = 0.01;

/// A satellite product and its binning rule.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
pub enum GridProduct {
    /// Current multi-satellite product. Keys are 0.01° cell centers:
    /// `floor(coord * 100) * 10 + 5`.
    #[strum(serialize = "multisat")]
    #[serde(rename = "multisat")]
    Multisat,
    /// Legacy North America v04NA01 product. Keys are nearest 0.01°
    /// buckets: `round(coord * 100)`.
    #[strum(serialize = "msat_v04na01")]
    #[serde(rename = "msat_v04na01")]
    MsatV04na01,
}

impl GridProduct {
    /// Bins one coordinate.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn to_key(self, coord: f64) -> i64 {
        match self {
            Self::Multisat => (coord * 100.0).floor() as i64 * 10 + 5,
            // numpy rounds half to even
            Self::MsatV04na01 => (coord * 100.0).round_ties_even() as i64,
        }
    }

    /// Maps a key back to a representative coordinate.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_key(self, key: i64) -> f64 {
        match self {
            Self::Multisat => key as f64 / 1000.0,
            Self::MsatV04na01 => key as f64 / 100.0,
        }
    }

    /// Bins an `(x, y)` point.
    #[must_use]
    pub fn key(self, x: f64, y: f64) -> GridKey {
        GridKey {
            product: self,
            x_int: self.to_key(x),
            y_int: self.to_key(y),
        }
    }
}

/// Integer grid cell key for one product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GridKey {
    /// Product whose binning rule produced the key.
    pub product: GridProduct,
    /// Binned x (longitude).
    pub x_int: i64,
    /// Binned y (latitude).
    pub y_int: i64,
}

impl GridKey {
    /// Representative coordinate of the cell.
    #[must_use]
    pub fn center(&self) -> (f64, f64) {
        (
            self.product.from_key(self.x_int),
            self.product.from_key(self.y_int),
        )
    }
}

impl std::fmt::Display for GridKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.product, self.x_int, self.y_int)
    }
}

/// One satellite grid cell value, as returned by the raster loaders.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridValue {
    /// Cell longitude.
    pub x: f64,
    /// Cell latitude.
    pub y: f64,
    /// Estimated concentration (µg/m³).
    pub exposure: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    const COORDS: &[f64] = &[
        -118.2437, -73.9857, 34.0522, 40.7484, 0.0, 0.004_999, -0.005, 24.5, 49.499,
    ];

    #[test]
    fn multisat_keys_are_cell_centers() {
        assert_eq!(GridProduct::Multisat.to_key(-118.2437), -118_245);
        assert_eq!(GridProduct::Multisat.to_key(34.0522), 34_055);
        assert_eq!(GridProduct::Multisat.to_key(0.0), 5);
        assert!((GridProduct::Multisat.from_key(34_055) - 34.055).abs() < 1e-12);
    }

    #[test]
    fn legacy_keys_round_to_nearest_bucket() {
        assert_eq!(GridProduct::MsatV04na01.to_key(34.0522), 3405);
        assert_eq!(GridProduct::MsatV04na01.to_key(-118.2437), -11824);
        // half to even
        assert_eq!(GridProduct::MsatV04na01.to_key(0.125), 12);
    }

    #[test]
    fn round_trip_within_one_bin() {
        for product in [GridProduct::Multisat, GridProduct::MsatV04na01] {
            for &c in COORDS {
                let back = product.from_key(product.to_key(c));
                assert!(
                    (back - c).abs() <= BIN_WIDTH_DEG,
                    "{product}: {c} -> {back}"
                );
            }
        }
    }

    #[test]
    fn points_in_same_cell_share_a_key() {
        let a = GridProduct::Multisat.key(-87.6201, 41.8801);
        let b = GridProduct::Multisat.key(-87.6299, 41.8899);
        assert_eq!(a, b);
    }

    #[test]
    fn products_never_share_keys() {
        let a = GridProduct::Multisat.key(-87.62, 41.88);
        let b = GridProduct::MsatV04na01.key(-87.62, 41.88);
        assert_ne!(a, b);
    }

    #[test]
    fn product_names() {
        assert_eq!(GridProduct::Multisat.to_string(), "multisat");
        assert_eq!(
            "msat_v04na01".parse::<GridProduct>().unwrap(),
            GridProduct::MsatV04na01
        );
    }
}
