#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! In-memory spatial index over census block polygons.
//!
//! Holds one state's block polygons in an R-tree and answers
//! point-in-polygon queries, optionally restricted to a single county.
//! Used to attribute EPA monitor locations to census blocks.

use geo::{BoundingRect, Contains, MultiPolygon};
use geojson::{Feature, GeoJson};
use rstar::{AABB, RTree, RTreeObject};

/// Block id property in TIGER/Line 2010 block files.
pub const BLOCK_ID_PROPERTY: &str = "GEOID10";
/// County code property in TIGER/Line 2010 block files.
pub const COUNTY_PROPERTY: &str = "COUNTYFP10";

/// Errors raised while reading block geometry.
#[derive(Debug, thiserror::Error)]
pub enum SpatialError {
    /// `GeoJSON` could not be parsed.
    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    /// A feature lacked a required string property.
    #[error("Feature is missing property '{property}'")]
    MissingProperty {
        /// Property name.
        property: &'static str,
    },

    /// A feature's geometry was absent or not polygonal.
    #[error("Block {block_id} has no polygon geometry")]
    UnsupportedGeometry {
        /// Block whose geometry was rejected.
        block_id: String,
    },
}

/// A census block polygon.
#[derive(Debug, Clone)]
pub struct BlockShape {
    /// 15-character block id.
    pub block_id: String,
    /// Three-digit county code within the state.
    pub county_fp: String,
    /// Block boundary.
    pub polygon: MultiPolygon<f64>,
}

impl BlockShape {
    /// Builds a block shape from a TIGER block `GeoJSON` feature.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError`] if the id properties are missing or the
    /// geometry is not a polygon or multipolygon.
    pub fn from_feature(feature: &Feature) -> Result<Self, SpatialError> {
        let block_id = string_property(feature, BLOCK_ID_PROPERTY)?;
        let county_fp = string_property(feature, COUNTY_PROPERTY)?;

        let polygon = feature
            .geometry
            .clone()
            .and_then(|geom| geo::Geometry::<f64>::try_from(geom).ok())
            .and_then(into_multipolygon)
            .ok_or_else(|| SpatialError::UnsupportedGeometry {
                block_id: block_id.clone(),
            })?;

        Ok(Self {
            block_id,
            county_fp,
            polygon,
        })
    }
}

/// Parses a `GeoJSON` feature collection of block polygons.
///
/// # Errors
///
/// Returns [`SpatialError`] if the document is not valid `GeoJSON` or any
/// feature cannot be converted.
pub fn parse_block_shapes(geojson_str: &str) -> Result<Vec<BlockShape>, SpatialError> {
    let geojson: GeoJson = geojson_str.parse()?;
    match geojson {
        GeoJson::FeatureCollection(fc) => fc.features.iter().map(BlockShape::from_feature).collect(),
        GeoJson::Feature(feature) => Ok(vec![BlockShape::from_feature(&feature)?]),
        GeoJson::Geometry(_) => Err(SpatialError::MissingProperty {
            property: BLOCK_ID_PROPERTY,
        }),
    }
}

fn string_property(feature: &Feature, property: &'static str) -> Result<String, SpatialError> {
    feature
        .property(property)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or(SpatialError::MissingProperty { property })
}

fn into_multipolygon(geom: geo::Geometry<f64>) -> Option<MultiPolygon<f64>> {
    match geom {
        geo::Geometry::MultiPolygon(mp) => Some(mp),
        geo::Geometry::Polygon(p) => Some(MultiPolygon(vec![p])),
        _ => None,
    }
}

/// A block polygon stored in the R-tree.
struct BlockEntry {
    shape: BlockShape,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for BlockEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// R-tree over one state's block polygons.
pub struct BlockIndex {
    state_fips: String,
    blocks: RTree<BlockEntry>,
}

impl BlockIndex {
    /// Builds the index for one state.
    #[must_use]
    pub fn new(state_fips: &str, shapes: Vec<BlockShape>) -> Self {
        let entries: Vec<BlockEntry> = shapes
            .into_iter()
            .map(|shape| BlockEntry {
                envelope: compute_envelope(&shape.polygon),
                shape,
            })
            .collect();

        let blocks = RTree::bulk_load(entries);
        log::debug!("Indexed {} blocks for state {state_fips}", blocks.size());

        Self {
            state_fips: state_fips.to_string(),
            blocks,
        }
    }

    /// State FIPS this index covers.
    #[must_use]
    pub fn state_fips(&self) -> &str {
        &self.state_fips
    }

    /// Number of indexed blocks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.blocks.size()
    }

    /// Whether the index is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.size() == 0
    }

    /// Ids of every block whose polygon strictly contains the point.
    ///
    /// Blocks should tile without overlap, so more than one id signals bad
    /// geometry; the caller decides what to do about it. Results are sorted.
    #[must_use]
    pub fn blocks_containing(&self, lng: f64, lat: f64) -> Vec<&str> {
        self.containing(lng, lat, None)
    }

    /// Like [`Self::blocks_containing`], restricted to one county.
    #[must_use]
    pub fn blocks_containing_in_county(&self, lng: f64, lat: f64, county_fp: &str) -> Vec<&str> {
        self.containing(lng, lat, Some(county_fp))
    }

    fn containing(&self, lng: f64, lat: f64, county_fp: Option<&str>) -> Vec<&str> {
        let point = geo::Point::new(lng, lat);
        let query_env = AABB::from_point([lng, lat]);

        let mut hits: Vec<&str> = self
            .blocks
            .locate_in_envelope_intersecting(&query_env)
            .filter(|entry| county_fp.is_none_or(|c| entry.shape.county_fp == c))
            .filter(|entry| entry.shape.polygon.contains(&point))
            .map(|entry| entry.shape.block_id.as_str())
            .collect();
        hits.sort_unstable();
        hits
    }
}

/// Compute the bounding box envelope for a [`MultiPolygon`].
fn compute_envelope(mp: &MultiPolygon<f64>) -> AABB<[f64; 2]> {
    mp.bounding_rect().map_or_else(
        || AABB::from_point([0.0, 0.0]),
        |rect| AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
    )
}

#[cfg(test)]
mod tests {
    use geo::polygon;

    use super::*;

    fn square(block_id: &str, county_fp: &str, x0: f64, y0: f64, size: f64) -> BlockShape {
        BlockShape {
            block_id: block_id.to_string(),
            county_fp: county_fp.to_string(),
            polygon: MultiPolygon(vec![polygon![
                (x: x0, y: y0),
                (x: x0 + size, y: y0),
                (x: x0 + size, y: y0 + size),
                (x: x0, y: y0 + size),
                (x: x0, y: y0),
            ]]),
        }
    }

    fn index() -> BlockIndex {
        BlockIndex::new(
            "06",
            vec![
                square("060010000001000", "001", 0.0, 0.0, 1.0),
                square("060010000001001", "001", 1.0, 0.0, 1.0),
                square("060030000001000", "003", 2.0, 0.0, 1.0),
            ],
        )
    }

    #[test]
    fn finds_containing_block() {
        let idx = index();
        assert_eq!(idx.len(), 3);
        assert_eq!(idx.blocks_containing(0.5, 0.5), vec!["060010000001000"]);
        assert_eq!(idx.blocks_containing(2.5, 0.5), vec!["060030000001000"]);
        assert!(idx.blocks_containing(9.0, 9.0).is_empty());
    }

    #[test]
    fn county_filter_excludes_other_counties() {
        let idx = index();
        assert!(idx.blocks_containing_in_county(2.5, 0.5, "001").is_empty());
        assert_eq!(
            idx.blocks_containing_in_county(1.5, 0.5, "001"),
            vec!["060010000001001"]
        );
    }

    #[test]
    fn boundary_points_are_not_contained() {
        let idx = index();
        assert!(idx.blocks_containing(1.0, 0.5).is_empty());
    }

    #[test]
    fn parses_feature_collection() {
        let doc = r#"{
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "properties": {"GEOID10": "110010001001000", "COUNTYFP10": "001"},
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[-77.1, 38.9], [-77.0, 38.9], [-77.0, 39.0], [-77.1, 39.0], [-77.1, 38.9]]]
                }
            }]
        }"#;
        let shapes = parse_block_shapes(doc).unwrap();
        assert_eq!(shapes.len(), 1);
        assert_eq!(shapes[0].block_id, "110010001001000");
        assert_eq!(shapes[0].county_fp, "001");

        let idx = BlockIndex::new("11", shapes);
        assert_eq!(idx.blocks_containing(-77.05, 38.95), vec!["110010001001000"]);
    }

    #[test]
    fn rejects_features_without_ids() {
        let doc = r#"{
            "type": "Feature",
            "properties": {"COUNTYFP10": "001"},
            "geometry": {"type": "Point", "coordinates": [0.0, 0.0]}
        }"#;
        assert!(matches!(
            parse_block_shapes(doc),
            Err(SpatialError::MissingProperty { property: "GEOID10" })
        ));
    }
}
