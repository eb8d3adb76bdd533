//! STAC items and item collections (GeoJSON features).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use basin_common::time::parse_datetime;
use basin_common::{BoundingBox, CrsCode, Footprint};

use crate::asset::Asset;
use crate::error::ProtocolError;
use crate::link::{find_rel, Link};

/// One page of search results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemCollection {
    #[serde(rename = "type", default = "feature_collection")]
    pub type_: String,

    pub features: Vec<StacItem>,

    #[serde(default)]
    pub links: Vec<Link>,

    #[serde(rename = "numberMatched", skip_serializing_if = "Option::is_none")]
    pub number_matched: Option<u64>,

    #[serde(rename = "numberReturned", skip_serializing_if = "Option::is_none")]
    pub number_returned: Option<u64>,
}

fn feature_collection() -> String {
    "FeatureCollection".to_string()
}

impl ItemCollection {
    pub fn new(features: Vec<StacItem>) -> Self {
        Self {
            type_: feature_collection(),
            features,
            links: Vec::new(),
            number_matched: None,
            number_returned: None,
        }
    }

    /// Find the `"next"` pagination link, if any.
    pub fn next_link(&self) -> Option<&Link> {
        find_rel(&self.links, "next")
    }
}

/// A single STAC item. Items are treated as immutable once received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StacItem {
    #[serde(rename = "type", default = "feature")]
    pub type_: String,

    /// Unique item identifier.
    pub id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,

    /// Footprint in WGS84 lon/lat, `null` for non-spatial items.
    pub geometry: Option<geojson::Geometry>,

    /// Bounding box `[west, south, east, north]`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox: Option<Vec<f64>>,

    /// Property bag; `datetime` or `start_datetime`/`end_datetime` live here.
    #[serde(default)]
    pub properties: serde_json::Map<String, serde_json::Value>,

    #[serde(default)]
    pub assets: BTreeMap<String, Asset>,

    #[serde(default)]
    pub links: Vec<Link>,
}

fn feature() -> String {
    "Feature".to_string()
}

impl StacItem {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            type_: feature(),
            id: id.into(),
            collection: None,
            geometry: None,
            bbox: None,
            properties: serde_json::Map::new(),
            assets: BTreeMap::new(),
            links: Vec::new(),
        }
    }

    /// Get an asset by key.
    pub fn asset(&self, key: &str) -> Option<&Asset> {
        self.assets.get(key)
    }

    pub fn property(&self, key: &str) -> Option<&serde_json::Value> {
        self.properties.get(key)
    }

    fn datetime_property(&self, key: &str) -> Option<DateTime<Utc>> {
        self.properties
            .get(key)
            .and_then(|v| v.as_str())
            .and_then(|s| parse_datetime(s).ok())
    }

    /// The nominal `datetime` property.
    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        self.datetime_property("datetime")
    }

    /// Time span the item covers: `start_datetime`/`end_datetime` when both
    /// are present, otherwise the instant `datetime`.
    pub fn temporal_extent(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        match (
            self.datetime_property("start_datetime"),
            self.datetime_property("end_datetime"),
        ) {
            (Some(start), Some(end)) => Some((start, end)),
            _ => self.datetime().map(|dt| (dt, dt)),
        }
    }

    pub fn bounding_box(&self) -> Option<BoundingBox> {
        self.bbox.as_deref().and_then(BoundingBox::from_slice)
    }

    /// Item geometry as a `geo` geometry.
    pub fn geo_geometry(&self) -> Result<Option<geo::Geometry<f64>>, ProtocolError> {
        match &self.geometry {
            None => Ok(None),
            Some(g) => geo::Geometry::<f64>::try_from(g.clone())
                .map(Some)
                .map_err(|e| ProtocolError::InvalidGeometry {
                    item: self.id.clone(),
                    message: e.to_string(),
                }),
        }
    }

    /// Polygonal footprint, for items whose geometry is a (multi)polygon.
    pub fn footprint(&self) -> Result<Option<Footprint>, ProtocolError> {
        match &self.geometry {
            None => Ok(None),
            Some(g) => Footprint::from_geojson(g, CrsCode::Epsg4326)
                .map(Some)
                .map_err(|e| ProtocolError::InvalidGeometry {
                    item: self.id.clone(),
                    message: e.to_string(),
                }),
        }
    }
}
