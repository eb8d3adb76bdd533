//! GeoJSON export of the selected basin and the river network.

use std::path::Path;

use geojson::{Feature, FeatureCollection, Geometry, JsonObject, JsonValue};

use crate::boundary::Basin;
use crate::error::{VectorError, VectorResult};
use crate::overpass::RiverNetwork;

/// The basin as a single feature, DBF attributes as properties.
pub fn basin_feature(basin: &Basin) -> Feature {
    let mut properties = JsonObject::new();
    for (k, v) in &basin.attributes {
        properties.insert(k.clone(), JsonValue::String(v.clone()));
    }
    properties.insert("record_index".to_string(), JsonValue::from(basin.index));
    properties.insert("crs".to_string(), JsonValue::String(basin.footprint.crs.to_string()));

    Feature {
        bbox: None,
        geometry: Some(basin.footprint.to_geojson()),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

pub fn basin_collection(basin: &Basin) -> FeatureCollection {
    FeatureCollection {
        bbox: basin.bbox().map(|b| b.to_array().to_vec()),
        features: vec![basin_feature(basin)],
        foreign_members: None,
    }
}

/// One LineString feature per way.
pub fn rivers_collection(network: &RiverNetwork) -> FeatureCollection {
    let features = network
        .features
        .iter()
        .map(|river| {
            let mut properties = JsonObject::new();
            properties.insert("osm_id".to_string(), JsonValue::from(river.osm_id));
            properties.insert(
                "name".to_string(),
                river
                    .name
                    .clone()
                    .map(JsonValue::String)
                    .unwrap_or(JsonValue::Null),
            );
            properties.insert("kind".to_string(), JsonValue::String(river.kind.clone()));
            Feature {
                bbox: None,
                geometry: Some(Geometry::new(geojson::Value::from(&river.geometry))),
                id: None,
                properties: Some(properties),
                foreign_members: None,
            }
        })
        .collect();

    FeatureCollection {
        bbox: network.bbox().map(|b| b.to_array().to_vec()),
        features,
        foreign_members: None,
    }
}

pub fn write_feature_collection(path: &Path, collection: &FeatureCollection) -> VectorResult<()> {
    let json = serde_json::to_vec_pretty(collection)?;
    std::fs::write(path, json).map_err(|e| VectorError::io(path, e))
}
