//! Body of `POST /search` (STAC API - Item Search).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Query extension operator object; only equality is used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryOp {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eq: Option<serde_json::Value>,

    /// Operators this client does not send but may find in merged bodies.
    #[serde(flatten)]
    pub other: BTreeMap<String, serde_json::Value>,
}

impl QueryOp {
    pub fn eq(value: serde_json::Value) -> Self {
        Self {
            eq: Some(value),
            other: BTreeMap::new(),
        }
    }
}

/// Wire form of a search request.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SearchParams {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub collections: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub intersects: Option<geojson::Geometry>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox: Option<Vec<f64>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub datetime: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<BTreeMap<String, QueryOp>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,

    /// Pagination tokens and other server supplied fields from `next` bodies.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl SearchParams {
    /// Apply a `next` link body: merged over `self` when `merge` is set,
    /// otherwise replacing it.
    pub fn apply_link_body(
        &self,
        body: &serde_json::Value,
        merge: bool,
    ) -> Result<SearchParams, serde_json::Error> {
        if !merge {
            return serde_json::from_value(body.clone());
        }
        let mut base = serde_json::to_value(self)?;
        if let (Some(base_obj), Some(link_obj)) = (base.as_object_mut(), body.as_object()) {
            for (k, v) in link_obj {
                base_obj.insert(k.clone(), v.clone());
            }
        }
        serde_json::from_value(base)
    }
}
