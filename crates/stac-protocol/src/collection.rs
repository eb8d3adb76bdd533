//! STAC collection types.
//!
//! Only the fields needed to list and describe collections are typed;
//! everything else is kept in `extra`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::link::{find_rel, Link};

/// Response of `GET /collections`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionList {
    pub collections: Vec<Collection>,

    #[serde(default)]
    pub links: Vec<Link>,
}

impl CollectionList {
    pub fn next_link(&self) -> Option<&Link> {
        find_rel(&self.links, "next")
    }
}

/// A named grouping of items sharing a schema and provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    /// Unique identifier for the collection.
    pub id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub extent: Option<CollectionExtent>,

    #[serde(default)]
    pub links: Vec<Link>,

    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// Spatial and temporal extent of a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionExtent {
    pub spatial: SpatialExtent,
    pub temporal: TemporalExtent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpatialExtent {
    pub bbox: Vec<Vec<f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporalExtent {
    /// `[start, end]` pairs, `null` for open ends.
    pub interval: Vec<[Option<String>; 2]>,
}

/// Short view of a collection for listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionSummary {
    pub id: String,
    pub title: Option<String>,
    pub description: Option<String>,
}

impl Collection {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: None,
            description: None,
            keywords: Vec::new(),
            license: None,
            extent: None,
            links: Vec::new(),
            extra: HashMap::new(),
        }
    }

    pub fn summary(&self) -> CollectionSummary {
        CollectionSummary {
            id: self.id.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
        }
    }
}
