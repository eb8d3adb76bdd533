//! Typed search requests and the matching client-side predicates.
//!
//! An [`ItemSearch`] is the AND of up to three predicate kinds:
//! - spatial: item geometry intersects the search footprint (true polygon
//!   test, the item bbox is only used when an item has no geometry)
//! - temporal: the item's instant or `start_datetime`/`end_datetime` span
//!   intersects the inclusive search range
//! - attribute: exact, case-sensitive equality on a property (numbers by value)

use geo::Intersects;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use basin_common::{CrsCode, DateRange, Footprint};

use crate::error::ProtocolError;
use crate::item::StacItem;
use crate::search::{QueryOp, SearchParams};

/// Exact-match equality on a named item property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeFilter {
    pub property: String,
    pub value: serde_json::Value,
}

impl AttributeFilter {
    pub fn eq(property: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        Self {
            property: property.into(),
            value: value.into(),
        }
    }

    /// Parse `name=value`. The value is read as JSON when it is a number,
    /// boolean or quoted string, and as a bare string otherwise.
    pub fn parse(s: &str) -> Result<Self, ProtocolError> {
        let (name, raw) = s.split_once('=').ok_or_else(|| ProtocolError::InvalidParameter {
            param: "query".to_string(),
            message: format!("expected name=value, got '{}'", s),
        })?;
        let name = name.trim();
        if name.is_empty() {
            return Err(ProtocolError::InvalidParameter {
                param: "query".to_string(),
                message: format!("empty property name in '{}'", s),
            });
        }
        let raw = raw.trim();
        let value = match serde_json::from_str::<serde_json::Value>(raw) {
            Ok(v @ (serde_json::Value::Number(_)
            | serde_json::Value::Bool(_)
            | serde_json::Value::String(_))) => v,
            _ => serde_json::Value::String(raw.to_string()),
        };
        Ok(Self::eq(name, value))
    }

    /// Strings and booleans compare exactly; numbers compare by value, so
    /// `30` matches a server's `30.0`.
    pub fn matches(&self, item: &StacItem) -> bool {
        match (item.property(&self.property), &self.value) {
            (Some(serde_json::Value::Number(actual)), serde_json::Value::Number(expected)) => {
                numbers_equal(actual, expected)
            }
            (Some(actual), expected) => actual == expected,
            (None, _) => false,
        }
    }
}

fn numbers_equal(a: &serde_json::Number, b: &serde_json::Number) -> bool {
    match (a.as_i64(), b.as_i64()) {
        (Some(x), Some(y)) => x == y,
        _ => match (a.as_u64(), b.as_u64()) {
            (Some(x), Some(y)) => x == y,
            _ => a.as_f64() == b.as_f64(),
        },
    }
}

/// Why an item failed a predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterMismatch {
    Collection { expected: Vec<String>, actual: Option<String> },
    Spatial,
    Temporal,
    Attribute { property: String },
    Geometry(String),
}

impl fmt::Display for FilterMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterMismatch::Collection { expected, actual } => write!(
                f,
                "collection {:?} not in {:?}",
                actual.as_deref().unwrap_or("<none>"),
                expected
            ),
            FilterMismatch::Spatial => write!(f, "geometry does not intersect search area"),
            FilterMismatch::Temporal => write!(f, "datetime outside search range"),
            FilterMismatch::Attribute { property } => {
                write!(f, "property '{}' does not match", property)
            }
            FilterMismatch::Geometry(msg) => write!(f, "unreadable geometry: {}", msg),
        }
    }
}

/// A search over one or more collections.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemSearch {
    pub collections: Vec<String>,
    pub intersects: Option<Footprint>,
    pub datetime: Option<DateRange>,
    pub filters: Vec<AttributeFilter>,
    /// Page size requested from the server.
    pub limit: Option<u32>,
}

impl ItemSearch {
    pub fn new<I, S>(collections: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            collections: collections.into_iter().map(Into::into).collect(),
            intersects: None,
            datetime: None,
            filters: Vec::new(),
            limit: None,
        }
    }

    pub fn intersects(mut self, footprint: Footprint) -> Self {
        self.intersects = Some(footprint);
        self
    }

    pub fn datetime(mut self, range: DateRange) -> Self {
        self.datetime = Some(range);
        self
    }

    pub fn filter(mut self, filter: AttributeFilter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// STAC search geometries are always WGS84 lon/lat.
    fn intersects_wgs84(&self) -> Result<Option<Footprint>, ProtocolError> {
        match &self.intersects {
            None => Ok(None),
            Some(fp) => Ok(Some(fp.to_crs(CrsCode::Epsg4326)?)),
        }
    }

    /// Build the wire body for `POST /search`.
    pub fn to_params(&self) -> Result<SearchParams, ProtocolError> {
        let query = if self.filters.is_empty() {
            None
        } else {
            let mut query = BTreeMap::new();
            for f in &self.filters {
                if query
                    .insert(f.property.clone(), QueryOp::eq(f.value.clone()))
                    .is_some()
                {
                    return Err(ProtocolError::InvalidParameter {
                        param: "query".to_string(),
                        message: format!("property '{}' filtered twice", f.property),
                    });
                }
            }
            Some(query)
        };

        Ok(SearchParams {
            collections: self.collections.clone(),
            intersects: self.intersects_wgs84()?.map(|fp| fp.to_geojson()),
            datetime: self.datetime.map(|d| d.to_stac_string()),
            query,
            limit: self.limit,
            ..SearchParams::default()
        })
    }

    /// The predicates with the search area projected once, for checking a
    /// stream of items.
    pub fn predicate(&self) -> Result<ItemPredicate, ProtocolError> {
        Ok(ItemPredicate {
            collections: self.collections.clone(),
            area: self.intersects_wgs84()?,
            datetime: self.datetime,
            filters: self.filters.clone(),
        })
    }

    /// Check every predicate against an item, reporting the first failure.
    pub fn check(&self, item: &StacItem) -> Result<(), FilterMismatch> {
        self.predicate()
            .map_err(|e| FilterMismatch::Geometry(e.to_string()))?
            .check(item)
    }

    pub fn matches(&self, item: &StacItem) -> bool {
        self.check(item).is_ok()
    }

    /// One-line description of the predicates in effect, for error reports.
    pub fn describe(&self) -> String {
        let mut parts = vec![format!("collections={}", self.collections.join(","))];
        if let Some(bbox) = self.intersects.as_ref().and_then(|fp| fp.bbox()) {
            parts.push(format!(
                "intersects_bbox=[{:.4},{:.4},{:.4},{:.4}]",
                bbox.min_x, bbox.min_y, bbox.max_x, bbox.max_y
            ));
        }
        if let Some(range) = &self.datetime {
            parts.push(format!("datetime={}", range));
        }
        for f in &self.filters {
            parts.push(format!("{}={}", f.property, f.value));
        }
        parts.join(" ")
    }
}

/// A prepared [`ItemSearch`]: same predicates, search area already in
/// lon/lat.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemPredicate {
    collections: Vec<String>,
    area: Option<Footprint>,
    datetime: Option<DateRange>,
    filters: Vec<AttributeFilter>,
}

impl ItemPredicate {
    pub fn area(&self) -> Option<&Footprint> {
        self.area.as_ref()
    }

    pub fn check(&self, item: &StacItem) -> Result<(), FilterMismatch> {
        if !self.collections.is_empty() {
            if let Some(actual) = &item.collection {
                if !self.collections.iter().any(|c| c == actual) {
                    return Err(FilterMismatch::Collection {
                        expected: self.collections.clone(),
                        actual: Some(actual.clone()),
                    });
                }
            }
        }

        if let Some(filter) = self.filters.iter().find(|f| !f.matches(item)) {
            return Err(FilterMismatch::Attribute {
                property: filter.property.clone(),
            });
        }

        if let Some(range) = &self.datetime {
            match item.temporal_extent() {
                Some((start, end)) if range.overlaps(&start, &end) => {}
                _ => return Err(FilterMismatch::Temporal),
            }
        }

        if let Some(area) = &self.area {
            let hit = match item.geo_geometry() {
                Ok(Some(geom)) => geom.intersects(&area.geometry),
                Ok(None) => match item.bounding_box() {
                    Some(bbox) => {
                        let rect: geo::Rect<f64> = bbox.into();
                        area.geometry.intersects(&rect)
                    }
                    None => false,
                },
                Err(e) => return Err(FilterMismatch::Geometry(e.to_string())),
            };
            if !hit {
                return Err(FilterMismatch::Spatial);
            }
        }

        Ok(())
    }

    pub fn matches(&self, item: &StacItem) -> bool {
        self.check(item).is_ok()
    }
}
