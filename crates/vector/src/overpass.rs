//! River networks from the Overpass API.
//!
//! Rivers are auxiliary context for maps. The result is best effort: ways are
//! returned as individual line strings, not a connected network.

use std::collections::HashMap;
use std::time::Duration;

use geo::{coord, BoundingRect, LineString};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use basin_common::BoundingBox;

use crate::error::{VectorError, VectorResult};

pub const DEFAULT_OVERPASS_URL: &str = "https://overpass-api.de/api/interpreter";

/// Endpoint and timeouts for [`OverpassClient`].
#[derive(Debug, Clone)]
pub struct OverpassOptions {
    pub endpoint: String,
    /// Client side request timeout.
    pub timeout: Duration,
    /// `[timeout:N]` sent in the query; the server aborts after this.
    pub server_timeout_secs: u32,
}

impl Default for OverpassOptions {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_OVERPASS_URL.to_string(),
            timeout: Duration::from_secs(60),
            server_timeout_secs: 50,
        }
    }
}

/// OSM tag every fetched way must carry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagFilter {
    pub key: String,
    pub value: String,
}

impl Default for TagFilter {
    fn default() -> Self {
        Self {
            key: "waterway".to_string(),
            value: "river".to_string(),
        }
    }
}

/// Constraint on the `name` tag.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "match", content = "value")]
pub enum NameFilter {
    /// Any way, named or not.
    #[default]
    Any,
    /// `name` equal to the value.
    Exact(String),
    /// `name` containing the value, ignoring case.
    Contains(String),
}

impl NameFilter {
    pub fn matches(&self, name: Option<&str>) -> bool {
        match self {
            NameFilter::Any => true,
            NameFilter::Exact(want) => name == Some(want.as_str()),
            NameFilter::Contains(want) => name
                .map(|n| n.to_lowercase().contains(&want.to_lowercase()))
                .unwrap_or(false),
        }
    }

    fn to_ql(&self) -> String {
        match self {
            NameFilter::Any => String::new(),
            NameFilter::Exact(name) => format!("[\"name\"=\"{}\"]", escape_ql(name)),
            NameFilter::Contains(name) => {
                format!("[\"name\"~\"{}\",i]", escape_ql(&escape_regex(name)))
            }
        }
    }
}

/// One OSM way.
#[derive(Debug, Clone, PartialEq)]
pub struct RiverFeature {
    pub osm_id: i64,
    pub name: Option<String>,
    /// Value of the filter tag, e.g. `river`.
    pub kind: String,
    pub geometry: LineString<f64>,
}

/// Ways returned for one query, in lon/lat.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RiverNetwork {
    pub features: Vec<RiverFeature>,
}

impl RiverNetwork {
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Distinct names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .features
            .iter()
            .filter_map(|f| f.name.as_deref())
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }

    pub fn bbox(&self) -> Option<BoundingBox> {
        self.features
            .iter()
            .filter_map(|f| f.geometry.bounding_rect())
            .map(BoundingBox::from)
            .reduce(|a, b| a.union(&b))
    }
}

#[derive(Debug, Deserialize)]
struct OverpassResponse {
    #[serde(default)]
    elements: Vec<OverpassElement>,
    /// Set when the server aborted the query (e.g. its own timeout).
    remark: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OverpassElement {
    #[serde(rename = "type")]
    element_type: String,
    id: i64,
    #[serde(default)]
    tags: HashMap<String, String>,
    #[serde(default)]
    geometry: Vec<LatLon>,
}

#[derive(Debug, Deserialize)]
struct LatLon {
    lat: f64,
    lon: f64,
}

pub struct OverpassClient {
    client: Client,
    options: OverpassOptions,
}

impl OverpassClient {
    pub fn new(options: OverpassOptions) -> VectorResult<Self> {
        let client = Client::builder()
            .timeout(options.timeout)
            .build()
            .map_err(|e| VectorError::Client(e.to_string()))?;
        Ok(Self { client, options })
    }

    pub fn options(&self) -> &OverpassOptions {
        &self.options
    }

    /// Overpass QL for ways tagged `tag` inside `bbox` (lon/lat), with geometry.
    pub fn build_query(&self, bbox: &BoundingBox, tag: &TagFilter, name: &NameFilter) -> String {
        format!(
            "[out:json][timeout:{}];way[\"{}\"=\"{}\"]{}({},{},{},{});out geom;",
            self.options.server_timeout_secs,
            escape_ql(&tag.key),
            escape_ql(&tag.value),
            name.to_ql(),
            bbox.min_y,
            bbox.min_x,
            bbox.max_y,
            bbox.max_x
        )
    }

    /// Fetch matching ways. Zero matches is an empty network.
    #[instrument(skip(self), fields(endpoint = %self.options.endpoint))]
    pub async fn fetch_rivers(
        &self,
        bbox: &BoundingBox,
        tag: &TagFilter,
        name: &NameFilter,
    ) -> VectorResult<RiverNetwork> {
        let query = self.build_query(bbox, tag, name);
        debug!(query = %query, "Overpass query");

        let url = &self.options.endpoint;
        let response = self
            .client
            .post(url)
            .form(&[("data", query.as_str())])
            .send()
            .await
            .map_err(|e| VectorError::from_reqwest(url, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| VectorError::from_reqwest(url, e))?;

        // 504 is Overpass' answer when the query exceeded its slot
        if status.as_u16() == 504 {
            return Err(VectorError::Timeout { url: url.clone() });
        }
        if !status.is_success() {
            return Err(VectorError::Overpass {
                status: status.as_u16(),
                body: body.chars().take(300).collect(),
            });
        }

        let parsed: OverpassResponse =
            serde_json::from_str(&body).map_err(|e| VectorError::Decode(e.to_string()))?;

        if let Some(remark) = &parsed.remark {
            if remark.to_lowercase().contains("timed out") {
                return Err(VectorError::Timeout { url: url.clone() });
            }
            warn!(remark = %remark, "Overpass remark");
        }

        let network = to_network(parsed.elements, tag, name);
        info!(
            ways = network.len(),
            names = ?network.names(),
            "Fetched river network"
        );
        Ok(network)
    }
}

fn to_network(elements: Vec<OverpassElement>, tag: &TagFilter, name: &NameFilter) -> RiverNetwork {
    let features = elements
        .into_iter()
        .filter(|e| e.element_type == "way" && e.geometry.len() >= 2)
        .filter(|e| e.tags.get(&tag.key) == Some(&tag.value))
        .filter(|e| name.matches(e.tags.get("name").map(String::as_str)))
        .map(|e| RiverFeature {
            osm_id: e.id,
            name: e.tags.get("name").cloned(),
            kind: tag.value.clone(),
            geometry: e
                .geometry
                .iter()
                .map(|p| coord! { x: p.lon, y: p.lat })
                .collect(),
        })
        .collect();
    RiverNetwork { features }
}

fn escape_ql(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

fn escape_regex(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if "\\.+*?()|[]{}^$".contains(c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> OverpassClient {
        OverpassClient::new(OverpassOptions {
            server_timeout_secs: 25,
            ..OverpassOptions::default()
        })
        .unwrap()
    }

    #[test]
    fn test_query_exact_name() {
        let bbox = BoundingBox::new(-6.7, 33.2, -3.8, 35.0);
        let name = NameFilter::Exact("Oued Sebou".into());
        let q = client().build_query(&bbox, &TagFilter::default(), &name);
        assert_eq!(
            q,
            "[out:json][timeout:25];way[\"waterway\"=\"river\"][\"name\"=\"Oued Sebou\"](33.2,-6.7,35,-3.8);out geom;"
        );
    }

    #[test]
    fn test_query_contains_is_case_insensitive_regex() {
        let bbox = BoundingBox::new(0.0, 0.0, 1.0, 1.0);
        let name = NameFilter::Contains("St. Marys".into());
        let q = client().build_query(&bbox, &TagFilter::default(), &name);
        assert!(q.contains("[\"name\"~\"St\\\\. Marys\",i]"));
    }

    #[test]
    fn test_name_filter_matches() {
        assert!(NameFilter::Any.matches(None));
        assert!(NameFilter::Exact("Sebou".into()).matches(Some("Sebou")));
        assert!(!NameFilter::Exact("Sebou".into()).matches(Some("sebou")));
        assert!(NameFilter::Contains("sebou".into()).matches(Some("Oued Sebou")));
        assert!(!NameFilter::Contains("sebou".into()).matches(None));
    }

    #[test]
    fn test_to_network_filters_elements() {
        let json = r#"{"elements": [
            {"type": "way", "id": 1, "tags": {"waterway": "river", "name": "Sebou"},
             "geometry": [{"lat": 34.0, "lon": -5.0}, {"lat": 34.1, "lon": -5.1}]},
            {"type": "way", "id": 2, "tags": {"waterway": "stream", "name": "Sebou"},
             "geometry": [{"lat": 34.0, "lon": -5.0}, {"lat": 34.1, "lon": -5.1}]},
            {"type": "way", "id": 3, "tags": {"waterway": "river", "name": "Sebou"},
             "geometry": [{"lat": 34.0, "lon": -5.0}]},
            {"type": "node", "id": 4}
        ]}"#;
        let parsed: OverpassResponse = serde_json::from_str(json).unwrap();
        let network = to_network(parsed.elements, &TagFilter::default(), &NameFilter::Any);
        assert_eq!(network.len(), 1);
        assert_eq!(network.features[0].osm_id, 1);
        assert_eq!(network.features[0].geometry.0[0], coord! { x: -5.0, y: 34.0 });
    }
}
