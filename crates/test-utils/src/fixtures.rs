//! Common test fixtures for basin-explorer tests.
//!
//! This module provides pre-defined test data that represents common
//! scenarios in the basin workflow: catalog responses, basin outlines and
//! climate grid layouts. Everything is plain data (`serde_json::Value`,
//! coordinate tuples) so any crate in the workspace can use it.

/// Common bounding box definitions for testing, as (min_x, min_y, max_x, max_y).
pub mod bbox {
    /// Sebou basin, northern Morocco
    pub const SEBOU: (f64, f64, f64, f64) = (-6.7, 33.2, -3.8, 35.0);
}

/// Basin outlines as closed exterior rings of (lon, lat) pairs.
pub mod basins {
    /// Axis-aligned square basin.
    pub fn square(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Vec<(f64, f64)> {
        vec![
            (min_x, min_y),
            (max_x, min_y),
            (max_x, max_y),
            (min_x, max_y),
            (min_x, min_y),
        ]
    }

    /// L-shaped basin over [0, 2] x [0, 2] with the north-east quarter cut out.
    ///
    /// Its bbox covers the notch, so bbox-only tests and polygon tests disagree
    /// for anything inside `(1, 2) x (1, 2)`.
    pub fn l_shape() -> Vec<(f64, f64)> {
        vec![
            (0.0, 0.0),
            (2.0, 0.0),
            (2.0, 1.0),
            (1.0, 1.0),
            (1.0, 2.0),
            (0.0, 2.0),
            (0.0, 0.0),
        ]
    }

    /// Rough outline of the upper Sebou basin.
    pub fn sebou() -> Vec<(f64, f64)> {
        vec![
            (-6.2, 33.4),
            (-4.9, 33.2),
            (-3.9, 33.8),
            (-4.1, 34.6),
            (-5.2, 35.0),
            (-6.5, 34.5),
            (-6.2, 33.4),
        ]
    }
}

/// Grid layouts for testing.
pub mod grid {
    /// A 1 degree tile covering part of the Sebou basin
    pub const SEBOU_TILE: GridSpec = GridSpec {
        width: 12,
        height: 12,
        min_lon: -6.0,
        max_lon: -5.0,
        min_lat: 34.0,
        max_lat: 35.0,
    };

    /// Grid specification for testing.
    #[derive(Debug, Clone, Copy)]
    pub struct GridSpec {
        pub width: usize,
        pub height: usize,
        pub min_lon: f64,
        pub max_lon: f64,
        pub min_lat: f64,
        pub max_lat: f64,
    }

    impl GridSpec {
        /// Total number of grid points
        pub fn size(&self) -> usize {
            self.width * self.height
        }

        /// Cell size in (lon, lat) degrees
        pub fn resolution(&self) -> (f64, f64) {
            let lon_res = (self.max_lon - self.min_lon) / self.width as f64;
            let lat_res = (self.max_lat - self.min_lat) / self.height as f64;
            (lon_res, lat_res)
        }
    }
}

/// STAC API payloads.
pub mod stac {
    use serde_json::{json, Value};

    pub const CMIP6_COLLECTION: &str = "nex-gddp-cmip6";

    /// A STAC item whose geometry is the rectangle `bbox`.
    pub fn item(id: &str, collection: &str, bbox: (f64, f64, f64, f64), datetime: &str) -> Value {
        let (w, s, e, n) = bbox;
        json!({
            "type": "Feature",
            "stac_version": "1.0.0",
            "id": id,
            "collection": collection,
            "bbox": [w, s, e, n],
            "geometry": {
                "type": "Polygon",
                "coordinates": [[[w, s], [e, s], [e, n], [w, n], [w, s]]]
            },
            "properties": { "datetime": datetime },
            "assets": {},
            "links": []
        })
    }

    /// A CMIP6 item carrying model/scenario properties and one asset per variable.
    pub fn cmip6_item(
        id: &str,
        model: &str,
        scenario: &str,
        year: i32,
        bbox: (f64, f64, f64, f64),
        asset_base: &str,
    ) -> Value {
        let mut value = item(id, CMIP6_COLLECTION, bbox, &format!("{}-07-01T00:00:00Z", year));
        value["properties"] = json!({
            "datetime": Value::Null,
            "start_datetime": format!("{}-01-01T00:00:00Z", year),
            "end_datetime": format!("{}-12-31T23:59:59Z", year),
            "cmip6:model": model,
            "cmip6:scenario": scenario,
            "cmip6:year": year
        });
        for var in ["tas", "pr"] {
            value["assets"][var] = json!({
                "href": format!("{}/{}/{}_{}_{}_{}.tif", asset_base, id, var, model, scenario, year),
                "type": "image/tiff; application=geotiff",
                "roles": ["data"]
            });
        }
        value
    }

    /// A FeatureCollection page, with an optional `next` link.
    pub fn item_collection(features: Vec<Value>, next: Option<Value>) -> Value {
        let links = match next {
            Some(link) => vec![link],
            None => Vec::new(),
        };
        json!({
            "type": "FeatureCollection",
            "features": features,
            "links": links
        })
    }

    /// GET `next` link.
    pub fn next_get(href: &str) -> Value {
        json!({ "rel": "next", "href": href, "type": "application/geo+json" })
    }

    /// POST `next` link carrying a body to merge.
    pub fn next_post(href: &str, body: Value) -> Value {
        json!({
            "rel": "next",
            "href": href,
            "method": "POST",
            "body": body,
            "merge": true
        })
    }

    /// `GET /collections` response.
    pub fn collections(ids: &[&str], next: Option<&str>) -> Value {
        let collections: Vec<Value> = ids
            .iter()
            .map(|id| {
                json!({
                    "type": "Collection",
                    "id": id,
                    "title": id.to_uppercase(),
                    "description": format!("Test collection {}", id),
                    "license": "CC-BY-4.0",
                    "extent": {
                        "spatial": { "bbox": [[-180.0, -90.0, 180.0, 90.0]] },
                        "temporal": { "interval": [["1950-01-01T00:00:00Z", null]] }
                    },
                    "links": []
                })
            })
            .collect();
        let links: Vec<Value> = next
            .map(|href| vec![json!({ "rel": "next", "href": href })])
            .unwrap_or_default();
        json!({ "collections": collections, "links": links })
    }
}

/// Overpass API response builders.
pub mod overpass {
    use serde_json::{json, Value};

    /// A `way` element with inline geometry, as returned by `out geom`.
    pub fn river_way(id: i64, name: &str, coords: &[(f64, f64)]) -> Value {
        let geometry: Vec<Value> = coords
            .iter()
            .map(|(lon, lat)| json!({ "lat": lat, "lon": lon }))
            .collect();
        json!({
            "type": "way",
            "id": id,
            "tags": { "waterway": "river", "name": name },
            "geometry": geometry
        })
    }

    pub fn response(elements: Vec<Value>) -> Value {
        json!({
            "version": 0.6,
            "generator": "Overpass API",
            "elements": elements
        })
    }
}
