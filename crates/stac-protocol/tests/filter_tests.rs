//! Tests for client-side evaluation of item search predicates.

use basin_common::{CrsCode, DateRange, Footprint};
use geo::polygon;
use serde_json::json;
use stac_protocol::{AttributeFilter, FilterMismatch, ItemSearch, StacItem};

// ============================================================================
// Helpers
// ============================================================================

fn item(value: serde_json::Value) -> StacItem {
    serde_json::from_value(value).unwrap()
}

/// An L-shaped basin whose bbox covers (1.5, 1.5) although the polygon does not.
fn l_shaped_basin() -> Footprint {
    Footprint::from_polygon(
        polygon![
            (x: 0.0, y: 0.0),
            (x: 2.0, y: 0.0),
            (x: 2.0, y: 1.0),
            (x: 1.0, y: 1.0),
            (x: 1.0, y: 2.0),
            (x: 0.0, y: 2.0),
        ],
        CrsCode::Epsg4326,
    )
}

fn tile(id: &str, min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> StacItem {
    item(json!({
        "id": id,
        "collection": "nasadem",
        "geometry": {
            "type": "Polygon",
            "coordinates": [[[min_x, min_y], [max_x, min_y], [max_x, max_y], [min_x, max_y], [min_x, min_y]]]
        },
        "bbox": [min_x, min_y, max_x, max_y],
        "properties": {"datetime": "2000-02-20T00:00:00Z"},
        "assets": {}
    }))
}

// ============================================================================
// Spatial predicate
// ============================================================================

#[test]
fn test_polygon_semantics_not_bbox_overlap() {
    let search = ItemSearch::new(["nasadem"]).intersects(l_shaped_basin());

    // Inside the basin's bbox notch, outside the polygon itself.
    let notch = tile("notch", 1.25, 1.25, 1.75, 1.75);
    assert_eq!(search.check(&notch), Err(FilterMismatch::Spatial));

    let overlapping = tile("hit", 0.5, 0.5, 3.0, 0.75);
    assert!(search.matches(&overlapping));
}

#[test]
fn test_predicate_projects_search_area_once() {
    let merc = l_shaped_basin().to_crs(CrsCode::Epsg3857).unwrap();
    let search = ItemSearch::new(["nasadem"]).intersects(merc);
    let predicate = search.predicate().unwrap();

    let area = predicate.area().unwrap();
    assert_eq!(area.crs, CrsCode::Epsg4326);
    let bbox = area.bbox().unwrap();
    assert!((bbox.max_x - 2.0).abs() < 1e-9);
    assert!((bbox.max_y - 2.0).abs() < 1e-9);

    for t in [tile("hit", 0.5, 0.5, 0.6, 0.6), tile("notch", 1.25, 1.25, 1.75, 1.75)] {
        assert_eq!(predicate.check(&t), search.check(&t));
    }
    assert!(predicate.matches(&tile("hit", 0.5, 0.5, 0.6, 0.6)));
}

#[test]
fn test_bbox_used_when_geometry_missing() {
    let search = ItemSearch::new(["nasadem"]).intersects(l_shaped_basin());
    let no_geom = item(json!({
        "id": "bbox-only",
        "geometry": null,
        "bbox": [0.1, 0.1, 0.2, 0.2],
        "properties": {},
        "assets": {}
    }));
    assert!(search.matches(&no_geom));

    let nothing = item(json!({"id": "bare", "geometry": null, "properties": {}}));
    assert_eq!(search.check(&nothing), Err(FilterMismatch::Spatial));
}

#[test]
fn test_mercator_search_area_is_converted() {
    let merc = l_shaped_basin().to_crs(CrsCode::Epsg3857).unwrap();
    let search = ItemSearch::new(["nasadem"]).intersects(merc);
    assert!(search.matches(&tile("hit", 0.5, 0.5, 0.6, 0.6)));

    let params = search.to_params().unwrap();
    let area = Footprint::from_geojson(params.intersects.as_ref().unwrap(), CrsCode::Epsg4326)
        .unwrap();
    let bbox = area.bbox().unwrap();
    assert!((bbox.max_x - 2.0).abs() < 1e-9);
}

// ============================================================================
// Temporal predicate
// ============================================================================

#[test]
fn test_datetime_range_is_inclusive() {
    let search = ItemSearch::new(["c"]).datetime(DateRange::parse("2030-01-01/2030-01-31").unwrap());

    let at = |dt: &str| item(json!({"id": dt, "geometry": null, "properties": {"datetime": dt}}));
    assert!(search.matches(&at("2030-01-01T00:00:00Z")));
    assert!(search.matches(&at("2030-01-31T23:59:59Z")));
    assert_eq!(search.check(&at("2030-02-01T00:00:00Z")), Err(FilterMismatch::Temporal));
    assert_eq!(search.check(&at("2029-12-31T23:59:59Z")), Err(FilterMismatch::Temporal));
}

#[test]
fn test_item_span_overlap() {
    let search = ItemSearch::new(["c"]).datetime(DateRange::parse("2030-06-01/2030-06-30").unwrap());
    let yearly = item(json!({
        "id": "2030",
        "geometry": null,
        "properties": {
            "datetime": null,
            "start_datetime": "2030-01-01T00:00:00Z",
            "end_datetime": "2030-12-31T00:00:00Z"
        }
    }));
    assert!(search.matches(&yearly));

    let undated = item(json!({"id": "x", "geometry": null, "properties": {}}));
    assert_eq!(search.check(&undated), Err(FilterMismatch::Temporal));
}

// ============================================================================
// Attribute predicate
// ============================================================================

#[test]
fn test_attribute_filters_are_conjunctive_and_case_sensitive() {
    let search = ItemSearch::new(["cil-gdpcmip6"])
        .filter(AttributeFilter::eq("cmip6:model", "ACCESS-CM2"))
        .filter(AttributeFilter::eq("cmip6:scenario", "ssp585"));

    let with = |model: &str, scenario: &str| {
        item(json!({
            "id": format!("{model}.{scenario}"),
            "collection": "cil-gdpcmip6",
            "geometry": null,
            "properties": {"cmip6:model": model, "cmip6:scenario": scenario}
        }))
    };

    assert!(search.matches(&with("ACCESS-CM2", "ssp585")));
    assert!(!search.matches(&with("access-cm2", "ssp585")));
    assert!(!search.matches(&with("ACCESS-CM2", "ssp245")));
    assert_eq!(
        search.check(&with("ACCESS-CM2", "SSP585")),
        Err(FilterMismatch::Attribute {
            property: "cmip6:scenario".to_string()
        })
    );
}

#[test]
fn test_numeric_query_matches_float_property() {
    let search = ItemSearch::new(["landsat-c2-l2"]).filter(AttributeFilter::parse("gsd=30").unwrap());
    let with_gsd = |gsd: serde_json::Value| {
        item(json!({
            "id": "scene",
            "collection": "landsat-c2-l2",
            "geometry": null,
            "properties": {"gsd": gsd}
        }))
    };

    assert!(search.matches(&with_gsd(json!(30.0))));
    assert!(search.matches(&with_gsd(json!(30))));
    assert_eq!(
        search.check(&with_gsd(json!(15.0))),
        Err(FilterMismatch::Attribute {
            property: "gsd".to_string()
        })
    );
    assert!(!search.matches(&with_gsd(json!("30"))));
}

#[test]
fn test_foreign_collection_rejected() {
    let search = ItemSearch::new(["nasadem"]);
    let mut other = tile("t", 0.0, 0.0, 1.0, 1.0);
    other.collection = Some("cop-dem-glo-30".to_string());
    assert!(matches!(search.check(&other), Err(FilterMismatch::Collection { .. })));
}
