//! Integration tests for the presentation layer: PNG encoding, colormaps,
//! static maps and web maps.

use basin_common::crs::lonlat_to_mercator;
use basin_common::CrsCode;
use geo::{LineString, MultiPolygon, Polygon};
use raster::{GeoTransform, RasterGrid};
use renderer::colormap::TRANSPARENT;
use renderer::png::{encode_indexed, encode_rgba, Palette};
use renderer::{
    encode_png, render_raster_rgba, Colormap, Legend, MapContent, Overlay, RasterLayer, RenderError, StaticMap,
    StaticMapOptions, ValueRange, VectorLayer, WebMap, WebMapOptions,
};
use test_utils::fixtures::basins;
use test_utils::generators::{create_constant_grid, create_grid_with_nodata, create_palette_pixels, create_test_rgba_pixels};

const NODATA: f32 = -9999.0;

// ============================================================================
// Helpers
// ============================================================================

/// 8x8 grid at 0.125 degrees over (-6, 34)..(-5, 35), constant 5.0 with the
/// north-west cell set to nodata.
fn tile() -> RasterGrid {
    let base = create_constant_grid(8, 8, 5.0);
    let data = create_grid_with_nodata(8, 8, &base, NODATA, &[(0, 0)]);
    RasterGrid::new(
        8,
        8,
        1,
        data,
        GeoTransform::new(-6.0, 35.0, 0.125, -0.125),
        CrsCode::Epsg4326,
        NODATA,
    )
    .unwrap()
}

fn basin_polygon() -> Polygon<f64> {
    Polygon::new(LineString::from(basins::square(-5.8, 34.2, -5.2, 34.8)), vec![])
}

fn decode(png: &[u8]) -> image::RgbaImage {
    image::load_from_memory(png).unwrap().to_rgba8()
}

// ============================================================================
// PNG encoding
// ============================================================================

#[test]
fn test_indexed_png_decodes_with_transparency() {
    let pixels = create_palette_pixels(64, 48);
    let palette = Palette::extract(&pixels).unwrap();
    assert!(palette.colors.len() <= 11);
    assert!(palette.has_transparency());

    let png = encode_png(&pixels, 64, 48).unwrap();
    assert_eq!(&png[0..8], &[137, 80, 78, 71, 13, 10, 26, 10]);
    // Colour type byte of IHDR
    assert_eq!(png[25], 3);

    let decoded = decode(&png);
    assert_eq!(decoded.dimensions(), (64, 48));
    assert_eq!(decoded.as_raw(), &pixels);
}

#[test]
fn test_rgba_fallback_decodes() {
    let pixels = create_test_rgba_pixels(300, 20);
    let png = encode_png(&pixels, 300, 20).unwrap();
    assert_eq!(png[25], 6);
    assert_eq!(decode(&png).as_raw(), &pixels);
}

#[test]
fn test_indexed_is_smaller_for_colour_mapped_data() {
    let pixels = create_palette_pixels(256, 256);
    let indexed = encode_png(&pixels, 256, 256).unwrap();
    let rgba = encode_rgba(&pixels, 256, 256).unwrap();
    assert!(indexed.len() < rgba.len());
}

#[test]
fn test_indexed_rejects_bad_palette() {
    let palette = Palette {
        colors: vec![],
        indices: vec![0; 4],
    };
    assert!(matches!(encode_indexed(2, 2, &palette), Err(RenderError::Png(_))));
}

// ============================================================================
// Colormaps and style files
// ============================================================================

#[test]
fn test_style_file_colormap() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("styles.json");
    std::fs::write(
        &path,
        r##"{
            "version": "1.0",
            "styles": {
                "precip": {
                    "name": "Precipitation",
                    "type": "gradient",
                    "units": "mm/day",
                    "stops": [
                        {"value": 20, "color": "#08306B"},
                        {"value": 0, "color": "#FFFFFF00"},
                        {"value": 5, "color": "#6BAED6", "label": "moderate"}
                    ]
                }
            }
        }"##,
    )
    .unwrap();

    let cmap = Colormap::from_style_file(&path, "precip").unwrap();
    assert_eq!(cmap.name, "Precipitation");
    assert_eq!(cmap.units.as_deref(), Some("mm/day"));
    assert_eq!(cmap.natural_range(), Some(ValueRange::new(0.0, 20.0).unwrap()));
    assert_eq!(cmap.stops().len(), 3);
    assert_eq!(cmap.stops()[1].position, 0.25);

    let range = cmap.natural_range().unwrap();
    assert_eq!(cmap.map(0.0, &range), [255, 255, 255, 0]);
    assert_eq!(cmap.map(5.0, &range), [0x6B, 0xAE, 0xD6, 255]);
    assert_eq!(cmap.map(50.0, &range), [0x08, 0x30, 0x6B, 255]);

    assert!(matches!(
        Colormap::from_style_file(&path, "temperature"),
        Err(RenderError::Style { .. })
    ));
}

#[test]
fn test_style_with_bad_colour_is_rejected() {
    let config = renderer::StyleConfig::from_json(
        r##"{"version": "1.0", "styles": {"x": {"name": "X", "stops": [{"value": 0, "color": "red"}]}}}"##,
    )
    .unwrap();
    let err = Colormap::from_style(config.get_style("x").unwrap()).unwrap_err();
    assert!(err.to_string().contains("invalid colour 'red'"));
}

// ============================================================================
// Raster colour mapping
// ============================================================================

#[test]
fn test_render_raster_rgba_matches_grid() {
    let grid = tile();
    let cmap = Colormap::named("viridis").unwrap();
    let range = ValueRange::new(0.0, 10.0).unwrap();
    let img = render_raster_rgba(&grid, &cmap, &range).unwrap();

    assert_eq!(img.dimensions(), (8, 8));
    assert_eq!(img.get_pixel(0, 0).0, TRANSPARENT);
    assert_eq!(img.get_pixel(7, 7).0, [0x21, 0x91, 0x8C, 255]);
    let transparent = img.pixels().filter(|p| p.0[3] == 0).count();
    assert_eq!(transparent, 1);
}

// ============================================================================
// Static map
// ============================================================================

#[test]
fn test_static_map_layout() {
    let grid = tile();
    let cmap = Colormap::named("viridis").unwrap();
    let range = ValueRange::new(0.0, 10.0).unwrap();
    let river = Overlay::lines(
        "rivers",
        vec![LineString::from(vec![(-7.0, 34.25), (-4.0, 34.25)])],
        [255, 0, 0, 255],
        1.0,
    );
    let map = StaticMap::new(StaticMapOptions::default());
    let img = map
        .render(&MapContent {
            grid: &grid,
            colormap: &cmap,
            range: &range,
            overlays: &[river],
            title: Some("Sebou"),
        })
        .unwrap();

    assert_eq!(img.dimensions(), (900, 700));
    // The 1x1 degree extent fits a 540 px square at (200, 50)
    assert_eq!(img.get_pixel(0, 0).0, [255, 255, 255, 255]);
    assert_eq!(img.get_pixel(600, 200).0, [0x21, 0x91, 0x8C, 255]);
    // Nodata cell shows the background
    assert_eq!(img.get_pixel(210, 60).0, [255, 255, 255, 255]);
    // Frame
    assert_eq!(img.get_pixel(199, 300).0, [40, 40, 40, 255]);
    // River at latitude 34.25, clipped to the frame
    assert_eq!(img.get_pixel(300, 455).0, [255, 0, 0, 255]);
    assert_eq!(img.get_pixel(100, 455).0, [255, 255, 255, 255]);
    // Legend bar ends
    assert_eq!(img.get_pixel(200, 636).0, cmap.color_at(0.0));
    assert_eq!(img.get_pixel(523, 636).0, cmap.color_at(1.0));
}

#[test]
fn test_static_map_png_and_basin_outline() {
    let grid = tile();
    let cmap = Colormap::named("terrain").unwrap();
    let range = ValueRange::new(0.0, 10.0).unwrap();
    let outline = Overlay::outline("basin", MultiPolygon::new(vec![basin_polygon()]), [0, 0, 0, 255], 3.0);
    let map = StaticMap::new(StaticMapOptions {
        width: 400,
        height: 400,
        ..StaticMapOptions::default()
    });
    let png = map
        .render_png(&MapContent {
            grid: &grid,
            colormap: &cmap,
            range: &range,
            overlays: &[outline],
            title: None,
        })
        .unwrap();

    let img = decode(&png);
    assert_eq!(img.dimensions(), (400, 400));
    // area 300x240 -> 240 px square at (100, 50); west edge of the outline at x = 100 + 0.2 * 240
    assert_eq!(img.get_pixel(148, 150).0, [0, 0, 0, 255]);
}

#[test]
fn test_static_map_rejects_time_stack() {
    let grid = RasterGrid::filled(4, 4, 2, GeoTransform::new(0.0, 4.0, 1.0, -1.0), CrsCode::Epsg4326, NODATA)
        .unwrap();
    let cmap = Colormap::named("blues").unwrap();
    let range = ValueRange::new(0.0, 1.0).unwrap();
    let result = StaticMap::new(StaticMapOptions::default()).render(&MapContent {
        grid: &grid,
        colormap: &cmap,
        range: &range,
        overlays: &[],
        title: None,
    });
    assert!(matches!(result, Err(RenderError::InvalidInput(_))));
}

// ============================================================================
// Web map
// ============================================================================

#[test]
fn test_web_map_html() {
    let grid = tile();
    let cmap = Colormap::named("viridis").unwrap();
    let range = ValueRange::new(0.0, 10.0).unwrap();

    let basin = geojson::FeatureCollection {
        bbox: None,
        features: vec![geojson::Feature {
            bbox: None,
            geometry: Some(geojson::Geometry::new(geojson::Value::from(&basin_polygon()))),
            id: None,
            properties: None,
            foreign_members: None,
        }],
        foreign_members: None,
    };

    let mut web = WebMap::new(WebMapOptions {
        title: "Sebou <upper>".into(),
        ..WebMapOptions::default()
    });
    web.add_raster(
        RasterLayer::from_grid(
            "Elevation",
            "elevation_overlay.png",
            &grid,
            Legend::new("Elevation", &cmap, range),
        )
        .unwrap(),
    )
    .add_vector(VectorLayer::new("Basin", basin, "#000000", 2.0));
    assert_eq!(web.layer_count(), 2);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("map.html");
    web.write(&path).unwrap();
    let html = std::fs::read_to_string(&path).unwrap();

    assert!(html.contains("<title>Sebou &lt;upper&gt;</title>"));
    assert!(html.contains("L.imageOverlay(\"elevation_overlay.png\", [[34, -6], [35, -5]]"));
    assert!(html.contains("overlays[\"Elevation\"] = raster0;"));
    assert!(html.contains("overlays[\"Basin\"] = vector0;"));
    assert!(html.contains("\"type\":\"FeatureCollection\""));
    assert!(html.contains("L.control.layers("));
    assert!(html.contains("<span>5.00<\\/span>"));
    assert!(html.contains("legend.addTo(map);"));
}

#[test]
fn test_web_map_bounds_from_mercator_grid() {
    let (w, s) = lonlat_to_mercator(-6.0, 34.0);
    let (e, n) = lonlat_to_mercator(-5.0, 35.0);
    let grid = RasterGrid::filled(
        4,
        4,
        1,
        GeoTransform::new(w, n, (e - w) / 4.0, (s - n) / 4.0),
        CrsCode::Epsg3857,
        NODATA,
    )
    .unwrap();
    let cmap = Colormap::named("blues").unwrap();
    let layer = RasterLayer::from_grid(
        "m",
        "m.png",
        &grid,
        Legend::new("m", &cmap, ValueRange::new(0.0, 1.0).unwrap()),
    )
    .unwrap();

    assert!((layer.bounds.min_x + 6.0).abs() < 1e-6);
    assert!((layer.bounds.min_y - 34.0).abs() < 1e-6);
    assert!((layer.bounds.max_x + 5.0).abs() < 1e-6);
    assert!((layer.bounds.max_y - 35.0).abs() < 1e-6);
}
