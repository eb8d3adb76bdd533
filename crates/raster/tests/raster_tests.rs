//! Integration tests for raster assembly: opening, mosaicking, clipping and
//! summarising synthetic basin rasters.

use std::time::Duration;

use geo::{LineString, Polygon};

use basin_common::{BoundingBox, CrsCode, DownloadConfig, DownloadManager, Footprint};
use catalog::{RasterSource, ResolvedAsset};
use raster::{
    clip, crop, mask, mosaic, normalize_longitudes, open_path, reduce_layers, write_geotiff,
    GeoTransform, GridStats, LayerReduce, MosaicPolicy, OpenOptions, RasterError, RasterGrid,
    RasterReader,
};
use stac_protocol::asset::AssetFormat;
use test_utils::fixtures::{basins, bbox, grid as grid_specs};
use test_utils::{assert_approx_eq, create_elevation_grid, create_grid_with_nodata, MockResponse, MockServer};

const NODATA: f32 = -32768.0;

/// One nasadem-like 1 degree tile of `cells x cells` with its top-left corner
/// at (`west`, `north`).
fn dem_tile(west: f64, north: f64, cells: usize, peak: f32) -> RasterGrid {
    let res = 1.0 / cells as f64;
    RasterGrid::new(
        cells,
        cells,
        1,
        create_elevation_grid(cells, cells, peak),
        GeoTransform::new(west, north, res, -res),
        CrsCode::Epsg4326,
        NODATA,
    )
    .unwrap()
}

fn footprint(ring: Vec<(f64, f64)>) -> Footprint {
    Footprint::from_polygon(Polygon::new(LineString::from(ring), vec![]), CrsCode::Epsg4326)
}

fn sebou_tiles() -> Vec<RasterGrid> {
    let (w, s, e, n) = bbox::SEBOU;
    let mut tiles = Vec::new();
    let mut peak = 500.0;
    for lat in (s.floor() as i32)..(n.ceil() as i32) {
        for lon in (w.floor() as i32)..(e.ceil() as i32) {
            tiles.push(dem_tile(lon as f64, (lat + 1) as f64, 12, peak));
            peak += 100.0;
        }
    }
    tiles
}

// ============================================================================
// Mosaic
// ============================================================================

#[test]
fn test_mosaic_covers_basin_bbox() {
    let tiles = sebou_tiles();
    let merged = mosaic(&tiles, MosaicPolicy::FirstWins).unwrap();

    let basin = footprint(basins::sebou());
    let basin_bbox = basin.bbox().unwrap();
    assert!(merged.bbox().covers(&basin_bbox, 1e-6));
    assert_eq!(merged.valid_count(), tiles.iter().map(RasterGrid::valid_count).sum::<usize>());

    let cropped = crop(&merged, &basin).unwrap();
    assert!(cropped.bbox().covers(&basin_bbox, 1e-6));
    assert!(cropped.width < merged.width || cropped.height < merged.height);
}

#[test]
fn test_mosaic_order_independent_without_overlap() {
    let tiles = sebou_tiles();
    let mut reversed = tiles.clone();
    reversed.reverse();
    let mut rotated = tiles.clone();
    rotated.rotate_left(3);

    for policy in [MosaicPolicy::FirstWins, MosaicPolicy::LastWins] {
        let a = mosaic(&tiles, policy).unwrap();
        let b = mosaic(&reversed, policy).unwrap();
        let c = mosaic(&rotated, policy).unwrap();
        assert_eq!(a.transform, b.transform);
        assert_eq!(a.data, b.data);
        assert_eq!(a.data, c.data);
    }
}

#[test]
fn test_mosaic_overlap_depends_on_policy() {
    let a = dem_tile(-6.0, 35.0, 4, 100.0);
    let b = RasterGrid::new(
        4,
        4,
        1,
        vec![7.0; 16],
        a.transform,
        CrsCode::Epsg4326,
        NODATA,
    )
    .unwrap();

    let first = mosaic(&[a.clone(), b.clone()], MosaicPolicy::FirstWins).unwrap();
    assert_eq!(first.data, a.data);
    let last = mosaic(&[a, b], MosaicPolicy::LastWins).unwrap();
    assert!(last.data.iter().all(|v| *v == 7.0));
}

#[test]
fn test_mosaic_different_resolution_is_configuration_error() {
    let coarse = dem_tile(-6.0, 35.0, 4, 100.0);
    let fine = dem_tile(-5.0, 35.0, 12, 100.0);
    let err = mosaic(&[coarse, fine], MosaicPolicy::FirstWins).unwrap_err();
    assert!(matches!(err, RasterError::Incompatible(_)));
    assert!(err.is_configuration());
}

// ============================================================================
// Crop and mask
// ============================================================================

#[test]
fn test_mask_is_idempotent() {
    let merged = mosaic(&sebou_tiles(), MosaicPolicy::FirstWins).unwrap();
    let basin = footprint(basins::sebou());

    let once = mask(&merged, &basin).unwrap();
    let twice = mask(&once, &basin).unwrap();
    assert_eq!(once, twice);
    assert!(once.valid_count() < merged.valid_count());
    assert!(once.valid_count() > 0);
}

#[test]
fn test_nodata_propagation_inside_and_outside() {
    let (w, h) = (10, 10);
    let base = vec![5.0; w * h];
    // (col, row): (4, 4) is inside the square, (0, 0) outside
    let data = create_grid_with_nodata(w, h, &base, NODATA, &[(4, 4), (0, 0)]);
    let grid = RasterGrid::new(
        w,
        h,
        1,
        data,
        GeoTransform::new(0.0, 10.0, 1.0, -1.0),
        CrsCode::Epsg4326,
        NODATA,
    )
    .unwrap();
    let square = footprint(basins::square(2.0, 2.0, 8.0, 8.0));

    let masked = mask(&grid, &square).unwrap();
    // Inside: nodata stays nodata, valid stays valid
    assert_eq!(masked.valid(0, 4, 4), None);
    assert_eq!(masked.valid(0, 5, 5), Some(5.0));
    // Outside: everything becomes nodata
    assert_eq!(masked.valid(0, 0, 0), None);
    assert_eq!(masked.valid(0, 9, 9), None);
    assert_eq!(masked.valid_count(), 36 - 1);
    assert_eq!(masked.data[0], NODATA);
}

#[test]
fn test_clip_l_shape_excludes_notch() {
    // 2x2 degrees at 0.5 degree cells
    let grid = RasterGrid::new(
        4,
        4,
        1,
        vec![1.0; 16],
        GeoTransform::new(0.0, 2.0, 0.5, -0.5),
        CrsCode::Epsg4326,
        NODATA,
    )
    .unwrap();
    let clipped = clip(&grid, &footprint(basins::l_shape())).unwrap();
    assert_eq!(clipped.bbox(), BoundingBox::new(0.0, 0.0, 2.0, 2.0));
    // The north-east quarter is outside the polygon
    assert_eq!(clipped.valid_count(), 12);
    assert_eq!(clipped.valid(0, 0, 3), None);
}

#[test]
fn test_crop_basin_outside_grid() {
    let tile = dem_tile(10.0, 50.0, 4, 100.0);
    let err = crop(&tile, &footprint(basins::sebou())).unwrap_err();
    assert!(matches!(err, RasterError::NoOverlap { .. }));
}

// ============================================================================
// Statistics
// ============================================================================

#[test]
fn test_mean_over_masked_grid_excludes_nodata() {
    let (w, h) = (4, 4);
    let mut base = vec![0.0; w * h];
    for (i, v) in base.iter_mut().enumerate() {
        *v = i as f32;
    }
    let grid = RasterGrid::new(
        w,
        h,
        1,
        base,
        GeoTransform::new(0.0, 4.0, 1.0, -1.0),
        CrsCode::Epsg4326,
        NODATA,
    )
    .unwrap();

    // Keeps the south-west 2x2 block: rows 2..4, cols 0..2 -> 8, 9, 12, 13
    let masked = mask(&grid, &footprint(basins::square(0.0, 0.0, 2.0, 2.0))).unwrap();
    let stats = GridStats::compute(&masked);
    assert_eq!(stats.count, 16);
    assert_eq!(stats.valid, 4);
    assert_approx_eq!(stats.mean.unwrap(), 10.5, 1e-9);
    assert_eq!(stats.min, Some(8.0));
    assert_eq!(stats.max, Some(13.0));
}

#[test]
fn test_time_stack_mean_then_stats() {
    let spec = grid_specs::SEBOU_TILE;
    let (res_x, res_y) = spec.resolution();
    let cells = spec.size();
    let mut data = vec![280.0; cells];
    data.extend(vec![290.0; cells]);
    data.extend(create_grid_with_nodata(spec.width, spec.height, &vec![300.0; cells], f32::NAN, &[(0, 0)]));

    let stack = RasterGrid::new(
        spec.width,
        spec.height,
        3,
        data,
        GeoTransform::new(spec.min_lon, spec.max_lat, res_x, -res_y),
        CrsCode::Epsg4326,
        f32::NAN,
    )
    .unwrap();

    let mean = reduce_layers(&stack, LayerReduce::Mean).unwrap();
    assert_eq!(mean.valid(0, 0, 0), Some(285.0));
    assert_eq!(mean.valid(0, 1, 1), Some(290.0));

    let celsius = raster::apply_linear(&mean, 1.0, -273.15).unwrap();
    let stats = GridStats::compute(&celsius);
    assert_eq!(stats.valid, cells);
    assert!(stats.mean.unwrap() > 16.0 && stats.mean.unwrap() < 17.0);
}

// ============================================================================
// Longitude normalisation
// ============================================================================

#[test]
fn test_global_0_360_grid_crops_around_greenwich() {
    // 10 degree cells, value = original column
    let (w, h) = (36, 15);
    let data: Vec<f32> = (0..h).flat_map(|_| (0..w).map(|c| c as f32)).collect();
    let global = RasterGrid::new(
        w,
        h,
        1,
        data,
        GeoTransform::new(0.0, 90.0, 10.0, -10.0),
        CrsCode::Epsg4326,
        f32::NAN,
    )
    .unwrap();

    let rolled = normalize_longitudes(global).unwrap();
    assert_eq!(rolled.bbox().min_x, -180.0);
    assert_eq!(rolled.bbox().max_x, 180.0);

    let (w0, s0, e0, n0) = bbox::SEBOU;
    let basin = Footprint::from_bbox(&BoundingBox::new(w0, s0, e0, n0), CrsCode::Epsg4326);
    let cropped = crop(&rolled, &basin).unwrap();
    // -10..0 is the last original column (350..360)
    assert_eq!(cropped.width, 1);
    assert!(cropped.data.iter().all(|v| *v == 35.0));
}

// ============================================================================
// Opening
// ============================================================================

fn downloads(dir: &std::path::Path) -> DownloadManager {
    DownloadManager::new(DownloadConfig {
        base_dir: dir.to_path_buf(),
        request_timeout: Duration::from_secs(5),
        ..DownloadConfig::default()
    })
    .unwrap()
}

fn resolved(source: RasterSource, format: AssetFormat) -> ResolvedAsset {
    ResolvedAsset {
        item_id: "NASADEM_HGT_n34w006".into(),
        collection: Some("nasadem".into()),
        asset_key: "elevation".into(),
        source,
        media_type: None,
        format,
    }
}

#[test]
fn test_open_path_sniffs_geotiff() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("n34w006.bin");
    let tile = dem_tile(-6.0, 35.0, 12, 800.0);
    write_geotiff(&tile, &path).unwrap();

    let back = open_path(&path, AssetFormat::Unknown, &OpenOptions::default()).unwrap();
    assert_eq!(back.transform, tile.transform);
    assert_eq!(back.data, tile.data);
    assert_eq!(back.nodata, NODATA);
}

#[tokio::test]
async fn test_reader_opens_streamed_and_downloaded_assets() {
    let dir = tempfile::tempdir().unwrap();
    let tile = dem_tile(-6.0, 35.0, 12, 800.0);
    let tif = dir.path().join("tile.tif");
    write_geotiff(&tile, &tif).unwrap();
    let bytes = std::fs::read(&tif).unwrap();

    let server = MockServer::builder()
        .response("GET", "/nasadem/n34w006.tif", MockResponse::bytes(bytes, "image/tiff"))
        .start()
        .await;
    let reader = RasterReader::new(downloads(dir.path()));

    let streamed = reader
        .open(
            &resolved(
                RasterSource::Url(server.url("/nasadem/n34w006.tif?sig=abc")),
                AssetFormat::GeoTiff,
            ),
            &OpenOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(streamed.data, tile.data);

    let local = reader
        .open(&resolved(RasterSource::Path(tif), AssetFormat::GeoTiff), &OpenOptions::default())
        .await
        .unwrap();
    assert_eq!(local, streamed);
}

#[tokio::test]
async fn test_reader_rejects_unknown_content() {
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::builder()
        .response("GET", "/page", MockResponse::bytes(b"<html></html>".to_vec(), "text/html"))
        .start()
        .await;
    let reader = RasterReader::new(downloads(dir.path()));

    let err = reader
        .open(
            &resolved(RasterSource::Url(server.url("/page")), AssetFormat::Unknown),
            &OpenOptions::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RasterError::UnsupportedFormat { .. }));
}
