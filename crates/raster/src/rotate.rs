//! Longitude normalisation from 0..360 to -180..180.

use tracing::debug;

use crate::error::{RasterError, RasterResult};
use crate::grid::RasterGrid;

/// Tolerance in cells when deciding whether a grid is global.
const GLOBAL_TOLERANCE_CELLS: f64 = 1.0;

/// Express a geographic grid in -180..180.
///
/// Global grids in 0..360 are rolled so the antimeridian becomes the west
/// edge; grids entirely east of 180 are shifted by -360. Grids straddling 180
/// without covering the globe cannot be represented in one block and are
/// rejected. Projected grids and grids already within range are returned
/// unchanged.
pub fn normalize_longitudes(grid: RasterGrid) -> RasterResult<RasterGrid> {
    if !grid.crs.is_geographic() {
        return Ok(grid);
    }

    let bbox = grid.bbox();
    let dx = grid.transform.pixel_width;
    let eps = dx * 1e-6;
    if bbox.max_x <= 180.0 + eps {
        return Ok(grid);
    }

    if bbox.min_x >= 180.0 - eps {
        debug!(min_x = bbox.min_x, "Shifting grid east of 180 by -360");
        let mut grid = grid;
        grid.transform.origin_x -= 360.0;
        return Ok(grid);
    }

    let span = bbox.max_x - bbox.min_x;
    if (span - 360.0).abs() > dx * GLOBAL_TOLERANCE_CELLS {
        return Err(RasterError::Rotation(format!(
            "grid spans {:.4}..{:.4} across 180 without covering the globe",
            bbox.min_x, bbox.max_x
        )));
    }

    let split = grid.transform.col_of(180.0).round().clamp(0.0, grid.width as f64) as usize;
    debug!(split, width = grid.width, "Rolling global grid to -180..180");
    Ok(roll_columns(grid, split))
}

/// Move columns `split..` to the west edge.
fn roll_columns(mut grid: RasterGrid, split: usize) -> RasterGrid {
    if split == 0 || split >= grid.width {
        return grid;
    }
    let width = grid.width;
    for row in grid.data.chunks_exact_mut(width) {
        row.rotate_left(split);
    }
    grid.transform.origin_x += split as f64 * grid.transform.pixel_width - 360.0;
    grid
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::GeoTransform;
    use basin_common::CrsCode;

    fn grid(origin_x: f64, width: usize, dx: f64) -> RasterGrid {
        let data = (0..width * 2).map(|v| v as f32).collect();
        RasterGrid::new(
            width,
            2,
            1,
            data,
            GeoTransform::new(origin_x, 1.0, dx, -1.0),
            CrsCode::Epsg4326,
            -9999.0,
        )
        .unwrap()
    }

    #[test]
    fn test_in_range_unchanged() {
        let g = grid(-10.0, 4, 1.0);
        assert_eq!(normalize_longitudes(g.clone()).unwrap(), g);
    }

    #[test]
    fn test_global_grid_is_rolled() {
        // 4 cells of 90 degrees: 0..90, 90..180, 180..270, 270..360
        let g = normalize_longitudes(grid(0.0, 4, 90.0)).unwrap();
        assert_eq!(g.transform.origin_x, -180.0);
        assert_eq!(g.layer(0)[..4], [2.0, 3.0, 0.0, 1.0]);
        assert_eq!(g.layer(0)[4..], [6.0, 7.0, 4.0, 5.0]);
        assert_eq!(g.bbox().max_x, 180.0);
    }

    #[test]
    fn test_east_of_antimeridian_is_shifted() {
        let g = normalize_longitudes(grid(200.0, 4, 1.0)).unwrap();
        assert_eq!(g.transform.origin_x, -160.0);
        assert_eq!(g.layer(0)[0], 0.0);
    }

    #[test]
    fn test_partial_crossing_rejected() {
        let err = normalize_longitudes(grid(170.0, 20, 1.0)).unwrap_err();
        assert!(matches!(err, RasterError::Rotation(_)));
    }

    #[test]
    fn test_projected_grid_untouched() {
        let mut g = grid(1_000_000.0, 4, 1000.0);
        g.crs = CrsCode::Epsg3857;
        assert_eq!(normalize_longitudes(g.clone()).unwrap(), g);
    }
}
