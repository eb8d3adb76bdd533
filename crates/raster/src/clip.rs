//! Cropping to a footprint's bounding box and masking to its polygon.

use geo::{LineString, Polygon};
use rayon::prelude::*;
use tracing::debug;

use basin_common::Footprint;

use crate::error::{RasterError, RasterResult};
use crate::grid::{GeoTransform, RasterGrid};

fn ensure_same_crs(grid: &RasterGrid, footprint: &Footprint) -> RasterResult<()> {
    if grid.crs != footprint.crs {
        return Err(RasterError::CrsMismatch {
            grid: grid.crs.to_string(),
            geometry: footprint.crs.to_string(),
        });
    }
    Ok(())
}

/// Window of cells intersecting the footprint's bounding box.
pub fn crop(grid: &RasterGrid, footprint: &Footprint) -> RasterResult<RasterGrid> {
    ensure_same_crs(grid, footprint)?;
    let grid_bbox = grid.bbox();
    let Some(bbox) = footprint.bbox() else {
        return Err(RasterError::Empty("footprint has no geometry".into()));
    };

    let no_overlap = || RasterError::NoOverlap {
        grid: grid_bbox.to_array(),
        geometry: bbox.to_array(),
    };
    let window = grid_bbox.intersection(&bbox).ok_or_else(no_overlap)?;

    let t = &grid.transform;
    let col0 = t.col_of(window.min_x).floor().max(0.0) as usize;
    let col1 = (t.col_of(window.max_x).ceil() as usize).min(grid.width);
    let row0 = t.row_of(window.max_y).floor().max(0.0) as usize;
    let row1 = (t.row_of(window.min_y).ceil() as usize).min(grid.height);
    if col1 <= col0 || row1 <= row0 {
        return Err(no_overlap());
    }

    let (width, height) = (col1 - col0, row1 - row0);
    let mut data = Vec::with_capacity(width * height * grid.layers);
    for layer in 0..grid.layers {
        for row in row0..row1 {
            let start = grid.index(layer, row, col0);
            data.extend_from_slice(&grid.data[start..start + width]);
        }
    }

    let transform = GeoTransform::new(
        t.origin_x + col0 as f64 * t.pixel_width,
        t.origin_y + row0 as f64 * t.pixel_height,
        t.pixel_width,
        t.pixel_height,
    );
    debug!(col0, row0, width, height, "Cropped grid");

    let mut out = RasterGrid::new(width, height, grid.layers, data, transform, grid.crs, grid.nodata)?;
    out.labels = grid.labels.clone();
    Ok(out)
}

/// Set cells whose centre lies outside the footprint to nodata.
///
/// The extent is unchanged and masking twice gives the same grid.
pub fn mask(grid: &RasterGrid, footprint: &Footprint) -> RasterResult<RasterGrid> {
    ensure_same_crs(grid, footprint)?;

    let rings: Vec<&LineString<f64>> = footprint
        .geometry
        .0
        .iter()
        .flat_map(|p: &Polygon<f64>| std::iter::once(p.exterior()).chain(p.interiors()))
        .collect();

    let width = grid.width;
    let inside: Vec<bool> = (0..grid.height)
        .into_par_iter()
        .flat_map_iter(|row| {
            let (_, y) = grid.transform.cell_center(0, row);
            let crossings = scanline_crossings(&rings, y);
            (0..width).map(move |col| {
                let (x, _) = grid.transform.cell_center(col, row);
                is_inside(&crossings, x)
            })
        })
        .collect();

    let mut out = grid.clone();
    let nodata = grid.nodata;
    let cells = grid.layer_len();
    out.data.par_chunks_mut(cells).for_each(|layer| {
        for (value, keep) in layer.iter_mut().zip(&inside) {
            if !keep {
                *value = nodata;
            }
        }
    });

    debug!(
        kept = inside.iter().filter(|k| **k).count(),
        cells,
        "Masked grid"
    );
    Ok(out)
}

/// Crop to the footprint's bbox, then mask to its polygon.
pub fn clip(grid: &RasterGrid, footprint: &Footprint) -> RasterResult<RasterGrid> {
    mask(&crop(grid, footprint)?, footprint)
}

/// Sorted x positions where ring edges cross the horizontal line at `y`.
fn scanline_crossings(rings: &[&LineString<f64>], y: f64) -> Vec<f64> {
    let mut xs = Vec::new();
    for ring in rings {
        for line in ring.lines() {
            let (a, b) = (line.start, line.end);
            if (a.y <= y) != (b.y <= y) {
                xs.push(a.x + (y - a.y) * (b.x - a.x) / (b.y - a.y));
            }
        }
    }
    xs.sort_by(|a, b| a.total_cmp(b));
    xs
}

/// Even-odd rule against the sorted crossings.
fn is_inside(crossings: &[f64], x: f64) -> bool {
    crossings.partition_point(|c| *c <= x) % 2 == 1
}
