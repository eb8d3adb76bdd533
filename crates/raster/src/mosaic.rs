//! Merging aligned tiles into one grid.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{RasterError, RasterResult};
use crate::grid::{GeoTransform, RasterGrid};

/// Which source wins where valid cells overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MosaicPolicy {
    /// Keep the value from the earliest grid in input order.
    #[default]
    FirstWins,
    /// Later grids overwrite earlier ones.
    LastWins,
}

/// Merge grids sharing CRS, pixel size, layer count and pixel alignment.
///
/// The output covers the union of the inputs; cells no input covers are
/// nodata (the first grid's sentinel). Nodata source cells never overwrite.
/// With non-overlapping inputs the result does not depend on input order.
pub fn mosaic(grids: &[RasterGrid], policy: MosaicPolicy) -> RasterResult<RasterGrid> {
    let Some(first) = grids.first() else {
        return Err(RasterError::Empty("no grids to mosaic".into()));
    };
    for (i, grid) in grids.iter().enumerate().skip(1) {
        check_compatible(first, grid, i)?;
    }
    if grids.len() == 1 {
        return Ok(first.clone());
    }

    let (dx, dy) = first.resolution();
    let extent = grids
        .iter()
        .map(RasterGrid::bbox)
        .reduce(|a, b| a.union(&b))
        .unwrap_or_else(|| first.bbox());

    let width = (extent.width() / dx).round() as usize;
    let height = (extent.height() / dy).round() as usize;
    let transform = GeoTransform::new(extent.min_x, extent.max_y, dx, -dy);

    let mut out = RasterGrid::filled(width, height, first.layers, transform, first.crs, first.nodata)?;
    out.labels = first.labels.clone();

    for grid in grids {
        paste(&mut out, grid, policy);
    }

    info!(
        tiles = grids.len(),
        width,
        height,
        layers = out.layers,
        policy = ?policy,
        "Mosaicked grids"
    );
    Ok(out)
}

fn check_compatible(first: &RasterGrid, other: &RasterGrid, index: usize) -> RasterResult<()> {
    if first.crs != other.crs {
        return Err(RasterError::Incompatible(format!(
            "grid {} is in {}, first grid in {}",
            index, other.crs, first.crs
        )));
    }
    if first.layers != other.layers {
        return Err(RasterError::Incompatible(format!(
            "grid {} has {} layers, first grid {}",
            index, other.layers, first.layers
        )));
    }
    if !first.transform.same_resolution(&other.transform) {
        return Err(RasterError::Incompatible(format!(
            "grid {} has pixel size {:?}, first grid {:?}",
            index,
            other.resolution(),
            first.resolution()
        )));
    }
    if !first.transform.is_aligned_with(&other.transform) {
        return Err(RasterError::Incompatible(format!(
            "grid {} is not aligned to the first grid's pixel grid",
            index
        )));
    }
    Ok(())
}

fn paste(out: &mut RasterGrid, src: &RasterGrid, policy: MosaicPolicy) {
    let col0 = out.transform.col_of(src.transform.origin_x).round() as usize;
    let row0 = out.transform.row_of(src.transform.origin_y).round() as usize;
    debug!(col0, row0, width = src.width, height = src.height, "Pasting tile");

    for layer in 0..src.layers {
        for row in 0..src.height {
            for col in 0..src.width {
                let value = src.data[src.index(layer, row, col)];
                if src.is_nodata(value) {
                    continue;
                }
                let (r, c) = (row0 + row, col0 + col);
                if r >= out.height || c >= out.width {
                    continue;
                }
                let idx = out.index(layer, r, c);
                let write = match policy {
                    MosaicPolicy::FirstWins => out.is_nodata(out.data[idx]),
                    MosaicPolicy::LastWins => true,
                };
                if write {
                    out.data[idx] = value;
                }
            }
        }
    }
}
