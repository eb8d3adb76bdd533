//! Summary statistics, layer reduction and unit conversion.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{RasterError, RasterResult};
use crate::grid::RasterGrid;

/// Cell statistics over valid (non-nodata) cells.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridStats {
    /// Total cells, nodata included.
    pub count: usize,
    pub valid: usize,
    pub min: Option<f32>,
    pub max: Option<f32>,
    pub mean: Option<f64>,
}

impl GridStats {
    /// Statistics over every layer.
    pub fn compute(grid: &RasterGrid) -> Self {
        Self::from_values(&grid.data, |v| grid.is_nodata(v))
    }

    pub fn compute_layer(grid: &RasterGrid, layer: usize) -> Self {
        Self::from_values(grid.layer(layer), |v| grid.is_nodata(v))
    }

    fn from_values(values: &[f32], is_nodata: impl Fn(f32) -> bool) -> Self {
        let mut valid = 0usize;
        let mut sum = 0.0f64;
        let mut min = f32::INFINITY;
        let mut max = f32::NEG_INFINITY;
        for &v in values.iter().filter(|v| !is_nodata(**v)) {
            valid += 1;
            sum += v as f64;
            min = min.min(v);
            max = max.max(v);
        }
        let any = valid > 0;
        Self {
            count: values.len(),
            valid,
            min: any.then_some(min),
            max: any.then_some(max),
            mean: any.then(|| sum / valid as f64),
        }
    }
}

/// How to collapse the layers of a time stack into one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerReduce {
    #[default]
    Mean,
    Min,
    Max,
    /// A single layer by index.
    Index(usize),
}

/// Collapse all layers cell by cell, ignoring nodata. Cells with no valid
/// value in any layer stay nodata.
pub fn reduce_layers(grid: &RasterGrid, reduce: LayerReduce) -> RasterResult<RasterGrid> {
    if let LayerReduce::Index(i) = reduce {
        return grid.extract_layer(i);
    }
    if grid.layers == 1 {
        return Ok(grid.clone());
    }

    let cells = grid.layer_len();
    let data: Vec<f32> = (0..cells)
        .into_par_iter()
        .map(|cell| {
            let values = (0..grid.layers)
                .map(|l| grid.data[l * cells + cell])
                .filter(|v| !grid.is_nodata(*v));
            let reduced = match reduce {
                LayerReduce::Mean => {
                    let (sum, n) = values.fold((0.0f64, 0usize), |(s, n), v| (s + v as f64, n + 1));
                    (n > 0).then(|| (sum / n as f64) as f32)
                }
                LayerReduce::Min => values.reduce(f32::min),
                LayerReduce::Max => values.reduce(f32::max),
                LayerReduce::Index(_) => None,
            };
            reduced.unwrap_or(grid.nodata)
        })
        .collect();

    let mut out = RasterGrid::new(
        grid.width,
        grid.height,
        1,
        data,
        grid.transform,
        grid.crs,
        grid.nodata,
    )?;
    if let (Some(first), Some(last)) = (grid.labels.first(), grid.labels.last()) {
        let name = format!("{:?}", reduce).to_lowercase();
        out.labels = vec![format!("{} {}..{}", name, first, last)];
    }
    Ok(out)
}

/// `value * scale + offset` on valid cells; nodata cells are left untouched.
pub fn apply_linear(grid: &RasterGrid, scale: f32, offset: f32) -> RasterResult<RasterGrid> {
    if !scale.is_finite() || !offset.is_finite() {
        return Err(RasterError::InvalidGrid(format!(
            "non-finite conversion {} * v + {}",
            scale, offset
        )));
    }
    let mut out = grid.clone();
    let nodata = grid.nodata;
    out.data.par_iter_mut().for_each(|v| {
        if !(v.is_nan() || *v == nodata) {
            *v = *v * scale + offset;
        }
    });
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::GeoTransform;
    use basin_common::CrsCode;

    fn stack() -> RasterGrid {
        // 2 cells x 3 layers
        RasterGrid::new(
            2,
            1,
            3,
            vec![1.0, -9999.0, 3.0, -9999.0, 5.0, -9999.0],
            GeoTransform::new(0.0, 1.0, 1.0, -1.0),
            CrsCode::Epsg4326,
            -9999.0,
        )
        .unwrap()
        .with_labels(vec!["d1".into(), "d2".into(), "d3".into()])
    }

    #[test]
    fn test_stats_exclude_nodata() {
        let stats = GridStats::compute(&stack());
        assert_eq!(stats.count, 6);
        assert_eq!(stats.valid, 3);
        assert_eq!(stats.min, Some(1.0));
        assert_eq!(stats.max, Some(5.0));
        assert_eq!(stats.mean, Some(3.0));
    }

    #[test]
    fn test_stats_all_nodata() {
        let g = RasterGrid::filled(2, 2, 1, GeoTransform::new(0.0, 2.0, 1.0, -1.0), CrsCode::Epsg4326, f32::NAN)
            .unwrap();
        let stats = GridStats::compute(&g);
        assert_eq!(stats.valid, 0);
        assert_eq!(stats.mean, None);
    }

    #[test]
    fn test_reduce_layers() {
        let g = stack();
        let mean = reduce_layers(&g, LayerReduce::Mean).unwrap();
        assert_eq!(mean.layers, 1);
        assert_eq!(mean.data, vec![3.0, -9999.0]);
        assert_eq!(mean.labels, vec!["mean d1..d3".to_string()]);

        assert_eq!(reduce_layers(&g, LayerReduce::Min).unwrap().data, vec![1.0, -9999.0]);
        assert_eq!(reduce_layers(&g, LayerReduce::Max).unwrap().data, vec![5.0, -9999.0]);
        assert_eq!(reduce_layers(&g, LayerReduce::Index(1)).unwrap().data, vec![3.0, -9999.0]);
    }

    #[test]
    fn test_apply_linear_keeps_nodata() {
        let g = stack();
        let kelvin_to_celsius = apply_linear(&g, 1.0, -273.15).unwrap();
        assert_eq!(kelvin_to_celsius.data[1], -9999.0);
        assert!((kelvin_to_celsius.data[0] - (1.0 - 273.15)).abs() < 1e-4);
        assert!(apply_linear(&g, f32::NAN, 0.0).is_err());
    }
}
