//! In-memory raster grids.

use basin_common::{BoundingBox, CrsCode};

use crate::error::{RasterError, RasterResult};

/// Relative tolerance when comparing pixel sizes and grid offsets.
pub(crate) const ALIGN_TOLERANCE: f64 = 1e-6;

/// Affine georeferencing for a north-up grid.
///
/// `origin_x`/`origin_y` is the outer corner of the top-left cell.
/// `pixel_height` is negative.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub origin_y: f64,
    pub pixel_width: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    pub fn new(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
        }
    }

    /// Transform whose top-left corner is `bbox`'s north-west corner.
    pub fn from_bbox(bbox: &BoundingBox, width: usize, height: usize) -> Self {
        Self::new(
            bbox.min_x,
            bbox.max_y,
            bbox.width() / width as f64,
            -(bbox.height() / height as f64),
        )
    }

    /// Map coordinates of the centre of cell `(col, row)`.
    pub fn cell_center(&self, col: usize, row: usize) -> (f64, f64) {
        (
            self.origin_x + (col as f64 + 0.5) * self.pixel_width,
            self.origin_y + (row as f64 + 0.5) * self.pixel_height,
        )
    }

    /// Fractional column of map coordinate `x`.
    pub fn col_of(&self, x: f64) -> f64 {
        (x - self.origin_x) / self.pixel_width
    }

    /// Fractional row of map coordinate `y`.
    pub fn row_of(&self, y: f64) -> f64 {
        (y - self.origin_y) / self.pixel_height
    }

    pub fn bounds(&self, width: usize, height: usize) -> BoundingBox {
        let x2 = self.origin_x + width as f64 * self.pixel_width;
        let y2 = self.origin_y + height as f64 * self.pixel_height;
        BoundingBox::new(
            self.origin_x.min(x2),
            self.origin_y.min(y2),
            self.origin_x.max(x2),
            self.origin_y.max(y2),
        )
    }

    /// Same pixel size within tolerance.
    pub fn same_resolution(&self, other: &GeoTransform) -> bool {
        close(self.pixel_width, other.pixel_width) && close(self.pixel_height, other.pixel_height)
    }

    /// Whether `other`'s cell edges fall on this transform's cell edges.
    pub fn is_aligned_with(&self, other: &GeoTransform) -> bool {
        if !self.same_resolution(other) {
            return false;
        }
        let dc = self.col_of(other.origin_x);
        let dr = self.row_of(other.origin_y);
        (dc - dc.round()).abs() < ALIGN_TOLERANCE && (dr - dr.round()).abs() < ALIGN_TOLERANCE
    }
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() <= ALIGN_TOLERANCE * a.abs().max(b.abs())
}

/// A georeferenced stack of `layers` bands of `width x height` f32 cells.
///
/// Cells are stored layer-major, then row-major from the north edge.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterGrid {
    pub width: usize,
    pub height: usize,
    pub layers: usize,
    pub data: Vec<f32>,
    pub transform: GeoTransform,
    pub crs: CrsCode,
    /// Nodata sentinel. NaN cells are treated as nodata whatever its value.
    pub nodata: f32,
    /// Optional per-layer labels, e.g. timestamps of a time stack.
    pub labels: Vec<String>,
}

impl RasterGrid {
    pub fn new(
        width: usize,
        height: usize,
        layers: usize,
        data: Vec<f32>,
        transform: GeoTransform,
        crs: CrsCode,
        nodata: f32,
    ) -> RasterResult<Self> {
        if width == 0 || height == 0 || layers == 0 {
            return Err(RasterError::InvalidGrid(format!(
                "empty dimensions {}x{}x{}",
                width, height, layers
            )));
        }
        if data.len() != width * height * layers {
            return Err(RasterError::InvalidGrid(format!(
                "expected {} cells for {}x{}x{}, got {}",
                width * height * layers,
                width,
                height,
                layers,
                data.len()
            )));
        }
        if !(transform.pixel_width > 0.0) || !(transform.pixel_height < 0.0) {
            return Err(RasterError::InvalidGrid(format!(
                "grid must be north-up with positive pixel width, got {:?}",
                transform
            )));
        }
        Ok(Self {
            width,
            height,
            layers,
            data,
            transform,
            crs,
            nodata,
            labels: Vec::new(),
        })
    }

    /// Grid of the given shape with every cell set to nodata.
    pub fn filled(
        width: usize,
        height: usize,
        layers: usize,
        transform: GeoTransform,
        crs: CrsCode,
        nodata: f32,
    ) -> RasterResult<Self> {
        Self::new(
            width,
            height,
            layers,
            vec![nodata; width * height * layers],
            transform,
            crs,
            nodata,
        )
    }

    pub fn with_labels(mut self, labels: Vec<String>) -> Self {
        self.labels = labels;
        self
    }

    pub fn is_nodata(&self, value: f32) -> bool {
        value.is_nan() || value == self.nodata
    }

    pub fn layer_len(&self) -> usize {
        self.width * self.height
    }

    pub fn index(&self, layer: usize, row: usize, col: usize) -> usize {
        layer * self.layer_len() + row * self.width + col
    }

    pub fn get(&self, layer: usize, row: usize, col: usize) -> Option<f32> {
        if layer >= self.layers || row >= self.height || col >= self.width {
            return None;
        }
        Some(self.data[self.index(layer, row, col)])
    }

    /// Value at `(layer, row, col)` unless it is nodata.
    pub fn valid(&self, layer: usize, row: usize, col: usize) -> Option<f32> {
        self.get(layer, row, col).filter(|v| !self.is_nodata(*v))
    }

    pub fn layer(&self, layer: usize) -> &[f32] {
        let n = self.layer_len();
        &self.data[layer * n..(layer + 1) * n]
    }

    pub fn layer_mut(&mut self, layer: usize) -> &mut [f32] {
        let n = self.layer_len();
        &mut self.data[layer * n..(layer + 1) * n]
    }

    pub fn bbox(&self) -> BoundingBox {
        self.transform.bounds(self.width, self.height)
    }

    /// Absolute pixel size `(dx, dy)`.
    pub fn resolution(&self) -> (f64, f64) {
        (
            self.transform.pixel_width.abs(),
            self.transform.pixel_height.abs(),
        )
    }

    pub fn valid_count(&self) -> usize {
        self.data.iter().filter(|v| !self.is_nodata(**v)).count()
    }

    /// Copy of a single layer as its own grid.
    pub fn extract_layer(&self, layer: usize) -> RasterResult<RasterGrid> {
        if layer >= self.layers {
            return Err(RasterError::InvalidGrid(format!(
                "layer {} out of range (grid has {})",
                layer, self.layers
            )));
        }
        let mut grid = RasterGrid::new(
            self.width,
            self.height,
            1,
            self.layer(layer).to_vec(),
            self.transform,
            self.crs,
            self.nodata,
        )?;
        if let Some(label) = self.labels.get(layer) {
            grid.labels = vec![label.clone()];
        }
        Ok(grid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transform() -> GeoTransform {
        GeoTransform::new(-10.0, 10.0, 1.0, -1.0)
    }

    #[test]
    fn test_new_validates_length() {
        let err = RasterGrid::new(2, 2, 1, vec![0.0; 3], transform(), CrsCode::Epsg4326, -9999.0);
        assert!(matches!(err, Err(RasterError::InvalidGrid(_))));
    }

    #[test]
    fn test_new_rejects_south_up() {
        let t = GeoTransform::new(0.0, 0.0, 1.0, 1.0);
        assert!(RasterGrid::new(1, 1, 1, vec![0.0], t, CrsCode::Epsg4326, -9999.0).is_err());
    }

    #[test]
    fn test_bbox_and_cell_center() {
        let g = RasterGrid::filled(4, 2, 1, transform(), CrsCode::Epsg4326, -9999.0).unwrap();
        assert_eq!(g.bbox(), BoundingBox::new(-10.0, 8.0, -6.0, 10.0));
        assert_eq!(g.transform.cell_center(0, 0), (-9.5, 9.5));
        assert_eq!(g.transform.cell_center(3, 1), (-6.5, 8.5));
    }

    #[test]
    fn test_nodata_includes_nan() {
        let g = RasterGrid::new(
            3,
            1,
            1,
            vec![1.0, -9999.0, f32::NAN],
            transform(),
            CrsCode::Epsg4326,
            -9999.0,
        )
        .unwrap();
        assert_eq!(g.valid_count(), 1);
        assert_eq!(g.valid(0, 0, 0), Some(1.0));
        assert_eq!(g.valid(0, 0, 1), None);
        assert_eq!(g.valid(0, 0, 2), None);
    }

    #[test]
    fn test_alignment() {
        let a = transform();
        assert!(a.is_aligned_with(&GeoTransform::new(-5.0, 3.0, 1.0, -1.0)));
        assert!(!a.is_aligned_with(&GeoTransform::new(-5.5, 3.0, 1.0, -1.0)));
        assert!(!a.is_aligned_with(&GeoTransform::new(-5.0, 3.0, 0.5, -0.5)));
    }

    #[test]
    fn test_extract_layer_keeps_label() {
        let g = RasterGrid::new(
            1,
            1,
            2,
            vec![1.0, 2.0],
            transform(),
            CrsCode::Epsg4326,
            f32::NAN,
        )
        .unwrap()
        .with_labels(vec!["2030-01-01".into(), "2030-01-02".into()]);
        let second = g.extract_layer(1).unwrap();
        assert_eq!(second.data, vec![2.0]);
        assert_eq!(second.labels, vec!["2030-01-02".to_string()]);
        assert!(g.extract_layer(2).is_err());
    }
}
