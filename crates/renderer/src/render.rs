//! Colour-mapping grids to RGBA.

use image::RgbaImage;
use rayon::prelude::*;

use raster::RasterGrid;

use crate::colormap::{Colormap, ValueRange, TRANSPARENT};
use crate::error::{RenderError, RenderResult};

/// One RGBA pixel per cell, north up; nodata cells are fully transparent.
///
/// Time stacks must be reduced to a single layer first.
pub fn render_raster_rgba(grid: &RasterGrid, colormap: &Colormap, range: &ValueRange) -> RenderResult<RgbaImage> {
    if grid.layers != 1 {
        return Err(RenderError::InvalidInput(format!(
            "grid has {} layers; reduce to one before rendering",
            grid.layers
        )));
    }

    let width = grid.width;
    let values = grid.layer(0);
    let mut pixels = vec![0u8; grid.width * grid.height * 4];

    pixels
        .par_chunks_mut(width * 4)
        .zip(values.par_chunks(width))
        .for_each(|(out, row)| {
            for (px, &v) in out.chunks_exact_mut(4).zip(row) {
                let color = if grid.is_nodata(v) {
                    TRANSPARENT
                } else {
                    colormap.map(v as f64, range)
                };
                px.copy_from_slice(&color);
            }
        });

    RgbaImage::from_raw(grid.width as u32, grid.height as u32, pixels)
        .ok_or_else(|| RenderError::InvalidInput(format!("{}x{} buffer size mismatch", grid.width, grid.height)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use basin_common::CrsCode;
    use raster::GeoTransform;

    #[test]
    fn test_nodata_is_transparent() {
        let grid = RasterGrid::new(
            3,
            1,
            1,
            vec![0.0, -9999.0, 10.0],
            GeoTransform::new(0.0, 1.0, 1.0, -1.0),
            CrsCode::Epsg4326,
            -9999.0,
        )
        .unwrap();
        let cmap = Colormap::named("blues").unwrap();
        let range = ValueRange::new(0.0, 10.0).unwrap();
        let img = render_raster_rgba(&grid, &cmap, &range).unwrap();

        assert_eq!(img.dimensions(), (3, 1));
        assert_eq!(img.get_pixel(0, 0).0, cmap.color_at(0.0));
        assert_eq!(img.get_pixel(1, 0).0, TRANSPARENT);
        assert_eq!(img.get_pixel(2, 0).0, cmap.color_at(1.0));
    }

    #[test]
    fn test_multilayer_rejected() {
        let grid = RasterGrid::filled(2, 2, 2, GeoTransform::new(0.0, 2.0, 1.0, -1.0), CrsCode::Epsg4326, f32::NAN)
            .unwrap();
        let cmap = Colormap::named("viridis").unwrap();
        let range = ValueRange::new(0.0, 1.0).unwrap();
        assert!(matches!(
            render_raster_rgba(&grid, &cmap, &range),
            Err(RenderError::InvalidInput(_))
        ));
    }
}
