//! Test data generators for synthetic rasters and pixel buffers.
//!
//! These generators create predictable, verifiable test data patterns
//! that can be used across the test suite. All grids are row-major with
//! row 0 at the north edge.

/// Creates a smooth terrain-like elevation grid in meters.
///
/// A single peak in the middle of the grid falls off towards the edges,
/// ranging from 0 m at the corners up to `peak` m.
pub fn create_elevation_grid(width: usize, height: usize, peak: f32) -> Vec<f32> {
    let mut data = Vec::with_capacity(width * height);
    let center_x = width as f32 / 2.0;
    let center_y = height as f32 / 2.0;
    let max_dist = ((center_x * center_x) + (center_y * center_y)).sqrt().max(1.0);

    for row in 0..height {
        for col in 0..width {
            let dx = col as f32 - center_x;
            let dy = row as f32 - center_y;
            let dist = (dx * dx + dy * dy).sqrt();
            data.push((1.0 - dist / max_dist).max(0.0) * peak);
        }
    }
    data
}

/// Creates a grid filled with a constant value.
///
/// Useful for testing edge cases and simple scenarios.
///
/// # Arguments
///
/// * `width` - Number of columns
/// * `height` - Number of rows
/// * `value` - The constant value to fill
///
/// # Returns
///
/// A `Vec<f32>` filled with the constant value.
pub fn create_constant_grid(width: usize, height: usize, value: f32) -> Vec<f32> {
    vec![value; width * height]
}

/// Copies `base` (or zeros when it is empty) and writes `nodata` at the
/// given (col, row) positions.
pub fn create_grid_with_nodata(
    width: usize,
    height: usize,
    base: &[f32],
    nodata: f32,
    positions: &[(usize, usize)],
) -> Vec<f32> {
    let mut data = if base.len() == width * height {
        base.to_vec()
    } else {
        vec![0.0f32; width * height]
    };
    for &(col, row) in positions {
        if col < width && row < height {
            data[row * width + col] = nodata;
        }
    }
    data
}

/// Creates RGBA pixel data for a simple test pattern.
///
/// Creates a gradient pattern useful for testing PNG encoding.
///
/// # Arguments
///
/// * `width` - Image width in pixels
/// * `height` - Image height in pixels
///
/// # Returns
///
/// A `Vec<u8>` with RGBA pixel data (4 bytes per pixel).
pub fn create_test_rgba_pixels(width: usize, height: usize) -> Vec<u8> {
    let mut pixels = Vec::with_capacity(width * height * 4);
    for y in 0..height {
        for x in 0..width {
            let r = ((x as f32 / width as f32) * 255.0) as u8;
            let g = ((y as f32 / height as f32) * 255.0) as u8;
            let b = 128u8;
            let a = 255u8;
            pixels.extend_from_slice(&[r, g, b, a]);
        }
    }
    pixels
}

/// Creates RGBA pixel data with a limited color palette.
///
/// Creates pixels using only colors from a terrain-like palette,
/// suitable for testing indexed PNG encoding. The top-left pixel is fully
/// transparent, as nodata would be.
///
/// # Returns
///
/// A `Vec<u8>` with RGBA pixel data using at most 11 unique colors.
pub fn create_palette_pixels(width: usize, height: usize) -> Vec<u8> {
    let palette: [(u8, u8, u8); 10] = [
        (0, 97, 71),    // lowland
        (16, 122, 47),
        (232, 215, 125),
        (161, 67, 0),
        (158, 0, 0),
        (110, 110, 110),
        (255, 255, 255), // summit
        (51, 102, 153),
        (102, 153, 204),
        (204, 229, 255),
    ];

    let mut pixels = Vec::with_capacity(width * height * 4);
    for y in 0..height {
        for x in 0..width {
            if x == 0 && y == 0 {
                pixels.extend_from_slice(&[0, 0, 0, 0]);
                continue;
            }
            // Map position to palette index
            let idx = ((x as f32 / width as f32 * 0.3 + y as f32 / height as f32 * 0.7) * 9.0)
                as usize;
            let (r, g, b) = palette[idx.min(9)];
            pixels.extend_from_slice(&[r, g, b, 255]);
        }
    }
    pixels
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_elevation_grid() {
        let grid = create_elevation_grid(101, 101, 3000.0);
        let center = grid[50 * 101 + 50];
        assert!(center > 2900.0);
        assert!(grid[0] < 100.0);
    }

    #[test]
    fn test_create_constant_grid() {
        let grid = create_constant_grid(10, 10, 42.0);
        assert_eq!(grid.len(), 100);
        assert!(grid.iter().all(|&v| v == 42.0));
    }

    #[test]
    fn test_create_grid_with_sentinel_nodata() {
        let base = create_constant_grid(4, 4, 7.0);
        let grid = create_grid_with_nodata(4, 4, &base, -9999.0, &[(3, 0)]);
        assert_eq!(grid[3], -9999.0);
        assert_eq!(grid[4], 7.0);
    }

    #[test]
    fn test_create_test_rgba_pixels() {
        let pixels = create_test_rgba_pixels(16, 16);
        assert_eq!(pixels.len(), 16 * 16 * 4);
        // First pixel should be (0, 0, 128, 255) - dark blue
        assert_eq!(pixels[0], 0); // R
        assert_eq!(pixels[1], 0); // G
        assert_eq!(pixels[2], 128); // B
        assert_eq!(pixels[3], 255); // A
    }

    #[test]
    fn test_create_palette_pixels() {
        let pixels = create_palette_pixels(64, 64);
        assert_eq!(pixels.len(), 64 * 64 * 4);
        assert_eq!(pixels[3], 0, "first pixel is transparent");
        for chunk in pixels.chunks_exact(4).skip(1) {
            assert_eq!(chunk[3], 255);
        }
    }
}
