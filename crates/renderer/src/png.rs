//! PNG encoding for RGBA buffers.
//!
//! Two output modes:
//! - **Indexed (colour type 3)** when the image has at most 256 distinct
//!   RGBA values. Colour-mapped rasters with a transparent nodata colour
//!   usually land here and come out several times smaller.
//! - **RGBA (colour type 6)** otherwise, e.g. static maps with
//!   anti-aliased text.
//!
//! [`encode_png`] picks the mode; [`encode_rgba`] and [`encode_indexed`]
//! force one.

use std::collections::HashMap;
use std::io::Write;

use image::RgbaImage;
use rayon::prelude::*;

use crate::error::{RenderError, RenderResult};

const SIGNATURE: [u8; 8] = [137, 80, 78, 71, 13, 10, 26, 10];

const MAX_PALETTE_SIZE: usize = 256;

/// Pixel count above which palette extraction runs in parallel.
const PARALLEL_THRESHOLD: usize = 4096;

/// Colour table plus one index byte per pixel.
#[derive(Debug, Clone, PartialEq)]
pub struct Palette {
    pub colors: Vec<[u8; 4]>,
    pub indices: Vec<u8>,
}

impl Palette {
    /// Build a palette from RGBA bytes, or `None` past 256 colours.
    pub fn extract(pixels: &[u8]) -> Option<Self> {
        if pixels.len() / 4 >= PARALLEL_THRESHOLD {
            extract_parallel(pixels)
        } else {
            extract_sequential(pixels)
        }
    }

    pub fn has_transparency(&self) -> bool {
        self.colors.iter().any(|c| c[3] < 255)
    }
}

/// Encode an `image` buffer.
pub fn encode_image(image: &RgbaImage) -> RenderResult<Vec<u8>> {
    encode_png(image.as_raw(), image.width() as usize, image.height() as usize)
}

/// Encode RGBA bytes, indexed when the colours fit a palette.
pub fn encode_png(pixels: &[u8], width: usize, height: usize) -> RenderResult<Vec<u8>> {
    check_dimensions(pixels.len(), 4, width, height)?;
    match Palette::extract(pixels) {
        Some(palette) => encode_indexed(width, height, &palette),
        None => encode_rgba(pixels, width, height),
    }
}

/// Indexed PNG with a tRNS chunk when any palette entry is translucent.
pub fn encode_indexed(width: usize, height: usize, palette: &Palette) -> RenderResult<Vec<u8>> {
    check_dimensions(palette.indices.len(), 1, width, height)?;
    if palette.colors.is_empty() || palette.colors.len() > MAX_PALETTE_SIZE {
        return Err(RenderError::Png(format!(
            "palette must hold 1..={} colours, got {}",
            MAX_PALETTE_SIZE,
            palette.colors.len()
        )));
    }

    let mut png = Vec::with_capacity(64 + palette.indices.len() / 2);
    png.extend_from_slice(&SIGNATURE);
    write_chunk(&mut png, b"IHDR", &ihdr(width, height, 3));

    let plte: Vec<u8> = palette.colors.iter().flat_map(|c| [c[0], c[1], c[2]]).collect();
    write_chunk(&mut png, b"PLTE", &plte);

    if palette.has_transparency() {
        let trns: Vec<u8> = palette.colors.iter().map(|c| c[3]).collect();
        write_chunk(&mut png, b"tRNS", &trns);
    }

    write_chunk(&mut png, b"IDAT", &deflate_scanlines(&palette.indices, width, height)?);
    write_chunk(&mut png, b"IEND", &[]);
    Ok(png)
}

/// Truecolour-with-alpha PNG.
pub fn encode_rgba(pixels: &[u8], width: usize, height: usize) -> RenderResult<Vec<u8>> {
    check_dimensions(pixels.len(), 4, width, height)?;

    let mut png = Vec::with_capacity(64 + pixels.len() / 2);
    png.extend_from_slice(&SIGNATURE);
    write_chunk(&mut png, b"IHDR", &ihdr(width, height, 6));
    write_chunk(&mut png, b"IDAT", &deflate_scanlines(pixels, width * 4, height)?);
    write_chunk(&mut png, b"IEND", &[]);
    Ok(png)
}

fn check_dimensions(len: usize, bytes_per_pixel: usize, width: usize, height: usize) -> RenderResult<()> {
    if width == 0 || height == 0 {
        return Err(RenderError::Png(format!("empty image {}x{}", width, height)));
    }
    if width > u32::MAX as usize || height > u32::MAX as usize {
        return Err(RenderError::Png(format!("image {}x{} too large", width, height)));
    }
    if len != width * height * bytes_per_pixel {
        return Err(RenderError::Png(format!(
            "buffer holds {} bytes, expected {} for {}x{}",
            len,
            width * height * bytes_per_pixel,
            width,
            height
        )));
    }
    Ok(())
}

fn ihdr(width: usize, height: usize, color_type: u8) -> [u8; 13] {
    let mut data = [0u8; 13];
    data[0..4].copy_from_slice(&(width as u32).to_be_bytes());
    data[4..8].copy_from_slice(&(height as u32).to_be_bytes());
    data[8] = 8; // bit depth
    data[9] = color_type;
    // compression, filter and interlace methods stay 0
    data
}

/// Prefix every row with filter type 0 and zlib-compress.
fn deflate_scanlines(bytes: &[u8], row_len: usize, height: usize) -> RenderResult<Vec<u8>> {
    let mut raw = Vec::with_capacity(height * (1 + row_len));
    for row in bytes.chunks_exact(row_len) {
        raw.push(0);
        raw.extend_from_slice(row);
    }

    let mut encoder = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
    encoder
        .write_all(&raw)
        .and_then(|_| encoder.finish())
        .map_err(|e| RenderError::Png(format!("IDAT compression failed: {}", e)))
}

fn write_chunk(png: &mut Vec<u8>, kind: &[u8; 4], data: &[u8]) {
    png.extend_from_slice(&(data.len() as u32).to_be_bytes());
    png.extend_from_slice(kind);
    png.extend_from_slice(data);

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(kind);
    hasher.update(data);
    png.extend_from_slice(&hasher.finalize().to_be_bytes());
}

#[inline(always)]
fn pack(px: &[u8]) -> u32 {
    u32::from_le_bytes([px[0], px[1], px[2], px[3]])
}

fn extract_sequential(pixels: &[u8]) -> Option<Palette> {
    let mut lookup: HashMap<u32, u8> = HashMap::with_capacity(MAX_PALETTE_SIZE);
    let mut colors = Vec::with_capacity(MAX_PALETTE_SIZE);
    let mut indices = Vec::with_capacity(pixels.len() / 4);

    for px in pixels.chunks_exact(4) {
        let key = pack(px);
        let index = match lookup.get(&key) {
            Some(&i) => i,
            None => {
                if colors.len() == MAX_PALETTE_SIZE {
                    return None;
                }
                let i = colors.len() as u8;
                colors.push([px[0], px[1], px[2], px[3]]);
                lookup.insert(key, i);
                i
            }
        };
        indices.push(index);
    }
    Some(Palette { colors, indices })
}

/// Collect distinct colours per chunk in parallel, merge, then map pixels.
fn extract_parallel(pixels: &[u8]) -> Option<Palette> {
    let chunk_px = (pixels.len() / 4 / rayon::current_num_threads()).max(256);

    let per_chunk: Vec<Vec<u32>> = pixels
        .par_chunks(chunk_px * 4)
        .map(|chunk| {
            let mut seen: Vec<u32> = Vec::new();
            let mut set = std::collections::HashSet::with_capacity(MAX_PALETTE_SIZE);
            for px in chunk.chunks_exact(4) {
                let key = pack(px);
                if set.insert(key) {
                    seen.push(key);
                    if seen.len() > MAX_PALETTE_SIZE {
                        break;
                    }
                }
            }
            seen
        })
        .collect();

    let mut lookup: HashMap<u32, u8> = HashMap::with_capacity(MAX_PALETTE_SIZE);
    let mut colors = Vec::with_capacity(MAX_PALETTE_SIZE);
    for key in per_chunk.into_iter().flatten() {
        if lookup.contains_key(&key) {
            continue;
        }
        if colors.len() == MAX_PALETTE_SIZE {
            return None;
        }
        lookup.insert(key, colors.len() as u8);
        colors.push(key.to_le_bytes());
    }

    let indices: Vec<u8> = pixels
        .par_chunks_exact(4)
        .map(|px| lookup.get(&pack(px)).copied().unwrap_or(0))
        .collect();
    Some(Palette { colors, indices })
}
