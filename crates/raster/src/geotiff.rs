//! GeoTIFF / COG reading and writing through the `tiff` crate.
//!
//! Only north-up grids are supported. Georeferencing comes from either
//! ModelPixelScale + ModelTiepoint or ModelTransformation; the CRS from the
//! GeoKey directory.

use std::fs::File;
use std::io::{Cursor, Read, Seek};
use std::path::Path;

use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::encoder::colortype::Gray32Float;
use tiff::encoder::TiffEncoder;
use tiff::tags::Tag;
use tracing::{debug, warn};

use basin_common::CrsCode;

use crate::error::{RasterError, RasterResult};
use crate::grid::{GeoTransform, RasterGrid};

const KEY_MODEL_TYPE: u16 = 1024;
const KEY_RASTER_TYPE: u16 = 1025;
const KEY_GEOGRAPHIC_TYPE: u16 = 2048;
const KEY_PROJECTED_CS_TYPE: u16 = 3072;
const USER_DEFINED: u16 = 32767;
const RASTER_PIXEL_IS_POINT: u16 = 2;

/// Limits raised for whole-tile elevation rasters.
fn limits() -> Limits {
    let mut limits = Limits::default();
    limits.decoding_buffer_size = 1024 * 1024 * 1024;
    limits.intermediate_buffer_size = 1024 * 1024 * 1024;
    limits.ifd_value_size = 64 * 1024 * 1024;
    limits
}

pub fn read_geotiff_path(path: &Path) -> RasterResult<RasterGrid> {
    let file = File::open(path).map_err(|e| RasterError::io(path, e))?;
    decode_geotiff(file)
}

pub fn read_geotiff_bytes(data: &[u8]) -> RasterResult<RasterGrid> {
    decode_geotiff(Cursor::new(data))
}

fn decode_geotiff<R: Read + Seek>(reader: R) -> RasterResult<RasterGrid> {
    let mut decoder = Decoder::new(reader)?.with_limits(limits());
    let (width, height) = decoder.dimensions()?;
    let (width, height) = (width as usize, height as usize);

    let keys = read_geokeys(&mut decoder);
    let transform = read_transform(&mut decoder, &keys)?;
    let crs = crs_from_geokeys(&keys).unwrap_or_else(|| {
        warn!("GeoTIFF has no usable GeoKey CRS, assuming EPSG:4326");
        CrsCode::Epsg4326
    });
    let nodata = read_nodata(&mut decoder);

    let samples = decode_samples(decoder.read_image()?);
    let cells = width * height;
    if cells == 0 || samples.len() % cells != 0 {
        return Err(RasterError::Tiff(format!(
            "{} samples do not fill a {}x{} image",
            samples.len(),
            width,
            height
        )));
    }
    let bands = samples.len() / cells;
    let data = if bands == 1 {
        samples
    } else {
        deinterleave(&samples, bands)
    };

    debug!(width, height, bands, crs = %crs, nodata, "Decoded GeoTIFF");
    RasterGrid::new(width, height, bands, data, transform, crs, nodata)
}

fn decode_samples(result: DecodingResult) -> Vec<f32> {
    match result {
        DecodingResult::F32(data) => data,
        DecodingResult::F64(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::I16(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::I32(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::U16(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::U32(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::U8(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::I8(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::U64(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::I64(data) => data.into_iter().map(|v| v as f32).collect(),
    }
}

/// Pixel-interleaved samples to band-sequential layers.
fn deinterleave(samples: &[f32], bands: usize) -> Vec<f32> {
    let cells = samples.len() / bands;
    let mut out = vec![0.0; samples.len()];
    for (i, pixel) in samples.chunks_exact(bands).enumerate() {
        for (b, v) in pixel.iter().enumerate() {
            out[b * cells + i] = *v;
        }
    }
    out
}

fn read_geokeys<R: Read + Seek>(decoder: &mut Decoder<R>) -> Vec<(u16, u16)> {
    let Ok(raw) = decoder.get_tag_u16_vec(Tag::GeoKeyDirectoryTag) else {
        return Vec::new();
    };
    parse_geokeys(&raw)
}

/// Inline (`location == 0`) short-valued keys of a GeoKey directory.
fn parse_geokeys(raw: &[u16]) -> Vec<(u16, u16)> {
    if raw.len() < 4 {
        return Vec::new();
    }
    let count = raw[3] as usize;
    raw[4..]
        .chunks_exact(4)
        .take(count)
        .filter(|entry| entry[1] == 0 && entry[2] == 1)
        .map(|entry| (entry[0], entry[3]))
        .collect()
}

fn geokey(keys: &[(u16, u16)], id: u16) -> Option<u16> {
    keys.iter().find(|(k, _)| *k == id).map(|(_, v)| *v)
}

fn crs_from_geokeys(keys: &[(u16, u16)]) -> Option<CrsCode> {
    [KEY_PROJECTED_CS_TYPE, KEY_GEOGRAPHIC_TYPE]
        .iter()
        .filter_map(|id| geokey(keys, *id))
        .find(|code| *code != 0 && *code != USER_DEFINED)
        .map(|code| CrsCode::from_epsg(code as u32))
}

fn read_transform<R: Read + Seek>(
    decoder: &mut Decoder<R>,
    keys: &[(u16, u16)],
) -> RasterResult<GeoTransform> {
    let scale = decoder.get_tag_f64_vec(Tag::ModelPixelScaleTag);
    let tiepoint = decoder.get_tag_f64_vec(Tag::ModelTiepointTag);

    let mut transform = match (scale, tiepoint) {
        (Ok(scale), Ok(tp)) if scale.len() >= 2 && tp.len() >= 6 => GeoTransform::new(
            tp[3] - tp[0] * scale[0],
            tp[4] + tp[1] * scale[1],
            scale[0],
            -scale[1],
        ),
        _ => {
            let m = decoder
                .get_tag_f64_vec(Tag::ModelTransformationTag)
                .map_err(|_| RasterError::MissingData("GeoTIFF georeferencing tags".into()))?;
            if m.len() < 8 {
                return Err(RasterError::Tiff("short ModelTransformation tag".into()));
            }
            if m[1] != 0.0 || m[4] != 0.0 {
                return Err(RasterError::Tiff("rotated rasters are not supported".into()));
            }
            GeoTransform::new(m[3], m[7], m[0], m[5])
        }
    };

    // Tie points on pixel centres
    if geokey(keys, KEY_RASTER_TYPE) == Some(RASTER_PIXEL_IS_POINT) {
        transform.origin_x -= transform.pixel_width / 2.0;
        transform.origin_y -= transform.pixel_height / 2.0;
    }
    Ok(transform)
}

fn read_nodata<R: Read + Seek>(decoder: &mut Decoder<R>) -> f32 {
    decoder
        .get_tag_ascii_string(Tag::GdalNodata)
        .ok()
        .and_then(|s| s.trim_matches(char::from(0)).trim().parse().ok())
        .unwrap_or(f32::NAN)
}

/// Write a single-layer grid as a float32 GeoTIFF with georeferencing,
/// GeoKeys and the GDAL nodata tag.
pub fn write_geotiff(grid: &RasterGrid, path: &Path) -> RasterResult<()> {
    if grid.layers != 1 {
        return Err(RasterError::InvalidGrid(format!(
            "GeoTIFF export needs a single layer, grid has {}",
            grid.layers
        )));
    }
    let file = File::create(path).map_err(|e| RasterError::io(path, e))?;
    encode_geotiff(grid, file)?;
    debug!(path = %path.display(), "Wrote GeoTIFF");
    Ok(())
}

fn encode_geotiff<W: std::io::Write + Seek>(grid: &RasterGrid, writer: W) -> RasterResult<()> {
    let mut encoder = TiffEncoder::new(writer)?;
    let mut image = encoder.new_image::<Gray32Float>(grid.width as u32, grid.height as u32)?;

    let t = grid.transform;
    let scale = [t.pixel_width, t.pixel_height.abs(), 0.0];
    image
        .encoder()
        .write_tag(Tag::ModelPixelScaleTag, &scale[..])?;

    let tiepoint = [0.0, 0.0, 0.0, t.origin_x, t.origin_y, 0.0];
    image
        .encoder()
        .write_tag(Tag::ModelTiepointTag, &tiepoint[..])?;

    let geokeys = geokeys_for(grid.crs);
    image
        .encoder()
        .write_tag(Tag::GeoKeyDirectoryTag, &geokeys[..])?;

    let nodata = if grid.nodata.is_nan() {
        "nan".to_string()
    } else {
        grid.nodata.to_string()
    };
    image
        .encoder()
        .write_tag(Tag::GdalNodata, nodata.as_str())?;

    image.write_data(&grid.data)?;
    Ok(())
}

fn geokeys_for(crs: CrsCode) -> Vec<u16> {
    let code = u16::try_from(crs.epsg()).unwrap_or(USER_DEFINED);
    let (model_type, crs_key) = if crs.is_geographic() {
        (2, KEY_GEOGRAPHIC_TYPE)
    } else {
        (1, KEY_PROJECTED_CS_TYPE)
    };
    vec![
        1, 1, 0, 3, // version 1.1.0, three keys
        KEY_MODEL_TYPE, 0, 1, model_type,
        KEY_RASTER_TYPE, 0, 1, 1, // RasterPixelIsArea
        crs_key, 0, 1, code,
    ]
}
