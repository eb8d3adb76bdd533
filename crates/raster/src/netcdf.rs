//! NetCDF reading through the native netcdf library.
//!
//! Handles CF-style lat/lon grids, `(lat, lon)` or `(time, lat, lon)`:
//! packed values are unpacked with `scale_factor`/`add_offset`, fill values
//! become nodata and south-up grids are flipped.
//!
//! The netcdf library needs a file path, so in-memory bytes are written to a
//! temp file first (`/dev/shm` when available on Linux).

use std::io::Write;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Once;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use tracing::{debug, info};

use basin_common::CrsCode;

use crate::error::{RasterError, RasterResult};
use crate::grid::{GeoTransform, RasterGrid};
use crate::open::OpenOptions;

const LAT_NAMES: [&str; 3] = ["lat", "latitude", "y"];
const LON_NAMES: [&str; 3] = ["lon", "longitude", "x"];

/// Silence HDF5's automatic error printing to stderr.
///
/// HDF5 reports handled lookups of missing attributes on stderr. Safe to call
/// repeatedly; only the first call does anything.
pub fn silence_hdf5_errors() {
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        // SAFETY: H5Eset_auto2 with null handlers only disables printing.
        unsafe {
            hdf5_metno_sys::h5e::H5Eset_auto2(
                hdf5_metno_sys::h5e::H5E_DEFAULT,
                None,
                std::ptr::null_mut(),
            );
        }
    });
}

/// Read a NetCDF held in memory.
pub fn read_netcdf_bytes(data: &[u8], options: &OpenOptions) -> RasterResult<RasterGrid> {
    let temp_file = optimal_temp_dir().join(temp_filename());
    let mut file = std::fs::File::create(&temp_file).map_err(|e| RasterError::io(&temp_file, e))?;
    file.write_all(data)
        .map_err(|e| RasterError::io(&temp_file, e))?;
    drop(file);

    let result = read_netcdf_path(&temp_file, options);
    let _ = std::fs::remove_file(&temp_file);
    result
}

pub fn read_netcdf_path(path: &Path, options: &OpenOptions) -> RasterResult<RasterGrid> {
    silence_hdf5_errors();

    let file = netcdf::open(path)
        .map_err(|e| RasterError::NetCdf(format!("failed to open {}: {}", path.display(), e)))?;

    let var = select_variable(&file, options.variable.as_deref())?;
    let dims: Vec<(String, usize)> = var
        .dimensions()
        .iter()
        .map(|d| (d.name(), d.len()))
        .collect();

    let (time_len, lat_dim, lon_dim) = match dims.as_slice() {
        [lat, lon] => (None, lat, lon),
        [time, lat, lon] => (Some(time.1), lat, lon),
        other => {
            return Err(RasterError::NetCdf(format!(
                "variable '{}' has unsupported dimensions {:?}",
                var.name(),
                other
            )))
        }
    };
    if !LAT_NAMES.contains(&lat_dim.0.as_str()) || !LON_NAMES.contains(&lon_dim.0.as_str()) {
        return Err(RasterError::NetCdf(format!(
            "expected (lat, lon) trailing dimensions, got ({}, {})",
            lat_dim.0, lon_dim.0
        )));
    }

    let lats = coordinate_values(&file, &lat_dim.0)?;
    let lons = coordinate_values(&file, &lon_dim.0)?;
    let (width, height) = (lons.len(), lats.len());

    let steps = time_steps(time_len, options.time_range)?;
    let layers = steps.len().max(1);

    let raw: Vec<f32> = match time_len {
        None => var.get_values::<f32, _>(..),
        Some(_) => var.get_values::<f32, _>((steps.clone(), .., ..)),
    }
    .map_err(|e| RasterError::NetCdf(format!("failed to read '{}': {}", var.name(), e)))?;

    let scale = f32_attr(&var, "scale_factor").unwrap_or(1.0);
    let offset = f32_attr(&var, "add_offset").unwrap_or(0.0);
    let fill = f32_attr(&var, "_FillValue").or_else(|| f32_attr(&var, "missing_value"));
    let nodata = f32::NAN;

    let mut data: Vec<f32> = raw
        .iter()
        .map(|&v| match fill {
            Some(f) if v == f => nodata,
            _ if v.is_nan() => nodata,
            _ => v * scale + offset,
        })
        .collect();

    let south_up = lats[0] < lats[height - 1];
    if south_up {
        for layer in data.chunks_exact_mut(width * height) {
            flip_rows(layer, width);
        }
    }

    let dx = (lons[width - 1] - lons[0]) / (width - 1) as f64;
    let dy = (lats[height - 1] - lats[0]).abs() / (height - 1) as f64;
    let north = lats[0].max(lats[height - 1]);
    let transform = GeoTransform::new(lons[0] - dx / 2.0, north + dy / 2.0, dx, -dy);

    let mut grid = RasterGrid::new(width, height, layers, data, transform, CrsCode::Epsg4326, nodata)?;
    if time_len.is_some() {
        grid.labels = time_labels(&file, steps);
    }

    info!(
        variable = %var.name(),
        width,
        height,
        layers,
        south_up,
        "Read NetCDF grid"
    );
    Ok(grid)
}

fn select_variable<'f>(
    file: &'f netcdf::File,
    name: Option<&str>,
) -> RasterResult<netcdf::Variable<'f>> {
    if let Some(name) = name {
        return file
            .variable(name)
            .ok_or_else(|| RasterError::MissingData(format!("variable '{}'", name)));
    }

    let mut gridded: Vec<netcdf::Variable<'f>> = file
        .variables()
        .filter(|v| v.dimensions().len() >= 2)
        .collect();
    match gridded.len() {
        1 => Ok(gridded.remove(0)),
        0 => Err(RasterError::MissingData("gridded variable".into())),
        _ => Err(RasterError::MissingData(format!(
            "variable name; candidates are {:?}",
            gridded.iter().map(|v| v.name()).collect::<Vec<_>>()
        ))),
    }
}

fn coordinate_values(file: &netcdf::File, dim: &str) -> RasterResult<Vec<f64>> {
    let var = file
        .variable(dim)
        .ok_or_else(|| RasterError::MissingData(format!("coordinate variable '{}'", dim)))?;
    let values: Vec<f64> = var
        .get_values::<f64, _>(..)
        .map_err(|e| RasterError::NetCdf(format!("failed to read '{}': {}", dim, e)))?;
    if values.len() < 2 {
        return Err(RasterError::NetCdf(format!(
            "coordinate '{}' needs at least two values",
            dim
        )));
    }
    Ok(values)
}

fn time_steps(time_len: Option<usize>, range: Option<(usize, usize)>) -> RasterResult<Range<usize>> {
    let Some(len) = time_len else {
        return Ok(0..0);
    };
    let (start, end) = range.unwrap_or((0, len));
    if start >= end || end > len {
        return Err(RasterError::NetCdf(format!(
            "time range {}..{} outside 0..{}",
            start, end, len
        )));
    }
    Ok(start..end)
}

/// ISO dates for the selected time steps, from CF `<unit> since <date>`.
fn time_labels(file: &netcdf::File, steps: Range<usize>) -> Vec<String> {
    let fallback = || steps.clone().map(|i| format!("t{}", i)).collect();
    let Some(var) = file.variable("time") else {
        return fallback();
    };
    let (Some(units), Ok(values)) = (string_attr(&var, "units"), var.get_values::<f64, _>(steps.clone()))
    else {
        return fallback();
    };
    match values
        .iter()
        .map(|v| decode_cf_time(&units, *v))
        .collect::<Option<Vec<_>>>()
    {
        Some(labels) => labels,
        None => {
            debug!(units = %units, "Unrecognised time units, using indices");
            fallback()
        }
    }
}

pub(crate) fn decode_cf_time(units: &str, value: f64) -> Option<String> {
    let (unit, since) = units.split_once(" since ")?;
    let since = since.trim();
    let base = NaiveDateTime::parse_from_str(since, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(since, "%Y-%m-%dT%H:%M:%S"))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(since.get(..10)?, "%Y-%m-%d")
                .ok()?
                .and_hms_opt(0, 0, 0)
        })?;
    let seconds = match unit.trim() {
        "days" | "day" => value * 86_400.0,
        "hours" | "hour" => value * 3_600.0,
        "minutes" | "minute" => value * 60.0,
        "seconds" | "second" => value,
        _ => return None,
    };
    let at = base + Duration::seconds(seconds.round() as i64);
    Some(at.format("%Y-%m-%dT%H:%M:%SZ").to_string())
}

fn flip_rows(layer: &mut [f32], width: usize) {
    let height = layer.len() / width;
    for row in 0..height / 2 {
        let (top, bottom) = layer.split_at_mut((height - 1 - row) * width);
        top[row * width..(row + 1) * width].swap_with_slice(&mut bottom[..width]);
    }
}

// =============================================================================
// Internal helpers
// =============================================================================

/// Memory-backed `/dev/shm` on Linux when writable, else the system temp dir.
fn optimal_temp_dir() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        let shm_path = Path::new("/dev/shm");
        if shm_path.is_dir() {
            let test_path = shm_path.join(format!(".basin_netcdf_test_{}", std::process::id()));
            if std::fs::write(&test_path, b"test").is_ok() {
                let _ = std::fs::remove_file(&test_path);
                return shm_path.to_path_buf();
            }
        }
    }

    std::env::temp_dir()
}

/// Unique per process, thread and call.
fn temp_filename() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let pid = std::process::id();
    let tid = std::thread::current().id();
    let count = COUNTER.fetch_add(1, Ordering::Relaxed);

    format!("basin_raster_{}_{:?}_{}.nc", pid, tid, count)
}

/// Checked first to avoid HDF5 lookups of missing attributes.
fn has_attr(var: &netcdf::Variable, name: &str) -> bool {
    var.attributes().any(|attr| attr.name() == name)
}

fn f32_attr(var: &netcdf::Variable, name: &str) -> Option<f32> {
    if !has_attr(var, name) {
        return None;
    }
    let value = var.attribute_value(name)?.ok()?;
    f32::try_from(value).ok()
}

fn string_attr(var: &netcdf::Variable, name: &str) -> Option<String> {
    if !has_attr(var, name) {
        return None;
    }
    match var.attribute_value(name)?.ok()? {
        netcdf::AttributeValue::Str(s) => Some(s),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temp_filename_uniqueness() {
        assert_ne!(temp_filename(), temp_filename());
    }

    #[test]
    fn test_optimal_temp_dir_exists() {
        assert!(optimal_temp_dir().exists());
    }

    #[test]
    fn test_flip_rows() {
        let mut layer = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        flip_rows(&mut layer, 2);
        assert_eq!(layer, vec![5.0, 6.0, 3.0, 4.0, 1.0, 2.0]);
    }

    #[test]
    fn test_time_steps() {
        assert_eq!(time_steps(Some(365), None).unwrap(), 0..365);
        assert_eq!(time_steps(Some(365), Some((10, 20))).unwrap(), 10..20);
        assert!(time_steps(Some(365), Some((360, 370))).is_err());
        assert!(time_steps(Some(365), Some((5, 5))).is_err());
    }

    #[test]
    fn test_decode_cf_time() {
        assert_eq!(
            decode_cf_time("days since 1950-01-01", 29220.5).as_deref(),
            Some("2030-01-01T12:00:00Z")
        );
        assert_eq!(
            decode_cf_time("hours since 2030-01-01 00:00:00", 36.0).as_deref(),
            Some("2030-01-02T12:00:00Z")
        );
        assert_eq!(decode_cf_time("months since 2030-01-01", 1.0), None);
    }
}
