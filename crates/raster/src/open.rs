//! Opening resolved assets as grids.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use basin_common::DownloadManager;
use catalog::{RasterSource, ResolvedAsset};
use stac_protocol::asset::AssetFormat;

use crate::error::{RasterError, RasterResult};
use crate::geotiff::{read_geotiff_bytes, read_geotiff_path};
use crate::grid::RasterGrid;
use crate::rotate::normalize_longitudes;

/// Reader options for multi-variable and time-stacked sources (NetCDF).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenOptions {
    /// Data variable; when unset the file must hold exactly one gridded variable.
    #[serde(default)]
    pub variable: Option<String>,
    /// Half-open range of time indices; all steps when unset.
    #[serde(default)]
    pub time_range: Option<(usize, usize)>,
}

/// Opens resolved assets, fetching remote ones into memory.
#[derive(Debug, Clone)]
pub struct RasterReader {
    downloads: DownloadManager,
}

impl RasterReader {
    pub fn new(downloads: DownloadManager) -> Self {
        Self { downloads }
    }

    /// Open an asset as a grid in -180..180 longitudes.
    #[instrument(skip(self, asset, options), fields(item = %asset.item_id, source = %asset.source.describe()))]
    pub async fn open(&self, asset: &ResolvedAsset, options: &OpenOptions) -> RasterResult<RasterGrid> {
        let declared = asset.format;
        let options = options.clone();
        let name = asset.source.describe();

        let grid = match &asset.source {
            RasterSource::Url(url) => {
                let bytes = self.downloads.fetch_bytes(url).await?;
                spawn_decode(move || open_bytes(&bytes, declared, &options, &name)).await?
            }
            RasterSource::Path(path) => {
                let path = path.clone();
                spawn_decode(move || open_path(&path, declared, &options)).await?
            }
        };

        info!(
            width = grid.width,
            height = grid.height,
            layers = grid.layers,
            crs = %grid.crs,
            "Opened raster"
        );
        Ok(grid)
    }
}

async fn spawn_decode<F>(decode: F) -> RasterResult<RasterGrid>
where
    F: FnOnce() -> RasterResult<RasterGrid> + Send + 'static,
{
    tokio::task::spawn_blocking(decode)
        .await
        .map_err(|e| RasterError::InvalidGrid(format!("decode task failed: {}", e)))?
}

/// Decode an in-memory raster. `name` is only used in errors.
pub fn open_bytes(
    data: &[u8],
    declared: AssetFormat,
    options: &OpenOptions,
    name: &str,
) -> RasterResult<RasterGrid> {
    let grid = match resolve_format(declared, sniff(data)) {
        AssetFormat::GeoTiff => read_geotiff_bytes(data)?,
        AssetFormat::NetCdf => read_netcdf_bytes(data, options)?,
        AssetFormat::Unknown => {
            return Err(RasterError::UnsupportedFormat {
                source_name: name.to_string(),
            })
        }
    };
    normalize_longitudes(grid)
}

pub fn open_path(path: &Path, declared: AssetFormat, options: &OpenOptions) -> RasterResult<RasterGrid> {
    let sniffed = std::fs::File::open(path)
        .and_then(|mut f| {
            let mut head = [0u8; 8];
            let n = std::io::Read::read(&mut f, &mut head)?;
            Ok(sniff(&head[..n]))
        })
        .map_err(|e| RasterError::io(path, e))?;

    let grid = match resolve_format(declared, sniffed) {
        AssetFormat::GeoTiff => read_geotiff_path(path)?,
        AssetFormat::NetCdf => read_netcdf_path(path, options)?,
        AssetFormat::Unknown => {
            return Err(RasterError::UnsupportedFormat {
                source_name: path.display().to_string(),
            })
        }
    };
    normalize_longitudes(grid)
}

/// Magic bytes take precedence over the declared media type.
fn resolve_format(declared: AssetFormat, sniffed: AssetFormat) -> AssetFormat {
    match sniffed {
        AssetFormat::Unknown => declared,
        known => known,
    }
}

fn sniff(head: &[u8]) -> AssetFormat {
    match head {
        [b'I', b'I', 42, 0, ..] | [b'M', b'M', 0, 42, ..] => AssetFormat::GeoTiff,
        // BigTIFF
        [b'I', b'I', 43, 0, ..] | [b'M', b'M', 0, 43, ..] => AssetFormat::GeoTiff,
        [b'C', b'D', b'F', 1 | 2 | 5, ..] => AssetFormat::NetCdf,
        [0x89, b'H', b'D', b'F', ..] => AssetFormat::NetCdf,
        _ => AssetFormat::Unknown,
    }
}

#[cfg(feature = "netcdf")]
fn read_netcdf_bytes(data: &[u8], options: &OpenOptions) -> RasterResult<RasterGrid> {
    crate::netcdf::read_netcdf_bytes(data, options)
}

#[cfg(feature = "netcdf")]
fn read_netcdf_path(path: &Path, options: &OpenOptions) -> RasterResult<RasterGrid> {
    crate::netcdf::read_netcdf_path(path, options)
}

#[cfg(not(feature = "netcdf"))]
fn read_netcdf_bytes(_data: &[u8], _options: &OpenOptions) -> RasterResult<RasterGrid> {
    Err(RasterError::UnsupportedFormat {
        source_name: "NetCDF (built without the netcdf feature)".into(),
    })
}

#[cfg(not(feature = "netcdf"))]
fn read_netcdf_path(path: &Path, _options: &OpenOptions) -> RasterResult<RasterGrid> {
    Err(RasterError::UnsupportedFormat {
        source_name: format!("{} (built without the netcdf feature)", path.display()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sniff() {
        assert_eq!(sniff(b"II*\0rest"), AssetFormat::GeoTiff);
        assert_eq!(sniff(b"MM\0*"), AssetFormat::GeoTiff);
        assert_eq!(sniff(b"CDF\x01"), AssetFormat::NetCdf);
        assert_eq!(sniff(b"\x89HDF\r\n"), AssetFormat::NetCdf);
        assert_eq!(sniff(b"<html>"), AssetFormat::Unknown);
        assert_eq!(sniff(b""), AssetFormat::Unknown);
    }

    #[test]
    fn test_magic_overrides_declared() {
        assert_eq!(
            resolve_format(AssetFormat::NetCdf, AssetFormat::GeoTiff),
            AssetFormat::GeoTiff
        );
        assert_eq!(
            resolve_format(AssetFormat::NetCdf, AssetFormat::Unknown),
            AssetFormat::NetCdf
        );
    }

    #[test]
    fn test_unknown_bytes_rejected() {
        let err = open_bytes(b"<html/>", AssetFormat::Unknown, &OpenOptions::default(), "x").unwrap_err();
        assert!(matches!(err, RasterError::UnsupportedFormat { .. }));
    }
}
