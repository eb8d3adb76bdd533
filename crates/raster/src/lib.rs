//! Raster assembly for the basin workflow.
//!
//! Resolved assets are opened as [`RasterGrid`]s (GeoTIFF/COG through the
//! `tiff` crate, NetCDF through the native netcdf library), normalised to
//! -180..180 longitudes, mosaicked, cropped and masked to the basin, and
//! summarised.
//!
//! ```text
//! ResolvedAsset ──► RasterReader::open ──► mosaic ──► clip (crop + mask)
//!                                                        │
//!                               reduce_layers / apply_linear / GridStats
//! ```
//!
//! NetCDF support is behind the default `netcdf` feature, which needs
//! libnetcdf and libhdf5 on the system.

pub mod clip;
pub mod error;
pub mod geotiff;
pub mod grid;
pub mod mosaic;
#[cfg(feature = "netcdf")]
pub mod netcdf;
pub mod open;
pub mod rotate;
pub mod stats;

pub use clip::{clip, crop, mask};
pub use error::{RasterError, RasterResult};
pub use geotiff::{read_geotiff_bytes, read_geotiff_path, write_geotiff};
pub use grid::{GeoTransform, RasterGrid};
pub use mosaic::{mosaic, MosaicPolicy};
pub use open::{open_bytes, open_path, OpenOptions, RasterReader};
pub use rotate::normalize_longitudes;
pub use stats::{apply_linear, reduce_layers, GridStats, LayerReduce};
