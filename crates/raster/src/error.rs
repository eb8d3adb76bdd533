//! Error types for raster operations.

use std::path::{Path, PathBuf};

use thiserror::Error;

use basin_common::{CommonError, DownloadError};

/// Result type for raster operations.
pub type RasterResult<T> = Result<T, RasterError>;

#[derive(Error, Debug)]
pub enum RasterError {
    // === Input Errors ===
    #[error("I/O error for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to fetch raster: {0}")]
    Download(#[from] DownloadError),

    #[error("Invalid TIFF: {0}")]
    Tiff(String),

    #[error("NetCDF error: {0}")]
    NetCdf(String),

    #[error("Missing required data: {0}")]
    MissingData(String),

    #[error("Unsupported raster format for {source_name}")]
    UnsupportedFormat { source_name: String },

    #[error("Invalid grid: {0}")]
    InvalidGrid(String),

    // === Assembly Errors ===
    #[error("Incompatible grids: {0}")]
    Incompatible(String),

    #[error("Cannot normalise longitudes: {0}")]
    Rotation(String),

    #[error("CRS mismatch: grid is {grid}, geometry is {geometry}")]
    CrsMismatch { grid: String, geometry: String },

    #[error("Grid extent {grid:?} does not overlap {geometry:?}")]
    NoOverlap { grid: [f64; 4], geometry: [f64; 4] },

    #[error("Empty input: {0}")]
    Empty(String),

    #[error(transparent)]
    Common(#[from] CommonError),
}

impl RasterError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        RasterError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// True for errors caused by the caller's configuration rather than the data.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            RasterError::Incompatible(_)
                | RasterError::CrsMismatch { .. }
                | RasterError::UnsupportedFormat { .. }
        )
    }
}

impl From<tiff::TiffError> for RasterError {
    fn from(e: tiff::TiffError) -> Self {
        RasterError::Tiff(e.to_string())
    }
}
