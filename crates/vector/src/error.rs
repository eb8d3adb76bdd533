//! Error types for vector inputs.

use std::path::PathBuf;

use thiserror::Error;

use basin_common::{CommonError, DownloadError};

/// Result type for vector operations.
pub type VectorResult<T> = Result<T, VectorError>;

#[derive(Debug, Error)]
pub enum VectorError {
    // === Archive Errors ===
    #[error("Archive download failed: {0}")]
    Download(#[from] DownloadError),

    #[error("Invalid archive {path}: {message}")]
    Archive { path: PathBuf, message: String },

    #[error("No shapefile found in {0}")]
    NoShapefile(PathBuf),

    #[error("Several shapefiles found, name one of: {0}")]
    AmbiguousShapefile(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // === Shapefile Errors ===
    #[error("Failed to read shapefile {path}: {message}")]
    Shapefile { path: PathBuf, message: String },

    #[error("Unsupported projection in {path}: {wkt}")]
    UnsupportedProjection { path: PathBuf, wkt: String },

    // === Selection Errors ===
    #[error("CRS mismatch: point is {point}, layer is {layer}")]
    CrsMismatch { point: String, layer: String },

    #[error("No basin polygon contains ({lon}, {lat})")]
    NoContainingPolygon { lon: f64, lat: f64 },

    #[error("{count} basin polygons contain the point (records {records:?})")]
    AmbiguousSelection { count: usize, records: Vec<usize> },

    // === Overpass Errors ===
    #[error("Overpass request to {url} timed out")]
    Timeout { url: String },

    #[error("Overpass request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Overpass returned HTTP {status}: {body}")]
    Overpass { status: u16, body: String },

    #[error("Failed to decode Overpass response: {0}")]
    Decode(String),

    #[error("Failed to build HTTP client: {0}")]
    Client(String),

    // === Other ===
    #[error(transparent)]
    Common(#[from] CommonError),

    #[error("Failed to write GeoJSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl VectorError {
    /// Whether the workflow may continue without the data this error concerns.
    pub fn is_timeout(&self) -> bool {
        matches!(self, VectorError::Timeout { .. })
    }

    pub(crate) fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            VectorError::Timeout {
                url: url.to_string(),
            }
        } else {
            VectorError::Transport {
                url: url.to_string(),
                source: err,
            }
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        VectorError::Io {
            path: path.into(),
            source,
        }
    }
}
