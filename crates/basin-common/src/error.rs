//! Error types shared by the basin-explorer crates.

use thiserror::Error;

/// Result type alias using CommonError.
pub type CommonResult<T> = Result<T, CommonError>;

/// Validation errors for the shared value types.
#[derive(Debug, Error)]
pub enum CommonError {
    // === Parameter Errors ===
    #[error("Invalid parameter value for '{param}': {message}")]
    InvalidParameter { param: String, message: String },

    #[error("Invalid CRS: {0}")]
    InvalidCrs(String),

    #[error("Invalid BBOX: {0}")]
    InvalidBbox(String),

    #[error("Invalid time specification: {0}")]
    InvalidTime(String),

    #[error("Empty datetime range: start {start} is after end {end}")]
    EmptyDateRange { start: String, end: String },

    // === Geometry Errors ===
    #[error("Unsupported geometry: {0}")]
    UnsupportedGeometry(String),

    #[error("CRS mismatch: expected {expected}, got {actual}")]
    CrsMismatch { expected: String, actual: String },
}

/// Errors raised while fetching a remote file to local storage.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("HTTP request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("Request to {url} timed out")]
    Timeout { url: String },

    #[error("I/O error for {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to build HTTP client: {0}")]
    Client(String),

    #[error("Download path {path} escapes the storage directory")]
    UnsafePath { path: String },
}

impl DownloadError {
    pub(crate) fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            DownloadError::Timeout {
                url: url.to_string(),
            }
        } else {
            DownloadError::Request {
                url: url.to_string(),
                source: err,
            }
        }
    }

    pub(crate) fn io(path: &std::path::Path, err: std::io::Error) -> Self {
        DownloadError::Io {
            path: path.display().to_string(),
            source: err,
        }
    }

    /// Whether the failure was a request timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, DownloadError::Timeout { .. })
    }
}

impl From<serde_json::Error> for CommonError {
    fn from(err: serde_json::Error) -> Self {
        CommonError::InvalidParameter {
            param: "json".to_string(),
            message: err.to_string(),
        }
    }
}
