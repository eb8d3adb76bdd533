//! Error types for catalog access.

use thiserror::Error;

use basin_common::DownloadError;
use stac_protocol::ProtocolError;

/// Result type for catalog operations.
pub type CatalogResult<T> = Result<T, CatalogError>;

#[derive(Debug, Error)]
pub enum CatalogError {
    // === Transport Errors ===
    #[error("Request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Request to {url} timed out")]
    Timeout { url: String },

    #[error("HTTP {status} from {url}: {body}")]
    Status { url: String, status: u16, body: String },

    #[error("Failed to decode response from {url}: {message}")]
    Decode { url: String, message: String },

    #[error("Failed to build HTTP client: {0}")]
    Client(String),

    // === Query Errors ===
    #[error("Invalid search: {0}")]
    InvalidSearch(#[from] ProtocolError),

    // === Resolution Errors ===
    #[error("Signing failed for {href}: {message}")]
    Signing { href: String, message: String },

    #[error("No signer registered for provider '{0}'")]
    UnknownProvider(String),

    #[error("Item '{item}' has no asset named '{asset}' (available: {available})")]
    MissingAsset {
        item: String,
        asset: String,
        available: String,
    },

    #[error("Asset download failed: {0}")]
    Download(#[from] DownloadError),
}

impl CatalogError {
    pub(crate) fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            CatalogError::Timeout {
                url: url.to_string(),
            }
        } else {
            CatalogError::Transport {
                url: url.to_string(),
                source: err,
            }
        }
    }
}
