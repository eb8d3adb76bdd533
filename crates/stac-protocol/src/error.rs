//! STAC protocol error types.

use thiserror::Error;

/// Errors raised while building or interpreting STAC documents.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Invalid item geometry for '{item}': {message}")]
    InvalidGeometry { item: String, message: String },

    #[error("Invalid search parameter '{param}': {message}")]
    InvalidParameter { param: String, message: String },

    #[error(transparent)]
    Common(#[from] basin_common::CommonError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
