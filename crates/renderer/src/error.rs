//! Error types for rendering.

use std::path::{Path, PathBuf};

use thiserror::Error;

pub type RenderResult<T> = Result<T, RenderError>;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("unknown colormap '{0}' (built-ins: terrain, viridis, coolwarm, blues)")]
    UnknownColormap(String),

    #[error("style '{name}': {message}")]
    Style { name: String, message: String },

    #[error("invalid value range {min}..{max}")]
    InvalidRange { min: f64, max: f64 },

    #[error("cannot render grid: {0}")]
    InvalidInput(String),

    #[error("PNG encoding failed: {0}")]
    Png(String),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Raster(#[from] raster::RasterError),
}

impl RenderError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn style(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Style {
            name: name.into(),
            message: message.into(),
        }
    }
}
