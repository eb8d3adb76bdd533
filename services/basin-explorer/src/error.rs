//! Pipeline errors with stage context.

use std::fmt;

use thiserror::Error;

use basin_common::crs::CrsParseError;
use basin_common::{CommonError, DownloadError};
use catalog::CatalogError;
use raster::RasterError;
use renderer::RenderError;
use stac_protocol::ProtocolError;
use vector::VectorError;

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Workflow step, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Setup,
    Boundary,
    Rivers,
    Search,
    Resolve,
    Open,
    Mosaic,
    Clip,
    Reduce,
    Render,
    Export,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Setup => "setup",
            Stage::Boundary => "boundary",
            Stage::Rivers => "rivers",
            Stage::Search => "search",
            Stage::Resolve => "resolve",
            Stage::Open => "open",
            Stage::Mosaic => "mosaic",
            Stage::Clip => "clip",
            Stage::Reduce => "reduce",
            Stage::Render => "render",
            Stage::Export => "export",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Underlying failure of a stage.
#[derive(Debug, Error)]
pub enum StageError {
    #[error(transparent)]
    Vector(#[from] VectorError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Raster(#[from] RasterError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    Download(#[from] DownloadError),
    #[error(transparent)]
    Common(#[from] CommonError),
    #[error(transparent)]
    Crs(#[from] CrsParseError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("{0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{stage} stage failed [{params}]: {source}")]
    Stage {
        stage: Stage,
        params: String,
        #[source]
        source: StageError,
    },

    #[error("{stage} stage: no data available for query [{params}]")]
    NoData { stage: Stage, params: String },
}

impl PipelineError {
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::Stage { stage, .. } | PipelineError::NoData { stage, .. } => *stage,
        }
    }

    pub fn no_data(stage: Stage, params: impl Into<String>) -> Self {
        PipelineError::NoData {
            stage,
            params: params.into(),
        }
    }
}

/// Attach stage and parameters to a failing result.
pub trait StageContext<T> {
    fn stage<F, P>(self, stage: Stage, params: F) -> PipelineResult<T>
    where
        F: FnOnce() -> P,
        P: Into<String>;
}

impl<T, E> StageContext<T> for Result<T, E>
where
    E: Into<StageError>,
{
    fn stage<F, P>(self, stage: Stage, params: F) -> PipelineResult<T>
    where
        F: FnOnce() -> P,
        P: Into<String>,
    {
        self.map_err(|e| PipelineError::Stage {
            stage,
            params: params().into(),
            source: e.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_message_names_stage_params_and_cause() {
        let result: Result<(), VectorError> = Err(VectorError::NoContainingPolygon { lon: -5.0, lat: 34.0 });
        let err = result
            .stage(Stage::Boundary, || "point=(-5, 34) url=http://x/b.zip")
            .unwrap_err();
        assert_eq!(err.stage(), Stage::Boundary);
        assert_eq!(
            err.to_string(),
            "boundary stage failed [point=(-5, 34) url=http://x/b.zip]: No basin polygon contains (-5, 34)"
        );
    }

    #[test]
    fn test_no_data_message() {
        let err = PipelineError::no_data(Stage::Search, "collection=nasadem");
        assert_eq!(
            err.to_string(),
            "search stage: no data available for query [collection=nasadem]"
        );
    }
}
