//! Basin explorer workflow library.
//!
//! Picks the river basin containing a point from a zipped shapefile, fetches
//! the named rivers around it from Overpass, searches a STAC catalog for
//! raster layers covering the basin, clips them to the basin polygon and
//! writes static maps, GeoTIFFs, GeoJSON and a Leaflet web map.

pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;

pub use config::WorkflowConfig;
pub use error::{PipelineError, PipelineResult, Stage};
pub use output::RunSummary;
pub use pipeline::Pipeline;
