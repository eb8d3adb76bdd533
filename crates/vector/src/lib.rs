//! Vector inputs for the basin workflow.
//!
//! - [`archive`]: download a zipped shapefile and extract its members
//! - [`boundary`]: read basin polygons and pick the one containing a point
//! - [`overpass`]: fetch named rivers from an Overpass API endpoint
//! - [`export`]: GeoJSON output for basins and rivers

pub mod archive;
pub mod boundary;
pub mod error;
pub mod export;
pub mod overpass;
pub mod prj;

pub use archive::{ArchiveFetcher, ExtractedArchive};
pub use boundary::{read_basins, Basin, BasinLayer, SelectionPolicy};
pub use error::{VectorError, VectorResult};
pub use overpass::{NameFilter, OverpassClient, OverpassOptions, RiverFeature, RiverNetwork, TagFilter};
