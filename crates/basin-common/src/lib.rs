//! Common types and utilities shared across all basin-explorer crates.

pub mod bbox;
pub mod crs;
pub mod download;
pub mod error;
pub mod footprint;
pub mod time;

pub use bbox::BoundingBox;
pub use crs::CrsCode;
pub use download::{DownloadConfig, DownloadManager, OverwritePolicy};
pub use error::{CommonError, CommonResult, DownloadError};
pub use footprint::Footprint;
pub use time::DateRange;
