//! SpatioTemporal Asset Catalog (STAC) API protocol types.
//!
//! This crate covers the client side of the STAC API subset the workflow
//! uses:
//! - Core: landing links, `GET /collections`
//! - Item Search: `POST /search` with `collections`, `intersects`,
//!   `datetime` and `limit`
//! - Query extension: attribute equality (`{"attr": {"eq": value}}`)
//! - Paging through `next` links (GET, or POST with optional `merge`)
//!
//! It also evaluates the same predicates locally, so callers can verify
//! that every item a server returns actually satisfies the search.
//!
//! # Example
//!
//! ```rust
//! use stac_protocol::{AttributeFilter, ItemSearch};
//!
//! let search = ItemSearch::new(["cil-gdpcmip6"])
//!     .filter(AttributeFilter::eq("cmip6:model", "ACCESS-CM2"))
//!     .limit(50);
//! let body = search.to_params().unwrap();
//! assert_eq!(body.limit, Some(50));
//! ```

pub mod asset;
pub mod collection;
pub mod error;
pub mod filter;
pub mod item;
pub mod link;
pub mod search;

// Re-export commonly used types
pub use asset::{Asset, AssetFormat};
pub use collection::{Collection, CollectionList};
pub use error::ProtocolError;
pub use filter::{AttributeFilter, FilterMismatch, ItemPredicate, ItemSearch};
pub use item::{ItemCollection, StacItem};
pub use link::Link;
pub use search::{QueryOp, SearchParams};

/// Media types seen in STAC responses and assets
pub mod media_types {
    /// GeoJSON media type
    pub const GEO_JSON: &str = "application/geo+json";
    /// JSON media type
    pub const JSON: &str = "application/json";
    /// Cloud optimized GeoTIFF
    pub const COG: &str = "image/tiff; application=geotiff; profile=cloud-optimized";
    /// Plain GeoTIFF
    pub const GEOTIFF: &str = "image/tiff; application=geotiff";
    /// NetCDF
    pub const NETCDF: &str = "application/netcdf";
}
