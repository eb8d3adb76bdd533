//! STAC catalog access for the basin workflow.
//!
//! - [`client`]: `GET /collections` and lazy `POST /search` pagination
//! - [`signing`]: provider-specific URL signing behind [`AssetSigner`]
//! - [`resolver`]: turns items into dereferenceable URLs or local files

pub mod client;
pub mod error;
pub mod resolver;
pub mod signing;

pub use client::{ItemStream, StacClient, StacClientOptions};
pub use error::{CatalogError, CatalogResult};
pub use resolver::{AccessMode, AssetResolver, ItemSelection, RasterSource, ResolvedAsset};
pub use signing::{
    detect_provider, AssetSigner, NoopSigner, PlanetaryComputerSigner, SignerRegistry,
    PROVIDER_NONE, PROVIDER_PLANETARY_COMPUTER,
};
