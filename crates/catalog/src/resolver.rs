//! Asset resolution: from STAC items to something a raster reader can open.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use basin_common::download::filename_from_url;
use basin_common::DownloadManager;
use stac_protocol::{AssetFormat, StacItem};

use crate::error::{CatalogError, CatalogResult};
use crate::signing::AssetSigner;

/// How resolved assets are handed to the raster stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessMode {
    /// Signed URL, read remotely.
    #[default]
    Stream,
    /// Downloaded under the storage directory first.
    Download,
}

/// Which of the matching items a layer uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemSelection {
    /// Only the first item in catalog order.
    First,
    /// Every item, to be mosaicked.
    #[default]
    All,
}

impl ItemSelection {
    pub fn apply<'a>(&self, items: &'a [StacItem]) -> &'a [StacItem] {
        match self {
            ItemSelection::First => &items[..items.len().min(1)],
            ItemSelection::All => items,
        }
    }
}

/// Where the bytes of a resolved asset live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RasterSource {
    Url(String),
    Path(PathBuf),
}

impl RasterSource {
    /// Display form used in logs and error messages.
    pub fn describe(&self) -> String {
        match self {
            RasterSource::Url(url) => url.split('?').next().unwrap_or(url).to_string(),
            RasterSource::Path(path) => path.display().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedAsset {
    pub item_id: String,
    pub collection: Option<String>,
    pub asset_key: String,
    pub source: RasterSource,
    pub media_type: Option<String>,
    pub format: AssetFormat,
}

/// Signs asset hrefs and optionally downloads them.
pub struct AssetResolver {
    signer: Arc<dyn AssetSigner>,
    downloads: DownloadManager,
}

impl AssetResolver {
    pub fn new(signer: Arc<dyn AssetSigner>, downloads: DownloadManager) -> Self {
        Self { signer, downloads }
    }

    /// Resolve `asset_key` on each item, in order.
    ///
    /// Any item lacking the asset fails the whole call.
    #[instrument(skip(self, items), fields(items = items.len()))]
    pub async fn resolve(
        &self,
        items: &[StacItem],
        asset_key: &str,
        mode: AccessMode,
    ) -> CatalogResult<Vec<ResolvedAsset>> {
        let mut resolved = Vec::with_capacity(items.len());
        for item in items {
            resolved.push(self.resolve_one(item, asset_key, mode).await?);
        }
        info!(count = resolved.len(), mode = ?mode, "Resolved assets");
        Ok(resolved)
    }

    pub async fn resolve_one(
        &self,
        item: &StacItem,
        asset_key: &str,
        mode: AccessMode,
    ) -> CatalogResult<ResolvedAsset> {
        let asset = item.asset(asset_key).ok_or_else(|| CatalogError::MissingAsset {
            item: item.id.clone(),
            asset: asset_key.to_string(),
            available: item.assets.keys().cloned().collect::<Vec<_>>().join(", "),
        })?;

        let signed = self.signer.sign(&asset.href).await?;

        let source = match mode {
            AccessMode::Stream => RasterSource::Url(signed),
            AccessMode::Download => {
                let relative = download_path(item, asset_key, &asset.href);
                let outcome = self.downloads.download(&signed, &relative).await?;
                debug!(
                    path = %outcome.path.display(),
                    skipped = outcome.skipped,
                    "Asset available locally"
                );
                RasterSource::Path(outcome.path)
            }
        };

        Ok(ResolvedAsset {
            item_id: item.id.clone(),
            collection: item.collection.clone(),
            asset_key: asset_key.to_string(),
            source,
            media_type: asset.media_type.clone(),
            format: asset.format(),
        })
    }
}

/// `<collection>/<item>/<file name>` under the download base directory.
fn download_path(item: &StacItem, asset_key: &str, href: &str) -> PathBuf {
    let collection = item.collection.as_deref().unwrap_or("items");
    let file = filename_from_url(href).unwrap_or_else(|| asset_key.to_string());
    Path::new(&sanitize(collection))
        .join(sanitize(&item.id))
        .join(sanitize(&file))
}

/// A single plain path component: separators replaced, and empty or
/// dot-only names (`.`, `..`) turned into underscores.
fn sanitize(component: &str) -> String {
    if component.chars().all(|c| c == '.') {
        return "_".repeat(component.len().max(1));
    }
    component
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' => '_',
            c => c,
        })
        .collect()
}
