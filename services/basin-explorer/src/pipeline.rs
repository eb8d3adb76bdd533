//! The basin workflow: boundary, rivers, then one raster product per layer.
//!
//! Stages run strictly in order and the first failure aborts the run, except
//! a timed out river query, which is logged and leaves the map without rivers.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{info, instrument, warn};

use basin_common::{CrsCode, DownloadManager, Footprint};
use catalog::{
    AssetResolver, AssetSigner, CatalogResult, PlanetaryComputerSigner, SignerRegistry, StacClient,
    PROVIDER_PLANETARY_COMPUTER,
};
use raster::{apply_linear, clip, mosaic, reduce_layers, GridStats, RasterGrid, RasterReader};
use renderer::{Colormap, ValueRange};
use vector::{ArchiveFetcher, Basin, OverpassClient, RiverNetwork};

use crate::config::{CatalogConfig, LayerConfig, WorkflowConfig};
use crate::error::{PipelineError, PipelineResult, Stage, StageContext, StageError};
use crate::output::{OutputWriter, RunSummary};

/// The basin picked by the boundary stage.
#[derive(Debug, Clone)]
pub struct BasinSelection {
    /// As read, in the basin layer's CRS.
    pub basin: Basin,
    /// The same footprint in lon/lat.
    pub lonlat: Footprint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RiversStatus {
    Disabled,
    Fetched,
    TimedOut,
}

#[derive(Debug, Clone)]
pub struct Rivers {
    pub network: RiverNetwork,
    pub status: RiversStatus,
}

impl Rivers {
    fn empty(status: RiversStatus) -> Self {
        Self {
            network: RiverNetwork::default(),
            status,
        }
    }
}

/// A clipped, single-layer raster ready for rendering.
#[derive(Debug, Clone)]
pub struct LayerProduct {
    pub config: LayerConfig,
    /// Ids of the items mosaicked into the grid.
    pub items: Vec<String>,
    pub grid: RasterGrid,
    pub stats: GridStats,
    pub colormap: Colormap,
    pub range: ValueRange,
}

pub struct Pipeline {
    config: WorkflowConfig,
    archives: ArchiveFetcher,
    overpass: Option<OverpassClient>,
    catalog: StacClient,
    resolver: AssetResolver,
    reader: RasterReader,
}

impl Pipeline {
    /// Build every client the workflow needs. Nothing is fetched yet.
    pub fn new(config: WorkflowConfig) -> PipelineResult<Self> {
        let params = || {
            format!(
                "catalog={} storage={}",
                config.catalog.url,
                config.storage.base_dir.display()
            )
        };

        let downloads = DownloadManager::new(config.download_config()).stage(Stage::Setup, params)?;
        let catalog =
            StacClient::new(config.catalog.url.clone(), config.stac_options()).stage(Stage::Setup, params)?;
        let timeout = Duration::from_secs(config.network.request_timeout_secs);
        let signer = signer_for(&config.catalog, timeout).stage(Stage::Setup, params)?;
        let overpass = if config.rivers.enabled {
            Some(OverpassClient::new(config.rivers.overpass_options()).stage(Stage::Setup, params)?)
        } else {
            None
        };

        info!(
            catalog = %config.catalog.url,
            provider = signer.provider(),
            layers = config.layers.len(),
            rivers = config.rivers.enabled,
            "Pipeline ready"
        );

        Ok(Self {
            archives: ArchiveFetcher::new(downloads.clone()),
            resolver: AssetResolver::new(signer, downloads.clone()),
            reader: RasterReader::new(downloads),
            overpass,
            catalog,
            config,
        })
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    /// Run every stage and write all outputs.
    pub async fn run(&self) -> PipelineResult<RunSummary> {
        let started = Instant::now();
        let mut output = OutputWriter::create(&self.config.output_dir, &self.config.render)?;

        let selection = self.select_basin().await?;
        let rivers = self.fetch_rivers(&selection.lonlat).await?;
        output.write_vectors(&selection, &rivers)?;

        for layer in &self.config.layers {
            let product = self.build_layer(layer, &selection).await?;
            output.write_layer(&product, &selection, &rivers)?;
        }

        let summary = output.finish(&selection, &rivers)?;
        info!(
            layers = summary.layers.len(),
            files = summary.files.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Workflow complete"
        );
        Ok(summary)
    }

    /// Download the basin archive and pick the polygon containing the point.
    #[instrument(skip(self), fields(url = %self.config.boundary.url))]
    pub async fn select_basin(&self) -> PipelineResult<BasinSelection> {
        let boundary = &self.config.boundary;
        let params = || boundary.describe();

        let point_crs = CrsCode::parse(&boundary.point_crs).stage(Stage::Boundary, params)?;
        let archive = self
            .archives
            .fetch_and_extract(&boundary.url)
            .await
            .stage(Stage::Boundary, params)?;
        let shapefile = archive
            .shapefile(boundary.layer.as_deref())
            .stage(Stage::Boundary, params)?;
        let layer = vector::read_basins(&shapefile).stage(Stage::Boundary, params)?;

        let [x, y] = boundary.point;
        let basin = layer
            .select_containing(x, y, point_crs, boundary.selection)
            .stage(Stage::Boundary, params)?;
        let lonlat = basin
            .footprint
            .to_crs(CrsCode::Epsg4326)
            .stage(Stage::Boundary, params)?;

        info!(
            basin = %basin.label(),
            record = basin.index,
            crs = %layer.crs,
            candidates = layer.len(),
            "Selected basin"
        );
        Ok(BasinSelection { basin, lonlat })
    }

    /// Rivers around the basin. A timeout yields an empty network.
    #[instrument(skip(self, lonlat))]
    pub async fn fetch_rivers(&self, lonlat: &Footprint) -> PipelineResult<Rivers> {
        let Some(client) = &self.overpass else {
            info!("River fetch disabled");
            return Ok(Rivers::empty(RiversStatus::Disabled));
        };
        let rivers = &self.config.rivers;

        let bbox = lonlat
            .bbox()
            .ok_or_else(|| StageError::Invalid("basin footprint is empty".to_string()))
            .stage(Stage::Rivers, || format!("endpoint={}", rivers.endpoint))?
            .buffered(rivers.buffer);
        let params = || {
            format!(
                "endpoint={} bbox={:?} {}={} name={:?}",
                rivers.endpoint,
                bbox.to_array(),
                rivers.tag.key,
                rivers.tag.value,
                rivers.name
            )
        };

        match client.fetch_rivers(&bbox, &rivers.tag, &rivers.name).await {
            Ok(network) => {
                info!(ways = network.len(), names = ?network.names(), "Fetched rivers");
                Ok(Rivers {
                    network,
                    status: RiversStatus::Fetched,
                })
            }
            Err(e) if e.is_timeout() => {
                warn!(error = %e, "River fetch timed out, continuing without rivers");
                Ok(Rivers::empty(RiversStatus::TimedOut))
            }
            Err(e) => Err(e).stage(Stage::Rivers, params),
        }
    }

    /// Search, resolve, open, mosaic, clip and summarise one layer.
    #[instrument(skip(self, layer, selection), fields(layer = %layer.name, collection = %layer.collection))]
    pub async fn build_layer(&self, layer: &LayerConfig, selection: &BasinSelection) -> PipelineResult<LayerProduct> {
        let params = || layer.describe();

        let search = layer.search(&selection.lonlat).stage(Stage::Search, params)?;
        let items = self
            .catalog
            .search(search)
            .stage(Stage::Search, params)?
            .collect_all()
            .await
            .stage(Stage::Search, params)?;
        if items.is_empty() {
            return Err(PipelineError::no_data(Stage::Search, params()));
        }
        let selected = layer.selection.apply(&items);
        info!(found = items.len(), used = selected.len(), "Catalog search done");

        let assets = self
            .resolver
            .resolve(selected, &layer.asset, layer.access)
            .await
            .stage(Stage::Resolve, params)?;

        let options = layer.open_options();
        let mut grids = Vec::with_capacity(assets.len());
        for asset in &assets {
            let grid = self
                .reader
                .open(asset, &options)
                .await
                .stage(Stage::Open, || format!("{} source={}", params(), asset.source.describe()))?;
            grids.push(grid);
        }

        let grid = mosaic(&grids, layer.mosaic).stage(Stage::Mosaic, params)?;
        drop(grids);

        let footprint = selection.basin.footprint.to_crs(grid.crs).stage(Stage::Clip, params)?;
        let grid = clip(&grid, &footprint).stage(Stage::Clip, params)?;
        if grid.valid_count() == 0 {
            return Err(PipelineError::no_data(Stage::Clip, params()));
        }

        let grid = if grid.layers > 1 {
            reduce_layers(&grid, layer.reduce).stage(Stage::Reduce, params)?
        } else {
            grid
        };
        let grid = if layer.needs_conversion() {
            apply_linear(&grid, layer.scale, layer.offset).stage(Stage::Reduce, params)?
        } else {
            grid
        };

        let stats = GridStats::compute(&grid);
        let colormap = layer.colormap().stage(Stage::Render, params)?;
        let range = match layer.fixed_range().stage(Stage::Render, params)? {
            Some(range) => Some(range),
            None => colormap.natural_range(),
        }
        .or_else(|| ValueRange::from_stats(&stats))
        .ok_or_else(|| StageError::Invalid("no valid cells to derive a colour range".to_string()))
        .stage(Stage::Render, params)?;

        info!(
            width = grid.width,
            height = grid.height,
            valid = stats.valid,
            min = ?stats.min,
            max = ?stats.max,
            mean = ?stats.mean,
            "Layer ready"
        );

        Ok(LayerProduct {
            config: layer.clone(),
            items: selected.iter().map(|item| item.id.clone()).collect(),
            grid,
            stats,
            colormap,
            range,
        })
    }
}

/// The signer registered for the catalog's provider.
fn signer_for(catalog: &CatalogConfig, timeout: Duration) -> CatalogResult<Arc<dyn AssetSigner>> {
    let mut registry = SignerRegistry::new();
    let provider = catalog.provider();
    if provider == PROVIDER_PLANETARY_COMPUTER {
        let signer = match &catalog.sign_url {
            Some(url) => PlanetaryComputerSigner::with_endpoint(url.clone(), timeout)?,
            None => PlanetaryComputerSigner::new(timeout)?,
        };
        registry.register(Arc::new(signer));
    }
    registry.get(provider)
}
