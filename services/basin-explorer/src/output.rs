//! Files written by a run.
//!
//! ```text
//! <output_dir>/
//!   basin.geojson, rivers.geojson     lon/lat vectors
//!   <layer>.png                       static map with legend and overlays
//!   <layer>_overlay.png               colour-mapped cells for the web map
//!   <layer>.tif                       clipped grid
//!   <layer>.json                      LayerSummary
//!   map.html                          Leaflet map of everything above
//!   summary.json                      RunSummary
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use geo::{Coord, LineString};
use serde::Serialize;
use tracing::{debug, info};

use basin_common::crs::CrsParseError;
use basin_common::CrsCode;
use raster::{write_geotiff, GridStats};
use renderer::{
    encode_image, render_raster_rgba, Legend, MapContent, Overlay, RasterLayer, StaticMap, ValueRange, VectorLayer,
    WebMap,
};
use vector::export::{basin_collection, rivers_collection, write_feature_collection};
use vector::{Basin, RiverNetwork};

use crate::config::RenderConfig;
use crate::error::{PipelineResult, Stage, StageContext};
use crate::pipeline::{BasinSelection, LayerProduct, Rivers, RiversStatus};

pub const BASIN_FILE: &str = "basin.geojson";
pub const RIVERS_FILE: &str = "rivers.geojson";
pub const MAP_FILE: &str = "map.html";
pub const SUMMARY_FILE: &str = "summary.json";

#[derive(Debug, Clone, Serialize)]
pub struct LayerSummary {
    pub name: String,
    pub title: String,
    pub collection: String,
    pub asset: String,
    pub items: Vec<String>,
    pub crs: String,
    pub bbox: [f64; 4],
    pub width: usize,
    pub height: usize,
    /// Layer labels of the written grid, e.g. the reduction applied.
    pub labels: Vec<String>,
    pub stats: GridStats,
    pub colormap: String,
    pub units: Option<String>,
    pub range: ValueRange,
    /// File names relative to the output directory.
    pub outputs: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BasinSummary {
    pub label: String,
    pub record: usize,
    pub crs: String,
    /// Lon/lat bounds.
    pub bbox: Option<[f64; 4]>,
    pub attributes: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RiversSummary {
    pub status: RiversStatus,
    pub ways: usize,
    pub names: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub output_dir: PathBuf,
    pub basin: BasinSummary,
    pub rivers: RiversSummary,
    pub layers: Vec<LayerSummary>,
    pub files: Vec<PathBuf>,
}

/// Accumulates per-layer outputs and the web map for one run.
pub struct OutputWriter {
    dir: PathBuf,
    render: RenderConfig,
    static_map: StaticMap,
    web_map: WebMap,
    layers: Vec<LayerSummary>,
    files: Vec<PathBuf>,
}

impl OutputWriter {
    pub fn create(dir: &Path, render: &RenderConfig) -> PipelineResult<Self> {
        std::fs::create_dir_all(dir).stage(Stage::Setup, || format!("output_dir={}", dir.display()))?;
        let static_map = StaticMap::new(render.static_map.clone());
        if !static_map.has_font() {
            info!("No TrueType font found, static maps are drawn without labels");
        }
        Ok(Self {
            dir: dir.to_path_buf(),
            render: render.clone(),
            static_map,
            web_map: WebMap::new(render.web_map.clone()),
            layers: Vec::new(),
            files: Vec::new(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// GeoJSON for the basin and rivers, also added to the web map.
    pub fn write_vectors(&mut self, selection: &BasinSelection, rivers: &Rivers) -> PipelineResult<()> {
        let params = || format!("output_dir={}", self.dir.display());

        let basin = basin_collection(&lonlat_basin(selection));
        let path = self.dir.join(BASIN_FILE);
        write_feature_collection(&path, &basin).stage(Stage::Export, params)?;
        self.files.push(path);

        let network = rivers_collection(&rivers.network);
        let path = self.dir.join(RIVERS_FILE);
        write_feature_collection(&path, &network).stage(Stage::Export, params)?;
        self.files.push(path);

        self.web_map.add_vector(VectorLayer::new(
            "Basin",
            basin,
            self.render.basin_color.clone(),
            self.render.basin_width,
        ));
        if !rivers.network.is_empty() {
            self.web_map.add_vector(VectorLayer::new(
                "Rivers",
                network,
                self.render.river_color.clone(),
                self.render.river_width,
            ));
        }
        debug!(ways = rivers.network.len(), "Wrote vector outputs");
        Ok(())
    }

    /// Static map, web overlay, GeoTIFF and summary for one layer.
    pub fn write_layer(
        &mut self,
        product: &LayerProduct,
        selection: &BasinSelection,
        rivers: &Rivers,
    ) -> PipelineResult<()> {
        let layer = &product.config;
        let grid = &product.grid;
        let title = layer.title();
        let dir = self.dir.display().to_string();
        let params = || format!("layer={} output_dir={}", layer.name, dir);

        let outline = selection.basin.footprint.to_crs(grid.crs).stage(Stage::Render, params)?;
        let mut overlays = vec![Overlay::outline(
            "basin",
            outline.geometry,
            self.render.basin_rgba(),
            self.render.basin_width,
        )];
        if !rivers.network.is_empty() {
            let lines = river_lines(&rivers.network, grid.crs).stage(Stage::Render, params)?;
            overlays.push(Overlay::lines("rivers", lines, self.render.river_rgba(), self.render.river_width));
        }

        let map_png = self
            .static_map
            .render_png(&MapContent {
                grid,
                colormap: &product.colormap,
                range: &product.range,
                overlays: &overlays,
                title: Some(&title),
            })
            .stage(Stage::Render, params)?;
        let overlay_png = render_raster_rgba(grid, &product.colormap, &product.range)
            .and_then(|image| encode_image(&image))
            .stage(Stage::Render, params)?;

        let map_name = format!("{}.png", layer.name);
        let overlay_name = format!("{}_overlay.png", layer.name);
        let tif_name = format!("{}.tif", layer.name);
        let json_name = format!("{}.json", layer.name);

        self.write_file(&map_name, &map_png).stage(Stage::Export, params)?;
        self.write_file(&overlay_name, &overlay_png).stage(Stage::Export, params)?;
        let tif_path = self.dir.join(&tif_name);
        write_geotiff(grid, &tif_path).stage(Stage::Export, params)?;
        self.files.push(tif_path);

        let legend = Legend::new(title.clone(), &product.colormap, product.range);
        let raster = RasterLayer::from_grid(title.clone(), overlay_name.clone(), grid, legend).stage(Stage::Render, params)?;
        self.web_map.add_raster(raster);

        let summary = LayerSummary {
            name: layer.name.clone(),
            title,
            collection: layer.collection.clone(),
            asset: layer.asset.clone(),
            items: product.items.clone(),
            crs: grid.crs.to_string(),
            bbox: grid.bbox().to_array(),
            width: grid.width,
            height: grid.height,
            labels: grid.labels.clone(),
            stats: product.stats,
            colormap: product.colormap.name.clone(),
            units: product.colormap.units.clone(),
            range: product.range,
            outputs: vec![map_name, overlay_name, tif_name, json_name.clone()],
        };
        let json = serde_json::to_vec_pretty(&summary).stage(Stage::Export, params)?;
        self.write_file(&json_name, &json).stage(Stage::Export, params)?;

        info!(layer = %layer.name, dir = %dir, "Wrote layer outputs");
        self.layers.push(summary);
        Ok(())
    }

    /// Write the web map and the run summary.
    pub fn finish(mut self, selection: &BasinSelection, rivers: &Rivers) -> PipelineResult<RunSummary> {
        let params = || format!("output_dir={}", self.dir.display());

        let map_path = self.dir.join(MAP_FILE);
        self.web_map.write(&map_path).stage(Stage::Export, params)?;
        self.files.push(map_path);

        let summary_path = self.dir.join(SUMMARY_FILE);
        self.files.push(summary_path.clone());

        let basin = &selection.basin;
        let summary = RunSummary {
            output_dir: self.dir.clone(),
            basin: BasinSummary {
                label: basin.label(),
                record: basin.index,
                crs: basin.footprint.crs.to_string(),
                bbox: selection.lonlat.bbox().map(|b| b.to_array()),
                attributes: basin.attributes.clone(),
            },
            rivers: RiversSummary {
                status: rivers.status,
                ways: rivers.network.len(),
                names: rivers.network.names().into_iter().map(str::to_string).collect(),
            },
            layers: std::mem::take(&mut self.layers),
            files: std::mem::take(&mut self.files),
        };

        let json = serde_json::to_vec_pretty(&summary).stage(Stage::Export, params)?;
        std::fs::write(&summary_path, json).stage(Stage::Export, params)?;
        Ok(summary)
    }

    fn write_file(&mut self, name: &str, bytes: &[u8]) -> std::io::Result<()> {
        let path = self.dir.join(name);
        std::fs::write(&path, bytes)?;
        self.files.push(path);
        Ok(())
    }
}

fn lonlat_basin(selection: &BasinSelection) -> Basin {
    Basin {
        footprint: selection.lonlat.clone(),
        ..selection.basin.clone()
    }
}

/// River geometries (lon/lat) in `crs`.
fn river_lines(network: &RiverNetwork, crs: CrsCode) -> Result<Vec<LineString<f64>>, CrsParseError> {
    network
        .features
        .iter()
        .map(|river| {
            river
                .geometry
                .coords()
                .map(|c| {
                    CrsCode::Epsg4326
                        .convert_point(c.x, c.y, crs)
                        .map(|(x, y)| Coord { x, y })
                })
                .collect::<Result<Vec<_>, _>>()
                .map(LineString::new)
        })
        .collect()
}
