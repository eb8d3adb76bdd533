//! Workflow configuration loaded from YAML.
//!
//! ```yaml
//! output_dir: out/sebou
//! storage:
//!   base_dir: data
//! boundary:
//!   url: https://example.org/hybas_af_lev06_v1c.zip
//!   point: [-5.0, 34.0]
//! catalog:
//!   url: https://planetarycomputer.microsoft.com/api/stac/v1
//! layers:
//!   - name: elevation
//!     collection: nasadem
//!     asset: elevation
//!     colormap: terrain
//! ```

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::debug;

use basin_common::{CommonResult, CrsCode, DateRange, DownloadConfig, Footprint, OverwritePolicy};
use catalog::{AccessMode, ItemSelection, StacClientOptions, PROVIDER_NONE, PROVIDER_PLANETARY_COMPUTER};
use raster::{LayerReduce, MosaicPolicy, OpenOptions};
use renderer::colormap::parse_hex_color;
use renderer::{Colormap, RenderResult, StaticMapOptions, ValueRange, WebMapOptions};
use stac_protocol::{AttributeFilter, ItemSearch};
use vector::overpass::DEFAULT_OVERPASS_URL;
use vector::{NameFilter, OverpassOptions, SelectionPolicy, TagFilter};

/// Colormap used when a layer names none.
pub const DEFAULT_COLORMAP: &str = "viridis";

/// Root of a workflow file.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    pub boundary: BoundaryConfig,
    #[serde(default)]
    pub rivers: RiversConfig,
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub layers: Vec<LayerConfig>,
    #[serde(default)]
    pub render: RenderConfig,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

/// Where downloads persist.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,
    #[serde(default)]
    pub overwrite: OverwritePolicy,
}

fn default_base_dir() -> PathBuf {
    PathBuf::from("data")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            overwrite: OverwritePolicy::default(),
        }
    }
}

/// Timeouts for catalog, signing, archive and asset requests.
#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_request_timeout() -> u64 {
    600
}

fn default_connect_timeout() -> u64 {
    30
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

/// Basin archive and the point that selects a basin.
#[derive(Debug, Clone, Deserialize)]
pub struct BoundaryConfig {
    /// Zipped shapefile URL.
    pub url: String,
    /// Shapefile stem inside the archive, when it holds several.
    #[serde(default)]
    pub layer: Option<String>,
    /// `[x, y]` in `point_crs`.
    pub point: [f64; 2],
    #[serde(default = "default_point_crs")]
    pub point_crs: String,
    #[serde(default)]
    pub selection: SelectionPolicy,
}

fn default_point_crs() -> String {
    "EPSG:4326".to_string()
}

impl BoundaryConfig {
    pub fn point_crs(&self) -> Result<CrsCode> {
        CrsCode::parse(&self.point_crs).with_context(|| format!("Invalid boundary.point_crs '{}'", self.point_crs))
    }

    pub fn describe(&self) -> String {
        format!(
            "url={} point=({}, {}) crs={}",
            self.url, self.point[0], self.point[1], self.point_crs
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RiversConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_overpass_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_overpass_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_server_timeout")]
    pub server_timeout_secs: u32,
    #[serde(default)]
    pub tag: TagFilter,
    #[serde(default)]
    pub name: NameFilter,
    /// Degrees added around the basin bbox for the query.
    #[serde(default)]
    pub buffer: f64,
}

fn default_true() -> bool {
    true
}

fn default_overpass_endpoint() -> String {
    DEFAULT_OVERPASS_URL.to_string()
}

fn default_overpass_timeout() -> u64 {
    60
}

fn default_server_timeout() -> u32 {
    50
}

impl Default for RiversConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: default_overpass_endpoint(),
            timeout_secs: default_overpass_timeout(),
            server_timeout_secs: default_server_timeout(),
            tag: TagFilter::default(),
            name: NameFilter::default(),
            buffer: 0.0,
        }
    }
}

impl RiversConfig {
    pub fn overpass_options(&self) -> OverpassOptions {
        OverpassOptions {
            endpoint: self.endpoint.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
            server_timeout_secs: self.server_timeout_secs,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogConfig {
    /// STAC API root.
    pub url: String,
    /// Signing provider; guessed from the URL when unset.
    #[serde(default)]
    pub provider: Option<String>,
    /// Override of the Planetary Computer signing endpoint.
    #[serde(default)]
    pub sign_url: Option<String>,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default)]
    pub max_items: Option<usize>,
}

fn default_page_size() -> u32 {
    100
}

impl CatalogConfig {
    pub fn provider(&self) -> &str {
        self.provider
            .as_deref()
            .unwrap_or_else(|| catalog::detect_provider(&self.url))
    }
}

/// One raster product of the run.
#[derive(Debug, Clone, Deserialize)]
pub struct LayerConfig {
    /// Output file stem.
    pub name: String,
    pub collection: String,
    pub asset: String,
    /// STAC datetime interval, e.g. `2030-01-01/2030-12-31`.
    #[serde(default)]
    pub datetime: Option<String>,
    /// Property equality filters.
    #[serde(default)]
    pub query: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub selection: ItemSelection,
    #[serde(default)]
    pub access: AccessMode,
    #[serde(default)]
    pub mosaic: MosaicPolicy,
    #[serde(default)]
    pub variable: Option<String>,
    #[serde(default)]
    pub time_range: Option<(usize, usize)>,
    #[serde(default)]
    pub reduce: LayerReduce,
    /// Applied as `value * scale + offset` after clipping.
    #[serde(default = "default_scale")]
    pub scale: f32,
    #[serde(default)]
    pub offset: f32,
    #[serde(default)]
    pub colormap: Option<String>,
    #[serde(default)]
    pub style_file: Option<PathBuf>,
    #[serde(default)]
    pub style: Option<String>,
    /// Fixed `[min, max]` for colouring; data range otherwise.
    #[serde(default)]
    pub range: Option<[f64; 2]>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub units: Option<String>,
}

fn default_scale() -> f32 {
    1.0
}

impl LayerConfig {
    pub fn date_range(&self) -> CommonResult<Option<DateRange>> {
        self.datetime.as_deref().map(DateRange::parse).transpose()
    }

    pub fn filters(&self) -> Vec<AttributeFilter> {
        self.query
            .iter()
            .map(|(k, v)| AttributeFilter::eq(k.clone(), v.clone()))
            .collect()
    }

    /// Search for items of this layer intersecting `footprint` (lon/lat).
    pub fn search(&self, footprint: &Footprint) -> CommonResult<ItemSearch> {
        let mut search = ItemSearch::new([self.collection.as_str()]).intersects(footprint.clone());
        if let Some(range) = self.date_range()? {
            search = search.datetime(range);
        }
        for filter in self.filters() {
            search = search.filter(filter);
        }
        Ok(search)
    }

    pub fn open_options(&self) -> OpenOptions {
        OpenOptions {
            variable: self.variable.clone(),
            time_range: self.time_range,
        }
    }

    pub fn colormap(&self) -> RenderResult<Colormap> {
        let mut colormap = match &self.style_file {
            Some(path) => Colormap::from_style_file(path, self.style.as_deref().unwrap_or(&self.name))?,
            None => Colormap::named(self.colormap.as_deref().unwrap_or(DEFAULT_COLORMAP))?,
        };
        if self.units.is_some() {
            colormap.units = self.units.clone();
        }
        Ok(colormap)
    }

    pub fn fixed_range(&self) -> RenderResult<Option<ValueRange>> {
        self.range.map(|[min, max]| ValueRange::new(min, max)).transpose()
    }

    pub fn needs_conversion(&self) -> bool {
        self.scale != 1.0 || self.offset != 0.0
    }

    pub fn title(&self) -> String {
        self.title.clone().unwrap_or_else(|| self.name.clone())
    }

    pub fn describe(&self) -> String {
        let mut parts = vec![
            format!("layer={}", self.name),
            format!("collection={}", self.collection),
            format!("asset={}", self.asset),
        ];
        if let Some(dt) = &self.datetime {
            parts.push(format!("datetime={}", dt));
        }
        for (k, v) in &self.query {
            parts.push(format!("{}={}", k, v));
        }
        parts.join(" ")
    }
}

fn default_basin_color() -> String {
    "#000000".to_string()
}

fn default_river_color() -> String {
    "#1F78B4".to_string()
}

fn default_basin_width() -> f32 {
    2.0
}

fn default_river_width() -> f32 {
    1.5
}

#[derive(Debug, Clone, Deserialize)]
pub struct RenderConfig {
    #[serde(default)]
    pub static_map: StaticMapOptions,
    #[serde(default)]
    pub web_map: WebMapOptions,
    #[serde(default = "default_basin_color")]
    pub basin_color: String,
    #[serde(default = "default_river_color")]
    pub river_color: String,
    #[serde(default = "default_basin_width")]
    pub basin_width: f32,
    #[serde(default = "default_river_width")]
    pub river_width: f32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            static_map: StaticMapOptions::default(),
            web_map: WebMapOptions::default(),
            basin_color: default_basin_color(),
            river_color: default_river_color(),
            basin_width: default_basin_width(),
            river_width: default_river_width(),
        }
    }
}

impl RenderConfig {
    pub fn basin_rgba(&self) -> [u8; 4] {
        parse_hex_color(&self.basin_color).unwrap_or([0, 0, 0, 255])
    }

    pub fn river_rgba(&self) -> [u8; 4] {
        parse_hex_color(&self.river_color).unwrap_or([0x1F, 0x78, 0xB4, 255])
    }
}

impl WorkflowConfig {
    /// Load and validate a workflow file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read workflow file: {}", path.display()))?;
        let config = Self::from_yaml(&content)
            .with_context(|| format!("Invalid workflow file: {}", path.display()))?;
        debug!(path = %path.display(), layers = config.layers.len(), "Loaded workflow config");
        Ok(config)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: WorkflowConfig = serde_yaml::from_str(yaml).context("Failed to parse workflow YAML")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that would only fail mid-run.
    pub fn validate(&self) -> Result<()> {
        if self.boundary.url.trim().is_empty() {
            bail!("boundary.url is empty");
        }
        if !self.boundary.point.iter().all(|v| v.is_finite()) {
            bail!("boundary.point must be two finite numbers");
        }
        self.boundary.point_crs()?;

        if self.catalog.url.trim().is_empty() {
            bail!("catalog.url is empty");
        }
        let provider = self.catalog.provider();
        if provider != PROVIDER_NONE && provider != PROVIDER_PLANETARY_COMPUTER {
            bail!(
                "catalog.provider '{}' unknown (expected '{}' or '{}')",
                provider,
                PROVIDER_NONE,
                PROVIDER_PLANETARY_COMPUTER
            );
        }
        if self.catalog.page_size == 0 {
            bail!("catalog.page_size must be positive");
        }

        if !self.rivers.buffer.is_finite() || self.rivers.buffer < 0.0 {
            bail!("rivers.buffer must be a non-negative number");
        }

        for (key, value) in [
            ("render.basin_color", &self.render.basin_color),
            ("render.river_color", &self.render.river_color),
        ] {
            if parse_hex_color(value).is_none() {
                bail!("{} '{}' is not a #RRGGBB colour", key, value);
            }
        }

        let mut names = HashSet::new();
        for layer in &self.layers {
            validate_layer(layer)?;
            if !names.insert(layer.name.as_str()) {
                bail!("Duplicate layer name '{}'", layer.name);
            }
        }
        Ok(())
    }

    pub fn download_config(&self) -> DownloadConfig {
        DownloadConfig {
            base_dir: self.storage.base_dir.clone(),
            overwrite: self.storage.overwrite,
            request_timeout: Duration::from_secs(self.network.request_timeout_secs),
            connect_timeout: Duration::from_secs(self.network.connect_timeout_secs),
        }
    }

    pub fn stac_options(&self) -> StacClientOptions {
        StacClientOptions {
            request_timeout: Duration::from_secs(self.network.request_timeout_secs),
            connect_timeout: Duration::from_secs(self.network.connect_timeout_secs),
            page_size: self.catalog.page_size,
            max_items: self.catalog.max_items,
        }
    }

    pub fn layer(&self, name: &str) -> Option<&LayerConfig> {
        self.layers.iter().find(|l| l.name == name)
    }
}

fn validate_layer(layer: &LayerConfig) -> Result<()> {
    let name = &layer.name;
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
        bail!("Layer name '{}' must be non-empty and use only [A-Za-z0-9_-]", name);
    }
    if layer.collection.trim().is_empty() || layer.asset.trim().is_empty() {
        bail!("Layer '{}': collection and asset are required", name);
    }
    layer
        .date_range()
        .with_context(|| format!("Layer '{}': invalid datetime", name))?;
    if let Some((start, end)) = layer.time_range {
        if start >= end {
            bail!("Layer '{}': time_range [{}, {}) is empty", name, start, end);
        }
    }
    if !layer.scale.is_finite() || !layer.offset.is_finite() {
        bail!("Layer '{}': scale and offset must be finite", name);
    }
    layer
        .fixed_range()
        .with_context(|| format!("Layer '{}': invalid range", name))?;
    if layer.style_file.is_none() {
        layer
            .colormap()
            .with_context(|| format!("Layer '{}': invalid colormap", name))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
boundary:
  url: https://example.org/hybas.zip
  point: [-5.0, 34.0]
catalog:
  url: https://planetarycomputer.microsoft.com/api/stac/v1
layers:
  - name: elevation
    collection: nasadem
    asset: elevation
    colormap: terrain
"#;

    #[test]
    fn test_defaults() {
        let config = WorkflowConfig::from_yaml(MINIMAL).unwrap();
        assert_eq!(config.output_dir, PathBuf::from("output"));
        assert_eq!(config.storage.base_dir, PathBuf::from("data"));
        assert_eq!(config.storage.overwrite, OverwritePolicy::Skip);
        assert!(config.rivers.enabled);
        assert_eq!(config.rivers.tag, TagFilter::default());
        assert_eq!(config.catalog.provider(), PROVIDER_PLANETARY_COMPUTER);
        assert_eq!(config.boundary.point_crs().unwrap(), CrsCode::Epsg4326);

        let layer = &config.layers[0];
        assert_eq!(layer.selection, ItemSelection::All);
        assert_eq!(layer.access, AccessMode::Stream);
        assert_eq!(layer.mosaic, MosaicPolicy::FirstWins);
        assert_eq!(layer.reduce, LayerReduce::Mean);
        assert!(!layer.needs_conversion());
        assert_eq!(layer.colormap().unwrap().name, "terrain");
    }

    #[test]
    fn test_full_layer() {
        let yaml = r#"
output_dir: out
storage:
  base_dir: /tmp/basin
  overwrite: overwrite
network:
  request_timeout_secs: 20
boundary:
  url: http://localhost/b.zip
  point: [-5.0, 34.0]
  selection: require_unique
rivers:
  name:
    match: contains
    value: Sebou
  buffer: 0.1
catalog:
  url: http://localhost/stac
  provider: none
  max_items: 10
layers:
  - name: tasmax
    collection: cil-gdpcmip6
    asset: tasmax
    datetime: 2030-01-01/2030-12-31
    query:
      cmip6:model: ACCESS-CM2
      cmip6:scenario: ssp585
    selection: first
    access: download
    mosaic: last_wins
    variable: tasmax
    time_range: [0, 31]
    reduce: max
    offset: -273.15
    range: [0, 45]
    units: degC
"#;
        let config = WorkflowConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.download_config().request_timeout, Duration::from_secs(20));
        assert_eq!(config.boundary.selection, SelectionPolicy::RequireUnique);
        assert_eq!(config.rivers.name, NameFilter::Contains("Sebou".into()));
        assert_eq!(config.stac_options().max_items, Some(10));

        let layer = config.layer("tasmax").unwrap();
        assert_eq!(layer.filters().len(), 2);
        assert_eq!(layer.filters()[0], AttributeFilter::eq("cmip6:model", "ACCESS-CM2"));
        assert_eq!(layer.open_options().time_range, Some((0, 31)));
        assert_eq!(layer.reduce, LayerReduce::Max);
        assert!(layer.needs_conversion());
        assert_eq!(layer.fixed_range().unwrap(), Some(ValueRange::new(0.0, 45.0).unwrap()));
        assert_eq!(layer.colormap().unwrap().units.as_deref(), Some("degC"));
        assert!(layer.describe().contains("cmip6:scenario=\"ssp585\""));
    }

    #[test]
    fn test_reversed_datetime_rejected() {
        let yaml = MINIMAL.replace("colormap: terrain", "datetime: 2031-01-01/2030-01-01");
        let err = WorkflowConfig::from_yaml(&yaml).unwrap_err();
        assert!(format!("{:#}", err).contains("invalid datetime"));
    }

    #[test]
    fn test_unknown_colormap_rejected() {
        let yaml = MINIMAL.replace("colormap: terrain", "colormap: jet");
        assert!(WorkflowConfig::from_yaml(&yaml).is_err());
    }

    #[test]
    fn test_duplicate_and_unsafe_layer_names_rejected() {
        let dup = format!(
            "{}  - name: elevation\n    collection: cop-dem-glo-30\n    asset: data\n",
            MINIMAL
        );
        assert!(WorkflowConfig::from_yaml(&dup).is_err());

        let unsafe_name = MINIMAL.replace("name: elevation", "name: ../elevation");
        assert!(WorkflowConfig::from_yaml(&unsafe_name).is_err());
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let yaml = MINIMAL.replace(
            "url: https://planetarycomputer.microsoft.com/api/stac/v1",
            "url: http://localhost/stac\n  provider: earthdata",
        );
        assert!(WorkflowConfig::from_yaml(&yaml).is_err());
    }
}
