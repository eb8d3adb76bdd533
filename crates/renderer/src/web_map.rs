//! Interactive Leaflet maps written as a single HTML page.
//!
//! Raster layers are referenced as sibling PNG files (colour-mapped with
//! transparent nodata) placed at the grid bounds; vector layers are inlined
//! as GeoJSON. Leaflet itself loads from a CDN.

use std::fmt::Write as _;
use std::path::Path;

use geojson::FeatureCollection;
use serde::{Deserialize, Serialize};
use tracing::info;

use basin_common::{BoundingBox, CrsCode};
use raster::RasterGrid;

use crate::colormap::{Colormap, ValueRange};
use crate::error::{RenderError, RenderResult};

const LEAFLET_CSS: &str = "https://unpkg.com/leaflet@1.9.4/dist/leaflet.css";
const LEAFLET_JS: &str = "https://unpkg.com/leaflet@1.9.4/dist/leaflet.js";

fn default_title() -> String {
    "Basin explorer".to_string()
}

fn default_basemap_url() -> String {
    "https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png".to_string()
}

fn default_attribution() -> String {
    "&copy; OpenStreetMap contributors".to_string()
}

fn default_opacity() -> f32 {
    0.75
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebMapOptions {
    #[serde(default = "default_title")]
    pub title: String,
    /// XYZ tile URL template.
    #[serde(default = "default_basemap_url")]
    pub basemap_url: String,
    #[serde(default = "default_attribution")]
    pub basemap_attribution: String,
    #[serde(default = "default_opacity")]
    pub raster_opacity: f32,
}

impl Default for WebMapOptions {
    fn default() -> Self {
        Self {
            title: default_title(),
            basemap_url: default_basemap_url(),
            basemap_attribution: default_attribution(),
            raster_opacity: default_opacity(),
        }
    }
}

/// Colour bar shown for a raster layer.
#[derive(Debug, Clone, PartialEq)]
pub struct Legend {
    pub title: String,
    pub gradient_css: String,
    pub range: ValueRange,
    pub units: Option<String>,
}

impl Legend {
    pub fn new(title: impl Into<String>, colormap: &Colormap, range: ValueRange) -> Self {
        Self {
            title: title.into(),
            gradient_css: colormap.css_gradient(),
            range,
            units: colormap.units.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RasterLayer {
    pub name: String,
    /// Image URL relative to the HTML file.
    pub image_href: String,
    /// Lon/lat bounds of the image.
    pub bounds: BoundingBox,
    pub legend: Legend,
}

impl RasterLayer {
    /// Image overlay at the grid's extent, converted to lon/lat.
    pub fn from_grid(
        name: impl Into<String>,
        image_href: impl Into<String>,
        grid: &RasterGrid,
        legend: Legend,
    ) -> RenderResult<Self> {
        let bbox = grid.bbox();
        let bounds = if grid.crs.is_geographic() {
            bbox
        } else {
            let convert = |x, y| {
                grid.crs
                    .convert_point(x, y, CrsCode::Epsg4326)
                    .map_err(|e| RenderError::InvalidInput(e.to_string()))
            };
            let (w, s) = convert(bbox.min_x, bbox.min_y)?;
            let (e, n) = convert(bbox.max_x, bbox.max_y)?;
            BoundingBox::new(w, s, e, n)
        };
        Ok(Self {
            name: name.into(),
            image_href: image_href.into(),
            bounds,
            legend,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VectorLayer {
    pub name: String,
    pub features: FeatureCollection,
    /// CSS colour.
    pub color: String,
    pub weight: f32,
}

impl VectorLayer {
    pub fn new(name: impl Into<String>, features: FeatureCollection, color: impl Into<String>, weight: f32) -> Self {
        Self {
            name: name.into(),
            features,
            color: color.into(),
            weight,
        }
    }
}

/// Page builder; layers are listed in the layer switcher in insertion order.
#[derive(Debug, Clone, Default)]
pub struct WebMap {
    options: WebMapOptions,
    rasters: Vec<RasterLayer>,
    vectors: Vec<VectorLayer>,
}

impl WebMap {
    pub fn new(options: WebMapOptions) -> Self {
        Self {
            options,
            rasters: Vec::new(),
            vectors: Vec::new(),
        }
    }

    pub fn add_raster(&mut self, layer: RasterLayer) -> &mut Self {
        self.rasters.push(layer);
        self
    }

    pub fn add_vector(&mut self, layer: VectorLayer) -> &mut Self {
        self.vectors.push(layer);
        self
    }

    pub fn layer_count(&self) -> usize {
        self.rasters.len() + self.vectors.len()
    }

    pub fn to_html(&self) -> RenderResult<String> {
        let title = escape_html(&self.options.title);
        let mut html = String::with_capacity(8 * 1024);

        html.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n");
        let _ = writeln!(html, "<title>{}</title>", title);
        html.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n");
        let _ = writeln!(html, "<link rel=\"stylesheet\" href=\"{}\">", LEAFLET_CSS);
        let _ = writeln!(html, "<script src=\"{}\"></script>", LEAFLET_JS);
        html.push_str(STYLE);
        html.push_str("</head>\n<body>\n<div id=\"map\"></div>\n<script>\n");

        html.push_str("var map = L.map('map');\n");
        let _ = writeln!(
            html,
            "var basemap = L.tileLayer({}, {{maxZoom: 19, attribution: {}}}).addTo(map);",
            js_string(&self.options.basemap_url)?,
            js_string(&self.options.basemap_attribution)?
        );
        html.push_str("var overlays = {};\nvar bounds = L.latLngBounds([]);\n");

        for (i, layer) in self.rasters.iter().enumerate() {
            let b = &layer.bounds;
            let _ = writeln!(
                html,
                "var raster{i} = L.imageOverlay({href}, [[{s}, {w}], [{n}, {e}]], {{opacity: {op}, interactive: false}});",
                i = i,
                href = js_string(&layer.image_href)?,
                s = b.min_y,
                w = b.min_x,
                n = b.max_y,
                e = b.max_x,
                op = self.options.raster_opacity
            );
            if i == 0 {
                let _ = writeln!(html, "raster{}.addTo(map);", i);
            }
            let _ = writeln!(html, "overlays[{}] = raster{};", js_string(&layer.name)?, i);
            let _ = writeln!(html, "bounds.extend(raster{}.getBounds());", i);
        }

        for (i, layer) in self.vectors.iter().enumerate() {
            let _ = writeln!(
                html,
                "var vector{i} = L.geoJSON({data}, {{style: {{color: {color}, weight: {weight}, fill: false}}}}).addTo(map);",
                i = i,
                data = js_json(&layer.features)?,
                color = js_string(&layer.color)?,
                weight = layer.weight
            );
            let _ = writeln!(html, "overlays[{}] = vector{};", js_string(&layer.name)?, i);
            let _ = writeln!(
                html,
                "if (vector{i}.getLayers().length) {{ bounds.extend(vector{i}.getBounds()); }}",
                i = i
            );
        }

        html.push_str("L.control.layers({'Basemap': basemap}, overlays, {collapsed: false}).addTo(map);\n");
        html.push_str("if (bounds.isValid()) { map.fitBounds(bounds); } else { map.setView([0, 0], 2); }\n");
        html.push_str("L.control.scale().addTo(map);\n");

        if !self.rasters.is_empty() {
            let _ = writeln!(html, "var legend = L.control({{position: 'bottomright'}});");
            let _ = writeln!(
                html,
                "legend.onAdd = function () {{ var div = L.DomUtil.create('div', 'legend'); div.innerHTML = {}; return div; }};",
                js_string(&self.legend_html())?
            );
            html.push_str("legend.addTo(map);\n");
        }

        html.push_str("</script>\n</body>\n</html>\n");
        Ok(html)
    }

    fn legend_html(&self) -> String {
        let mut out = String::new();
        for layer in &self.rasters {
            let legend = &layer.legend;
            let units = legend
                .units
                .as_deref()
                .map(|u| format!(" ({})", escape_html(u)))
                .unwrap_or_default();
            let _ = write!(
                out,
                "<div class=\"entry\"><b>{title}{units}</b>\
                 <div class=\"bar\" style=\"background: {css}\"></div>\
                 <div class=\"labels\"><span>{min}</span><span>{mid}</span><span>{max}</span></div></div>",
                title = escape_html(&legend.title),
                units = units,
                css = legend.gradient_css,
                min = legend_value(legend.range.min),
                mid = legend_value(legend.range.mid()),
                max = legend_value(legend.range.max),
            );
        }
        out
    }

    pub fn write(&self, path: &Path) -> RenderResult<()> {
        let html = self.to_html()?;
        std::fs::write(path, html.as_bytes()).map_err(|e| RenderError::io(path, e))?;
        info!(
            path = %path.display(),
            rasters = self.rasters.len(),
            vectors = self.vectors.len(),
            "Wrote web map"
        );
        Ok(())
    }
}

const STYLE: &str = "<style>\n\
html, body, #map { height: 100%; margin: 0; }\n\
.legend { background: white; padding: 6px 8px; border-radius: 4px; font: 12px sans-serif; min-width: 180px; }\n\
.legend .entry + .entry { margin-top: 8px; }\n\
.legend .bar { height: 12px; margin: 4px 0 2px; border: 1px solid #555; }\n\
.legend .labels { display: flex; justify-content: space-between; }\n\
</style>\n";

fn legend_value(value: f64) -> String {
    if value.abs() >= 100.0 {
        format!("{:.0}", value)
    } else {
        format!("{:.2}", value)
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// JSON for embedding inside a `<script>` element.
fn js_json<T: Serialize>(value: &T) -> RenderResult<String> {
    Ok(serde_json::to_string(value)?.replace("</", "<\\/"))
}

fn js_string(value: &str) -> RenderResult<String> {
    js_json(&value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("Sebou <basin> & \"rivers\""), "Sebou &lt;basin&gt; &amp; &quot;rivers&quot;");
    }

    #[test]
    fn test_js_string_cannot_close_script() {
        let s = js_string("</script><script>alert(1)</script>").unwrap();
        assert!(!s.contains("</script>"));
        assert!(s.starts_with('"'));
    }

    #[test]
    fn test_empty_map_still_renders() {
        let html = WebMap::new(WebMapOptions::default()).to_html().unwrap();
        assert!(html.contains("L.tileLayer(\"https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png\""));
        assert!(html.contains("map.setView([0, 0], 2)"));
        assert!(!html.contains("legend.addTo"));
    }
}
