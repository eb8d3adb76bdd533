//! Presentation of clipped grids: colormaps, PNG encoding, static maps and
//! Leaflet web maps.

pub mod colormap;
pub mod error;
pub mod png;
pub mod render;
pub mod static_map;
pub mod web_map;

pub use colormap::{Colormap, StyleConfig, ValueRange};
pub use error::{RenderError, RenderResult};
pub use png::{encode_image, encode_png};
pub use render::render_raster_rgba;
pub use static_map::{MapContent, Overlay, StaticMap, StaticMapOptions};
pub use web_map::{Legend, RasterLayer, VectorLayer, WebMap, WebMapOptions};
