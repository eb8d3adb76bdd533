//! Colormaps and value ranges.
//!
//! A [`Colormap`] is a list of colour stops over `0..=1`. Built-ins cover the
//! usual elevation and climate cases; anything else comes from a JSON style
//! file:
//!
//! ```json
//! {
//!   "version": "1.0",
//!   "styles": {
//!     "precip": {
//!       "name": "Precipitation",
//!       "type": "gradient",
//!       "units": "mm/day",
//!       "stops": [
//!         {"value": 0, "color": "#FFFFFF00"},
//!         {"value": 20, "color": "#08306B"}
//!       ]
//!     }
//!   }
//! }
//! ```
//!
//! Style stops carry data values; they are normalised onto `0..=1` and the
//! first/last values become the colormap's natural [`ValueRange`].

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use raster::GridStats;

use crate::error::{RenderError, RenderResult};

pub const TRANSPARENT: [u8; 4] = [0, 0, 0, 0];

const BUILTINS: &[(&str, &[(f32, &str)])] = &[
    (
        "terrain",
        &[
            (0.0, "#333399"),
            (0.15, "#0099FF"),
            (0.25, "#00CC66"),
            (0.5, "#FFFF99"),
            (0.75, "#805C54"),
            (1.0, "#FFFFFF"),
        ],
    ),
    (
        "viridis",
        &[
            (0.0, "#440154"),
            (0.25, "#3B528B"),
            (0.5, "#21918C"),
            (0.75, "#5EC962"),
            (1.0, "#FDE725"),
        ],
    ),
    ("coolwarm", &[(0.0, "#3B4CC0"), (0.5, "#DDDDDD"), (1.0, "#B40426")]),
    ("blues", &[(0.0, "#F7FBFF"), (0.5, "#6BAED6"), (1.0, "#08306B")]),
];

/// Style file, in the shared style-config layout.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StyleConfig {
    pub version: String,
    pub styles: HashMap<String, StyleDefinition>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StyleDefinition {
    pub name: String,
    pub description: Option<String>,
    #[serde(rename = "type", default = "default_style_type")]
    pub style_type: String,
    pub units: Option<String>,
    pub stops: Vec<StyleStop>,
}

fn default_style_type() -> String {
    "gradient".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StyleStop {
    pub value: f32,
    pub color: String,
    pub label: Option<String>,
}

impl StyleConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn from_file(path: &Path) -> RenderResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| RenderError::io(path, e))?;
        Ok(Self::from_json(&content)?)
    }

    pub fn get_style(&self, name: &str) -> Option<&StyleDefinition> {
        self.styles.get(name)
    }
}

/// Parse `#RRGGBB` or `#RRGGBBAA`; the leading `#` is optional.
pub fn parse_hex_color(hex: &str) -> Option<[u8; 4]> {
    let hex = hex.trim().trim_start_matches('#');
    if !hex.is_ascii() || !(hex.len() == 6 || hex.len() == 8) {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    let alpha = if hex.len() == 8 { channel(6)? } else { 255 };
    Some([channel(0)?, channel(2)?, channel(4)?, alpha])
}

pub fn to_hex(color: [u8; 4]) -> String {
    format!("#{:02x}{:02x}{:02x}", color[0], color[1], color[2])
}

/// Closed range of data values mapped onto the colormap.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    pub min: f64,
    pub max: f64,
}

impl ValueRange {
    pub fn new(min: f64, max: f64) -> RenderResult<Self> {
        if !min.is_finite() || !max.is_finite() || min > max {
            return Err(RenderError::InvalidRange { min, max });
        }
        Ok(Self { min, max })
    }

    /// Range of the valid cells; `None` when every cell is nodata.
    pub fn from_stats(stats: &GridStats) -> Option<Self> {
        match (stats.min, stats.max) {
            (Some(min), Some(max)) => Self::new(min as f64, max as f64).ok(),
            _ => None,
        }
    }

    pub fn mid(&self) -> f64 {
        (self.min + self.max) / 2.0
    }

    /// Position of `value` in `0..=1`, clamped. A degenerate range maps
    /// everything to the middle.
    pub fn normalize(&self, value: f64) -> f32 {
        let span = self.max - self.min;
        if span <= f64::EPSILON {
            return 0.5;
        }
        ((value - self.min) / span).clamp(0.0, 1.0) as f32
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorStop {
    pub position: f32,
    pub color: [u8; 4],
}

/// Piecewise-linear colour ramp.
#[derive(Debug, Clone, PartialEq)]
pub struct Colormap {
    pub name: String,
    pub units: Option<String>,
    stops: Vec<ColorStop>,
    natural_range: Option<ValueRange>,
}

impl Colormap {
    pub fn builtin_names() -> impl Iterator<Item = &'static str> {
        BUILTINS.iter().map(|(name, _)| *name)
    }

    /// A built-in colormap by case-insensitive name.
    pub fn named(name: &str) -> RenderResult<Self> {
        let (key, stops) = BUILTINS
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .ok_or_else(|| RenderError::UnknownColormap(name.to_string()))?;

        let stops = stops
            .iter()
            .map(|(position, hex)| {
                parse_hex_color(hex)
                    .map(|color| ColorStop {
                        position: *position,
                        color,
                    })
                    .ok_or_else(|| RenderError::style(*key, format!("bad built-in colour {}", hex)))
            })
            .collect::<RenderResult<Vec<_>>>()?;

        Ok(Self {
            name: key.to_string(),
            units: None,
            stops,
            natural_range: None,
        })
    }

    pub fn from_style(style: &StyleDefinition) -> RenderResult<Self> {
        let mut stops = style.stops.clone();
        stops.sort_by(|a, b| a.value.total_cmp(&b.value));

        let (Some(first), Some(last)) = (stops.first(), stops.last()) else {
            return Err(RenderError::style(&style.name, "style has no colour stops"));
        };
        let range = ValueRange::new(first.value as f64, last.value as f64)
            .map_err(|e| RenderError::style(&style.name, e.to_string()))?;

        let stops = stops
            .iter()
            .map(|stop| {
                let color = parse_hex_color(&stop.color).ok_or_else(|| {
                    RenderError::style(&style.name, format!("invalid colour '{}'", stop.color))
                })?;
                Ok(ColorStop {
                    position: range.normalize(stop.value as f64),
                    color,
                })
            })
            .collect::<RenderResult<Vec<_>>>()?;

        Ok(Self {
            name: style.name.clone(),
            units: style.units.clone(),
            stops,
            natural_range: Some(range),
        })
    }

    /// Load `style` from a style-config JSON file.
    pub fn from_style_file(path: &Path, style: &str) -> RenderResult<Self> {
        let config = StyleConfig::from_file(path)?;
        let definition = config
            .get_style(style)
            .ok_or_else(|| RenderError::style(style, format!("not defined in {}", path.display())))?;
        Self::from_style(definition)
    }

    /// Value range implied by a style file's stop values.
    pub fn natural_range(&self) -> Option<ValueRange> {
        self.natural_range
    }

    pub fn stops(&self) -> &[ColorStop] {
        &self.stops
    }

    /// Colour at position `t` in `0..=1`; NaN is transparent.
    pub fn color_at(&self, t: f32) -> [u8; 4] {
        if t.is_nan() {
            return TRANSPARENT;
        }
        let t = t.clamp(0.0, 1.0);
        let upper = self.stops.partition_point(|s| s.position < t);
        if upper == 0 {
            return self.stops[0].color;
        }
        if upper == self.stops.len() {
            return self.stops[upper - 1].color;
        }

        let (lo, hi) = (self.stops[upper - 1], self.stops[upper]);
        let span = hi.position - lo.position;
        if span <= f32::EPSILON {
            return hi.color;
        }
        let f = (t - lo.position) / span;
        let mut out = [0u8; 4];
        for (i, channel) in out.iter_mut().enumerate() {
            let (a, b) = (lo.color[i] as f32, hi.color[i] as f32);
            *channel = (a + (b - a) * f).round() as u8;
        }
        out
    }

    /// Colour of a data value in `range`.
    pub fn map(&self, value: f64, range: &ValueRange) -> [u8; 4] {
        if value.is_nan() {
            return TRANSPARENT;
        }
        self.color_at(range.normalize(value))
    }

    /// CSS `linear-gradient` for HTML legends.
    pub fn css_gradient(&self) -> String {
        let stops: Vec<String> = self
            .stops
            .iter()
            .map(|s| format!("{} {:.0}%", to_hex(s.color), s.position * 100.0))
            .collect();
        format!("linear-gradient(to right, {})", stops.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex_color() {
        assert_eq!(parse_hex_color("#FF0000"), Some([255, 0, 0, 255]));
        assert_eq!(parse_hex_color("00ff00"), Some([0, 255, 0, 255]));
        assert_eq!(parse_hex_color("#0000FF80"), Some([0, 0, 255, 128]));
        assert_eq!(parse_hex_color("#GGGGGG"), None);
        assert_eq!(parse_hex_color("#FFF"), None);
    }

    #[test]
    fn test_builtins_resolve() {
        for name in Colormap::builtin_names() {
            let cmap = Colormap::named(name).unwrap();
            assert_eq!(cmap.stops().first().map(|s| s.position), Some(0.0));
            assert_eq!(cmap.stops().last().map(|s| s.position), Some(1.0));
        }
        assert_eq!(Colormap::named("Viridis").unwrap().name, "viridis");
        assert!(matches!(Colormap::named("jet"), Err(RenderError::UnknownColormap(_))));
    }

    #[test]
    fn test_color_at_interpolates_and_clamps() {
        let cmap = Colormap::named("coolwarm").unwrap();
        assert_eq!(cmap.color_at(0.0), [0x3B, 0x4C, 0xC0, 255]);
        assert_eq!(cmap.color_at(-1.0), cmap.color_at(0.0));
        assert_eq!(cmap.color_at(0.5), [0xDD, 0xDD, 0xDD, 255]);
        assert_eq!(cmap.color_at(2.0), [0xB4, 0x04, 0x26, 255]);
        assert_eq!(cmap.color_at(f32::NAN), TRANSPARENT);
    }

    #[test]
    fn test_value_range() {
        let r = ValueRange::new(0.0, 200.0).unwrap();
        assert_eq!(r.normalize(50.0), 0.25);
        assert_eq!(r.normalize(-10.0), 0.0);
        assert_eq!(r.mid(), 100.0);
        assert_eq!(ValueRange::new(5.0, 5.0).unwrap().normalize(5.0), 0.5);
        assert!(ValueRange::new(2.0, 1.0).is_err());
        assert!(ValueRange::new(f64::NAN, 1.0).is_err());
    }

    #[test]
    fn test_css_gradient() {
        let css = Colormap::named("blues").unwrap().css_gradient();
        assert_eq!(css, "linear-gradient(to right, #f7fbff 0%, #6baed6 50%, #08306b 100%)");
    }
}
