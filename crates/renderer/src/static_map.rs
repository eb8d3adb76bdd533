//! Static PNG maps: colour-mapped raster in a frame with vector overlays,
//! lon/lat ticks, a legend bar and a title.
//!
//! Text is drawn with a TrueType font from the configured path or a few
//! common system locations. Without one the map is still complete, just
//! unlabelled.

use std::path::{Path, PathBuf};

use geo::{LineString, MultiLineString, MultiPolygon};
use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_line_segment_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use rusttype::{Font, Scale};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use basin_common::BoundingBox;
use raster::RasterGrid;

use crate::colormap::{Colormap, ValueRange};
use crate::error::{RenderError, RenderResult};
use crate::png::encode_image;
use crate::render::render_raster_rgba;

const SYSTEM_FONTS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/liberation/LiberationSans-Regular.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "/Library/Fonts/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

const MARGIN_LEFT: f32 = 70.0;
const MARGIN_RIGHT: f32 = 30.0;
const MARGIN_TOP: f32 = 50.0;
const MARGIN_BOTTOM: f32 = 110.0;
const TICK_LEN: f32 = 5.0;
const LEGEND_HEIGHT: u32 = 14;

const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
const INK: Rgba<u8> = Rgba([40, 40, 40, 255]);

fn default_width() -> u32 {
    900
}

fn default_height() -> u32 {
    700
}

fn default_font_size() -> f32 {
    14.0
}

fn default_ticks() -> usize {
    5
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticMapOptions {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    /// TrueType font for labels; system fonts are tried when unset.
    #[serde(default)]
    pub font_path: Option<PathBuf>,
    #[serde(default = "default_font_size")]
    pub font_size: f32,
    /// Approximate tick count per axis.
    #[serde(default = "default_ticks")]
    pub ticks: usize,
}

impl Default for StaticMapOptions {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            font_path: None,
            font_size: default_font_size(),
            ticks: default_ticks(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OverlayGeometry {
    /// Ring outlines; polygons are not filled.
    Polygons(MultiPolygon<f64>),
    Lines(MultiLineString<f64>),
}

/// Vector layer drawn over the raster, in the grid's CRS.
#[derive(Debug, Clone, PartialEq)]
pub struct Overlay {
    pub name: String,
    pub geometry: OverlayGeometry,
    pub color: [u8; 4],
    pub width: f32,
}

impl Overlay {
    pub fn outline(name: impl Into<String>, polygons: MultiPolygon<f64>, color: [u8; 4], width: f32) -> Self {
        Self {
            name: name.into(),
            geometry: OverlayGeometry::Polygons(polygons),
            color,
            width,
        }
    }

    pub fn lines(name: impl Into<String>, lines: Vec<LineString<f64>>, color: [u8; 4], width: f32) -> Self {
        Self {
            name: name.into(),
            geometry: OverlayGeometry::Lines(MultiLineString::new(lines)),
            color,
            width,
        }
    }

    fn line_strings(&self) -> Vec<&LineString<f64>> {
        match &self.geometry {
            OverlayGeometry::Polygons(mp) => mp
                .0
                .iter()
                .flat_map(|p| std::iter::once(p.exterior()).chain(p.interiors()))
                .collect(),
            OverlayGeometry::Lines(ml) => ml.0.iter().collect(),
        }
    }
}

/// What to draw: one single-layer grid plus overlays.
pub struct MapContent<'a> {
    pub grid: &'a RasterGrid,
    pub colormap: &'a Colormap,
    pub range: &'a ValueRange,
    pub overlays: &'a [Overlay],
    pub title: Option<&'a str>,
}

/// Map-to-pixel transform for the framed map area.
#[derive(Debug, Clone, Copy, PartialEq)]
struct MapFrame {
    extent: BoundingBox,
    x0: f32,
    y0: f32,
    width: f32,
    height: f32,
    scale: f64,
}

impl MapFrame {
    /// Largest equal-scale fit of `extent` centred in the drawable area.
    fn fit(extent: BoundingBox, canvas_w: u32, canvas_h: u32) -> RenderResult<Self> {
        let area_w = canvas_w as f32 - MARGIN_LEFT - MARGIN_RIGHT;
        let area_h = canvas_h as f32 - MARGIN_TOP - MARGIN_BOTTOM;
        if area_w < 50.0 || area_h < 50.0 {
            return Err(RenderError::InvalidInput(format!(
                "canvas {}x{} too small for a map frame",
                canvas_w, canvas_h
            )));
        }
        if extent.width() <= 0.0 || extent.height() <= 0.0 {
            return Err(RenderError::InvalidInput("map extent is empty".into()));
        }

        let scale = (area_w as f64 / extent.width()).min(area_h as f64 / extent.height());
        let width = ((extent.width() * scale) as f32).max(1.0);
        let height = ((extent.height() * scale) as f32).max(1.0);
        Ok(Self {
            extent,
            x0: (MARGIN_LEFT + (area_w - width) / 2.0).round(),
            y0: (MARGIN_TOP + (area_h - height) / 2.0).round(),
            width: width.round(),
            height: height.round(),
            scale,
        })
    }

    fn to_pixel(&self, x: f64, y: f64) -> (f32, f32) {
        (
            self.x0 + ((x - self.extent.min_x) * self.scale) as f32,
            self.y0 + ((self.extent.max_y - y) * self.scale) as f32,
        )
    }

    fn right(&self) -> f32 {
        self.x0 + self.width
    }

    fn bottom(&self) -> f32 {
        self.y0 + self.height
    }
}

pub struct StaticMap {
    options: StaticMapOptions,
    font: Option<Font<'static>>,
}

impl StaticMap {
    pub fn new(options: StaticMapOptions) -> Self {
        let font = load_font(options.font_path.as_deref());
        if font.is_none() {
            warn!("No TrueType font found; static maps will have no text labels");
        }
        Self { options, font }
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    pub fn options(&self) -> &StaticMapOptions {
        &self.options
    }

    pub fn render(&self, content: &MapContent<'_>) -> RenderResult<RgbaImage> {
        let grid = content.grid;
        let frame = MapFrame::fit(grid.bbox(), self.options.width, self.options.height)?;
        let mut canvas = RgbaImage::from_pixel(self.options.width, self.options.height, WHITE);

        let cells = render_raster_rgba(grid, content.colormap, content.range)?;
        let scaled = imageops::resize(&cells, frame.width as u32, frame.height as u32, FilterType::Nearest);
        imageops::overlay(&mut canvas, &scaled, frame.x0 as i64, frame.y0 as i64);

        for overlay in content.overlays {
            self.draw_overlay(&mut canvas, &frame, overlay);
        }

        draw_hollow_rect_mut(
            &mut canvas,
            Rect::at(frame.x0 as i32 - 1, frame.y0 as i32 - 1).of_size(frame.width as u32 + 2, frame.height as u32 + 2),
            INK,
        );
        self.draw_ticks(&mut canvas, &frame, grid.crs.is_geographic());
        self.draw_legend(&mut canvas, &frame, content.colormap, content.range);

        if let Some(title) = content.title {
            let center = self.options.width as f32 / 2.0;
            self.draw_text(&mut canvas, title, center, 15.0, Anchor::Center, self.options.font_size * 1.3);
        }

        info!(
            width = self.options.width,
            height = self.options.height,
            overlays = content.overlays.len(),
            labelled = self.has_font(),
            "Rendered static map"
        );
        Ok(canvas)
    }

    pub fn render_png(&self, content: &MapContent<'_>) -> RenderResult<Vec<u8>> {
        encode_image(&self.render(content)?)
    }

    fn draw_overlay(&self, canvas: &mut RgbaImage, frame: &MapFrame, overlay: &Overlay) {
        let color = Rgba(overlay.color);
        let clip = (frame.x0, frame.y0, frame.right(), frame.bottom());
        let mut segments = 0usize;
        for line in overlay.line_strings() {
            for seg in line.lines() {
                let a = frame.to_pixel(seg.start.x, seg.start.y);
                let b = frame.to_pixel(seg.end.x, seg.end.y);
                if let Some((a, b)) = clip_segment(a, b, clip) {
                    draw_thick_line(canvas, a, b, overlay.width, color);
                    segments += 1;
                }
            }
        }
        debug!(overlay = %overlay.name, segments, "Drew overlay");
    }

    fn draw_ticks(&self, canvas: &mut RgbaImage, frame: &MapFrame, geographic: bool) {
        let extent = frame.extent;
        let label_size = self.options.font_size;

        let step = nice_step(extent.width(), self.options.ticks);
        for x in tick_values(extent.min_x, extent.max_x, step) {
            let (px, _) = frame.to_pixel(x, extent.min_y);
            let y = frame.bottom();
            draw_line_segment_mut(canvas, (px, y), (px, y + TICK_LEN), INK);
            let text = format_coordinate(x, step, geographic);
            self.draw_text(canvas, &text, px, y + TICK_LEN + 2.0, Anchor::Center, label_size);
        }

        let step = nice_step(extent.height(), self.options.ticks);
        for y in tick_values(extent.min_y, extent.max_y, step) {
            let (_, py) = frame.to_pixel(extent.min_x, y);
            let x = frame.x0;
            draw_line_segment_mut(canvas, (x - TICK_LEN, py), (x, py), INK);
            let text = format_coordinate(y, step, geographic);
            self.draw_text(canvas, &text, x - TICK_LEN - 3.0, py - label_size / 2.0, Anchor::Right, label_size);
        }
    }

    fn draw_legend(&self, canvas: &mut RgbaImage, frame: &MapFrame, colormap: &Colormap, range: &ValueRange) {
        let bar_w = (frame.width * 0.6)
            .max(120.0)
            .min(self.options.width as f32 - frame.x0 - MARGIN_RIGHT);
        let x0 = frame.x0;
        let y0 = frame.bottom() + TICK_LEN + self.options.font_size + 20.0;
        let columns = bar_w.round() as u32;

        for i in 0..columns {
            let t = if columns > 1 { i as f32 / (columns - 1) as f32 } else { 0.5 };
            draw_filled_rect_mut(
                canvas,
                Rect::at(x0 as i32 + i as i32, y0 as i32).of_size(1, LEGEND_HEIGHT),
                Rgba(colormap.color_at(t)),
            );
        }
        draw_hollow_rect_mut(
            canvas,
            Rect::at(x0 as i32 - 1, y0 as i32 - 1).of_size(columns + 2, LEGEND_HEIGHT + 2),
            INK,
        );

        let label_y = y0 + LEGEND_HEIGHT as f32 + 4.0;
        let size = self.options.font_size;
        for (t, value) in [(0.0, range.min), (0.5, range.mid()), (1.0, range.max)] {
            let px = x0 + t * bar_w;
            draw_line_segment_mut(canvas, (px, y0 + LEGEND_HEIGHT as f32), (px, label_y - 1.0), INK);
            self.draw_text(canvas, &format_value(value), px, label_y, Anchor::Center, size);
        }
        if let Some(units) = &colormap.units {
            self.draw_text(
                canvas,
                units,
                x0 + bar_w + 12.0,
                y0 + (LEGEND_HEIGHT as f32 - size) / 2.0,
                Anchor::Left,
                size,
            );
        }
    }

    fn draw_text(&self, canvas: &mut RgbaImage, text: &str, x: f32, y: f32, anchor: Anchor, size: f32) {
        let Some(font) = &self.font else {
            return;
        };
        let scale = Scale::uniform(size);
        let (w, _) = text_size(scale, font, text);
        let left = match anchor {
            Anchor::Left => x as i32,
            Anchor::Center => x as i32 - w / 2,
            Anchor::Right => x as i32 - w,
        };
        draw_text_mut(canvas, INK, left, y as i32, scale, font, text);
    }
}

#[derive(Debug, Clone, Copy)]
enum Anchor {
    Left,
    Center,
    Right,
}

/// First readable font: the configured path, then common system fonts.
pub fn load_font(configured: Option<&Path>) -> Option<Font<'static>> {
    if let Some(path) = configured {
        match std::fs::read(path).ok().and_then(Font::try_from_vec) {
            Some(font) => return Some(font),
            None => warn!(path = %path.display(), "Configured font unreadable, trying system fonts"),
        }
    }
    SYSTEM_FONTS.iter().find_map(|candidate| {
        let font = std::fs::read(candidate).ok().and_then(Font::try_from_vec)?;
        debug!(path = candidate, "Loaded system font");
        Some(font)
    })
}

/// Offset parallel strokes along the segment normal.
fn draw_thick_line(canvas: &mut RgbaImage, a: (f32, f32), b: (f32, f32), width: f32, color: Rgba<u8>) {
    let strokes = width.round().max(1.0) as i32;
    let (dx, dy) = (b.0 - a.0, b.1 - a.1);
    let len = (dx * dx + dy * dy).sqrt();
    let (nx, ny) = if len > 0.0 { (-dy / len, dx / len) } else { (0.0, 0.0) };
    for k in 0..strokes {
        let off = k as f32 - (strokes - 1) as f32 / 2.0;
        draw_line_segment_mut(
            canvas,
            (a.0 + nx * off, a.1 + ny * off),
            (b.0 + nx * off, b.1 + ny * off),
            color,
        );
    }
}

/// Liang-Barsky clip of a pixel-space segment to `(x0, y0, x1, y1)`.
fn clip_segment(a: (f32, f32), b: (f32, f32), rect: (f32, f32, f32, f32)) -> Option<((f32, f32), (f32, f32))> {
    let (x0, y0, x1, y1) = rect;
    let (dx, dy) = (b.0 - a.0, b.1 - a.1);
    let mut t0 = 0.0f32;
    let mut t1 = 1.0f32;
    for (p, q) in [(-dx, a.0 - x0), (dx, x1 - a.0), (-dy, a.1 - y0), (dy, y1 - a.1)] {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let r = q / p;
        if p < 0.0 {
            t0 = t0.max(r);
        } else {
            t1 = t1.min(r);
        }
        if t0 > t1 {
            return None;
        }
    }
    Some((
        (a.0 + t0 * dx, a.1 + t0 * dy),
        (a.0 + t1 * dx, a.1 + t1 * dy),
    ))
}

/// 1, 2 or 5 times a power of ten, close to `span / target`.
fn nice_step(span: f64, target: usize) -> f64 {
    if span <= 0.0 || target == 0 {
        return 1.0;
    }
    let raw = span / target as f64;
    let magnitude = 10f64.powi(raw.log10().floor() as i32);
    let norm = raw / magnitude;
    let factor = if norm < 1.5 {
        1.0
    } else if norm < 3.0 {
        2.0
    } else if norm < 7.0 {
        5.0
    } else {
        10.0
    };
    factor * magnitude
}

fn tick_values(min: f64, max: f64, step: f64) -> Vec<f64> {
    let mut ticks = Vec::new();
    let mut v = (min / step).ceil() * step;
    while v <= max + step * 1e-9 {
        ticks.push(if v.abs() < step * 1e-9 { 0.0 } else { v });
        v += step;
    }
    ticks
}

fn format_coordinate(value: f64, step: f64, geographic: bool) -> String {
    let decimals = if step >= 1.0 { 0 } else { (-step.log10()).ceil() as usize };
    if geographic {
        format!("{:.*}°", decimals, value)
    } else {
        format!("{:.*}", decimals, value)
    }
}

fn format_value(value: f64) -> String {
    let magnitude = value.abs();
    if magnitude >= 100.0 {
        format!("{:.0}", value)
    } else if magnitude >= 1.0 {
        format!("{:.1}", value)
    } else {
        format!("{:.2}", value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nice_step() {
        assert_eq!(nice_step(10.0, 5), 2.0);
        assert_eq!(nice_step(2.9, 5), 0.5);
        assert_eq!(nice_step(1000.0, 4), 200.0);
        assert_eq!(nice_step(0.0, 5), 1.0);
    }

    #[test]
    fn test_tick_values() {
        assert_eq!(tick_values(-6.7, -3.8, 1.0), vec![-6.0, -5.0, -4.0]);
        assert_eq!(tick_values(0.0, 1.0, 0.5), vec![0.0, 0.5, 1.0]);
    }

    #[test]
    fn test_format_coordinate() {
        assert_eq!(format_coordinate(-6.0, 1.0, true), "-6°");
        assert_eq!(format_coordinate(33.5, 0.5, true), "33.5°");
        assert_eq!(format_coordinate(1500.0, 500.0, false), "1500");
    }

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(1234.4), "1234");
        assert_eq!(format_value(12.34), "12.3");
        assert_eq!(format_value(0.1234), "0.12");
    }

    #[test]
    fn test_clip_segment() {
        let rect = (0.0, 0.0, 10.0, 10.0);
        assert_eq!(clip_segment((-5.0, 5.0), (5.0, 5.0), rect), Some(((0.0, 5.0), (5.0, 5.0))));
        assert_eq!(clip_segment((-5.0, -5.0), (-1.0, -1.0), rect), None);
        assert_eq!(clip_segment((2.0, 2.0), (3.0, 3.0), rect), Some(((2.0, 2.0), (3.0, 3.0))));
    }

    #[test]
    fn test_frame_fit_keeps_aspect() {
        let frame = MapFrame::fit(BoundingBox::new(0.0, 0.0, 2.0, 1.0), 900, 700).unwrap();
        assert_eq!(frame.width, 800.0);
        assert_eq!(frame.height, 400.0);
        let (x, y) = frame.to_pixel(0.0, 1.0);
        assert_eq!((x, y), (frame.x0, frame.y0));
        assert!(MapFrame::fit(BoundingBox::new(0.0, 0.0, 1.0, 1.0), 100, 100).is_err());
    }
}
