//! Basin polygons read from a shapefile, and point-based basin selection.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use geo::{coord, LineString, MultiPolygon, Polygon};
use serde::{Deserialize, Serialize};
use shapefile::dbase::FieldValue;
use shapefile::{PolygonRing, Shape};
use tracing::{debug, info, warn};

use basin_common::{BoundingBox, CrsCode, Footprint};

use crate::error::{VectorError, VectorResult};
use crate::prj::crs_from_wkt;

/// How to resolve a point that falls inside more than one polygon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    /// Take the lowest record index and log the ambiguity.
    #[default]
    FirstMatch,
    /// Refuse to choose.
    RequireUnique,
}

/// One polygon record of a basin layer.
#[derive(Debug, Clone, PartialEq)]
pub struct Basin {
    /// Record index in file order.
    pub index: usize,
    pub footprint: Footprint,
    /// DBF attributes rendered as strings.
    pub attributes: BTreeMap<String, String>,
}

impl Basin {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Human readable label: the first of `HYBAS_ID`, `ID`, `NAME` present,
    /// else the record index.
    pub fn label(&self) -> String {
        ["HYBAS_ID", "ID", "NAME", "name"]
            .iter()
            .find_map(|k| self.attribute(k))
            .map(str::to_string)
            .unwrap_or_else(|| format!("record {}", self.index))
    }

    pub fn bbox(&self) -> Option<BoundingBox> {
        self.footprint.bbox()
    }
}

/// All polygon records of a shapefile, in file order.
#[derive(Debug, Clone)]
pub struct BasinLayer {
    pub path: PathBuf,
    pub crs: CrsCode,
    pub basins: Vec<Basin>,
}

/// Read polygon records and attributes from `path` (`.shp`), with the CRS from
/// the sibling `.prj`.
///
/// Non-polygon and null shapes are skipped with a warning.
pub fn read_basins(path: &Path) -> VectorResult<BasinLayer> {
    let crs = read_prj(path)?;

    let mut reader = shapefile::Reader::from_path(path).map_err(|e| VectorError::Shapefile {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let mut basins = Vec::new();
    for (index, result) in reader.iter_shapes_and_records().enumerate() {
        let (shape, record) = result.map_err(|e| VectorError::Shapefile {
            path: path.to_path_buf(),
            message: format!("record {}: {}", index, e),
        })?;

        let geometry = match shape {
            Shape::Polygon(p) => rings_to_multipolygon(p.rings(), |pt| (pt.x, pt.y)),
            Shape::PolygonM(p) => rings_to_multipolygon(p.rings(), |pt| (pt.x, pt.y)),
            Shape::PolygonZ(p) => rings_to_multipolygon(p.rings(), |pt| (pt.x, pt.y)),
            Shape::NullShape => {
                debug!(record = index, "Skipping null shape");
                continue;
            }
            other => {
                warn!(record = index, shape = ?other.shapetype(), "Skipping non-polygon shape");
                continue;
            }
        };

        let attributes = record
            .into_iter()
            .map(|(name, value)| (name, field_to_string(&value)))
            .collect();

        basins.push(Basin {
            index,
            footprint: Footprint::new(geometry, crs),
            attributes,
        });
    }

    info!(path = %path.display(), crs = %crs, count = basins.len(), "Read basin layer");
    Ok(BasinLayer {
        path: path.to_path_buf(),
        crs,
        basins,
    })
}

fn read_prj(shp: &Path) -> VectorResult<CrsCode> {
    let prj = shp.with_extension("prj");
    if !prj.exists() {
        warn!(path = %shp.display(), "No .prj next to shapefile, assuming EPSG:4326");
        return Ok(CrsCode::Epsg4326);
    }

    let wkt = std::fs::read_to_string(&prj).map_err(|e| VectorError::io(&prj, e))?;
    crs_from_wkt(&wkt).ok_or_else(|| VectorError::UnsupportedProjection {
        path: prj,
        wkt: wkt.chars().take(120).collect(),
    })
}

/// Group shapefile rings into polygons: each outer ring starts a polygon and
/// the inner rings that follow it become its holes.
fn rings_to_multipolygon<P>(
    rings: &[PolygonRing<P>],
    xy: impl Fn(&P) -> (f64, f64),
) -> MultiPolygon<f64> {
    let to_line = |points: &[P]| -> LineString<f64> {
        points
            .iter()
            .map(|p| {
                let (x, y) = xy(p);
                coord! { x: x, y: y }
            })
            .collect()
    };

    let mut polygons: Vec<(LineString<f64>, Vec<LineString<f64>>)> = Vec::new();
    for ring in rings {
        match ring {
            PolygonRing::Outer(points) => polygons.push((to_line(points), Vec::new())),
            PolygonRing::Inner(points) => match polygons.last_mut() {
                Some((_, holes)) => holes.push(to_line(points)),
                // Hole before any shell: treat it as a shell
                None => polygons.push((to_line(points), Vec::new())),
            },
        }
    }

    MultiPolygon::new(
        polygons
            .into_iter()
            .map(|(exterior, holes)| Polygon::new(exterior, holes))
            .collect(),
    )
}

fn field_to_string(value: &FieldValue) -> String {
    match value {
        FieldValue::Character(Some(s)) => s.trim().to_string(),
        FieldValue::Numeric(Some(n)) => n.to_string(),
        FieldValue::Float(Some(f)) => f.to_string(),
        FieldValue::Integer(i) => i.to_string(),
        FieldValue::Double(d) => d.to_string(),
        FieldValue::Logical(Some(b)) => b.to_string(),
        FieldValue::Character(None)
        | FieldValue::Numeric(None)
        | FieldValue::Float(None)
        | FieldValue::Logical(None) => String::new(),
        other => format!("{:?}", other),
    }
}

impl BasinLayer {
    /// Build a layer from in-memory basins.
    pub fn new(path: impl Into<PathBuf>, crs: CrsCode, basins: Vec<Basin>) -> Self {
        Self {
            path: path.into(),
            crs,
            basins,
        }
    }

    pub fn len(&self) -> usize {
        self.basins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.basins.is_empty()
    }

    /// Every basin containing the point, in record order. Boundary points
    /// count as contained; geometries are repaired before testing.
    pub fn containing(&self, x: f64, y: f64) -> Vec<Basin> {
        self.basins
            .iter()
            .filter(|b| b.bbox().map_or(false, |bb| bb.contains_point(x, y)))
            .filter_map(|b| {
                let repaired = b.footprint.repaired();
                repaired.contains_point(x, y).then(|| Basin {
                    footprint: repaired,
                    ..b.clone()
                })
            })
            .collect()
    }

    /// The basin containing `(x, y)` given in `point_crs`.
    pub fn select_containing(
        &self,
        x: f64,
        y: f64,
        point_crs: CrsCode,
        policy: SelectionPolicy,
    ) -> VectorResult<Basin> {
        let (lx, ly) = point_crs
            .convert_point(x, y, self.crs)
            .map_err(|_| VectorError::CrsMismatch {
                point: point_crs.to_string(),
                layer: self.crs.to_string(),
            })?;

        let mut matches = self.containing(lx, ly);
        match matches.len() {
            0 => Err(VectorError::NoContainingPolygon { lon: x, lat: y }),
            1 => Ok(matches.remove(0)),
            count => {
                let records: Vec<usize> = matches.iter().map(|b| b.index).collect();
                match policy {
                    SelectionPolicy::FirstMatch => {
                        warn!(
                            count = count,
                            records = ?records,
                            "Point lies in several basins, using the first record"
                        );
                        Ok(matches.remove(0))
                    }
                    SelectionPolicy::RequireUnique => {
                        Err(VectorError::AmbiguousSelection { count, records })
                    }
                }
            }
        }
    }
}
