//! Polygonal areas tagged with their CRS.
//!
//! A [`Footprint`] is the shape every stage passes around: the selected
//! basin, the search geometry sent to the catalog and the polygon used to
//! crop and mask rasters.

use geo::{BooleanOps, BoundingRect, Intersects, MapCoords, MultiPolygon, Point, Polygon};
use serde::{Deserialize, Serialize};

use crate::bbox::BoundingBox;
use crate::crs::{lonlat_to_mercator, mercator_to_lonlat, CrsCode};
use crate::error::CommonError;

/// A (multi)polygon with an associated coordinate reference system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Footprint {
    pub geometry: MultiPolygon<f64>,
    pub crs: CrsCode,
}

impl Footprint {
    pub fn new(geometry: MultiPolygon<f64>, crs: CrsCode) -> Self {
        Self { geometry, crs }
    }

    pub fn from_polygon(polygon: Polygon<f64>, crs: CrsCode) -> Self {
        Self::new(MultiPolygon::new(vec![polygon]), crs)
    }

    /// Rectangle footprint covering a bbox.
    pub fn from_bbox(bbox: &BoundingBox, crs: CrsCode) -> Self {
        let rect: geo::Rect<f64> = (*bbox).into();
        Self::from_polygon(rect.to_polygon(), crs)
    }

    /// Bounding box of the geometry, `None` when it is empty.
    pub fn bbox(&self) -> Option<BoundingBox> {
        self.geometry.bounding_rect().map(BoundingBox::from)
    }

    pub fn is_empty(&self) -> bool {
        self.geometry.0.is_empty()
    }

    /// Normalise the geometry through a boolean union.
    ///
    /// Self-intersecting rings and overlapping parts come back as a valid
    /// multipolygon, so point tests behave the same regardless of how the
    /// source digitised the shape.
    pub fn repaired(&self) -> Footprint {
        let empty = MultiPolygon::<f64>::new(Vec::new());
        Footprint::new(self.geometry.union(&empty), self.crs)
    }

    /// Point test that counts points on the boundary as inside.
    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        self.geometry.intersects(&Point::new(x, y))
    }

    /// Error unless the footprint is expressed in `expected`.
    pub fn ensure_crs(&self, expected: CrsCode) -> Result<(), CommonError> {
        if self.crs == expected {
            Ok(())
        } else {
            Err(CommonError::CrsMismatch {
                expected: expected.to_string(),
                actual: self.crs.to_string(),
            })
        }
    }

    /// Reproject between the built-in CRS pair (EPSG:4326 and EPSG:3857).
    pub fn to_crs(&self, target: CrsCode) -> Result<Footprint, CommonError> {
        let convert: fn(f64, f64) -> (f64, f64) = match (self.crs, target) {
            (a, b) if a == b => return Ok(self.clone()),
            (CrsCode::Epsg4326, CrsCode::Epsg3857) => lonlat_to_mercator,
            (CrsCode::Epsg3857, CrsCode::Epsg4326) => mercator_to_lonlat,
            _ => {
                return Err(CommonError::CrsMismatch {
                    expected: target.to_string(),
                    actual: self.crs.to_string(),
                })
            }
        };

        let geometry = self.geometry.map_coords(|c| {
            let (x, y) = convert(c.x, c.y);
            geo::coord! { x: x, y: y }
        });
        Ok(Footprint::new(geometry, target))
    }

    /// GeoJSON geometry of the footprint (coordinates as stored).
    pub fn to_geojson(&self) -> geojson::Geometry {
        if self.geometry.0.len() == 1 {
            geojson::Geometry::new(geojson::Value::from(&self.geometry.0[0]))
        } else {
            geojson::Geometry::new(geojson::Value::from(&self.geometry))
        }
    }

    /// Read a Polygon or MultiPolygon GeoJSON geometry.
    pub fn from_geojson(geometry: &geojson::Geometry, crs: CrsCode) -> Result<Self, CommonError> {
        let geom = geo::Geometry::<f64>::try_from(geometry.clone())
            .map_err(|e| CommonError::UnsupportedGeometry(e.to_string()))?;
        match geom {
            geo::Geometry::Polygon(p) => Ok(Self::from_polygon(p, crs)),
            geo::Geometry::MultiPolygon(mp) => Ok(Self::new(mp, crs)),
            other => Err(CommonError::UnsupportedGeometry(format!(
                "expected Polygon or MultiPolygon, got {}",
                geometry_kind(&other)
            ))),
        }
    }
}

fn geometry_kind(geom: &geo::Geometry<f64>) -> &'static str {
    match geom {
        geo::Geometry::Point(_) => "Point",
        geo::Geometry::Line(_) => "Line",
        geo::Geometry::LineString(_) => "LineString",
        geo::Geometry::Polygon(_) => "Polygon",
        geo::Geometry::MultiPoint(_) => "MultiPoint",
        geo::Geometry::MultiLineString(_) => "MultiLineString",
        geo::Geometry::MultiPolygon(_) => "MultiPolygon",
        geo::Geometry::GeometryCollection(_) => "GeometryCollection",
        geo::Geometry::Rect(_) => "Rect",
        geo::Geometry::Triangle(_) => "Triangle",
    }
}
