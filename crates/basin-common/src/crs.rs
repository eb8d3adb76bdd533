//! Coordinate Reference System types and utilities.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Web Mercator sphere radius in meters.
const EARTH_RADIUS: f64 = 6378137.0;

/// Latitude limit of the Web Mercator square.
const MAX_MERCATOR_LAT: f64 = 85.051_128_779_806_59;

/// A CRS identified by its EPSG code.
///
/// The two codes the workflow can convert between get their own variants;
/// anything else is carried as an opaque code and must match exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum CrsCode {
    /// WGS84 Geographic (lon/lat in degrees)
    Epsg4326,
    /// Web Mercator (meters)
    Epsg3857,
    /// Any other EPSG code
    Other(u32),
}

impl CrsCode {
    /// Normalise a raw EPSG code into a variant.
    pub fn from_epsg(code: u32) -> Self {
        match code {
            4326 => CrsCode::Epsg4326,
            3857 | 900913 => CrsCode::Epsg3857,
            other => CrsCode::Other(other),
        }
    }

    /// Parse a CRS string.
    ///
    /// Accepts formats like:
    /// - "EPSG:4326"
    /// - "epsg:4326"
    /// - "CRS:84" (equivalent to EPSG:4326 with lon/lat axis order)
    /// - "4326"
    pub fn parse(s: &str) -> Result<Self, CrsParseError> {
        let normalized = s.trim().to_uppercase();
        if normalized == "CRS:84" || normalized == "OGC:CRS84" {
            return Ok(CrsCode::Epsg4326);
        }

        let digits = normalized.strip_prefix("EPSG:").unwrap_or(&normalized);
        digits
            .parse::<u32>()
            .map(CrsCode::from_epsg)
            .map_err(|_| CrsParseError::UnsupportedCrs(s.to_string()))
    }

    /// The numeric EPSG code.
    pub fn epsg(&self) -> u32 {
        match self {
            CrsCode::Epsg4326 => 4326,
            CrsCode::Epsg3857 => 3857,
            CrsCode::Other(code) => *code,
        }
    }

    /// Check if this is a geographic (lat/lon) CRS.
    pub fn is_geographic(&self) -> bool {
        matches!(self, CrsCode::Epsg4326)
    }

    /// Whether points can be converted from `self` into `target`.
    pub fn can_convert_to(&self, target: CrsCode) -> bool {
        *self == target
            || matches!(
                (self, target),
                (CrsCode::Epsg4326, CrsCode::Epsg3857) | (CrsCode::Epsg3857, CrsCode::Epsg4326)
            )
    }

    /// Convert a single coordinate into `target`.
    pub fn convert_point(&self, x: f64, y: f64, target: CrsCode) -> Result<(f64, f64), CrsParseError> {
        match (self, target) {
            (a, b) if *a == b => Ok((x, y)),
            (CrsCode::Epsg4326, CrsCode::Epsg3857) => Ok(lonlat_to_mercator(x, y)),
            (CrsCode::Epsg3857, CrsCode::Epsg4326) => Ok(mercator_to_lonlat(x, y)),
            _ => Err(CrsParseError::NoConversion {
                from: self.to_string(),
                to: target.to_string(),
            }),
        }
    }
}

/// Project lon/lat degrees to Web Mercator meters.
pub fn lonlat_to_mercator(lon: f64, lat: f64) -> (f64, f64) {
    let lat = lat.clamp(-MAX_MERCATOR_LAT, MAX_MERCATOR_LAT);
    let x = lon.to_radians() * EARTH_RADIUS;
    let y = (std::f64::consts::FRAC_PI_4 + lat.to_radians() / 2.0).tan().ln() * EARTH_RADIUS;
    (x, y)
}

/// Inverse of [`lonlat_to_mercator`].
pub fn mercator_to_lonlat(x: f64, y: f64) -> (f64, f64) {
    let lon = (x / EARTH_RADIUS).to_degrees();
    let lat = (2.0 * (y / EARTH_RADIUS).exp().atan() - std::f64::consts::FRAC_PI_2).to_degrees();
    (lon, lat)
}

impl fmt::Display for CrsCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.epsg())
    }
}

impl FromStr for CrsCode {
    type Err = CrsParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CrsCode::parse(s)
    }
}

impl TryFrom<String> for CrsCode {
    type Error = CrsParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        CrsCode::parse(&value)
    }
}

impl From<CrsCode> for String {
    fn from(code: CrsCode) -> Self {
        code.to_string()
    }
}

impl Default for CrsCode {
    fn default() -> Self {
        CrsCode::Epsg4326
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CrsParseError {
    #[error("Unsupported CRS: {0}")]
    UnsupportedCrs(String),

    #[error("No conversion from {from} to {to}; reproject explicitly")]
    NoConversion { from: String, to: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_crs() {
        assert_eq!(CrsCode::parse("EPSG:4326").unwrap(), CrsCode::Epsg4326);
        assert_eq!(CrsCode::parse("epsg:3857").unwrap(), CrsCode::Epsg3857);
        assert_eq!(CrsCode::parse("CRS:84").unwrap(), CrsCode::Epsg4326);
        assert_eq!(CrsCode::parse("32630").unwrap(), CrsCode::Other(32630));
        assert!(CrsCode::parse("EPSG:abc").is_err());
    }

    #[test]
    fn test_mercator_round_trip() {
        let (x, y) = lonlat_to_mercator(-5.93, 34.18);
        let (lon, lat) = mercator_to_lonlat(x, y);
        assert!((lon - -5.93).abs() < 1e-9);
        assert!((lat - 34.18).abs() < 1e-9);
    }

    #[test]
    fn test_unrelated_codes_do_not_convert() {
        let utm = CrsCode::Other(32630);
        assert!(!utm.can_convert_to(CrsCode::Epsg4326));
        assert!(utm.convert_point(0.0, 0.0, CrsCode::Epsg4326).is_err());
        assert_eq!(utm.convert_point(1.0, 2.0, utm).unwrap(), (1.0, 2.0));
    }

    #[test]
    fn test_serde_as_string() {
        let json = serde_json::to_string(&CrsCode::Epsg3857).unwrap();
        assert_eq!(json, "\"EPSG:3857\"");
        let back: CrsCode = serde_json::from_str("\"EPSG:4326\"").unwrap();
        assert_eq!(back, CrsCode::Epsg4326);
    }
}
