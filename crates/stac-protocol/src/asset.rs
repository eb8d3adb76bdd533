//! STAC asset descriptors.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One file attached to an item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    /// URL to the asset file.
    pub href: String,

    /// Media type (e.g., `"image/tiff; application=geotiff; profile=cloud-optimized"`).
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Roles: `["data"]`, `["thumbnail"]`, `["overview"]`, etc.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,

    /// All other asset fields.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// Raster container formats the workflow can open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetFormat {
    GeoTiff,
    NetCdf,
    Unknown,
}

impl Asset {
    pub fn new(href: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            media_type: None,
            title: None,
            roles: Vec::new(),
            extra: HashMap::new(),
        }
    }

    pub fn with_media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = Some(media_type.into());
        self
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    /// Guess the container format from the media type, then the href suffix.
    pub fn format(&self) -> AssetFormat {
        if let Some(mt) = self.media_type.as_deref() {
            let mt = mt.to_ascii_lowercase();
            if mt.contains("tiff") {
                return AssetFormat::GeoTiff;
            }
            if mt.contains("netcdf") || mt.contains("x-netcdf") {
                return AssetFormat::NetCdf;
            }
        }
        format_from_path(&self.href)
    }
}

/// Format guess from a URL or file path suffix.
pub fn format_from_path(path: &str) -> AssetFormat {
    let path = path.split(['?', '#']).next().unwrap_or(path).to_ascii_lowercase();
    if path.ends_with(".tif") || path.ends_with(".tiff") {
        AssetFormat::GeoTiff
    } else if path.ends_with(".nc") || path.ends_with(".nc4") {
        AssetFormat::NetCdf
    } else {
        AssetFormat::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_detection() {
        let cog = Asset::new("https://x/y/elevation.tif?st=1");
        assert_eq!(cog.format(), AssetFormat::GeoTiff);

        let nc = Asset::new("https://x/tasmax/2030.nc").with_media_type("application/netcdf");
        assert_eq!(nc.format(), AssetFormat::NetCdf);

        let by_type = Asset::new("https://x/blob").with_media_type(crate::media_types::COG);
        assert_eq!(by_type.format(), AssetFormat::GeoTiff);

        assert_eq!(Asset::new("https://x/readme.md").format(), AssetFormat::Unknown);
    }
}
