//! CRS detection from shapefile `.prj` (ESRI WKT) sidecars.

use basin_common::CrsCode;

/// Identify the CRS described by a `.prj` WKT string.
///
/// Recognises an explicit top-level `AUTHORITY["EPSG", ...]`, geographic WGS84
/// and Web Mercator. Anything else is `None`.
pub fn crs_from_wkt(wkt: &str) -> Option<CrsCode> {
    let upper = wkt.trim_start_matches('\u{feff}').trim().to_ascii_uppercase();

    if let Some(code) = top_level_epsg(&upper) {
        return Some(CrsCode::from_epsg(code));
    }

    if upper.starts_with("PROJCS") {
        if upper.contains("MERCATOR_AUXILIARY_SPHERE")
            || upper.contains("WGS_1984_WEB_MERCATOR")
            || upper.contains("PSEUDO-MERCATOR")
            || upper.contains("PSEUDO_MERCATOR")
        {
            return Some(CrsCode::Epsg3857);
        }
        return None;
    }

    if upper.starts_with("GEOGCS") && (upper.contains("WGS_1984") || upper.contains("WGS 84")) {
        return Some(CrsCode::Epsg4326);
    }

    None
}

/// The EPSG code in the last `AUTHORITY` clause, which belongs to the outermost
/// definition in WKT1.
fn top_level_epsg(upper: &str) -> Option<u32> {
    let idx = upper.rfind("AUTHORITY[\"EPSG\"")?;
    let rest = &upper[idx + "AUTHORITY[\"EPSG\"".len()..];
    let digits: String = rest
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const WGS84_ESRI: &str = r#"GEOGCS["GCS_WGS_1984",DATUM["D_WGS_1984",SPHEROID["WGS_1984",6378137.0,298.257223563]],PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]]"#;

    const WEB_MERCATOR_ESRI: &str = r#"PROJCS["WGS_1984_Web_Mercator_Auxiliary_Sphere",GEOGCS["GCS_WGS_1984",DATUM["D_WGS_1984",SPHEROID["WGS_1984",6378137.0,298.257223563]],PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]],PROJECTION["Mercator_Auxiliary_Sphere"],UNIT["Meter",1.0]]"#;

    const UTM_OGC: &str = r#"PROJCS["WGS 84 / UTM zone 30N",GEOGCS["WGS 84",DATUM["WGS_1984",SPHEROID["WGS 84",6378137,298.257223563,AUTHORITY["EPSG","7030"]],AUTHORITY["EPSG","6326"]],AUTHORITY["EPSG","4326"]],PROJECTION["Transverse_Mercator"],UNIT["metre",1,AUTHORITY["EPSG","9001"]],AUTHORITY["EPSG","32630"]]"#;

    #[test]
    fn test_esri_wgs84() {
        assert_eq!(crs_from_wkt(WGS84_ESRI), Some(CrsCode::Epsg4326));
    }

    #[test]
    fn test_esri_web_mercator() {
        assert_eq!(crs_from_wkt(WEB_MERCATOR_ESRI), Some(CrsCode::Epsg3857));
    }

    #[test]
    fn test_authority_clause_wins() {
        assert_eq!(crs_from_wkt(UTM_OGC), Some(CrsCode::Other(32630)));
    }

    #[test]
    fn test_unknown_projection() {
        let lambert = r#"PROJCS["Merchich_Nord_Maroc",GEOGCS["GCS_Merchich"],PROJECTION["Lambert_Conformal_Conic"]]"#;
        assert_eq!(crs_from_wkt(lambert), None);
    }
}
