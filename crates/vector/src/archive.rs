//! Zipped shapefile download and extraction.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument, warn};
use zip::ZipArchive;

use basin_common::download::filename_from_url;
use basin_common::{DownloadManager, OverwritePolicy};

use crate::error::{VectorError, VectorResult};

/// Shapefile member extensions kept when extracting.
const SHAPEFILE_MEMBERS: [&str; 5] = ["shp", "shx", "dbf", "prj", "cpg"];

/// Sub-directory of the download base directory used for boundary archives.
const BOUNDARY_DIR: &str = "boundaries";

/// Downloads boundary archives through a [`DownloadManager`].
#[derive(Debug, Clone)]
pub struct ArchiveFetcher {
    downloads: DownloadManager,
}

/// Directory holding the extracted shapefile members of one archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedArchive {
    pub dir: PathBuf,
    pub files: Vec<PathBuf>,
}

impl ArchiveFetcher {
    pub fn new(downloads: DownloadManager) -> Self {
        Self { downloads }
    }

    /// Download `url` (unless already present) and extract its shapefile members
    /// next to it.
    #[instrument(skip(self))]
    pub async fn fetch_and_extract(&self, url: &str) -> VectorResult<ExtractedArchive> {
        let name = filename_from_url(url).unwrap_or_else(|| "boundary.zip".to_string());
        let relative = Path::new(BOUNDARY_DIR).join(&name);
        let outcome = self.downloads.download(url, &relative).await?;

        let stem = Path::new(&name)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "boundary".to_string());
        let target = self.downloads.destination(&Path::new(BOUNDARY_DIR).join(stem));
        let overwrite = self.downloads.config().overwrite;

        let zip_path = outcome.path.clone();
        let extracted = tokio::task::spawn_blocking(move || {
            extract_shapefile_members(&zip_path, &target, overwrite)
        })
        .await
        .map_err(|e| VectorError::Archive {
            path: outcome.path.clone(),
            message: format!("extraction task failed: {}", e),
        })??;

        info!(
            dir = %extracted.dir.display(),
            files = extracted.files.len(),
            "Boundary archive ready"
        );
        Ok(extracted)
    }
}

/// Extract `.shp .shx .dbf .prj .cpg` members of a zip into `target`.
///
/// Member directories are flattened. Entries whose names would escape the
/// target directory are rejected.
pub fn extract_shapefile_members(
    zip_path: &Path,
    target: &Path,
    overwrite: OverwritePolicy,
) -> VectorResult<ExtractedArchive> {
    let file = File::open(zip_path).map_err(|e| VectorError::io(zip_path, e))?;
    let mut archive = ZipArchive::new(file).map_err(|e| VectorError::Archive {
        path: zip_path.to_path_buf(),
        message: e.to_string(),
    })?;

    std::fs::create_dir_all(target).map_err(|e| VectorError::io(target, e))?;

    let mut files = Vec::new();
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(|e| VectorError::Archive {
            path: zip_path.to_path_buf(),
            message: format!("entry {}: {}", i, e),
        })?;
        if entry.is_dir() {
            continue;
        }

        let Some(enclosed) = entry.enclosed_name().map(Path::to_path_buf) else {
            return Err(VectorError::Archive {
                path: zip_path.to_path_buf(),
                message: format!("entry '{}' escapes the extraction directory", entry.name()),
            });
        };

        let is_member = enclosed
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| SHAPEFILE_MEMBERS.contains(&e.to_ascii_lowercase().as_str()))
            .unwrap_or(false);
        if !is_member {
            debug!(entry = %entry.name(), "Skipping non-shapefile member");
            continue;
        }

        let Some(file_name) = enclosed.file_name() else {
            continue;
        };
        let out_path = target.join(file_name);

        if out_path.exists() && overwrite == OverwritePolicy::Skip {
            debug!(path = %out_path.display(), "Member already extracted");
        } else {
            let mut out = File::create(&out_path).map_err(|e| VectorError::io(&out_path, e))?;
            io::copy(&mut entry, &mut out).map_err(|e| VectorError::io(&out_path, e))?;
        }
        files.push(out_path);
    }

    if files.is_empty() {
        warn!(archive = %zip_path.display(), "Archive holds no shapefile members");
    }
    files.sort();

    Ok(ExtractedArchive {
        dir: target.to_path_buf(),
        files,
    })
}

impl ExtractedArchive {
    /// Path of the `.shp` to read.
    ///
    /// With `layer` set, the file whose stem matches it (case-insensitive).
    /// Without it, the only `.shp` in the archive.
    pub fn shapefile(&self, layer: Option<&str>) -> VectorResult<PathBuf> {
        let shps: Vec<&PathBuf> = self
            .files
            .iter()
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .map_or(false, |e| e.eq_ignore_ascii_case("shp"))
            })
            .collect();

        match layer {
            Some(name) => shps
                .into_iter()
                .find(|p| {
                    p.file_stem()
                        .and_then(|s| s.to_str())
                        .map_or(false, |s| s.eq_ignore_ascii_case(name))
                })
                .cloned()
                .ok_or_else(|| VectorError::NoShapefile(self.dir.join(format!("{}.shp", name)))),
            None => match shps.as_slice() {
                [] => Err(VectorError::NoShapefile(self.dir.clone())),
                [only] => Ok((*only).clone()),
                many => Err(VectorError::AmbiguousShapefile(
                    many.iter()
                        .filter_map(|p| p.file_stem().map(|s| s.to_string_lossy().into_owned()))
                        .collect::<Vec<_>>()
                        .join(", "),
                )),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::FileOptions;

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        for (name, data) in entries {
            zip.start_file(*name, FileOptions::default()).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn test_extracts_only_shapefile_members() {
        let dir = tempfile::tempdir().unwrap();
        let zip_path = dir.path().join("basins.zip");
        write_zip(
            &zip_path,
            &[
                ("hybas/basins.shp", b"shp"),
                ("hybas/basins.dbf", b"dbf"),
                ("hybas/basins.PRJ", b"prj"),
                ("README.txt", b"docs"),
            ],
        );

        let target = dir.path().join("out");
        let extracted = extract_shapefile_members(&zip_path, &target, OverwritePolicy::Skip).unwrap();
        assert_eq!(extracted.files.len(), 3);
        assert!(target.join("basins.shp").exists());
        assert!(!target.join("README.txt").exists());
        assert_eq!(extracted.shapefile(None).unwrap(), target.join("basins.shp"));
    }

    #[test]
    fn test_rejects_escaping_entries() {
        let dir = tempfile::tempdir().unwrap();
        let zip_path = dir.path().join("evil.zip");
        write_zip(&zip_path, &[("../../etc/evil.shp", b"x")]);

        let err = extract_shapefile_members(&zip_path, &dir.path().join("out"), OverwritePolicy::Skip)
            .unwrap_err();
        assert!(matches!(err, VectorError::Archive { .. }));
    }

    #[test]
    fn test_shapefile_choice() {
        let archive = ExtractedArchive {
            dir: PathBuf::from("/d"),
            files: vec![
                PathBuf::from("/d/lev06.shp"),
                PathBuf::from("/d/lev07.shp"),
                PathBuf::from("/d/lev07.dbf"),
            ],
        };
        assert!(matches!(
            archive.shapefile(None),
            Err(VectorError::AmbiguousShapefile(_))
        ));
        assert_eq!(
            archive.shapefile(Some("LEV07")).unwrap(),
            PathBuf::from("/d/lev07.shp")
        );
        assert!(matches!(
            archive.shapefile(Some("lev08")),
            Err(VectorError::NoShapefile(_))
        ));
    }
}
