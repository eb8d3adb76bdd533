//! Download manager writing remote files under an explicit base directory.
//!
//! Key features:
//! - Every destination is resolved against `DownloadConfig::base_dir`, never
//!   the process working directory
//! - Overwrite-or-skip policy when the destination already exists
//! - Streaming writes to a `.partial` file, renamed into place on success
//! - No automatic retries: a failed transfer surfaces to the caller

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument};

use crate::error::DownloadError;

/// What to do when the destination file already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverwritePolicy {
    /// Keep the existing file and skip the transfer.
    #[default]
    Skip,
    /// Download again and replace the file.
    Overwrite,
}

/// Configuration for the download manager.
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// Directory every download is written under
    pub base_dir: PathBuf,
    /// Behaviour for destinations that already exist
    pub overwrite: OverwritePolicy,
    /// HTTP request timeout
    pub request_timeout: Duration,
    /// TCP connect timeout
    pub connect_timeout: Duration,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("data"),
            overwrite: OverwritePolicy::Skip,
            request_timeout: Duration::from_secs(600), // 10 minutes
            connect_timeout: Duration::from_secs(30),
        }
    }
}

/// Result of a single download call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOutcome {
    /// Final location of the file
    pub path: PathBuf,
    /// True when an existing file was kept
    pub skipped: bool,
    /// Bytes written in this call (0 when skipped)
    pub bytes: u64,
}

/// Fetches remote resources to disk or memory.
#[derive(Debug, Clone)]
pub struct DownloadManager {
    client: Client,
    config: DownloadConfig,
}

impl DownloadManager {
    /// Create a new download manager with the given configuration.
    pub fn new(config: DownloadConfig) -> Result<Self, DownloadError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .pool_max_idle_per_host(4)
            .tcp_nodelay(true)
            .build()
            .map_err(|e| DownloadError::Client(e.to_string()))?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &DownloadConfig {
        &self.config
    }

    /// Absolute destination for a path relative to the base directory.
    pub fn destination(&self, relative: &Path) -> PathBuf {
        self.config.base_dir.join(relative)
    }

    /// Download `url` to `base_dir/relative`, honouring the overwrite policy.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn download(&self, url: &str, relative: &Path) -> Result<DownloadOutcome, DownloadError> {
        check_relative(relative)?;
        let final_path = self.destination(relative);

        if final_path.exists() && self.config.overwrite == OverwritePolicy::Skip {
            info!(path = %final_path.display(), "File already exists, skipping download");
            return Ok(DownloadOutcome {
                path: final_path,
                skipped: true,
                bytes: 0,
            });
        }

        if let Some(parent) = final_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| DownloadError::io(parent, e))?;
        }

        let temp_path = partial_path(&final_path);
        let response = self.get(url).await?;

        info!(
            url = %url,
            path = %final_path.display(),
            content_length = ?response.content_length(),
            "Starting download"
        );

        let bytes = match stream_to_file(response, url, &temp_path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                fs::remove_file(&temp_path).await.ok();
                return Err(e);
            }
        };

        if final_path.exists() {
            fs::remove_file(&final_path)
                .await
                .map_err(|e| DownloadError::io(&final_path, e))?;
        }

        // Move to final location (use copy+delete for cross-filesystem support)
        if fs::rename(&temp_path, &final_path).await.is_err() {
            fs::copy(&temp_path, &final_path)
                .await
                .map_err(|e| DownloadError::io(&final_path, e))?;
            fs::remove_file(&temp_path).await.ok();
        }

        info!(path = %final_path.display(), bytes = bytes, "Download completed");

        Ok(DownloadOutcome {
            path: final_path,
            skipped: false,
            bytes,
        })
    }

    /// Fetch a whole response body into memory.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn fetch_bytes(&self, url: &str) -> Result<Bytes, DownloadError> {
        let response = self.get(url).await?;
        let body = response
            .bytes()
            .await
            .map_err(|e| DownloadError::from_reqwest(url, e))?;
        debug!(bytes = body.len(), "Fetched into memory");
        Ok(body)
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response, DownloadError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| DownloadError::from_reqwest(url, e))?;

        if !response.status().is_success() {
            return Err(DownloadError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }
        Ok(response)
    }
}

/// File name component of a URL path, without query string or fragment.
pub fn filename_from_url(url: &str) -> Option<String> {
    let without_query = url.split(['?', '#']).next()?;
    let name = without_query.rsplit('/').next()?;
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

/// Only plain names: no root, `.` or `..` components.
fn check_relative(relative: &Path) -> Result<(), DownloadError> {
    let mut components = relative.components().peekable();
    if components.peek().is_none() || !components.all(|c| matches!(c, Component::Normal(_))) {
        return Err(DownloadError::UnsafePath {
            path: relative.display().to_string(),
        });
    }
    Ok(())
}

fn partial_path(final_path: &Path) -> PathBuf {
    let mut name = final_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".partial");
    final_path.with_file_name(name)
}

/// Stream response body to file.
async fn stream_to_file(
    response: reqwest::Response,
    url: &str,
    path: &Path,
) -> Result<u64, DownloadError> {
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)
        .await
        .map_err(|e| DownloadError::io(path, e))?;

    let mut stream = response.bytes_stream();
    let mut written = 0u64;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| DownloadError::from_reqwest(url, e))?;
        file.write_all(&chunk)
            .await
            .map_err(|e| DownloadError::io(path, e))?;
        written += chunk.len() as u64;
    }

    // Flush and sync
    file.flush().await.map_err(|e| DownloadError::io(path, e))?;
    file.sync_all().await.map_err(|e| DownloadError::io(path, e))?;

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filename_from_url() {
        assert_eq!(
            filename_from_url("https://example.com/a/b/tile.tif?sig=abc").as_deref(),
            Some("tile.tif")
        );
        assert_eq!(filename_from_url("https://example.com/dir/"), None);
    }

    #[test]
    fn test_partial_path() {
        let p = partial_path(Path::new("/data/x/basins.zip"));
        assert_eq!(p, PathBuf::from("/data/x/basins.zip.partial"));
    }

    #[test]
    fn test_check_relative() {
        assert!(check_relative(Path::new("nex-gddp-cmip6/item/tas.nc")).is_ok());
        assert!(check_relative(Path::new("../outside.tif")).is_err());
        assert!(check_relative(Path::new("a/../../b")).is_err());
        assert!(check_relative(Path::new("/etc/passwd")).is_err());
        assert!(check_relative(Path::new("")).is_err());
    }

    #[tokio::test]
    async fn test_parent_components_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        let manager = DownloadManager::new(DownloadConfig {
            base_dir: dir.path().join("storage"),
            ..DownloadConfig::default()
        })
        .unwrap();

        let err = manager
            .download("http://127.0.0.1:9/x.tif", Path::new("../x.tif"))
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::UnsafePath { .. }));
        assert!(!dir.path().join("x.tif").exists());
    }

    #[tokio::test]
    async fn test_skip_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("cached.bin"), b"old").unwrap();

        let manager = DownloadManager::new(DownloadConfig {
            base_dir: dir.path().to_path_buf(),
            ..DownloadConfig::default()
        })
        .unwrap();

        // Unroutable URL: reaching the network would fail the test.
        let outcome = manager
            .download("http://127.0.0.1:9/cached.bin", Path::new("cached.bin"))
            .await
            .unwrap();
        assert!(outcome.skipped);
        assert_eq!(std::fs::read(outcome.path).unwrap(), b"old");
    }
}
