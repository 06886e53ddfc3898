//! Download step
//!
//! HTTP sources are streamed chunk by chunk to disk; `file://` URLs and
//! bare paths are copied. Either way the sha-256 of the bytes written is
//! computed on the fly.

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info};

use crate::error::{UpdaterError, UpdaterResult};

const COPY_BUFFER_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOutcome {
    pub path: PathBuf,
    pub bytes: u64,
    pub sha256: String,
}

#[derive(Debug, Clone)]
pub struct Downloader {
    client: reqwest::Client,
}

impl Downloader {
    pub fn new(timeout: Duration) -> UpdaterResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("ubind-updater/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    /// Fetches `source` into `target`
    pub async fn download(&self, source: &str, target: &Path) -> UpdaterResult<DownloadOutcome> {
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let outcome = match local_path(source) {
            Some(path) => copy_local(&path, target).await?,
            None => self.fetch(source, target).await?,
        };

        info!(
            source,
            bytes = outcome.bytes,
            sha256 = %outcome.sha256,
            "Downloaded data set archive"
        );
        Ok(outcome)
    }

    async fn fetch(&self, url: &str, target: &Path) -> UpdaterResult<DownloadOutcome> {
        let mut response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(UpdaterError::Download(format!("{} returned {}", url, status)));
        }

        let mut file = File::create(target).await?;
        let mut hasher = Sha256::new();
        let mut bytes = 0u64;

        while let Some(chunk) = response.chunk().await? {
            hasher.update(&chunk);
            file.write_all(&chunk).await?;
            bytes += chunk.len() as u64;
        }
        file.flush().await?;
        debug!(url, bytes, "Stream complete");

        Ok(DownloadOutcome {
            path: target.to_path_buf(),
            bytes,
            sha256: hex::encode(hasher.finalize()),
        })
    }
}

/// Local path for `file://` URLs and anything without a scheme
fn local_path(source: &str) -> Option<PathBuf> {
    if let Some(path) = source.strip_prefix("file://") {
        return Some(PathBuf::from(path));
    }
    if source.contains("://") {
        None
    } else {
        Some(PathBuf::from(source))
    }
}

async fn copy_local(source: &Path, target: &Path) -> UpdaterResult<DownloadOutcome> {
    let mut input = File::open(source)
        .await
        .map_err(|e| UpdaterError::Download(format!("{}: {}", source.display(), e)))?;
    let mut output = File::create(target).await?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; COPY_BUFFER_SIZE];
    let mut bytes = 0u64;

    loop {
        let read = input.read(&mut buffer).await?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
        output.write_all(&buffer[..read]).await?;
        bytes += read as u64;
    }
    output.flush().await?;

    Ok(DownloadOutcome {
        path: target.to_path_buf(),
        bytes,
        sha256: hex::encode(hasher.finalize()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_path_detection() {
        assert_eq!(local_path("file:///data/gnaf.zip"), Some(PathBuf::from("/data/gnaf.zip")));
        assert_eq!(local_path("/data/gnaf.zip"), Some(PathBuf::from("/data/gnaf.zip")));
        assert_eq!(local_path("https://example.com/gnaf.zip"), None);
    }

    #[tokio::test]
    async fn test_local_copy_hashes_content() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("source.bin");
        tokio::fs::write(&source, b"abc").await.unwrap();

        let downloader = Downloader::new(Duration::from_secs(5)).unwrap();
        let target = dir.path().join("work").join("archive.bin");
        let outcome = downloader
            .download(&format!("file://{}", source.display()), &target)
            .await
            .unwrap();

        assert_eq!(outcome.bytes, 3);
        assert_eq!(
            outcome.sha256,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(tokio::fs::read(&target).await.unwrap(), b"abc");
    }

    #[tokio::test]
    async fn test_missing_local_source_fails() {
        let dir = tempfile::tempdir().unwrap();
        let downloader = Downloader::new(Duration::from_secs(5)).unwrap();
        let result = downloader
            .download("/definitely/not/here.zip", &dir.path().join("x.zip"))
            .await;
        assert!(matches!(result, Err(UpdaterError::Download(_))));
    }
}
