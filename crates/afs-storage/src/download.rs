//! Object store downloader
//!
//! Mirrors manifest entries into a local directory, preserving the key
//! layout below the bucket. A failed file is logged and counted; the batch
//! keeps going.

use crate::manifest::{ManifestEntry, PathFilter};
use object_store::aws::AmazonS3Builder;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

/// Download error types
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("Storage error: {0}")]
    Store(#[from] object_store::Error),

    #[error("Failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Checksum mismatch for {key}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        key: String,
        expected: String,
        actual: String,
    },

    #[error("Refusing to write outside the output directory: {0}")]
    UnsafePath(String),

    #[error("Invalid object key {key}: {source}")]
    InvalidKey {
        key: String,
        #[source]
        source: object_store::path::Error,
    },
}

/// Counts for a finished batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadSummary {
    pub downloaded: usize,

    /// (key, error message) per failed file
    pub failures: Vec<(String, String)>,
}

impl DownloadSummary {
    pub fn failed(&self) -> usize {
        self.failures.len()
    }
}

/// S3 store for `bucket`, configured from the standard AWS environment
pub fn s3_store(bucket: &str) -> Result<Arc<dyn ObjectStore>, DownloadError> {
    let store = AmazonS3Builder::from_env().with_bucket_name(bucket).build()?;
    Ok(Arc::new(store))
}

/// Copies manifest entries from an object store to disk
pub struct Downloader {
    store: Arc<dyn ObjectStore>,
    filter: PathFilter,
    output_dir: PathBuf,
    verify: bool,
}

impl Downloader {
    pub fn new(store: Arc<dyn ObjectStore>, filter: PathFilter, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            filter,
            output_dir: output_dir.into(),
            verify: false,
        }
    }

    /// Compare the md5 of each download against the manifest checksum
    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    /// Storage key of an entry
    pub fn key<'a>(&self, entry: &'a ManifestEntry) -> &'a str {
        self.filter.key(&entry.path)
    }

    /// Where an entry lands on disk
    pub fn local_path(&self, entry: &ManifestEntry) -> Result<PathBuf, DownloadError> {
        let key = self.key(entry);
        let relative = Path::new(key);

        let safe = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if !safe || key.is_empty() {
            return Err(DownloadError::UnsafePath(key.to_string()));
        }

        Ok(self.output_dir.join(relative))
    }

    /// Download one entry, returning the local path
    pub async fn download(&self, entry: &ManifestEntry) -> Result<PathBuf, DownloadError> {
        let key = self.key(entry);
        let target = self.local_path(entry)?;
        let location = object_path(key)?;

        let bytes = self
            .store
            .get(&location)
            .await?
            .bytes()
            .await?;

        if self.verify {
            verify_md5(key, entry.md5.as_deref(), &bytes)?;
        }

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| DownloadError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        tokio::fs::write(&target, &bytes)
            .await
            .map_err(|source| DownloadError::Io {
                path: target.clone(),
                source,
            })?;

        tracing::debug!(key, bytes = bytes.len(), "Saved {}", target.display());
        Ok(target)
    }

    /// Download every entry in order
    pub async fn download_all(&self, entries: &[ManifestEntry]) -> DownloadSummary {
        let mut summary = DownloadSummary::default();

        for entry in entries {
            let key = self.key(entry);
            tracing::info!("Downloading: {}", key);

            match self.download(entry).await {
                Ok(_) => summary.downloaded += 1,
                Err(e) => {
                    tracing::error!("Error downloading {}: {}", key, e);
                    summary.failures.push((key.to_string(), e.to_string()));
                }
            }
        }

        summary
    }
}

/// Store location for a key, taken verbatim (no percent-encoding)
fn object_path(key: &str) -> Result<ObjectPath, DownloadError> {
    ObjectPath::parse(key).map_err(|source| DownloadError::InvalidKey {
        key: key.to_string(),
        source,
    })
}

/// Check `bytes` against a listed md5
///
/// Entries without a usable checksum are accepted; multipart uploads list an
/// etag that is not a plain md5 and is skipped the same way.
fn verify_md5(key: &str, expected: Option<&str>, bytes: &[u8]) -> Result<(), DownloadError> {
    let Some(expected) = expected.map(str::trim) else {
        return Ok(());
    };
    if expected.len() != 32 || !expected.chars().all(|c| c.is_ascii_hexdigit()) {
        tracing::debug!(key, "Skipping checksum, not an md5 digest: {}", expected);
        return Ok(());
    }

    let actual = format!("{:x}", md5::compute(bytes));
    if actual.eq_ignore_ascii_case(expected) {
        Ok(())
    } else {
        Err(DownloadError::ChecksumMismatch {
            key: key.to_string(),
            expected: expected.to_string(),
            actual,
        })
    }
}
