//! Data dictionary downloads
//!
//! Reads the bucket listing manifest, keeps the entries under the data
//! dictionary prefix and mirrors them from object storage into a local
//! directory.

pub mod manifest;
pub mod download;

pub use manifest::{Manifest, ManifestEntry, ManifestError, PathFilter, DEFAULT_BUCKET, DATA_DICTIONARY_PREFIX, DEFAULT_MANIFEST};
pub use download::{Downloader, DownloadError, DownloadSummary, s3_store};
