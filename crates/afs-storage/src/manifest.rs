//! Bucket listing manifest (s3_file_list.csv)
//!
//! One row per object: `name` holds the full `s3://bucket/key` URI, `size`
//! and `md5` are optional.

use serde::Deserialize;
use std::io::Read;
use std::path::{Path, PathBuf};

pub const DEFAULT_BUCKET: &str = "afs-akkio";
pub const DATA_DICTIONARY_PREFIX: &str = "files_from_affinity/Data_dictionary/";
pub const DEFAULT_MANIFEST: &str = "s3_file_list.csv";

#[derive(Debug, Deserialize)]
struct ManifestRow {
    name: String,
    #[serde(default)]
    size: Option<String>,
    #[serde(default)]
    md5: Option<String>,
}

/// One object listed in the manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    /// Full storage URI
    pub path: String,

    /// Object size in bytes (0 when unknown)
    pub size: u64,

    /// Checksum as listed, if any
    pub md5: Option<String>,
}

impl From<ManifestRow> for ManifestEntry {
    fn from(row: ManifestRow) -> Self {
        Self {
            path: row.name,
            size: row
                .size
                .as_deref()
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(0),
            md5: row.md5.filter(|m| !m.trim().is_empty()),
        }
    }
}

/// Selects manifest entries under a key prefix of one bucket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathFilter {
    bucket: String,
    prefix: String,
}

impl PathFilter {
    pub fn new(bucket: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            prefix: prefix.into(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Storage key for a manifest path (`s3://bucket/` stripped)
    pub fn key<'a>(&self, path: &'a str) -> &'a str {
        path.strip_prefix("s3://")
            .and_then(|rest| rest.strip_prefix(self.bucket.as_str()))
            .and_then(|rest| rest.strip_prefix('/'))
            .unwrap_or(path)
    }

    pub fn matches(&self, path: &str) -> bool {
        self.key(path).starts_with(&self.prefix)
    }
}

impl Default for PathFilter {
    fn default() -> Self {
        Self::new(DEFAULT_BUCKET, DATA_DICTIONARY_PREFIX)
    }
}

/// Parsed manifest
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    pub entries: Vec<ManifestEntry>,
}

impl Manifest {
    /// Load manifest from file
    pub fn from_file(path: &Path) -> Result<Self, ManifestError> {
        if !path.exists() {
            return Err(ManifestError::NotFound(path.to_path_buf()));
        }

        let file = std::fs::File::open(path)
            .map_err(|e| ManifestError::IoError(path.display().to_string(), e.to_string()))?;

        Self::from_reader(file)
    }

    /// Parse manifest CSV from any reader
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, ManifestError> {
        let mut rdr = csv::Reader::from_reader(reader);

        let headers = rdr
            .headers()
            .map_err(|e| ManifestError::ParseError(e.to_string()))?;
        if !headers.iter().any(|h| h == "name") {
            return Err(ManifestError::MissingColumn("name"));
        }

        let entries = rdr
            .deserialize::<ManifestRow>()
            .map(|row| row.map(ManifestEntry::from))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ManifestError::ParseError(e.to_string()))?;

        Ok(Self { entries })
    }

    /// Entries accepted by `filter`, in manifest order
    pub fn select(&self, filter: &PathFilter) -> Vec<ManifestEntry> {
        self.entries
            .iter()
            .filter(|entry| filter.matches(&entry.path))
            .cloned()
            .collect()
    }
}

/// Manifest error types
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("{} not found!", .0.display())]
    NotFound(PathBuf),

    #[error("Failed to read {0}: {1}")]
    IoError(String, String),

    #[error("Failed to parse manifest: {0}")]
    ParseError(String),

    #[error("Manifest is missing the '{0}' column")]
    MissingColumn(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = "\
name,size,md5
s3://afs-akkio/files_from_affinity/Data_dictionary/x.pdf,2048,5d41402abc4b2a76b9719d911017c592
s3://afs-akkio/other_folder/file.csv,10,
s3://afs-akkio/files_from_affinity/Data_dictionary/sub/y.xlsx,,
s3://afs-akkio/files_from_affinity/tables/t.parquet,99,abc
";

    #[test]
    fn data_dictionary_paths_are_selected() {
        let filter = PathFilter::default();
        assert!(filter.matches("s3://afs-akkio/files_from_affinity/Data_dictionary/x.pdf"));
        assert!(!filter.matches("s3://afs-akkio/other_folder/file.csv"));
        assert!(!filter.matches("s3://other-bucket/other_folder/Data_dictionary/x.pdf"));
    }

    #[test]
    fn key_strips_bucket_uri() {
        let filter = PathFilter::default();
        assert_eq!(
            filter.key("s3://afs-akkio/files_from_affinity/Data_dictionary/x.pdf"),
            "files_from_affinity/Data_dictionary/x.pdf"
        );
        assert_eq!(filter.key("s3://afs-akkio-2/a"), "s3://afs-akkio-2/a");
    }

    #[test]
    fn parse_and_select() {
        let manifest = Manifest::from_reader(MANIFEST.as_bytes()).unwrap();
        assert_eq!(manifest.entries.len(), 4);

        let selected = manifest.select(&PathFilter::default());
        assert_eq!(selected.len(), 2);
        assert_eq!(selected[0].size, 2048);
        assert_eq!(selected[0].md5.as_deref(), Some("5d41402abc4b2a76b9719d911017c592"));
        assert_eq!(selected[1].size, 0);
        assert_eq!(selected[1].md5, None);
    }

    #[test]
    fn name_column_only() {
        let manifest = Manifest::from_reader("name\ns3://afs-akkio/a\n".as_bytes()).unwrap();
        assert_eq!(manifest.entries[0].size, 0);
        assert_eq!(manifest.entries[0].md5, None);
    }

    #[test]
    fn missing_name_column() {
        let err = Manifest::from_reader("path,size\ns3://afs-akkio/a,1\n".as_bytes()).unwrap_err();
        assert!(matches!(err, ManifestError::MissingColumn("name")));
    }

    #[test]
    fn missing_manifest_file() {
        let err = Manifest::from_file(Path::new("/no/such/s3_file_list.csv")).unwrap_err();
        assert!(matches!(err, ManifestError::NotFound(_)));
    }
}
