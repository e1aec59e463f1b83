//! Audience configuration (audiences.yml)
//!
//! The file holds a `defaults` mapping and an `audiences` list. Each entry is
//! merged over the defaults field by field (the entry wins) and resolved into
//! an [`AudienceSpec`].

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_DATE_START: &str = "2025-09-01";
pub const DEFAULT_DATE_END: &str = "2025-10-01";
pub const DEFAULT_DATABASE: &str = "DEMO";
pub const DEFAULT_SCHEMA: &str = "AFS_POC";

const DATE_FORMAT: &str = "%Y-%m-%d";

/// One audience + brand combination to validate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudienceSpec {
    /// Audience UUID as stored in AUDIENCE_LOOKUP
    pub audience_id: String,

    /// Friendly label for reports
    pub name: String,

    /// Keywords matched against brand, store and merchant description
    pub brand_keywords: Vec<String>,

    /// Inclusive start of the holdout window
    pub date_start: NaiveDate,

    /// Exclusive end of the holdout window
    pub date_end: NaiveDate,

    /// Database holding AUDIENCE_LOOKUP / AUDIENCE_METADATA
    pub database: String,

    /// Schema holding AUDIENCE_LOOKUP / AUDIENCE_METADATA
    pub schema: String,

    /// Database holding FACT_TRANSACTION_ENRICHED
    pub fact_database: String,

    /// Schema holding FACT_TRANSACTION_ENRICHED
    pub fact_schema: String,
}

/// Partially specified audience, as written in the config file
///
/// Used both for the `defaults` mapping and for each `audiences` entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AudienceFields {
    #[serde(default)]
    pub audience_id: Option<String>,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub brand_keywords: Option<Vec<String>>,

    #[serde(default)]
    pub date_start: Option<String>,

    #[serde(default)]
    pub date_end: Option<String>,

    #[serde(default)]
    pub database: Option<String>,

    #[serde(default)]
    pub schema: Option<String>,

    #[serde(default)]
    pub fact_database: Option<String>,

    #[serde(default)]
    pub fact_schema: Option<String>,
}

impl AudienceFields {
    /// Overlay `self` on top of `defaults`; fields set on `self` win
    pub fn merged_over(self, defaults: &AudienceFields) -> AudienceFields {
        AudienceFields {
            audience_id: self.audience_id.or_else(|| defaults.audience_id.clone()),
            name: self.name.or_else(|| defaults.name.clone()),
            brand_keywords: self.brand_keywords.or_else(|| defaults.brand_keywords.clone()),
            date_start: self.date_start.or_else(|| defaults.date_start.clone()),
            date_end: self.date_end.or_else(|| defaults.date_end.clone()),
            database: self.database.or_else(|| defaults.database.clone()),
            schema: self.schema.or_else(|| defaults.schema.clone()),
            fact_database: self.fact_database.or_else(|| defaults.fact_database.clone()),
            fact_schema: self.fact_schema.or_else(|| defaults.fact_schema.clone()),
        }
    }
}

/// Raw audience config file
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AudienceFile {
    /// Values applied to every audience unless overridden
    #[serde(default)]
    pub defaults: Option<AudienceFields>,

    /// Per-audience entries
    #[serde(default)]
    pub audiences: Option<Vec<AudienceFields>>,

    /// Path the file was loaded from
    #[serde(skip)]
    pub source: PathBuf,
}

impl AudienceFile {
    /// Load the config file. `.toml` files are parsed as TOML, everything else as YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(format!("{}: {}", path.display(), e)))?;

        let is_toml = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("toml"))
            .unwrap_or(false);

        let mut file = if is_toml {
            Self::from_toml(&contents)?
        } else {
            Self::from_yaml(&contents)?
        };
        file.source = path.to_path_buf();

        Ok(file)
    }

    /// Parse from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }

        // A document holding only comments deserializes to null
        let file: Option<AudienceFile> = serde_yaml::from_str(yaml)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;
        Ok(file.unwrap_or_default())
    }

    /// Parse from a TOML string
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Merge every entry over the defaults and validate the result
    pub fn resolve(&self) -> Result<Vec<AudienceSpec>, ConfigError> {
        let entries = self.audiences.as_deref().unwrap_or_default();
        if entries.is_empty() {
            return Err(ConfigError::NoAudiences(self.source.clone()));
        }

        let defaults = self.defaults.clone().unwrap_or_default();

        entries
            .iter()
            .enumerate()
            .map(|(index, entry)| {
                AudienceSpec::from_fields(index, entry.clone().merged_over(&defaults))
            })
            .collect()
    }
}

/// Load and resolve all audiences from a config file
pub fn load_audiences(path: &Path) -> Result<Vec<AudienceSpec>, ConfigError> {
    AudienceFile::from_file(path)?.resolve()
}

impl AudienceSpec {
    /// Build an audience from merged fields, filling in the built-in defaults
    pub fn from_fields(index: usize, fields: AudienceFields) -> Result<Self, ConfigError> {
        let audience_id = fields
            .audience_id
            .ok_or(ConfigError::MissingField { index, field: "audience_id" })?;
        let name = fields
            .name
            .ok_or(ConfigError::MissingField { index, field: "name" })?;
        let brand_keywords = fields
            .brand_keywords
            .ok_or(ConfigError::MissingField { index, field: "brand_keywords" })?;

        let invalid = |field: &'static str, reason: String| ConfigError::InvalidField {
            audience: name.clone(),
            field,
            reason,
        };

        if brand_keywords.is_empty() {
            return Err(invalid("brand_keywords", "at least one keyword is required".to_string()));
        }
        if brand_keywords.iter().any(|kw| kw.trim().is_empty()) {
            return Err(invalid("brand_keywords", "keywords must not be blank".to_string()));
        }

        let date_start = parse_date(fields.date_start.as_deref().unwrap_or(DEFAULT_DATE_START))
            .map_err(|reason| invalid("date_start", reason))?;
        let date_end = parse_date(fields.date_end.as_deref().unwrap_or(DEFAULT_DATE_END))
            .map_err(|reason| invalid("date_end", reason))?;

        if date_start >= date_end {
            tracing::warn!(
                audience = %name,
                %date_start,
                %date_end,
                "date_start is not before date_end; the holdout window is empty"
            );
        }

        let database = identifier(fields.database, DEFAULT_DATABASE)
            .map_err(|reason| invalid("database", reason))?;
        let schema = identifier(fields.schema, DEFAULT_SCHEMA)
            .map_err(|reason| invalid("schema", reason))?;
        let fact_database = identifier(fields.fact_database, DEFAULT_DATABASE)
            .map_err(|reason| invalid("fact_database", reason))?;
        let fact_schema = identifier(fields.fact_schema, DEFAULT_SCHEMA)
            .map_err(|reason| invalid("fact_schema", reason))?;

        Ok(Self {
            audience_id,
            name,
            brand_keywords,
            date_start,
            date_end,
            database,
            schema,
            fact_database,
            fact_schema,
        })
    }
}

fn parse_date(value: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT)
        .map_err(|e| format!("'{}' is not a YYYY-MM-DD date ({})", value, e))
}

static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_$]*$").expect("valid identifier regex"));

/// Plain SQL identifier, or the default when unset
fn identifier(value: Option<String>, default: &str) -> Result<String, String> {
    let value = value.unwrap_or_else(|| default.to_string());
    if IDENTIFIER.is_match(&value) {
        Ok(value)
    } else {
        Err(format!("'{}' is not a plain SQL identifier", value))
    }
}

/// Config error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("No audiences defined in {}", .0.display())]
    NoAudiences(PathBuf),

    #[error("Audience #{index} is missing required field '{field}'")]
    MissingField { index: usize, field: &'static str },

    #[error("Audience '{audience}' has invalid {field}: {reason}")]
    InvalidField {
        audience: String,
        field: &'static str,
        reason: String,
    },
}
