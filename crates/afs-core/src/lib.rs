//! AFS Core
//!
//! Audience configuration, the validation query template and the result
//! model shared by the audience validation tooling.

pub mod config;
pub mod sql;
pub mod report;

pub use config::{AudienceSpec, AudienceFile, AudienceFields, ConfigError, load_audiences};
pub use sql::{ValidationQuery, SqlParam, SqlError, build_brand_filter, bind_literals, BRAND_COLUMNS, RESULT_COLUMNS};
pub use report::{ResultSet, Value, ColumnKind, ReportError};
