//! Warehouse client trait

use afs_core::{SqlParam, Value};

/// Column names plus row tuples returned by a query
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOutput {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl QueryOutput {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows }
    }
}

/// Errors that can occur when talking to the warehouse
#[derive(Debug, Clone, thiserror::Error)]
pub enum WarehouseError {
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Query failed: {0}")]
    QueryError(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// A warehouse connection able to run parameterized queries
///
/// One client is held for a whole validation batch and closed once at the end.
#[async_trait::async_trait]
pub trait WarehouseClient: Send + Sync {
    /// Client name (e.g., "Snowflake")
    fn name(&self) -> &'static str;

    /// Run `sql`, binding `:name` placeholders from `params`
    async fn execute(&self, sql: &str, params: &[SqlParam]) -> Result<QueryOutput, WarehouseError>;

    /// Release the underlying session
    async fn close(&mut self) -> Result<(), WarehouseError>;
}
