//! Snowflake client over the SQL REST API
//!
//! Results arrive as Arrow record batches and are decoded into
//! [`QueryOutput`] rows. Fixed-point columns carry their scale in the field
//! metadata; a positive scale turns the cell into a float.
//!
//! The REST API has no server-side binding, so `:name` placeholders are
//! rendered as escaped string literals before the statement is sent.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let client = SnowflakeClient::with_password("xy12345.us-east-1", "username", "password")
//!     .with_warehouse("COMPUTE_WH")
//!     .with_role("ANALYST")
//!     .build()?;
//! ```

use crate::adapter::{QueryOutput, WarehouseClient, WarehouseError};
use crate::credentials::ConnectionParams;
use afs_core::{bind_literals, SqlParam};

#[cfg(feature = "snowflake")]
use afs_core::Value;

#[cfg(feature = "snowflake")]
use snowflake_api::SnowflakeApi;

#[cfg(feature = "snowflake")]
use arrow_array::cast::AsArray;

#[cfg(feature = "snowflake")]
use arrow_array::types::{
    Decimal128Type, Float32Type, Float64Type, Int16Type, Int32Type, Int64Type, Int8Type,
};

#[cfg(feature = "snowflake")]
use arrow_array::{Array, RecordBatch};

#[cfg(feature = "snowflake")]
use arrow_schema::DataType;

/// Builder for SnowflakeClient
pub struct SnowflakeClientBuilder {
    account: String,
    username: String,
    password: String,
    warehouse: Option<String>,
    role: Option<String>,
    database: Option<String>,
    schema: Option<String>,
}

impl SnowflakeClientBuilder {
    /// Create new builder with password authentication
    pub fn with_password(
        account: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            account: account.into(),
            username: username.into(),
            password: password.into(),
            warehouse: None,
            role: None,
            database: None,
            schema: None,
        }
    }

    /// Set the warehouse to use
    pub fn with_warehouse(mut self, warehouse: impl Into<String>) -> Self {
        self.warehouse = Some(warehouse.into());
        self
    }

    /// Set the role to use
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    /// Set the default database
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Set the default schema
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Build the client
    #[cfg(feature = "snowflake")]
    pub fn build(self) -> Result<SnowflakeClient, WarehouseError> {
        let api = SnowflakeApi::with_password_auth(
            &self.account,
            self.warehouse.as_deref(),
            self.database.as_deref(),
            self.schema.as_deref(),
            &self.username,
            self.role.as_deref(),
            &self.password,
        )
        .map_err(|e| WarehouseError::AuthenticationError(format!(
            "Failed to authenticate with Snowflake: {}",
            e
        )))?;

        Ok(SnowflakeClient { api })
    }

    /// Build without snowflake feature
    #[cfg(not(feature = "snowflake"))]
    pub fn build(self) -> Result<SnowflakeClient, WarehouseError> {
        Err(WarehouseError::ConfigError(
            "Snowflake support not compiled. Rebuild with: cargo build --features snowflake".to_string()
        ))
    }
}

/// Snowflake warehouse client
pub struct SnowflakeClient {
    #[cfg(feature = "snowflake")]
    api: SnowflakeApi,
}

impl SnowflakeClient {
    /// Create a builder with password authentication
    pub fn with_password(
        account: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> SnowflakeClientBuilder {
        SnowflakeClientBuilder::with_password(account, username, password)
    }

    /// Open a session from resolved connection parameters
    pub fn connect(params: &ConnectionParams) -> Result<Self, WarehouseError> {
        let mut builder = Self::with_password(&params.account, &params.user, &params.password);

        if let Some(warehouse) = &params.warehouse {
            builder = builder.with_warehouse(warehouse);
        }
        if let Some(role) = &params.role {
            builder = builder.with_role(role);
        }
        if let Some(database) = &params.database {
            builder = builder.with_database(database);
        }
        if let Some(schema) = &params.schema {
            builder = builder.with_schema(schema);
        }

        tracing::info!(
            account = %params.account,
            database = params.database.as_deref().unwrap_or(""),
            schema = params.schema.as_deref().unwrap_or(""),
            "Connecting to Snowflake"
        );

        builder.build()
    }

    /// Statement actually sent to Snowflake
    pub fn render(sql: &str, params: &[SqlParam]) -> String {
        bind_literals(sql, params)
    }
}

#[cfg(feature = "snowflake")]
fn classify_error(err: String) -> WarehouseError {
    if err.contains("does not exist") || err.contains("not found") {
        WarehouseError::NotFound(err)
    } else if err.contains("Insufficient privileges") || err.contains("Permission") {
        WarehouseError::PermissionDenied(err)
    } else {
        WarehouseError::QueryError(err)
    }
}

/// Decode Arrow batches into column names and rows
#[cfg(feature = "snowflake")]
fn decode_batches(batches: &[RecordBatch]) -> Result<QueryOutput, WarehouseError> {
    let mut output = QueryOutput::default();

    for batch in batches {
        let schema = batch.schema();
        if output.columns.is_empty() {
            output.columns = schema.fields().iter().map(|f| f.name().clone()).collect();
        }

        let scales: Vec<i32> = schema
            .fields()
            .iter()
            .map(|f| f.metadata().get("scale").and_then(|s| s.parse().ok()).unwrap_or(0))
            .collect();

        for row_idx in 0..batch.num_rows() {
            let row = batch
                .columns()
                .iter()
                .zip(&scales)
                .map(|(column, scale)| decode_cell(column.as_ref(), row_idx, *scale))
                .collect::<Result<Vec<_>, _>>()?;
            output.rows.push(row);
        }
    }

    Ok(output)
}

#[cfg(feature = "snowflake")]
fn decode_cell(array: &dyn Array, row: usize, scale: i32) -> Result<Value, WarehouseError> {
    if array.is_null(row) {
        return Ok(Value::Null);
    }

    let fixed = |raw: i64| {
        if scale > 0 {
            Value::Float(raw as f64 / 10f64.powi(scale))
        } else {
            Value::Int(raw)
        }
    };

    let value = match array.data_type() {
        DataType::Int8 => fixed(array.as_primitive::<Int8Type>().value(row) as i64),
        DataType::Int16 => fixed(array.as_primitive::<Int16Type>().value(row) as i64),
        DataType::Int32 => fixed(array.as_primitive::<Int32Type>().value(row) as i64),
        DataType::Int64 => fixed(array.as_primitive::<Int64Type>().value(row)),
        DataType::Float32 => Value::Float(array.as_primitive::<Float32Type>().value(row) as f64),
        DataType::Float64 => Value::Float(array.as_primitive::<Float64Type>().value(row)),
        DataType::Decimal128(_, s) => {
            let raw = array.as_primitive::<Decimal128Type>().value(row);
            if *s <= 0 && raw >= i64::MIN as i128 && raw <= i64::MAX as i128 {
                Value::Int(raw as i64)
            } else {
                Value::Float(raw as f64 / 10f64.powi(*s as i32))
            }
        }
        DataType::Utf8 => Value::Text(array.as_string::<i32>().value(row).to_string()),
        DataType::LargeUtf8 => Value::Text(array.as_string::<i64>().value(row).to_string()),
        DataType::Boolean => Value::Text(array.as_boolean().value(row).to_string()),
        other => {
            return Err(WarehouseError::InvalidResponse(format!(
                "Unsupported column type {}",
                other
            )))
        }
    };

    Ok(value)
}

#[async_trait::async_trait]
impl WarehouseClient for SnowflakeClient {
    fn name(&self) -> &'static str {
        "Snowflake"
    }

    #[cfg(feature = "snowflake")]
    async fn execute(&self, sql: &str, params: &[SqlParam]) -> Result<QueryOutput, WarehouseError> {
        use snowflake_api::QueryResult;

        let statement = Self::render(sql, params);
        let result = self
            .api
            .exec(&statement)
            .await
            .map_err(|e| classify_error(e.to_string()))?;

        match result {
            QueryResult::Arrow(batches) => decode_batches(&batches),
            QueryResult::Json(_) => Err(WarehouseError::InvalidResponse(
                "Unexpected JSON result format".to_string()
            )),
            QueryResult::Empty => Ok(QueryOutput::default()),
        }
    }

    #[cfg(not(feature = "snowflake"))]
    async fn execute(&self, _sql: &str, _params: &[SqlParam]) -> Result<QueryOutput, WarehouseError> {
        Err(WarehouseError::ConfigError(
            "Snowflake support not compiled. Rebuild with: cargo build --features snowflake".to_string()
        ))
    }

    #[cfg(feature = "snowflake")]
    async fn close(&mut self) -> Result<(), WarehouseError> {
        self.api
            .close_session()
            .await
            .map_err(|e| WarehouseError::NetworkError(format!("Failed to close session: {}", e)))
    }

    #[cfg(not(feature = "snowflake"))]
    async fn close(&mut self) -> Result<(), WarehouseError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_binds_literals() {
        let sql = SnowflakeClient::render(
            "SELECT * FROM T WHERE ID = :audience_id",
            &[SqlParam::new("audience_id", "o'brien")],
        );
        assert_eq!(sql, "SELECT * FROM T WHERE ID = 'o''brien'");
    }

    #[cfg(not(feature = "snowflake"))]
    #[test]
    fn build_without_feature_is_a_config_error() {
        let result = SnowflakeClient::with_password("account", "user", "pass").build();
        assert!(matches!(result, Err(WarehouseError::ConfigError(_))));
    }

    #[cfg(feature = "snowflake")]
    #[test]
    fn decodes_fixed_point_columns() {
        use arrow_array::{Int64Array, StringArray};
        use arrow_schema::{Field, Schema};
        use std::collections::HashMap;
        use std::sync::Arc;

        let spend = Field::new("BRAND_SPEND", DataType::Int64, true)
            .with_metadata(HashMap::from([("scale".to_string(), "2".to_string())]));
        let schema = Schema::new(vec![
            Field::new("AUDIENCE_NAME", DataType::Utf8, false),
            spend,
            Field::new("TOTAL_LAL_IDS", DataType::Int64, true),
        ]);
        let batch = RecordBatch::try_new(
            Arc::new(schema),
            vec![
                Arc::new(StringArray::from(vec!["Coffee"])),
                Arc::new(Int64Array::from(vec![Some(123_456)])),
                Arc::new(Int64Array::from(vec![None::<i64>])),
            ],
        )
        .unwrap();

        let output = decode_batches(&[batch]).unwrap();
        assert_eq!(output.columns, vec!["AUDIENCE_NAME", "BRAND_SPEND", "TOTAL_LAL_IDS"]);
        assert_eq!(
            output.rows[0],
            vec![Value::Text("Coffee".to_string()), Value::Float(1234.56), Value::Null]
        );
    }
}
