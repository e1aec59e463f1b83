//! Batch validation runner
//!
//! Runs the validation query for every audience over one client. A failing
//! audience is logged and skipped; the client is closed exactly once after
//! the last audience.

use crate::adapter::{QueryOutput, WarehouseClient, WarehouseError};
use afs_core::{AudienceSpec, ResultSet, SqlError, ValidationQuery};

/// Why a single audience could not be validated
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error(transparent)]
    Sql(#[from] SqlError),

    #[error(transparent)]
    Warehouse(#[from] WarehouseError),
}

/// An audience that was skipped
#[derive(Debug, Clone, PartialEq)]
pub struct AudienceFailure {
    pub audience_id: String,
    pub name: String,
    pub error: String,
}

/// Result of a validation batch
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    /// Rows of every audience that succeeded, in config order
    pub results: ResultSet,

    /// Number of audiences that produced results
    pub succeeded: usize,

    /// Audiences that failed
    pub failures: Vec<AudienceFailure>,
}

impl BatchOutcome {
    pub fn failed(&self) -> usize {
        self.failures.len()
    }
}

/// Run the validation query for a single audience
pub async fn validate_audience<C>(client: &C, audience: &AudienceSpec) -> Result<QueryOutput, ValidationError>
where
    C: WarehouseClient + ?Sized,
{
    let query = ValidationQuery::for_audience(audience);
    query.preflight()?;

    tracing::info!("Validating audience: {}  [{}]", audience.name, audience.audience_id);
    tracing::info!(
        "  Brand keywords: {:?} | Date range: {} to {}",
        audience.brand_keywords,
        audience.date_start,
        audience.date_end
    );

    let output = client.execute(&query.sql, &query.params).await?;

    tracing::info!("  -> {} row(s) returned", output.rows.len());
    Ok(output)
}

/// Validate every audience, consuming and then closing the client
pub async fn validate_all<C>(mut client: C, audiences: &[AudienceSpec]) -> BatchOutcome
where
    C: WarehouseClient,
{
    let mut outcome = BatchOutcome::default();

    for audience in audiences {
        match validate_audience(&client, audience).await {
            Ok(output) => {
                outcome.results.append(&output.columns, output.rows);
                outcome.succeeded += 1;
            }
            Err(e) => {
                tracing::error!("FAILED for audience '{}': {}", audience.name, e);
                outcome.failures.push(AudienceFailure {
                    audience_id: audience.audience_id.clone(),
                    name: audience.name.clone(),
                    error: e.to_string(),
                });
            }
        }
    }

    if let Err(e) = client.close().await {
        tracing::warn!("Failed to close {} connection: {}", client.name(), e);
    }

    if outcome.results.is_empty() {
        tracing::warn!("No results collected.");
    }

    outcome
}
