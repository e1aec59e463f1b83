//! Mock warehouse client for testing
//!
//! Returns canned rows per audience without connecting anywhere. Canned rows
//! can be built from raw counts with [`MetricCounts`], which derives the
//! rates and lifts using the same zero/NULL guards as the validation query.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let warehouse = MockWarehouse::new()
//!     .with_counts("aud-1", "Coffee lovers", MetricCounts::default())
//!     .with_failure("aud-2", WarehouseError::QueryError("boom".into()));
//! let probe = warehouse.clone();
//!
//! let outcome = validate_all(warehouse, &audiences).await;
//! assert_eq!(probe.close_count().await, 1);
//! ```

use crate::adapter::{QueryOutput, WarehouseClient, WarehouseError};
use afs_core::{SqlParam, Value, RESULT_COLUMNS};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Raw counts for one audience, used to synthesize a validation row
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MetricCounts {
    pub total_lal_ids: i64,
    pub active_matched_ids: i64,
    pub brand_shoppers: i64,
    pub brand_transactions: i64,
    pub brand_spend: f64,
    pub baseline_active_ids: i64,
    pub baseline_brand_shoppers: i64,
    pub baseline_brand_spend: f64,
}

fn ratio_or_zero(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

impl MetricCounts {
    /// One row shaped like the validation query output
    pub fn to_output(&self, audience_id: &str, name: &str) -> QueryOutput {
        let active = self.active_matched_ids as f64;
        let shoppers = self.brand_shoppers as f64;
        let transactions = self.brand_transactions as f64;
        let baseline_active = self.baseline_active_ids as f64;
        let baseline_shoppers = self.baseline_brand_shoppers as f64;

        let shop_rate = ratio_or_zero(shoppers, active);
        let spend_rate = ratio_or_zero(self.brand_spend, active);

        let shop_rate_lift = if self.baseline_active_ids > 0 && self.baseline_brand_shoppers > 0 {
            Value::Float(shop_rate / (baseline_shoppers / baseline_active))
        } else {
            Value::Null
        };
        let spend_rate_lift = if self.baseline_active_ids > 0 && self.baseline_brand_spend > 0.0 {
            Value::Float(spend_rate / (self.baseline_brand_spend / baseline_active))
        } else {
            Value::Null
        };

        let row = vec![
            Value::Text(name.to_string()),
            Value::Text(audience_id.to_string()),
            Value::Int(self.total_lal_ids),
            Value::Int(self.active_matched_ids),
            Value::Int(self.brand_shoppers),
            Value::Int(self.brand_transactions),
            Value::Float(self.brand_spend),
            Value::Float(shop_rate),
            Value::Float(spend_rate),
            Value::Float(ratio_or_zero(self.brand_spend, transactions)),
            Value::Float(ratio_or_zero(transactions, shoppers)),
            Value::Int(self.baseline_active_ids),
            Value::Int(self.baseline_brand_shoppers),
            Value::Float(ratio_or_zero(baseline_shoppers, baseline_active)),
            Value::Float(ratio_or_zero(self.baseline_brand_spend, baseline_active)),
            shop_rate_lift,
            spend_rate_lift,
        ];

        QueryOutput::new(RESULT_COLUMNS.iter().map(|c| c.to_string()).collect(), vec![row])
    }
}

/// A query the mock received
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutedQuery {
    pub sql: String,
    pub params: Vec<SqlParam>,
}

impl ExecutedQuery {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.value.as_str())
    }
}

#[derive(Debug, Default)]
struct MockState {
    results: HashMap<String, QueryOutput>,
    errors: HashMap<String, WarehouseError>,
    executed: Vec<ExecutedQuery>,
    close_calls: usize,
}

/// Mock warehouse client
///
/// Clones share state, so a clone kept by the test can inspect what the
/// batch runner did after it consumed the original.
#[derive(Debug, Clone, Default)]
pub struct MockWarehouse {
    state: Arc<RwLock<MockState>>,
}

impl MockWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return `output` for queries bound to `audience_id`
    pub fn with_result(self, audience_id: &str, output: QueryOutput) -> Self {
        self.state
            .try_write()
            .expect("mock state is not shared during setup")
            .results
            .insert(audience_id.to_string(), output);
        self
    }

    /// Return a row derived from `counts` for `audience_id`
    pub fn with_counts(self, audience_id: &str, name: &str, counts: MetricCounts) -> Self {
        let output = counts.to_output(audience_id, name);
        self.with_result(audience_id, output)
    }

    /// Fail queries bound to `audience_id`
    pub fn with_failure(self, audience_id: &str, error: WarehouseError) -> Self {
        self.state
            .try_write()
            .expect("mock state is not shared during setup")
            .errors
            .insert(audience_id.to_string(), error);
        self
    }

    /// Queries received so far, in order
    pub async fn executed(&self) -> Vec<ExecutedQuery> {
        self.state.read().await.executed.clone()
    }

    /// Number of times `close` was called
    pub async fn close_count(&self) -> usize {
        self.state.read().await.close_calls
    }
}

#[async_trait::async_trait]
impl WarehouseClient for MockWarehouse {
    fn name(&self) -> &'static str {
        "Mock"
    }

    async fn execute(&self, sql: &str, params: &[SqlParam]) -> Result<QueryOutput, WarehouseError> {
        let mut state = self.state.write().await;
        state.executed.push(ExecutedQuery {
            sql: sql.to_string(),
            params: params.to_vec(),
        });

        let audience_id = params
            .iter()
            .find(|p| p.name == "audience_id")
            .map(|p| p.value.clone())
            .unwrap_or_default();

        if let Some(error) = state.errors.get(&audience_id) {
            return Err(error.clone());
        }

        state
            .results
            .get(&audience_id)
            .cloned()
            .ok_or_else(|| WarehouseError::NotFound(format!("No canned result for audience {}", audience_id)))
    }

    async fn close(&mut self) -> Result<(), WarehouseError> {
        self.state.write().await.close_calls += 1;
        Ok(())
    }
}
