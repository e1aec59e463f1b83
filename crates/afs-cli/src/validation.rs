//! Audience validation run, independent of the concrete warehouse

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::Path;

use afs_core::load_audiences;
use afs_warehouse::{validate_all, BatchOutcome, WarehouseClient};

/// Load the audiences in `config`, validate them and export the results
///
/// `connect` is only called once the config has loaded, so a bad config
/// never opens a warehouse session. The CSV is written to `output_dir` when
/// at least one audience produced rows.
pub async fn run_validation<C, F>(config: &Path, output_dir: &Path, connect: F) -> Result<BatchOutcome>
where
    C: WarehouseClient,
    F: FnOnce() -> Result<C>,
{
    tracing::info!("Loading config from {}", config.display());
    let audiences = load_audiences(config)
        .with_context(|| format!("Failed to load audiences from {}", config.display()))?;

    let client = connect()?;

    tracing::info!("Starting validation for {} audience(s)...", audiences.len());
    let outcome = validate_all(client, &audiences).await;

    print!("{}", outcome.results.render_summary());

    if !outcome.results.is_empty() {
        let path = outcome.results.export_csv(output_dir)?;
        println!("{} {}", "Results exported to".green(), path.display());
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use afs_core::ConfigError;
    use afs_warehouse::{MetricCounts, MockWarehouse, WarehouseError};
    use pretty_assertions::assert_eq;
    use std::cell::Cell;
    use tempfile::TempDir;

    const TWO_AUDIENCES: &str = r#"
audiences:
  - audience_id: "aud-1"
    name: "Coffee lovers"
    brand_keywords: ["starbucks"]
  - audience_id: "aud-2"
    name: "Runners"
    brand_keywords: ["nike"]
"#;

    fn write_config(dir: &TempDir, yaml: &str) -> std::path::PathBuf {
        let path = dir.path().join("audiences.yml");
        std::fs::write(&path, yaml).unwrap();
        path
    }

    #[tokio::test]
    async fn empty_config_fails_before_connecting() {
        let temp = TempDir::new().unwrap();
        let config = write_config(&temp, "audiences: []\n");
        let connected = Cell::new(false);

        let err = run_validation(&config, &temp.path().join("output"), || {
            connected.set(true);
            Ok(MockWarehouse::new())
        })
        .await
        .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::NoAudiences(_))
        ));
        assert!(!connected.get());
        assert!(!temp.path().join("output").exists());
    }

    #[tokio::test]
    async fn missing_config_fails_before_connecting() {
        let temp = TempDir::new().unwrap();
        let connected = Cell::new(false);

        let err = run_validation(&temp.path().join("nope.yml"), temp.path(), || {
            connected.set(true);
            Ok(MockWarehouse::new())
        })
        .await
        .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::NotFound(_))
        ));
        assert!(!connected.get());
    }

    #[tokio::test]
    async fn connection_error_is_returned() {
        let temp = TempDir::new().unwrap();
        let config = write_config(&temp, TWO_AUDIENCES);

        let result = run_validation(&config, temp.path(), || -> Result<MockWarehouse> {
            anyhow::bail!("no credentials")
        })
        .await;

        assert_eq!(result.unwrap_err().to_string(), "no credentials");
    }

    #[tokio::test]
    async fn exports_rows_of_successful_audiences() {
        let temp = TempDir::new().unwrap();
        let config = write_config(&temp, TWO_AUDIENCES);
        let output_dir = temp.path().join("output");

        let counts = MetricCounts {
            total_lal_ids: 1_000,
            active_matched_ids: 800,
            brand_shoppers: 40,
            brand_transactions: 55,
            brand_spend: 1_200.0,
            baseline_active_ids: 100_000,
            baseline_brand_shoppers: 2_000,
            baseline_brand_spend: 90_000.0,
        };
        let warehouse = MockWarehouse::new()
            .with_counts("aud-1", "Coffee lovers", counts)
            .with_failure("aud-2", WarehouseError::QueryError("timeout".to_string()));
        let handle = warehouse.clone();

        let outcome = run_validation(&config, &output_dir, move || Ok(warehouse))
            .await
            .unwrap();

        assert_eq!(outcome.succeeded, 1);
        assert_eq!(outcome.failed(), 1);
        assert_eq!(outcome.failures[0].audience_id, "aud-2");
        assert_eq!(handle.executed().await.len(), 2);
        assert_eq!(handle.close_count().await, 1);

        let csv = std::fs::read_to_string(output_dir.join("audience_validation_results.csv")).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].starts_with("Coffee lovers,aud-1,1000,800,"));
    }

    #[tokio::test]
    async fn nothing_exported_when_every_audience_fails() {
        let temp = TempDir::new().unwrap();
        let config = write_config(&temp, TWO_AUDIENCES);
        let output_dir = temp.path().join("output");

        let warehouse = MockWarehouse::new()
            .with_failure("aud-1", WarehouseError::QueryError("denied".to_string()))
            .with_failure("aud-2", WarehouseError::QueryError("denied".to_string()));

        let outcome = run_validation(&config, &output_dir, move || Ok(warehouse))
            .await
            .unwrap();

        assert_eq!(outcome.succeeded, 0);
        assert_eq!(outcome.failed(), 2);
        assert!(!output_dir.exists());
    }
}
