//! Config to query to report, without a warehouse

use afs_core::{load_audiences, ResultSet, ValidationQuery, Value, RESULT_COLUMNS};
use chrono::NaiveDate;
use pretty_assertions::assert_eq;
use std::path::PathBuf;
use tempfile::TempDir;

fn sample_config() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../config/audiences.yml")
}

#[test]
fn sample_config_loads() {
    let audiences = load_audiences(&sample_config()).unwrap();
    assert_eq!(audiences.len(), 2);

    let runners = &audiences[1];
    assert_eq!(runners.name, "Runners LAL");
    assert_eq!(runners.brand_keywords.len(), 3);
    assert_eq!(runners.date_start, NaiveDate::from_ymd_opt(2025, 8, 15).unwrap());
    assert_eq!(runners.date_end, NaiveDate::from_ymd_opt(2025, 10, 1).unwrap());
    assert_eq!(runners.fact_schema, "AFS_POC");
}

#[test]
fn every_sample_query_passes_preflight() {
    for audience in load_audiences(&sample_config()).unwrap() {
        let query = ValidationQuery::for_audience(&audience);
        query.preflight().unwrap();

        let bound = query.bound_sql();
        assert!(!bound.contains(":audience_id"));
        assert!(bound.contains(&format!("'{}'", audience.audience_id)));
        assert_eq!(
            bound.matches(" LIKE ").count(),
            audience.brand_keywords.len() * 3 * 2
        );
    }
}

#[test]
fn export_writes_header_and_rows() {
    let temp = TempDir::new().unwrap();
    let columns: Vec<String> = RESULT_COLUMNS.iter().map(|c| c.to_string()).collect();

    let mut row = vec![Value::Int(0); columns.len()];
    row[0] = Value::Text("Coffee, Tea & Co".to_string());
    row[1] = Value::Text("aud-1".to_string());
    let last = columns.len() - 1;
    row[last] = Value::Null;

    let mut results = ResultSet::new();
    results.append(&columns, vec![row]);

    let path = results.export_csv(&temp.path().join("output")).unwrap();
    assert!(path.ends_with("output/audience_validation_results.csv"));

    let written = std::fs::read_to_string(path).unwrap();
    let mut lines = written.lines();
    assert_eq!(lines.next().unwrap(), RESULT_COLUMNS.join(","));

    let data = lines.next().unwrap();
    assert!(data.starts_with("\"Coffee, Tea & Co\",aud-1,0,"));
    assert!(data.ends_with(",0,"));
    assert_eq!(lines.next(), None);
}
