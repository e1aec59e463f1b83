//! Validation results: collection, text panels and CSV export

use std::fmt;
use std::path::{Path, PathBuf};

/// File name of the CSV export
pub const RESULTS_FILE_NAME: &str = "audience_validation_results.csv";

/// Rendered in place of a missing value
pub const MISSING: &str = "—";

const INT_COLS: [&str; 6] = [
    "TOTAL_LAL_IDS",
    "ACTIVE_MATCHED_IDS",
    "BRAND_SHOPPERS",
    "BRAND_TRANSACTIONS",
    "BASELINE_ACTIVE_IDS",
    "BASELINE_BRAND_SHOPPERS",
];
const CURRENCY_COLS: [&str; 4] = ["BRAND_SPEND", "SPEND_RATE", "AVERAGE_TICKET", "BASELINE_SPEND_RATE"];
const PERCENT_COLS: [&str; 2] = ["SHOP_RATE", "BASELINE_SHOP_RATE"];
const LIFT_COLS: [&str; 2] = ["SHOP_RATE_LIFT", "SPEND_RATE_LIFT"];

/// Columns of the audience metrics panel
pub const CORE_PANEL: [&str; 10] = [
    "AUDIENCE_NAME",
    "TOTAL_LAL_IDS",
    "ACTIVE_MATCHED_IDS",
    "BRAND_SHOPPERS",
    "BRAND_TRANSACTIONS",
    "BRAND_SPEND",
    "SHOP_RATE",
    "SPEND_RATE",
    "AVERAGE_TICKET",
    "AVG_TRANSACTIONS_PER_SHOPPER",
];

/// Columns of the baseline comparison panel
pub const LIFT_PANEL: [&str; 7] = [
    "AUDIENCE_NAME",
    "BASELINE_ACTIVE_IDS",
    "BASELINE_BRAND_SHOPPERS",
    "BASELINE_SHOP_RATE",
    "BASELINE_SPEND_RATE",
    "SHOP_RATE_LIFT",
    "SPEND_RATE_LIFT",
];

/// A single cell returned by the warehouse
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    /// True for SQL NULL and NaN
    pub fn is_missing(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Float(f) => f.is_nan(),
            _ => false,
        }
    }

    /// Numeric view of the cell, parsing text if needed
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Null => None,
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Text(s) => s.trim().parse().ok(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{}", v),
            Value::Text(s) => write!(f, "{}", s),
        }
    }
}

/// Display rule for a result column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// Whole number with thousands separators
    Int,
    /// Dollar amount with two decimals
    Currency,
    /// Fraction shown as a percentage with four decimals
    Percent,
    /// Ratio with an "x" suffix
    Lift,
    /// Anything else
    General,
}

impl ColumnKind {
    pub fn for_column(column: &str) -> Self {
        if INT_COLS.contains(&column) {
            Self::Int
        } else if CURRENCY_COLS.contains(&column) {
            Self::Currency
        } else if PERCENT_COLS.contains(&column) {
            Self::Percent
        } else if LIFT_COLS.contains(&column) {
            Self::Lift
        } else {
            Self::General
        }
    }
}

/// Format one cell for display according to its column
pub fn format_value(value: &Value, column: &str) -> String {
    if value.is_missing() {
        return MISSING.to_string();
    }

    let kind = ColumnKind::for_column(column);
    let number = match (kind, value) {
        (ColumnKind::General, _) => None,
        (_, v) => v.as_f64(),
    };

    match (kind, number) {
        (ColumnKind::Int, Some(n)) => group_thousands(&format!("{}", n.trunc() as i64)),
        (ColumnKind::Currency, Some(n)) => format!("${}", format_grouped(n, 2)),
        (ColumnKind::Percent, Some(n)) => format!("{:.4}%", n * 100.0),
        (ColumnKind::Lift, Some(n)) => format!("{}x", format_grouped(n, 2)),
        _ => match value {
            Value::Float(f) => format_grouped(*f, 2),
            other => other.to_string(),
        },
    }
}

/// Fixed decimals with thousands separators, e.g. `-1,234.50`
fn format_grouped(value: f64, decimals: usize) -> String {
    let formatted = format!("{:.*}", decimals, value.abs());
    let (int_part, frac_part) = match formatted.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (formatted.as_str(), None),
    };

    let mut out = String::new();
    if value.is_sign_negative() {
        out.push('-');
    }
    out.push_str(&group_thousands(int_part));
    if let Some(frac) = frac_part {
        out.push('.');
        out.push_str(frac);
    }
    out
}

/// Insert commas every three digits of an integer string
fn group_thousands(digits: &str) -> String {
    let (sign, digits) = match digits.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", digits),
    };

    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    format!("{}{}", sign, grouped)
}

/// Ordered collection of per-audience result rows
///
/// Columns are the union of every appended batch in first-seen order; cells a
/// batch did not provide are null.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl ResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    /// Cell at `row` for the named column
    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(idx))
    }

    /// Append rows that share the given column layout
    pub fn append(&mut self, columns: &[String], rows: Vec<Vec<Value>>) {
        for column in columns {
            if self.column_index(column).is_none() {
                self.columns.push(column.clone());
                for row in &mut self.rows {
                    row.push(Value::Null);
                }
            }
        }

        let positions: Vec<usize> = columns
            .iter()
            .filter_map(|c| self.column_index(c))
            .collect();

        for row in rows {
            let mut full = vec![Value::Null; self.columns.len()];
            for (value, &pos) in row.into_iter().zip(&positions) {
                full[pos] = value;
            }
            self.rows.push(full);
        }
    }

    /// Render both summary panels as text
    pub fn render_summary(&self) -> String {
        if self.is_empty() {
            return "\n(no results)\n".to_string();
        }

        let mut out = self.render_panel("AUDIENCE METRICS", &CORE_PANEL);

        let lift_cols: Vec<&str> = LIFT_PANEL
            .iter()
            .copied()
            .filter(|c| self.column_index(c).is_some())
            .collect();
        if lift_cols.len() > 1 {
            out.push_str(&self.render_panel("BASELINE COMPARISON & LIFT", &lift_cols));
        }

        out
    }

    /// Render one right-aligned table over the columns that are present
    pub fn render_panel(&self, title: &str, columns: &[&str]) -> String {
        let present: Vec<(usize, &str)> = columns
            .iter()
            .filter_map(|c| self.column_index(c).map(|idx| (idx, *c)))
            .collect();

        let header: Vec<String> = present.iter().map(|(_, c)| c.replace('_', " ")).collect();
        let cells: Vec<Vec<String>> = self
            .rows
            .iter()
            .map(|row| {
                present
                    .iter()
                    .map(|(idx, col)| format_value(&row[*idx], col))
                    .collect()
            })
            .collect();

        let widths: Vec<usize> = header
            .iter()
            .enumerate()
            .map(|(i, h)| {
                cells
                    .iter()
                    .map(|r| r[i].chars().count())
                    .chain(std::iter::once(h.chars().count()))
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        let sep = format!(
            "+-{}-+",
            widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>().join("-+-")
        );
        let line = |values: &[String]| {
            let padded: Vec<String> = values
                .iter()
                .zip(&widths)
                .map(|(v, w)| format!("{}{}", " ".repeat(w - v.chars().count()), v))
                .collect();
            format!("| {} |", padded.join(" | "))
        };
        let rule = "=".repeat(sep.chars().count());

        let mut out = String::new();
        out.push('\n');
        out.push_str(&format!("{}\n  {}\n{}\n", rule, title, rule));
        out.push_str(&format!("{}\n{}\n{}\n", sep, line(&header), sep));
        for row in &cells {
            out.push_str(&line(row));
            out.push('\n');
        }
        out.push_str(&sep);
        out.push_str("\n\n");
        out
    }

    /// Serialize to CSV with a header row; nulls become empty fields
    pub fn to_csv(&self) -> Result<String, ReportError> {
        let mut wtr = csv::Writer::from_writer(vec![]);
        self.write_csv(&mut wtr)?;
        let bytes = wtr
            .into_inner()
            .map_err(|e| ReportError::CsvError(e.to_string()))?;
        String::from_utf8(bytes).map_err(|e| ReportError::CsvError(e.to_string()))
    }

    /// Write `audience_validation_results.csv` into `output_dir`, creating it if needed
    pub fn export_csv(&self, output_dir: &Path) -> Result<PathBuf, ReportError> {
        std::fs::create_dir_all(output_dir)
            .map_err(|e| ReportError::IoError(format!("{}: {}", output_dir.display(), e)))?;

        let path = output_dir.join(RESULTS_FILE_NAME);
        let mut wtr = csv::Writer::from_path(&path)
            .map_err(|e| ReportError::CsvError(format!("{}: {}", path.display(), e)))?;
        self.write_csv(&mut wtr)?;
        wtr.flush()
            .map_err(|e| ReportError::IoError(format!("{}: {}", path.display(), e)))?;

        tracing::info!(path = %path.display(), rows = self.len(), "Results exported");
        Ok(path)
    }

    fn write_csv<W: std::io::Write>(&self, wtr: &mut csv::Writer<W>) -> Result<(), ReportError> {
        wtr.write_record(&self.columns)
            .map_err(|e| ReportError::CsvError(e.to_string()))?;
        for row in &self.rows {
            wtr.write_record(row.iter().map(|v| v.to_string()))
                .map_err(|e| ReportError::CsvError(e.to_string()))?;
        }
        Ok(())
    }
}

/// Report error types
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("CSV error: {0}")]
    CsvError(String),
}
