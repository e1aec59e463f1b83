//! Audience validation query
//!
//! A fixed multi-stage query compares an audience's brand behavior over the
//! holdout window with the whole transacting population. Namespaces and the
//! brand filter are spliced into the text; the remaining values travel as
//! `:name` bind parameters.

use crate::config::AudienceSpec;
use sqlparser::dialect::SnowflakeDialect;
use sqlparser::parser::Parser;

/// Columns searched by the brand filter
pub const BRAND_COLUMNS: [&str; 3] = ["BRAND_NAME", "STORE_NAME", "MERCHANT_DESCRIPTION"];

/// Output columns of the validation query, in order
pub const RESULT_COLUMNS: [&str; 17] = [
    "AUDIENCE_NAME",
    "AUDIENCE_ID",
    "TOTAL_LAL_IDS",
    "ACTIVE_MATCHED_IDS",
    "BRAND_SHOPPERS",
    "BRAND_TRANSACTIONS",
    "BRAND_SPEND",
    "SHOP_RATE",
    "SPEND_RATE",
    "AVERAGE_TICKET",
    "AVG_TRANSACTIONS_PER_SHOPPER",
    "BASELINE_ACTIVE_IDS",
    "BASELINE_BRAND_SHOPPERS",
    "BASELINE_SHOP_RATE",
    "BASELINE_SPEND_RATE",
    "SHOP_RATE_LIFT",
    "SPEND_RATE_LIFT",
];

// Every division is guarded: rates with an empty denominator are 0, lifts
// with an empty baseline are NULL.
pub const VALIDATION_SQL_TEMPLATE: &str = r#"
WITH AUDIENCE AS (
  SELECT AKKIO_ID
  FROM __DB__.__SCHEMA__.AUDIENCE_LOOKUP
  WHERE AUDIENCE_ID = :audience_id
    AND VER = (
      SELECT MAX(VER)
      FROM __DB__.__SCHEMA__.AUDIENCE_METADATA
      WHERE AUDIENCE_ID = :audience_id
    )
),
TOTAL_LAL AS (
  SELECT COUNT(DISTINCT AKKIO_ID) AS TOTAL_LAL_IDS
  FROM AUDIENCE
),
ACTIVE_MATCHED AS (
  SELECT COUNT(DISTINCT A.AKKIO_ID) AS ACTIVE_MATCHED_IDS
  FROM AUDIENCE AS A
  INNER JOIN __FACT_DB__.__FACT_SCHEMA__.FACT_TRANSACTION_ENRICHED AS F
    ON A.AKKIO_ID = F.AKKIO_ID
  WHERE F.TRANS_DATE >= :date_start
    AND F.TRANS_DATE <  :date_end
),
BRAND_METRICS AS (
  SELECT
    COUNT(DISTINCT A.AKKIO_ID)       AS BRAND_SHOPPERS,
    COUNT(F.TXID)                    AS BRAND_TRANSACTIONS,
    COALESCE(SUM(F.TRANS_AMOUNT), 0) AS BRAND_SPEND
  FROM AUDIENCE AS A
  INNER JOIN __FACT_DB__.__FACT_SCHEMA__.FACT_TRANSACTION_ENRICHED AS F
    ON A.AKKIO_ID = F.AKKIO_ID
  WHERE F.TRANS_DATE >= :date_start
    AND F.TRANS_DATE <  :date_end
    AND (__BRAND_FILTER__)
),
-- General population over the same window
BASELINE_ACTIVE AS (
  SELECT COUNT(DISTINCT F.AKKIO_ID) AS BASELINE_ACTIVE_IDS
  FROM __FACT_DB__.__FACT_SCHEMA__.FACT_TRANSACTION_ENRICHED AS F
  WHERE F.TRANS_DATE >= :date_start
    AND F.TRANS_DATE <  :date_end
),
BASELINE_BRAND AS (
  SELECT
    COUNT(DISTINCT F.AKKIO_ID)       AS BASELINE_BRAND_SHOPPERS,
    COUNT(F.TXID)                    AS BASELINE_BRAND_TRANSACTIONS,
    COALESCE(SUM(F.TRANS_AMOUNT), 0) AS BASELINE_BRAND_SPEND
  FROM __FACT_DB__.__FACT_SCHEMA__.FACT_TRANSACTION_ENRICHED AS F
  WHERE F.TRANS_DATE >= :date_start
    AND F.TRANS_DATE <  :date_end
    AND (__BRAND_FILTER__)
)
SELECT
  :audience_name AS AUDIENCE_NAME,
  :audience_id   AS AUDIENCE_ID,
  T.TOTAL_LAL_IDS,
  A.ACTIVE_MATCHED_IDS,
  B.BRAND_SHOPPERS,
  B.BRAND_TRANSACTIONS,
  B.BRAND_SPEND,

  CASE WHEN A.ACTIVE_MATCHED_IDS > 0
       THEN CAST(B.BRAND_SHOPPERS AS FLOAT) / A.ACTIVE_MATCHED_IDS
       ELSE 0 END AS SHOP_RATE,
  CASE WHEN A.ACTIVE_MATCHED_IDS > 0
       THEN CAST(B.BRAND_SPEND AS FLOAT) / A.ACTIVE_MATCHED_IDS
       ELSE 0 END AS SPEND_RATE,
  CASE WHEN B.BRAND_TRANSACTIONS > 0
       THEN CAST(B.BRAND_SPEND AS FLOAT) / B.BRAND_TRANSACTIONS
       ELSE 0 END AS AVERAGE_TICKET,
  CASE WHEN B.BRAND_SHOPPERS > 0
       THEN CAST(B.BRAND_TRANSACTIONS AS FLOAT) / B.BRAND_SHOPPERS
       ELSE 0 END AS AVG_TRANSACTIONS_PER_SHOPPER,

  BA.BASELINE_ACTIVE_IDS,
  BB.BASELINE_BRAND_SHOPPERS,
  CASE WHEN BA.BASELINE_ACTIVE_IDS > 0
       THEN CAST(BB.BASELINE_BRAND_SHOPPERS AS FLOAT) / BA.BASELINE_ACTIVE_IDS
       ELSE 0 END AS BASELINE_SHOP_RATE,
  CASE WHEN BA.BASELINE_ACTIVE_IDS > 0
       THEN CAST(BB.BASELINE_BRAND_SPEND AS FLOAT) / BA.BASELINE_ACTIVE_IDS
       ELSE 0 END AS BASELINE_SPEND_RATE,

  CASE WHEN BA.BASELINE_ACTIVE_IDS > 0 AND BB.BASELINE_BRAND_SHOPPERS > 0
       THEN (CASE WHEN A.ACTIVE_MATCHED_IDS > 0
                  THEN CAST(B.BRAND_SHOPPERS AS FLOAT) / A.ACTIVE_MATCHED_IDS
                  ELSE 0 END)
          / (CAST(BB.BASELINE_BRAND_SHOPPERS AS FLOAT) / BA.BASELINE_ACTIVE_IDS)
       ELSE NULL END AS SHOP_RATE_LIFT,
  CASE WHEN BA.BASELINE_ACTIVE_IDS > 0 AND BB.BASELINE_BRAND_SPEND > 0
       THEN (CASE WHEN A.ACTIVE_MATCHED_IDS > 0
                  THEN CAST(B.BRAND_SPEND AS FLOAT) / A.ACTIVE_MATCHED_IDS
                  ELSE 0 END)
          / (CAST(BB.BASELINE_BRAND_SPEND AS FLOAT) / BA.BASELINE_ACTIVE_IDS)
       ELSE NULL END AS SPEND_RATE_LIFT

FROM TOTAL_LAL AS T
CROSS JOIN ACTIVE_MATCHED  AS A
CROSS JOIN BRAND_METRICS   AS B
CROSS JOIN BASELINE_ACTIVE AS BA
CROSS JOIN BASELINE_BRAND  AS BB;
"#;

/// A named bind parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlParam {
    pub name: String,
    pub value: String,
}

impl SqlParam {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Validation query rendered for one audience
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationQuery {
    /// Audience the query was built for
    pub audience_id: String,

    /// Query text with `:name` placeholders still in place
    pub sql: String,

    /// Values for the placeholders
    pub params: Vec<SqlParam>,
}

impl ValidationQuery {
    /// Render the template for an audience
    pub fn for_audience(audience: &AudienceSpec) -> Self {
        let brand_filter = build_brand_filter(&audience.brand_keywords);

        let sql = VALIDATION_SQL_TEMPLATE
            .replace("__FACT_DB__", &audience.fact_database)
            .replace("__FACT_SCHEMA__", &audience.fact_schema)
            .replace("__DB__", &audience.database)
            .replace("__SCHEMA__", &audience.schema)
            .replace("__BRAND_FILTER__", &brand_filter);

        let params = vec![
            SqlParam::new("audience_id", audience.audience_id.clone()),
            SqlParam::new("audience_name", audience.name.clone()),
            SqlParam::new("date_start", audience.date_start.format("%Y-%m-%d").to_string()),
            SqlParam::new("date_end", audience.date_end.format("%Y-%m-%d").to_string()),
        ];

        Self {
            audience_id: audience.audience_id.clone(),
            sql,
            params,
        }
    }

    /// Query text with every placeholder replaced by a string literal
    pub fn bound_sql(&self) -> String {
        bind_literals(&self.sql, &self.params)
    }

    /// Parse the bound statement locally before it is sent to the warehouse
    pub fn preflight(&self) -> Result<(), SqlError> {
        Parser::parse_sql(&SnowflakeDialect {}, &self.bound_sql())
            .map(|_| ())
            .map_err(|e| SqlError::Syntax(e.to_string()))
    }
}

/// Build the OR-clause matching brand keywords against [`BRAND_COLUMNS`]
///
/// Each keyword contributes one case-insensitive substring predicate per column.
pub fn build_brand_filter(keywords: &[String]) -> String {
    keywords
        .iter()
        .flat_map(|kw| {
            let pattern = escape_literal(&kw.to_uppercase());
            BRAND_COLUMNS
                .iter()
                .map(move |col| format!("UPPER(F.{}) LIKE '%{}%'", col, pattern))
        })
        .collect::<Vec<_>>()
        .join("\n      OR ")
}

/// Quote a value as a Snowflake string literal
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", escape_literal(value))
}

fn escape_literal(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "''")
}

/// Replace `:name` placeholders outside of string literals and comments
///
/// Unknown names and `::` casts are left untouched.
pub fn bind_literals(sql: &str, params: &[SqlParam]) -> String {
    let chars: Vec<char> = sql.chars().collect();
    let mut out = String::with_capacity(sql.len());
    let mut i = 0;
    let mut in_quote = false;
    let mut in_comment = false;

    while i < chars.len() {
        let c = chars[i];

        if in_comment {
            out.push(c);
            if c == '\n' {
                in_comment = false;
            }
            i += 1;
            continue;
        }

        if in_quote {
            out.push(c);
            if c == '\\' && i + 1 < chars.len() {
                out.push(chars[i + 1]);
                i += 2;
                continue;
            }
            if c == '\'' {
                if chars.get(i + 1) == Some(&'\'') {
                    out.push('\'');
                    i += 2;
                    continue;
                }
                in_quote = false;
            }
            i += 1;
            continue;
        }

        match c {
            '\'' => {
                in_quote = true;
                out.push(c);
                i += 1;
            }
            '-' if chars.get(i + 1) == Some(&'-') => {
                in_comment = true;
                out.push(c);
                i += 1;
            }
            ':' if chars.get(i + 1) == Some(&':') => {
                out.push_str("::");
                i += 2;
            }
            ':' => {
                let start = i + 1;
                let mut end = start;
                while end < chars.len() && (chars[end].is_ascii_alphanumeric() || chars[end] == '_') {
                    end += 1;
                }
                let name: String = chars[start..end].iter().collect();
                match params.iter().find(|p| p.name == name) {
                    Some(param) if !name.is_empty() => {
                        out.push_str(&quote_literal(&param.value));
                        i = end;
                    }
                    _ => {
                        out.push(c);
                        i += 1;
                    }
                }
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }

    out
}

/// SQL error types
#[derive(Debug, thiserror::Error)]
pub enum SqlError {
    #[error("SQL syntax error: {0}")]
    Syntax(String),
}
