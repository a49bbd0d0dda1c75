//! Row materialization from DuckDB into JSON.

use chrono::{DateTime, NaiveDate};
use duckdb::Connection;
use duckdb::types::{TimeUnit, ValueRef};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Error;

/// Default cap on rows returned by one query.
pub const DEFAULT_MAX_ROWS: usize = 500;

/// Days between 0001-01-01 (CE day 1) and the Unix epoch.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// Columns and rows of one executed statement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    /// More rows were available than `max_rows`.
    pub truncated: bool,
}

impl QueryResult {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// Execute `sql` and collect at most `max_rows` rows.
pub fn run_query(conn: &Connection, sql: &str, max_rows: usize) -> Result<QueryResult, Error> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows_out = Vec::new();
    let mut truncated = false;

    {
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            if rows_out.len() >= max_rows {
                truncated = true;
                break;
            }
            let width = row.as_ref().column_count();
            let mut values = Vec::with_capacity(width);
            for i in 0..width {
                values.push(to_json(row.get_ref(i)?));
            }
            rows_out.push(values);
        }
    }

    let columns = stmt.column_names();
    Ok(QueryResult { columns, rows: rows_out, truncated })
}

fn to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Boolean(b) => Value::Bool(b),
        ValueRef::TinyInt(i) => Value::from(i),
        ValueRef::SmallInt(i) => Value::from(i),
        ValueRef::Int(i) => Value::from(i),
        ValueRef::BigInt(i) => Value::from(i),
        ValueRef::UTinyInt(i) => Value::from(i),
        ValueRef::USmallInt(i) => Value::from(i),
        ValueRef::UInt(i) => Value::from(i),
        ValueRef::UBigInt(i) => Value::from(i),
        ValueRef::HugeInt(i) => Value::String(i.to_string()),
        ValueRef::Float(f) => Value::from(f64::from(f)),
        ValueRef::Double(f) => Value::from(f),
        ValueRef::Decimal(d) => Value::String(d.to_string()),
        ValueRef::Text(s) => Value::String(String::from_utf8_lossy(s).into_owned()),
        ValueRef::Blob(b) => Value::String(format!("\\x{}", b.iter().map(|byte| format!("{byte:02x}")).collect::<String>())),
        ValueRef::Date32(days) => NaiveDate::from_num_days_from_ce_opt(days + UNIX_EPOCH_DAYS_FROM_CE)
            .map(|d| Value::String(d.to_string()))
            .unwrap_or(Value::Null),
        ValueRef::Timestamp(unit, raw) => DateTime::from_timestamp_micros(to_micros(unit, raw))
            .map(|ts| Value::String(ts.naive_utc().to_string()))
            .unwrap_or(Value::Null),
        other => Value::String(format!("{other:?}")),
    }
}

fn to_micros(unit: TimeUnit, raw: i64) -> i64 {
    match unit {
        TimeUnit::Second => raw.saturating_mul(1_000_000),
        TimeUnit::Millisecond => raw.saturating_mul(1_000),
        TimeUnit::Microsecond => raw,
        TimeUnit::Nanosecond => raw / 1_000,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scalar_types() {
        let conn = Connection::open_in_memory().unwrap();
        let result = run_query(
            &conn,
            "SELECT 1 AS i, 2.5::DOUBLE AS d, 'x' AS s, NULL AS n, true AS b, DATE '2024-03-01' AS day, \
             TIMESTAMP '2024-03-01 12:30:00' AS ts",
            10,
        )
        .unwrap();

        assert_eq!(result.columns, vec!["i", "d", "s", "n", "b", "day", "ts"]);
        assert_eq!(
            result.rows,
            vec![vec![
                json!(1),
                json!(2.5),
                json!("x"),
                Value::Null,
                json!(true),
                json!("2024-03-01"),
                json!("2024-03-01 12:30:00"),
            ]]
        );
        assert!(!result.truncated);
    }

    #[test]
    fn test_truncation() {
        let conn = Connection::open_in_memory().unwrap();
        let result = run_query(&conn, "SELECT * FROM range(10)", 3).unwrap();
        assert_eq!(result.row_count(), 3);
        assert!(result.truncated);
        assert_eq!(result.rows[2], vec![json!(2)]);
    }

    #[test]
    fn test_empty_result_keeps_columns() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (a INTEGER, b VARCHAR)").unwrap();
        let result = run_query(&conn, "SELECT a, b FROM t", 10).unwrap();
        assert_eq!(result.columns, vec!["a", "b"]);
        assert!(result.rows.is_empty());
    }

    #[test]
    fn test_sql_error_is_database_error() {
        let conn = Connection::open_in_memory().unwrap();
        let err = run_query(&conn, "SELECT * FROM missing_table", 10).unwrap_err();
        assert!(matches!(err, Error::Database(_)));
    }
}
