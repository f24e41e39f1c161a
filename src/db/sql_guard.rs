//! Safe ad-hoc SQL: callers may run arbitrary read-only SELECT statements
//! against the index, but never anything that mutates the database.
//!
//! Safety comes from two layers: only `SELECT`/`WITH` statements are
//! accepted at all, and a token denylist rejects any statement containing a
//! mutating keyword even inside a CTE or subquery (defense in depth against
//! a single point of failure in the first check).

use crate::error::{CoreError, Result};
use regex::Regex;
use rusqlite::Connection;
use std::sync::LazyLock;
use std::time::{Duration, Instant};

const DENIED_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "DROP", "ALTER", "CREATE", "REPLACE", "ATTACH", "DETACH",
    "PRAGMA", "VACUUM",
];

static KEYWORD_TOKEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[A-Za-z_][A-Za-z0-9_]*").unwrap());

#[derive(Debug, Clone)]
pub struct AdHocResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub query_time_ms: u128,
}

fn check_denylist(sql: &str) -> Result<()> {
    let trimmed = sql.trim_start();
    let starts_ok = trimmed[..trimmed.len().min(10)].to_ascii_uppercase().starts_with("SELECT")
        || trimmed[..trimmed.len().min(10)].to_ascii_uppercase().starts_with("WITH");
    if !starts_ok {
        return Err(CoreError::SqlDenied { token: "statement must start with SELECT or WITH".to_string() });
    }

    for m in KEYWORD_TOKEN.find_iter(sql) {
        let upper = m.as_str().to_ascii_uppercase();
        if DENIED_KEYWORDS.contains(&upper.as_str()) {
            return Err(CoreError::SqlDenied { token: upper });
        }
    }
    Ok(())
}

/// Run a caller-supplied read-only query with a denylist check, bound
/// parameters, a row limit, a hard timeout, and cancellation if the timeout
/// elapses mid-query.
pub fn run(
    conn: &Connection,
    sql: &str,
    params: &[rusqlite::types::Value],
    limit: Option<usize>,
    timeout: Duration,
) -> Result<AdHocResult> {
    check_denylist(sql)?;

    let start = Instant::now();
    let deadline = start + timeout;
    conn.progress_handler(1000, Some(move || Instant::now() > deadline));

    let result = (|| -> Result<AdHocResult> {
        let mut stmt = conn.prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();

        let mut rows_out = Vec::new();
        let mut rows = stmt.query(rusqlite::params_from_iter(params.iter()))?;
        loop {
            if limit.is_some_and(|l| rows_out.len() >= l) {
                break;
            }
            let row = match rows.next() {
                Ok(Some(row)) => row,
                Ok(None) => break,
                Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == rusqlite::ErrorCode::OperationInterrupted => {
                    return Err(CoreError::Timeout);
                }
                Err(e) => return Err(e.into()),
            };
            let mut values = Vec::with_capacity(columns.len());
            for i in 0..columns.len() {
                values.push(format_cell(row, i)?);
            }
            rows_out.push(values);
        }

        Ok(AdHocResult { columns, rows: rows_out, query_time_ms: start.elapsed().as_millis() })
    })();

    conn.progress_handler(0, None::<fn() -> bool>);
    result
}

fn format_cell(row: &rusqlite::Row, idx: usize) -> Result<String> {
    use rusqlite::types::ValueRef;
    let value = row.get_ref(idx)?;
    Ok(match value {
        ValueRef::Null => String::new(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(t) => String::from_utf8_lossy(t).to_string(),
        ValueRef::Blob(b) => format!("<{} bytes>", b.len()),
    })
}
