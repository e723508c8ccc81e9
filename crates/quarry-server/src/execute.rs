//! Statement execution against the upstream pool.
//!
//! Compiled statements are wrapped in `to_jsonb` projections so every row
//! comes back as one JSON value, independent of the underlying column
//! types. Mutations run inside a scoped transaction; any error before
//! commit rolls the whole statement back.

use quarry_engine::{CompiledStatement, EngineError, ScalarValue};
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::{Arguments, PgPool, Row};

fn arguments_for(params: &[ScalarValue]) -> Result<PgArguments, EngineError> {
    let mut args = PgArguments::default();
    for value in params {
        let added = match value {
            ScalarValue::Text(s) => args.add(s.as_str()),
            ScalarValue::Int(i) => args.add(i),
            ScalarValue::Float(f) => args.add(f),
            ScalarValue::Bool(b) => args.add(b),
            ScalarValue::Null => args.add(Option::<String>::None),
        };
        added.map_err(|e| EngineError::ExecutionFailure(e.to_string()))?;
    }
    Ok(args)
}

fn json_row(row: &PgRow) -> Result<serde_json::Value, EngineError> {
    row.try_get::<serde_json::Value, _>("row")
        .map_err(|e| EngineError::ExecutionFailure(e.to_string()))
}

/// Run a compiled SELECT and return its rows as JSON objects.
pub async fn fetch_rows(
    pool: &PgPool,
    stmt: &CompiledStatement,
) -> Result<Vec<serde_json::Value>, EngineError> {
    let sql = format!("SELECT to_jsonb(q) AS row FROM ({}) AS q", stmt.sql);
    let args = arguments_for(&stmt.params)?;
    let rows = sqlx::query_with(&sql, args)
        .fetch_all(pool)
        .await
        .map_err(|e| EngineError::ExecutionFailure(e.to_string()))?;
    rows.iter().map(json_row).collect()
}

/// Run a compiled COUNT and return the total.
pub async fn fetch_count(pool: &PgPool, stmt: &CompiledStatement) -> Result<u64, EngineError> {
    let args = arguments_for(&stmt.params)?;
    let row = sqlx::query_with(&stmt.sql, args)
        .fetch_one(pool)
        .await
        .map_err(|e| EngineError::ExecutionFailure(e.to_string()))?;
    let count: i64 = row
        .try_get(0)
        .map_err(|e| EngineError::ExecutionFailure(e.to_string()))?;
    Ok(count.max(0) as u64)
}

/// Run a compiled INSERT/UPDATE/DELETE inside one transaction.
///
/// Returns the affected-row count and the RETURNING rows as JSON. An early
/// return on any error drops the transaction, which rolls it back.
pub async fn run_mutation(
    pool: &PgPool,
    stmt: &CompiledStatement,
) -> Result<(u64, Vec<serde_json::Value>), EngineError> {
    let mut tx = pool
        .begin()
        .await
        .map_err(|e| EngineError::ExecutionFailure(e.to_string()))?;

    // RETURNING yields one row per affected row, so the wrapped CTE gives
    // both the data and the count in a single round trip.
    let sql = format!("WITH m AS ({}) SELECT to_jsonb(m) AS row FROM m", stmt.sql);
    let args = arguments_for(&stmt.params)?;
    let rows = sqlx::query_with(&sql, args)
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| EngineError::ExecutionFailure(e.to_string()))?;

    let data: Vec<serde_json::Value> = rows
        .iter()
        .map(json_row)
        .collect::<Result<_, EngineError>>()?;

    tx.commit()
        .await
        .map_err(|e| EngineError::ExecutionFailure(e.to_string()))?;

    Ok((data.len() as u64, data))
}
