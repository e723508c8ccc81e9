//! Audit storage backends.
//!
//! The trail lives in one append-only Postgres table, independent of the
//! business tables it observes. An in-memory backend backs tests and a
//! null backend backs disabled configurations.

use crate::entry::AuditEntry;
use crate::error::AuditError;
use crate::recorder::AuditQuery;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quarry_core::Operation;
use sqlx::{PgPool, Row};
use std::str::FromStr;
use std::sync::RwLock;

/// Trait for audit storage backends.
#[async_trait]
pub trait AuditStorage: Send + Sync {
    /// Append one entry.
    async fn store(&self, entry: AuditEntry) -> Result<(), AuditError>;

    /// Query entries, newest first.
    async fn query(&self, filter: AuditQuery) -> Result<Vec<AuditEntry>, AuditError>;
}

/// Postgres-backed append-only storage.
pub struct PgStorage {
    pool: PgPool,
    table: String,
}

impl PgStorage {
    /// Create the storage and its table if it does not exist yet.
    ///
    /// The table name comes from configuration, not from any request, so
    /// interpolating it here stays inside the trust boundary.
    pub async fn new(pool: PgPool, table: impl Into<String>) -> Result<Self, AuditError> {
        let table = table.into();
        let ddl = format!(
            r#"
            create table if not exists "{table}" (
                id bigserial primary key,
                entry_id uuid not null,
                api_key_digest text not null,
                operation text not null,
                table_name text not null,
                affected_rows bigint not null default 0,
                filters jsonb,
                data jsonb,
                client_address text,
                user_agent text,
                occurred_at timestamptz not null,
                success boolean not null,
                error_message text
            )
            "#
        );
        sqlx::query(&ddl).execute(&pool).await?;
        Ok(Self { pool, table })
    }
}

#[async_trait]
impl AuditStorage for PgStorage {
    async fn store(&self, entry: AuditEntry) -> Result<(), AuditError> {
        let sql = format!(
            r#"
            insert into "{}"
                (entry_id, api_key_digest, operation, table_name, affected_rows,
                 filters, data, client_address, user_agent, occurred_at, success,
                 error_message)
            values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
            self.table
        );
        sqlx::query(&sql)
            .bind(entry.entry_id)
            .bind(&entry.api_key_digest)
            .bind(entry.operation.as_str())
            .bind(&entry.table)
            .bind(entry.affected_rows as i64)
            .bind(&entry.filters)
            .bind(&entry.data)
            .bind(&entry.client_address)
            .bind(&entry.user_agent)
            .bind(entry.occurred_at)
            .bind(entry.success)
            .bind(&entry.error_message)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn query(&self, filter: AuditQuery) -> Result<Vec<AuditEntry>, AuditError> {
        let mut qb = sqlx::QueryBuilder::new(format!(
            r#"select entry_id, api_key_digest, operation, table_name, affected_rows,
                      filters, data, client_address, user_agent, occurred_at, success,
                      error_message
               from "{}" where occurred_at >= "#,
            self.table
        ));
        qb.push_bind(filter.since);
        if let Some(until) = filter.until {
            qb.push(" and occurred_at <= ");
            qb.push_bind(until);
        }
        if let Some(table) = &filter.table {
            qb.push(" and table_name = ");
            qb.push_bind(table.clone());
        }
        if let Some(operation) = filter.operation {
            qb.push(" and operation = ");
            qb.push_bind(operation.as_str());
        }
        if let Some(success) = filter.success {
            qb.push(" and success = ");
            qb.push_bind(success);
        }
        qb.push(" order by occurred_at desc limit ");
        qb.push_bind(filter.limit as i64);
        qb.push(" offset ");
        qb.push_bind(filter.offset as i64);

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(row_to_entry).collect()
    }
}

fn row_to_entry(row: &sqlx::postgres::PgRow) -> Result<AuditEntry, AuditError> {
    let operation_text: String = row.try_get("operation")?;
    let operation = Operation::from_str(&operation_text)
        .map_err(|_| AuditError::Storage(format!("unknown operation '{operation_text}'")))?;
    let affected: i64 = row.try_get("affected_rows")?;

    Ok(AuditEntry {
        entry_id: row.try_get("entry_id")?,
        api_key_digest: row.try_get("api_key_digest")?,
        operation,
        table: row.try_get("table_name")?,
        affected_rows: affected.max(0) as u64,
        filters: row.try_get("filters")?,
        data: row.try_get("data")?,
        client_address: row.try_get("client_address")?,
        user_agent: row.try_get("user_agent")?,
        occurred_at: row.try_get::<DateTime<Utc>, _>("occurred_at")?,
        success: row.try_get("success")?,
        error_message: row.try_get("error_message")?,
    })
}

/// In-memory storage, used by tests and available for ephemeral setups.
#[derive(Default)]
pub struct MemoryStorage {
    entries: RwLock<Vec<AuditEntry>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditStorage for MemoryStorage {
    async fn store(&self, entry: AuditEntry) -> Result<(), AuditError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| AuditError::Storage(format!("lock poisoned: {e}")))?;
        entries.push(entry);
        Ok(())
    }

    async fn query(&self, filter: AuditQuery) -> Result<Vec<AuditEntry>, AuditError> {
        let entries = self
            .entries
            .read()
            .map_err(|e| AuditError::Storage(format!("lock poisoned: {e}")))?;

        let mut matched: Vec<AuditEntry> = entries
            .iter()
            .filter(|e| {
                e.occurred_at >= filter.since
                    && filter.until.is_none_or(|u| e.occurred_at <= u)
                    && filter.table.as_ref().is_none_or(|t| &e.table == t)
                    && filter.operation.is_none_or(|op| e.operation == op)
                    && filter.success.is_none_or(|s| e.success == s)
            })
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.occurred_at.cmp(&a.occurred_at));

        Ok(matched
            .into_iter()
            .skip(filter.offset)
            .take(filter.limit)
            .collect())
    }
}

/// No-op storage for disabled audit configurations.
pub struct NullStorage;

#[async_trait]
impl AuditStorage for NullStorage {
    async fn store(&self, _entry: AuditEntry) -> Result<(), AuditError> {
        Ok(())
    }

    async fn query(&self, _filter: AuditQuery) -> Result<Vec<AuditEntry>, AuditError> {
        Ok(Vec::new())
    }
}
