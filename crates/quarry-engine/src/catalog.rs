//! Table catalog: the allow-list of reachable tables.
//!
//! Populated by querying `information_schema` for base tables in the
//! default schema. On metadata failure the process continues degraded with
//! an empty allow-list; nothing is reachable until the next successful
//! refresh. The snapshot is immutable; a refresh swaps the whole `Arc`.

use crate::error::EngineError;
use serde::Serialize;
use sqlx::{PgPool, Row};
use std::collections::BTreeSet;
use std::sync::{Arc, RwLock};

/// Immutable snapshot of accessible tables.
#[derive(Debug, Clone, Default)]
pub struct TableCatalog {
    tables: BTreeSet<String>,
}

impl TableCatalog {
    /// Build a catalog from an explicit table list (tests, fixtures).
    pub fn from_tables<I, S>(tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tables: tables.into_iter().map(Into::into).collect(),
        }
    }

    /// Discover base tables in the `public` schema.
    ///
    /// A metadata failure is reported to the caller; the server treats it
    /// as a degraded start and falls back to [`TableCatalog::default`].
    pub async fn load(pool: &PgPool) -> Result<Self, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            select table_name
            from information_schema.tables
            where table_type = 'BASE TABLE'
              and table_schema = 'public'
            order by table_name
            "#,
        )
        .fetch_all(pool)
        .await?;

        let tables: BTreeSet<String> = rows
            .into_iter()
            .map(|r| r.get::<String, _>("table_name"))
            .collect();

        tracing::info!(table_count = tables.len(), "table catalog loaded");
        Ok(Self { tables })
    }

    /// Whether a table is in the allow-list.
    pub fn contains(&self, table: &str) -> bool {
        self.tables.contains(table)
    }

    /// The accessible tables, sorted.
    pub fn tables(&self) -> impl Iterator<Item = &str> {
        self.tables.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Reject a table that is not in the allow-list.
    pub fn require(&self, table: &str) -> Result<(), EngineError> {
        if self.contains(table) {
            Ok(())
        } else {
            Err(EngineError::NotAccessible(format!(
                "table '{}' is not in the accessible set",
                table
            )))
        }
    }
}

/// Column metadata for one allow-listed table, in ordinal order.
#[derive(Debug, Clone, Serialize)]
pub struct ColumnInfo {
    pub column_name: String,
    pub data_type: String,
    pub nullable: bool,
    pub default: Option<String>,
}

/// Fetch column metadata for a table.
///
/// Fails `NotAccessible` when the table is outside the cached allow-list;
/// there is deliberately no fallback to describing arbitrary tables.
pub async fn column_schema(
    pool: &PgPool,
    catalog: &TableCatalog,
    table: &str,
) -> Result<Vec<ColumnInfo>, EngineError> {
    catalog.require(table)?;

    let rows = sqlx::query(
        r#"
        select column_name, data_type, is_nullable, column_default
        from information_schema.columns
        where table_schema = 'public' and table_name = $1
        order by ordinal_position
        "#,
    )
    .bind(table)
    .fetch_all(pool)
    .await
    .map_err(|e| EngineError::ExecutionFailure(format!("schema fetch failed: {e}")))?;

    Ok(rows
        .into_iter()
        .map(|r| ColumnInfo {
            column_name: r.get("column_name"),
            data_type: r.get("data_type"),
            nullable: r.get::<String, _>("is_nullable") == "YES",
            default: r.get("column_default"),
        })
        .collect())
}

/// Process-scoped catalog holder.
///
/// Readers clone the inner `Arc` and work against a consistent snapshot;
/// refresh replaces the snapshot wholesale so no reader ever observes a
/// half-updated allow-list.
#[derive(Debug, Clone)]
pub struct SharedCatalog {
    inner: Arc<RwLock<Arc<TableCatalog>>>,
}

impl SharedCatalog {
    pub fn new(catalog: TableCatalog) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(catalog))),
        }
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> Arc<TableCatalog> {
        match self.inner.read() {
            Ok(guard) => Arc::clone(&guard),
            // A poisoned lock still holds a valid snapshot.
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Replace the snapshot atomically.
    pub fn swap(&self, catalog: TableCatalog) {
        let fresh = Arc::new(catalog);
        match self.inner.write() {
            Ok(mut guard) => *guard = fresh,
            Err(poisoned) => *poisoned.into_inner() = fresh,
        }
    }
}
