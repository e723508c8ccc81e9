//! Recorder facade over audit storage.
//!
//! Recording is best-effort: a storage failure is logged and swallowed so
//! the mutation path never fails because the trail is unavailable.

use crate::entry::AuditEntry;
use crate::error::AuditError;
use crate::storage::{AuditStorage, NullStorage};
use chrono::{DateTime, Duration, Utc};
use quarry_core::Operation;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

/// Default lookback window for queries and summaries.
pub const DEFAULT_WINDOW_HOURS: i64 = 24;

/// Hard cap on rows returned by a single trail query.
pub const MAX_QUERY_LIMIT: usize = 1000;

/// Rows scanned when building a summary.
const SUMMARY_SCAN_LIMIT: usize = 10_000;

/// Filter for querying the audit trail.
#[derive(Debug, Clone)]
pub struct AuditQuery {
    pub table: Option<String>,
    pub operation: Option<Operation>,
    pub success: Option<bool>,
    pub since: DateTime<Utc>,
    pub until: Option<DateTime<Utc>>,
    pub limit: usize,
    pub offset: usize,
}

impl Default for AuditQuery {
    fn default() -> Self {
        Self {
            table: None,
            operation: None,
            success: None,
            since: Utc::now() - Duration::hours(DEFAULT_WINDOW_HOURS),
            until: None,
            limit: 100,
            offset: 0,
        }
    }
}

/// Aggregated view of recent mutation activity.
#[derive(Debug, Clone, Serialize)]
pub struct AuditSummary {
    pub window_hours: i64,
    pub since: DateTime<Utc>,
    pub total_attempts: u64,
    pub successes: u64,
    pub failures: u64,
    pub total_affected_rows: u64,
    pub by_operation: BTreeMap<String, u64>,
    pub by_table: BTreeMap<String, u64>,
}

/// Shared handle for recording and querying the mutation trail.
#[derive(Clone)]
pub struct AuditRecorder {
    storage: Arc<dyn AuditStorage>,
}

impl AuditRecorder {
    pub fn new(storage: Arc<dyn AuditStorage>) -> Self {
        Self { storage }
    }

    /// Recorder that drops everything, for configurations with audit off.
    pub fn disabled() -> Self {
        Self {
            storage: Arc::new(NullStorage),
        }
    }

    /// Record one mutation attempt. Failures are logged, not propagated.
    pub async fn record(&self, entry: AuditEntry) {
        let table = entry.table.clone();
        let operation = entry.operation;
        if let Err(err) = self.storage.store(entry).await {
            warn!(%table, %operation, error = %err, "failed to record audit entry");
        }
    }

    /// Record without blocking the caller. Used on the response path so
    /// mutation latency does not include the trail write.
    pub fn record_detached(&self, entry: AuditEntry) {
        let recorder = self.clone();
        tokio::spawn(async move {
            recorder.record(entry).await;
        });
    }

    /// Query the trail, newest entries first. The limit is clamped to
    /// [`MAX_QUERY_LIMIT`].
    pub async fn query(&self, mut filter: AuditQuery) -> Result<Vec<AuditEntry>, AuditError> {
        filter.limit = filter.limit.clamp(1, MAX_QUERY_LIMIT);
        self.storage.query(filter).await
    }

    /// Aggregate attempts over the last `window_hours` hours.
    pub async fn summarize(&self, window_hours: Option<i64>) -> Result<AuditSummary, AuditError> {
        let window_hours = window_hours.unwrap_or(DEFAULT_WINDOW_HOURS).max(1);
        let since = Utc::now() - Duration::hours(window_hours);
        let entries = self
            .storage
            .query(AuditQuery {
                since,
                limit: SUMMARY_SCAN_LIMIT,
                ..Default::default()
            })
            .await?;

        let mut summary = AuditSummary {
            window_hours,
            since,
            total_attempts: 0,
            successes: 0,
            failures: 0,
            total_affected_rows: 0,
            by_operation: BTreeMap::new(),
            by_table: BTreeMap::new(),
        };
        for entry in &entries {
            summary.total_attempts += 1;
            if entry.success {
                summary.successes += 1;
            } else {
                summary.failures += 1;
            }
            summary.total_affected_rows += entry.affected_rows;
            *summary
                .by_operation
                .entry(entry.operation.as_str().to_string())
                .or_insert(0) += 1;
            *summary.by_table.entry(entry.table.clone()).or_insert(0) += 1;
        }
        Ok(summary)
    }
}
