//! Audit entry type and redaction.
//!
//! One entry is created per mutation attempt, success or failure, and is
//! never updated or deleted by the application. The raw API key never
//! appears; entries carry a truncated digest only.

use chrono::{DateTime, Utc};
use quarry_core::Operation;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Marker written in place of redacted values.
pub const REDACTED: &str = "[REDACTED]";

/// Field-name substrings whose values are redacted before persistence.
const SENSITIVE_TERMS: [&str; 6] = [
    "password",
    "secret",
    "token",
    "private_key",
    "api_key",
    "credential",
];

/// Immutable record of one mutation attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Unique entry ID.
    pub entry_id: Uuid,

    /// Truncated API-key digest; never the raw key.
    pub api_key_digest: String,

    /// Mutation operation.
    pub operation: Operation,

    /// Target table.
    pub table: String,

    /// Rows affected (0 for failed attempts).
    pub affected_rows: u64,

    /// Serialized filters, as received.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filters: Option<serde_json::Value>,

    /// Serialized payload with sensitive fields redacted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,

    /// Client address, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_address: Option<String>,

    /// Client user agent, if sent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,

    /// When the attempt occurred.
    pub occurred_at: DateTime<Utc>,

    /// Whether the mutation committed.
    pub success: bool,

    /// Error message for failed attempts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl AuditEntry {
    /// Start building an entry for one mutation attempt. `data` is redacted
    /// here, at construction time, so no unsanitized payload is ever held
    /// by the recorder.
    pub fn builder(
        api_key_digest: impl Into<String>,
        operation: Operation,
        table: impl Into<String>,
    ) -> AuditEntryBuilder {
        AuditEntryBuilder {
            entry: Self {
                entry_id: Uuid::new_v4(),
                api_key_digest: api_key_digest.into(),
                operation,
                table: table.into(),
                affected_rows: 0,
                filters: None,
                data: None,
                client_address: None,
                user_agent: None,
                occurred_at: Utc::now(),
                success: false,
                error_message: None,
            },
        }
    }
}

/// Builder for [`AuditEntry`].
#[derive(Debug)]
pub struct AuditEntryBuilder {
    entry: AuditEntry,
}

impl AuditEntryBuilder {
    pub fn affected_rows(mut self, rows: u64) -> Self {
        self.entry.affected_rows = rows;
        self
    }

    pub fn filters(mut self, filters: serde_json::Value) -> Self {
        self.entry.filters = Some(filters);
        self
    }

    /// Attach the mutation payload, redacting sensitive fields.
    pub fn data(mut self, data: serde_json::Value) -> Self {
        self.entry.data = Some(sanitize(data));
        self
    }

    pub fn client_address(mut self, addr: impl Into<String>) -> Self {
        self.entry.client_address = Some(addr.into());
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.entry.user_agent = Some(agent.into());
        self
    }

    pub fn success(mut self, success: bool) -> Self {
        self.entry.success = success;
        self
    }

    pub fn error_message(mut self, message: impl Into<String>) -> Self {
        self.entry.error_message = Some(message.into());
        self
    }

    pub fn build(self) -> AuditEntry {
        self.entry
    }
}

/// Replace the value of any field whose name contains a sensitive term.
/// Recurses into nested objects so wrapped payloads get the same treatment.
pub fn sanitize(value: serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (key, inner) in map {
                let lowered = key.to_ascii_lowercase();
                if SENSITIVE_TERMS.iter().any(|t| lowered.contains(t)) {
                    out.insert(key, serde_json::Value::String(REDACTED.to_string()));
                } else {
                    out.insert(key, sanitize(inner));
                }
            }
            serde_json::Value::Object(out)
        }
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.into_iter().map(sanitize).collect())
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sanitize_redacts_sensitive_field_names() {
        let out = sanitize(json!({
            "name": "widget",
            "user_password": "hunter2",
            "apiToken": "abc",
            "nested": {"private_key_pem": "----", "ok": 1},
            "items": [{"secret_code": "x"}]
        }));
        assert_eq!(out["name"], "widget");
        assert_eq!(out["user_password"], REDACTED);
        // Case-insensitive substring match catches camelCase too.
        assert_eq!(out["apiToken"], "[REDACTED]");
        assert_eq!(out["nested"]["private_key_pem"], REDACTED);
        assert_eq!(out["nested"]["ok"], 1);
        assert_eq!(out["items"][0]["secret_code"], REDACTED);
    }

    #[test]
    fn builder_redacts_payload_at_construction() {
        let entry = AuditEntry::builder("abcd1234…", Operation::Create, "orders")
            .data(json!({"note": "fine", "card_secret": "1234"}))
            .affected_rows(1)
            .success(true)
            .build();
        let data = entry.data.unwrap();
        assert_eq!(data["note"], "fine");
        assert_eq!(data["card_secret"], REDACTED);
        assert!(entry.success);
        assert_eq!(entry.affected_rows, 1);
    }

    #[test]
    fn failed_attempt_entry_carries_error() {
        let entry = AuditEntry::builder("abcd1234…", Operation::Delete, "orders")
            .error_message("forbidden: table 'orders' is not permitted")
            .build();
        assert!(!entry.success);
        assert_eq!(entry.affected_rows, 0);
        assert!(entry.error_message.unwrap().contains("forbidden"));
    }
}
