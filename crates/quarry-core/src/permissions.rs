//! Write-permission snapshot.
//!
//! Permissions are resolved from configuration once at startup into a
//! [`WritePermissionSet`] keyed by API-key digest. The set is immutable; a
//! refresh builds a new set and swaps the whole snapshot so concurrent
//! readers never observe a half-updated envelope.

use crate::config::{ConfigError, WritePermissionEntry};
use crate::{Operation, digest_api_key};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// The write envelope for one API key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WritePermission {
    /// SHA-256 hex digest of the API key. The raw key is never stored.
    pub api_key_digest: String,

    /// Allowed tables. A single `*` entry grants every allow-listed table.
    pub allowed_tables: HashSet<String>,

    /// Allowed mutation operations.
    pub allowed_operations: HashSet<Operation>,

    /// Ceiling on records per operation.
    pub max_records_per_operation: u64,

    /// Optional per-key rate-limit override (enforced externally).
    pub rate_limit_per_minute: Option<u32>,
}

impl WritePermission {
    /// Whether this permission covers the given table.
    pub fn covers_table(&self, table: &str) -> bool {
        self.allowed_tables.contains("*") || self.allowed_tables.contains(table)
    }

    /// Whether this permission covers the given operation.
    pub fn covers_operation(&self, operation: Operation) -> bool {
        self.allowed_operations.contains(&operation)
    }
}

/// Immutable set of write permissions, keyed by API-key digest.
#[derive(Debug, Clone, Default)]
pub struct WritePermissionSet {
    by_digest: HashMap<String, WritePermission>,
}

impl WritePermissionSet {
    /// Build a snapshot from config entries, digesting raw keys.
    pub fn from_entries(entries: &[WritePermissionEntry]) -> Result<Self, ConfigError> {
        let mut by_digest = HashMap::with_capacity(entries.len());
        for entry in entries {
            let digest = match (&entry.api_key, &entry.api_key_digest) {
                (Some(raw), _) => digest_api_key(raw),
                (None, Some(digest)) => digest.clone(),
                (None, None) => return Err(ConfigError::MissingKey),
            };
            by_digest.insert(
                digest.clone(),
                WritePermission {
                    api_key_digest: digest,
                    allowed_tables: entry.tables.iter().cloned().collect(),
                    allowed_operations: entry.operations.iter().copied().collect(),
                    max_records_per_operation: entry.max_records_per_operation,
                    rate_limit_per_minute: entry.rate_limit_per_minute,
                },
            );
        }
        Ok(Self { by_digest })
    }

    /// Look up the permission for a key digest.
    pub fn get(&self, digest: &str) -> Option<&WritePermission> {
        self.by_digest.get(digest)
    }

    /// Number of configured keys.
    pub fn len(&self) -> usize {
        self.by_digest.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_digest.is_empty()
    }
}
