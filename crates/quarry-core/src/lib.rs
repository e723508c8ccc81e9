//! Shared types for the Quarry table gateway.
//!
//! This crate holds the configuration model loaded at process start and the
//! write-permission snapshot consulted on every mutation. Nothing here talks
//! to the database; the engine and server crates consume these types.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub mod config;
pub mod permissions;

pub use config::{AuditConfig, DatabaseConfig, HttpConfig, QuarryConfig, WritePermissionEntry};
pub use permissions::{WritePermission, WritePermissionSet};

/// A mutation operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    Create,
    Update,
    Delete,
}

impl Operation {
    /// Stable uppercase name used in responses and audit rows.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "CREATE" => Ok(Self::Create),
            "UPDATE" => Ok(Self::Update),
            "DELETE" => Ok(Self::Delete),
            other => Err(format!("unknown operation '{other}'")),
        }
    }
}

/// SHA-256 hex digest of a raw API key.
///
/// Raw keys never leave the request handler; everything downstream
/// (permission lookup, audit rows) works with the digest.
pub fn digest_api_key(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    hex_encode(&hasher.finalize())
}

/// Truncated digest form safe to persist in audit rows and log lines.
pub fn truncate_digest(digest: &str) -> String {
    let cut = digest.char_indices().nth(12).map_or(digest.len(), |(i, _)| i);
    format!("{}…", &digest[..cut])
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{:02x}", b));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_stable_and_hex() {
        let d1 = digest_api_key("test-key");
        let d2 = digest_api_key("test-key");
        assert_eq!(d1, d2);
        assert_eq!(d1.len(), 64);
        assert!(d1.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn truncated_digest_never_exposes_full_key_material() {
        let d = digest_api_key("super-secret-api-key");
        let t = truncate_digest(&d);
        assert!(t.len() < d.len());
        assert!(d.starts_with(t.trim_end_matches('…')));
    }

    #[test]
    fn operation_display() {
        assert_eq!(Operation::Create.to_string(), "CREATE");
        assert_eq!(Operation::Delete.as_str(), "DELETE");
    }

    #[test]
    fn operation_parses_case_insensitively() {
        assert_eq!("create".parse::<Operation>().unwrap(), Operation::Create);
        assert_eq!("UPDATE".parse::<Operation>().unwrap(), Operation::Update);
        assert!("DROP".parse::<Operation>().is_err());
    }
}
