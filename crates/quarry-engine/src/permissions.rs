//! Write-permission enforcement.
//!
//! Reads never pass through here; only mutation paths consult the
//! permission set. Absence of a permission record means no write access of
//! any kind.

use crate::error::EngineError;
use quarry_core::{Operation, WritePermissionSet};

/// Conservative pre-check row estimate for UPDATE/DELETE, where the true
/// affected-row count is unknown before execution. The ceiling is an
/// access-tier gate, not a runtime guarantee: the engine does not abort
/// when the real count later differs.
pub const MUTATION_ROW_ESTIMATE: u64 = 1;

/// Enforce the write envelope for one mutation attempt.
pub fn check_write(
    permissions: &WritePermissionSet,
    api_key_digest: &str,
    operation: Operation,
    table: &str,
    estimated_records: u64,
) -> Result<(), EngineError> {
    let Some(permission) = permissions.get(api_key_digest) else {
        return Err(EngineError::Forbidden(
            "no write permission for this API key".to_string(),
        ));
    };

    if !permission.covers_operation(operation) {
        return Err(EngineError::Forbidden(format!(
            "operation {} is not permitted for this API key",
            operation
        )));
    }

    if !permission.covers_table(table) {
        return Err(EngineError::Forbidden(format!(
            "table '{}' is not permitted for this API key",
            table
        )));
    }

    if estimated_records > permission.max_records_per_operation {
        return Err(EngineError::Forbidden(format!(
            "estimated {} records exceeds the per-operation ceiling of {}",
            estimated_records, permission.max_records_per_operation
        )));
    }

    Ok(())
}
