use quarry_audit::AuditRecorder;
use quarry_core::WritePermissionSet;
use quarry_engine::SharedCatalog;
use sqlx::PgPool;

/// Shared application state.
///
/// The catalog and permission set are read-only snapshots; the catalog can
/// be replaced wholesale via the refresh endpoint, permissions are fixed
/// for the process lifetime.
pub struct AppState {
    pub pool: PgPool,
    pub catalog: SharedCatalog,
    pub permissions: WritePermissionSet,
    pub audit: AuditRecorder,

    /// When true, execution failures return the database error verbatim.
    pub disclose_errors: bool,
}

impl AppState {
    /// Whether the digest belongs to any write-permissioned key. Gates the
    /// introspection-adjacent endpoints (catalog refresh, audit review).
    pub fn has_write_record(&self, digest: &str) -> bool {
        self.permissions.get(digest).is_some()
    }
}
