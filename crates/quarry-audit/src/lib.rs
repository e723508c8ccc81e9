//! Append-only audit trail for table mutations.
//!
//! Every mutation attempt, whether it commits, fails validation, or is
//! refused by permissions, produces one [`AuditEntry`]. Entries are
//! redacted before they are held anywhere and are never updated or
//! deleted by the application.

pub mod entry;
pub mod error;
pub mod recorder;
pub mod storage;

pub use entry::{AuditEntry, AuditEntryBuilder, REDACTED, sanitize};
pub use error::AuditError;
pub use recorder::{AuditQuery, AuditRecorder, AuditSummary, DEFAULT_WINDOW_HOURS, MAX_QUERY_LIMIT};
pub use storage::{AuditStorage, MemoryStorage, NullStorage, PgStorage};
