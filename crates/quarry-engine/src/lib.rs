//! Dynamic query & mutation engine.
//!
//! A miniature query compiler with a security boundary: untrusted request
//! parameters are parsed into typed structures, validated against an
//! allow-list catalog and a fixed injection-signature set, and only then
//! compiled into parameterized SQL. Raw strings cannot reach the compiler;
//! [`Identifier`] values are constructed exclusively by the validator.
//!
//! Pipeline: parse → validate → (permission check, mutations only) →
//! compile. Execution and audit belong to the server and audit crates.

pub mod catalog;
pub mod compile;
pub mod error;
pub mod parse;
pub mod permissions;
pub mod request;
pub mod types;
pub mod validate;

pub use catalog::{ColumnInfo, SharedCatalog, TableCatalog, column_schema};
pub use compile::{
    CompiledStatement, compile_count, compile_delete, compile_insert, compile_select,
    compile_update,
};
pub use error::EngineError;
pub use permissions::{MUTATION_ROW_ESTIMATE, check_write};
pub use request::{build_mutation_spec, build_query_spec};
pub use types::{
    ColumnSelection, Filter, FilterOperator, FilterValue, Identifier, Join, JoinType,
    MutationSpec, QuerySpec, ScalarValue, SortDirection,
};
