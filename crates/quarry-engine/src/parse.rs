//! Request parameter parsing.
//!
//! Turns raw ordered key/value pairs into unvalidated parse structures.
//! Parsing never executes SQL and never trusts type coercion: apart from
//! pagination fields, everything stays a string until the validator and
//! compiler stages. Output order follows request order.

use crate::error::EngineError;
use crate::types::{FilterOperator, JoinType, SortDirection};

/// Keys with dedicated meaning that are never treated as filters.
pub const RESERVED_KEYS: [&str; 7] = [
    "limit",
    "offset",
    "orderBy",
    "orderDirection",
    "join",
    "apiKey",
    "columns",
];

/// One parsed-but-unvalidated filter.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFilter {
    pub column: String,
    pub operator: FilterOperator,
    pub value: Option<String>,
}

/// One parsed-but-unvalidated join.
#[derive(Debug, Clone, PartialEq)]
pub struct RawJoin {
    pub local_column: String,
    pub join_table: String,
    pub join_column: String,
    pub select_columns: Vec<String>,
    pub join_type: JoinType,
}

/// Parsed-but-unvalidated column selection.
#[derive(Debug, Clone, PartialEq)]
pub enum RawColumns {
    All,
    List(Vec<String>),
}

/// First value for a key, if present.
pub fn get_param<'a>(params: &'a [(String, String)], key: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

/// All values for a repeatable key, in request order.
pub fn get_params_all<'a>(params: &'a [(String, String)], key: &str) -> Vec<&'a str> {
    params
        .iter()
        .filter(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
        .collect()
}

/// Parse the `columns` parameter: `*` (or absent) selects everything,
/// otherwise a comma list, trimmed, preserving request order.
pub fn parse_columns(raw: Option<&str>) -> RawColumns {
    match raw.map(str::trim) {
        None | Some("") | Some("*") => RawColumns::All,
        Some(list) => RawColumns::List(
            list.split(',')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string)
                .collect(),
        ),
    }
}

/// Extract filters from request pairs.
///
/// A key is a filter when it ends in `_{operator}` for a known operator
/// token; the longest token wins, so `created_not_in` parses as column
/// `created` with `not_in` rather than column `created_not` with `in`.
/// A column literally named like an operator suffix (say `x_in`) therefore
/// misparses; that ambiguity is a documented limitation of the key syntax.
/// Reserved keys and keys with no operator suffix are skipped.
pub fn parse_filters(params: &[(String, String)]) -> Vec<RawFilter> {
    let mut filters = Vec::new();
    for (key, value) in params {
        if RESERVED_KEYS.contains(&key.as_str()) {
            continue;
        }
        if let Some(filter) = parse_filter_key(key, value) {
            filters.push(filter);
        }
    }
    filters
}

fn parse_filter_key(key: &str, value: &str) -> Option<RawFilter> {
    for (token, operator) in FilterOperator::TOKENS {
        if let Some(column) = key.strip_suffix(token).and_then(|p| p.strip_suffix('_')) {
            if column.is_empty() {
                return None;
            }
            let value = if operator.takes_value() {
                Some(value.to_string())
            } else {
                None
            };
            return Some(RawFilter {
                column: column.to_string(),
                operator,
                value,
            });
        }
    }
    None
}

/// Parse one `join` parameter of the form
/// `localColumn:joinTable:joinColumn:selectColumns[:joinType]`.
/// Missing any of the first four fields is a parse failure, not a default.
pub fn parse_join(raw: &str) -> Result<RawJoin, EngineError> {
    let parts: Vec<&str> = raw.split(':').map(str::trim).collect();
    if parts.len() < 4 || parts.len() > 5 || parts[..4].iter().any(|p| p.is_empty()) {
        return Err(EngineError::MaliciousInput(format!(
            "join '{}' must be local:table:column:selectColumns[:type]",
            raw
        )));
    }

    let select_columns: Vec<String> = parts[3]
        .split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect();
    if select_columns.is_empty() {
        return Err(EngineError::MaliciousInput(format!(
            "join '{}' selects no columns",
            raw
        )));
    }

    let join_type = match parts.get(4) {
        None => JoinType::default(),
        Some(t) => match t.to_ascii_uppercase().as_str() {
            "INNER" => JoinType::Inner,
            "LEFT" => JoinType::Left,
            "RIGHT" => JoinType::Right,
            other => {
                return Err(EngineError::MaliciousInput(format!(
                    "unknown join type '{}'",
                    other
                )));
            }
        },
    };

    Ok(RawJoin {
        local_column: parts[0].to_string(),
        join_table: parts[1].to_string(),
        join_column: parts[2].to_string(),
        select_columns,
        join_type,
    })
}

/// Parse `orderDirection`; absent means ascending.
pub fn parse_sort_direction(raw: Option<&str>) -> Result<SortDirection, EngineError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(SortDirection::default()),
        Some(dir) => match dir.to_ascii_uppercase().as_str() {
            "ASC" => Ok(SortDirection::Asc),
            "DESC" => Ok(SortDirection::Desc),
            other => Err(EngineError::UnsupportedOperator(format!(
                "order direction '{}'",
                other
            ))),
        },
    }
}
