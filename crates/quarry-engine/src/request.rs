//! Request assembly: parse, validate, and build immutable specs.
//!
//! These are the only constructors for [`QuerySpec`] and [`MutationSpec`].
//! Every failure is reported before any SQL is compiled; there is no
//! best-effort partial query.

use crate::catalog::TableCatalog;
use crate::error::EngineError;
use crate::parse::{
    RawColumns, RawFilter, get_param, get_params_all, parse_columns, parse_filters, parse_join,
    parse_sort_direction,
};
use crate::types::{
    ColumnSelection, Filter, Identifier, Join, MutationSpec, QuerySpec, ScalarValue,
};
use crate::validate::{
    MAX_FILTERS, MAX_JOINS, validate_column, validate_data_value, validate_pagination,
    validate_table, validate_value,
};
use quarry_core::Operation;

/// Build a validated read spec from the table path segment and the raw,
/// ordered query parameters.
pub fn build_query_spec(
    table: &str,
    params: &[(String, String)],
    catalog: &TableCatalog,
) -> Result<QuerySpec, EngineError> {
    let table = validate_table(table)?;
    catalog.require(table.as_str())?;

    let columns = match parse_columns(get_param(params, "columns")) {
        RawColumns::All => ColumnSelection::All,
        RawColumns::List(names) => {
            let mut list = Vec::with_capacity(names.len());
            for name in &names {
                list.push(validate_column(name)?);
            }
            ColumnSelection::List(list)
        }
    };

    let filters = validate_filters(parse_filters(params))?;

    let raw_joins = get_params_all(params, "join");
    if raw_joins.len() > MAX_JOINS {
        return Err(EngineError::MaliciousInput(format!(
            "request exceeds {} joins",
            MAX_JOINS
        )));
    }
    let mut joins = Vec::with_capacity(raw_joins.len());
    for raw in raw_joins {
        let parsed = parse_join(raw)?;
        let join_table = validate_table(&parsed.join_table)?;
        catalog.require(join_table.as_str())?;
        let mut select_columns = Vec::with_capacity(parsed.select_columns.len());
        for col in &parsed.select_columns {
            select_columns.push(validate_column(col)?);
        }
        joins.push(Join {
            local_column: validate_column(&parsed.local_column)?,
            join_table,
            join_column: validate_column(&parsed.join_column)?,
            select_columns,
            join_type: parsed.join_type,
        });
    }

    let (limit, offset) =
        validate_pagination(get_param(params, "limit"), get_param(params, "offset"))?;

    let order_by = match get_param(params, "orderBy").map(str::trim) {
        None | Some("") => None,
        Some(column) => Some(validate_column(column)?),
    };
    let order_direction = parse_sort_direction(get_param(params, "orderDirection"))?;

    Ok(QuerySpec {
        table,
        columns,
        filters,
        joins,
        limit,
        offset,
        order_by,
        order_direction,
    })
}

/// Build a validated mutation spec.
///
/// `data` is the request body's `data` object (CREATE/UPDATE); filters come
/// from the same `{column}_{operator}` query-parameter convention as reads.
/// UPDATE/DELETE with zero filters fail here, before any SQL exists.
pub fn build_mutation_spec(
    table: &str,
    operation: Operation,
    data: Option<&serde_json::Map<String, serde_json::Value>>,
    return_columns: &[String],
    params: &[(String, String)],
    catalog: &TableCatalog,
) -> Result<MutationSpec, EngineError> {
    let table = validate_table(table)?;
    catalog.require(table.as_str())?;

    let data = match operation {
        Operation::Create | Operation::Update => {
            let map = data.filter(|m| !m.is_empty()).ok_or_else(|| {
                EngineError::MaliciousInput(format!(
                    "{} requires a non-empty data object",
                    operation
                ))
            })?;
            let mut pairs = Vec::with_capacity(map.len());
            for (key, value) in map {
                // Payload keys get the same blacklist treatment as read
                // column selection.
                let column = validate_column(key)?;
                let value = ScalarValue::from_json(value);
                validate_data_value(&value)?;
                pairs.push((column, value));
            }
            pairs
        }
        Operation::Delete => Vec::new(),
    };

    let filters = validate_filters(parse_filters(params))?;
    if matches!(operation, Operation::Update | Operation::Delete) && filters.is_empty() {
        return Err(EngineError::MissingFilter(match operation {
            Operation::Update => "UPDATE",
            _ => "DELETE",
        }));
    }

    let mut returning = Vec::with_capacity(return_columns.len());
    for column in return_columns {
        returning.push(validate_column(column)?);
    }

    Ok(MutationSpec {
        table,
        operation,
        data,
        filters,
        return_columns: returning,
    })
}

fn validate_filters(raw: Vec<RawFilter>) -> Result<Vec<Filter>, EngineError> {
    if raw.len() > MAX_FILTERS {
        return Err(EngineError::MaliciousInput(format!(
            "request exceeds {} filters",
            MAX_FILTERS
        )));
    }
    let mut filters = Vec::with_capacity(raw.len());
    for f in raw {
        let column = validate_column(&f.column)?;
        let value = validate_value(f.value.as_deref(), f.operator)?;
        filters.push(Filter {
            column,
            operator: f.operator,
            value,
        });
    }
    Ok(filters)
}
