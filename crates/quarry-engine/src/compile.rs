//! SQL compilation.
//!
//! Consumes validated specs and produces parameterized statements. Literal
//! values are always bound as positional parameters; only already-validated
//! identifiers are interpolated into the SQL text, and always quoted.

use crate::error::EngineError;
use crate::types::{
    ColumnSelection, Filter, FilterOperator, FilterValue, Identifier, Join, MutationSpec,
    QuerySpec, ScalarValue,
};
use std::collections::HashMap;

/// A compiled statement plus its ordered bind parameters.
#[derive(Debug, Clone)]
pub struct CompiledStatement {
    pub sql: String,
    pub params: Vec<ScalarValue>,
}

/// Deterministic column→owning-table resolution, computed once per spec.
///
/// A column appearing in a join's selectColumns belongs to that join's
/// table (first join wins, in request order); every other column belongs to
/// the main table. With no joins, columns stay unqualified.
struct ColumnResolver<'a> {
    main: &'a Identifier,
    qualify: bool,
    join_owner: HashMap<&'a str, &'a Identifier>,
}

impl<'a> ColumnResolver<'a> {
    fn new(main: &'a Identifier, joins: &'a [Join]) -> Self {
        let mut join_owner = HashMap::new();
        for join in joins {
            for col in &join.select_columns {
                join_owner.entry(col.as_str()).or_insert(&join.join_table);
            }
        }
        Self {
            main,
            qualify: !joins.is_empty(),
            join_owner,
        }
    }

    /// Qualified, quoted reference for use in WHERE/ORDER BY.
    fn reference(&self, column: &Identifier) -> String {
        if !self.qualify {
            return column.quoted();
        }
        let owner = self
            .join_owner
            .get(column.as_str())
            .copied()
            .unwrap_or(self.main);
        format!("{}.{}", owner.quoted(), column.quoted())
    }

    /// Select-list entry; join-owned columns get a `table_column` alias so
    /// result rows stay unambiguous.
    fn select_entry(&self, column: &Identifier) -> String {
        if !self.qualify {
            return column.quoted();
        }
        match self.join_owner.get(column.as_str()) {
            Some(owner) => format!(
                "{}.{} AS \"{}_{}\"",
                owner.quoted(),
                column.quoted(),
                owner.as_str(),
                column.as_str()
            ),
            None => format!("{}.{}", self.main.quoted(), column.quoted()),
        }
    }
}

/// Compile the data SELECT for a read spec.
pub fn compile_select(spec: &QuerySpec) -> CompiledStatement {
    let resolver = ColumnResolver::new(&spec.table, &spec.joins);

    let select_list = match &spec.columns {
        ColumnSelection::All if spec.joins.is_empty() => "*".to_string(),
        ColumnSelection::All => {
            let mut entries = vec![format!("{}.*", spec.table.quoted())];
            for join in &spec.joins {
                for col in &join.select_columns {
                    entries.push(format!(
                        "{}.{} AS \"{}_{}\"",
                        join.join_table.quoted(),
                        col.quoted(),
                        join.join_table.as_str(),
                        col.as_str()
                    ));
                }
            }
            entries.join(", ")
        }
        ColumnSelection::List(columns) => columns
            .iter()
            .map(|c| resolver.select_entry(c))
            .collect::<Vec<_>>()
            .join(", "),
    };

    let mut sql = format!("SELECT {} FROM {}", select_list, spec.table.quoted());
    push_join_clauses(&mut sql, &spec.table, &spec.joins);

    let mut params = Vec::new();
    push_where_clause(&mut sql, &spec.filters, &resolver, &mut params);

    if let Some(order_by) = &spec.order_by {
        sql.push_str(&format!(
            " ORDER BY {} {}",
            resolver.reference(order_by),
            spec.order_direction.as_sql()
        ));
    }

    // Range-validated literals, not attacker-controlled text.
    sql.push_str(&format!(" LIMIT {} OFFSET {}", spec.limit, spec.offset));

    CompiledStatement { sql, params }
}

/// Compile the COUNT companion: same WHERE/JOIN shape, no LIMIT/OFFSET, so
/// the reported total is independent of pagination.
pub fn compile_count(spec: &QuerySpec) -> CompiledStatement {
    let resolver = ColumnResolver::new(&spec.table, &spec.joins);

    let mut sql = format!("SELECT COUNT(*) AS total FROM {}", spec.table.quoted());
    push_join_clauses(&mut sql, &spec.table, &spec.joins);

    let mut params = Vec::new();
    push_where_clause(&mut sql, &spec.filters, &resolver, &mut params);

    CompiledStatement { sql, params }
}

/// Compile `INSERT … VALUES (…) RETURNING …`.
pub fn compile_insert(spec: &MutationSpec) -> Result<CompiledStatement, EngineError> {
    if spec.data.is_empty() {
        return Err(EngineError::MaliciousInput(
            "CREATE compiled with no data".to_string(),
        ));
    }

    let columns: Vec<String> = spec.data.iter().map(|(c, _)| c.quoted()).collect();
    let placeholders: Vec<String> = (1..=spec.data.len()).map(|i| format!("${i}")).collect();
    let params: Vec<ScalarValue> = spec.data.iter().map(|(_, v)| v.clone()).collect();

    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
        spec.table.quoted(),
        columns.join(", "),
        placeholders.join(", "),
        returning_list(&spec.return_columns)
    );

    Ok(CompiledStatement { sql, params })
}

/// Compile `UPDATE … SET … WHERE … RETURNING …`.
pub fn compile_update(spec: &MutationSpec) -> Result<CompiledStatement, EngineError> {
    if spec.filters.is_empty() {
        return Err(EngineError::MissingFilter("UPDATE"));
    }
    if spec.data.is_empty() {
        return Err(EngineError::MaliciousInput(
            "UPDATE compiled with no data".to_string(),
        ));
    }

    let mut params: Vec<ScalarValue> = Vec::with_capacity(spec.data.len() + spec.filters.len());
    let set_clauses: Vec<String> = spec
        .data
        .iter()
        .enumerate()
        .map(|(i, (column, value))| {
            params.push(value.clone());
            format!("{} = ${}", column.quoted(), i + 1)
        })
        .collect();

    let resolver = ColumnResolver::new(&spec.table, &[]);
    let mut sql = format!(
        "UPDATE {} SET {}",
        spec.table.quoted(),
        set_clauses.join(", ")
    );
    push_where_clause(&mut sql, &spec.filters, &resolver, &mut params);
    sql.push_str(&format!(" RETURNING {}", returning_list(&spec.return_columns)));

    Ok(CompiledStatement { sql, params })
}

/// Compile `DELETE FROM … WHERE … RETURNING …`.
pub fn compile_delete(spec: &MutationSpec) -> Result<CompiledStatement, EngineError> {
    if spec.filters.is_empty() {
        return Err(EngineError::MissingFilter("DELETE"));
    }

    let resolver = ColumnResolver::new(&spec.table, &[]);
    let mut sql = format!("DELETE FROM {}", spec.table.quoted());
    let mut params = Vec::new();
    push_where_clause(&mut sql, &spec.filters, &resolver, &mut params);
    sql.push_str(&format!(" RETURNING {}", returning_list(&spec.return_columns)));

    Ok(CompiledStatement { sql, params })
}

fn returning_list(columns: &[Identifier]) -> String {
    if columns.is_empty() {
        "*".to_string()
    } else {
        columns
            .iter()
            .map(Identifier::quoted)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn push_join_clauses(sql: &mut String, main: &Identifier, joins: &[Join]) {
    for join in joins {
        sql.push_str(&format!(
            " {} JOIN {} ON {}.{} = {}.{}",
            join.join_type.as_sql(),
            join.join_table.quoted(),
            main.quoted(),
            join.local_column.quoted(),
            join.join_table.quoted(),
            join.join_column.quoted()
        ));
    }
}

/// Append a WHERE clause, continuing parameter numbering from `params`.
fn push_where_clause(
    sql: &mut String,
    filters: &[Filter],
    resolver: &ColumnResolver<'_>,
    params: &mut Vec<ScalarValue>,
) {
    if filters.is_empty() {
        return;
    }

    let mut conditions = Vec::with_capacity(filters.len());
    for filter in filters {
        let column = resolver.reference(&filter.column);
        let condition = match (filter.operator, &filter.value) {
            (FilterOperator::IsNull, _) => format!("{column} IS NULL"),
            (FilterOperator::IsNotNull, _) => format!("{column} IS NOT NULL"),
            (FilterOperator::Like, FilterValue::Scalar(value)) => {
                params.push(ScalarValue::Text(format!("%{}%", scalar_text(value))));
                format!("{column} ILIKE ${}", params.len())
            }
            (op @ (FilterOperator::In | FilterOperator::NotIn), FilterValue::List(values)) => {
                let mut placeholders = Vec::with_capacity(values.len());
                for value in values {
                    params.push(value.clone());
                    placeholders.push(format!("${}", params.len()));
                }
                let keyword = if op == FilterOperator::In { "IN" } else { "NOT IN" };
                format!("{column} {keyword} ({})", placeholders.join(", "))
            }
            (op, FilterValue::Scalar(value)) => {
                params.push(value.clone());
                format!("{column} {} ${}", comparison_sql(op), params.len())
            }
            // Validation guarantees operator/value agreement; an impossible
            // combination compiles to a never-true condition rather than
            // silently dropping the predicate.
            _ => "FALSE".to_string(),
        };
        conditions.push(condition);
    }

    sql.push_str(" WHERE ");
    sql.push_str(&conditions.join(" AND "));
}

fn comparison_sql(op: FilterOperator) -> &'static str {
    match op {
        FilterOperator::Eq => "=",
        FilterOperator::Ne => "!=",
        FilterOperator::Gt => ">",
        FilterOperator::Gte => ">=",
        FilterOperator::Lt => "<",
        FilterOperator::Lte => "<=",
        // Handled in push_where_clause; kept total for safety.
        FilterOperator::Like => "ILIKE",
        FilterOperator::In => "IN",
        FilterOperator::NotIn => "NOT IN",
        FilterOperator::IsNull | FilterOperator::IsNotNull => "IS",
    }
}

fn scalar_text(value: &ScalarValue) -> String {
    match value {
        ScalarValue::Text(s) => s.clone(),
        ScalarValue::Int(i) => i.to_string(),
        ScalarValue::Float(f) => f.to_string(),
        ScalarValue::Bool(b) => b.to_string(),
        ScalarValue::Null => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::TableCatalog;
    use crate::request::{build_mutation_spec, build_query_spec};
    use quarry_core::Operation;
    use serde_json::json;

    fn catalog() -> TableCatalog {
        TableCatalog::from_tables(["users", "products", "orders", "mapSolarSystems", "mapRegions"])
    }

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn simple_eq_filter_round_trip() {
        let spec = build_query_spec("users", &pairs(&[("status_eq", "active")]), &catalog())
            .unwrap();
        let stmt = compile_select(&spec);
        assert_eq!(
            stmt.sql,
            "SELECT * FROM \"users\" WHERE \"status\" = $1 LIMIT 100 OFFSET 0"
        );
        assert_eq!(stmt.params, vec![ScalarValue::Text("active".to_string())]);
    }

    #[test]
    fn price_range_scenario() {
        let params = pairs(&[
            ("columns", "id,name,price"),
            ("price_gte", "10"),
            ("price_lt", "100"),
            ("limit", "20"),
            ("offset", "0"),
        ]);
        let spec = build_query_spec("products", &params, &catalog()).unwrap();

        let stmt = compile_select(&spec);
        assert_eq!(
            stmt.sql,
            "SELECT \"id\", \"name\", \"price\" FROM \"products\" \
             WHERE \"price\" >= $1 AND \"price\" < $2 LIMIT 20 OFFSET 0"
        );
        assert_eq!(stmt.params, vec![ScalarValue::Int(10), ScalarValue::Int(100)]);

        let count = compile_count(&spec);
        assert_eq!(
            count.sql,
            "SELECT COUNT(*) AS total FROM \"products\" WHERE \"price\" >= $1 AND \"price\" < $2"
        );
        assert!(!count.sql.contains("LIMIT"));
        assert!(!count.sql.contains("OFFSET"));
        assert_eq!(count.params, stmt.params);
    }

    #[test]
    fn join_scenario_qualifies_and_aliases() {
        let params = pairs(&[("join", "regionID:mapRegions:regionID:regionName")]);
        let spec = build_query_spec("mapSolarSystems", &params, &catalog()).unwrap();
        let stmt = compile_select(&spec);

        assert!(stmt.sql.contains(
            "LEFT JOIN \"mapRegions\" ON \"mapSolarSystems\".\"regionID\" = \"mapRegions\".\"regionID\""
        ));
        assert!(stmt.sql.contains("\"mapSolarSystems\".*"));
        assert!(stmt.sql.contains("\"mapRegions\".\"regionName\" AS \"mapRegions_regionName\""));
    }

    #[test]
    fn explicit_columns_resolve_to_owning_table() {
        let params = pairs(&[
            ("columns", "solarSystemName,regionName"),
            ("join", "regionID:mapRegions:regionID:regionName"),
            ("regionName_eq", "Domain"),
            ("orderBy", "solarSystemName"),
            ("orderDirection", "DESC"),
        ]);
        let spec = build_query_spec("mapSolarSystems", &params, &catalog()).unwrap();
        let stmt = compile_select(&spec);

        assert!(stmt.sql.contains("\"mapSolarSystems\".\"solarSystemName\""));
        // Filter and order columns resolve through the same ownership map.
        assert!(stmt.sql.contains("WHERE \"mapRegions\".\"regionName\" = $1"));
        assert!(stmt.sql.contains("ORDER BY \"mapSolarSystems\".\"solarSystemName\" DESC"));
    }

    #[test]
    fn join_clauses_follow_request_order() {
        let params = pairs(&[
            ("join", "aId:orders:id:total:INNER"),
            ("join", "bId:products:id:name:RIGHT"),
        ]);
        let spec = build_query_spec("users", &params, &catalog()).unwrap();
        let stmt = compile_select(&spec);
        let inner = stmt.sql.find("INNER JOIN \"orders\"").unwrap();
        let right = stmt.sql.find("RIGHT JOIN \"products\"").unwrap();
        assert!(inner < right);
    }

    #[test]
    fn like_wraps_value_in_percent() {
        let spec =
            build_query_spec("users", &pairs(&[("name_like", "smith")]), &catalog()).unwrap();
        let stmt = compile_select(&spec);
        assert!(stmt.sql.contains("\"name\" ILIKE $1"));
        assert_eq!(stmt.params, vec![ScalarValue::Text("%smith%".to_string())]);
    }

    #[test]
    fn in_list_emits_one_placeholder_per_element() {
        let spec = build_query_spec(
            "orders",
            &pairs(&[("status_in", "pending,confirmed,shipped")]),
            &catalog(),
        )
        .unwrap();
        let stmt = compile_select(&spec);
        assert!(stmt.sql.contains("\"status\" IN ($1, $2, $3)"));
        assert_eq!(stmt.params.len(), 3);

        let spec = build_query_spec("orders", &pairs(&[("id_not_in", "1,2")]), &catalog())
            .unwrap();
        let stmt = compile_select(&spec);
        assert!(stmt.sql.contains("\"id\" NOT IN ($1, $2)"));
    }

    #[test]
    fn null_checks_take_no_parameters() {
        let spec = build_query_spec(
            "orders",
            &pairs(&[("shipped_at_is_null", ""), ("id_gt", "5")]),
            &catalog(),
        )
        .unwrap();
        let stmt = compile_select(&spec);
        assert!(stmt.sql.contains("\"shipped_at\" IS NULL AND \"id\" > $1"));
        assert_eq!(stmt.params, vec![ScalarValue::Int(5)]);
    }

    #[test]
    fn insert_compiles_with_returning_star_default() {
        let data = json!({"name": "Widget", "price": 9.5});
        let spec = build_mutation_spec(
            "products",
            Operation::Create,
            data.as_object(),
            &[],
            &[],
            &catalog(),
        )
        .unwrap();
        let stmt = compile_insert(&spec).unwrap();
        assert_eq!(
            stmt.sql,
            "INSERT INTO \"products\" (\"name\", \"price\") VALUES ($1, $2) RETURNING *"
        );
        assert_eq!(stmt.params.len(), 2);
    }

    #[test]
    fn insert_respects_explicit_return_columns() {
        let data = json!({"name": "Widget"});
        let spec = build_mutation_spec(
            "products",
            Operation::Create,
            data.as_object(),
            &["id".to_string(), "name".to_string()],
            &[],
            &catalog(),
        )
        .unwrap();
        let stmt = compile_insert(&spec).unwrap();
        assert!(stmt.sql.ends_with("RETURNING \"id\", \"name\""));
    }

    #[test]
    fn update_numbers_set_then_where_params() {
        let data = json!({"status": "archived"});
        let spec = build_mutation_spec(
            "orders",
            Operation::Update,
            data.as_object(),
            &[],
            &pairs(&[("id_eq", "123")]),
            &catalog(),
        )
        .unwrap();
        let stmt = compile_update(&spec).unwrap();
        assert_eq!(
            stmt.sql,
            "UPDATE \"orders\" SET \"status\" = $1 WHERE \"id\" = $2 RETURNING *"
        );
        assert_eq!(
            stmt.params,
            vec![
                ScalarValue::Text("archived".to_string()),
                ScalarValue::Int(123)
            ]
        );
    }

    #[test]
    fn delete_compiles_with_filters() {
        let spec = build_mutation_spec(
            "users",
            Operation::Delete,
            None,
            &[],
            &pairs(&[("id_eq", "123")]),
            &catalog(),
        )
        .unwrap();
        let stmt = compile_delete(&spec).unwrap();
        assert_eq!(stmt.sql, "DELETE FROM \"users\" WHERE \"id\" = $1 RETURNING *");
    }

    #[test]
    fn mutation_compilers_refuse_empty_filters() {
        let spec = MutationSpec {
            table: build_query_spec("users", &[], &catalog()).unwrap().table,
            operation: Operation::Delete,
            data: Vec::new(),
            filters: Vec::new(),
            return_columns: Vec::new(),
        };
        assert!(matches!(
            compile_delete(&spec),
            Err(EngineError::MissingFilter("DELETE"))
        ));
        assert!(matches!(
            compile_update(&spec),
            Err(EngineError::MissingFilter("UPDATE"))
        ));
    }
}
