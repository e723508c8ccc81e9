//! Engine intermediate representation.
//!
//! Raw request parameters are parsed and validated into these types before
//! any SQL is produced. [`Identifier`] can only be constructed inside this
//! crate by the validator, which is what keeps unchecked names out of the
//! compiler: a `QuerySpec` or `MutationSpec` in hand means every name in it
//! already passed structural validation.

use quarry_core::Operation;
use serde::Serialize;

/// A table or column name that has passed structural validation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Identifier(String);

impl Identifier {
    /// Crate-private: only the validator constructs identifiers.
    pub(crate) fn new(name: String) -> Self {
        Self(name)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Double-quoted form for interpolation into SQL text.
    pub fn quoted(&self) -> String {
        format!("\"{}\"", self.0)
    }
}

impl std::fmt::Display for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A typed scalar bound as a positional SQL parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ScalarValue {
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Null,
}

impl ScalarValue {
    /// Infer a typed value from a raw query-string scalar.
    ///
    /// Query strings carry no type information; Postgres rejects `text`
    /// parameters compared against numeric columns, so numeric-looking
    /// values are bound as numbers. Tried in order: int, float, bool, text.
    /// A value is only bound numerically when its canonical rendering
    /// matches the input, so lexemes like `0123` or `1e3` stay text instead
    /// of silently becoming a different string.
    pub fn infer(raw: &str) -> Self {
        if let Ok(i) = raw.parse::<i64>() {
            if i.to_string() == raw {
                return Self::Int(i);
            }
        }
        if let Ok(f) = raw.parse::<f64>() {
            if f.to_string() == raw {
                return Self::Float(f);
            }
        }
        match raw {
            "true" => Self::Bool(true),
            "false" => Self::Bool(false),
            _ => Self::Text(raw.to_string()),
        }
    }

    /// Convert a JSON body scalar. Nested arrays/objects are bound as their
    /// JSON text, matching how the gateway stores document columns.
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Int(i)
                } else {
                    Self::Float(n.as_f64().unwrap_or_default())
                }
            }
            serde_json::Value::String(s) => Self::Text(s.clone()),
            other => Self::Text(other.to_string()),
        }
    }

    /// The raw text form, used by the validator's signature scan.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// Supported filter operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    In,
    NotIn,
    IsNull,
    IsNotNull,
}

impl FilterOperator {
    /// All operator tokens, longest suffix first. Filter-key parsing tries
    /// these in order so `not_in` wins over `in` and `is_not_null` over
    /// `is_null`.
    pub const TOKENS: [(&'static str, Self); 11] = [
        ("is_not_null", Self::IsNotNull),
        ("is_null", Self::IsNull),
        ("not_in", Self::NotIn),
        ("like", Self::Like),
        ("gte", Self::Gte),
        ("lte", Self::Lte),
        ("eq", Self::Eq),
        ("ne", Self::Ne),
        ("gt", Self::Gt),
        ("lt", Self::Lt),
        ("in", Self::In),
    ];

    /// The request-syntax token for this operator.
    pub fn token(&self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::Like => "like",
            Self::In => "in",
            Self::NotIn => "not_in",
            Self::IsNull => "is_null",
            Self::IsNotNull => "is_not_null",
        }
    }

    /// Whether this operator takes a comma-separated list value.
    pub fn is_list(&self) -> bool {
        matches!(self, Self::In | Self::NotIn)
    }

    /// Whether this operator takes any value at all.
    pub fn takes_value(&self) -> bool {
        !matches!(self, Self::IsNull | Self::IsNotNull)
    }
}

/// A filter's value: absent for null checks, a list for in/not_in.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FilterValue {
    None,
    Scalar(ScalarValue),
    List(Vec<ScalarValue>),
}

/// One column/operator/value predicate.
#[derive(Debug, Clone, Serialize)]
pub struct Filter {
    pub column: Identifier,
    pub operator: FilterOperator,
    pub value: FilterValue,
}

/// Join clause type; defaults to LEFT when the request omits it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JoinType {
    Inner,
    #[default]
    Left,
    Right,
}

impl JoinType {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Inner => "INNER",
            Self::Left => "LEFT",
            Self::Right => "RIGHT",
        }
    }
}

/// A request-specified relation to a second allow-listed table.
#[derive(Debug, Clone, Serialize)]
pub struct Join {
    pub local_column: Identifier,
    pub join_table: Identifier,
    pub join_column: Identifier,
    pub select_columns: Vec<Identifier>,
    pub join_type: JoinType,
}

/// Column selection: everything, or an explicit ordered list.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ColumnSelection {
    All,
    List(Vec<Identifier>),
}

/// Sort direction for ORDER BY.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// A validated, immutable read request, consumed by the compiler.
#[derive(Debug, Clone, Serialize)]
pub struct QuerySpec {
    pub table: Identifier,
    pub columns: ColumnSelection,
    pub filters: Vec<Filter>,
    pub joins: Vec<Join>,
    pub limit: u32,
    pub offset: u64,
    pub order_by: Option<Identifier>,
    pub order_direction: SortDirection,
}

/// A validated description of a CREATE/UPDATE/DELETE request.
#[derive(Debug, Clone, Serialize)]
pub struct MutationSpec {
    pub table: Identifier,
    pub operation: Operation,
    /// Column/value pairs in deterministic order (CREATE/UPDATE only).
    pub data: Vec<(Identifier, ScalarValue)>,
    /// Non-empty for UPDATE/DELETE; enforced before compilation.
    pub filters: Vec<Filter>,
    /// Empty means `RETURNING *`.
    pub return_columns: Vec<Identifier>,
}
