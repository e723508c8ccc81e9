//! Structural and content validation.
//!
//! Everything arriving from a request passes through here before it can
//! become part of a [`crate::QuerySpec`] or [`crate::MutationSpec`]. This is
//! the only module that constructs [`Identifier`] values.

use crate::error::EngineError;
use crate::types::{FilterOperator, FilterValue, Identifier, ScalarValue};
use regex::{Regex, RegexSetBuilder};
use std::sync::LazyLock;

/// Maximum identifier length.
pub const MAX_IDENTIFIER_LEN: usize = 100;
/// Maximum scalar value length.
pub const MAX_VALUE_LEN: usize = 1000;
/// Cap on `in`/`not_in` list elements.
pub const MAX_LIST_LEN: usize = 100;
/// Cap on filters per request.
pub const MAX_FILTERS: usize = 10;
/// Cap on joins per request.
pub const MAX_JOINS: usize = 5;
/// Pagination limit bounds.
pub const MIN_LIMIT: u32 = 1;
pub const MAX_LIMIT: u32 = 1000;
/// Default page size when the request omits `limit`.
pub const DEFAULT_LIMIT: u32 = 100;

/// Table names that are rejected outright even when structurally valid.
const RESERVED_TABLE_WORDS: [&str; 6] = ["user", "password", "admin", "root", "config", "system"];

/// Substrings that make any table/column name untouchable, for both read
/// column selection and mutation payload keys.
const BLACKLIST_SUBSTRINGS: [&str; 4] = ["password", "secret", "token", "private_key"];

static IDENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier regex must compile")
});

/// Fixed injection/XSS signature set. A match anywhere in a value rejects
/// the whole request regardless of surrounding legitimate content.
static INJECTION_SIGNATURES: LazyLock<regex::RegexSet> = LazyLock::new(|| {
    RegexSetBuilder::new([
        r";\s*(drop|delete|truncate|alter|create|insert|update|grant|revoke)\b",
        r"union\s+select",
        r"--",
        r"/\*",
        r"<\s*script",
        r"javascript\s*:",
        r"data\s*:\s*text/html",
        r"\beval\s*\(",
        r"\bexec(ute)?\s*\(",
    ])
    .case_insensitive(true)
    .build()
    .expect("injection signature set must compile")
});

fn check_structure(name: &str) -> Result<(), EngineError> {
    if name.is_empty() || name.len() > MAX_IDENTIFIER_LEN {
        return Err(EngineError::InvalidIdentifier(format!(
            "'{}' must be 1-{} characters",
            name, MAX_IDENTIFIER_LEN
        )));
    }
    if !IDENT_RE.is_match(name) {
        return Err(EngineError::InvalidIdentifier(format!(
            "'{}' contains characters outside [A-Za-z0-9_]",
            name
        )));
    }
    Ok(())
}

fn blacklist_hit(name: &str) -> Option<&'static str> {
    let lowered = name.to_ascii_lowercase();
    BLACKLIST_SUBSTRINGS
        .iter()
        .find(|s| lowered.contains(*s))
        .copied()
}

/// Validate a column name into an [`Identifier`].
pub fn validate_column(name: &str) -> Result<Identifier, EngineError> {
    check_structure(name)?;
    if let Some(hit) = blacklist_hit(name) {
        return Err(EngineError::NotAccessible(format!(
            "column '{}' matches blocked term '{}'",
            name, hit
        )));
    }
    Ok(Identifier::new(name.to_string()))
}

/// Validate a table name into an [`Identifier`]. Tables additionally reject
/// a small reserved-word list.
pub fn validate_table(name: &str) -> Result<Identifier, EngineError> {
    check_structure(name)?;
    let lowered = name.to_ascii_lowercase();
    if RESERVED_TABLE_WORDS.contains(&lowered.as_str()) {
        return Err(EngineError::NotAccessible(format!(
            "table name '{}' is reserved",
            name
        )));
    }
    if let Some(hit) = blacklist_hit(name) {
        return Err(EngineError::NotAccessible(format!(
            "table '{}' matches blocked term '{}'",
            name, hit
        )));
    }
    Ok(Identifier::new(name.to_string()))
}

/// Scan one raw scalar for structural violations and injection signatures.
pub fn check_scalar(raw: &str) -> Result<(), EngineError> {
    if raw.len() > MAX_VALUE_LEN {
        return Err(EngineError::MaliciousInput(format!(
            "value exceeds {} bytes",
            MAX_VALUE_LEN
        )));
    }
    if raw.contains('\0') {
        return Err(EngineError::MaliciousInput(
            "value contains an embedded null byte".to_string(),
        ));
    }
    if INJECTION_SIGNATURES.is_match(raw) {
        return Err(EngineError::MaliciousInput(
            "value matches an injection signature".to_string(),
        ));
    }
    Ok(())
}

/// Validate and normalize a raw filter value for the given operator.
///
/// Null-check operators take no value; `in`/`not_in` normalize a
/// comma-separated string into a non-empty list capped at
/// [`MAX_LIST_LEN`] elements; everything else is a single scalar.
pub fn validate_value(
    raw: Option<&str>,
    operator: FilterOperator,
) -> Result<FilterValue, EngineError> {
    if !operator.takes_value() {
        return Ok(FilterValue::None);
    }

    let raw = raw.ok_or_else(|| {
        EngineError::MaliciousInput(format!(
            "operator '{}' requires a value",
            operator.token()
        ))
    })?;

    if operator.is_list() {
        let elements: Vec<&str> = raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        if elements.is_empty() {
            return Err(EngineError::MaliciousInput(format!(
                "operator '{}' requires a non-empty list",
                operator.token()
            )));
        }
        if elements.len() > MAX_LIST_LEN {
            return Err(EngineError::MaliciousInput(format!(
                "list exceeds {} elements",
                MAX_LIST_LEN
            )));
        }
        let mut values = Vec::with_capacity(elements.len());
        for element in elements {
            check_scalar(element)?;
            values.push(ScalarValue::infer(element));
        }
        return Ok(FilterValue::List(values));
    }

    check_scalar(raw)?;
    Ok(FilterValue::Scalar(ScalarValue::infer(raw)))
}

/// Validate a mutation payload value. JSON bodies arrive typed; only text
/// needs the signature scan.
pub fn validate_data_value(value: &ScalarValue) -> Result<(), EngineError> {
    if let Some(text) = value.as_text() {
        check_scalar(text)?;
    }
    Ok(())
}

/// Validate pagination bounds; missing fields fall back to defaults.
pub fn validate_pagination(
    limit: Option<&str>,
    offset: Option<&str>,
) -> Result<(u32, u64), EngineError> {
    let limit = match limit {
        None => DEFAULT_LIMIT,
        Some(raw) => raw.parse::<u32>().map_err(|_| {
            EngineError::InvalidRange(format!("limit '{}' is not a positive integer", raw))
        })?,
    };
    if !(MIN_LIMIT..=MAX_LIMIT).contains(&limit) {
        return Err(EngineError::InvalidRange(format!(
            "limit {} outside [{}, {}]",
            limit, MIN_LIMIT, MAX_LIMIT
        )));
    }

    let offset = match offset {
        None => 0,
        Some(raw) => raw.parse::<u64>().map_err(|_| {
            EngineError::InvalidRange(format!("offset '{}' is not a non-negative integer", raw))
        })?,
    };

    Ok((limit, offset))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_ordinary_identifiers() {
        for name in ["users", "mapSolarSystems", "_internal", "a1_b2", "ID"] {
            assert!(validate_column(name).is_ok(), "{name}");
            assert!(validate_table(name).is_ok(), "{name}");
        }
    }

    #[test]
    fn rejects_malformed_identifiers() {
        for name in ["", "1abc", "a-b", "a b", "naïve", "a;b", "a\"b"] {
            assert!(matches!(
                validate_column(name),
                Err(EngineError::InvalidIdentifier(_))
            ));
        }
        let long = "a".repeat(MAX_IDENTIFIER_LEN + 1);
        assert!(validate_column(&long).is_err());
        let max = "a".repeat(MAX_IDENTIFIER_LEN);
        assert!(validate_column(&max).is_ok());
    }

    #[test]
    fn reserved_words_block_tables_but_not_columns() {
        assert!(matches!(
            validate_table("user"),
            Err(EngineError::NotAccessible(_))
        ));
        assert!(matches!(
            validate_table("Admin"),
            Err(EngineError::NotAccessible(_))
        ));
        // "user" is only reserved as a table name.
        assert!(validate_column("user").is_ok());
    }

    #[test]
    fn blacklist_substrings_block_both_tables_and_columns() {
        for name in ["password", "user_password", "api_token", "secretSauce", "private_key_pem"] {
            assert!(matches!(
                validate_column(name),
                Err(EngineError::NotAccessible(_))
            ));
            assert!(matches!(
                validate_table(name),
                Err(EngineError::NotAccessible(_))
            ));
        }
    }

    #[test]
    fn injection_signatures_are_rejected() {
        let cases = [
            "x'; DROP TABLE users",
            "1 UNION SELECT null",
            "1 union    select passwd",
            "value -- comment",
            "value /* comment */",
            "<script>alert(1)</script>",
            "< script src=x>",
            "javascript:alert(1)",
            "data:text/html;base64,xxx",
            "eval(document.cookie)",
            "exec(cmd)",
            "execute(cmd)",
        ];
        for case in cases {
            assert!(matches!(check_scalar(case), Err(EngineError::MaliciousInput(_))), "{case}");
        }
    }

    #[test]
    fn signature_match_rejects_despite_legitimate_surroundings() {
        let value = format!("perfectly ordinary text {} more ordinary text", "; drop table x");
        assert!(check_scalar(&value).is_err());
    }

    #[test]
    fn clean_values_pass() {
        for case in ["active", "O'Brien", "10", "hello world", "a+b=c"] {
            assert!(check_scalar(case).is_ok(), "{case}");
        }
    }

    #[test]
    fn oversize_and_nul_values_are_rejected() {
        assert!(check_scalar(&"x".repeat(MAX_VALUE_LEN + 1)).is_err());
        assert!(check_scalar(&"x".repeat(MAX_VALUE_LEN)).is_ok());
        assert!(check_scalar("abc\0def").is_err());
    }

    #[test]
    fn list_values_are_normalized_and_capped() {
        let v = validate_value(Some(" a , b ,, c "), FilterOperator::In).unwrap();
        match v {
            FilterValue::List(items) => {
                assert_eq!(items.len(), 3);
                assert_eq!(items[0], ScalarValue::Text("a".to_string()));
            }
            other => panic!("expected list, got {other:?}"),
        }

        let oversized = (0..=MAX_LIST_LEN).map(|i| i.to_string()).collect::<Vec<_>>().join(",");
        assert!(validate_value(Some(&oversized), FilterOperator::NotIn).is_err());

        let at_cap = (0..MAX_LIST_LEN).map(|i| i.to_string()).collect::<Vec<_>>().join(",");
        assert!(validate_value(Some(&at_cap), FilterOperator::NotIn).is_ok());

        assert!(validate_value(Some(" , ,"), FilterOperator::In).is_err());
    }

    #[test]
    fn null_check_operators_take_no_value() {
        assert_eq!(
            validate_value(None, FilterOperator::IsNull).unwrap(),
            FilterValue::None
        );
        assert_eq!(
            validate_value(Some("ignored"), FilterOperator::IsNotNull).unwrap(),
            FilterValue::None
        );
    }

    #[test]
    fn missing_value_for_value_operator_fails() {
        assert!(validate_value(None, FilterOperator::Eq).is_err());
    }

    #[test]
    fn pagination_bounds() {
        assert_eq!(validate_pagination(None, None).unwrap(), (DEFAULT_LIMIT, 0));
        assert_eq!(validate_pagination(Some("20"), Some("40")).unwrap(), (20, 40));
        assert!(matches!(
            validate_pagination(Some("0"), None),
            Err(EngineError::InvalidRange(_))
        ));
        assert!(validate_pagination(Some("1001"), None).is_err());
        assert!(validate_pagination(Some("abc"), None).is_err());
        assert!(validate_pagination(None, Some("-1")).is_err());
        assert_eq!(validate_pagination(Some("1000"), None).unwrap().0, 1000);
    }
}
