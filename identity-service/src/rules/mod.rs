//! Composable query rules.
//!
//! A rule contributes an optional WHERE fragment, at most one ORDER BY, at
//! most one LIMIT, and a named-parameter map. [`run_query`] composes rules
//! onto a root query and executes the result as a single parameterized
//! statement; every literal travels as a bind parameter, never interpolated
//! into the SQL text.

pub mod accessible;
pub mod cursor;

pub use accessible::IsAccessibleByRule;
pub use cursor::{
    decode_cursor, encode_cursor, ForwardCursorRule, Page, PageInfo, ReverseCursorRule,
};

use service_core::error::AppError;
use sqlx::postgres::PgRow;
use sqlx::PgConnection;
use uuid::Uuid;

/// A typed bind value for a named parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Uuid(Uuid),
    Text(String),
    Int(i64),
}

pub trait Rule {
    fn to_sql_where(&self) -> Option<String> {
        None
    }
    fn to_sql_order(&self) -> Option<String> {
        None
    }
    fn to_sql_limit(&self) -> Option<String> {
        None
    }
    fn to_sql_params(&self) -> Vec<(String, Param)> {
        Vec::new()
    }
}

/// An entity row addressable by its id, for cursor construction.
pub trait HasId {
    fn id(&self) -> Uuid;
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct AssembledQuery {
    pub sql: String,
    pub params: Vec<Param>,
}

/// `:name` placeholder occurrences in first-occurrence order. `::` casts are
/// not placeholder starts.
fn find_placeholders(sql: &str) -> Vec<(usize, usize, String)> {
    let bytes = sql.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b':' {
            if i + 1 < bytes.len() && bytes[i + 1] == b':' {
                i += 2;
                continue;
            }
            let start = i + 1;
            let mut end = start;
            while end < bytes.len()
                && (bytes[end].is_ascii_alphanumeric() || bytes[end] == b'_')
            {
                end += 1;
            }
            if end > start {
                out.push((i, end, sql[start..end].to_string()));
            }
            i = end.max(i + 1);
        } else {
            i += 1;
        }
    }
    out
}

/// Compose `rules` onto `root_query` (which must already contain a WHERE
/// clause) and substitute named placeholders with positional parameters.
///
/// Failure modes are construction errors, not runtime ones: more than one
/// ORDER BY or LIMIT contribution, a parameter name bound twice, an
/// undeclared placeholder, or a declared parameter whose placeholder never
/// appears in the assembled SQL.
pub(crate) fn assemble(root_query: &str, rules: &[&dyn Rule]) -> Result<AssembledQuery, AppError> {
    let mut order: Option<String> = None;
    let mut limit: Option<String> = None;
    let mut wheres: Vec<String> = Vec::new();
    let mut declared: Vec<(String, Param)> = Vec::new();

    for rule in rules {
        if let Some(fragment) = rule.to_sql_where() {
            wheres.push(fragment);
        }
        if let Some(fragment) = rule.to_sql_order() {
            if order.replace(fragment).is_some() {
                return Err(AppError::Invariant(
                    "more than one rule contributes ORDER BY".to_string(),
                ));
            }
        }
        if let Some(fragment) = rule.to_sql_limit() {
            if limit.replace(fragment).is_some() {
                return Err(AppError::Invariant(
                    "more than one rule contributes LIMIT".to_string(),
                ));
            }
        }
        for (name, param) in rule.to_sql_params() {
            if declared.iter().any(|(n, _)| *n == name) {
                return Err(AppError::Invariant(format!(
                    "parameter {name} is bound by more than one rule"
                )));
            }
            declared.push((name, param));
        }
    }

    let mut sql = root_query.to_string();
    for fragment in &wheres {
        sql.push_str(" AND (");
        sql.push_str(fragment);
        sql.push(')');
    }
    if let Some(fragment) = &order {
        sql.push(' ');
        sql.push_str(fragment);
    }
    if let Some(fragment) = &limit {
        sql.push(' ');
        sql.push_str(fragment);
    }

    let occurrences = find_placeholders(&sql);
    let mut positions: Vec<String> = Vec::new();
    for (_, _, name) in &occurrences {
        if !declared.iter().any(|(n, _)| n == name) {
            return Err(AppError::Invariant(format!(
                "placeholder :{name} has no declared parameter"
            )));
        }
        if !positions.contains(name) {
            positions.push(name.clone());
        }
    }
    for (name, _) in &declared {
        if !positions.contains(name) {
            return Err(AppError::Invariant(format!(
                "parameter {name} does not appear in the assembled SQL"
            )));
        }
    }

    let mut rewritten = String::with_capacity(sql.len());
    let mut last = 0;
    for (start, end, name) in &occurrences {
        let index = positions.iter().position(|n| n == name).unwrap() + 1;
        rewritten.push_str(&sql[last..*start]);
        rewritten.push_str(&format!("${index}"));
        last = *end;
    }
    rewritten.push_str(&sql[last..]);

    let params = positions
        .iter()
        .map(|name| {
            declared
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, p)| p.clone())
                .unwrap()
        })
        .collect();

    Ok(AssembledQuery {
        sql: rewritten,
        params,
    })
}

/// Execute `root_query` with the composed rules in one statement.
pub async fn run_query<T>(
    conn: &mut PgConnection,
    root_query: &str,
    rules: &[&dyn Rule],
) -> Result<Vec<T>, AppError>
where
    T: for<'r> sqlx::FromRow<'r, PgRow> + Send + Unpin,
{
    let assembled = assemble(root_query, rules)?;
    let mut query = sqlx::query_as::<_, T>(&assembled.sql);
    for param in &assembled.params {
        query = match param {
            Param::Uuid(v) => query.bind(*v),
            Param::Text(v) => query.bind(v.clone()),
            Param::Int(v) => query.bind(*v),
        };
    }
    Ok(query.fetch_all(conn).await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestRule {
        where_sql: Option<String>,
        order: Option<String>,
        limit: Option<String>,
        params: Vec<(String, Param)>,
    }

    impl Rule for TestRule {
        fn to_sql_where(&self) -> Option<String> {
            self.where_sql.clone()
        }
        fn to_sql_order(&self) -> Option<String> {
            self.order.clone()
        }
        fn to_sql_limit(&self) -> Option<String> {
            self.limit.clone()
        }
        fn to_sql_params(&self) -> Vec<(String, Param)> {
            self.params.clone()
        }
    }

    fn filter(where_sql: &str, params: Vec<(String, Param)>) -> TestRule {
        TestRule {
            where_sql: Some(where_sql.to_string()),
            order: None,
            limit: None,
            params,
        }
    }

    #[test]
    fn test_assemble_substitutes_in_first_occurrence_order() {
        let a = filter("x = :x", vec![("x".to_string(), Param::Int(1))]);
        let b = filter(
            "y = :y OR x = :x",
            vec![("y".to_string(), Param::Int(2))],
        );
        let assembled =
            assemble("SELECT * FROM t WHERE deleted IS NULL", &[&a, &b]).unwrap();
        assert_eq!(
            assembled.sql,
            "SELECT * FROM t WHERE deleted IS NULL AND (x = $1) AND (y = $2 OR x = $1)"
        );
        assert_eq!(assembled.params, vec![Param::Int(1), Param::Int(2)]);
    }

    #[test]
    fn test_assemble_rejects_duplicate_parameter() {
        let a = filter("x = :x", vec![("x".to_string(), Param::Int(1))]);
        let b = filter("y = :x", vec![("x".to_string(), Param::Int(2))]);
        let err = assemble("SELECT * FROM t WHERE true", &[&a, &b]).unwrap_err();
        assert!(matches!(err, AppError::Invariant(_)));
    }

    #[test]
    fn test_assemble_rejects_two_order_by() {
        let a = TestRule {
            where_sql: None,
            order: Some("ORDER BY id ASC".to_string()),
            limit: None,
            params: Vec::new(),
        };
        let b = TestRule {
            where_sql: None,
            order: Some("ORDER BY id DESC".to_string()),
            limit: None,
            params: Vec::new(),
        };
        let err = assemble("SELECT * FROM t WHERE true", &[&a, &b]).unwrap_err();
        assert!(matches!(err, AppError::Invariant(_)));
    }

    #[test]
    fn test_assemble_rejects_unused_parameter() {
        let a = filter("x = 1", vec![("ghost".to_string(), Param::Int(1))]);
        let err = assemble("SELECT * FROM t WHERE true", &[&a]).unwrap_err();
        assert!(matches!(err, AppError::Invariant(_)));
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn test_assemble_rejects_undeclared_placeholder() {
        let a = filter("x = :missing", Vec::new());
        let err = assemble("SELECT * FROM t WHERE true", &[&a]).unwrap_err();
        assert!(matches!(err, AppError::Invariant(_)));
    }

    #[test]
    fn test_placeholder_scan_skips_casts() {
        let found = find_placeholders("SELECT a::text FROM t WHERE b = :b");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].2, "b");
    }
}
