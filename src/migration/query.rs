// ABOUTME: SELECT and INSERT text synthesis for one table copy
// ABOUTME: Pure functions; table names and predicates are interpolated verbatim

use crate::config::TableSpec;
use crate::utils::quote_ident;

/// Build the source query for `spec`.
///
/// Clauses are always appended in WHERE, ORDER BY, LIMIT order. The WHERE
/// predicate is operator-supplied SQL and is not escaped.
pub fn build_select_query(spec: &TableSpec) -> String {
    let mut query = format!("SELECT * FROM {}", spec.table);

    if let Some(predicate) = spec.where_clause() {
        query.push_str(" WHERE ");
        query.push_str(predicate);
    }

    if let Some(order_by) = spec.order_by() {
        query.push_str(" ORDER BY ");
        query.push_str(order_by);
    }

    if let Some(limit) = spec.effective_limit() {
        query.push_str(&format!(" LIMIT {}", limit));
    }

    query
}

/// Build the target insert for the columns discovered on the source.
///
/// Placeholder `$n` binds the n-th discovered column, so values must be passed
/// in source column order. Column names come from the catalog and are quoted.
pub fn build_insert_query(table: &str, columns: &[String]) -> String {
    let quoted: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("${}", i)).collect();

    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table,
        quoted.join(", "),
        placeholders.join(", ")
    )
}
