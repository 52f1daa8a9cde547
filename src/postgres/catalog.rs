// ABOUTME: Catalog lookups that confirm configured tables exist on both sides
// ABOUTME: Collects every missing (table, side) pair instead of stopping at the first

use anyhow::{Context, Result};
use tokio_postgres::Client;

use super::pool::ConnectionPair;
use crate::config::TableSpec;
use crate::error::{DbSide, MissingTable, MissingTablesError};
use crate::logging::LogSink;

/// Split `schema.table` into its parts. A bare name has no schema.
pub fn split_table_name(table: &str) -> (Option<&str>, &str) {
    match table.split_once('.') {
        Some((schema, name)) => (Some(schema), name),
        None => (None, table),
    }
}

/// Whether `table` is visible in `information_schema.tables`.
///
/// A bare name matches a table of that name in any schema.
pub async fn table_exists(client: &Client, table: &str) -> Result<bool> {
    let (schema, name) = split_table_name(table);
    let row = client
        .query_one(
            "SELECT EXISTS (
                SELECT 1 FROM information_schema.tables
                WHERE table_name = $1
                  AND ($2::text IS NULL OR table_schema = $2)
            )",
            &[&name, &schema],
        )
        .await
        .with_context(|| format!("Failed to check whether table '{}' exists", table))?;
    Ok(row.get(0))
}

/// Check every table on the source and, independently, on the target.
///
/// Returns the missing pairs in table order, source before target.
pub async fn find_missing_tables(
    pair: &ConnectionPair,
    tables: &[TableSpec],
) -> Result<Vec<MissingTable>> {
    let mut missing = Vec::new();

    for spec in tables {
        for (side, client) in [(DbSide::Source, pair.source()), (DbSide::Target, pair.target())] {
            let exists = table_exists(client, &spec.table)
                .await
                .with_context(|| format!("Existence check failed on {} database", side))?;
            if !exists {
                missing.push(MissingTable {
                    table: spec.table.clone(),
                    side,
                });
            }
        }
    }

    Ok(missing)
}

/// Fail with [`MissingTablesError`] unless every table exists on both sides.
pub async fn validate_tables_exist(
    pair: &ConnectionPair,
    tables: &[TableSpec],
    sink: &dyn LogSink,
) -> Result<()> {
    let missing = find_missing_tables(pair, tables).await?;
    if missing.is_empty() {
        sink.info(&format!(
            "All {} configured tables exist in source and target",
            tables.len()
        ));
        return Ok(());
    }
    let error = MissingTablesError { missing };
    sink.error(&error.to_string());
    Err(error.into())
}
