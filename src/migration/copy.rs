// ABOUTME: Copies one table from source to target inside a single transaction
// ABOUTME: Streams source rows and replays them through one prepared INSERT

use anyhow::anyhow;
use futures::{pin_mut, TryStreamExt};
use tokio_postgres::types::ToSql;
use tokio_postgres::Transaction;

use super::query::{build_insert_query, build_select_query};
use super::value::decode_row;
use crate::config::TableSpec;
use crate::error::CopyError;
use crate::logging::LogSink;
use crate::postgres::ConnectionPair;

fn failure(rows_copied: u64, cause: impl Into<anyhow::Error>, step: String) -> CopyError {
    CopyError::new(rows_copied, cause.into().context(step))
}

async fn abort(
    tx: Transaction<'_>,
    error: CopyError,
    table: &str,
    sink: &dyn LogSink,
) -> CopyError {
    if let Err(e) = tx.rollback().await {
        sink.error(&format!("Rollback failed for {}: {}", table, e));
    }
    error
}

/// Copy the rows selected by `spec` into the same-named target table.
///
/// Columns are discovered from the source result set, not configured. The
/// target sees either every streamed row (after commit) or none of them. On
/// failure the returned error carries the number of rows inserted before it.
pub async fn copy_table(
    spec: &TableSpec,
    pair: &mut ConnectionPair,
    worker_id: usize,
    sink: &dyn LogSink,
) -> Result<u64, CopyError> {
    let table = spec.table.as_str();
    let select = build_select_query(spec);
    sink.info(&format!("[worker {}] {}: {}", worker_id, table, select));

    let (source, target) = pair.split_mut();

    let statement = source
        .prepare(&select)
        .await
        .map_err(|e| failure(0, e, format!("Failed to prepare source query for {}", table)))?;
    let columns: Vec<String> = statement
        .columns()
        .iter()
        .map(|c| c.name().to_string())
        .collect();
    if columns.is_empty() {
        return Err(CopyError::new(
            0,
            anyhow!("Source query for {} returned no columns", table),
        ));
    }

    let rows = source
        .query_raw(&statement, std::iter::empty::<&(dyn ToSql + Sync)>())
        .await
        .map_err(|e| failure(0, e, format!("Failed to query source table {}", table)))?;

    let insert_sql = build_insert_query(table, &columns);

    let tx = target
        .transaction()
        .await
        .map_err(|e| failure(0, e, format!("Failed to begin target transaction for {}", table)))?;

    let insert = match tx.prepare(&insert_sql).await {
        Ok(insert) => insert,
        Err(e) => {
            let error = failure(0, e, format!("Failed to prepare insert for {}", table));
            return Err(abort(tx, error, table, sink).await);
        }
    };

    pin_mut!(rows);
    let mut rows_copied: u64 = 0;

    loop {
        let row = match rows.try_next().await {
            Ok(Some(row)) => row,
            Ok(None) => break,
            Err(e) => {
                let error = failure(
                    rows_copied,
                    e,
                    format!("Failed to read row {} from {}", rows_copied + 1, table),
                );
                return Err(abort(tx, error, table, sink).await);
            }
        };

        let values = match decode_row(&row) {
            Ok(values) => values,
            Err(e) => {
                let error = failure(
                    rows_copied,
                    e,
                    format!("Failed to decode row {} from {}", rows_copied + 1, table),
                );
                return Err(abort(tx, error, table, sink).await);
            }
        };

        let params: Vec<&(dyn ToSql + Sync)> =
            values.iter().map(|v| v as &(dyn ToSql + Sync)).collect();

        if let Err(e) = tx.execute(&insert, &params).await {
            let error = failure(
                rows_copied,
                e,
                format!("Failed to insert row {} into {}", rows_copied + 1, table),
            );
            return Err(abort(tx, error, table, sink).await);
        }
        rows_copied += 1;
    }

    tx.commit().await.map_err(|e| {
        failure(
            rows_copied,
            e,
            format!("Failed to commit {} rows into {}", rows_copied, table),
        )
    })?;

    sink.info(&format!(
        "[worker {}] {}: committed {} rows",
        worker_id, table, rows_copied
    ));
    Ok(rows_copied)
}
