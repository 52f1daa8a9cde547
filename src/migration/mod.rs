// ABOUTME: Table copy engine: outcome types, the copier seam, and the worker pool
// ABOUTME: PgTableCopier runs one table copy per pooled connection pair

pub mod copy;
pub mod orchestrator;
pub mod query;
pub mod value;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::TableSpec;
use crate::error::CopyError;
use crate::logging::LogSink;
use crate::postgres::ConnectionProvider;

pub use copy::copy_table;
pub use orchestrator::{effective_worker_count, MigrationRunner, DEFAULT_WORKERS};
pub use query::{build_insert_query, build_select_query};
pub use value::{decode_row, RawValue, SqlValue};

/// Result of one table's copy job.
#[derive(Debug, Clone)]
pub struct MigrationOutcome {
    pub table: String,
    pub worker_id: usize,
    /// Present iff the copy failed.
    pub error: Option<String>,
    pub duration: Duration,
    /// Rows inserted; on failure, the rows inserted before the error (all rolled back).
    pub rows_count: u64,
}

impl MigrationOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Aggregate of one run.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// In completion order.
    pub outcomes: Vec<MigrationOutcome>,
    pub succeeded: usize,
    pub failed: usize,
    /// Rows committed by successful tables.
    pub total_rows: u64,
    pub duration: Duration,
}

impl RunSummary {
    pub fn record(&mut self, outcome: MigrationOutcome) {
        if outcome.is_success() {
            self.succeeded += 1;
            self.total_rows += outcome.rows_count;
        } else {
            self.failed += 1;
        }
        self.outcomes.push(outcome);
    }

    pub fn failed_tables(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| !o.is_success())
            .map(|o| o.table.as_str())
            .collect()
    }
}

/// Copies one table. Implementations must be callable from many workers at once.
#[async_trait]
pub trait TableCopier: Send + Sync + 'static {
    async fn copy_table(&self, spec: &TableSpec, worker_id: usize) -> Result<u64, CopyError>;
}

/// Copier that checks out a fresh pair from the provider for every table.
pub struct PgTableCopier {
    provider: Arc<ConnectionProvider>,
    sink: Arc<dyn LogSink>,
}

impl PgTableCopier {
    pub fn new(provider: Arc<ConnectionProvider>, sink: Arc<dyn LogSink>) -> Self {
        Self { provider, sink }
    }
}

#[async_trait]
impl TableCopier for PgTableCopier {
    async fn copy_table(&self, spec: &TableSpec, worker_id: usize) -> Result<u64, CopyError> {
        let mut pair = self
            .provider
            .pair()
            .await
            .map_err(|e| CopyError::new(0, e))?;
        copy_table(spec, &mut pair, worker_id, self.sink.as_ref()).await
    }
}
