// ABOUTME: Fixed-size worker pool that runs one copy job per configured table
// ABOUTME: Every enqueued job produces exactly one outcome, panics included

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use futures::FutureExt;
use tokio::sync::mpsc;

use super::{MigrationOutcome, RunSummary, TableCopier};
use crate::config::TableSpec;
use crate::logging::LogSink;

/// Worker count used when the configured value is zero or negative.
pub const DEFAULT_WORKERS: usize = 2;

pub fn effective_worker_count(threads: i32) -> usize {
    if threads > 0 {
        threads as usize
    } else {
        DEFAULT_WORKERS
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Runs copy jobs on a fixed number of workers.
pub struct MigrationRunner<C: TableCopier> {
    copier: Arc<C>,
    workers: usize,
    sink: Arc<dyn LogSink>,
}

impl<C: TableCopier> MigrationRunner<C> {
    pub fn new(copier: Arc<C>, threads: i32, sink: Arc<dyn LogSink>) -> Self {
        Self {
            copier,
            workers: effective_worker_count(threads),
            sink,
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Copy every table and return once all workers have finished.
    ///
    /// A failing table never stops the others.
    pub async fn run(&self, tables: Vec<TableSpec>) -> RunSummary {
        let started = Instant::now();
        let job_count = tables.len();
        self.sink.info(&format!(
            "Starting migration of {} tables with {} workers",
            job_count, self.workers
        ));

        let capacity = job_count.max(1);
        let (job_tx, job_rx) = async_channel::bounded::<TableSpec>(capacity);
        let (result_tx, mut result_rx) = mpsc::channel::<MigrationOutcome>(capacity);

        let mut handles = Vec::with_capacity(self.workers);
        for worker_id in 1..=self.workers {
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            let copier = Arc::clone(&self.copier);

            handles.push(tokio::spawn(async move {
                while let Ok(spec) = job_rx.recv().await {
                    let job_started = Instant::now();
                    let attempt = AssertUnwindSafe(copier.copy_table(&spec, worker_id))
                        .catch_unwind()
                        .await;

                    let (error, rows_count) = match attempt {
                        Ok(Ok(rows)) => (None, rows),
                        Ok(Err(e)) => (Some(e.to_string()), e.rows_copied),
                        Err(payload) => (
                            Some(format!("worker panicked: {}", panic_message(payload.as_ref()))),
                            0,
                        ),
                    };

                    let outcome = MigrationOutcome {
                        table: spec.table,
                        worker_id,
                        error,
                        duration: job_started.elapsed(),
                        rows_count,
                    };
                    if result_tx.send(outcome).await.is_err() {
                        break;
                    }
                }
            }));
        }
        drop(job_rx);
        drop(result_tx);

        // The channel holds every job, so enqueueing never waits on workers.
        for spec in tables {
            if job_tx.send(spec).await.is_err() {
                break;
            }
        }
        job_tx.close();

        let coordinator = tokio::spawn(async move {
            for joined in join_all(handles).await {
                if let Err(e) = joined {
                    tracing::error!("Worker task failed: {}", e);
                }
            }
        });

        let mut summary = RunSummary::default();
        while let Some(outcome) = result_rx.recv().await {
            self.log_outcome(&outcome);
            summary.record(outcome);
        }
        if let Err(e) = coordinator.await {
            tracing::error!("Worker coordinator failed: {}", e);
        }

        summary.duration = started.elapsed();
        self.sink.info(&format!(
            "Migration finished in {:.2?}: {} succeeded, {} failed, {} rows copied",
            summary.duration, summary.succeeded, summary.failed, summary.total_rows
        ));
        if summary.failed > 0 {
            self.sink.error(&format!(
                "Failed tables: {}",
                summary.failed_tables().join(", ")
            ));
        }
        summary
    }

    fn log_outcome(&self, outcome: &MigrationOutcome) {
        match &outcome.error {
            None => self.sink.info(&format!(
                "[worker {}] {} copied {} rows in {:.2?}",
                outcome.worker_id, outcome.table, outcome.rows_count, outcome.duration
            )),
            Some(error) => self.sink.error(&format!(
                "[worker {}] {} failed after {} rows in {:.2?}: {}",
                outcome.worker_id, outcome.table, outcome.rows_count, outcome.duration, error
            )),
        }
    }
}
