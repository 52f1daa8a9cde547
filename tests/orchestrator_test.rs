// ABOUTME: Worker pool tests driven by an in-memory copier
// ABOUTME: Checks one outcome per job, failure isolation, and panic capture

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pg_table_migrator::{
    CopyError, LogSink, MemorySink, MigrationRunner, TableCopier, TableSpec,
};

#[derive(Clone)]
enum Behavior {
    Copy(u64),
    FailAfter(u64),
    Panic,
}

#[derive(Default)]
struct FakeCopier {
    behaviors: HashMap<String, Behavior>,
    calls: Mutex<Vec<(String, usize)>>,
    running: AtomicUsize,
    peak: AtomicUsize,
}

impl FakeCopier {
    fn with(behaviors: &[(&str, Behavior)]) -> Self {
        Self {
            behaviors: behaviors
                .iter()
                .map(|(name, b)| (name.to_string(), b.clone()))
                .collect(),
            ..Self::default()
        }
    }

    fn calls(&self) -> Vec<(String, usize)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TableCopier for FakeCopier {
    async fn copy_table(&self, spec: &TableSpec, worker_id: usize) -> Result<u64, CopyError> {
        self.calls
            .lock()
            .unwrap()
            .push((spec.table.clone(), worker_id));

        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(10)).await;
        self.running.fetch_sub(1, Ordering::SeqCst);

        match self
            .behaviors
            .get(&spec.table)
            .cloned()
            .unwrap_or(Behavior::Copy(1))
        {
            Behavior::Copy(rows) => Ok(rows),
            Behavior::FailAfter(rows) => Err(CopyError::new(
                rows,
                anyhow::anyhow!("insert into {} failed: duplicate key", spec.table),
            )),
            Behavior::Panic => panic!("copier exploded on {}", spec.table),
        }
    }
}

fn tables(names: &[&str]) -> Vec<TableSpec> {
    names.iter().map(|n| TableSpec::new(*n)).collect()
}

fn runner(copier: Arc<FakeCopier>, threads: i32) -> (MigrationRunner<FakeCopier>, Arc<MemorySink>) {
    let sink = Arc::new(MemorySink::new());
    let dyn_sink: Arc<dyn LogSink> = sink.clone();
    (MigrationRunner::new(copier, threads, dyn_sink), sink)
}

#[tokio::test]
async fn test_every_job_yields_one_outcome_for_any_worker_count() {
    let names: Vec<String> = (0..9).map(|i| format!("t{}", i)).collect();
    let refs: Vec<&str> = names.iter().map(String::as_str).collect();

    for threads in [-3, 0, 1, 2, 4, 16] {
        let copier = Arc::new(FakeCopier::default());
        let (runner, _) = runner(Arc::clone(&copier), threads);

        let summary = runner.run(tables(&refs)).await;

        assert_eq!(summary.outcomes.len(), 9, "threads = {}", threads);
        let mut seen: Vec<String> = summary.outcomes.iter().map(|o| o.table.clone()).collect();
        seen.sort();
        assert_eq!(seen, names);
        assert_eq!(copier.calls().len(), 9, "each table attempted once");
    }
}

#[tokio::test]
async fn test_worker_count_bounds_concurrency() {
    let copier = Arc::new(FakeCopier::default());
    let (runner, _) = runner(Arc::clone(&copier), 3);
    assert_eq!(runner.workers(), 3);

    runner.run(tables(&["a", "b", "c", "d", "e", "f", "g"])).await;

    assert!(copier.peak.load(Ordering::SeqCst) <= 3);
    assert!(copier
        .calls()
        .iter()
        .all(|(_, worker)| (1..=3).contains(worker)));
}

#[tokio::test]
async fn test_default_worker_count_is_two() {
    let copier = Arc::new(FakeCopier::default());
    let (runner, _) = runner(Arc::clone(&copier), 0);
    assert_eq!(runner.workers(), 2);

    runner.run(tables(&["a", "b", "c", "d"])).await;
    assert!(copier.peak.load(Ordering::SeqCst) <= 2);
}

#[tokio::test]
async fn test_failing_table_does_not_affect_others() {
    let copier = Arc::new(FakeCopier::with(&[
        ("orders", Behavior::Copy(100)),
        ("customers", Behavior::FailAfter(40)),
        ("items", Behavior::Copy(7)),
    ]));
    let (runner, sink) = runner(copier, 2);

    let summary = runner.run(tables(&["orders", "customers", "items"])).await;

    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.total_rows, 107);

    let failed = summary
        .outcomes
        .iter()
        .find(|o| o.table == "customers")
        .unwrap();
    assert!(!failed.is_success());
    assert_eq!(failed.rows_count, 40);
    assert!(failed.error.as_deref().unwrap().contains("duplicate key"));

    assert!(sink.contains("2 succeeded, 1 failed, 107 rows copied"));
    assert!(sink.errors().iter().any(|line| line.contains("Failed tables: customers")));
}

#[tokio::test]
async fn test_panicking_copier_is_reported_as_failure() {
    let copier = Arc::new(FakeCopier::with(&[("boom", Behavior::Panic)]));
    let (runner, _) = runner(copier, 2);

    let summary = runner.run(tables(&["boom", "fine", "also_fine"])).await;

    assert_eq!(summary.outcomes.len(), 3);
    assert_eq!(summary.failed, 1);
    let boom = summary.outcomes.iter().find(|o| o.table == "boom").unwrap();
    assert!(boom.error.as_deref().unwrap().contains("copier exploded on boom"));
    assert_eq!(boom.rows_count, 0);
}

#[tokio::test]
async fn test_one_log_line_per_outcome() {
    let copier = Arc::new(FakeCopier::with(&[("bad", Behavior::FailAfter(0))]));
    let (runner, sink) = runner(copier, 2);

    runner.run(tables(&["good", "bad"])).await;

    let per_table: Vec<String> = sink
        .lines()
        .into_iter()
        .map(|(_, line)| line)
        .filter(|line| line.starts_with("[worker"))
        .collect();
    assert_eq!(per_table.len(), 2);
    assert!(per_table.iter().any(|l| l.contains("good copied 1 rows")));
    assert!(per_table.iter().any(|l| l.contains("bad failed after 0 rows")));
}

#[tokio::test]
async fn test_empty_job_list() {
    let copier = Arc::new(FakeCopier::default());
    let (runner, _) = runner(Arc::clone(&copier), 4);

    let summary = runner.run(Vec::new()).await;

    assert!(summary.outcomes.is_empty());
    assert_eq!(summary.succeeded + summary.failed, 0);
    assert!(copier.calls().is_empty());
}
