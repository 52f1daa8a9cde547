// ABOUTME: Migrate command: pre-flight checks, parallel table copy, then role sync
// ABOUTME: Per-table failures are reported in the summary; pre-flight failures abort

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config::MigrationConfig;
use crate::logging::LogSink;
use crate::migration::{MigrationRunner, PgTableCopier, RunSummary};
use crate::postgres::{validate_tables_exist, ConnectionProvider};
use crate::roles::{sync_roles, RoleSyncReport};

/// What one migrate run did.
#[derive(Debug, Clone)]
pub struct MigrationReport {
    pub tables: RunSummary,
    /// `None` when no roles were configured.
    pub roles: Option<RoleSyncReport>,
}

/// Run the full migration.
///
/// Returns an error only for pre-flight failures (invalid config, unreachable
/// database, missing table) or a role phase that cannot start. Failed tables
/// are reported in [`MigrationReport::tables`].
pub async fn migrate(config: MigrationConfig, sink: Arc<dyn LogSink>) -> Result<MigrationReport> {
    config.validate().context("Invalid migration configuration")?;
    config.describe(sink.as_ref());

    let workers = config.worker_count();
    let provider = Arc::new(
        ConnectionProvider::connect(&config.source_url, &config.target_url, workers).await?,
    );

    {
        let pair = provider.pair().await?;
        validate_tables_exist(&pair, &config.tables, sink.as_ref()).await?;
    }

    let copier = Arc::new(PgTableCopier::new(Arc::clone(&provider), Arc::clone(&sink)));
    let runner = MigrationRunner::new(copier, config.threads, Arc::clone(&sink));
    let tables = runner.run(config.tables.clone()).await;

    let roles = match &config.roles {
        Some(role_config) => {
            let pair = provider.pair().await?;
            Some(sync_roles(&pair, role_config, sink.as_ref()).await?)
        }
        None => None,
    };

    provider.close();
    Ok(MigrationReport { tables, roles })
}
