// ABOUTME: Validate command: run every pre-flight check without copying data
// ABOUTME: Checks config, connectivity, table existence, and target role privileges

use anyhow::{Context, Result};

use crate::config::MigrationConfig;
use crate::logging::LogSink;
use crate::postgres::{check_role_management_privileges, validate_tables_exist, ConnectionProvider};

pub async fn validate(config: MigrationConfig, sink: &dyn LogSink) -> Result<()> {
    config.validate().context("Invalid migration configuration")?;
    config.describe(sink);

    let provider = ConnectionProvider::connect(&config.source_url, &config.target_url, 1).await?;
    let pair = provider.pair().await?;

    validate_tables_exist(&pair, &config.tables, sink).await?;

    if config.roles.is_some() {
        let check = check_role_management_privileges(pair.target()).await?;
        if !check.can_manage_roles() {
            sink.error("Target user lacks CREATEROLE; role synchronization will fail");
        }
    }

    drop(pair);
    provider.close();
    sink.info("Validation passed");
    Ok(())
}
