// ABOUTME: Sequential role phase: create planned roles on the target and apply grants
// ABOUTME: Per-role and per-grant failures are logged and never stop the loop

use anyhow::{Context, Result};
use tokio_postgres::error::SqlState;

use super::ddl::{build_grant_statement, build_role_ddl, RoleAttributes};
use super::{plan_roles, RoleSpec, RoleSyncMode};
use crate::config::RoleSyncConfig;
use crate::logging::LogSink;
use crate::postgres::{
    check_role_management_privileges, fetch_role_attributes, list_source_roles, table_exists,
    ConnectionPair,
};

/// Counters for one role phase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleSyncReport {
    pub planned: usize,
    pub created: usize,
    pub already_existed: usize,
    pub failed: usize,
    pub grants_applied: usize,
    pub grants_failed: usize,
    pub grants_skipped: usize,
}

fn is_already_exists(err: &tokio_postgres::Error) -> bool {
    if err.code() == Some(&SqlState::DUPLICATE_OBJECT) {
        return true;
    }
    err.as_db_error()
        .map(|db| db.message().contains("already exists"))
        .unwrap_or(false)
}

/// Create the roles selected by `config` on the target.
///
/// Returns an error only when the phase cannot start: listing source roles
/// for exclude mode failed. Everything after that is counted in the report.
pub async fn sync_roles(
    pair: &ConnectionPair,
    config: &RoleSyncConfig,
    sink: &dyn LogSink,
) -> Result<RoleSyncReport> {
    let mut report = RoleSyncReport::default();
    if config.roles.is_empty() {
        sink.info("No roles configured; skipping role synchronization");
        return Ok(report);
    }

    match check_role_management_privileges(pair.target()).await {
        Ok(check) if !check.can_manage_roles() => sink.error(
            "Target user lacks CREATEROLE; role creation is expected to fail",
        ),
        Ok(_) => {}
        Err(e) => sink.error(&format!("Could not check target role privileges: {:#}", e)),
    }

    let source_roles = match config.mode {
        RoleSyncMode::Include => Vec::new(),
        RoleSyncMode::Exclude => list_source_roles(pair.source())
            .await
            .context("Cannot start role synchronization")?,
    };
    let planned = plan_roles(config.mode, &config.roles, &source_roles);
    report.planned = planned.len();
    sink.info(&format!(
        "Synchronizing {} roles (mode: {})",
        planned.len(),
        config.mode
    ));

    // VALID UNTIL is written in UTC without an offset, so the target session
    // must read it as UTC whatever its TimeZone setting is.
    if let Err(e) = pair.target().batch_execute("SET TIME ZONE 'UTC'").await {
        sink.error(&format!("Could not set target session time zone to UTC: {}", e));
    }
    for role in &planned {
        sync_role(pair, config.mode, role, sink, &mut report).await;
    }
    if let Err(e) = pair.target().batch_execute("RESET TIME ZONE").await {
        sink.error(&format!("Could not reset target session time zone: {}", e));
    }

    sink.info(&format!(
        "Role synchronization finished: {} created, {} already existed, {} failed, {} grants applied, {} grants failed",
        report.created,
        report.already_existed,
        report.failed,
        report.grants_applied,
        report.grants_failed
    ));
    Ok(report)
}

async fn sync_role(
    pair: &ConnectionPair,
    mode: RoleSyncMode,
    role: &RoleSpec,
    sink: &dyn LogSink,
    report: &mut RoleSyncReport,
) {
    let attrs = match fetch_role_attributes(pair.source(), &role.name).await {
        Ok(Some(attrs)) => attrs,
        Ok(None) if mode == RoleSyncMode::Include => {
            sink.info(&format!(
                "Role {} not found in source; using default attributes",
                role.name
            ));
            RoleAttributes::default()
        }
        Ok(None) => {
            sink.error(&format!("Role {} disappeared from source", role.name));
            report.failed += 1;
            return;
        }
        Err(e) => {
            sink.error(&format!("{:#}", e));
            report.failed += 1;
            return;
        }
    };

    let ddl = build_role_ddl(&role.name, &attrs);
    match pair.target().batch_execute(&ddl).await {
        Ok(()) => {
            sink.info(&format!("Created role {}", role.name));
            report.created += 1;
        }
        Err(e) if is_already_exists(&e) => {
            sink.info(&format!("Role {} already exists in target", role.name));
            report.already_existed += 1;
        }
        Err(e) => {
            sink.error(&format!("Failed to create role {}: {}", role.name, e));
            report.failed += 1;
            return;
        }
    }

    apply_privileges(pair, role, sink, report).await;
}

async fn apply_privileges(
    pair: &ConnectionPair,
    role: &RoleSpec,
    sink: &dyn LogSink,
    report: &mut RoleSyncReport,
) {
    for privilege in &role.table_privileges {
        let Some(grant) = build_grant_statement(&role.name, privilege) else {
            sink.info(&format!(
                "No permissions listed for {} on {}; skipping",
                role.name, privilege.table
            ));
            report.grants_skipped += 1;
            continue;
        };

        match table_exists(pair.target(), &privilege.table).await {
            Ok(true) => {}
            Ok(false) => {
                sink.info(&format!(
                    "Table {} not found in target; skipping grant to {}",
                    privilege.table, role.name
                ));
                report.grants_skipped += 1;
                continue;
            }
            Err(e) => {
                sink.error(&format!("{:#}", e));
                report.grants_failed += 1;
                continue;
            }
        }

        match pair.target().batch_execute(&grant).await {
            Ok(()) => {
                sink.info(&grant);
                report.grants_applied += 1;
            }
            Err(e) => {
                sink.error(&format!("Grant failed ({}): {}", grant, e));
                report.grants_failed += 1;
            }
        }
    }
}
