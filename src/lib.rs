// ABOUTME: Library root for pg-table-migrator
// ABOUTME: Exposes configuration, connection, copy engine, and role sync modules

pub mod commands;
pub mod config;
pub mod error;
pub mod logging;
pub mod migration;
pub mod postgres;
pub mod roles;
pub mod utils;

pub use config::{MigrationConfig, RoleSyncConfig, TableSpec};
pub use error::{ConnectionError, CopyError, DbSide, MissingTable, MissingTablesError};
pub use logging::{LogSink, MemorySink, TracingSink};
pub use migration::{MigrationOutcome, MigrationRunner, PgTableCopier, RunSummary, TableCopier};
pub use roles::{RoleSpec, RoleSyncMode, TablePrivilege};
