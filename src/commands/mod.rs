// ABOUTME: Command implementations for the CLI subcommands
// ABOUTME: Exports migrate (copy tables then sync roles) and validate (pre-flight only)

pub mod migrate;
pub mod validate;

pub use migrate::{migrate, MigrationReport};
pub use validate::validate;
