// ABOUTME: Typed errors for the pre-flight and per-table failure paths
// ABOUTME: Callers inspect these; everything else propagates as anyhow::Error

use std::fmt;

use thiserror::Error;

/// Which side of the migration an operation touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DbSide {
    Source,
    Target,
}

impl fmt::Display for DbSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DbSide::Source => write!(f, "source"),
            DbSide::Target => write!(f, "target"),
        }
    }
}

/// Failure to open or liveness-check one side of a connection pair.
#[derive(Debug, Error)]
#[error("Failed to connect to {side} database: {cause:#}")]
pub struct ConnectionError {
    pub side: DbSide,
    pub cause: anyhow::Error,
}

impl ConnectionError {
    pub fn new(side: DbSide, cause: impl Into<anyhow::Error>) -> Self {
        Self {
            side,
            cause: cause.into(),
        }
    }
}

/// A configured table that is absent from one database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingTable {
    pub table: String,
    pub side: DbSide,
}

impl fmt::Display for MissingTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (missing in {})", self.table, self.side)
    }
}

/// Every missing `table (side)` pair found by the existence check.
#[derive(Debug, Error)]
pub struct MissingTablesError {
    pub missing: Vec<MissingTable>,
}

impl fmt::Display for MissingTablesError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let listed: Vec<String> = self.missing.iter().map(|m| m.to_string()).collect();
        write!(f, "Missing tables: {}", listed.join(", "))
    }
}

/// A failed table copy.
///
/// `rows_copied` counts the rows inserted before the failure. The target
/// transaction was rolled back (or never committed), so none of them persist.
#[derive(Debug, Error)]
#[error("{cause:#}")]
pub struct CopyError {
    pub rows_copied: u64,
    pub cause: anyhow::Error,
}

impl CopyError {
    pub fn new(rows_copied: u64, cause: impl Into<anyhow::Error>) -> Self {
        Self {
            rows_copied,
            cause: cause.into(),
        }
    }
}
