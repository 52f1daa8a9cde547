// ABOUTME: CREATE ROLE and GRANT statement synthesis
// ABOUTME: Deterministic text built from pg_roles attributes or the default set

use chrono::{DateTime, Utc};

use super::TablePrivilege;
use crate::utils::quote_ident;

/// `rolconnlimit` value meaning "no limit".
pub const UNLIMITED_CONNECTIONS: i32 = -1;

/// Attributes read from `pg_roles`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleAttributes {
    pub superuser: bool,
    pub inherit: bool,
    pub create_role: bool,
    pub create_db: bool,
    pub login: bool,
    pub replication: bool,
    pub connection_limit: i32,
    pub valid_until: Option<DateTime<Utc>>,
}

/// Attributes used for roles that do not exist in the source.
impl Default for RoleAttributes {
    fn default() -> Self {
        Self {
            superuser: false,
            inherit: true,
            create_role: false,
            create_db: false,
            login: false,
            replication: false,
            connection_limit: UNLIMITED_CONNECTIONS,
            valid_until: None,
        }
    }
}

fn flag(enabled: bool, keyword: &'static str) -> String {
    if enabled {
        keyword.to_string()
    } else {
        format!("NO{}", keyword)
    }
}

/// Build the `CREATE ROLE` statement for `name`.
///
/// Every boolean attribute emits exactly one keyword. `CONNECTION LIMIT` is
/// appended only for a real limit and `VALID UNTIL` only when an expiry is set.
pub fn build_role_ddl(name: &str, attrs: &RoleAttributes) -> String {
    let mut parts = vec![
        format!("CREATE ROLE {}", quote_ident(name)),
        flag(attrs.superuser, "SUPERUSER"),
        flag(attrs.inherit, "INHERIT"),
        flag(attrs.create_role, "CREATEROLE"),
        flag(attrs.create_db, "CREATEDB"),
        flag(attrs.login, "LOGIN"),
        flag(attrs.replication, "REPLICATION"),
    ];

    if attrs.connection_limit != UNLIMITED_CONNECTIONS {
        parts.push(format!("CONNECTION LIMIT {}", attrs.connection_limit));
    }

    if let Some(valid_until) = attrs.valid_until {
        parts.push(format!(
            "VALID UNTIL '{}'",
            valid_until.format("%Y-%m-%d %H:%M:%S")
        ));
    }

    parts.join(" ")
}

/// Build `GRANT <verbs> ON TABLE <table> TO <role>`, or `None` when the entry
/// lists no permissions.
///
/// The table name is used verbatim so schema-qualified names pass through.
pub fn build_grant_statement(role: &str, privilege: &TablePrivilege) -> Option<String> {
    let verbs: Vec<&str> = privilege
        .permissions
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect();

    if verbs.is_empty() {
        return None;
    }

    Some(format!(
        "GRANT {} ON TABLE {} TO {}",
        verbs.join(", "),
        privilege.table,
        quote_ident(role)
    ))
}
