// ABOUTME: Role synchronization types and the include/exclude planning logic
// ABOUTME: Decides which roles to create on the target and with which grants

pub mod ddl;
pub mod sync;

use std::fmt;
use std::str::FromStr;

use anyhow::bail;
use serde::{Deserialize, Serialize};

pub use ddl::{build_grant_statement, build_role_ddl, RoleAttributes};
pub use sync::{sync_roles, RoleSyncReport};

/// Grant of one or more table-level privileges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TablePrivilege {
    pub table: String,
    #[serde(default)]
    pub permissions: Vec<String>,
}

/// A role to create on the target plus the grants to apply to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleSpec {
    pub name: String,
    #[serde(default)]
    pub table_privileges: Vec<TablePrivilege>,
}

impl RoleSpec {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table_privileges: Vec::new(),
        }
    }
}

/// How the configured role list is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleSyncMode {
    /// Only the listed roles, whether or not they exist in the source.
    Include,
    /// Every non-system source role except the listed ones.
    Exclude,
}

impl fmt::Display for RoleSyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoleSyncMode::Include => write!(f, "include"),
            RoleSyncMode::Exclude => write!(f, "exclude"),
        }
    }
}

impl FromStr for RoleSyncMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "include" => Ok(RoleSyncMode::Include),
            "exclude" => Ok(RoleSyncMode::Exclude),
            other => bail!(
                "Unknown role sync mode '{}'. Valid options: include, exclude",
                other
            ),
        }
    }
}

/// Built-in roles that are never migrated in exclude mode.
pub fn is_system_role(name: &str) -> bool {
    name.starts_with("pg_") || name == "postgres"
}

/// Compute the roles to migrate.
///
/// Include mode returns the configured list as-is; `source_roles` is ignored.
/// Exclude mode returns every non-system source role whose name is not in
/// `configured`, each with no privileges: the excluded entries only
/// contribute names.
pub fn plan_roles(
    mode: RoleSyncMode,
    configured: &[RoleSpec],
    source_roles: &[String],
) -> Vec<RoleSpec> {
    match mode {
        RoleSyncMode::Include => configured.to_vec(),
        RoleSyncMode::Exclude => source_roles
            .iter()
            .filter(|name| !is_system_role(name))
            .filter(|name| !configured.iter().any(|excluded| &excluded.name == *name))
            .map(|name| RoleSpec::named(name.as_str()))
            .collect(),
    }
}

pub fn role_names(roles: &[RoleSpec]) -> Vec<&str> {
    roles.iter().map(|r| r.name.as_str()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn privileged(name: &str, table: &str) -> RoleSpec {
        RoleSpec {
            name: name.to_string(),
            table_privileges: vec![TablePrivilege {
                table: table.to_string(),
                permissions: vec!["SELECT".to_string()],
            }],
        }
    }

    #[test]
    fn test_include_mode_uses_configured_list_verbatim() {
        let configured = vec![privileged("reporting", "orders"), RoleSpec::named("ghost")];
        let planned = plan_roles(RoleSyncMode::Include, &configured, &["reporting".to_string()]);
        assert_eq!(planned, configured);
    }

    #[test]
    fn test_exclude_mode_drops_excluded_and_privileges() {
        let configured = vec![privileged("b", "orders")];
        let source = vec!["a".to_string(), "b".to_string(), "c".to_string()];

        let planned = plan_roles(RoleSyncMode::Exclude, &configured, &source);

        assert_eq!(role_names(&planned), vec!["a", "c"]);
        assert!(planned.iter().all(|r| r.table_privileges.is_empty()));
    }

    #[test]
    fn test_exclude_mode_skips_system_roles() {
        let source = vec![
            "postgres".to_string(),
            "pg_read_all_data".to_string(),
            "app".to_string(),
        ];
        let planned = plan_roles(RoleSyncMode::Exclude, &[], &source);
        assert_eq!(role_names(&planned), vec!["app"]);
    }

    #[test]
    fn test_exclude_mode_matches_names_exactly() {
        let source = vec!["app".to_string(), "App".to_string(), "app_ro".to_string()];
        let planned = plan_roles(RoleSyncMode::Exclude, &[RoleSpec::named("app")], &source);
        assert_eq!(role_names(&planned), vec!["App", "app_ro"]);
    }

    #[test]
    fn test_role_sync_mode_parsing() {
        assert_eq!("include".parse::<RoleSyncMode>().unwrap(), RoleSyncMode::Include);
        assert_eq!(" EXCLUDE ".parse::<RoleSyncMode>().unwrap(), RoleSyncMode::Exclude);
        assert!("".parse::<RoleSyncMode>().is_err());
        assert!("all".parse::<RoleSyncMode>().is_err());
    }

    #[test]
    fn test_role_spec_deserializes_without_privileges() {
        let roles: Vec<RoleSpec> =
            serde_json::from_str(r#"[{"name":"reader"},{"name":"writer","table_privileges":[{"table":"orders","permissions":["SELECT","INSERT"]}]}]"#)
                .unwrap();
        assert!(roles[0].table_privileges.is_empty());
        assert_eq!(roles[1].table_privileges[0].permissions, vec!["SELECT", "INSERT"]);
    }
}
