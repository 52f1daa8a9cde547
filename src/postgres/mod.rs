// ABOUTME: PostgreSQL connectivity and catalog queries
// ABOUTME: Exports TLS setup, the pooled connection provider, and existence checks

pub mod catalog;
pub mod connection;
pub mod pool;
pub mod privileges;

pub use catalog::{find_missing_tables, split_table_name, table_exists, validate_tables_exist};
pub use connection::{connect, init_tls_policy, tls_connector};
pub use pool::{ConnectionPair, ConnectionProvider};
pub use privileges::{
    check_role_management_privileges, fetch_role_attributes, list_source_roles, PrivilegeCheck,
};
