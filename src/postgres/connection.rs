// ABOUTME: TLS policy and single-connection helper for PostgreSQL
// ABOUTME: The policy is set once at startup and read by every connector

use std::sync::OnceLock;

use anyhow::{Context, Result};
use native_tls::TlsConnector;
use postgres_native_tls::MakeTlsConnector;
use tokio_postgres::Client;

use crate::utils::mask_password;

static ALLOW_SELF_SIGNED: OnceLock<bool> = OnceLock::new();

/// Set the process-wide TLS policy. Later calls are ignored.
pub fn init_tls_policy(allow_self_signed_certs: bool) {
    if ALLOW_SELF_SIGNED.set(allow_self_signed_certs).is_err() {
        tracing::debug!("TLS policy already initialized; keeping the first value");
    }
    if allow_self_signed_certs {
        tracing::warn!("Accepting self-signed TLS certificates (insecure)");
    }
}

fn allow_self_signed() -> bool {
    ALLOW_SELF_SIGNED.get().copied().unwrap_or(false)
}

/// Build the TLS connector used for every connection.
///
/// Whether TLS is actually negotiated is governed by the URL's `sslmode`.
pub fn tls_connector() -> Result<MakeTlsConnector> {
    let mut builder = TlsConnector::builder();
    if allow_self_signed() {
        builder
            .danger_accept_invalid_certs(true)
            .danger_accept_invalid_hostnames(true);
    }
    let connector = builder.build().context("Failed to build TLS connector")?;
    Ok(MakeTlsConnector::new(connector))
}

/// Open one unpooled connection and drive it on a background task.
///
/// The migration itself goes through [`super::ConnectionProvider`]; this is
/// for tests and one-off catalog queries that need a plain client.
pub async fn connect(url: &str) -> Result<Client> {
    let config: tokio_postgres::Config = url
        .parse()
        .with_context(|| format!("Invalid connection string: {}", mask_password(url)))?;

    let (client, connection) = config
        .connect(tls_connector()?)
        .await
        .with_context(|| format!("Failed to connect to {}", mask_password(url)))?;

    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!("Connection error: {}", e);
        }
    });

    Ok(client)
}
