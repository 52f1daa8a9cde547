// ABOUTME: Bounded connection pools for the source and target databases
// ABOUTME: Hands out liveness-checked (source, target) pairs, one per operation

use std::time::Duration;

use anyhow::{Context, Result};
use deadpool_postgres::{Manager, ManagerConfig, Object, Pool, RecyclingMethod};
use tokio_postgres::Client;

use super::connection::tls_connector;
use crate::error::{ConnectionError, DbSide};
use crate::utils::{mask_password, retry_with_backoff};

const LIVENESS_RETRIES: u32 = 3;
const LIVENESS_INITIAL_DELAY: Duration = Duration::from_secs(1);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// One pooled client per database, held for the duration of one operation.
///
/// Dropping the pair returns both clients to their pools.
pub struct ConnectionPair {
    source: Object,
    target: Object,
}

impl ConnectionPair {
    pub fn source(&self) -> &Client {
        &self.source
    }

    pub fn target(&self) -> &Client {
        &self.target
    }

    /// Borrow both sides at once; the target is mutable so it can open a
    /// transaction while the source streams.
    pub fn split_mut(&mut self) -> (&Client, &mut Client) {
        (&**self.source, &mut **self.target)
    }
}

/// Source and target pools sized to the number of concurrent operations.
pub struct ConnectionProvider {
    source: Pool,
    target: Pool,
}

fn build_pool(url: &str, max_size: usize) -> Result<Pool> {
    let mut pg_config: tokio_postgres::Config = url
        .parse()
        .with_context(|| format!("Invalid connection string: {}", mask_password(url)))?;
    if pg_config.get_connect_timeout().is_none() {
        pg_config.connect_timeout(DEFAULT_CONNECT_TIMEOUT);
    }

    let mgr_config = ManagerConfig {
        recycling_method: RecyclingMethod::Verified,
    };
    let mgr = Manager::from_config(pg_config, tls_connector()?, mgr_config);

    Pool::builder(mgr)
        .max_size(max_size.max(1))
        .build()
        .context("Failed to build connection pool")
}

async fn check_liveness(pool: &Pool) -> Result<()> {
    retry_with_backoff(
        || async move {
            let client = pool.get().await.context("Failed to check out a connection")?;
            client
                .simple_query("SELECT 1")
                .await
                .context("Liveness query failed")?;
            Ok(())
        },
        LIVENESS_RETRIES,
        LIVENESS_INITIAL_DELAY,
    )
    .await
}

async fn open_side(side: DbSide, url: &str, max_size: usize) -> Result<Pool, ConnectionError> {
    let pool = build_pool(url, max_size).map_err(|e| ConnectionError::new(side, e))?;
    check_liveness(&pool)
        .await
        .map_err(|e| ConnectionError::new(side, e))?;
    tracing::info!("Connected to {} database: {}", side, mask_password(url));
    Ok(pool)
}

impl ConnectionProvider {
    /// Build both pools and verify each side answers `SELECT 1`.
    ///
    /// `max_pairs` bounds how many pairs can be checked out concurrently. If
    /// the target fails, the already-open source pool is closed before the
    /// error is returned.
    pub async fn connect(
        source_url: &str,
        target_url: &str,
        max_pairs: usize,
    ) -> Result<Self, ConnectionError> {
        let source = open_side(DbSide::Source, source_url, max_pairs).await?;
        let target = match open_side(DbSide::Target, target_url, max_pairs).await {
            Ok(target) => target,
            Err(e) => {
                source.close();
                return Err(e);
            }
        };
        Ok(Self { source, target })
    }

    /// Check out one client from each pool.
    ///
    /// Waits while every pair is in use. A failed target checkout releases the
    /// source client immediately.
    pub async fn pair(&self) -> Result<ConnectionPair, ConnectionError> {
        let source = self
            .source
            .get()
            .await
            .map_err(|e| ConnectionError::new(DbSide::Source, e))?;
        let target = self
            .target
            .get()
            .await
            .map_err(|e| ConnectionError::new(DbSide::Target, e))?;
        Ok(ConnectionPair { source, target })
    }

    /// Close both pools; outstanding pairs are dropped when released.
    pub fn close(&self) {
        self.source.close();
        self.target.close();
    }
}
