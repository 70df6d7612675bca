use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgConnection, PgPool, PgPoolOptions};
use sqlx::Connection;
use thiserror::Error;
use tracing::debug;

use crate::event::EventKey;

/// How a failed store operation should be treated by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The store could not be reached or was temporarily unable to serve the request.
    Transient,
    /// The store rejected this specific operation; repeating it would fail again.
    Permanent,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Transient => "transient",
            FailureKind::Permanent => "permanent",
        }
    }
}

/// Enumeration of errors for operations on the counter store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("connection failed with: {0}")]
    Connection(#[source] sqlx::Error),
    #[error("{command} query failed with: {error}")]
    Query {
        command: &'static str,
        #[source]
        error: sqlx::Error,
    },
    #[error("connecting to the counter store timed out after {0:?}")]
    ConnectTimeout(Duration),
    #[error("counter store is unavailable")]
    Unavailable,
    #[error("counter store rejected '{key}': {reason}")]
    Rejected { key: String, reason: String },
}

impl StoreError {
    pub fn kind(&self) -> FailureKind {
        match self {
            StoreError::Connection(_)
            | StoreError::ConnectTimeout(_)
            | StoreError::Unavailable => FailureKind::Transient,
            StoreError::Rejected { .. } => FailureKind::Permanent,
            StoreError::Query { error, .. } => classify_sqlx_error(error),
        }
    }
}

/// Connectivity problems and the server-side error classes that signal a temporary
/// condition are transient. Everything else, constraint violations included, is permanent.
fn classify_sqlx_error(error: &sqlx::Error) -> FailureKind {
    match error {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => FailureKind::Transient,
        sqlx::Error::Database(db_error) => match db_error.code() {
            Some(code) if is_transient_sqlstate(&code) => FailureKind::Transient,
            _ => FailureKind::Permanent,
        },
        _ => FailureKind::Permanent,
    }
}

fn is_transient_sqlstate(code: &str) -> bool {
    // 08: connection exception, 53: insufficient resources, 57P0x: operator intervention.
    code.starts_with("08")
        || code.starts_with("53")
        || code.starts_with("57P0")
        || code == "40001"
        || code == "40P01"
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// The persistent home of like counters, one row per event key.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Atomically create the key's row with a count of 1, or add 1 to the existing count.
    async fn increment(&self, key: &EventKey) -> StoreResult<()>;

    /// Current count for a key, `None` if nothing was ever recorded for it.
    async fn count(&self, key: &EventKey) -> StoreResult<Option<i64>>;
}

/// Opens connections to a `CounterStore`.
#[async_trait]
pub trait StoreConnector: Send + Sync {
    type Store: CounterStore;

    async fn connect(&self) -> StoreResult<Self::Store>;
}

/// A `CounterStore` backed by the `likes` table in PostgreSQL.
#[derive(Clone)]
pub struct PgCounterStore {
    pool: PgPool,
}

impl PgCounterStore {
    /// Check the server answers, then build a pool for it.
    ///
    /// The check goes through a single connection so a refused or failed connect reports its
    /// own error instead of the pool's acquire timeout. Both the check and every later acquire
    /// give up after `acquire_timeout`.
    pub async fn new(
        url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> StoreResult<Self> {
        let options = PgConnectOptions::from_str(url).map_err(StoreError::Connection)?;

        let conn = tokio::time::timeout(acquire_timeout, PgConnection::connect_with(&options))
            .await
            .map_err(|_| StoreError::ConnectTimeout(acquire_timeout))?
            .map_err(StoreError::Connection)?;
        conn.close().await.map_err(StoreError::Connection)?;
        debug!("counter store is reachable");

        Ok(Self::new_lazy_with(options, max_connections, acquire_timeout))
    }

    /// Build a pool without connecting. Connections are opened on first use, so an unreachable
    /// server surfaces as an error from each operation.
    pub fn new_lazy(
        url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> StoreResult<Self> {
        let options = PgConnectOptions::from_str(url).map_err(StoreError::Connection)?;

        Ok(Self::new_lazy_with(options, max_connections, acquire_timeout))
    }

    fn new_lazy_with(
        options: PgConnectOptions,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Self {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect_lazy_with(options);

        Self { pool }
    }

    pub fn new_from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CounterStore for PgCounterStore {
    async fn increment(&self, key: &EventKey) -> StoreResult<()> {
        sqlx::query(
            r#"
INSERT INTO likes (post_id, like_count) VALUES ($1, 1)
ON CONFLICT (post_id) DO UPDATE SET like_count = likes.like_count + 1
            "#,
        )
        .bind(key.as_str())
        .execute(&self.pool)
        .await
        .map_err(|error| StoreError::Query {
            command: "INSERT",
            error,
        })?;

        Ok(())
    }

    async fn count(&self, key: &EventKey) -> StoreResult<Option<i64>> {
        sqlx::query_scalar::<_, i64>("SELECT like_count FROM likes WHERE post_id = $1")
            .bind(key.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|error| StoreError::Query {
                command: "SELECT",
                error,
            })
    }
}

/// Connects `PgCounterStore` pools from a database URL.
pub struct PgConnector {
    url: String,
    max_connections: u32,
    acquire_timeout: Duration,
}

impl PgConnector {
    pub fn new(url: &str, max_connections: u32, acquire_timeout: Duration) -> Self {
        Self {
            url: url.to_owned(),
            max_connections,
            acquire_timeout,
        }
    }
}

#[async_trait]
impl StoreConnector for PgConnector {
    type Store = PgCounterStore;

    async fn connect(&self) -> StoreResult<PgCounterStore> {
        PgCounterStore::new(&self.url, self.max_connections, self.acquire_timeout).await
    }
}
