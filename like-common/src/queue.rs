use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::event::{EventKey, ParseEventKeyError};

/// Enumeration of errors for operations on a like queue.
#[derive(Error, Debug)]
pub enum QueueError {
    #[error("connection to the queue failed with: {0}")]
    Connection(#[source] redis::RedisError),
    #[error("{command} on queue '{queue}' failed with: {error}")]
    Command {
        command: &'static str,
        queue: String,
        #[source]
        error: redis::RedisError,
    },
    #[error("connecting to queue '{queue}' timed out after {timeout:?}")]
    ConnectTimeout { queue: String, timeout: Duration },
    #[error("queue '{0}' is unavailable")]
    Unavailable(String),
    #[error("malformed queue entry: {0}")]
    MalformedEntry(#[from] ParseEventKeyError),
}

impl QueueError {
    /// Whether retrying the same operation later could succeed.
    /// A malformed entry has already been removed from the queue, so there is nothing to retry.
    pub fn is_transient(&self) -> bool {
        !matches!(self, QueueError::MalformedEntry(_))
    }
}

pub type QueueResult<T> = std::result::Result<T, QueueError>;

/// How long a caller waits for a new connection to Redis before giving up.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// A FIFO list of event keys shared by every producer and the single consumer.
///
/// Keys are pushed at the head and popped from the tail, so the oldest entry is always popped
/// first. A popped key is handed to exactly one caller and is never re-delivered.
#[async_trait]
pub trait LikeQueue: Send + Sync {
    /// Append a key. Returns once the queue has accepted it.
    async fn push(&self, key: &EventKey) -> QueueResult<()>;

    /// Remove and return the oldest key, suspending until one is available.
    /// Returns `None` if the queue's configured pop timeout elapsed first.
    async fn blocking_pop(&self) -> QueueResult<Option<EventKey>>;
}

/// A `LikeQueue` backed by a Redis list, using LPUSH and BRPOP.
pub struct RedisQueue {
    name: String,
    client: redis::Client,
    /// Established lazily so a service can start while Redis is still down,
    /// and dropped whenever it breaks so the next command reconnects.
    connection: Mutex<Option<MultiplexedConnection>>,
    /// Seconds BRPOP waits for an entry, 0 waits forever.
    pop_timeout_secs: usize,
    connect_timeout: Duration,
}

impl RedisQueue {
    pub fn new(name: &str, url: &str, pop_timeout_secs: usize) -> QueueResult<Self> {
        let client = redis::Client::open(url).map_err(QueueError::Connection)?;

        Ok(Self {
            name: name.to_owned(),
            client,
            connection: Mutex::new(None),
            pop_timeout_secs,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        })
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Return a handle to the shared connection, connecting first if needed.
    ///
    /// The lock is not held while connecting: each caller that finds no connection makes its
    /// own bounded attempt, and the first to succeed is kept.
    async fn connection(&self) -> QueueResult<MultiplexedConnection> {
        if let Some(conn) = self.connection.lock().await.as_ref() {
            return Ok(conn.clone());
        }

        let conn = tokio::time::timeout(
            self.connect_timeout,
            self.client.get_multiplexed_tokio_connection(),
        )
        .await
        .map_err(|_| QueueError::ConnectTimeout {
            queue: self.name.to_owned(),
            timeout: self.connect_timeout,
        })?
        .map_err(QueueError::Connection)?;

        let mut guard = self.connection.lock().await;
        match guard.as_ref() {
            Some(existing) => Ok(existing.clone()),
            None => {
                debug!("connected to queue '{}'", self.name);
                *guard = Some(conn.clone());
                Ok(conn)
            }
        }
    }

    async fn command_error(&self, command: &'static str, error: redis::RedisError) -> QueueError {
        if error.is_io_error() || error.is_connection_dropped() || error.is_timeout() {
            warn!("lost connection to queue '{}': {}", self.name, error);
            *self.connection.lock().await = None;
        }

        QueueError::Command {
            command,
            queue: self.name.to_owned(),
            error,
        }
    }
}

#[async_trait]
impl LikeQueue for RedisQueue {
    async fn push(&self, key: &EventKey) -> QueueResult<()> {
        let mut conn = self.connection().await?;

        match conn.lpush::<_, _, ()>(&self.name, key.as_str()).await {
            Ok(()) => Ok(()),
            Err(error) => Err(self.command_error("LPUSH", error).await),
        }
    }

    async fn blocking_pop(&self) -> QueueResult<Option<EventKey>> {
        let mut conn = self.connection().await?;

        let reply: Option<(String, String)> = match redis::cmd("BRPOP")
            .arg(&self.name)
            .arg(self.pop_timeout_secs)
            .query_async(&mut conn)
            .await
        {
            Ok(reply) => reply,
            Err(error) => return Err(self.command_error("BRPOP", error).await),
        };

        match reply {
            None => Ok(None),
            Some((queue, raw)) => {
                if queue != self.name {
                    warn!("BRPOP on '{}' answered for '{}'", self.name, queue);
                }
                Ok(Some(raw.parse()?))
            }
        }
    }
}
