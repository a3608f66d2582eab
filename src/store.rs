//! Redis connections: one per configured server, each verified with PING.
//!
//! CHANGELOG:
//! - 10/18/2026 - Cover NOAUTH/WRONGPASS server replies (Phase 3)
//! - 10/18/2026 - Distinguish auth failures from other probe errors (Phase 1)
//! - 10/18/2026 - Initial implementation (Phase 1)

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{
    AsyncCommands, ConnectionAddr, ConnectionInfo, ErrorKind, RedisConnectionInfo, RedisError,
};
use thiserror::Error;
use tracing::debug;

use crate::config::{ConfigError, ServerEndpoint};

/// Connection and query failures. All of these are fatal at startup.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("password required for redis server '{server}'")]
    PasswordRequired { server: String },

    #[error("cannot connect to redis server '{server}': {source}")]
    Connect {
        server: String,
        #[source]
        source: RedisError,
    },

    #[error("liveness probe failed on redis server '{server}': {source}")]
    Ping {
        server: String,
        #[source]
        source: RedisError,
    },

    #[error("cannot read length of '{key}' on redis server '{server}': {source}")]
    Query {
        server: String,
        key: String,
        #[source]
        source: RedisError,
    },
}

/// Whether a Redis error means the server wants (different) credentials.
pub fn is_auth_error(err: &RedisError) -> bool {
    err.kind() == ErrorKind::AuthenticationFailed
        || matches!(err.code(), Some("NOAUTH") | Some("WRONGPASS"))
}

/// A live link to one list store.
#[async_trait]
pub trait QueueConnection: Send {
    /// Server address, for logs and errors.
    fn name(&self) -> &str;

    /// Liveness probe.
    async fn ping(&mut self) -> Result<(), StoreError>;

    /// Length of the list stored at `key` (0 when missing).
    async fn list_len(&mut self, key: &str) -> Result<i64, StoreError>;
}

/// Classify a failed PING: auth rejections become `PasswordRequired`.
fn ping_error(server: &str, source: RedisError) -> StoreError {
    if is_auth_error(&source) {
        StoreError::PasswordRequired {
            server: server.to_string(),
        }
    } else {
        StoreError::Ping {
            server: server.to_string(),
            source,
        }
    }
}

/// Redis-backed `QueueConnection`.
pub struct RedisConnection {
    name: String,
    conn: MultiplexedConnection,
}

impl RedisConnection {
    /// Open a connection to `endpoint`. AUTH and SELECT happen here when a
    /// password or database index is configured.
    pub async fn open(endpoint: &ServerEndpoint) -> Result<Self, StoreError> {
        let server = endpoint.address.clone();
        let connect_err = |source: RedisError| {
            if is_auth_error(&source) {
                StoreError::PasswordRequired {
                    server: server.clone(),
                }
            } else {
                StoreError::Connect {
                    server: server.clone(),
                    source,
                }
            }
        };

        let client = redis::Client::open(connection_info(endpoint)).map_err(connect_err)?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(connect_err)?;

        Ok(Self {
            name: endpoint.address.clone(),
            conn,
        })
    }
}

fn connection_info(endpoint: &ServerEndpoint) -> ConnectionInfo {
    ConnectionInfo {
        addr: ConnectionAddr::Tcp(endpoint.host.clone(), endpoint.port),
        redis: RedisConnectionInfo {
            db: i64::from(endpoint.db.unwrap_or(0)),
            password: endpoint.password.clone(),
            ..Default::default()
        },
    }
}

#[async_trait]
impl QueueConnection for RedisConnection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn ping(&mut self) -> Result<(), StoreError> {
        let reply: Result<String, RedisError> =
            redis::cmd("PING").query_async(&mut self.conn).await;
        reply.map(|_| ()).map_err(|source| ping_error(&self.name, source))
    }

    async fn list_len(&mut self, key: &str) -> Result<i64, StoreError> {
        self.conn
            .llen(key)
            .await
            .map_err(|source| StoreError::Query {
                server: self.name.clone(),
                key: key.to_string(),
                source,
            })
    }
}

/// Process-lifetime set of verified connections, in configuration order.
pub struct ConnectionPool<C> {
    connections: Vec<C>,
}

impl ConnectionPool<RedisConnection> {
    /// Connect to and PING every endpoint. The first failure aborts.
    pub async fn connect(endpoints: &[ServerEndpoint]) -> crate::Result<Self> {
        if endpoints.is_empty() {
            return Err(ConfigError::NoServers.into());
        }

        let mut connections = Vec::with_capacity(endpoints.len());
        for endpoint in endpoints {
            debug!(server = %endpoint.address, "connecting");
            connections.push(RedisConnection::open(endpoint).await?);
        }

        let mut pool = Self { connections };
        pool.verify().await?;
        Ok(pool)
    }
}

impl<C: QueueConnection> ConnectionPool<C> {
    /// Wrap already-open connections.
    pub fn from_connections(connections: Vec<C>) -> Self {
        Self { connections }
    }

    /// PING every connection; the first failure is returned.
    pub async fn verify(&mut self) -> Result<(), StoreError> {
        for conn in &mut self.connections {
            conn.ping().await?;
            debug!(server = conn.name(), "ping ok");
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn connections_mut(&mut self) -> impl Iterator<Item = &mut C> {
        self.connections.iter_mut()
    }
}
