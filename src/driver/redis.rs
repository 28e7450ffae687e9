/// Redis store driver built on the `redis` crate
///
/// One multiplexed connection per handle. Every command is bounded by the
/// request timeout given at connect time; a timed-out or dropped connection
/// flips the handle to disconnected and is never re-established here.

use super::{DatabaseHandle, DriverTimeouts, InfoSection, StoreDriver, StoreHandle};
use crate::core::{ConnectionDescriptor, KeyType};
use crate::error::{DriverError, DriverResult};
use crate::stats::parser::parse_info_text;
use ::redis::aio::MultiplexedConnection;
use ::redis::{AsyncConnectionConfig, Client, IntoConnectionInfo};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;

/// Driver for standalone Redis (and protocol-compatible) servers
#[derive(Debug, Default, Clone)]
pub struct RedisDriver;

impl RedisDriver {
    pub fn new() -> Self {
        Self
    }

    /// Build a client for `descriptor` pointed at `database`
    fn client_for(descriptor: &ConnectionDescriptor, database: i64) -> DriverResult<Client> {
        let scheme = if descriptor.use_tls { "rediss" } else { "redis" };
        let url = format!(
            "{}://{}:{}/{}",
            scheme,
            url_host(&descriptor.host),
            descriptor.port,
            database
        );

        let mut info = url
            .as_str()
            .into_connection_info()
            .map_err(|e| DriverError::connection(format!("invalid endpoint {}: {}", url, e)))?;
        info.redis.password = descriptor.password.clone().filter(|p| !p.is_empty());

        Client::open(info).map_err(DriverError::from)
    }
}

/// IPv6 literals need brackets inside a URL
fn url_host(host: &str) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{}]", host)
    } else {
        host.to_string()
    }
}

/// `PX` argument for a TTL. The server rejects a zero expiry, so it is refused
/// here before anything goes on the wire.
fn expiry_millis(ttl: Duration) -> DriverResult<u64> {
    if ttl.is_zero() {
        return Err(DriverError::command(
            "SET",
            "ERR invalid expire time in 'set' command",
        ));
    }
    Ok(ttl.as_millis().max(1) as u64)
}

async fn open_connection(
    client: &Client,
    timeouts: &DriverTimeouts,
) -> DriverResult<MultiplexedConnection> {
    let config = AsyncConnectionConfig::new()
        .set_connection_timeout(timeouts.connect)
        .set_response_timeout(timeouts.request());
    let connect = client.get_multiplexed_async_connection_with_config(&config);

    match timeout(timeouts.connect, connect).await {
        Ok(result) => result.map_err(DriverError::from),
        Err(_) => Err(DriverError::timeout("connect")),
    }
}

#[async_trait]
impl StoreDriver for RedisDriver {
    async fn connect(
        &self,
        descriptor: &str,
        timeouts: &DriverTimeouts,
    ) -> DriverResult<Arc<dyn StoreHandle>> {
        let parsed = ConnectionDescriptor::parse(descriptor)?;
        let client = Self::client_for(&parsed, parsed.database)?;
        let connection = open_connection(&client, timeouts).await?;

        debug!("Opened Redis connection to {}:{}", parsed.host, parsed.port);

        Ok(Arc::new(RedisHandle {
            descriptor: parsed.clone(),
            default_database: parsed.database,
            timeouts: *timeouts,
            conn: Arc::new(LiveConnection::new(connection, timeouts.request())),
        }))
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

/// A multiplexed connection plus the liveness flag shared by every handle
/// derived from it
struct LiveConnection {
    connection: MultiplexedConnection,
    request_timeout: Duration,
    live: AtomicBool,
}

impl LiveConnection {
    fn new(connection: MultiplexedConnection, request_timeout: Duration) -> Self {
        Self {
            connection,
            request_timeout,
            live: AtomicBool::new(true),
        }
    }

    /// Run one command with the request timeout, tracking connection loss
    async fn query<T, F, Fut>(&self, command: &str, f: F) -> DriverResult<T>
    where
        F: FnOnce(MultiplexedConnection) -> Fut,
        Fut: Future<Output = ::redis::RedisResult<T>>,
    {
        if !self.live.load(Ordering::SeqCst) {
            return Err(DriverError::Closed);
        }

        let result = match timeout(self.request_timeout, f(self.connection.clone())).await {
            Ok(result) => result.map_err(DriverError::from),
            Err(_) => Err(DriverError::timeout(command)),
        };

        if let Err(e) = &result {
            if matches!(e, DriverError::Connection { .. }) {
                debug!("{} lost the connection: {}", command, e);
                self.live.store(false, Ordering::SeqCst);
            }
        }
        result
    }
}

struct RedisHandle {
    descriptor: ConnectionDescriptor,
    default_database: i64,
    timeouts: DriverTimeouts,
    conn: Arc<LiveConnection>,
}

impl RedisHandle {
    /// Connection scoped to `index`: the handle's own for the default
    /// database, a second connection otherwise
    async fn connection_for(&self, index: i64) -> DriverResult<Arc<LiveConnection>> {
        if index == self.default_database {
            return Ok(self.conn.clone());
        }
        if !self.conn.live.load(Ordering::SeqCst) {
            return Err(DriverError::Closed);
        }
        let client = RedisDriver::client_for(&self.descriptor, index)?;
        let connection = open_connection(&client, &self.timeouts).await?;
        Ok(Arc::new(LiveConnection::new(
            connection,
            self.timeouts.request(),
        )))
    }
}

#[async_trait]
impl StoreHandle for RedisHandle {
    fn is_connected(&self) -> bool {
        self.conn.live.load(Ordering::SeqCst)
    }

    async fn close(&self) -> DriverResult<()> {
        // The multiplexed connection shuts down once its last clone is dropped
        self.conn.live.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn select_database(&self, index: i64) -> DriverResult<Arc<dyn DatabaseHandle>> {
        let conn = self.connection_for(index).await?;
        Ok(Arc::new(RedisDatabase { conn }))
    }

    async fn info(&self) -> DriverResult<Vec<InfoSection>> {
        let text: String = self
            .conn
            .query("INFO", |mut c| async move {
                ::redis::cmd("INFO").query_async(&mut c).await
            })
            .await?;
        Ok(parse_info_text(&text))
    }

    async fn database_size(&self, index: i64) -> DriverResult<u64> {
        let conn = self.connection_for(index).await?;
        conn.query("DBSIZE", |mut c| async move {
            ::redis::cmd("DBSIZE").query_async(&mut c).await
        })
        .await
    }
}

struct RedisDatabase {
    conn: Arc<LiveConnection>,
}

struct ScanCursor {
    conn: Arc<LiveConnection>,
    pattern: String,
    count: usize,
    cursor: u64,
    page: std::vec::IntoIter<String>,
    finished: bool,
}

impl ScanCursor {
    async fn next_name(&mut self) -> Option<DriverResult<String>> {
        loop {
            if let Some(name) = self.page.next() {
                return Some(Ok(name));
            }
            if self.finished {
                return None;
            }

            let (cursor, pattern, count) = (self.cursor, self.pattern.clone(), self.count);
            let page: DriverResult<(u64, Vec<String>)> = self
                .conn
                .query("SCAN", |mut c| async move {
                    ::redis::cmd("SCAN")
                        .arg(cursor)
                        .arg("MATCH")
                        .arg(pattern)
                        .arg("COUNT")
                        .arg(count)
                        .query_async(&mut c)
                        .await
                })
                .await;

            match page {
                Ok((next, names)) => {
                    self.cursor = next;
                    self.finished = next == 0;
                    self.page = names.into_iter();
                }
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

#[async_trait]
impl DatabaseHandle for RedisDatabase {
    fn scan_keys(&self, pattern: &str, count: usize) -> BoxStream<'static, DriverResult<String>> {
        let cursor = ScanCursor {
            conn: self.conn.clone(),
            pattern: pattern.to_string(),
            count: count.max(1),
            cursor: 0,
            page: Vec::new().into_iter(),
            finished: false,
        };

        stream::unfold(cursor, |mut cursor| async move {
            cursor.next_name().await.map(|item| (item, cursor))
        })
        .boxed()
    }

    async fn key_type(&self, key: &str) -> DriverResult<KeyType> {
        let key = key.to_string();
        let name: String = self
            .conn
            .query("TYPE", |mut c| async move {
                ::redis::cmd("TYPE").arg(key).query_async(&mut c).await
            })
            .await?;
        Ok(KeyType::from_name(&name))
    }

    async fn ttl(&self, key: &str) -> DriverResult<Option<Duration>> {
        let key = key.to_string();
        let millis: i64 = self
            .conn
            .query("PTTL", |mut c| async move {
                ::redis::cmd("PTTL").arg(key).query_async(&mut c).await
            })
            .await?;
        // -1: no expiry, -2: no such key
        Ok(u64::try_from(millis).ok().map(Duration::from_millis))
    }

    async fn string_length(&self, key: &str) -> DriverResult<u64> {
        let key = key.to_string();
        self.conn
            .query("STRLEN", |mut c| async move {
                ::redis::cmd("STRLEN").arg(key).query_async(&mut c).await
            })
            .await
    }

    async fn get(&self, key: &str) -> DriverResult<Option<String>> {
        let key = key.to_string();
        self.conn
            .query("GET", |mut c| async move {
                ::redis::cmd("GET").arg(key).query_async(&mut c).await
            })
            .await
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> DriverResult<bool> {
        let (key, value) = (key.to_string(), value.to_string());
        let expiry = ttl.map(expiry_millis).transpose()?;
        let reply: Option<String> = self
            .conn
            .query("SET", |mut c| async move {
                let mut command = ::redis::cmd("SET");
                command.arg(key).arg(value);
                if let Some(millis) = expiry {
                    command.arg("PX").arg(millis);
                }
                command.query_async(&mut c).await
            })
            .await?;
        Ok(reply.map(|r| r.eq_ignore_ascii_case("OK")).unwrap_or(false))
    }

    async fn delete(&self, key: &str) -> DriverResult<bool> {
        let key = key.to_string();
        let removed: u64 = self
            .conn
            .query("DEL", |mut c| async move {
                ::redis::cmd("DEL").arg(key).query_async(&mut c).await
            })
            .await?;
        Ok(removed > 0)
    }
}
