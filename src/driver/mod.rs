/// Store driver abstraction
///
/// The session and the services talk to the store only through these traits.
/// A driver owns the wire protocol; mirador owns the lifecycle around it.
pub mod memory;
pub mod redis;

use crate::core::KeyType;
use crate::error::DriverResult;
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::sync::Arc;
use std::time::Duration;

pub use self::memory::MemoryDriver;
pub use self::redis::RedisDriver;

/// Default connect/send/receive timeout applied to every session
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

/// Timeouts handed to the driver at connect time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverTimeouts {
    pub connect: Duration,
    pub send: Duration,
    pub receive: Duration,
}

impl Default for DriverTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            send: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            receive: Duration::from_millis(DEFAULT_TIMEOUT_MS),
        }
    }
}

impl DriverTimeouts {
    /// Upper bound for a single request/response exchange
    pub fn request(&self) -> Duration {
        self.send.max(self.receive)
    }
}

/// One section of an `INFO` style report
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InfoSection {
    pub name: String,
    pub fields: Vec<(String, String)>,
}

impl InfoSection {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    pub fn with_field<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.fields.push((key.into(), value.into()));
        self
    }
}

/// Entry point of a driver: turns a connection descriptor into a live handle
#[async_trait]
pub trait StoreDriver: Send + Sync {
    /// Open a connection described by `descriptor`
    /// (`host:port[,password=..][,ssl=true],defaultDatabase=N`)
    async fn connect(
        &self,
        descriptor: &str,
        timeouts: &DriverTimeouts,
    ) -> DriverResult<Arc<dyn StoreHandle>>;

    /// Short name used in logs
    fn name(&self) -> &'static str;
}

/// A live connection to one server
#[async_trait]
pub trait StoreHandle: Send + Sync {
    /// Whether the underlying connection is still usable
    fn is_connected(&self) -> bool;

    /// Close the connection. Further calls on this handle fail with `Closed`.
    async fn close(&self) -> DriverResult<()>;

    /// Handle scoped to database `index`
    async fn select_database(&self, index: i64) -> DriverResult<Arc<dyn DatabaseHandle>>;

    /// Sectioned server report
    async fn info(&self) -> DriverResult<Vec<InfoSection>>;

    /// Number of keys in database `index`
    async fn database_size(&self, index: i64) -> DriverResult<u64>;
}

/// Key-level operations against one selected database
#[async_trait]
pub trait DatabaseHandle: Send + Sync {
    /// Lazily scan key names matching a glob, in cursor order.
    /// `count` is a hint for how many keys each round trip should cover.
    fn scan_keys(&self, pattern: &str, count: usize) -> BoxStream<'static, DriverResult<String>>;

    async fn key_type(&self, key: &str) -> DriverResult<KeyType>;

    /// Remaining time to live, `None` when the key has no expiry
    async fn ttl(&self, key: &str) -> DriverResult<Option<Duration>>;

    /// Length of a string value; only valid for string keys
    async fn string_length(&self, key: &str) -> DriverResult<u64>;

    async fn get(&self, key: &str) -> DriverResult<Option<String>>;

    /// Write a string value; `true` when the server confirmed the write
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> DriverResult<bool>;

    /// Remove a key; `true` when a key was actually removed
    async fn delete(&self, key: &str) -> DriverResult<bool>;
}
