/// In-process store driver
///
/// Keeps databases in memory and speaks the same driver traits as the Redis
/// driver. Used for offline sessions and throughout the test suite; the fault
/// switches let callers simulate dropped connections, timeouts and servers
/// that reject particular commands.

use super::{DatabaseHandle, DriverTimeouts, InfoSection, StoreDriver, StoreHandle};
use crate::core::{ConnectionDescriptor, KeyType};
use crate::error::{DriverError, DriverResult};
use crate::utils::glob_match;
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const DATABASE_COUNT: i64 = 16;

/// Value stored under a key
#[derive(Debug, Clone, PartialEq)]
pub enum MemoryValue {
    String(String),
    List(Vec<String>),
    Set(BTreeSet<String>),
    SortedSet(Vec<(String, f64)>),
    Hash(BTreeMap<String, String>),
    /// Stream entry ids
    Stream(Vec<String>),
}

impl MemoryValue {
    fn key_type(&self) -> KeyType {
        match self {
            MemoryValue::String(_) => KeyType::String,
            MemoryValue::List(_) => KeyType::List,
            MemoryValue::Set(_) => KeyType::Set,
            MemoryValue::SortedSet(_) => KeyType::SortedSet,
            MemoryValue::Hash(_) => KeyType::Hash,
            MemoryValue::Stream(_) => KeyType::Stream,
        }
    }

    fn approximate_bytes(&self) -> u64 {
        let bytes = match self {
            MemoryValue::String(s) => s.len(),
            MemoryValue::List(items) | MemoryValue::Stream(items) => {
                items.iter().map(String::len).sum()
            }
            MemoryValue::Set(items) => items.iter().map(String::len).sum(),
            MemoryValue::SortedSet(items) => items.iter().map(|(m, _)| m.len() + 8).sum(),
            MemoryValue::Hash(map) => map.iter().map(|(k, v)| k.len() + v.len()).sum(),
        };
        bytes as u64
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: MemoryValue,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.map(|at| at <= now).unwrap_or(false)
    }
}

type Database = BTreeMap<String, Entry>;

#[derive(Default)]
struct Faults {
    scan_after: Mutex<Option<usize>>,
    commands: AtomicBool,
    info: AtomicBool,
    database_size: AtomicBool,
    string_length: AtomicBool,
}

struct MemoryStore {
    databases: Mutex<BTreeMap<i64, Database>>,
    unreachable: Mutex<HashSet<String>>,
    version: Mutex<String>,
    open: AtomicUsize,
    generation: AtomicU64,
    commands_processed: AtomicU64,
    started: Instant,
    faults: Faults,
}

/// Cheap to clone; clones share the same data
#[derive(Clone)]
pub struct MemoryDriver {
    store: Arc<MemoryStore>,
}

impl Default for MemoryDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDriver {
    pub fn new() -> Self {
        Self {
            store: Arc::new(MemoryStore {
                databases: Mutex::new(BTreeMap::new()),
                unreachable: Mutex::new(HashSet::new()),
                version: Mutex::new("7.2.4".to_string()),
                open: AtomicUsize::new(0),
                generation: AtomicU64::new(0),
                commands_processed: AtomicU64::new(0),
                started: Instant::now(),
                faults: Faults::default(),
            }),
        }
    }

    /// Refuse connections to `host`
    pub fn with_unreachable_host<S: Into<String>>(self, host: S) -> Self {
        self.store.unreachable.lock().insert(host.into());
        self
    }

    pub fn with_version<S: Into<String>>(self, version: S) -> Self {
        *self.store.version.lock() = version.into();
        self
    }

    pub fn insert(&self, database: i64, key: &str, value: MemoryValue) {
        self.insert_entry(database, key, value, None);
    }

    pub fn insert_with_ttl(&self, database: i64, key: &str, value: MemoryValue, ttl: Duration) {
        self.insert_entry(database, key, value, Some(Instant::now() + ttl));
    }

    fn insert_entry(&self, database: i64, key: &str, value: MemoryValue, expires_at: Option<Instant>) {
        self.store
            .databases
            .lock()
            .entry(database)
            .or_default()
            .insert(key.to_string(), Entry { value, expires_at });
    }

    pub fn contains(&self, database: i64, key: &str) -> bool {
        let now = Instant::now();
        self.store
            .databases
            .lock()
            .get(&database)
            .and_then(|db| db.get(key))
            .map(|entry| !entry.is_expired(now))
            .unwrap_or(false)
    }

    /// Connections opened and not yet closed
    pub fn open_connections(&self) -> usize {
        self.store.open.load(Ordering::SeqCst)
    }

    /// Sever every live connection, as if the server went away
    pub fn drop_connections(&self) {
        self.store.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Make key scans fail after `keys` names have been produced
    pub fn fail_scan_after(&self, keys: Option<usize>) {
        *self.store.faults.scan_after.lock() = keys;
    }

    /// Make every command time out
    pub fn set_command_failure(&self, enabled: bool) {
        self.store.faults.commands.store(enabled, Ordering::SeqCst);
    }

    pub fn set_info_failure(&self, enabled: bool) {
        self.store.faults.info.store(enabled, Ordering::SeqCst);
    }

    /// Reject `DBSIZE`, as cluster proxies do
    pub fn set_database_size_unsupported(&self, enabled: bool) {
        self.store.faults.database_size.store(enabled, Ordering::SeqCst);
    }

    pub fn set_string_length_failure(&self, enabled: bool) {
        self.store.faults.string_length.store(enabled, Ordering::SeqCst);
    }
}

#[async_trait]
impl StoreDriver for MemoryDriver {
    async fn connect(
        &self,
        descriptor: &str,
        _timeouts: &DriverTimeouts,
    ) -> DriverResult<Arc<dyn StoreHandle>> {
        let parsed = ConnectionDescriptor::parse(descriptor)?;

        if self.store.unreachable.lock().contains(&parsed.host) {
            return Err(DriverError::connection(format!(
                "{}:{} is unreachable",
                parsed.host, parsed.port
            )));
        }

        self.store.open.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MemoryHandle {
            conn: Arc::new(ConnState {
                store: self.store.clone(),
                generation: self.store.generation.load(Ordering::SeqCst),
                closed: AtomicBool::new(false),
            }),
        }))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

struct ConnState {
    store: Arc<MemoryStore>,
    generation: u64,
    closed: AtomicBool,
}

impl ConnState {
    fn is_live(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
            && self.store.generation.load(Ordering::SeqCst) == self.generation
    }

    /// Gate every command: connection state, injected faults, stats
    fn check(&self, command: &str) -> DriverResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(DriverError::Closed);
        }
        if self.store.generation.load(Ordering::SeqCst) != self.generation {
            return Err(DriverError::connection("connection reset by peer"));
        }
        if self.store.faults.commands.load(Ordering::SeqCst) {
            return Err(DriverError::timeout(command));
        }
        self.store.commands_processed.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn with_database<T>(&self, index: i64, f: impl FnOnce(&mut Database) -> T) -> T {
        let mut databases = self.store.databases.lock();
        let database = databases.entry(index).or_default();
        let now = Instant::now();
        database.retain(|_, entry| !entry.is_expired(now));
        f(database)
    }
}

struct MemoryHandle {
    conn: Arc<ConnState>,
}

#[async_trait]
impl StoreHandle for MemoryHandle {
    fn is_connected(&self) -> bool {
        self.conn.is_live()
    }

    async fn close(&self) -> DriverResult<()> {
        if !self.conn.closed.swap(true, Ordering::SeqCst) {
            self.conn.store.open.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn select_database(&self, index: i64) -> DriverResult<Arc<dyn DatabaseHandle>> {
        self.conn.check("SELECT")?;
        if !(0..DATABASE_COUNT).contains(&index) {
            return Err(DriverError::command("SELECT", "ERR DB index is out of range"));
        }
        Ok(Arc::new(MemoryDatabase {
            conn: self.conn.clone(),
            index,
        }))
    }

    async fn info(&self) -> DriverResult<Vec<InfoSection>> {
        self.conn.check("INFO")?;
        let store = &self.conn.store;
        if store.faults.info.load(Ordering::SeqCst) {
            return Err(DriverError::command("INFO", "ERR unknown command 'INFO'"));
        }

        let now = Instant::now();
        let databases = store.databases.lock();
        let used_memory: u64 = databases
            .values()
            .flat_map(|db| db.iter())
            .filter(|(_, entry)| !entry.is_expired(now))
            .map(|(key, entry)| key.len() as u64 + entry.value.approximate_bytes())
            .sum();

        let mut keyspace = InfoSection::new("Keyspace");
        for (index, db) in databases.iter() {
            let live = db.values().filter(|e| !e.is_expired(now)).count();
            let expires = db
                .values()
                .filter(|e| e.expires_at.is_some() && !e.is_expired(now))
                .count();
            if live > 0 {
                keyspace = keyspace.with_field(
                    format!("db{}", index),
                    format!("keys={},expires={},avg_ttl=0", live, expires),
                );
            }
        }

        Ok(vec![
            InfoSection::new("Server")
                .with_field("redis_version", store.version.lock().clone())
                .with_field("redis_mode", "standalone")
                .with_field(
                    "uptime_in_seconds",
                    store.started.elapsed().as_secs().to_string(),
                ),
            InfoSection::new("Clients").with_field(
                "connected_clients",
                store.open.load(Ordering::SeqCst).to_string(),
            ),
            InfoSection::new("Memory").with_field("used_memory", used_memory.to_string()),
            InfoSection::new("Stats").with_field(
                "total_commands_processed",
                store.commands_processed.load(Ordering::Relaxed).to_string(),
            ),
            keyspace,
        ])
    }

    async fn database_size(&self, index: i64) -> DriverResult<u64> {
        self.conn.check("DBSIZE")?;
        if self.conn.store.faults.database_size.load(Ordering::SeqCst) {
            return Err(DriverError::unsupported(
                "DBSIZE",
                "not available on this topology",
            ));
        }
        Ok(self.conn.with_database(index, |db| db.len() as u64))
    }
}

struct MemoryDatabase {
    conn: Arc<ConnState>,
    index: i64,
}

struct ScanState {
    conn: Arc<ConnState>,
    index: i64,
    pattern: String,
    count: usize,
    cursor: Option<String>,
    page: std::vec::IntoIter<String>,
    produced: usize,
    finished: bool,
}

impl ScanState {
    /// Fetch the next page of matching names after the cursor
    fn next_page(&mut self) -> DriverResult<()> {
        self.conn.check("SCAN")?;
        let lower = match &self.cursor {
            Some(after) => Bound::Excluded(after.clone()),
            None => Bound::Unbounded,
        };
        let count = self.count.max(1);
        let pattern = self.pattern.clone();

        let (names, last) = self.conn.with_database(self.index, |db| {
            let window: Vec<String> = db
                .range::<String, _>((lower, Bound::Unbounded))
                .take(count)
                .map(|(k, _)| k.clone())
                .collect();
            let last = window.last().cloned();
            let names = window
                .into_iter()
                .filter(|name| glob_match(&pattern, name))
                .collect::<Vec<_>>();
            (names, last)
        });

        match last {
            Some(last) => self.cursor = Some(last),
            None => self.finished = true,
        }
        self.page = names.into_iter();
        Ok(())
    }

    fn next_name(&mut self) -> Option<DriverResult<String>> {
        loop {
            if let Some(name) = self.page.next() {
                if let Some(limit) = *self.conn.store.faults.scan_after.lock() {
                    if self.produced >= limit {
                        self.finished = true;
                        self.page = Vec::new().into_iter();
                        return Some(Err(DriverError::connection("connection lost during SCAN")));
                    }
                }
                self.produced += 1;
                return Some(Ok(name));
            }
            if self.finished {
                return None;
            }
            if let Err(e) = self.next_page() {
                self.finished = true;
                return Some(Err(e));
            }
        }
    }
}

#[async_trait]
impl DatabaseHandle for MemoryDatabase {
    fn scan_keys(&self, pattern: &str, count: usize) -> BoxStream<'static, DriverResult<String>> {
        let state = ScanState {
            conn: self.conn.clone(),
            index: self.index,
            pattern: pattern.to_string(),
            count,
            cursor: None,
            page: Vec::new().into_iter(),
            produced: 0,
            finished: false,
        };

        stream::unfold(state, |mut state| async move {
            state.next_name().map(|item| (item, state))
        })
        .boxed()
    }

    async fn key_type(&self, key: &str) -> DriverResult<KeyType> {
        self.conn.check("TYPE")?;
        Ok(self.conn.with_database(self.index, |db| {
            db.get(key)
                .map(|entry| entry.value.key_type())
                .unwrap_or(KeyType::Unknown)
        }))
    }

    async fn ttl(&self, key: &str) -> DriverResult<Option<Duration>> {
        self.conn.check("PTTL")?;
        let now = Instant::now();
        Ok(self.conn.with_database(self.index, |db| {
            db.get(key)
                .and_then(|entry| entry.expires_at)
                .map(|at| at.saturating_duration_since(now))
        }))
    }

    async fn string_length(&self, key: &str) -> DriverResult<u64> {
        self.conn.check("STRLEN")?;
        if self.conn.store.faults.string_length.load(Ordering::SeqCst) {
            return Err(DriverError::timeout("STRLEN"));
        }
        self.conn.with_database(self.index, |db| match db.get(key) {
            None => Ok(0),
            Some(Entry {
                value: MemoryValue::String(s),
                ..
            }) => Ok(s.len() as u64),
            Some(_) => Err(wrong_type("STRLEN")),
        })
    }

    async fn get(&self, key: &str) -> DriverResult<Option<String>> {
        self.conn.check("GET")?;
        self.conn.with_database(self.index, |db| match db.get(key) {
            None => Ok(None),
            Some(Entry {
                value: MemoryValue::String(s),
                ..
            }) => Ok(Some(s.clone())),
            Some(_) => Err(wrong_type("GET")),
        })
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> DriverResult<bool> {
        self.conn.check("SET")?;
        if ttl.map(|t| t.is_zero()).unwrap_or(false) {
            return Err(DriverError::command("SET", "ERR invalid expire time in 'set' command"));
        }
        let expires_at = ttl.map(|t| Instant::now() + t);
        self.conn.with_database(self.index, |db| {
            db.insert(
                key.to_string(),
                Entry {
                    value: MemoryValue::String(value.to_string()),
                    expires_at,
                },
            );
        });
        Ok(true)
    }

    async fn delete(&self, key: &str) -> DriverResult<bool> {
        self.conn.check("DEL")?;
        Ok(self
            .conn
            .with_database(self.index, |db| db.remove(key).is_some()))
    }
}

fn wrong_type(command: &str) -> DriverError {
    DriverError::command(
        command,
        "WRONGTYPE Operation against a key holding the wrong kind of value",
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    async fn connect(driver: &MemoryDriver) -> (Arc<dyn StoreHandle>, Arc<dyn DatabaseHandle>) {
        let handle = driver
            .connect("localhost:6379,defaultDatabase=0", &DriverTimeouts::default())
            .await
            .unwrap();
        let db = handle.select_database(0).await.unwrap();
        (handle, db)
    }

    #[tokio::test]
    async fn test_scan_pages_through_matching_keys() {
        let driver = MemoryDriver::new();
        for i in 0..25 {
            driver.insert(0, &format!("user:{:02}", i), MemoryValue::String("x".into()));
        }
        driver.insert(0, "session:1", MemoryValue::String("y".into()));

        let (_handle, db) = connect(&driver).await;
        let names: Vec<String> = db.scan_keys("user:*", 4).try_collect().await.unwrap();
        assert_eq!(names.len(), 25);
        assert!(names.iter().all(|n| n.starts_with("user:")));
    }

    #[tokio::test]
    async fn test_scan_failure_after_limit() {
        let driver = MemoryDriver::new();
        for i in 0..5 {
            driver.insert(0, &format!("k{}", i), MemoryValue::String("v".into()));
        }
        driver.fail_scan_after(Some(2));

        let (_handle, db) = connect(&driver).await;
        let items: Vec<DriverResult<String>> = db.scan_keys("*", 10).collect().await;
        assert_eq!(items.len(), 3);
        assert!(items[0].is_ok() && items[1].is_ok());
        assert!(items[2].is_err());
    }

    #[tokio::test]
    async fn test_scan_failure_ends_stream_mid_page() {
        let driver = MemoryDriver::new();
        for i in 0..8 {
            driver.insert(0, &format!("k{}", i), MemoryValue::String("v".into()));
        }
        driver.fail_scan_after(Some(0));

        let (_handle, db) = connect(&driver).await;
        let items: Vec<DriverResult<String>> = db.scan_keys("*", 100).collect().await;
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(DriverError::Connection { .. })));
    }

    #[tokio::test]
    async fn test_closed_handle_rejects_commands() {
        let driver = MemoryDriver::new();
        let (handle, db) = connect(&driver).await;
        assert_eq!(driver.open_connections(), 1);

        handle.close().await.unwrap();
        handle.close().await.unwrap();
        assert_eq!(driver.open_connections(), 0);
        assert!(!handle.is_connected());
        assert_eq!(db.get("k").await, Err(DriverError::Closed));
    }

    #[tokio::test]
    async fn test_select_out_of_range() {
        let driver = MemoryDriver::new();
        let (handle, _) = connect(&driver).await;
        assert!(handle.select_database(16).await.is_err());
        assert!(handle.select_database(-1).await.is_err());
    }

    #[tokio::test]
    async fn test_expired_keys_disappear() {
        let driver = MemoryDriver::new();
        driver.insert_with_ttl(0, "short", MemoryValue::String("v".into()), Duration::from_millis(20));
        let (_handle, db) = connect(&driver).await;
        assert!(db.ttl("short").await.unwrap().is_some());

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(db.get("short").await.unwrap(), None);
        assert!(!driver.contains(0, "short"));
    }

    #[tokio::test]
    async fn test_info_reports_keyspace() {
        let driver = MemoryDriver::new().with_version("7.0.0");
        driver.insert(0, "a", MemoryValue::String("v".into()));
        let (handle, _) = connect(&driver).await;

        let sections = handle.info().await.unwrap();
        let server = sections.iter().find(|s| s.name == "Server").unwrap();
        assert!(server
            .fields
            .contains(&("redis_version".to_string(), "7.0.0".to_string())));
        let keyspace = sections.iter().find(|s| s.name == "Keyspace").unwrap();
        assert_eq!(keyspace.fields[0].0, "db0");
    }
}
