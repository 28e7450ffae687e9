pub mod config;
pub mod error;
/// Mirador - session and data-access core for Redis-compatible key-value stores
///
/// One `ConnectionSession` owns the live connection; the services borrow it:
/// 1. Key catalog: glob enumeration with per-key type, size and TTL
/// 2. Value access: string get/set/delete
/// 3. Server statistics: `INFO` snapshots, polled by the monitoring loop
pub mod core;
pub mod driver;
pub mod keys;
pub mod monitor;
pub mod profiles;
pub mod stats;
pub mod utils;
pub mod values;

use std::path::Path;
use std::sync::Arc;
use tracing::info;

pub use crate::config::Config;
pub use crate::core::{
    ConnectionProfile, ConnectionSession, KeyDescriptor, KeyType, ServerSnapshot,
};
pub use crate::error::{DriverError, MiradorError, MiradorResult};

use crate::driver::{RedisDriver, StoreDriver};
use crate::keys::KeyCatalogService;
use crate::monitor::MonitoringLoop;
use crate::profiles::{NoopProfileStore, ProfileRegistry, ProfileStore, TomlProfileStore};
use crate::stats::ServerStatsCollector;
use crate::values::ValueAccessService;

/// All services wired around one shared session
pub struct Mirador {
    config: Config,
    session: Arc<ConnectionSession>,
    catalog: KeyCatalogService,
    values: ValueAccessService,
    stats: Arc<ServerStatsCollector>,
    monitor: MonitoringLoop,
    profiles: ProfileRegistry,
}

impl Mirador {
    pub fn new(config: Config, driver: Arc<dyn StoreDriver>) -> Self {
        let driver_name = driver.name();
        let session = Arc::new(ConnectionSession::with_timeouts(driver, config.timeouts()));
        let stats = Arc::new(ServerStatsCollector::new(session.clone()));
        let monitor = MonitoringLoop::with_interval(stats.clone(), config.monitor_interval());

        let store: Arc<dyn ProfileStore> = match &config.profiles.file {
            Some(file) => Arc::new(TomlProfileStore::new(file)),
            None => Arc::new(NoopProfileStore),
        };

        info!(
            "Mirador v{} using the {} driver",
            env!("CARGO_PKG_VERSION"),
            driver_name
        );

        Self {
            catalog: KeyCatalogService::with_scan_count(session.clone(), config.catalog.scan_count),
            values: ValueAccessService::new(session.clone()),
            profiles: ProfileRegistry::new(store),
            config,
            session,
            stats,
            monitor,
        }
    }

    /// Wire everything to the Redis driver
    pub fn with_redis(config: Config) -> Self {
        Self::new(config, Arc::new(RedisDriver::new()))
    }

    /// Load and validate a TOML config, then wire it to the Redis driver
    pub fn from_config_file<P: AsRef<Path>>(path: P) -> MiradorResult<Self> {
        let config = Config::load_from_file(path)?;
        Ok(Self::with_redis(config))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn session(&self) -> &Arc<ConnectionSession> {
        &self.session
    }

    pub fn catalog(&self) -> &KeyCatalogService {
        &self.catalog
    }

    pub fn values(&self) -> &ValueAccessService {
        &self.values
    }

    pub fn stats(&self) -> &Arc<ServerStatsCollector> {
        &self.stats
    }

    pub fn monitor(&self) -> &MonitoringLoop {
        &self.monitor
    }

    pub fn profiles(&self) -> &ProfileRegistry {
        &self.profiles
    }

    /// Keys matching `pattern`, or the configured default pattern
    pub async fn keys(&self, pattern: Option<&str>) -> Vec<KeyDescriptor> {
        let pattern = pattern.unwrap_or(self.config.catalog.default_pattern.as_str());
        self.catalog.list_keys(pattern).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::memory::MemoryValue;
    use crate::driver::MemoryDriver;
    use crate::monitor::MonitorStatus;
    use std::time::Duration;
    use tempfile::TempDir;

    fn mirador(driver: &MemoryDriver, config: Config) -> Mirador {
        Mirador::new(config, Arc::new(driver.clone()))
    }

    #[tokio::test]
    async fn test_services_share_one_session() {
        let driver = MemoryDriver::new();
        let mirador = mirador(&driver, Config::default());

        assert!(mirador.keys(None).await.is_empty());
        assert!(mirador.session().connect(ConnectionProfile::default()).await);

        assert!(mirador.values().set("greeting", "hello", None).await);
        let keys = mirador.keys(None).await;
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].key_type, KeyType::String);
        assert_eq!(keys[0].size, 5);

        let snapshot = mirador.stats().collect().await;
        assert_eq!(snapshot.total_keys, 1);

        mirador.session().disconnect().await;
        assert_eq!(mirador.values().get("greeting").await, None);
        assert!(mirador.stats().collect().await.is_empty());
    }

    #[tokio::test]
    async fn test_configured_default_pattern() {
        let driver = MemoryDriver::new();
        driver.insert(0, "user:1", MemoryValue::String("a".into()));
        driver.insert(0, "order:1", MemoryValue::String("b".into()));

        let mut config = Config::default();
        config.catalog.default_pattern = "user:*".to_string();
        let mirador = mirador(&driver, config);
        assert!(mirador.session().connect(ConnectionProfile::default()).await);

        let names: Vec<String> = mirador.keys(None).await.into_iter().map(|k| k.name).collect();
        assert_eq!(names, vec!["user:1"]);
        assert_eq!(mirador.keys(Some("*")).await.len(), 2);
    }

    #[tokio::test]
    async fn test_monitor_uses_configured_interval() {
        let driver = MemoryDriver::new();
        let mut config = Config::default();
        config.monitor.interval_ms = 20;
        let mirador = mirador(&driver, config);
        assert_eq!(mirador.monitor().interval(), Duration::from_millis(20));

        assert!(mirador.session().connect(ConnectionProfile::default()).await);
        let mut snapshots = mirador.monitor().subscribe();
        assert!(mirador.monitor().start());

        let snapshot = tokio::time::timeout(Duration::from_secs(2), snapshots.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(!snapshot.version.is_empty());

        mirador.monitor().stop();
        assert_eq!(mirador.monitor().status(), MonitorStatus::Stopped);
    }

    #[test]
    fn test_from_config_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mirador.toml");
        std::fs::write(&path, "[monitor]\ninterval_ms = 250\n").unwrap();

        let mirador = Mirador::from_config_file(&path).unwrap();
        assert_eq!(mirador.config().monitor.interval_ms, 250);
        assert_eq!(mirador.config().catalog.scan_count, Config::default().catalog.scan_count);

        std::fs::write(&path, "[monitor]\ninterval_ms = 0\n").unwrap();
        assert!(matches!(
            Mirador::from_config_file(&path),
            Err(MiradorError::Config(_))
        ));
        assert!(matches!(
            Mirador::from_config_file(dir.path().join("missing.toml")),
            Err(MiradorError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_profile_file_from_config() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("profiles.toml");

        let mut config = Config::default();
        config.profiles.file = Some(file.to_string_lossy().into_owned());

        let first = mirador(&MemoryDriver::new(), config.clone());
        first.profiles().load().await;
        first
            .profiles()
            .add(ConnectionProfile::new("staging", "10.0.0.5", 6380))
            .await;

        let second = mirador(&MemoryDriver::new(), config);
        assert_eq!(second.profiles().load().await, 2);
        assert!(second.profiles().find_by_name("staging").await.is_some());
    }
}
