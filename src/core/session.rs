/// Connection session: owns at most one live driver connection
///
/// Lifecycle transitions (connect/disconnect) are serialized through a single
/// mutex. The handle, the selected database and the profile live in one
/// `Option` so observers see either all of them or none.

use super::ConnectionProfile;
use crate::driver::{DatabaseHandle, DriverTimeouts, StoreDriver, StoreHandle};
use crate::error::{MiradorError, MiradorResult};
use std::sync::Arc;
use tokio::sync::{watch, Mutex, RwLock};
use tracing::{debug, info, warn};

/// State held while connected
#[derive(Clone)]
pub(crate) struct ActiveSession {
    pub handle: Arc<dyn StoreHandle>,
    pub database: Arc<dyn DatabaseHandle>,
    pub profile: ConnectionProfile,
}

pub struct ConnectionSession {
    driver: Arc<dyn StoreDriver>,
    timeouts: DriverTimeouts,
    lifecycle: Mutex<()>,
    state: RwLock<Option<ActiveSession>>,
    profile_tx: watch::Sender<Option<ConnectionProfile>>,
}

impl ConnectionSession {
    pub fn new(driver: Arc<dyn StoreDriver>) -> Self {
        Self::with_timeouts(driver, DriverTimeouts::default())
    }

    pub fn with_timeouts(driver: Arc<dyn StoreDriver>, timeouts: DriverTimeouts) -> Self {
        let (profile_tx, _) = watch::channel(None);
        Self {
            driver,
            timeouts,
            lifecycle: Mutex::new(()),
            state: RwLock::new(None),
            profile_tx,
        }
    }

    pub fn timeouts(&self) -> DriverTimeouts {
        self.timeouts
    }

    /// Connect with `profile`, replacing any active session.
    /// Returns `false` on any failure; the session is then disconnected.
    pub async fn connect(&self, profile: ConnectionProfile) -> bool {
        let _guard = self.lifecycle.lock().await;

        self.teardown().await;

        info!(
            "Connecting to {}:{} (db {}) via {} driver",
            profile.host,
            profile.port,
            profile.database,
            self.driver.name()
        );

        match self.open(&profile).await {
            Ok(active) => {
                *self.state.write().await = Some(active);
                info!("Connected to {}", display_name(&profile));
                self.profile_tx.send_replace(Some(profile));
                true
            }
            Err(e) => {
                warn!("Failed to connect to {}: {}", display_name(&profile), e);
                false
            }
        }
    }

    async fn open(&self, profile: &ConnectionProfile) -> MiradorResult<ActiveSession> {
        let handle = self
            .driver
            .connect(&profile.descriptor(), &self.timeouts)
            .await?;

        let database = match handle.select_database(profile.database).await {
            Ok(database) => database,
            Err(e) => {
                if let Err(close_err) = handle.close().await {
                    debug!("Ignoring close error after failed select: {}", close_err);
                }
                return Err(e.into());
            }
        };

        Ok(ActiveSession {
            handle,
            database,
            profile: profile.clone(),
        })
    }

    /// Close the active session, if any
    pub async fn disconnect(&self) {
        let _guard = self.lifecycle.lock().await;
        self.teardown().await;
    }

    /// Caller must hold the lifecycle lock
    async fn teardown(&self) {
        let previous = self.state.write().await.take();
        let Some(active) = previous else {
            return;
        };

        self.profile_tx.send_replace(None);
        if let Err(e) = active.handle.close().await {
            debug!("Ignoring close error during disconnect: {}", e);
        }
        info!("Disconnected from {}", display_name(&active.profile));
    }

    /// True when a session is active and the driver reports it live
    pub async fn is_connected(&self) -> bool {
        self.state
            .read()
            .await
            .as_ref()
            .map(|active| active.handle.is_connected())
            .unwrap_or(false)
    }

    pub async fn current_profile(&self) -> Option<ConnectionProfile> {
        self.state
            .read()
            .await
            .as_ref()
            .map(|active| active.profile.clone())
    }

    /// Change notifications for the active profile (`None` = disconnected)
    pub fn subscribe(&self) -> watch::Receiver<Option<ConnectionProfile>> {
        self.profile_tx.subscribe()
    }

    /// Snapshot of the active session for a single operation.
    /// The lock is released before any network I/O happens.
    pub(crate) async fn active(&self) -> MiradorResult<ActiveSession> {
        let state = self.state.read().await;
        match state.as_ref() {
            Some(active) if active.handle.is_connected() => Ok(active.clone()),
            _ => Err(MiradorError::NotConnected),
        }
    }
}

impl Drop for ConnectionSession {
    fn drop(&mut self) {
        let Some(active) = self.state.get_mut().take() else {
            return;
        };

        debug!("Session dropped while connected, closing {}", active.profile.host);
        // Best effort: close on the runtime when there is one, otherwise the
        // handle is simply released.
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(async move {
                if let Err(e) = active.handle.close().await {
                    debug!("Ignoring close error during disposal: {}", e);
                }
            });
        }
    }
}

fn display_name(profile: &ConnectionProfile) -> String {
    if profile.name.is_empty() {
        format!("{}:{}", profile.host, profile.port)
    } else {
        profile.name.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::MemoryDriver;

    fn session_with(driver: MemoryDriver) -> (ConnectionSession, MemoryDriver) {
        let session = ConnectionSession::new(Arc::new(driver.clone()));
        (session, driver)
    }

    #[tokio::test]
    async fn test_connect_and_disconnect() {
        let (session, _) = session_with(MemoryDriver::new());
        let profile = ConnectionProfile::new("local", "localhost", 6379);

        assert!(session.connect(profile.clone()).await);
        assert!(session.is_connected().await);
        assert_eq!(session.current_profile().await, Some(profile));

        session.disconnect().await;
        assert!(!session.is_connected().await);
        assert!(session.current_profile().await.is_none());
        assert!(session.active().await.is_err());
    }

    #[tokio::test]
    async fn test_unreachable_host_leaves_session_disconnected() {
        let (session, _) = session_with(MemoryDriver::new().with_unreachable_host("10.255.255.1"));
        let profile = ConnectionProfile::new("bad", "10.255.255.1", 6379);

        assert!(!session.connect(profile).await);
        assert!(!session.is_connected().await);
        assert!(session.current_profile().await.is_none());
    }

    #[tokio::test]
    async fn test_failed_reconnect_drops_previous_session() {
        let (session, _) = session_with(MemoryDriver::new().with_unreachable_host("down"));
        assert!(session.connect(ConnectionProfile::new("a", "up", 6379)).await);

        assert!(!session.connect(ConnectionProfile::new("b", "down", 6379)).await);
        assert!(!session.is_connected().await);
        assert!(session.current_profile().await.is_none());
    }

    #[tokio::test]
    async fn test_reconnect_replaces_profile() {
        let (session, driver) = session_with(MemoryDriver::new());
        let first = ConnectionProfile::new("first", "localhost", 6379);
        let second = ConnectionProfile::new("second", "localhost", 6379).with_database(1);

        assert!(session.connect(first).await);
        assert!(session.connect(second.clone()).await);
        assert_eq!(session.current_profile().await, Some(second));
        assert_eq!(driver.open_connections(), 1);
    }

    #[tokio::test]
    async fn test_disconnect_when_not_connected_is_noop() {
        let (session, _) = session_with(MemoryDriver::new());
        session.disconnect().await;
        session.disconnect().await;
        assert!(!session.is_connected().await);
    }

    #[tokio::test]
    async fn test_dropped_connection_reports_disconnected() {
        let (session, driver) = session_with(MemoryDriver::new());
        assert!(session.connect(ConnectionProfile::default()).await);

        driver.drop_connections();
        assert!(!session.is_connected().await);
        // The profile stays until an explicit disconnect; no auto-recovery.
        assert!(session.current_profile().await.is_some());
    }

    #[tokio::test]
    async fn test_profile_notifications() {
        let (session, _) = session_with(MemoryDriver::new());
        let mut rx = session.subscribe();
        assert!(rx.borrow().is_none());

        let profile = ConnectionProfile::new("watched", "localhost", 6379);
        assert!(session.connect(profile.clone()).await);
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().as_ref().map(|p| p.name.clone()), Some("watched".to_string()));

        session.disconnect().await;
        rx.changed().await.unwrap();
        assert!(rx.borrow().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_connects_leave_one_session() {
        let driver = MemoryDriver::new();
        let session = Arc::new(ConnectionSession::new(Arc::new(driver.clone())));

        let mut tasks = Vec::new();
        for i in 0..8 {
            let session = session.clone();
            tasks.push(tokio::spawn(async move {
                session
                    .connect(ConnectionProfile::new(format!("c{}", i), "localhost", 6379))
                    .await
            }));
        }
        for task in tasks {
            assert!(task.await.unwrap());
        }

        assert!(session.is_connected().await);
        assert_eq!(driver.open_connections(), 1);
    }

    #[tokio::test]
    async fn test_drop_closes_connection() {
        let driver = MemoryDriver::new();
        {
            let session = ConnectionSession::new(Arc::new(driver.clone()));
            assert!(session.connect(ConnectionProfile::default()).await);
        }
        // close runs on a spawned task
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;
        assert_eq!(driver.open_connections(), 0);
    }

    #[test]
    fn test_drop_without_runtime_does_not_panic() {
        let driver = MemoryDriver::new();
        let session = {
            let runtime = tokio::runtime::Runtime::new().unwrap();
            let session = ConnectionSession::new(Arc::new(driver));
            assert!(runtime.block_on(session.connect(ConnectionProfile::default())));
            session
        };
        drop(session);
    }
}
