/// Server statistics collection
pub mod parser;

use crate::core::{ConnectionSession, ServerSnapshot};
use crate::error::MiradorResult;
use crate::monitor::SnapshotSource;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::debug;

/// Collects `ServerSnapshot`s through the active session
pub struct ServerStatsCollector {
    session: Arc<ConnectionSession>,
    latest: RwLock<ServerSnapshot>,
}

impl ServerStatsCollector {
    pub fn new(session: Arc<ConnectionSession>) -> Self {
        Self {
            session,
            latest: RwLock::new(ServerSnapshot::default()),
        }
    }

    /// Fresh snapshot of the server. All-default when disconnected or when
    /// the report cannot be fetched.
    pub async fn collect(&self) -> ServerSnapshot {
        let snapshot = match self.try_collect().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                e.log("collect server info");
                ServerSnapshot::default()
            }
        };

        *self.latest.write() = snapshot.clone();
        snapshot
    }

    /// Last snapshot produced by `collect`
    pub fn server_info(&self) -> ServerSnapshot {
        self.latest.read().clone()
    }

    async fn try_collect(&self) -> MiradorResult<ServerSnapshot> {
        let active = self.session.active().await?;

        let sections = active.handle.info().await?;
        let mut snapshot = parser::parse_snapshot(&sections);

        // DBSIZE is missing on some topologies (cluster proxies); the rest of
        // the snapshot is still worth returning
        snapshot.total_keys = match active.handle.database_size(active.profile.database).await {
            Ok(count) => count,
            Err(e) => {
                debug!("DBSIZE unavailable, reporting 0 keys: {}", e);
                0
            }
        };

        Ok(snapshot)
    }
}

#[async_trait]
impl SnapshotSource for ServerStatsCollector {
    async fn snapshot(&self) -> MiradorResult<ServerSnapshot> {
        Ok(self.collect().await)
    }
}
