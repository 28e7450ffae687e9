/// Single-key value access: get, set, delete
///
/// Each call is independent; there is no atomicity across keys.

use crate::core::ConnectionSession;
use crate::error::MiradorResult;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub struct ValueAccessService {
    session: Arc<ConnectionSession>,
}

impl ValueAccessService {
    pub fn new(session: Arc<ConnectionSession>) -> Self {
        Self { session }
    }

    /// String value of `key`; `None` when disconnected, missing, or on error
    pub async fn get(&self, key: &str) -> Option<String> {
        match self.try_get(key).await {
            Ok(value) => value,
            Err(e) => {
                e.log("get value");
                None
            }
        }
    }

    async fn try_get(&self, key: &str) -> MiradorResult<Option<String>> {
        let active = self.session.active().await?;
        Ok(active.database.get(key).await?)
    }

    /// Store `value` under `key`, optionally expiring after `ttl`.
    /// `true` only once the server confirmed the write.
    pub async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> bool {
        if key.is_empty() {
            debug!("Refusing to set a value under an empty key name");
            return false;
        }

        match self.try_set(key, value, ttl).await {
            Ok(written) => written,
            Err(e) => {
                e.log("set value");
                false
            }
        }
    }

    async fn try_set(&self, key: &str, value: &str, ttl: Option<Duration>) -> MiradorResult<bool> {
        let active = self.session.active().await?;
        Ok(active.database.set(key, value, ttl).await?)
    }

    /// Remove `key`; `true` only if a key was actually removed
    pub async fn delete(&self, key: &str) -> bool {
        match self.try_delete(key).await {
            Ok(removed) => removed,
            Err(e) => {
                e.log("delete key");
                false
            }
        }
    }

    async fn try_delete(&self, key: &str) -> MiradorResult<bool> {
        let active = self.session.active().await?;
        Ok(active.database.delete(key).await?)
    }
}
