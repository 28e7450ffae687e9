/// Saved connection profiles
///
/// The registry keeps profiles in memory, in insertion order. Durable storage
/// sits behind `ProfileStore`; the default store keeps nothing.

use crate::core::profile::{DEFAULT_HOST, DEFAULT_PORT};
use crate::core::ConnectionProfile;
use crate::error::{MiradorError, ProfileError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

pub const DEFAULT_PROFILE_NAME: &str = "Local Redis";

/// Load/save interface for profile persistence
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn load_all(&self) -> Result<Vec<ConnectionProfile>, ProfileError>;

    async fn save_all(&self, profiles: &[ConnectionProfile]) -> Result<(), ProfileError>;
}

/// Store that persists nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProfileStore;

#[async_trait]
impl ProfileStore for NoopProfileStore {
    async fn load_all(&self) -> Result<Vec<ConnectionProfile>, ProfileError> {
        Ok(Vec::new())
    }

    async fn save_all(&self, _profiles: &[ConnectionProfile]) -> Result<(), ProfileError> {
        Ok(())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ProfileFile {
    #[serde(default)]
    profiles: Vec<ConnectionProfile>,
}

/// Profiles kept in a TOML file as a `[[profiles]]` array
#[derive(Debug, Clone)]
pub struct TomlProfileStore {
    path: PathBuf,
}

impl TomlProfileStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ProfileStore for TomlProfileStore {
    async fn load_all(&self) -> Result<Vec<ConnectionProfile>, ProfileError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(ProfileError::Io(e.to_string())),
        };

        let file: ProfileFile =
            toml::from_str(&content).map_err(|e| ProfileError::Parse(e.to_string()))?;
        Ok(file.profiles)
    }

    async fn save_all(&self, profiles: &[ConnectionProfile]) -> Result<(), ProfileError> {
        let file = ProfileFile {
            profiles: profiles.to_vec(),
        };
        let content =
            toml::to_string_pretty(&file).map_err(|e| ProfileError::Serialize(e.to_string()))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ProfileError::Io(e.to_string()))?;
        }
        tokio::fs::write(&self.path, content)
            .await
            .map_err(|e| ProfileError::Io(e.to_string()))
    }
}

/// Ordered in-memory collection of profiles backed by a `ProfileStore`
///
/// Changes and the save that follows them run under one write lock, so the
/// store always ends up holding the latest list.
pub struct ProfileRegistry {
    store: Arc<dyn ProfileStore>,
    profiles: RwLock<Vec<ConnectionProfile>>,
    writes: Mutex<()>,
}

impl ProfileRegistry {
    pub fn new(store: Arc<dyn ProfileStore>) -> Self {
        Self {
            store,
            profiles: RwLock::new(Vec::new()),
            writes: Mutex::new(()),
        }
    }

    /// Replace the in-memory list with the stored one. An empty or unreadable
    /// store yields the single default local profile.
    pub async fn load(&self) -> usize {
        let _write = self.writes.lock().await;
        let loaded = match self.store.load_all().await {
            Ok(profiles) => profiles,
            Err(e) => {
                MiradorError::from(e).log("load saved profiles");
                Vec::new()
            }
        };

        let profiles = if loaded.is_empty() {
            vec![ConnectionProfile::new(DEFAULT_PROFILE_NAME, DEFAULT_HOST, DEFAULT_PORT)]
        } else {
            loaded
        };

        let count = profiles.len();
        *self.profiles.write().await = profiles;
        debug!("Loaded {} connection profiles", count);
        count
    }

    pub async fn list(&self) -> Vec<ConnectionProfile> {
        self.profiles.read().await.clone()
    }

    pub async fn get(&self, id: &str) -> Option<ConnectionProfile> {
        self.profiles
            .read()
            .await
            .iter()
            .find(|p| p.id == id)
            .cloned()
    }

    pub async fn find_by_name(&self, name: &str) -> Option<ConnectionProfile> {
        self.profiles
            .read()
            .await
            .iter()
            .find(|p| p.name == name)
            .cloned()
    }

    /// Append `profile`, or replace the stored profile with the same id
    pub async fn add(&self, profile: ConnectionProfile) {
        let _write = self.writes.lock().await;
        let snapshot = {
            let mut profiles = self.profiles.write().await;
            match profiles.iter_mut().find(|p| p.id == profile.id) {
                Some(existing) => *existing = profile,
                None => profiles.push(profile),
            }
            profiles.clone()
        };
        self.persist(&snapshot).await;
    }

    /// Remove the profile with `id`; `false` if there was none
    pub async fn remove(&self, id: &str) -> bool {
        let _write = self.writes.lock().await;
        let snapshot = {
            let mut profiles = self.profiles.write().await;
            let before = profiles.len();
            profiles.retain(|p| p.id != id);
            if profiles.len() == before {
                return false;
            }
            profiles.clone()
        };
        self.persist(&snapshot).await;
        true
    }

    /// Caller must hold the write lock
    async fn persist(&self, profiles: &[ConnectionProfile]) {
        if let Err(e) = self.store.save_all(profiles).await {
            MiradorError::from(e).log("save connection profiles");
        }
    }
}
