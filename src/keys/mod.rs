/// Key enumeration for the active database
pub mod resolver;

use crate::core::{ConnectionSession, KeyDescriptor};
use crate::error::MiradorResult;
use futures::stream::{self, BoxStream, StreamExt};
use std::sync::Arc;
use tracing::{debug, warn};

pub use resolver::KeyDescriptorResolver;

pub const DEFAULT_PATTERN: &str = "*";
pub const DEFAULT_SCAN_COUNT: usize = 250;

/// Enumerates keys matching a glob and resolves their metadata
pub struct KeyCatalogService {
    session: Arc<ConnectionSession>,
    resolver: KeyDescriptorResolver,
    scan_count: usize,
}

impl KeyCatalogService {
    pub fn new(session: Arc<ConnectionSession>) -> Self {
        Self::with_scan_count(session, DEFAULT_SCAN_COUNT)
    }

    pub fn with_scan_count(session: Arc<ConnectionSession>, scan_count: usize) -> Self {
        Self {
            session,
            resolver: KeyDescriptorResolver::new(),
            scan_count: scan_count.max(1),
        }
    }

    /// All keys matching `pattern` (`*` when empty), in scan order.
    ///
    /// Returns an empty list when disconnected. If the scan breaks partway,
    /// the keys gathered so far are discarded and the result is empty.
    pub async fn list_keys(&self, pattern: &str) -> Vec<KeyDescriptor> {
        match self.try_list_keys(pattern).await {
            Ok(keys) => {
                debug!("Listed {} keys matching {:?}", keys.len(), pattern);
                keys
            }
            Err(e) => {
                e.log("list keys");
                Vec::new()
            }
        }
    }

    async fn try_list_keys(&self, pattern: &str) -> MiradorResult<Vec<KeyDescriptor>> {
        let active = self.session.active().await?;
        let database = active.database;
        let mut names = database.scan_keys(effective_pattern(pattern), self.scan_count);

        let mut keys = Vec::new();
        while let Some(name) = names.next().await {
            let name = name?;
            keys.push(self.resolver.resolve(database.as_ref(), name).await);
        }
        Ok(keys)
    }

    /// Streaming form of `list_keys`. Descriptors are produced as the scan
    /// advances; a scan failure ends the stream, keeping what was already
    /// yielded. Empty when disconnected.
    pub async fn key_stream(&self, pattern: &str) -> BoxStream<'static, KeyDescriptor> {
        let active = match self.session.active().await {
            Ok(active) => active,
            Err(e) => {
                e.log("stream keys");
                return stream::empty().boxed();
            }
        };

        let database = active.database;
        let resolver = self.resolver;
        let names = database.scan_keys(effective_pattern(pattern), self.scan_count);

        names
            .take_while(|name| {
                let keep = match name {
                    Ok(_) => true,
                    Err(e) => {
                        warn!("Key scan ended early: {}", e);
                        false
                    }
                };
                futures::future::ready(keep)
            })
            .filter_map(|name| futures::future::ready(name.ok()))
            .then(move |name| {
                let database = database.clone();
                async move { resolver.resolve(database.as_ref(), name).await }
            })
            .boxed()
    }
}

fn effective_pattern(pattern: &str) -> &str {
    if pattern.trim().is_empty() {
        DEFAULT_PATTERN
    } else {
        pattern
    }
}
