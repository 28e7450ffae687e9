/// Per-key metadata resolution
///
/// Three probes feed a descriptor: type, time-to-live and (for strings only)
/// length. Length probes on composite types are either rejected by the
/// server or cost a full scan of the value, so they are never issued inside
/// an enumeration. A failing probe zeroes its own field and nothing else.

use crate::core::{KeyDescriptor, KeyType};
use crate::driver::DatabaseHandle;
use crate::error::DriverResult;
use std::time::Duration;
use tracing::trace;

#[derive(Debug, Default, Clone, Copy)]
pub struct KeyDescriptorResolver;

impl KeyDescriptorResolver {
    pub fn new() -> Self {
        Self
    }

    /// Probe `name` against `db` and build its descriptor
    pub async fn resolve(&self, db: &dyn DatabaseHandle, name: String) -> KeyDescriptor {
        let key_type = db.key_type(&name).await;
        let ttl = db.ttl(&name).await;

        let size = match key_type {
            Ok(KeyType::String) => Some(db.string_length(&name).await),
            _ => None,
        };

        Self::from_probes(name, key_type, ttl, size)
    }

    /// Combine probe results, degrading each failed probe to its default
    pub fn from_probes(
        name: String,
        key_type: DriverResult<KeyType>,
        ttl: DriverResult<Option<Duration>>,
        size: Option<DriverResult<u64>>,
    ) -> KeyDescriptor {
        let key_type = key_type.unwrap_or_else(|e| {
            trace!("TYPE probe failed for {}: {}", name, e);
            KeyType::Unknown
        });

        let ttl = ttl.unwrap_or_else(|e| {
            trace!("TTL probe failed for {}: {}", name, e);
            None
        });

        let size = match (key_type, size) {
            (KeyType::String, Some(Ok(len))) => len,
            (KeyType::String, Some(Err(e))) => {
                trace!("STRLEN probe failed for {}: {}", name, e);
                0
            }
            _ => 0,
        };

        KeyDescriptor {
            name,
            key_type,
            size,
            ttl,
        }
    }
}
