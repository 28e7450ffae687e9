/// Core data model shared by the session and the services
pub mod profile;
pub mod session;

use std::fmt;
use std::time::Duration;

pub use profile::{ConnectionDescriptor, ConnectionProfile};
pub use session::ConnectionSession;

/// Data type of a key as reported by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyType {
    String,
    List,
    Set,
    SortedSet,
    Hash,
    Stream,
    Unknown,
}

impl KeyType {
    /// Map a server type name (`TYPE` reply) to a key type.
    /// Names we don't recognise, including `none`, become `Unknown`.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "string" => KeyType::String,
            "list" => KeyType::List,
            "set" => KeyType::Set,
            "zset" => KeyType::SortedSet,
            "hash" => KeyType::Hash,
            "stream" => KeyType::Stream,
            _ => KeyType::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            KeyType::String => "string",
            KeyType::List => "list",
            KeyType::Set => "set",
            KeyType::SortedSet => "zset",
            KeyType::Hash => "hash",
            KeyType::Stream => "stream",
            KeyType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// A key and its metadata, resolved fresh on every enumeration
#[derive(Debug, Clone, PartialEq)]
pub struct KeyDescriptor {
    pub name: String,
    pub key_type: KeyType,
    /// Value length for strings, 0 for every other type
    pub size: u64,
    /// Remaining time to live, `None` when the key never expires
    pub ttl: Option<Duration>,
}

/// Point-in-time server statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServerSnapshot {
    pub version: String,
    pub used_memory: u64,
    pub total_keys: u64,
    pub connected_clients: u32,
    pub total_commands_processed: u64,
    pub uptime_seconds: f64,
}

impl ServerSnapshot {
    /// True when no field carries data (disconnected or failed collection)
    pub fn is_empty(&self) -> bool {
        *self == ServerSnapshot::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_type_from_name() {
        assert_eq!(KeyType::from_name("string"), KeyType::String);
        assert_eq!(KeyType::from_name("LIST"), KeyType::List);
        assert_eq!(KeyType::from_name("zset"), KeyType::SortedSet);
        assert_eq!(KeyType::from_name("stream"), KeyType::Stream);
        assert_eq!(KeyType::from_name("none"), KeyType::Unknown);
        assert_eq!(KeyType::from_name("ReJSON-RL"), KeyType::Unknown);
    }

    #[test]
    fn test_key_type_display() {
        assert_eq!(KeyType::SortedSet.to_string(), "zset");
        assert_eq!(KeyType::Unknown.to_string(), "unknown");
    }

    #[test]
    fn test_default_snapshot_is_empty() {
        let snapshot = ServerSnapshot::default();
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.version, "");
        assert_eq!(snapshot.total_keys, 0);

        let populated = ServerSnapshot {
            connected_clients: 1,
            ..Default::default()
        };
        assert!(!populated.is_empty());
    }
}
