/// Connection profiles and the descriptor string handed to drivers

use crate::error::{DriverError, DriverResult};
use crate::utils::generate_id;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_PORT: u16 = 6379;
pub const DEFAULT_HOST: &str = "localhost";

/// Everything needed to reach one server. Never mutated once stored; edits
/// replace the whole profile.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionProfile {
    #[serde(default = "new_profile_id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default)]
    pub database: i64,
    #[serde(default)]
    pub use_tls: bool,
}

fn new_profile_id() -> String {
    generate_id("conn")
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl Default for ConnectionProfile {
    fn default() -> Self {
        Self {
            id: new_profile_id(),
            name: String::new(),
            host: default_host(),
            port: DEFAULT_PORT,
            password: None,
            database: 0,
            use_tls: false,
        }
    }
}

impl ConnectionProfile {
    pub fn new<N: Into<String>, H: Into<String>>(name: N, host: H, port: u16) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    pub fn with_password<S: Into<String>>(mut self, password: S) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_database(mut self, database: i64) -> Self {
        self.database = database;
        self
    }

    pub fn with_tls(mut self, use_tls: bool) -> Self {
        self.use_tls = use_tls;
        self
    }

    /// Driver descriptor: `host:port[,password=pw][,ssl=true],defaultDatabase=n`
    pub fn descriptor(&self) -> String {
        let mut parts = vec![format!("{}:{}", self.host, self.port)];

        if let Some(password) = self.password.as_deref().filter(|p| !p.is_empty()) {
            parts.push(format!("password={}", password));
        }

        if self.use_tls {
            parts.push("ssl=true".to_string());
        }

        parts.push(format!("defaultDatabase={}", self.database));
        parts.join(",")
    }
}

// Keep passwords out of logs
impl fmt::Debug for ConnectionProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionProfile")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("database", &self.database)
            .field("use_tls", &self.use_tls)
            .finish()
    }
}

/// Parsed form of a descriptor string, consumed by drivers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub use_tls: bool,
    pub database: i64,
}

impl ConnectionDescriptor {
    /// Parse `host:port,key=value,...`. Unknown keys are ignored.
    pub fn parse(descriptor: &str) -> DriverResult<Self> {
        let mut fields = descriptor.split(',').map(str::trim);

        let endpoint = fields
            .next()
            .filter(|e| !e.is_empty())
            .ok_or_else(|| DriverError::connection("descriptor has no endpoint"))?;

        let (host, port) = match endpoint.rsplit_once(':') {
            Some((host, port)) => {
                let port = port.parse::<u16>().map_err(|_| {
                    DriverError::connection(format!("invalid port in endpoint {}", endpoint))
                })?;
                (host.to_string(), port)
            }
            None => (endpoint.to_string(), DEFAULT_PORT),
        };

        if host.is_empty() {
            return Err(DriverError::connection("descriptor has an empty host"));
        }

        let mut parsed = ConnectionDescriptor {
            host,
            port,
            password: None,
            use_tls: false,
            database: 0,
        };

        for field in fields {
            let Some((key, value)) = field.split_once('=') else {
                continue;
            };
            match key.trim().to_ascii_lowercase().as_str() {
                "password" => parsed.password = Some(value.to_string()),
                "ssl" => parsed.use_tls = value.trim().eq_ignore_ascii_case("true"),
                "defaultdatabase" => {
                    parsed.database = value.trim().parse().map_err(|_| {
                        DriverError::connection(format!("invalid database index {}", value))
                    })?;
                }
                _ => {}
            }
        }

        Ok(parsed)
    }
}
