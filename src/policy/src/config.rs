//! Server configuration loading and validation

use crate::service::ServiceTimeouts;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Complete server configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: ServerSection,

    #[serde(default)]
    pub store: StoreSection,

    #[serde(default)]
    pub authz: AuthzSection,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

/// Canonical store backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Postgres,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreSection {
    #[serde(default)]
    pub backend: StoreBackend,
    #[serde(default)]
    pub database_url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_true")]
    pub run_migrations: bool,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

/// Relation store backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthzBackend {
    #[default]
    Memory,
    Spicedb,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthzSection {
    #[serde(default)]
    pub backend: AuthzBackend,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub preshared_key: Option<String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            database_url: None,
            max_connections: default_max_connections(),
            run_migrations: default_true(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl Default for AuthzSection {
    fn default() -> Self {
        Self {
            backend: AuthzBackend::default(),
            endpoint: None,
            preshared_key: None,
            timeout_ms: default_timeout_ms(),
        }
    }
}

// Default value functions
fn default_true() -> bool { true }
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_request_timeout() -> u64 { 30 }
fn default_max_connections() -> u32 { 10 }
fn default_timeout_ms() -> u64 { 5000 }

impl ServerConfig {
    /// Load configuration from TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref()).with_context(|| {
            format!("Failed to read configuration file {}", path.as_ref().display())
        })?;

        let config: ServerConfig = toml::from_str(&contents)
            .context("Failed to parse configuration file")?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.request_timeout_secs == 0 {
            anyhow::bail!("server.request_timeout_secs must be greater than zero");
        }

        if self.store.timeout_ms == 0 || self.authz.timeout_ms == 0 {
            anyhow::bail!("store.timeout_ms and authz.timeout_ms must be greater than zero");
        }

        if self.store.backend == StoreBackend::Postgres {
            if self.store.database_url.as_deref().map_or(true, str::is_empty) {
                anyhow::bail!("store.database_url is required for the postgres backend");
            }
            if self.store.max_connections == 0 {
                anyhow::bail!("store.max_connections must be greater than zero");
            }
        }

        if self.authz.backend == AuthzBackend::Spicedb {
            if self.authz.endpoint.as_deref().map_or(true, str::is_empty) {
                anyhow::bail!("authz.endpoint is required for the spicedb backend");
            }
            if self.authz.preshared_key.as_deref().map_or(true, str::is_empty) {
                anyhow::bail!("authz.preshared_key is required for the spicedb backend");
            }
        }

        Ok(())
    }

    /// Listen address as `host:port`
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// HTTP request deadline
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    /// Per-call deadlines for the policy service
    pub fn timeouts(&self) -> ServiceTimeouts {
        ServiceTimeouts {
            store: Duration::from_millis(self.store.timeout_ms),
            sync: Duration::from_millis(self.authz.timeout_ms),
        }
    }
}
