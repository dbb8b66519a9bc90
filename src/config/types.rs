//! Configuration types and structures.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default HTTP port.
pub const DEFAULT_PORT: u16 = 8000;

/// Default number of records per listing page.
pub const DEFAULT_PAGE_SIZE: u32 = 5;

/// Largest page size a configuration may ask for.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub pagination: PaginationConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub delete_policy: DeletePolicyConfig,
}

/// Server-specific configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Address to bind.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from(".task-manager/tasks.db")
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginationConfig {
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
        }
    }
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

impl PaginationConfig {
    /// Page size clamped to `1..=MAX_PAGE_SIZE`.
    pub fn effective_page_size(&self) -> u32 {
        self.page_size.clamp(1, MAX_PAGE_SIZE)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Lifetime of a login session in hours (default: two weeks).
    #[serde(default = "default_session_ttl_hours")]
    pub session_ttl_hours: i64,

    /// bcrypt work factor for new password hashes.
    #[serde(default = "default_bcrypt_cost")]
    pub bcrypt_cost: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_ttl_hours: default_session_ttl_hours(),
            bcrypt_cost: default_bcrypt_cost(),
        }
    }
}

fn default_session_ttl_hours() -> i64 {
    24 * 14
}

fn default_bcrypt_cost() -> u32 {
    bcrypt::DEFAULT_COST
}

impl AuthConfig {
    pub fn session_ttl_ms(&self) -> i64 {
        self.session_ttl_hours.max(1) * 3_600_000
    }
}

/// What happens to dependent records when a referenced record is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnDelete {
    /// Delete the dependents too.
    #[default]
    Cascade,
    /// Refuse the deletion while dependents exist.
    Restrict,
}

/// Per-kind deletion policy for records other records require.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeletePolicyConfig {
    /// Workers holding a deleted position.
    #[serde(default)]
    pub position: OnDelete,

    /// Tasks of a deleted task type.
    #[serde(default)]
    pub task_type: OnDelete,

    /// Tasks belonging to a deleted project.
    #[serde(default)]
    pub project: OnDelete,
}

impl Config {
    /// Load configuration from a single YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Ensure the database directory exists.
    pub fn ensure_db_dir(&self) -> Result<()> {
        if let Some(parent) = self.server.db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }

    /// `host:port` to bind.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
