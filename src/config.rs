//! Driver configuration.
//!
//! Configuration comes from a YAML file (`db_config.yaml` next to the
//! process by default) or, when the file is absent, from environment
//! variables. Every field except `path` has a usable default.

use std::collections::HashMap;
use std::env;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{DbError, DbResult};

/// Default cache entry lifetime in seconds
pub const DEFAULT_CACHE_TIMEOUT_SECS: u64 = 300;

/// Default maximum number of cached documents
pub const DEFAULT_CACHE_LIMIT: usize = 1000;

/// Name of the config file looked up in the working directory
pub const CONFIG_FILE_NAME: &str = "db_config.yaml";

/// Driver configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Passphrase for at-rest encryption; empty together with `salt`
    /// disables encryption
    #[serde(default)]
    pub encryption_key: String,

    /// Salt mixed into key derivation
    #[serde(default)]
    pub salt: String,

    /// Root directory of the database (required)
    #[serde(default)]
    pub path: String,

    /// Cache entry lifetime in seconds
    #[serde(default = "default_cache_timeout")]
    pub cache_timeout: u64,

    /// Maximum number of cached documents
    #[serde(default = "default_cache_limit")]
    pub cache_limit: usize,

    /// Id this node announces itself as to replication peers
    #[serde(default)]
    pub replication_id: String,

    /// Shared secret carried in the `Authorization` header
    #[serde(default)]
    pub replication_pass: String,

    /// Port for the replication endpoints; 0 disables the server
    #[serde(default)]
    pub replication_port: u16,

    /// Replication peers: peer id -> base URL (e.g. `http://10.0.0.2:4520`)
    #[serde(default)]
    pub replication_nodes: HashMap<String, String>,
}

fn default_cache_timeout() -> u64 {
    DEFAULT_CACHE_TIMEOUT_SECS
}

fn default_cache_limit() -> usize {
    DEFAULT_CACHE_LIMIT
}

impl Default for Config {
    fn default() -> Self {
        Self {
            encryption_key: String::new(),
            salt: String::new(),
            path: String::new(),
            cache_timeout: DEFAULT_CACHE_TIMEOUT_SECS,
            cache_limit: DEFAULT_CACHE_LIMIT,
            replication_id: String::new(),
            replication_pass: String::new(),
            replication_port: 0,
            replication_nodes: HashMap::new(),
        }
    }
}

impl Config {
    /// Create a config pointing at `path` with everything else defaulted
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Load configuration: `db_config.yaml` in the working directory if it
    /// exists, environment variables otherwise
    pub fn load() -> DbResult<Self> {
        if Path::new(CONFIG_FILE_NAME).exists() {
            Self::load_from(Path::new(CONFIG_FILE_NAME))
        } else {
            Ok(Self::from_env())
        }
    }

    /// Load configuration from a specific YAML file
    pub fn load_from(path: &Path) -> DbResult<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| DbError::io(format!("reading config file {}", path.display()), e))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| DbError::validation(format!("invalid config file: {e}")))
    }

    /// Build configuration from `OPENDIV_DB_*` environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(key) = env::var("OPENDIV_DB_ENCRYPTION_KEY") {
            config.encryption_key = key;
        }
        if let Ok(path) = env::var("OPENDIV_DB_PATH") {
            config.path = path;
        }
        if let Ok(limit) = env::var("OPENDIV_DB_CACHE_LIMIT") {
            if let Ok(limit) = limit.parse() {
                config.cache_limit = limit;
            }
        }
        if let Ok(timeout) = env::var("OPENDIV_DB_CACHE_TIMEOUT") {
            if let Ok(timeout) = timeout.parse() {
                config.cache_timeout = timeout;
            }
        }
        config
    }

    /// Check that the config can actually drive a database
    pub fn validate(&self) -> DbResult<()> {
        if self.path.is_empty() {
            return Err(DbError::validation(
                "no database path was provided; set `path` in db_config.yaml or OPENDIV_DB_PATH",
            ));
        }
        if self.replication_port > 0 && self.replication_id.is_empty() {
            return Err(DbError::validation(
                "replication requires `replication_id` so peers can identify this node",
            ));
        }
        Ok(())
    }

    /// Whether at-rest encryption is enabled
    pub fn encryption_enabled(&self) -> bool {
        !(self.encryption_key.is_empty() && self.salt.is_empty())
    }
}
