//! Store and synchronizer configuration.
//!
//! Configuration crosses the FFI boundary as a JSON string, so every section
//! deserializes with serde and falls back to defaults for omitted fields:
//!
//! ```json
//! { "name": "field_app", "sync": { "auto_retry": true, "retry": { "max_retries": 3 } } }
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::retry_policy::RetryPolicy;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Store name. The LMDB environment lives in `<name>.lmdb`.
    pub name: String,

    #[serde(default = "default_map_size_mb")]
    pub map_size_mb: usize,

    /// Upper bound of named LMDB databases (collections + indices + metadata).
    #[serde(default = "default_max_collections")]
    pub max_collections: u32,

    /// Run on the in-memory store when the persistent one cannot be opened.
    #[serde(default = "default_volatile_fallback")]
    pub volatile_fallback: bool,

    #[serde(default)]
    pub sync: SyncConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Retry failed drains with backoff while reachable.
    #[serde(default = "default_auto_retry")]
    pub auto_retry: bool,

    #[serde(default)]
    pub retry: RetryPolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            auto_retry: default_auto_retry(),
            retry: RetryPolicy::default(),
        }
    }
}

impl StoreConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            map_size_mb: default_map_size_mb(),
            max_collections: default_max_collections(),
            volatile_fallback: default_volatile_fallback(),
            sync: SyncConfig::default(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn lmdb_dir(&self) -> PathBuf {
        PathBuf::from(format!("{}.lmdb", self.name))
    }

    pub fn map_size_bytes(&self) -> usize {
        self.map_size_mb.saturating_mul(1024 * 1024)
    }
}

fn default_map_size_mb() -> usize {
    64
}

fn default_max_collections() -> u32 {
    64
}

fn default_volatile_fallback() -> bool {
    true
}

fn default_auto_retry() -> bool {
    true
}
