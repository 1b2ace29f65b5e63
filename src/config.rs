//! Configuration management for the floodwall rate limiter.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use tracing::info;

use crate::error::{FloodwallError, Result};

/// Main configuration for the rate limiter.
///
/// Loaded once at startup and validated before use; a config that fails
/// validation never reaches the evaluator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Number of requests allowed per tracking key within the window.
    /// 0 means unlimited.
    #[serde(default = "default_requests")]
    pub requests: u64,

    /// Counting window in minutes. Doubles as the retention horizon for
    /// the archiver.
    #[serde(default = "default_duration")]
    pub duration: i64,

    /// How long a triggered block lasts, in minutes.
    #[serde(default = "default_block_duration")]
    pub block_duration: i64,

    /// Resource fields, field name to "must be tracked". Tracked fields are
    /// required on every evaluated request.
    #[serde(default)]
    pub resource_fields: BTreeMap<String, bool>,

    /// User-identity fields, field name to "tracked". Tracked fields are
    /// used for key composition only when the request supplies them.
    #[serde(default)]
    pub user_data_fields: BTreeMap<String, bool>,

    /// IPs that are always allowed on rate-limited verbs.
    #[serde(default)]
    pub whitelist_ips: HashSet<String>,

    /// IPs that are always blocked, on any verb.
    #[serde(default)]
    pub blacklist_ips: HashSet<String>,

    /// Whether the archiver copies expired entries to the history table.
    #[serde(default = "default_history_backup")]
    pub history_backup: bool,

    /// Name of the active log table.
    #[serde(default = "default_table")]
    pub table: String,

    /// Name of the history table.
    #[serde(default = "default_history_table")]
    pub history_table: String,

    /// Maximum number of entries per history batch insert.
    #[serde(default = "default_insert_chunk_size")]
    pub insert_chunk_size: usize,

    /// Output shape produced by the response formatter.
    #[serde(default)]
    pub response_type: ResponseType,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            requests: default_requests(),
            duration: default_duration(),
            block_duration: default_block_duration(),
            resource_fields: BTreeMap::new(),
            user_data_fields: BTreeMap::new(),
            whitelist_ips: HashSet::new(),
            blacklist_ips: HashSet::new(),
            history_backup: default_history_backup(),
            table: default_table(),
            history_table: default_history_table(),
            insert_chunk_size: default_insert_chunk_size(),
            response_type: ResponseType::default(),
        }
    }
}

fn default_requests() -> u64 {
    500
}

fn default_duration() -> i64 {
    300
}

fn default_block_duration() -> i64 {
    60
}

fn default_history_backup() -> bool {
    true
}

fn default_table() -> String {
    "rate_limiter".to_string()
}

fn default_history_table() -> String {
    "rate_limiter_history".to_string()
}

fn default_insert_chunk_size() -> usize {
    50
}

/// Output shape for formatted decisions.
///
/// Unrecognized values fall back to `Map`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    #[default]
    Object,
    Json,
    #[serde(other)]
    Map,
}

impl LimiterConfig {
    /// Load configuration from a YAML file and validate it.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading rate limiter configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string and validate it.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: LimiterConfig = serde_yaml::from_str(yaml)
            .map_err(|e| FloodwallError::Configuration(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check the invariants a usable configuration must hold.
    ///
    /// `requests` may legitimately be 0 (unlimited); the durations may not.
    pub fn validate(&self) -> Result<()> {
        if self.table.is_empty() {
            return Err(FloodwallError::Configuration(
                "table name must not be empty".to_string(),
            ));
        }
        if self.duration <= 0 {
            return Err(FloodwallError::Configuration(
                "duration must be a positive number of minutes".to_string(),
            ));
        }
        if self.block_duration <= 0 {
            return Err(FloodwallError::Configuration(
                "block_duration must be a positive number of minutes".to_string(),
            ));
        }
        if self.history_backup {
            if self.history_table.is_empty() {
                return Err(FloodwallError::Configuration(
                    "history_table must not be empty when history_backup is enabled".to_string(),
                ));
            }
            if self.insert_chunk_size == 0 {
                return Err(FloodwallError::Configuration(
                    "insert_chunk_size must be at least 1 when history_backup is enabled"
                        .to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Per-call overrides for the limit parameters.
///
/// An override wins only when explicitly supplied; for the duration fields a
/// zero value is treated as "not supplied". Overrides never touch the loaded
/// configuration, so they expire with the call that carried them.
#[derive(Debug, Clone, Copy, Default)]
pub struct Overrides {
    /// Replacement request threshold. 0 is honored and means unlimited.
    pub requests: Option<u64>,
    /// Replacement window, in minutes. 0 is ignored.
    pub duration: Option<i64>,
    /// Replacement block duration, in minutes. 0 is ignored.
    pub block_duration: Option<i64>,
}

/// The limit parameters in effect for a single evaluation.
#[derive(Debug, Clone, Copy)]
pub struct EffectiveLimits {
    pub requests: u64,
    pub duration: i64,
    pub block_duration: i64,
}

impl EffectiveLimits {
    /// Merge base configuration with per-call overrides.
    pub fn new(config: &LimiterConfig, overrides: Option<&Overrides>) -> Self {
        let mut limits = Self {
            requests: config.requests,
            duration: config.duration,
            block_duration: config.block_duration,
        };

        if let Some(overrides) = overrides {
            if let Some(requests) = overrides.requests {
                limits.requests = requests;
            }
            if let Some(duration) = overrides.duration {
                if duration != 0 {
                    limits.duration = duration;
                }
            }
            if let Some(block_duration) = overrides.block_duration {
                if block_duration != 0 {
                    limits.block_duration = block_duration;
                }
            }
        }

        limits
    }
}
