//! Relay configuration.
//!
//! Loading flow:
//! 1. Start with compiled [`RelayConfig::default()`]
//! 2. If a config file is given and exists, deep-merge its values over defaults
//! 3. Apply `ROOMCAST_*` environment variable overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

/// Configuration loading error.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    /// Config file is not valid JSON, or does not match the schema.
    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Top-level relay configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Bind address.
    pub server: ServerSection,
    /// Token authentication.
    pub auth: AuthSection,
    /// Room behavior.
    pub rooms: RoomsSection,
    /// Per-connection session tuning.
    pub session: SessionSection,
    /// Logging.
    pub log: LogSection,
}

/// `server` section.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// Host to bind (default `"0.0.0.0"`).
    pub host: String,
    /// Port to bind (default `8080`; `0` for auto-assign).
    pub port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
        }
    }
}

/// `auth` section.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSection {
    /// Shared secret for token encryption. Empty disables auth.
    pub secret: String,
}

impl Default for AuthSection {
    fn default() -> Self {
        Self {
            secret: String::new(),
        }
    }
}

/// `rooms` section.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomsSection {
    /// Maximum members per room.
    pub max_members: usize,
}

impl Default for RoomsSection {
    fn default() -> Self {
        Self { max_members: 50 }
    }
}

/// `session` section.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    /// Interval between server-initiated Ping frames, in seconds.
    pub heartbeat_interval_secs: u64,
    /// Idle time after which a silent connection is reaped, in seconds.
    pub idle_timeout_secs: u64,
    /// Interval between reaper sweeps, in seconds.
    pub reaper_interval_secs: u64,
    /// Max inbound WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Outbound send queue depth per connection.
    pub send_queue_depth: usize,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: 30,
            idle_timeout_secs: 300,
            reaper_interval_secs: 30,
            max_message_size: 512 * 1024,
            send_queue_depth: 256,
        }
    }
}

/// `log` section.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSection {
    /// Default tracing filter when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

impl RelayConfig {
    /// Load configuration from a JSON file with env var overrides.
    ///
    /// A missing file yields defaults; a malformed file is an error.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let defaults = serde_json::to_value(Self::default())?;

        let merged = if path.exists() {
            debug!(?path, "loading config from file");
            let content = std::fs::read_to_string(path)?;
            let user: Value = serde_json::from_str(&content)?;
            deep_merge(defaults, user)
        } else {
            debug!(?path, "config file not found, using defaults");
            defaults
        };

        let mut config: Self = serde_json::from_value(merged)?;
        apply_env_overrides(&mut config);
        Ok(config)
    }

    /// Defaults plus env var overrides, no file involved.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        apply_env_overrides(&mut config);
        config
    }
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `ROOMCAST_*` environment variable overrides.
///
/// Invalid values are logged and ignored, falling back to file/default.
pub fn apply_env_overrides(config: &mut RelayConfig) {
    if let Some(v) = read_env_string("ROOMCAST_HOST") {
        config.server.host = v;
    }
    if let Some(v) = read_env_u16("ROOMCAST_PORT") {
        config.server.port = v;
    }
    if let Some(v) = read_env_string("ROOMCAST_SECRET") {
        config.auth.secret = v;
    }
    if let Some(v) = read_env_usize("ROOMCAST_MAX_MEMBERS", 1, 10_000) {
        config.rooms.max_members = v;
    }
    if let Some(v) = read_env_u64("ROOMCAST_HEARTBEAT_INTERVAL_SECS", 1, 3600) {
        config.session.heartbeat_interval_secs = v;
    }
    if let Some(v) = read_env_u64("ROOMCAST_IDLE_TIMEOUT_SECS", 1, 86_400) {
        config.session.idle_timeout_secs = v;
    }
    if let Some(v) = read_env_u64("ROOMCAST_REAPER_INTERVAL_SECS", 1, 3600) {
        config.session.reaper_interval_secs = v;
    }
    if let Some(v) = read_env_string("ROOMCAST_LOG_LEVEL") {
        config.log.level = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Env var readers (thin wrappers) ─────────────────────────────────────────

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env_u16(name: &str) -> Option<u16> {
    let val = std::env::var(name).ok()?;
    let result = val.parse().ok();
    if result.is_none() {
        warn!(key = name, value = %val, "invalid u16 env var, ignoring");
    }
    result
}

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    let val = std::env::var(name).ok()?;
    let result = parse_u64_range(&val, min, max);
    if result.is_none() {
        warn!(key = name, value = %val, "invalid u64 env var, ignoring");
    }
    result
}

fn read_env_usize(name: &str, min: usize, max: usize) -> Option<usize> {
    let val = std::env::var(name).ok()?;
    let result = parse_usize_range(&val, min, max);
    if result.is_none() {
        warn!(key = name, value = %val, "invalid usize env var, ignoring");
    }
    result
}
