// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Serde default helper — returns `true`.
///
/// `#[serde(default)]` on a `bool` always falls back to `bool::default()`
/// (`false`), so fields that should default on need a named function.
fn default_true() -> bool {
    true
}

fn default_subscriber_queue_depth() -> usize {
    256
}

fn default_external_ownership_ttl_secs() -> u64 {
    30
}

fn default_session_index_ttl_secs() -> u64 {
    5
}

fn default_transport_bind() -> String {
    "0.0.0.0:7417".to_string()
}

fn default_relay_backoff_base_secs() -> u64 {
    1
}

fn default_relay_backoff_cap_secs() -> u64 {
    60
}

fn default_heartbeat_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub data_dir: DataDirConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub core: CoreConfig,
    /// Per agent-family transcript-root overrides, keyed by family name
    /// (e.g. "claude", "codex", "acp"). Missing entries fall back to the
    /// adapter's own platform default.
    #[serde(default)]
    pub families: HashMap<String, FamilyConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataDirConfig {
    /// Explicit data-directory root. Defaults to `$XDG_DATA_HOME/corral` (or
    /// `~/.local/share/corral` when unset).
    pub root: Option<PathBuf>,
    /// Suffix appended to the root, e.g. "dev" for a side-by-side profile
    /// that never touches the default fleet's sessions.
    pub profile: Option<String>,
}

impl Default for DataDirConfig {
    fn default() -> Self {
        Self {
            root: None,
            profile: None,
        }
    }
}

impl DataDirConfig {
    /// Resolve the effective data directory, applying the env override
    /// (`CORRAL_DATA_DIR`) ahead of the config value and the platform
    /// default, then appending the profile suffix if set.
    pub fn resolve(&self) -> PathBuf {
        let base = std::env::var_os("CORRAL_DATA_DIR")
            .map(PathBuf::from)
            .or_else(|| self.root.clone())
            .unwrap_or_else(|| {
                dirs::data_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("corral")
            });
        match self.profile.as_deref().or(std::env::var("CORRAL_PROFILE").ok().as_deref()) {
            Some(p) if !p.is_empty() => base.join(p),
            _ => base,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// `error` | `warn` | `info` | `debug` | `trace`. Overridden by `RUST_LOG`.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Optional file destination. When unset, logs go to stderr.
    pub file: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default)]
    pub enabled: bool,
    pub url: Option<String>,
    pub username: Option<String>,
    pub install_id: Option<String>,
    #[serde(default = "default_relay_backoff_base_secs")]
    pub backoff_base_secs: u64,
    #[serde(default = "default_relay_backoff_cap_secs")]
    pub backoff_cap_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: None,
            username: None,
            install_id: None,
            backoff_base_secs: default_relay_backoff_base_secs(),
            backoff_cap_secs: default_relay_backoff_cap_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    #[serde(default = "default_transport_bind")]
    pub bind: String,
    #[serde(default = "default_true")]
    pub encrypted: bool,
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            bind: default_transport_bind(),
            encrypted: true,
            heartbeat_secs: default_heartbeat_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    #[serde(default = "default_subscriber_queue_depth")]
    pub subscriber_queue_depth: usize,
    #[serde(default = "default_external_ownership_ttl_secs")]
    pub external_ownership_ttl_secs: u64,
    #[serde(default = "default_session_index_ttl_secs")]
    pub session_index_ttl_secs: u64,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            subscriber_queue_depth: default_subscriber_queue_depth(),
            external_ownership_ttl_secs: default_external_ownership_ttl_secs(),
            session_index_ttl_secs: default_session_index_ttl_secs(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FamilyConfig {
    pub transcript_root: Option<PathBuf>,
}
