//! Configuration schema for imgsync
//!
//! Configuration is stored at `~/.config/imgsync/config.toml`

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Image cache settings
    pub cache: CacheConfig,

    /// Image list source definitions
    pub sources: SourcesConfig,

    /// HTTP transport settings
    pub http: HttpConfig,

    /// Sync behaviour
    pub sync: SyncConfig,

    /// Downstream notification settings
    pub dispatcher: DispatcherConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,

    /// Record sweeps and integrity failures in the audit journal
    pub audit_log: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
            audit_log: true,
        }
    }
}

/// Image cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Root directory of the image cache. Everything below it is owned by imgsync.
    pub path: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("imgsync")
                .join("lists"),
        }
    }
}

/// Image list sources configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    /// File holding the image list source definitions
    pub path: PathBuf,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            path: dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("imgsync")
                .join("sources.toml"),
        }
    }
}

/// HTTP transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Overall timeout for a single request, body included (0 = none)
    pub timeout_secs: u64,

    /// Timeout for establishing a connection
    pub connect_timeout_secs: u64,

    /// User-Agent header sent with every request
    pub user_agent: String,
}

impl HttpConfig {
    /// Overall request timeout, `None` when disabled
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }

    /// Connection timeout
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 600,
            connect_timeout_secs: 30,
            user_agent: format!("imgsync/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Sync configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Concurrent image downloads per list
    pub download_workers: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            download_workers: 2,
        }
    }
}

/// Dispatcher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Dispatcher implementation: "noop" or "log"
    pub kind: String,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            kind: "noop".to_string(),
        }
    }
}
