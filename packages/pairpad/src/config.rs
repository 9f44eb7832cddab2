use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use pairpad_session::ManagerConfig;
use serde::{Deserialize, Serialize};
use tracing::warn;

// =============================================================================
// Tunable config (figment-deserialized from defaults / config.toml / env vars)
// =============================================================================
//
//   config.toml:     [server]
//                    port = 8000
//
//   env var:         PAIRPAD_SERVER__PORT=8000   (double underscore = nesting)

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerFileConfig,
    #[serde(default)]
    pub reconnect: ReconnectFileConfig,
}

/// Where the assistant service listens (lives under `[server]`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerFileConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerFileConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Lower bound for `delay_ms`; smaller values would spin against a dead service.
pub const MIN_RECONNECT_DELAY_MS: u64 = 100;

/// Retry tuning (lives under `[reconnect]`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReconnectFileConfig {
    /// Raised to `MIN_RECONNECT_DELAY_MS` if smaller.
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
    /// 0 disables the handshake timeout.
    #[serde(default)]
    pub handshake_timeout_ms: u64,
}

impl Default for ReconnectFileConfig {
    fn default() -> Self {
        Self {
            delay_ms: default_delay_ms(),
            handshake_timeout_ms: 0,
        }
    }
}

fn default_host() -> String {
    "localhost".to_string()
}
fn default_port() -> u16 {
    8000
}
fn default_delay_ms() -> u64 {
    3000
}

impl FileConfig {
    pub fn manager_config(&self) -> ManagerConfig {
        let delay_ms = self.reconnect.delay_ms.max(MIN_RECONNECT_DELAY_MS);
        if delay_ms != self.reconnect.delay_ms {
            warn!(
                configured = self.reconnect.delay_ms,
                delay_ms, "reconnect.delay_ms too small, clamping"
            );
        }
        ManagerConfig {
            host: self.server.host.clone(),
            port: self.server.port,
            reconnect_delay: Duration::from_millis(delay_ms),
            handshake_timeout: if self.reconnect.handshake_timeout_ms == 0 {
                None
            } else {
                Some(Duration::from_millis(self.reconnect.handshake_timeout_ms))
            },
        }
    }
}

/// Layer defaults → `<data_dir>/config.toml` → `PAIRPAD_*` env vars.
pub fn load_config(data_dir: &Path) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    Figment::from(Serialized::defaults(FileConfig::default()))
        .merge(Toml::file(data_dir.join("config.toml")))
        .merge(Env::prefixed("PAIRPAD_").split("__"))
}

// =============================================================================
// Directory layout (derived from --data-dir)
// =============================================================================

#[derive(Clone, Debug)]
pub struct PairpadDirs {
    pub data_dir: PathBuf,
}

impl PairpadDirs {
    pub fn new(custom_dir: Option<PathBuf>) -> Result<Self> {
        let data_dir = match custom_dir {
            Some(dir) => dir,
            None => dirs::home_dir()
                .context("Could not find home directory")?
                .join(".pairpad"),
        };
        Ok(Self { data_dir })
    }

    pub fn config_path(&self) -> PathBuf {
        self.data_dir.join("config.toml")
    }
}
