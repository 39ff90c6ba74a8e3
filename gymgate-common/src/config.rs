//! Configuration loading
//!
//! Resolution order for every setting:
//! 1. Command-line argument (highest priority, handled by each binary via clap)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! A missing config file is not an error: a warning is logged and compiled
//! defaults are used. A config file that exists but does not parse is.

use crate::schedule::OperatingSchedule;
use crate::timing;
use crate::token::TokenKey;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "GYMGATE_CONFIG";

/// Default hub listen address
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:5780";

/// Default hub URL used by stations
pub const DEFAULT_HUB_URL: &str = "http://127.0.0.1:5780";

/// Whole config file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub logging: LoggingConfig,
    pub hub: HubConfig,
    pub station: StationConfig,
    /// Operating hours of the gym a station serves
    pub schedule: Option<OperatingSchedule>,
}

/// `[logging]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default `EnvFilter` directive when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// `[hub]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    pub bind_addr: String,
    /// Base64 token signing key (at least 32 bytes); random when absent
    pub shared_secret: Option<String>,
    pub token_ttl_secs: u64,
    /// Member records standing in for the external member service
    pub members: Vec<MemberSeed>,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            shared_secret: None,
            token_ttl_secs: timing::TOKEN_TTL.as_secs(),
            members: Vec::new(),
        }
    }
}

impl HubConfig {
    pub fn token_ttl(&self) -> Duration {
        timing::non_zero_secs(self.token_ttl_secs, timing::TOKEN_TTL)
    }

    /// Configured signing key, if any
    pub fn token_key(&self) -> Result<Option<TokenKey>> {
        self.shared_secret
            .as_deref()
            .map(TokenKey::from_base64)
            .transpose()
            .map_err(|e| Error::Config(format!("[hub].shared_secret: {}", e)))
    }
}

/// `[[hub.members]]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberSeed {
    pub member_id: String,
    pub full_name: String,
    #[serde(default)]
    pub photo_url: Option<String>,
    #[serde(default)]
    pub memberships: Vec<MembershipSeed>,
}

/// `[[hub.members.memberships]]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MembershipSeed {
    pub gym_id: String,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub subscription_end: Option<DateTime<Utc>>,
}

fn default_true() -> bool {
    true
}

/// `[station]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StationConfig {
    pub hub_url: String,
    pub gym_id: Option<String>,
    pub scan_cooldown_ms: u64,
    pub display_window_ms: u64,
    pub verify_timeout_ms: u64,
    pub settle_delay_ms: u64,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            hub_url: DEFAULT_HUB_URL.to_string(),
            gym_id: None,
            scan_cooldown_ms: timing::SCAN_COOLDOWN.as_millis() as u64,
            display_window_ms: timing::RESULT_DISPLAY_WINDOW.as_millis() as u64,
            verify_timeout_ms: timing::VERIFY_TIMEOUT.as_millis() as u64,
            settle_delay_ms: timing::SCANNER_SETTLE_DELAY.as_millis() as u64,
        }
    }
}

impl StationConfig {
    pub fn scan_cooldown(&self) -> Duration {
        timing::non_zero_millis(self.scan_cooldown_ms, timing::SCAN_COOLDOWN)
    }

    pub fn display_window(&self) -> Duration {
        timing::non_zero_millis(self.display_window_ms, timing::RESULT_DISPLAY_WINDOW)
    }

    pub fn verify_timeout(&self) -> Duration {
        timing::non_zero_millis(self.verify_timeout_ms, timing::VERIFY_TIMEOUT)
    }

    pub fn settle_delay(&self) -> Duration {
        timing::non_zero_millis(self.settle_delay_ms, timing::SCANNER_SETTLE_DELAY)
    }
}

/// Locate the config file
///
/// Priority: explicit path, `GYMGATE_CONFIG`, `~/.config/gymgate/config.toml`,
/// `/etc/gymgate/config.toml`. Explicit and environment paths are returned
/// even if they do not exist so the caller can report them.
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    let user_config = dirs::config_dir().map(|d| d.join("gymgate").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    let system_config = PathBuf::from("/etc/gymgate/config.toml");
    if system_config.exists() {
        return Some(system_config);
    }

    None
}

/// Parse a config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))
}

/// Resolve and load the config file, falling back to defaults when absent
pub fn load_or_default(cli_arg: Option<&Path>) -> Result<TomlConfig> {
    let Some(path) = resolve_config_path(cli_arg) else {
        warn!("No config file found, using compiled defaults");
        return Ok(TomlConfig::default());
    };

    match load_toml_config(&path) {
        Ok(config) => {
            info!("Loaded config from {}", path.display());
            Ok(config)
        }
        Err(Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!("Config file {} not found, using compiled defaults", path.display());
            Ok(TomlConfig::default())
        }
        Err(e) => Err(e),
    }
}
