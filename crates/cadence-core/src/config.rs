use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{CadenceError, Result};
use crate::types::DeliveryMode;

/// User-facing text shown when a delivery fails.
pub const DEFAULT_APOLOGY_TEXT: &str =
    "Sorry, something went wrong while generating a response. Please try again.";

/// User-facing text shown when a delivery finishes without any content.
pub const DEFAULT_EMPTY_RESULT_TEXT: &str = "Sorry, I could not generate a response.";

/// Top-level configuration for the Cadence client.
///
/// Loaded from `~/.cadence/config.toml` by default. Every section falls back
/// to its defaults when omitted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CadenceConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub replay: ReplayConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
}

impl CadenceConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: CadenceConfig = toml::from_str(&content)?;
        config.validate()?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| CadenceError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Reject values that would make a delivery impossible.
    pub fn validate(&self) -> Result<()> {
        if self.backend.endpoint.trim().is_empty() {
            return Err(CadenceError::Config("backend.endpoint is empty".into()));
        }
        if !self.replay.time_scale.is_finite() || self.replay.time_scale < 0.0 {
            return Err(CadenceError::Config(format!(
                "replay.time_scale must be a non-negative number, got {}",
                self.replay.time_scale
            )));
        }
        if self.delivery.max_message_chars == 0 {
            return Err(CadenceError::Config(
                "delivery.max_message_chars must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// General client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
    /// Initial value of the offline toggle.
    pub offline: bool,
    /// Mode used for new submissions until changed.
    pub default_mode: DeliveryMode,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            offline: false,
            default_mode: DeliveryMode::Router,
        }
    }
}

/// Live backend connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// URL that accepts one POST per user turn and answers with `data: ` lines.
    pub endpoint: String,
    /// Seconds allowed to establish the connection.
    pub connect_timeout_secs: u64,
    /// Seconds allowed between two body fragments. 0 waits forever.
    pub idle_timeout_secs: u64,
    /// Extra headers merged into every request.
    pub headers: BTreeMap<String, String>,
}

impl BackendConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// `None` when idle reads are unbounded.
    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_secs > 0).then(|| Duration::from_secs(self.idle_timeout_secs))
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8000/api/chat".to_string(),
            connect_timeout_secs: 10,
            idle_timeout_secs: 120,
            headers: BTreeMap::new(),
        }
    }
}

/// Offline replay settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    /// Scenario file. The built-in catalog is used when unset.
    pub scenarios_path: Option<PathBuf>,
    /// Multiplier applied to every replay delay. 0.0 replays instantly.
    pub time_scale: f64,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            scenarios_path: None,
            time_scale: 1.0,
        }
    }
}

/// Delivery policy settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Longest accepted submission, in characters.
    pub max_message_chars: usize,
    /// Replacement content shown when a delivery fails.
    pub apology_text: String,
    /// Content shown when a delivery finishes with nothing to show.
    pub empty_result_text: String,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_message_chars: 4000,
            apology_text: DEFAULT_APOLOGY_TEXT.to_string(),
            empty_result_text: DEFAULT_EMPTY_RESULT_TEXT.to_string(),
        }
    }
}
