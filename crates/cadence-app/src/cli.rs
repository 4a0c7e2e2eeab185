//! CLI argument definitions and interactive command parsing.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use std::path::PathBuf;

use cadence_core::config::CadenceConfig;
use cadence_core::types::DeliveryMode;
use clap::Parser;

/// Cadence: a terminal chat client with progressive reply delivery.
#[derive(Parser, Debug)]
#[command(name = "cadence", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,

    /// Start with the offline toggle on.
    #[arg(long = "offline")]
    pub offline: bool,

    /// Delivery mode for new submissions (router, benchmark).
    #[arg(short = 'm', long = "mode")]
    pub mode: Option<DeliveryMode>,

    /// Chat backend URL.
    #[arg(short = 'e', long = "endpoint")]
    pub endpoint: Option<String>,
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > CADENCE_CONFIG env var > ~/.cadence/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("CADENCE_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Apply flag and environment overrides on top of a loaded config.
    pub fn apply(&self, config: &mut CadenceConfig) {
        self.apply_with_env(config, std::env::var("CADENCE_ENDPOINT").ok());
    }

    fn apply_with_env(&self, config: &mut CadenceConfig, env_endpoint: Option<String>) {
        if let Some(level) = &self.log_level {
            config.general.log_level = level.clone();
        }
        if self.offline {
            config.general.offline = true;
        }
        if let Some(mode) = self.mode {
            config.general.default_mode = mode;
        }
        let endpoint = self
            .endpoint
            .clone()
            .or(env_endpoint)
            .filter(|e| !e.trim().is_empty());
        if let Some(endpoint) = endpoint {
            config.backend.endpoint = endpoint;
        }
    }
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".cadence").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".cadence").join("config.toml");
    }
    PathBuf::from("config.toml")
}

// =============================================================================
// Interactive commands
// =============================================================================

/// One line typed at the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Anything that is not a slash command.
    Submit(String),
    Offline,
    Online,
    /// Switch mode; `None` toggles between router and benchmark.
    Mode(Option<DeliveryMode>),
    Reset,
    Help,
    Quit,
    Unknown(String),
}

impl Command {
    pub fn parse(line: &str) -> Self {
        let trimmed = line.trim();
        let Some(rest) = trimmed.strip_prefix('/') else {
            return Command::Submit(line.to_string());
        };
        let mut parts = rest.split_whitespace();
        let name = parts.next().unwrap_or_default();
        let arg = parts.next();
        match name {
            "offline" => Command::Offline,
            "online" => Command::Online,
            "mode" => match arg.map(str::parse::<DeliveryMode>) {
                None => Command::Mode(None),
                Some(Ok(mode)) => Command::Mode(Some(mode)),
                Some(Err(_)) => Command::Unknown(trimmed.to_string()),
            },
            "reset" | "clear" => Command::Reset,
            "help" | "?" => Command::Help,
            "quit" | "exit" | "q" => Command::Quit,
            _ => Command::Unknown(trimmed.to_string()),
        }
    }
}

pub const HELP_TEXT: &str = "\
Commands:
  /offline          replay scripted replies when available
  /online           always ask the backend
  /mode [name]      switch delivery mode (router, benchmark)
  /reset            clear the conversation
  /quit             exit
Anything else is sent as a message.";
