//! Configuration loading and resolution
//!
//! Settings resolve in priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file (`MEND_CONFIG`, else `~/.config/mend/mend.toml`)
//! 4. Compiled default (fallback)
//!
//! A missing TOML file never prevents startup; the coordinator falls back to
//! environment variables and compiled defaults with a warning.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

/// Default port for the coordinator service
pub const DEFAULT_PORT: u16 = 5780;
/// Default upstream scheduler base URL
pub const DEFAULT_SCHEDULER_URL: &str = "http://127.0.0.1:8080";
/// Default bound for diagnosis calls and approval waits, in seconds
pub const DEFAULT_AGENT_TIMEOUT_SECS: u64 = 300;
/// Default connection-failure retry threshold
pub const DEFAULT_MAX_RETRIES: u32 = 3;
/// Default severity-classifier lookback window, in runs
pub const DEFAULT_LOOKBACK_WINDOW: usize = 5;
/// Default audit log ring capacity, in lines
pub const DEFAULT_LOG_BUFFER_LINES: usize = 1000;

/// Diagnosis backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosisBackend {
    /// Pattern-matching rule table (no external calls)
    Rules,
    /// Generative-model backend over HTTP, rule fallback on parse failure
    Generative,
}

impl std::str::FromStr for DiagnosisBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "rules" => Ok(DiagnosisBackend::Rules),
            "generative" => Ok(DiagnosisBackend::Generative),
            other => Err(Error::Config(format!(
                "unknown diagnosis backend '{}' (expected 'rules' or 'generative')",
                other
            ))),
        }
    }
}

/// Bootstrap configuration loaded from the TOML file
///
/// These settings cannot change during runtime; restart to pick up changes.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub scheduler_url: Option<String>,
    #[serde(default)]
    pub diagnosis_backend: Option<String>,
    #[serde(default)]
    pub agent_timeout_secs: Option<u64>,
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub auto_fix_enabled: Option<bool>,
    #[serde(default)]
    pub require_human_approval: Option<bool>,
    #[serde(default)]
    pub lookback_window: Option<usize>,
    #[serde(default)]
    pub log_buffer_lines: Option<usize>,
    #[serde(default)]
    pub openai_api_key: Option<String>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct LoggingConfig {
    /// Log level filter (trace, debug, info, warn, error)
    #[serde(default)]
    pub level: Option<String>,
}

/// Command-line overrides, mapped from clap arguments by the binary
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub config_path: Option<PathBuf>,
    pub port: Option<u16>,
    pub scheduler_url: Option<String>,
    pub diagnosis_backend: Option<String>,
}

/// Fully resolved coordinator settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub port: u16,
    pub scheduler_url: String,
    pub diagnosis_backend: DiagnosisBackend,
    pub openai_api_key: Option<String>,
    /// Bound for diagnosis calls and the pending-approval wait
    pub agent_timeout: Duration,
    /// Connection failures at or above this retry count are high severity
    pub max_retries: u32,
    pub auto_fix_enabled: bool,
    pub require_human_approval: bool,
    /// Runs of history the severity classifier looks back over
    pub lookback_window: usize,
    pub log_buffer_lines: usize,
    pub log_level: String,
}

impl Settings {
    /// Resolve settings from CLI overrides, environment, TOML file, defaults
    pub fn resolve(overrides: ConfigOverrides) -> Result<Settings> {
        let toml = load_toml_config(overrides.config_path.as_deref().map(PathBuf::from));

        let backend_str = overrides
            .diagnosis_backend
            .or_else(|| std::env::var("MEND_DIAGNOSIS_BACKEND").ok())
            .or(toml.diagnosis_backend.clone())
            .unwrap_or_else(|| "rules".to_string());

        Ok(Settings {
            port: overrides
                .port
                .or_else(|| env_parsed("MEND_PORT"))
                .or(toml.port)
                .unwrap_or(DEFAULT_PORT),
            scheduler_url: overrides
                .scheduler_url
                .or_else(|| std::env::var("MEND_SCHEDULER_URL").ok())
                .or(toml.scheduler_url.clone())
                .unwrap_or_else(|| DEFAULT_SCHEDULER_URL.to_string()),
            diagnosis_backend: backend_str.parse()?,
            openai_api_key: std::env::var("OPENAI_API_KEY")
                .ok()
                .filter(|k| !k.is_empty())
                .or(toml.openai_api_key.clone()),
            agent_timeout: Duration::from_secs(
                env_parsed("AGENT_TIMEOUT")
                    .or(toml.agent_timeout_secs)
                    .unwrap_or(DEFAULT_AGENT_TIMEOUT_SECS),
            ),
            max_retries: env_parsed("MAX_RETRIES")
                .or(toml.max_retries)
                .unwrap_or(DEFAULT_MAX_RETRIES),
            auto_fix_enabled: env_bool("AUTO_FIX_ENABLED")
                .or(toml.auto_fix_enabled)
                .unwrap_or(true),
            require_human_approval: env_bool("REQUIRE_HUMAN_APPROVAL")
                .or(toml.require_human_approval)
                .unwrap_or(false),
            lookback_window: toml.lookback_window.unwrap_or(DEFAULT_LOOKBACK_WINDOW),
            log_buffer_lines: toml.log_buffer_lines.unwrap_or(DEFAULT_LOG_BUFFER_LINES),
            log_level: toml
                .logging
                .level
                .clone()
                .unwrap_or_else(|| "info".to_string()),
        })
    }
}

/// Load the TOML config file, tolerating its absence
fn load_toml_config(explicit_path: Option<PathBuf>) -> TomlConfig {
    let path = match explicit_path.or_else(default_config_path) {
        Some(p) => p,
        None => return TomlConfig::default(),
    };

    if !path.exists() {
        warn!("Config file not found at {:?}, using defaults", path);
        return TomlConfig::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => match toml::from_str::<TomlConfig>(&content) {
            Ok(config) => {
                info!("Loaded configuration from {:?}", path);
                config
            }
            Err(e) => {
                warn!("Failed to parse config file {:?}: {}, using defaults", path, e);
                TomlConfig::default()
            }
        },
        Err(e) => {
            warn!("Failed to read config file {:?}: {}, using defaults", path, e);
            TomlConfig::default()
        }
    }
}

/// Default configuration file path: `MEND_CONFIG`, else `~/.config/mend/mend.toml`
fn default_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("MEND_CONFIG") {
        return Some(PathBuf::from(path));
    }
    dirs::config_dir().map(|d| d.join("mend").join("mend.toml"))
}

fn env_parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| match v.parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            warn!("Ignoring unparseable {}={:?}", name, v);
            None
        }
    })
}

/// Parse a boolean environment variable (`1/0`, `true/false`, `yes/no`, `on/off`)
fn env_bool(name: &str) -> Option<bool> {
    std::env::var(name)
        .ok()
        .and_then(|v| match v.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            other => {
                warn!("Ignoring unparseable {}={:?}", name, other);
                None
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_parsing() {
        assert_eq!(
            "rules".parse::<DiagnosisBackend>().unwrap(),
            DiagnosisBackend::Rules
        );
        assert_eq!(
            "Generative".parse::<DiagnosisBackend>().unwrap(),
            DiagnosisBackend::Generative
        );
        assert!("llm".parse::<DiagnosisBackend>().is_err());
    }

    #[test]
    fn toml_config_partial_parse() {
        let config: TomlConfig = toml::from_str(
            r#"
            port = 6000
            require_human_approval = true

            [logging]
            level = "debug"
            "#,
        )
        .unwrap();
        assert_eq!(config.port, Some(6000));
        assert_eq!(config.require_human_approval, Some(true));
        assert_eq!(config.logging.level.as_deref(), Some("debug"));
        assert!(config.agent_timeout_secs.is_none());
    }
}
