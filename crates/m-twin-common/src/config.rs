//! ---
//! mtwin_section: "01-core-runtime"
//! mtwin_subsection: "module"
//! mtwin_type: "source"
//! mtwin_scope: "code"
//! mtwin_description: "Shared primitives and utilities for the core runtime."
//! mtwin_version: "v0.1.0-prealpha"
//! mtwin_owner: "tbd"
//! ---
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};
use tracing::debug;

use crate::logging::LogFormat;

fn default_mode() -> SessionMode {
    SessionMode::Pure
}

fn default_tick_interval() -> Duration {
    Duration::from_millis(1000)
}

fn default_staleness_threshold() -> Duration {
    Duration::from_millis(2000)
}

fn default_foreign_step_timeout() -> Duration {
    Duration::from_millis(5000)
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

fn default_api_enabled() -> bool {
    true
}

fn default_api_listen() -> SocketAddr {
    "0.0.0.0:8080".parse().expect("valid default api address")
}

/// Primary configuration object for the M-TWIN runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_mode")]
    pub mode: SessionMode,
    /// Model snapshot loaded by `m-twind run` when no explicit path is given
    /// on the command line.
    #[serde(default)]
    pub model_path: Option<PathBuf>,
    #[serde(default)]
    pub session: SessionDefaults,
    /// Transport backing HIL sessions. The in-memory bridge doubles as a
    /// loopback validation rig when no hardware is available.
    #[serde(default)]
    pub bridge: BridgeKind,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

/// Communication transports selectable for HIL sessions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum BridgeKind {
    #[default]
    InMemory,
    Opcua,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    pub config: AppConfig,
    pub source: PathBuf,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &str = "M_TWIN_CONFIG";

    /// Load configuration from disk, respecting the `M_TWIN_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration from disk together with the effective source path.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAppConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(path.clone())?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                let path = candidate.as_ref().to_path_buf();
                let config = Self::from_path(path.clone())?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        Err(anyhow!(
            "no configuration files found. inspected: {}",
            candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }

    fn from_path(path: PathBuf) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        let config = toml::from_str::<AppConfig>(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        self.session.validate()?;
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            model_path: None,
            session: SessionDefaults::default(),
            bridge: BridgeKind::default(),
            logging: LoggingConfig::default(),
            api: ApiConfig::default(),
        }
    }
}

impl std::str::FromStr for AppConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

/// Execution mode for a simulation session.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    /// Internal simulation only; no external hardware traffic.
    #[default]
    Pure,
    /// Hardware-in-the-loop; bound ports exchange values with external tags.
    Hil,
}

impl SessionMode {
    pub fn is_hil(&self) -> bool {
        matches!(self, SessionMode::Hil)
    }
}

impl std::str::FromStr for SessionMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pure" => Ok(SessionMode::Pure),
            "hil" => Ok(SessionMode::Hil),
            other => Err(format!("unknown session mode: {}", other)),
        }
    }
}

/// Per-session timing defaults, overridable at session creation.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionDefaults {
    /// Target tick period. Wall-clock paced in HIL mode; pure mode runs
    /// as fast as the loop allows.
    #[serde(default = "default_tick_interval")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub tick_interval: Duration,
    /// Age beyond which a cached external value is flagged stale on read.
    #[serde(default = "default_staleness_threshold")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub staleness_threshold: Duration,
    /// Upper bound for a single foreign-model step before the tick is
    /// aborted and the session faults.
    #[serde(default = "default_foreign_step_timeout")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub foreign_step_timeout: Duration,
}

impl SessionDefaults {
    pub fn validate(&self) -> Result<()> {
        if self.tick_interval.is_zero() {
            return Err(anyhow!("session tick_interval must be greater than zero"));
        }
        if self.foreign_step_timeout.is_zero() {
            return Err(anyhow!(
                "session foreign_step_timeout must be greater than zero"
            ));
        }
        Ok(())
    }
}

impl Default for SessionDefaults {
    fn default() -> Self {
        Self {
            tick_interval: default_tick_interval(),
            staleness_threshold: default_staleness_threshold(),
            foreign_step_timeout: default_foreign_step_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_prefix: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_enabled")]
    pub enabled: bool,
    #[serde(default = "default_api_listen")]
    pub listen: SocketAddr,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: default_api_enabled(),
            listen: default_api_listen(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = AppConfig::default();
        config.validate().expect("default config validates");
        assert_eq!(config.mode, SessionMode::Pure);
        assert_eq!(config.session.tick_interval, Duration::from_millis(1000));
        assert_eq!(
            config.session.staleness_threshold,
            Duration::from_millis(2000)
        );
    }

    #[test]
    fn parses_minimal_toml() {
        let config: AppConfig = r#"
            mode = "hil"

            [session]
            tick_interval = 250
            staleness_threshold = 750
        "#
        .parse()
        .expect("config parses");
        assert!(config.mode.is_hil());
        assert_eq!(config.session.tick_interval, Duration::from_millis(250));
        assert_eq!(
            config.session.staleness_threshold,
            Duration::from_millis(750)
        );
        assert_eq!(
            config.session.foreign_step_timeout,
            Duration::from_millis(5000)
        );
    }

    #[test]
    fn zero_tick_interval_is_rejected() {
        let parsed: std::result::Result<AppConfig, _> = r#"
            [session]
            tick_interval = 0
        "#
        .parse();
        assert!(parsed.is_err());
    }
}
