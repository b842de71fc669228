//! Application configuration management.
//!
//! Configuration is layered with figment, lowest priority first:
//!
//! 1. Built-in defaults
//! 2. TOML file (`--config PATH`, or `config.toml` in the platform config
//!    directory)
//! 3. `DEVPROBE_*` environment variables (`__` separates nested keys, e.g.
//!    `DEVPROBE_DISCOVERY__MAX_DURATION=90`)
//! 4. CLI flags, applied by the command layer
//!
//! # Example
//!
//! ```toml
//! fail_on_timeout = false
//!
//! [discovery]
//! max_duration = 60        # seconds
//! recheck_interval = 5     # seconds
//! drain_interval = 10      # milliseconds
//! progress_interval = 100  # milliseconds
//!
//! [[connectors]]
//! id = "lan"
//! name = "Living room gateway"
//! broadcast = "255.255.255.255:5683"
//! probe = '{"cmd":"discover"}'
//! listen_window_secs = 10
//! ```

use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::discovery::{SessionTimings, MAX_SESSION_DURATION};

/// Environment variable prefix for configuration overrides.
pub const ENV_PREFIX: &str = "DEVPROBE_";

/// A connector that can run discovery sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectorConfig {
    /// Unique connector identifier used on the command line.
    pub id: String,
    /// Display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Address the probe is sent to.
    pub broadcast: SocketAddr,
    /// Local address to bind. Port 0 picks an ephemeral port.
    pub bind: SocketAddr,
    /// Probe payload sent to devices.
    pub probe: String,
    /// How many times the probe is sent.
    pub probe_attempts: u32,
    /// Delay between probe repeats, in milliseconds.
    pub probe_interval_ms: u64,
    /// How long the scanner listens for responses, in seconds.
    pub listen_window_secs: f64,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            id: String::new(),
            name: None,
            broadcast: SocketAddr::from(([255, 255, 255, 255], 5683)),
            bind: SocketAddr::from(([0, 0, 0, 0], 0)),
            probe: r#"{"cmd":"discover"}"#.to_string(),
            probe_attempts: 3,
            probe_interval_ms: 1000,
            listen_window_secs: 10.0,
        }
    }
}

impl ConnectorConfig {
    /// Name to show to users.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    /// How long the scanner listens for responses.
    #[must_use]
    pub fn listen_window(&self) -> Duration {
        Duration::try_from_secs_f64(self.listen_window_secs).unwrap_or(Duration::ZERO)
    }

    /// Delay between probe repeats.
    #[must_use]
    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }
}

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Session timing budget.
    pub discovery: SessionTimings,
    /// Configured connectors.
    pub connectors: Vec<ConnectorConfig>,
    /// Device store location. Defaults to the platform data directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_path: Option<PathBuf>,
    /// Exit with a distinct code when a session hits its deadline.
    pub fail_on_timeout: bool,
    /// Simplified progress output for screen readers.
    pub accessible: bool,
}

/// Problems found while validating a loaded configuration.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ConfigError {
    /// A connector has no identifier.
    #[error("connector #{0} has an empty id")]
    EmptyId(usize),

    /// Two connectors share an identifier.
    #[error("duplicate connector id '{0}'")]
    DuplicateId(String),

    /// A connector would never send its probe.
    #[error("connector '{0}' must send at least one probe")]
    NoProbes(String),

    /// A connector would never listen for responses.
    #[error("connector '{0}' has an empty listen window")]
    NoListenWindow(String),

    /// A connector's listen window or probe interval is longer than any session.
    #[error("connector '{0}' timings must not exceed {limit:?}", limit = MAX_SESSION_DURATION)]
    TimingTooLong(String),

    /// The discovery timings are inconsistent.
    #[error("invalid [discovery] timings: {0}")]
    Timings(#[from] crate::discovery::TimingError),
}

impl Config {
    /// Load configuration from defaults, the TOML file and the environment.
    ///
    /// When `path` is `None` the platform config file is used if it exists.
    ///
    /// # Errors
    ///
    /// Fails if a source cannot be parsed or the result does not validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(p) => Some(p.to_path_buf()),
            None => Self::default_path().ok(),
        };

        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(file) = &file {
            if path.is_some() && !file.exists() {
                anyhow::bail!("Config file not found: {}", file.display());
            }
            log::debug!("Reading configuration from {}", file.display());
            figment = figment.merge(Toml::file(file));
        }
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config: Config = figment
            .extract()
            .context("Failed to load configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Default platform-specific configuration path.
    ///
    /// # Errors
    ///
    /// Fails if no home directory can be determined.
    pub fn default_path() -> Result<PathBuf> {
        let project_dirs = ProjectDirs::from("com", "devprobe", "devprobe")
            .ok_or_else(|| anyhow::anyhow!("Failed to determine project directories"))?;
        Ok(project_dirs.config_dir().join("config.toml"))
    }

    /// Check connectors and timings for consistency.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.discovery.validate()?;

        let mut seen = HashSet::new();
        for (index, connector) in self.connectors.iter().enumerate() {
            if connector.id.trim().is_empty() {
                return Err(ConfigError::EmptyId(index + 1));
            }
            if !seen.insert(connector.id.as_str()) {
                return Err(ConfigError::DuplicateId(connector.id.clone()));
            }
            if connector.probe_attempts == 0 {
                return Err(ConfigError::NoProbes(connector.id.clone()));
            }
            if connector.listen_window().is_zero() {
                return Err(ConfigError::NoListenWindow(connector.id.clone()));
            }
            if connector.listen_window() > MAX_SESSION_DURATION
                || connector.probe_interval() > MAX_SESSION_DURATION
            {
                return Err(ConfigError::TimingTooLong(connector.id.clone()));
            }
        }
        Ok(())
    }

    /// Look up a connector by identifier.
    #[must_use]
    pub fn connector(&self, id: &str) -> Option<&ConnectorConfig> {
        self.connectors.iter().find(|c| c.id == id)
    }
}
