//! TOML Configuration File Support
//!
//! Centralized configuration loading for the painter, supporting a TOML file at
//! `~/.config/canvas-painter/painter.toml`.
//!
//! # Configuration Priority
//!
//! Values are loaded with the following priority (highest first):
//! 1. CLI arguments ([`ConfigOverrides`])
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [remote]
//! base_url = "https://josephg.com/sp"
//! realtime_url = "wss://josephg.com/sp/ws"
//! request_timeout_secs = 60
//!
//! [canvas]
//! width = 1000
//! height = 1000
//!
//! [scheduler]
//! budget_per_window = 30
//! window_secs = 10
//! paint_over_white_cost = 2
//! paint_over_other_cost = 5
//!
//! [painter]
//! settle_delay_ms = 5000
//!
//! [realtime]
//! close_timeout_ms = 1000
//!
//! [[patterns]]
//! x = 100
//! y = 200
//! path = "/home/me/art/logo.png"
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::canvas::CanvasDims;
use crate::error::PainterResult;
use crate::painter::PainterSettings;
use crate::pattern::PatternSource;
use crate::realtime::RealtimeConfig;
use crate::remote::RemoteConfig;
use crate::scheduler::SchedulerConfig;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Tracks where a configuration value came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// Remote section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteToml {
    /// Service root for snapshot and edit requests
    pub base_url: Option<String>,

    /// WebSocket endpoint for the diff stream
    pub realtime_url: Option<String>,

    /// User-Agent for HTTP and WebSocket requests
    pub user_agent: Option<String>,

    /// HTTP request timeout in seconds
    pub request_timeout_secs: Option<u64>,
}

/// Canvas section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CanvasToml {
    /// Canvas width in pixels
    pub width: Option<u16>,

    /// Canvas height in pixels
    pub height: Option<u16>,
}

/// Scheduler section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerToml {
    /// Cost budget per window
    pub budget_per_window: Option<u32>,

    /// Window length in seconds
    pub window_secs: Option<u64>,

    /// Cost of painting over a white pixel
    pub paint_over_white_cost: Option<u32>,

    /// Cost of painting over anything else
    pub paint_over_other_cost: Option<u32>,

    /// Re-check interval while only pending writes block, in milliseconds
    pub poll_interval_ms: Option<u64>,
}

/// Painter section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PainterToml {
    /// In-flight hold after a write resolves, in milliseconds
    pub settle_delay_ms: Option<u64>,

    /// Sleep when nothing needs correcting, in milliseconds
    pub idle_interval_ms: Option<u64>,

    /// Poll interval while waiting for the first snapshot, in milliseconds
    pub warmup_poll_ms: Option<u64>,
}

/// Realtime section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeToml {
    /// Close handshake timeout in milliseconds
    pub close_timeout_ms: Option<u64>,

    /// Delay between failed dials in milliseconds
    pub reconnect_delay_ms: Option<u64>,

    /// Delay before refetching an unusable snapshot, in milliseconds
    pub snapshot_retry_delay_ms: Option<u64>,
}

/// One `[[patterns]]` entry
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternEntry {
    /// Left edge on the canvas
    pub x: u16,

    /// Top edge on the canvas
    pub y: u16,

    /// PNG asset path
    pub path: PathBuf,

    /// Expected asset width
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u16>,

    /// Expected asset height
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u16>,
}

impl PatternEntry {
    /// Create an entry without size expectations
    #[must_use]
    pub fn new(x: u16, y: u16, path: impl Into<PathBuf>) -> Self {
        Self {
            x,
            y,
            path: path.into(),
            width: None,
            height: None,
        }
    }

    /// Parse the CLI form `x,y,path`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if the coordinates are missing
    /// or not numbers.
    pub fn parse(spec: &str) -> Result<Self, ConfigError> {
        let mut parts = spec.splitn(3, ',');
        let bad = || ConfigError::ValidationError(format!("Invalid pattern '{spec}' (expected x,y,path)"));
        let x = parts.next().and_then(|s| s.trim().parse().ok()).ok_or_else(bad)?;
        let y = parts.next().and_then(|s| s.trim().parse().ok()).ok_or_else(bad)?;
        let path = parts.next().filter(|p| !p.is_empty()).ok_or_else(bad)?;
        Ok(Self::new(x, y, path))
    }

    fn expected_size(&self) -> Option<(u16, u16)> {
        self.width.zip(self.height)
    }

    /// Load and anchor the asset
    ///
    /// # Errors
    ///
    /// Returns `PainterError::Format` if the asset is unreadable, mis-sized or
    /// does not fit the canvas.
    pub fn load(&self, canvas: CanvasDims) -> PainterResult<PatternSource> {
        PatternSource::load(&self.path, self.x, self.y, self.expected_size(), canvas)
    }
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PainterConfigToml {
    /// Remote section
    pub remote: RemoteToml,

    /// Canvas section
    pub canvas: CanvasToml,

    /// Scheduler section
    pub scheduler: SchedulerToml,

    /// Painter section
    pub painter: PainterToml,

    /// Realtime section
    pub realtime: RealtimeToml,

    /// Patterns in priority order
    pub patterns: Vec<PatternEntry>,
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// Centralized configuration for the painter
#[derive(Clone, Debug)]
pub struct PainterConfig {
    /// HTTP client settings
    pub remote: RemoteConfig,

    /// Realtime stream settings
    pub realtime: RealtimeConfig,

    /// Canvas size
    pub canvas: CanvasDims,

    /// Admission budget
    pub scheduler: SchedulerConfig,

    /// Dispatch loop timing
    pub painter: PainterSettings,

    /// Delay before refetching a snapshot that could not be applied
    pub snapshot_retry_delay: Duration,

    /// Patterns in priority order
    pub patterns: Vec<PatternEntry>,

    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,

    /// Source of configuration values
    source: ConfigSource,
}

impl Default for PainterConfig {
    fn default() -> Self {
        Self {
            remote: RemoteConfig::default(),
            realtime: RealtimeConfig::default(),
            canvas: CanvasDims::default(),
            scheduler: SchedulerConfig::default(),
            painter: PainterSettings::default(),
            snapshot_retry_delay: Duration::ZERO,
            patterns: Vec::new(),
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl PainterConfig {
    /// Create a new configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the primary source of this configuration
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Check values that would make the painter misbehave
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` describing the first problem.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let s = &self.scheduler;
        if s.window.is_zero() {
            return Err(ConfigError::ValidationError(
                "scheduler.window_secs must be greater than zero".to_string(),
            ));
        }
        if s.budget_per_window == 0 {
            return Err(ConfigError::ValidationError(
                "scheduler.budget_per_window must be greater than zero".to_string(),
            ));
        }
        if s.cheapest_cost() == 0 {
            return Err(ConfigError::ValidationError(
                "scheduler costs must be greater than zero".to_string(),
            ));
        }
        if s.worst_case_cost() > s.budget_per_window {
            return Err(ConfigError::ValidationError(format!(
                "a write costing {} can never fit a budget of {}",
                s.worst_case_cost(),
                s.budget_per_window
            )));
        }
        if self.canvas.width == 0 || self.canvas.height == 0 {
            return Err(ConfigError::ValidationError(
                "canvas dimensions must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Load every configured pattern, in priority order
    ///
    /// # Errors
    ///
    /// Returns the first asset that fails to load.
    pub fn load_patterns(&self) -> PainterResult<Vec<PatternSource>> {
        self.patterns
            .iter()
            .map(|entry| entry.load(self.canvas))
            .collect()
    }

    fn set_user_agent(&mut self, agent: &str) {
        self.remote.user_agent = agent.to_string();
        self.realtime.user_agent = agent.to_string();
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/canvas-painter/painter.toml` or
/// `~/.config/canvas-painter/painter.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("canvas-painter").join("painter.toml"))
}

/// Load configuration from all sources with proper priority
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed.
/// A missing config file is not an error (defaults are used).
pub fn load_config() -> Result<PainterConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<PainterConfig, ConfigError> {
    let mut config = PainterConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: PainterConfigToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, &toml_config);
            config.config_file_path = Some(config_path.clone());
            config.source = ConfigSource::File;

            tracing::info!(
                path = %config_path.display(),
                patterns = config.patterns.len(),
                "Loaded configuration from file"
            );
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    apply_env_config(&mut config, |key| std::env::var(key).ok());

    Ok(config)
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut PainterConfig, toml: &PainterConfigToml) {
    // Remote
    if let Some(url) = &toml.remote.base_url {
        config.remote.base_url.clone_from(url);
    }
    if let Some(url) = &toml.remote.realtime_url {
        config.realtime.url.clone_from(url);
    }
    if let Some(agent) = &toml.remote.user_agent {
        config.set_user_agent(agent);
    }
    if let Some(secs) = toml.remote.request_timeout_secs {
        config.remote.request_timeout = Duration::from_secs(secs);
    }

    // Canvas
    if let Some(width) = toml.canvas.width {
        config.canvas.width = width;
    }
    if let Some(height) = toml.canvas.height {
        config.canvas.height = height;
    }

    // Scheduler
    if let Some(budget) = toml.scheduler.budget_per_window {
        config.scheduler.budget_per_window = budget;
    }
    if let Some(secs) = toml.scheduler.window_secs {
        config.scheduler.window = Duration::from_secs(secs);
    }
    if let Some(cost) = toml.scheduler.paint_over_white_cost {
        config.scheduler.paint_over_white_cost = cost;
    }
    if let Some(cost) = toml.scheduler.paint_over_other_cost {
        config.scheduler.paint_over_other_cost = cost;
    }
    if let Some(ms) = toml.scheduler.poll_interval_ms {
        config.scheduler.poll_interval = Duration::from_millis(ms);
    }

    // Painter
    if let Some(ms) = toml.painter.settle_delay_ms {
        config.painter.settle_delay = Duration::from_millis(ms);
    }
    if let Some(ms) = toml.painter.idle_interval_ms {
        config.painter.idle_interval = Duration::from_millis(ms);
    }
    if let Some(ms) = toml.painter.warmup_poll_ms {
        config.painter.warmup_poll = Duration::from_millis(ms);
    }

    // Realtime
    if let Some(ms) = toml.realtime.close_timeout_ms {
        config.realtime.close_timeout = Duration::from_millis(ms);
    }
    if let Some(ms) = toml.realtime.reconnect_delay_ms {
        config.realtime.reconnect_delay = Duration::from_millis(ms);
    }
    if let Some(ms) = toml.realtime.snapshot_retry_delay_ms {
        config.snapshot_retry_delay = Duration::from_millis(ms);
    }

    if !toml.patterns.is_empty() {
        config.patterns.clone_from(&toml.patterns);
    }
}

/// Apply environment variable overrides to the config
///
/// `lookup` resolves a variable name; unparseable values are ignored.
fn apply_env_config(config: &mut PainterConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(url) = lookup("PAINTER_BASE_URL") {
        config.remote.base_url = url;
        config.source = ConfigSource::Env;
    }
    if let Some(url) = lookup("PAINTER_REALTIME_URL") {
        config.realtime.url = url;
        config.source = ConfigSource::Env;
    }
    if let Some(agent) = lookup("PAINTER_USER_AGENT") {
        config.set_user_agent(&agent);
        config.source = ConfigSource::Env;
    }
    if let Some(budget) = lookup("PAINTER_BUDGET") {
        if let Ok(n) = budget.parse::<u32>() {
            config.scheduler.budget_per_window = n;
            config.source = ConfigSource::Env;
        }
    }
    if let Some(window) = lookup("PAINTER_WINDOW_SECS") {
        if let Ok(secs) = window.parse::<u64>() {
            config.scheduler.window = Duration::from_secs(secs);
            config.source = ConfigSource::Env;
        }
    }
    if let Some(settle) = lookup("PAINTER_SETTLE_MS") {
        if let Ok(ms) = settle.parse::<u64>() {
            config.painter.settle_delay = Duration::from_millis(ms);
            config.source = ConfigSource::Env;
        }
    }
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Builder for applying CLI overrides to configuration
///
/// Use this after [`load_config`] to apply command-line argument overrides.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Service root override
    pub base_url: Option<String>,

    /// Realtime endpoint override
    pub realtime_url: Option<String>,

    /// Budget override
    pub budget_per_window: Option<u32>,

    /// Patterns replacing the configured list
    pub patterns: Vec<PatternEntry>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set service root override
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set realtime endpoint override
    #[must_use]
    pub fn with_realtime_url(mut self, url: impl Into<String>) -> Self {
        self.realtime_url = Some(url.into());
        self
    }

    /// Set budget override
    #[must_use]
    pub fn with_budget(mut self, budget: u32) -> Self {
        self.budget_per_window = Some(budget);
        self
    }

    /// Add a pattern; any CLI pattern replaces the configured list
    #[must_use]
    pub fn with_pattern(mut self, entry: PatternEntry) -> Self {
        self.patterns.push(entry);
        self
    }

    /// Apply overrides to a configuration
    pub fn apply(&self, config: &mut PainterConfig) {
        if self.base_url.is_some()
            || self.realtime_url.is_some()
            || self.budget_per_window.is_some()
            || !self.patterns.is_empty()
        {
            config.source = ConfigSource::Cli;
        }

        if let Some(url) = &self.base_url {
            config.remote.base_url.clone_from(url);
        }
        if let Some(url) = &self.realtime_url {
            config.realtime.url.clone_from(url);
        }
        if let Some(budget) = self.budget_per_window {
            config.scheduler.budget_per_window = budget;
        }
        if !self.patterns.is_empty() {
            config.patterns.clone_from(&self.patterns);
        }
    }
}
