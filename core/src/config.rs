use crate::store::{MonitoringMode, ServiceScope};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Environment variable consulted when `backend.api_key` is not set.
pub const API_KEY_ENV: &str = "OBSERVER_API_KEY";

/// Main configuration structure for Observer.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub live: LiveConfig,

    #[serde(default)]
    pub investigation: InvestigationConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Read `observer.toml`-style settings from `path`. A missing file is not
    /// an error: every section has defaults. A file that exists but does not
    /// parse is.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using built-in defaults");
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read observer config {}", path.display()))?;
        contents
            .parse()
            .with_context(|| format!("invalid observer config {}", path.display()))
    }

    /// The effective settings rendered back to TOML, as `observer config` prints them.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("cannot render observer config as TOML")
    }

    /// Validate the configuration for obvious misconfiguration.
    pub fn validate(&self) -> Result<()> {
        let base_url = self.backend.base_url.trim();
        if base_url.is_empty() {
            anyhow::bail!("backend.base_url cannot be empty");
        }
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            anyhow::bail!("backend.base_url must be an http(s) URL: {}", base_url);
        }

        let push_url = self.backend.push_url.trim();
        if !(push_url.starts_with("ws://") || push_url.starts_with("wss://")) {
            anyhow::bail!("backend.push_url must be a ws(s) URL: {}", push_url);
        }

        if self.backend.request_timeout_secs == 0 {
            anyhow::bail!("backend.request_timeout_secs must be greater than 0");
        }

        if self.live.reconnect_delay_ms == 0 {
            anyhow::bail!("live.reconnect_delay_ms must be greater than 0");
        }

        if self.investigation.gateway_service.trim().is_empty() {
            anyhow::bail!("investigation.gateway_service cannot be empty");
        }

        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => anyhow::bail!("Invalid log level: {}", other),
        }

        Ok(())
    }
}

impl FromStr for Config {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let config: Config = toml::from_str(s).context("malformed observer config TOML")?;
        Ok(config)
    }
}

/// Where the telemetry backend lives.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_push_url")]
    pub push_url: String,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl BackendConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// The configured key, or `OBSERVER_API_KEY` when none is configured.
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var(API_KEY_ENV).ok())
            .filter(|key| !key.trim().is_empty())
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            push_url: default_push_url(),
            request_timeout_secs: default_request_timeout(),
            api_key: None,
        }
    }
}

/// Live feed settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LiveConfig {
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_ms: u64,

    #[serde(default = "default_service")]
    pub default_service: ServiceScope,

    #[serde(default)]
    pub monitoring_mode: MonitoringMode,
}

impl LiveConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            reconnect_delay_ms: default_reconnect_delay(),
            default_service: default_service(),
            monitoring_mode: MonitoringMode::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InvestigationConfig {
    /// Spans from this service are classified as API calls.
    #[serde(default = "default_gateway_service")]
    pub gateway_service: String,
}

impl Default for InvestigationConfig {
    fn default() -> Self {
        Self {
            gateway_service: default_gateway_service(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub include_modules: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            include_modules: false,
        }
    }
}

// Default providers ---------------------------------------------------------

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_push_url() -> String {
    "ws://localhost:8000/ws".to_string()
}

fn default_request_timeout() -> u64 {
    10
}

fn default_reconnect_delay() -> u64 {
    2000
}

fn default_service() -> ServiceScope {
    ServiceScope::All
}

fn default_gateway_service() -> String {
    "api-gateway".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

// Tests ---------------------------------------------------------------------
