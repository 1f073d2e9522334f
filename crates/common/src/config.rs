//! Configuration management for the middleware stack.
//!
//! Settings are loaded from configuration files and environment variables.
//! Every section has defaults, so an empty source yields a usable
//! configuration with all interceptors enabled.
//!
//! ## Example Configuration
//!
//! ```toml
//! [telemetry]
//! service_name = "orders"
//! json_logging = true
//! log_level = "debug"
//!
//! [metrics]
//! skips = ["/grpc.health.v1.Health/Check"]
//!
//! [recovery]
//! enabled = true
//! ```

use crate::Result;
use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Middleware configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MiddlewareConfig {
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub metrics: MetricsSettings,
    #[serde(default)]
    pub recovery: RecoverySettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Telemetry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Service name reported in logs
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Name of the meter the interceptors record on
    #[serde(default = "default_instrumentation_name")]
    pub instrumentation_name: String,

    /// Enable JSON logging format
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Metrics interceptor settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Full method names ("/service/method") excluded from instrumentation
    #[serde(default)]
    pub skips: Vec<String>,
}

/// Recovery interceptor settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoverySettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Logging interceptor settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

// Default value functions
fn default_service_name() -> String {
    "rpc-middleware".to_string()
}

fn default_instrumentation_name() -> String {
    "rpc-middleware/interceptors".to_string()
}

fn default_json_logging() -> bool {
    false
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            instrumentation_name: default_instrumentation_name(),
            json_logging: default_json_logging(),
            log_level: default_log_level(),
        }
    }
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            skips: Vec::new(),
        }
    }
}

impl Default for RecoverySettings {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl MiddlewareConfig {
    /// Load configuration from configuration files and environment variables.
    ///
    /// Later sources override earlier ones:
    /// 1. Default values
    /// 2. config/default.toml (if exists)
    /// 3. config/{environment}.toml (if exists, where environment is from APP_ENV)
    /// 4. Environment variables (prefixed with APP_), e.g.
    ///    `APP_METRICS__SKIPS=/svc/A,/svc/B`
    pub fn load() -> Result<Self> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{}", env)).required(false))
            .add_source(environment())
            .build()
            .context("Failed to build configuration")?;

        Self::from_built(config)
    }

    /// Load configuration from a TOML document.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::from_str(contents, config::FileFormat::Toml))
            .build()
            .context("Failed to parse configuration")?;

        Self::from_built(config)
    }

    fn from_built(config: config::Config) -> Result<Self> {
        let middleware_config: MiddlewareConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        middleware_config.validate()?;

        Ok(middleware_config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.telemetry.log_level.as_str()) {
            anyhow::bail!(
                "Invalid log level '{}'. Must be one of: {}",
                self.telemetry.log_level,
                valid_log_levels.join(", ")
            );
        }

        if self.telemetry.instrumentation_name.trim().is_empty() {
            anyhow::bail!("Instrumentation name is required");
        }

        if self.metrics.skips.iter().any(|method| method.trim().is_empty()) {
            anyhow::bail!("Metrics skip list must not contain blank method names");
        }

        Ok(())
    }
}

fn environment() -> config::Environment {
    config::Environment::with_prefix("APP")
        .separator("__")
        .list_separator(",")
        .with_list_parse_key("metrics.skips")
        .try_parsing(true)
}
