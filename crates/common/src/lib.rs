//! Shared configuration, telemetry and helper utilities for the RPC
//! middleware crates.
//!
//! - Configuration management
//! - Tracing setup and meter lookup
//! - Legacy certificate helpers

pub mod config;
pub mod cryptox;
pub mod telemetry;

pub use self::config::{
    LoggingSettings, MetricsSettings, MiddlewareConfig, RecoverySettings, TelemetryConfig,
};
pub use telemetry::{init_tracing, meter};

/// Common error type used throughout the crate
pub type Result<T> = std::result::Result<T, anyhow::Error>;
