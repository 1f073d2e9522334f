//! Telemetry and observability setup.
//!
//! Structured logging through `tracing` and access to the OpenTelemetry
//! meter the interceptors record on.

use crate::config::TelemetryConfig;
use crate::Result;
use anyhow::Context;
use opentelemetry::global;
use opentelemetry::metrics::Meter;
use tracing::Subscriber;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

/// Initialize tracing.
///
/// `RUST_LOG` takes precedence over the configured log level.
///
/// # Examples
///
/// ```no_run
/// use rpc_middleware_common::{config::TelemetryConfig, telemetry::init_tracing};
///
/// init_tracing(&TelemetryConfig::default()).expect("Failed to initialize tracing");
/// ```
pub fn init_tracing(config: &TelemetryConfig) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let registry = Registry::default().with(env_filter);

    if config.json_logging {
        registry
            .with(json_layer())
            .try_init()
            .context("Failed to initialize tracing subscriber")?;
    } else {
        registry
            .with(pretty_layer())
            .try_init()
            .context("Failed to initialize tracing subscriber")?;
    }

    tracing::info!(service = %config.service_name, "Tracing initialized");
    Ok(())
}

/// Create a JSON logging layer
fn json_layer<S>() -> impl Layer<S>
where
    S: Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_thread_ids(true)
        .with_target(true)
        .with_level(true)
}

/// Create a pretty-formatted logging layer
fn pretty_layer<S>() -> impl Layer<S>
where
    S: Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fmt::layer()
        .pretty()
        .with_thread_names(true)
        .with_target(true)
        .with_level(true)
        .with_span_events(FmtSpan::CLOSE)
}

/// Meter registered under the configured instrumentation name on the
/// global meter provider.
pub fn meter(config: &TelemetryConfig) -> Meter {
    global::meter(config.instrumentation_name.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_twice() {
        let config = TelemetryConfig::default();
        // only one global subscriber can be installed per process
        let first = init_tracing(&config);
        let second = init_tracing(&config);
        assert!(first.is_err() || second.is_err());
    }

    #[test]
    fn test_meter_from_config() {
        let meter = meter(&TelemetryConfig::default());
        let counter = meter.u64_counter("test.counter").init();
        counter.add(1, &[]);
    }
}
