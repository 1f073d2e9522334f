//! Unary interceptors for cross-cutting concerns

pub mod attributes;
pub mod instruments;
pub mod logging;
pub mod metrics;
pub mod noop;
pub mod recovery;

use std::time::Instant;

pub use attributes::{parse_full_method, AttributeSet, MethodDescriptor};
pub use instruments::{InMemoryMetrics, MetricRecorders, MetricsProvider};
pub use logging::LoggingInterceptor;
pub use metrics::{server_interceptor, MetricsInterceptor, MetricsOptions, SkipFilter};
pub use noop::NoopInterceptor;
pub use recovery::{RecoveryInterceptor, RecoveryOptions};

/// Whole milliseconds since `start`, saturating at `u64::MAX`.
pub(crate) fn elapsed_millis(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}
