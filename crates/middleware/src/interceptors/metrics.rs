//! Metrics interceptor for unary calls
//!
//! Records started/handled request counts, received/sent message counts and
//! handling latency per method. Methods in the skip list are passed through
//! without touching any instrument.

use super::attributes::AttributeSet;
use super::instruments::{MetricRecorders, MetricsProvider};
use super::elapsed_millis;
use super::noop::NoopInterceptor;
use crate::error::{MiddlewareError, MiddlewareResult};
use crate::server::{
    CallContext, Payload, SharedInterceptor, UnaryHandler, UnaryInterceptor, UnaryResult,
    UnaryServerInfo,
};
use async_trait::async_trait;
use opentelemetry::global;
use opentelemetry::metrics::MetricsError;
use rpc_middleware_common::config::MetricsSettings;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error};

/// Options for the metrics interceptor.
#[derive(Debug, Clone, Default)]
pub struct MetricsOptions {
    skips: Vec<String>,
}

impl MetricsOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exclude the given full method names from instrumentation.
    pub fn with_skips<I, S>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.skips.extend(methods.into_iter().map(Into::into));
        self
    }

    pub fn skips(&self) -> &[String] {
        &self.skips
    }

    /// Fill in defaults and freeze the skip list.
    fn finalize(self) -> SkipFilter {
        self.skips
            .into_iter()
            .filter(|method| !method.trim().is_empty())
            .collect()
    }
}

impl From<&MetricsSettings> for MetricsOptions {
    fn from(settings: &MetricsSettings) -> Self {
        Self::new().with_skips(settings.skips.iter().cloned())
    }
}

/// Full method names excluded from instrumentation.
#[derive(Debug, Clone, Default)]
pub struct SkipFilter {
    methods: HashSet<String>,
}

impl SkipFilter {
    pub fn contains(&self, full_method: &str) -> bool {
        self.methods.contains(full_method)
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

impl FromIterator<String> for SkipFilter {
    fn from_iter<T: IntoIterator<Item = String>>(iter: T) -> Self {
        Self {
            methods: iter.into_iter().collect(),
        }
    }
}

/// Metrics interceptor
#[derive(Clone)]
pub struct MetricsInterceptor {
    recorders: MetricRecorders,
    skips: SkipFilter,
}

impl MetricsInterceptor {
    /// Create the interceptor, failing if any instrument cannot be created.
    pub fn try_new(
        provider: &dyn MetricsProvider,
        options: MetricsOptions,
    ) -> MiddlewareResult<Self> {
        let recorders = MetricRecorders::new(provider)?;
        let skips = options.finalize();
        debug!(skips = skips.len(), "Metrics interceptor created");
        Ok(Self { recorders, skips })
    }

    pub fn skips(&self) -> &SkipFilter {
        &self.skips
    }
}

#[async_trait]
impl UnaryInterceptor for MetricsInterceptor {
    async fn intercept(
        &self,
        ctx: CallContext,
        request: Payload,
        info: &UnaryServerInfo,
        next: &dyn UnaryHandler,
    ) -> UnaryResult {
        if self.skips.contains(info.full_method()) {
            return next.call(ctx, request).await;
        }

        let start = Instant::now();
        let attributes = AttributeSet::for_method(info);
        self.recorders.started.add(1, attributes.as_slice());
        self.recorders.msg_received.add(1, attributes.as_slice());

        let result = next.call(ctx, request).await;

        if result.is_ok() {
            self.recorders.msg_sent.add(1, attributes.as_slice());
        }
        self.recorders
            .handling
            .record(elapsed_millis(start), attributes.as_slice());
        self.recorders
            .handled
            .add(1, attributes.with_outcome(&result).as_slice());

        result
    }
}

/// Build the metrics interceptor, degrading to a pass-through interceptor
/// when the instruments cannot be created.
pub fn server_interceptor(
    provider: &dyn MetricsProvider,
    options: MetricsOptions,
) -> SharedInterceptor {
    match MetricsInterceptor::try_new(provider, options) {
        Ok(interceptor) => Arc::new(interceptor),
        Err(err) => {
            report_setup_error(err);
            Arc::new(NoopInterceptor::new())
        }
    }
}

fn report_setup_error(err: MiddlewareError) {
    error!(error = %err, "Metrics disabled, falling back to pass-through interceptor");
    match err {
        MiddlewareError::Instrument { source, .. } => global::handle_error(source),
        other => global::handle_error(MetricsError::Other(other.to_string())),
    }
}
