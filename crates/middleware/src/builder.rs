//! Standard interceptor stack assembled from configuration

use crate::interceptors::instruments::MetricsProvider;
use crate::interceptors::{
    metrics, LoggingInterceptor, MetricsOptions, RecoveryInterceptor, RecoveryOptions,
};
use crate::server::InterceptorChain;
use rpc_middleware_common::config::MiddlewareConfig;
use tracing::info;

/// Builds the server interceptor chain.
///
/// Stages run in the order logging, metrics, recovery, handler. Recovery sits
/// inside metrics so that a recovered panic is still counted as a handled
/// call with code `Internal`.
pub struct ServerInterceptors;

impl ServerInterceptors {
    /// Create the chain for `config`, leaving out disabled stages.
    pub fn from_config(
        config: &MiddlewareConfig,
        provider: &dyn MetricsProvider,
    ) -> InterceptorChain {
        let mut chain = InterceptorChain::new();

        if config.logging.enabled {
            chain = chain.with(LoggingInterceptor::new());
        }
        if config.metrics.enabled {
            chain = chain.with_shared(metrics::server_interceptor(
                provider,
                MetricsOptions::from(&config.metrics),
            ));
        }
        if config.recovery.enabled {
            chain = chain.with(RecoveryInterceptor::new(RecoveryOptions::from(
                &config.recovery,
            )));
        }

        info!(
            logging = config.logging.enabled,
            metrics = config.metrics.enabled,
            recovery = config.recovery.enabled,
            skips = config.metrics.skips.len(),
            "Interceptor chain configured"
        );
        chain
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interceptors::InMemoryMetrics;

    #[test]
    fn test_default_config_enables_every_stage() {
        let metrics = InMemoryMetrics::new();
        let chain = ServerInterceptors::from_config(&MiddlewareConfig::default(), &metrics);
        assert_eq!(chain.len(), 3);
    }

    #[test]
    fn test_disabled_stages_are_left_out() {
        let mut config = MiddlewareConfig::default();
        config.logging.enabled = false;
        config.metrics.enabled = false;

        let metrics = InMemoryMetrics::new();
        let chain = ServerInterceptors::from_config(&config, &metrics);
        assert_eq!(chain.len(), 1);
        assert!(metrics.instrument_names().is_empty());
    }
}
