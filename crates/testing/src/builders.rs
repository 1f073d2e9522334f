//! Builders for test inputs.

use rpc_middleware::CallContext;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tonic::metadata::{MetadataMap, MetadataValue};

/// Builder for [`CallContext`] values.
#[derive(Debug, Default)]
pub struct CallContextBuilder {
    metadata: MetadataMap,
    timeout: Option<Duration>,
    cancellation: Option<CancellationToken>,
}

impl CallContextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_request_id(self, request_id: &'static str) -> Self {
        self.with_metadata("x-request-id", request_id)
    }

    pub fn with_metadata(mut self, key: &'static str, value: &'static str) -> Self {
        self.metadata.insert(key, MetadataValue::from_static(value));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    pub fn build(self) -> CallContext {
        let mut ctx = CallContext::from_metadata(self.metadata);
        if let Some(timeout) = self.timeout {
            ctx = ctx.with_deadline(Instant::now() + timeout);
        }
        if let Some(token) = self.cancellation {
            ctx = ctx.with_cancellation(token);
        }
        ctx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_builder() {
        let token = CancellationToken::new();
        let ctx = CallContextBuilder::new()
            .with_request_id("req-7")
            .with_timeout(Duration::from_secs(1))
            .with_cancellation(token.clone())
            .build();

        assert_eq!(
            ctx.metadata().get("x-request-id").unwrap().to_str().unwrap(),
            "req-7"
        );
        assert!(ctx.deadline().is_some());
        token.cancel();
        assert!(ctx.is_cancelled());
    }
}
