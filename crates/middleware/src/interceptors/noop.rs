//! Pass-through interceptor

use crate::server::{
    CallContext, Payload, UnaryHandler, UnaryInterceptor, UnaryResult, UnaryServerInfo,
};
use async_trait::async_trait;

/// Interceptor that calls the next stage and does nothing else.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopInterceptor;

impl NoopInterceptor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl UnaryInterceptor for NoopInterceptor {
    async fn intercept(
        &self,
        ctx: CallContext,
        request: Payload,
        _info: &UnaryServerInfo,
        next: &dyn UnaryHandler,
    ) -> UnaryResult {
        next.call(ctx, request).await
    }
}
