//! Mock interceptors for testing chain composition.

use async_trait::async_trait;
use parking_lot::RwLock;
use rpc_middleware::{
    CallContext, Payload, UnaryHandler, UnaryInterceptor, UnaryResult, UnaryServerInfo,
};
use std::sync::Arc;

/// Interceptor that records the full method of every call it sees.
#[derive(Clone, Default)]
pub struct RecordingInterceptor {
    calls: Arc<RwLock<Vec<String>>>,
}

impl RecordingInterceptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.read().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.read().len()
    }

    pub fn clear(&self) {
        self.calls.write().clear();
    }
}

#[async_trait]
impl UnaryInterceptor for RecordingInterceptor {
    async fn intercept(
        &self,
        ctx: CallContext,
        request: Payload,
        info: &UnaryServerInfo,
        next: &dyn UnaryHandler,
    ) -> UnaryResult {
        self.calls.write().push(info.full_method().to_string());
        next.call(ctx, request).await
    }
}
