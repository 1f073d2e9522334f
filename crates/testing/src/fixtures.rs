//! Handler fixtures.
//!
//! Handlers are returned as trait objects so they can be passed straight to
//! an interceptor or a chain as the final stage.

use async_trait::async_trait;
use rpc_middleware::{BoxError, CallContext, Payload, UnaryHandler, UnaryResult};
use std::sync::Arc;
use std::time::Duration;
use tonic::Status;

/// Handler that sleeps for `delay` and then returns its request unchanged.
pub fn slow_handler(delay: Duration) -> Arc<dyn UnaryHandler> {
    Arc::new(SlowEcho { delay })
}

/// Handler that returns its request unchanged.
pub fn echo_handler() -> Arc<dyn UnaryHandler> {
    slow_handler(Duration::ZERO)
}

/// Handler that always fails with `status`.
pub fn failing_handler(status: Status) -> Arc<dyn UnaryHandler> {
    Arc::new(Failing { status })
}

/// Handler that panics with `message` on every call.
pub fn panicking_handler(message: &'static str) -> Arc<dyn UnaryHandler> {
    Arc::new(Panicking { message })
}

struct SlowEcho {
    delay: Duration,
}

#[async_trait]
impl UnaryHandler for SlowEcho {
    async fn call(&self, _ctx: CallContext, request: Payload) -> UnaryResult {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(request)
    }
}

struct Failing {
    status: Status,
}

#[async_trait]
impl UnaryHandler for Failing {
    async fn call(&self, _ctx: CallContext, _request: Payload) -> UnaryResult {
        Err(Box::new(self.status.clone()) as BoxError)
    }
}

struct Panicking {
    message: &'static str,
}

#[async_trait]
impl UnaryHandler for Panicking {
    async fn call(&self, _ctx: CallContext, _request: Payload) -> UnaryResult {
        panic!("{}", self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_echo_returns_request() {
        let response = echo_handler()
            .call(CallContext::new(), Box::new(5u8))
            .await
            .unwrap();
        assert_eq!(*response.downcast::<u8>().unwrap(), 5);
    }

    #[tokio::test]
    async fn test_failing_handler_returns_status() {
        let err = failing_handler(Status::not_found("gone"))
            .call(CallContext::new(), Box::new(()))
            .await
            .unwrap_err();
        assert_eq!(err.downcast_ref::<Status>().unwrap().code(), tonic::Code::NotFound);
    }
}
