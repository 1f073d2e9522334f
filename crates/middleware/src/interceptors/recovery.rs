//! Panic recovery interceptor
//!
//! Runs the next stage under `catch_unwind` and turns a panic into an
//! `Internal` status so that one failing handler cannot take the process
//! down. The per-invocation [`InvocationGuard`] moves from `Running` to
//! `Returned` or `Recovered` exactly once; a guard dropped while still
//! `Running` means the caller abandoned the call.

use crate::error::{BoxError, MiddlewareError};
use crate::server::{
    CallContext, Payload, UnaryHandler, UnaryInterceptor, UnaryResult, UnaryServerInfo,
};
use async_trait::async_trait;
use futures::FutureExt;
use rpc_middleware_common::config::RecoverySettings;
use std::any::Any;
use std::backtrace::Backtrace;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tonic::Status;
use tracing::{error, warn};

/// Value a handler panicked with.
pub type PanicPayload = Box<dyn Any + Send + 'static>;

/// Converts a recovered panic into the error returned to the caller.
pub type RecoveryHandler = Arc<dyn Fn(&CallContext, PanicPayload) -> BoxError + Send + Sync>;

/// Upper bound on the stack trace kept for diagnostics.
pub const MAX_STACK_BYTES: usize = 64 << 10;

/// Options for the recovery interceptor.
#[derive(Clone, Default)]
pub struct RecoveryOptions {
    handler: Option<RecoveryHandler>,
}

impl RecoveryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the default panic conversion.
    pub fn with_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&CallContext, PanicPayload) -> BoxError + Send + Sync + 'static,
    {
        self.handler = Some(Arc::new(handler));
        self
    }

    fn finalize(self) -> RecoveryHandler {
        self.handler.unwrap_or_else(|| Arc::new(default_recovery_handler))
    }
}

impl From<&RecoverySettings> for RecoveryOptions {
    fn from(_settings: &RecoverySettings) -> Self {
        Self::new()
    }
}

impl fmt::Debug for RecoveryOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecoveryOptions")
            .field("custom_handler", &self.handler.is_some())
            .finish()
    }
}

/// Recovery interceptor
#[derive(Clone)]
pub struct RecoveryInterceptor {
    handler: RecoveryHandler,
}

impl RecoveryInterceptor {
    pub fn new(options: RecoveryOptions) -> Self {
        Self {
            handler: options.finalize(),
        }
    }
}

impl Default for RecoveryInterceptor {
    fn default() -> Self {
        Self::new(RecoveryOptions::default())
    }
}

#[async_trait]
impl UnaryInterceptor for RecoveryInterceptor {
    async fn intercept(
        &self,
        ctx: CallContext,
        request: Payload,
        info: &UnaryServerInfo,
        next: &dyn UnaryHandler,
    ) -> UnaryResult {
        let guard = InvocationGuard::new(info.full_method());
        // building the handler future may itself panic
        let outcome = AssertUnwindSafe(async { next.call(ctx.clone(), request).await })
            .catch_unwind()
            .await;
        guard.resolve(outcome, |payload| (self.handler)(&ctx, payload))
    }
}

/// State of one guarded invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardState {
    Running,
    Returned,
    Recovered,
}

/// Scoped guard for one invocation.
#[derive(Debug)]
pub struct InvocationGuard<'a> {
    method: &'a str,
    state: GuardState,
}

impl<'a> InvocationGuard<'a> {
    pub fn new(method: &'a str) -> Self {
        Self {
            method,
            state: GuardState::Running,
        }
    }

    pub fn state(&self) -> GuardState {
        self.state
    }

    /// Settle the invocation: pass a normal return through, or convert a
    /// captured panic with `recover`.
    pub fn resolve<F>(
        mut self,
        outcome: Result<UnaryResult, PanicPayload>,
        recover: F,
    ) -> UnaryResult
    where
        F: FnOnce(PanicPayload) -> BoxError,
    {
        match outcome {
            Ok(result) => {
                self.state = GuardState::Returned;
                result
            }
            Err(payload) => {
                self.state = GuardState::Recovered;
                Err(recover(payload))
            }
        }
    }
}

impl Drop for InvocationGuard<'_> {
    fn drop(&mut self) {
        if self.state == GuardState::Running {
            warn!(method = %self.method, "Unary call abandoned before the handler completed");
        }
    }
}

/// Default conversion: log the panic with a bounded stack trace and return
/// an `Internal` status carrying the panic message.
pub fn default_recovery_handler(_ctx: &CallContext, payload: PanicPayload) -> BoxError {
    let stack = capture_stack(MAX_STACK_BYTES);
    let message = panic_message(payload.as_ref());

    error!(panic = %message, stack = %stack, "Handler panicked");

    Box::new(Status::from(MiddlewareError::Panic(message)))
}

/// Render a panic payload as a message.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else if let Some(status) = payload.downcast_ref::<Status>() {
        status.message().to_string()
    } else if let Some(err) = payload.downcast_ref::<BoxError>() {
        err.to_string()
    } else if let Some(err) = payload.downcast_ref::<MiddlewareError>() {
        err.to_string()
    } else {
        "unknown panic payload".to_string()
    }
}

fn capture_stack(limit: usize) -> String {
    let mut stack = Backtrace::force_capture().to_string();
    if stack.len() > limit {
        let mut end = limit;
        while !stack.is_char_boundary(end) {
            end -= 1;
        }
        stack.truncate(end);
    }
    stack
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::handler_fn;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tonic::Code;
    use tracing::{Event, Level, Subscriber};
    use tracing_subscriber::layer::{Context, SubscriberExt};
    use tracing_subscriber::Layer;

    /// Handler that panics while building its future, before any poll.
    struct EagerPanic;

    impl UnaryHandler for EagerPanic {
        fn call<'life0, 'async_trait>(
            &'life0 self,
            _ctx: CallContext,
            _request: Payload,
        ) -> Pin<Box<dyn Future<Output = UnaryResult> + Send + 'async_trait>>
        where
            'life0: 'async_trait,
            Self: 'async_trait,
        {
            panic!("eager boom")
        }
    }

    /// Counts `WARN` events.
    struct WarnCounter(Arc<AtomicUsize>);

    impl<S: Subscriber> Layer<S> for WarnCounter {
        fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
            if *event.metadata().level() == Level::WARN {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    fn count_warnings(f: impl FnOnce()) -> usize {
        let warnings = Arc::new(AtomicUsize::new(0));
        let subscriber = tracing_subscriber::registry().with(WarnCounter(warnings.clone()));
        tracing::subscriber::with_default(subscriber, f);
        warnings.load(Ordering::SeqCst)
    }

    fn info() -> UnaryServerInfo {
        UnaryServerInfo::new("/svc/Get")
    }

    #[tokio::test]
    async fn test_panic_becomes_internal_status() {
        let handler = handler_fn(|_ctx: CallContext, _request: Payload| async {
            if true {
                panic!("boom");
            }
            Ok::<Payload, BoxError>(Box::new(()))
        });

        let err = RecoveryInterceptor::default()
            .intercept(CallContext::new(), Box::new(()), &info(), &handler)
            .await
            .unwrap_err();

        let status = err.downcast_ref::<Status>().unwrap();
        assert_eq!(status.code(), Code::Internal);
        assert_eq!(status.message(), "panic triggered: boom");
    }

    #[tokio::test]
    async fn test_normal_return_passes_through() {
        let handler = handler_fn(|_ctx: CallContext, request: Payload| async move {
            let n = *request.downcast::<u8>().unwrap();
            Ok::<Payload, BoxError>(Box::new(n + 1))
        });

        let response = RecoveryInterceptor::default()
            .intercept(CallContext::new(), Box::new(1u8), &info(), &handler)
            .await
            .unwrap();
        assert_eq!(*response.downcast::<u8>().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_business_error_passes_through() {
        let handler = handler_fn(|_ctx: CallContext, _request: Payload| async {
            Err::<Payload, BoxError>(Box::new(Status::invalid_argument("bad id")))
        });

        let err = RecoveryInterceptor::default()
            .intercept(CallContext::new(), Box::new(()), &info(), &handler)
            .await
            .unwrap_err();
        let status = err.downcast_ref::<Status>().unwrap();
        assert_eq!(status.code(), Code::InvalidArgument);
        assert_eq!(status.message(), "bad id");
    }

    #[tokio::test]
    async fn test_custom_handler_is_used() {
        let handler = handler_fn(|_ctx: CallContext, _request: Payload| async {
            if true {
                panic!("{}", 42);
            }
            Ok::<Payload, BoxError>(Box::new(()))
        });

        let interceptor = RecoveryInterceptor::new(RecoveryOptions::new().with_handler(
            |_ctx: &CallContext, payload: PanicPayload| -> BoxError {
                Box::new(Status::unavailable(panic_message(payload.as_ref())))
            },
        ));

        let err = interceptor
            .intercept(CallContext::new(), Box::new(()), &info(), &handler)
            .await
            .unwrap_err();
        let status = err.downcast_ref::<Status>().unwrap();
        assert_eq!(status.code(), Code::Unavailable);
        assert_eq!(status.message(), "42");
    }

    #[test]
    fn test_panic_message_payload_kinds() {
        assert_eq!(panic_message(&"static"), "static");
        assert_eq!(panic_message(&String::from("owned")), "owned");
        assert_eq!(panic_message(&Status::aborted("status")), "status");
        let err: BoxError = "boxed".into();
        assert_eq!(panic_message(&err), "boxed");
        assert_eq!(panic_message(&17u32), "unknown panic payload");
    }

    #[test]
    fn test_guard_states() {
        let guard = InvocationGuard::new("/svc/Get");
        assert_eq!(guard.state(), GuardState::Running);

        let result = guard.resolve(Ok(Ok(Box::new(()) as Payload)), |_| unreachable!());
        assert!(result.is_ok());

        let guard = InvocationGuard::new("/svc/Get");
        let result = guard.resolve(Err(Box::new("boom") as PanicPayload), |payload| {
            panic_message(payload.as_ref()).into()
        });
        assert_eq!(result.unwrap_err().to_string(), "boom");
    }

    #[test]
    fn test_capture_stack_is_bounded() {
        assert!(capture_stack(16).len() <= 16);
    }

    #[tokio::test]
    async fn test_panic_while_building_future_is_recovered() {
        let err = RecoveryInterceptor::default()
            .intercept(CallContext::new(), Box::new(()), &info(), &EagerPanic)
            .await
            .unwrap_err();

        let status = err.downcast_ref::<Status>().unwrap();
        assert_eq!(status.code(), Code::Internal);
        assert_eq!(status.message(), "panic triggered: eager boom");
    }

    #[test]
    fn test_abandoned_guard_warns() {
        let warnings = count_warnings(|| drop(InvocationGuard::new("/svc/Get")));
        assert_eq!(warnings, 1);
    }

    #[test]
    fn test_resolved_guard_does_not_warn() {
        let warnings = count_warnings(|| {
            let guard = InvocationGuard::new("/svc/Get");
            let _ = guard.resolve(Ok(Ok(Box::new(()) as Payload)), |_| unreachable!());
        });
        assert_eq!(warnings, 0);
    }

    #[test]
    fn test_dropped_invocation_warns() {
        let handler = handler_fn(|_ctx: CallContext, request: Payload| async move {
            futures::future::pending::<()>().await;
            Ok::<Payload, BoxError>(request)
        });
        let interceptor = RecoveryInterceptor::default();
        let info = info();

        let warnings = count_warnings(|| {
            let mut call =
                interceptor.intercept(CallContext::new(), Box::new(()), &info, &handler);
            // first poll starts the handler, which never completes
            assert!(futures::FutureExt::now_or_never(call.as_mut()).is_none());
            drop(call);
        });
        assert_eq!(warnings, 1);
    }
}
