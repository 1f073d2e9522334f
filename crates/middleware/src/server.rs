//! Unary call contract, interceptor chaining and in-process dispatch.
//!
//! The hosting server hands every unary invocation to an interceptor as
//! `(context, request, call metadata, next handler)`. Interceptors are
//! composed into an [`InterceptorChain`]; the first interceptor added is the
//! outermost one.

use crate::error::{into_status, BoxError, MiddlewareError};
use async_trait::async_trait;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tonic::metadata::MetadataMap;
use tonic::Status;
use tracing::{debug, info};

/// Opaque request or response value.
pub type Payload = Box<dyn Any + Send>;

/// Outcome of one unary invocation.
pub type UnaryResult = Result<Payload, BoxError>;

/// Interceptor shared between concurrent invocations.
pub type SharedInterceptor = Arc<dyn UnaryInterceptor>;

/// Kind of call being served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Unary,
}

impl CallKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unary => "unary",
        }
    }
}

/// Call metadata for a single invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnaryServerInfo {
    full_method: String,
    kind: CallKind,
}

impl UnaryServerInfo {
    /// Create call metadata for `full_method` ("/service/method").
    pub fn new(full_method: impl Into<String>) -> Self {
        Self {
            full_method: full_method.into(),
            kind: CallKind::Unary,
        }
    }

    pub fn full_method(&self) -> &str {
        &self.full_method
    }

    pub fn kind(&self) -> CallKind {
        self.kind
    }
}

/// Caller context passed unchanged through every stage.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    metadata: MetadataMap,
    deadline: Option<Instant>,
    cancellation: CancellationToken,
}

impl CallContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a context from incoming request metadata.
    pub fn from_metadata(metadata: MetadataMap) -> Self {
        Self {
            metadata,
            ..Default::default()
        }
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn metadata(&self) -> &MetadataMap {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut MetadataMap {
        &mut self.metadata
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

/// Next stage of a unary invocation.
#[async_trait]
pub trait UnaryHandler: Send + Sync {
    async fn call(&self, ctx: CallContext, request: Payload) -> UnaryResult;
}

/// Cross-cutting wrapper around a unary handler.
#[async_trait]
pub trait UnaryInterceptor: Send + Sync {
    async fn intercept(
        &self,
        ctx: CallContext,
        request: Payload,
        info: &UnaryServerInfo,
        next: &dyn UnaryHandler,
    ) -> UnaryResult;
}

/// Handler backed by an async closure. See [`handler_fn`].
#[derive(Clone)]
pub struct HandlerFn<F> {
    f: F,
}

/// Wrap an async closure as a [`UnaryHandler`].
pub fn handler_fn<F, Fut>(f: F) -> HandlerFn<F>
where
    F: Fn(CallContext, Payload) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = UnaryResult> + Send + 'static,
{
    HandlerFn { f }
}

#[async_trait]
impl<F, Fut> UnaryHandler for HandlerFn<F>
where
    F: Fn(CallContext, Payload) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = UnaryResult> + Send + 'static,
{
    async fn call(&self, ctx: CallContext, request: Payload) -> UnaryResult {
        (self.f)(ctx, request).await
    }
}

/// Ordered list of interceptors, itself usable as an interceptor.
#[derive(Clone, Default)]
pub struct InterceptorChain {
    interceptors: Vec<SharedInterceptor>,
}

impl InterceptorChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an interceptor; it runs inside every interceptor added before it.
    pub fn with<I>(mut self, interceptor: I) -> Self
    where
        I: UnaryInterceptor + 'static,
    {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    pub fn with_shared(mut self, interceptor: SharedInterceptor) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    pub fn push(&mut self, interceptor: SharedInterceptor) {
        self.interceptors.push(interceptor);
    }

    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    /// Run `handler` behind every interceptor of the chain.
    pub async fn invoke(
        &self,
        ctx: CallContext,
        request: Payload,
        info: &UnaryServerInfo,
        handler: &dyn UnaryHandler,
    ) -> UnaryResult {
        let next = Next {
            interceptors: &self.interceptors,
            info,
            handler,
        };
        next.call(ctx, request).await
    }
}

impl fmt::Debug for InterceptorChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorChain")
            .field("len", &self.interceptors.len())
            .finish()
    }
}

#[async_trait]
impl UnaryInterceptor for InterceptorChain {
    async fn intercept(
        &self,
        ctx: CallContext,
        request: Payload,
        info: &UnaryServerInfo,
        next: &dyn UnaryHandler,
    ) -> UnaryResult {
        self.invoke(ctx, request, info, next).await
    }
}

/// Remaining stages of a chain for one invocation.
struct Next<'a> {
    interceptors: &'a [SharedInterceptor],
    info: &'a UnaryServerInfo,
    handler: &'a dyn UnaryHandler,
}

#[async_trait]
impl<'a> UnaryHandler for Next<'a> {
    async fn call(&self, ctx: CallContext, request: Payload) -> UnaryResult {
        match self.interceptors.split_first() {
            Some((first, rest)) => {
                let next = Next {
                    interceptors: rest,
                    info: self.info,
                    handler: self.handler,
                };
                first.intercept(ctx, request, self.info, &next).await
            }
            None => self.handler.call(ctx, request).await,
        }
    }
}

/// In-process unary server: routes typed handlers by full method name and
/// runs every call through the installed interceptor chain.
#[derive(Default)]
pub struct UnaryServer {
    chain: InterceptorChain,
    routes: HashMap<String, Arc<dyn UnaryHandler>>,
}

impl UnaryServer {
    /// Create a new server with the given interceptor chain
    pub fn new(chain: InterceptorChain) -> Self {
        Self {
            chain,
            routes: HashMap::new(),
        }
    }

    /// Register a typed handler for `full_method`.
    pub fn route<Req, Resp, F, Fut>(mut self, full_method: impl Into<String>, f: F) -> Self
    where
        Req: Send + 'static,
        Resp: Send + 'static,
        F: Fn(CallContext, Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Resp, Status>> + Send + 'static,
    {
        let full_method = full_method.into();
        let method = full_method.clone();
        let f = Arc::new(f);
        let handler = handler_fn(move |ctx: CallContext, request: Payload| {
            let f = Arc::clone(&f);
            let method = method.clone();
            async move {
                let request = request.downcast::<Req>().map_err(|_| {
                    Status::from(MiddlewareError::UnexpectedPayload {
                        method,
                        expected: std::any::type_name::<Req>(),
                    })
                })?;
                let response = f(ctx, *request).await?;
                Ok::<Payload, BoxError>(Box::new(response))
            }
        });

        debug!(method = %full_method, "Registered unary route");
        self.routes.insert(full_method, Arc::new(handler));
        self
    }

    pub fn has_route(&self, full_method: &str) -> bool {
        self.routes.contains_key(full_method)
    }

    pub fn chain(&self) -> &InterceptorChain {
        &self.chain
    }

    /// Invoke the handler registered for `full_method`.
    pub async fn call<Req, Resp>(
        &self,
        ctx: CallContext,
        full_method: &str,
        request: Req,
    ) -> Result<Resp, Status>
    where
        Req: Send + 'static,
        Resp: Send + 'static,
    {
        let handler = self
            .routes
            .get(full_method)
            .ok_or_else(|| MiddlewareError::UnknownMethod(full_method.to_string()))?;

        let info = UnaryServerInfo::new(full_method);
        let response = self
            .chain
            .invoke(ctx, Box::new(request), &info, handler.as_ref())
            .await
            .map_err(into_status)?;

        response.downcast::<Resp>().map(|response| *response).map_err(|_| {
            MiddlewareError::UnexpectedPayload {
                method: full_method.to_string(),
                expected: std::any::type_name::<Resp>(),
            }
            .into()
        })
    }

    /// Log the installed routes.
    pub fn describe(&self) {
        info!(
            routes = self.routes.len(),
            interceptors = self.chain.len(),
            "Unary server ready"
        );
    }
}
