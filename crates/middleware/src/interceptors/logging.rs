//! Logging interceptor for unary calls

use super::attributes::parse_full_method;
use super::elapsed_millis;
use crate::error::{code_name, error_code};
use crate::server::{
    CallContext, Payload, UnaryHandler, UnaryInterceptor, UnaryResult, UnaryServerInfo,
};
use async_trait::async_trait;
use std::time::Instant;
use tonic::Code;
use tracing::{debug, info, info_span, warn, Instrument};

/// Metadata key carrying the caller's request id.
pub const REQUEST_ID_KEY: &str = "x-request-id";

/// Logging interceptor
#[derive(Debug, Clone, Default)]
pub struct LoggingInterceptor {}

impl LoggingInterceptor {
    /// Create a new logging interceptor
    pub fn new() -> Self {
        Self {}
    }
}

#[async_trait]
impl UnaryInterceptor for LoggingInterceptor {
    async fn intercept(
        &self,
        ctx: CallContext,
        request: Payload,
        info: &UnaryServerInfo,
        next: &dyn UnaryHandler,
    ) -> UnaryResult {
        let request_id = request_id(&ctx);
        let descriptor = parse_full_method(info.full_method());
        let span = info_span!(
            "grpc.request",
            request_id = %request_id,
            grpc.service = %descriptor.service,
            grpc.method = %descriptor.method,
        );

        async move {
            info!(method = %info.full_method(), "Incoming gRPC request");
            let start = Instant::now();

            let result = next.call(ctx, request).await;

            let duration_ms = elapsed_millis(start);
            let code = match &result {
                Ok(_) => Code::Ok,
                Err(err) => error_code(err.as_ref()),
            };
            if is_server_error(code) {
                warn!(
                    grpc.code = code_name(code),
                    duration_ms,
                    "gRPC request failed"
                );
            } else {
                info!(
                    grpc.code = code_name(code),
                    duration_ms,
                    "gRPC request completed"
                );
            }
            debug!(request_id = %request_id, "Request finished");

            result
        }
        .instrument(span)
        .await
    }
}

fn request_id(ctx: &CallContext) -> String {
    ctx.metadata()
        .get(REQUEST_ID_KEY)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string()
}

fn is_server_error(code: Code) -> bool {
    matches!(
        code,
        Code::Unknown
            | Code::DeadlineExceeded
            | Code::Unimplemented
            | Code::Internal
            | Code::Unavailable
            | Code::DataLoss
    )
}
