//! Example unary server with the standard interceptor stack
//!
//! Run with:
//! cargo run --example server

use rpc_middleware::{CallContext, ServerInterceptors, UnaryServer};
use rpc_middleware_common::config::MiddlewareConfig;
use rpc_middleware_common::telemetry::{init_tracing, meter};
use std::time::Duration;
use tonic::{Code, Status};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = MiddlewareConfig::load()?;
    init_tracing(&config.telemetry)?;

    let meter = meter(&config.telemetry);
    let chain = ServerInterceptors::from_config(&config, &meter);

    let server = UnaryServer::new(chain)
        .route(
            "/helloworld.Greeter/SayHello",
            |_ctx: CallContext, name: String| async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                Ok::<_, Status>(format!("Hello {name}"))
            },
        )
        .route(
            "/helloworld.Greeter/Crash",
            |_ctx: CallContext, name: String| async move {
                if name.is_empty() {
                    panic!("empty name");
                }
                Ok::<String, Status>(name)
            },
        );
    server.describe();

    let reply: String = server
        .call(CallContext::new(), "/helloworld.Greeter/SayHello", "world".to_string())
        .await?;
    tracing::info!(%reply, "SayHello answered");

    match server
        .call::<String, String>(CallContext::new(), "/helloworld.Greeter/Crash", String::new())
        .await
    {
        Err(status) if status.code() == Code::Internal => {
            tracing::info!(message = %status.message(), "Crash recovered");
        }
        other => anyhow::bail!("unexpected result: {other:?}"),
    }

    Ok(())
}
