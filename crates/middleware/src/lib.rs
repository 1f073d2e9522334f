//! Unary RPC server middleware
//!
//! Interceptors that wrap unary handlers with metrics, panic recovery and
//! request logging, plus a small in-process server used to host them.

pub mod builder;
pub mod error;
pub mod interceptors;
pub mod server;

pub use builder::ServerInterceptors;
pub use error::{BoxError, MiddlewareError, MiddlewareResult};
pub use server::{
    handler_fn, CallContext, InterceptorChain, Payload, UnaryHandler, UnaryInterceptor,
    UnaryResult, UnaryServer, UnaryServerInfo,
};
