//! Testing utilities for the RPC middleware
//!
//! This crate provides:
//! - Handler fixtures that succeed after a delay, fail with a status or panic
//! - A builder for call contexts
//! - Mock interceptors that record what passed through them
//!
//! # Examples
//!
//! ```
//! use rpc_middleware_testing::{builders::CallContextBuilder, fixtures::*};
//!
//! let ctx = CallContextBuilder::new().with_request_id("req-1").build();
//! let handler = failing_handler(tonic::Status::not_found("missing"));
//! ```

pub mod builders;
pub mod fixtures;
pub mod mocks;

// Re-export commonly used types
pub use builders::*;
pub use fixtures::*;
pub use mocks::*;

// Re-export testing dependencies for convenience
pub use proptest;
