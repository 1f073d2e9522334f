//! Error module

use opentelemetry::metrics::MetricsError;
use thiserror::Error;
use tonic::{Code, Status};

/// Boxed error returned by unary handlers.
///
/// A handler that fails with a [`Status`] keeps its code; any other error is
/// treated as [`Code::Unknown`] when the call is classified.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum MiddlewareError {
    #[error("Failed to create instrument {name}: {source}")]
    Instrument {
        name: &'static str,
        #[source]
        source: MetricsError,
    },

    #[error("Unknown method: {0}")]
    UnknownMethod(String),

    #[error("Unexpected payload type for {method}: expected {expected}")]
    UnexpectedPayload {
        method: String,
        expected: &'static str,
    },

    #[error("panic triggered: {0}")]
    Panic(String),
}

impl From<MiddlewareError> for Status {
    fn from(err: MiddlewareError) -> Self {
        match err {
            MiddlewareError::UnknownMethod(method) => {
                Status::new(Code::Unimplemented, format!("unknown method {method}"))
            }
            MiddlewareError::Instrument { .. }
            | MiddlewareError::UnexpectedPayload { .. }
            | MiddlewareError::Panic(_) => Status::new(Code::Internal, err.to_string()),
        }
    }
}

/// Status code carried by a handler error, `Unknown` for non-status errors.
pub fn error_code(err: &(dyn std::error::Error + Send + Sync + 'static)) -> Code {
    err.downcast_ref::<Status>()
        .map(Status::code)
        .unwrap_or(Code::Unknown)
}

/// Convert a handler error into the status returned to the caller.
pub fn into_status(err: BoxError) -> Status {
    match err.downcast::<Status>() {
        Ok(status) => *status,
        Err(err) => Status::new(Code::Unknown, err.to_string()),
    }
}

/// Canonical gRPC name for a status code.
pub fn code_name(code: Code) -> &'static str {
    match code {
        Code::Ok => "OK",
        Code::Cancelled => "Canceled",
        Code::Unknown => "Unknown",
        Code::InvalidArgument => "InvalidArgument",
        Code::DeadlineExceeded => "DeadlineExceeded",
        Code::NotFound => "NotFound",
        Code::AlreadyExists => "AlreadyExists",
        Code::PermissionDenied => "PermissionDenied",
        Code::ResourceExhausted => "ResourceExhausted",
        Code::FailedPrecondition => "FailedPrecondition",
        Code::Aborted => "Aborted",
        Code::OutOfRange => "OutOfRange",
        Code::Unimplemented => "Unimplemented",
        Code::Internal => "Internal",
        Code::Unavailable => "Unavailable",
        Code::DataLoss => "DataLoss",
        Code::Unauthenticated => "Unauthenticated",
    }
}

pub type MiddlewareResult<T> = Result<T, MiddlewareError>;
