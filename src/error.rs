//! Unified error type.
//!
//! Every fallible operation in weft returns [`Result`]. Nothing inside the
//! pipeline catches these: a filter or handler that fails hands its error
//! straight back to whoever called the pipeline, which is usually the
//! [`Router`](crate::Router) and its error renderer.
//!
//! Panics are not errors. They are never caught or turned into responses.

use http::StatusCode;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The error type returned by weft's fallible operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A required value is absent.
    #[error("Missing value: '{name}'")]
    Missing { name: String },

    /// A value is present but cannot be converted to the requested type.
    #[error("Cannot convert value: '{name}', to: '{target}'")]
    TypeMismatch { name: String, target: &'static str },

    /// An error that maps to a specific HTTP status (406, 415, 416, ...).
    #[error("{status}: {message}")]
    Status { status: StatusCode, message: String },

    /// A template expression opened a reference and never closed it.
    #[error("found '{start}' expecting '{end}' at {line}:{column}")]
    MalformedExpression {
        start: String,
        end: String,
        line: usize,
        column: usize,
    },

    /// A template expression references a value that does not exist.
    #[error("Missing {reference} at {line}:{column}")]
    MissingReference {
        reference: String,
        line: usize,
        column: usize,
    },

    /// The response was already started; the context accepts no more writes.
    #[error("The response has already been started")]
    ResponseStarted,

    /// Application error raised from a filter or handler.
    #[error(transparent)]
    Custom(Box<dyn std::error::Error + Send + Sync + 'static>),
}

impl Error {
    pub fn missing(name: impl Into<String>) -> Self {
        Self::Missing { name: name.into() }
    }

    pub fn type_mismatch(name: impl Into<String>, target: &'static str) -> Self {
        Self::TypeMismatch { name: name.into(), target }
    }

    pub fn status(status: StatusCode, message: impl Into<String>) -> Self {
        Self::Status { status, message: message.into() }
    }

    /// 406: none of the produced types is acceptable to the client.
    pub fn not_acceptable(accept: Option<&str>) -> Self {
        Self::status(StatusCode::NOT_ACCEPTABLE, accept.unwrap_or_default())
    }

    /// 415: the request body type is absent or not consumed by the route.
    pub fn unsupported_media_type(content_type: Option<&str>) -> Self {
        Self::status(StatusCode::UNSUPPORTED_MEDIA_TYPE, content_type.unwrap_or_default())
    }

    /// 416: the `Range` header cannot be satisfied.
    pub fn range_not_satisfiable(range: impl Into<String>) -> Self {
        Self::status(StatusCode::RANGE_NOT_SATISFIABLE, range)
    }

    /// Wraps any application error.
    pub fn custom(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Custom(Box::new(err))
    }

    /// The HTTP status an error renderer should use for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Missing { .. } | Self::TypeMismatch { .. } => StatusCode::BAD_REQUEST,
            Self::Status { status, .. } => *status,
            Self::MalformedExpression { .. }
            | Self::MissingReference { .. }
            | Self::ResponseStarted
            | Self::Custom(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StatusCode> for Error {
    fn from(status: StatusCode) -> Self {
        Self::status(status, status.canonical_reason().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes() {
        assert_eq!(Error::missing("id").status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(Error::type_mismatch("id", "i32").status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(Error::not_acceptable(Some("text/html")).status_code(), StatusCode::NOT_ACCEPTABLE);
        assert_eq!(Error::unsupported_media_type(None).status_code(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert_eq!(
            Error::range_not_satisfiable("bytes=9-1").status_code(),
            StatusCode::RANGE_NOT_SATISFIABLE
        );
        assert_eq!(Error::ResponseStarted.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn display() {
        assert_eq!(Error::missing("q").to_string(), "Missing value: 'q'");
        assert_eq!(
            Error::type_mismatch("q", "i32").to_string(),
            "Cannot convert value: 'q', to: 'i32'"
        );
        let err = Error::MissingReference { reference: "${x}".into(), line: 1, column: 1 };
        assert_eq!(err.to_string(), "Missing ${x} at 1:1");
    }

    #[test]
    fn from_status_code() {
        let err = Error::from(StatusCode::FORBIDDEN);
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(err.to_string(), "403 Forbidden: Forbidden");
    }
}
