//! Transport-level error taxonomy. Mirrors the status categories a gRPC
//! channel would report, translated from HTTP status codes since this
//! client speaks an OpenFGA-style REST API rather than gRPC.

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// Backend temporarily unreachable (HTTP 503). Retryable.
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    /// The call's deadline elapsed before a response arrived. Retryable.
    #[error("deadline exceeded")]
    DeadlineExceeded,
    /// The backend aborted the operation (HTTP 409, e.g. a concurrent
    /// conflicting write). Retryable.
    #[error("operation aborted: {0}")]
    Aborted(String),
    /// Unclassified server-side failure (HTTP 5xx). Retryable.
    #[error("internal server error: {0}")]
    Internal(String),
    /// Malformed request (HTTP 400). Not retryable.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// HTTP 401/403. Not retryable.
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    /// HTTP 404. Not retryable.
    #[error("not found: {0}")]
    NotFound(String),
    /// The in-flight concurrency cap was exhausted; the call never reached
    /// the wire. Not retried by [`crate::client::TransportClient`] — the
    /// dispatcher decides whether to surface it or shed load.
    #[error("resource exhausted: max_concurrency reached")]
    ResourceExhausted,
    /// The circuit breaker is open; the call was short-circuited.
    #[error("circuit breaker open: backend considered unhealthy")]
    CircuitOpen,
    /// Every retry attempt failed.
    #[error("all retry attempts exhausted after {attempts} tries")]
    RetriesExhausted { attempts: u32 },
    /// Transport-layer failure below the HTTP status line (DNS, connect,
    /// body decode, ...).
    #[error("transport failure: {0}")]
    Transport(String),
}

impl TransportError {
    /// Whether [`crate::client::TransportClient`] should attempt this call
    /// again. Matches "retry on Unavailable, DeadlineExceeded, Aborted,
    /// Internal; no retry for 4xx-equivalent codes."
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Unavailable(_) | Self::DeadlineExceeded | Self::Aborted(_) | Self::Internal(_)
        )
    }

    /// Classifies a REST response status into the taxonomy above.
    pub fn from_status(status: reqwest::StatusCode, body: impl Into<String>) -> Self {
        let body = body.into();
        match status.as_u16() {
            503 => Self::Unavailable(body),
            504 => Self::DeadlineExceeded,
            409 => Self::Aborted(body),
            400 => Self::InvalidArgument(body),
            401 | 403 => Self::PermissionDenied(body),
            404 => Self::NotFound(body),
            500..=599 => Self::Internal(body),
            _ => Self::Internal(body),
        }
    }
}
