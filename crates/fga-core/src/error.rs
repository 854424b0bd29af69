//! `FgaError` is the umbrella error raised at the host boundary. It wraps
//! the narrower per-crate error enums; only this crate's `host` module (and
//! any real extension-glue layer) needs to translate it into a host-native
//! error report.

use fga_channel::error::ChannelError;
use fga_proto::{ConfigError, TupleError};
use fga_transport::TransportError;

#[derive(Debug, Clone, thiserror::Error)]
pub enum FgaError {
    /// No free slot was available at acquire time. Local, recoverable.
    #[error("no free slot available")]
    NoFreeSlot,
    /// The ring was full at enqueue time. Local, recoverable.
    #[error("request queue is full")]
    QueueFull,
    /// The caller was interrupted while waiting for a response; the slot
    /// has already been released.
    #[error("request cancelled")]
    Cancelled,
    /// The caller's wait exceeded its deadline.
    #[error("request timed out waiting for a response")]
    TimedOut,
    /// A malformed request was rejected before dispatch.
    #[error("client error: {0}")]
    ClientError(String),
    /// The remote call failed after exhausting retries, or the deadline
    /// elapsed, or the circuit breaker was open.
    #[error("transport error: {0}")]
    TransportError(String),
    /// The remote returned a non-retryable failure.
    #[error("server error: {0}")]
    ServerError(String),
    /// Shared state uninitialized or an invariant was violated. Surfaced as
    /// a host-level error; a real consumer process would exit non-zero on
    /// this.
    #[error("fatal: {0}")]
    Fatal(String),
}

impl From<ChannelError> for FgaError {
    fn from(e: ChannelError) -> Self {
        match e {
            ChannelError::NoFreeSlot => Self::NoFreeSlot,
            ChannelError::QueueFull => Self::QueueFull,
            ChannelError::Cancelled => Self::Cancelled,
            ChannelError::TimedOut => Self::TimedOut,
        }
    }
}

impl From<ConfigError> for FgaError {
    fn from(e: ConfigError) -> Self {
        Self::Fatal(e.to_string())
    }
}

impl From<TupleError> for FgaError {
    fn from(e: TupleError) -> Self {
        Self::ClientError(e.to_string())
    }
}

impl From<TransportError> for FgaError {
    fn from(e: TransportError) -> Self {
        Self::TransportError(e.to_string())
    }
}

impl From<fga_proto::ResponseStatus> for FgaErrorKind {
    fn from(status: fga_proto::ResponseStatus) -> Self {
        match status {
            fga_proto::ResponseStatus::Ok => FgaErrorKind::None,
            fga_proto::ResponseStatus::ClientError => FgaErrorKind::ClientError,
            fga_proto::ResponseStatus::TransportError => FgaErrorKind::TransportError,
            fga_proto::ResponseStatus::ServerError => FgaErrorKind::ServerError,
        }
    }
}

/// Helper for `facade.rs`: classifies a [`fga_proto::ResponseStatus`] into a
/// kind without yet having the error message text in hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FgaErrorKind {
    None,
    ClientError,
    TransportError,
    ServerError,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_errors_map_by_kind() {
        assert!(matches!(FgaError::from(ChannelError::NoFreeSlot), FgaError::NoFreeSlot));
        assert!(matches!(FgaError::from(ChannelError::QueueFull), FgaError::QueueFull));
        assert!(matches!(FgaError::from(ChannelError::Cancelled), FgaError::Cancelled));
    }
}
