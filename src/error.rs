use thiserror::Error;

use crate::consumer::ConsumerState;

/// Failures at the hub transport boundary.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("websocket error: {0}")]
    Websocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("hub handshake rejected: {0}")]
    Handshake(String),

    #[error("connection closed: {0}")]
    Closed(String),

    #[error("already connected")]
    AlreadyConnected,

    #[error("not connected")]
    NotConnected,
}

/// Failures of the consumer state machine.
///
/// `InvalidState` is fatal to the offending call and never auto-retried.
/// `StartFailure` is returned after the state has been reverted to Stopped.
/// `StopFailure` is returned only after cleanup has completed unconditionally.
#[derive(Debug, Error)]
pub enum ConsumerError {
    #[error("consumer is {actual} and cannot accept {operation}")]
    InvalidState {
        operation: &'static str,
        actual: ConsumerState,
    },

    #[error("consumer failed to start")]
    StartFailure(#[source] TransportError),

    #[error("transport close failed during stop")]
    StopFailure(#[source] TransportError),
}

/// Rejected input to the lifecycle timing tracker. Fatal to that call only;
/// tracker state is left untouched.
#[derive(Debug, Error)]
pub enum TimingError {
    #[error("{field} must be a positive integer, got {value}")]
    InvalidTimestamp { field: &'static str, value: i64 },
}

/// Failures of the startup clock-skew probe. Never fatal to the process.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no reply from {server} within {timeout_ms} ms")]
    Timeout { server: String, timeout_ms: u64 },

    #[error("malformed reply: {0}")]
    MalformedReply(String),

    #[error("all time servers failed")]
    AllServersFailed,
}
