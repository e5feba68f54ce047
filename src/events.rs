use serde_json::Value;
use std::time::{SystemTime, UNIX_EPOCH};

// ---------------------------------------------------------------------------
// Connection status signals
// ---------------------------------------------------------------------------

/// Externally observed connection sub-signal. Reconnecting/reconnected
/// transport notifications are logged only and never surface here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionSignal {
    Connected,
    Disconnected,
}

/// Payload of a connection status change event.
#[derive(Debug, Clone)]
pub struct ConnectionStatusChange {
    pub status: ConnectionSignal,
    pub connection_id: Option<String>,
    /// Epoch milliseconds at the moment the change was observed.
    pub timestamp: i64,
}

// ---------------------------------------------------------------------------
// Domain events
// ---------------------------------------------------------------------------

/// Tagged domain event published by the consumer and drained by the
/// orchestrator's event loop. Payloads of `Data` and `Heartbeat` are forwarded
/// verbatim from the transport; decoding happens at the subscriber side.
#[derive(Debug, Clone)]
pub enum FeedEvent {
    Data {
        channel: String,
        payload: Value,
    },
    Heartbeat {
        channel: String,
        payload: Value,
    },
    ConnectionStatusChanged {
        channel: String,
        change: ConnectionStatusChange,
    },
}

/// Current wall-clock time as epoch milliseconds.
pub fn epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epoch_ms_positive() {
        assert!(epoch_ms() > 0);
    }
}
