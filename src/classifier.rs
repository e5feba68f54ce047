use serde_json::{Map, Value};

/// `msgType` value that marks a full-state snapshot message.
pub const SNAPSHOT_MSG_TYPE: i64 = 2;

// ---------------------------------------------------------------------------
// Boundary decode
// ---------------------------------------------------------------------------

/// A single update message decoded from the loosely structured wire payload.
///
/// `Valid` requires a keyed structure whose `msgType` field is an integer;
/// everything else collapses to `Invalid`.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Valid {
        msg_type: i64,
        rest: Map<String, Value>,
    },
    Invalid,
}

pub fn decode(message: &Value) -> Decoded {
    let Some(fields) = message.as_object() else {
        return Decoded::Invalid;
    };
    let Some(msg_type) = fields.get("msgType").and_then(Value::as_i64) else {
        return Decoded::Invalid;
    };

    let mut rest = fields.clone();
    rest.remove("msgType");

    Decoded::Valid { msg_type, rest }
}

pub fn is_valid_message(message: &Value) -> bool {
    matches!(decode(message), Decoded::Valid { .. })
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Outcome of classifying one update batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// First element carries `msgType == 2`: full-state snapshot data.
    Snapshot,
    /// First element carries any other integer `msgType`.
    Incremental,
    /// Empty batch: heuristic "snapshot likely complete" signal. Chunked
    /// delivery may legitimately produce several of these per session, so
    /// the signal is repeatable and never deduplicated.
    EmptyBatch,
    /// Non-array payload, or a first element that fails to decode.
    Invalid,
}

pub fn classify(message: &Value) -> Classification {
    match decode(message) {
        Decoded::Valid { msg_type, .. } if msg_type == SNAPSHOT_MSG_TYPE => {
            Classification::Snapshot
        }
        Decoded::Valid { .. } => Classification::Incremental,
        Decoded::Invalid => Classification::Invalid,
    }
}

/// Classify a whole batch atomically by its first element.
pub fn classify_batch(payload: &Value) -> Classification {
    let Some(updates) = payload.as_array() else {
        return Classification::Invalid;
    };
    match updates.first() {
        Some(first) => classify(first),
        None => Classification::EmptyBatch,
    }
}
