// Message types — the literal point of this app

use serde::{Deserialize, Serialize};

/// What kind of broadcast this is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageKind {
    /// Distress call, repeated across the contact rotation
    Sos,
    /// Acknowledgement addressed to one contact
    Ack,
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sos => write!(f, "SOS"),
            Self::Ack => write!(f, "ACK"),
        }
    }
}

/// A position fix in decimal degrees.
///
/// Carried as `Option<Position>` everywhere so "no fix" is a real wire
/// state, never a `0.0` sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
}

/// A plaintext broadcast message before encryption.
///
/// Constructed fresh per transmission, immutable after construction,
/// never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub kind: MessageKind,
    /// Sender's short device identifier
    pub sender_id: String,
    /// Unix timestamp (milliseconds)
    pub timestamp_millis: u64,
    /// Position fix, if one was available at send time
    pub position: Option<Position>,
}

impl Message {
    /// Create an SOS message stamped with the current time
    pub fn sos(sender_id: String, position: Option<Position>) -> Self {
        Self {
            kind: MessageKind::Sos,
            sender_id,
            timestamp_millis: now_millis(),
            position,
        }
    }

    /// Create an ACK message (acknowledgements never carry a position)
    pub fn ack(sender_id: String) -> Self {
        Self {
            kind: MessageKind::Ack,
            sender_id,
            timestamp_millis: now_millis(),
            position: None,
        }
    }
}

pub(crate) fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
