// Engine events — the fire-and-forget contract with the outside world
//
// The sink must never block the engine; everything goes through an
// unbounded channel and a dropped receiver is tolerated silently.

use crate::message::{MessageKind, Position};
use tokio::sync::mpsc::UnboundedSender;

/// Subsystem named in hardware status events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HardwareComponent {
    Radio,
    Position,
    Service,
}

/// Externally visible broadcast mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastStatus {
    Idle,
    Sos,
    Ack,
}

impl std::fmt::Display for BroadcastStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "IDLE"),
            Self::Sos => write!(f, "SOS"),
            Self::Ack => write!(f, "ACK"),
        }
    }
}

/// Everything the engine tells its UI collaborator
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// Console-style log line
    LogLine(String),
    /// A subsystem came up or went down
    HardwareStatus {
        component: HardwareComponent,
        ok: bool,
    },
    /// Broadcast mode changed
    StatusChanged(BroadcastStatus),
    /// A fresh, authenticated message was received
    MessageObserved {
        kind: MessageKind,
        name: String,
        sender_id: String,
        position: Option<Position>,
        rssi: i16,
    },
}

/// Emission side of the event contract.
#[derive(Clone)]
pub(crate) struct EventSink {
    tx: UnboundedSender<EngineEvent>,
}

impl EventSink {
    pub(crate) fn new(tx: UnboundedSender<EngineEvent>) -> Self {
        Self { tx }
    }

    pub(crate) fn emit(&self, event: EngineEvent) {
        let _ = self.tx.send(event);
    }

    pub(crate) fn log(&self, line: impl Into<String>) {
        self.emit(EngineEvent::LogLine(line.into()));
    }

    pub(crate) fn hardware(&self, component: HardwareComponent, ok: bool) {
        self.emit(EngineEvent::HardwareStatus { component, ok });
    }

    pub(crate) fn status(&self, status: BroadcastStatus) {
        self.emit(EngineEvent::StatusChanged(status));
    }
}
