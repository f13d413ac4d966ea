// Lifeline Core — Offline Emergency Broadcast Engine
//
// "Does this help one human tell another 'I need help'
//  when every network is gone?"
//
// If the answer is no, it doesn't belong here.

pub mod crypto;
pub mod engine;
pub mod message;
pub mod pairing;
pub mod platform;
pub mod radio;
pub mod replay;
pub mod store;

use thiserror::Error;

pub use crypto::engine::{decrypt, encrypt, generate_key, WireFrame};
pub use crypto::vault::{KeyVault, StoredKey};
pub use engine::events::{BroadcastStatus, EngineEvent, HardwareComponent};
pub use engine::{Engine, EngineConfig, EngineHandle};
pub use message::{Message, MessageKind, Position};
pub use pairing::PairingRecord;
pub use platform::{NoPositionProvider, PositionProvider, RadioCapabilities};
pub use radio::{AdvertisingFrame, PhyPreference, SERVICE_UUID};
pub use replay::ReplayCache;
pub use store::contacts::{Contact, ContactStore};
pub use store::identity::{DeviceIdentity, IdentityStore};

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Engine-wide error taxonomy.
///
/// `RadioBusy` is transient (retry on the next tick). `AuthFailure` and
/// `MalformedPacket` are expected on a shared channel and never surface to
/// the user as errors. `KeyUnavailable` skips the affected contact without
/// taking the engine down.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("radio busy")]
    RadioBusy,
    #[error("radio command failed (status {0})")]
    RadioFailed(i32),
    #[error("authentication failed")]
    AuthFailure,
    #[error("malformed packet")]
    MalformedPacket,
    #[error("no contacts configured")]
    NoContacts,
    #[error("key unavailable")]
    KeyUnavailable,
    #[error("storage error: {0}")]
    Storage(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("internal error: {0}")]
    Internal(String),
}
