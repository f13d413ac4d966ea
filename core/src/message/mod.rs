// Message module — types and wire serialization for broadcast packets

pub mod codec;
pub mod types;

pub use codec::{decode_message, encode_message, MAX_PACKET_SIZE};
pub use types::{Message, MessageKind, Position};
