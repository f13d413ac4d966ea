// Packet codec — deterministic serialization sized for advertising payloads

use super::types::Message;
use crate::EngineError;

/// Maximum encoded packet size.
///
/// Extended advertising carries at most ~250 bytes of service data; a
/// packet that doesn't fit was never going on the air anyway.
pub const MAX_PACKET_SIZE: usize = 256;

/// Serialize a Message to plaintext bytes (bincode)
pub fn encode_message(msg: &Message) -> Result<Vec<u8>, EngineError> {
    let bytes =
        bincode::serialize(msg).map_err(|e| EngineError::Internal(e.to_string()))?;

    if bytes.len() > MAX_PACKET_SIZE {
        return Err(EngineError::InvalidInput(format!(
            "encoded packet too large: {} bytes (max {})",
            bytes.len(),
            MAX_PACKET_SIZE
        )));
    }

    Ok(bytes)
}

/// Deserialize plaintext bytes to a Message.
///
/// Any structural failure maps to `MalformedPacket`; on a shared channel
/// that is routine, not exceptional.
pub fn decode_message(bytes: &[u8]) -> Result<Message, EngineError> {
    if bytes.len() > MAX_PACKET_SIZE {
        return Err(EngineError::MalformedPacket);
    }

    bincode::deserialize(bytes).map_err(|_| EngineError::MalformedPacket)
}
