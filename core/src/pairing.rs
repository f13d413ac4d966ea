// Pairing exchange record — how two devices learn each other's keys
//
// The record travels out-of-band (a one-time code scan). Export unwraps
// our own stored key back to raw form, because the peer's vault is a
// different device and cannot open our blobs; import wraps the received
// raw key before it ever touches storage.

use crate::crypto::vault::{KeyVault, StoredKey};
use crate::store::contacts::Contact;
use crate::store::identity::DeviceIdentity;
use crate::EngineError;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairingRecord {
    /// Short device identifier of the key's owner
    pub id: String,
    /// Raw 256-bit key, base64
    pub key: String,
}

impl PairingRecord {
    /// Export this device's identity for a peer to scan.
    pub fn export(identity: &DeviceIdentity, vault: &KeyVault) -> Result<Self, EngineError> {
        let raw = identity.key.open(vault).ok_or(EngineError::KeyUnavailable)?;
        Ok(Self {
            id: identity.id.clone(),
            key: BASE64.encode(raw.as_slice()),
        })
    }

    pub fn to_json(&self) -> Result<String, EngineError> {
        serde_json::to_string(self).map_err(|e| EngineError::Internal(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        serde_json::from_str(json)
            .map_err(|e| EngineError::InvalidInput(format!("bad pairing record: {e}")))
    }

    /// Turn a scanned record into a stored contact, wrapping the key.
    pub fn into_contact(self, name: String, vault: &KeyVault) -> Result<Contact, EngineError> {
        if self.id.is_empty() {
            return Err(EngineError::InvalidInput("empty contact id".into()));
        }

        let raw = BASE64
            .decode(&self.key)
            .map_err(|e| EngineError::InvalidInput(format!("bad pairing key: {e}")))?;
        let raw: [u8; 32] = raw
            .as_slice()
            .try_into()
            .map_err(|_| EngineError::InvalidInput("pairing key must be 32 bytes".into()))?;

        let wrapped_key = vault.wrap(&raw)?;
        Ok(Contact {
            id: self.id,
            name,
            wrapped_key,
        })
    }
}
