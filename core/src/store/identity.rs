// Device identity — who this device claims to be on the air
//
// A short random identifier plus one 256-bit relationship key, generated
// on first run. The key is what paired contacts use to address us; it is
// persisted only in wrapped form.

use crate::crypto::engine::generate_key;
use crate::crypto::vault::{KeyVault, StoredKey};
use crate::store::backend::StorageBackend;
use crate::EngineError;
use std::sync::Arc;

const DEVICE_ID_SLOT: &str = "device_id";
const DEVICE_KEY_SLOT: &str = "device_key";

/// Length of the short device identifier
const DEVICE_ID_LEN: usize = 8;

#[derive(Debug, Clone)]
pub struct DeviceIdentity {
    /// Short random identifier, carried in every packet we send
    pub id: String,
    /// This device's relationship key, as persisted
    pub key: StoredKey,
}

pub struct IdentityStore {
    backend: Arc<dyn StorageBackend>,
}

impl IdentityStore {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    /// Load the stored identity, if one exists.
    pub fn load(&self) -> Result<Option<DeviceIdentity>, EngineError> {
        let id = match self.backend.get(DEVICE_ID_SLOT).map_err(EngineError::Storage)? {
            Some(bytes) => String::from_utf8(bytes)
                .map_err(|_| EngineError::Storage("corrupt device id".into()))?,
            None => return Ok(None),
        };

        let key = match self.backend.get(DEVICE_KEY_SLOT).map_err(EngineError::Storage)? {
            Some(bytes) => StoredKey::from_blob(&bytes)
                .map_err(|e| EngineError::Storage(e.to_string()))?,
            None => return Ok(None),
        };

        Ok(Some(DeviceIdentity { id, key }))
    }

    /// Load the identity, generating and persisting one on first run.
    pub fn load_or_generate(&self, vault: &KeyVault) -> Result<DeviceIdentity, EngineError> {
        if let Some(identity) = self.load()? {
            return Ok(identity);
        }

        let id: String = uuid::Uuid::new_v4()
            .simple()
            .to_string()
            .chars()
            .take(DEVICE_ID_LEN)
            .collect();

        let raw = generate_key();
        let key = StoredKey::Wrapped(vault.wrap(&raw)?);

        self.backend
            .put(DEVICE_ID_SLOT, id.as_bytes())
            .map_err(EngineError::Storage)?;
        self.backend
            .put(DEVICE_KEY_SLOT, &key.to_blob())
            .map_err(EngineError::Storage)?;
        self.backend.flush().map_err(EngineError::Storage)?;

        tracing::info!(id = %id, "generated device identity");
        Ok(DeviceIdentity { id, key })
    }
}
