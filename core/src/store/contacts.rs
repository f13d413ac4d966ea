// Contact storage — the authoritative list of people who can hear us
//
// The whole list lives under one named slot and is rewritten on every
// mutation. Records carry the vault-wrapped key; the raw key exists in
// memory only while sealing a frame.

use crate::store::backend::StorageBackend;
use crate::EngineError;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Storage slot holding the contact list
const CONTACTS_SLOT: &str = "contacts";

/// A known contact.
///
/// Immutable once created; replacement goes through remove + add.
/// `wrapped_key` is Key Vault ciphertext and is meaningless on any other
/// device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contact {
    pub id: String,
    pub name: String,
    pub wrapped_key: Vec<u8>,
}

/// Persisted form: wrapped key as base64 inside a JSON array
#[derive(Serialize, Deserialize)]
struct ContactRecord {
    id: String,
    name: String,
    wrapped_key: String,
}

pub struct ContactStore {
    backend: Arc<dyn StorageBackend>,
    contacts: Vec<Contact>,
}

impl ContactStore {
    /// Load the persisted list, tolerating an absent slot on first run.
    pub fn load(backend: Arc<dyn StorageBackend>) -> Result<Self, EngineError> {
        let contacts = match backend.get(CONTACTS_SLOT).map_err(EngineError::Storage)? {
            Some(bytes) => {
                let records: Vec<ContactRecord> = serde_json::from_slice(&bytes)
                    .map_err(|e| EngineError::Storage(format!("corrupt contact list: {e}")))?;
                let mut contacts = Vec::with_capacity(records.len());
                for record in records {
                    let wrapped_key = BASE64.decode(&record.wrapped_key).map_err(|e| {
                        EngineError::Storage(format!("corrupt contact key: {e}"))
                    })?;
                    contacts.push(Contact {
                        id: record.id,
                        name: record.name,
                        wrapped_key,
                    });
                }
                contacts
            }
            None => Vec::new(),
        };

        Ok(Self { backend, contacts })
    }

    /// Add a contact and persist the whole list.
    pub fn add(&mut self, contact: Contact) -> Result<(), EngineError> {
        if self.contacts.iter().any(|c| c.id == contact.id) {
            return Err(EngineError::InvalidInput(format!(
                "contact {} already exists",
                contact.id
            )));
        }
        self.contacts.push(contact);
        self.persist()
    }

    /// Remove a contact by id; returns whether anything was removed.
    pub fn remove(&mut self, id: &str) -> Result<bool, EngineError> {
        let before = self.contacts.len();
        self.contacts.retain(|c| c.id != id);
        if self.contacts.len() == before {
            return Ok(false);
        }
        self.persist()?;
        Ok(true)
    }

    /// Read-only snapshot. Callers must not assume stability across ticks.
    pub fn list(&self) -> Vec<Contact> {
        self.contacts.clone()
    }

    pub fn find(&self, id: &str) -> Option<&Contact> {
        self.contacts.iter().find(|c| c.id == id)
    }

    pub fn get(&self, index: usize) -> Option<&Contact> {
        self.contacts.get(index)
    }

    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }

    fn persist(&self) -> Result<(), EngineError> {
        let records: Vec<ContactRecord> = self
            .contacts
            .iter()
            .map(|c| ContactRecord {
                id: c.id.clone(),
                name: c.name.clone(),
                wrapped_key: BASE64.encode(&c.wrapped_key),
            })
            .collect();

        let bytes = serde_json::to_vec(&records)
            .map_err(|e| EngineError::Storage(e.to_string()))?;
        self.backend
            .put(CONTACTS_SLOT, &bytes)
            .map_err(EngineError::Storage)?;
        self.backend.flush().map_err(EngineError::Storage)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::backend::MemoryStorage;

    fn contact(id: &str, name: &str) -> Contact {
        Contact {
            id: id.into(),
            name: name.into(),
            wrapped_key: vec![0xAB; 96],
        }
    }

    fn store() -> (Arc<dyn StorageBackend>, ContactStore) {
        let backend: Arc<dyn StorageBackend> = Arc::new(MemoryStorage::new());
        let store = ContactStore::load(backend.clone()).unwrap();
        (backend, store)
    }

    #[test]
    fn test_add_list_remove() {
        let (_, mut store) = store();
        store.add(contact("a1", "Alice")).unwrap();
        store.add(contact("b2", "Bob")).unwrap();

        assert_eq!(store.len(), 2);
        assert_eq!(store.find("a1").unwrap().name, "Alice");

        assert!(store.remove("a1").unwrap());
        assert!(!store.remove("a1").unwrap());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let (_, mut store) = store();
        store.add(contact("a1", "Alice")).unwrap();
        assert!(store.add(contact("a1", "Imposter")).is_err());
    }

    #[test]
    fn test_persists_across_reload() {
        let (backend, mut store) = store();
        store.add(contact("a1", "Alice")).unwrap();
        store.add(contact("b2", "Bob")).unwrap();
        store.remove("b2").unwrap();

        let reloaded = ContactStore::load(backend).unwrap();
        assert_eq!(reloaded.len(), 1);
        let restored = reloaded.find("a1").unwrap();
        assert_eq!(restored.name, "Alice");
        assert_eq!(restored.wrapped_key, vec![0xAB; 96]);
    }

    #[test]
    fn test_empty_slot_is_empty_list() {
        let (_, store) = store();
        assert!(store.is_empty());
        assert!(store.list().is_empty());
    }
}
