// Storage abstraction — named records over pluggable persistence

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Unified storage trait: read/write whole records under named slots.
///
/// Writes are atomic per slot, so a failure mid-write never corrupts the
/// previously committed record.
pub trait StorageBackend: Send + Sync {
    fn get(&self, slot: &str) -> Result<Option<Vec<u8>>, String>;
    fn put(&self, slot: &str, value: &[u8]) -> Result<(), String>;
    fn remove(&self, slot: &str) -> Result<(), String>;
    fn flush(&self) -> Result<(), String>;
}

/// In-memory storage for tests and throwaway engines
#[derive(Clone, Default)]
pub struct MemoryStorage {
    data: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageBackend for MemoryStorage {
    fn get(&self, slot: &str) -> Result<Option<Vec<u8>>, String> {
        Ok(self.data.read().unwrap().get(slot).cloned())
    }

    fn put(&self, slot: &str, value: &[u8]) -> Result<(), String> {
        self.data
            .write()
            .unwrap()
            .insert(slot.to_string(), value.to_vec());
        Ok(())
    }

    fn remove(&self, slot: &str) -> Result<(), String> {
        self.data.write().unwrap().remove(slot);
        Ok(())
    }

    fn flush(&self) -> Result<(), String> {
        Ok(())
    }
}

pub struct SledStorage {
    db: sled::Db,
}

impl SledStorage {
    pub fn new(path: &str) -> Result<Self, String> {
        let db = sled::open(path).map_err(|e| e.to_string())?;
        Ok(Self { db })
    }
}

impl StorageBackend for SledStorage {
    fn get(&self, slot: &str) -> Result<Option<Vec<u8>>, String> {
        let value = self.db.get(slot).map_err(|e| e.to_string())?;
        Ok(value.map(|ivec| ivec.to_vec()))
    }

    fn put(&self, slot: &str, value: &[u8]) -> Result<(), String> {
        self.db.insert(slot, value).map_err(|e| e.to_string())?;
        Ok(())
    }

    fn remove(&self, slot: &str) -> Result<(), String> {
        self.db.remove(slot).map_err(|e| e.to_string())?;
        Ok(())
    }

    fn flush(&self) -> Result<(), String> {
        self.db.flush().map_err(|e| e.to_string())?;
        Ok(())
    }
}
