// Store module — persisted contacts and device identity

pub mod backend;
pub mod contacts;
pub mod identity;

pub use backend::{MemoryStorage, SledStorage, StorageBackend};
pub use contacts::{Contact, ContactStore};
pub use identity::{DeviceIdentity, IdentityStore};
