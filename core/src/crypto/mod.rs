// Cryptography module — broadcast sealing and at-rest key wrapping

pub mod engine;
pub mod vault;

pub use engine::{decrypt, encrypt, generate_key, WireFrame, NONCE_LEN};
pub use vault::{KeyVault, StoredKey};
