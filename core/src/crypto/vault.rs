// Key vault: at-rest protection for relationship keys
//
// Symmetric keys are never persisted in the clear. Each device holds an
// X25519 keypair, provisioned lazily on first use, and wraps keys
// ECIES-style before they touch storage:
//
// 1. Generate ephemeral X25519 keypair
// 2. ECDH: ephemeral_secret × device_public → shared_secret
// 3. KDF: Blake3::derive_key(shared_secret) → wrapping key
// 4. Seal: ChaCha20-Poly1305(wrapping_key, random nonce, symmetric_key)
// 5. Blob: magic || ephemeral_pub || nonce || ciphertext‖tag
//
// Unwrapping reverses with the device private half. A blob is meaningless
// on any other device.

use crate::crypto::engine::{NONCE_LEN, TAG_LEN};
use crate::store::backend::StorageBackend;
use crate::EngineError;
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use rand::RngCore;
use std::sync::Arc;
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};
use zeroize::{Zeroize, Zeroizing};

/// Format marker for wrapped-key blobs. Changing this orphans every
/// wrapped key in storage.
pub const VAULT_MAGIC: &[u8; 4] = b"LLV1";

/// KDF context string for deriving wrapping keys from ECDH shared secrets.
const KDF_CONTEXT: &str = "lifeline v1 key vault 2026-05-20";

/// Storage slot holding the device's X25519 secret
const VAULT_SECRET_SLOT: &str = "vault_secret";

const WRAPPED_LEN: usize = VAULT_MAGIC.len() + 32 + NONCE_LEN + 32 + TAG_LEN;

/// Device-bound key wrapper.
///
/// The private half never leaves this vault; on platforms with a hardware
/// keystore the storage backend is the seam where it would live.
pub struct KeyVault {
    secret: StaticSecret,
    public: PublicKey,
}

impl KeyVault {
    /// Load the device keypair from storage, provisioning one on first use.
    pub fn open(backend: &Arc<dyn StorageBackend>) -> Result<Self, EngineError> {
        let secret = match backend
            .get(VAULT_SECRET_SLOT)
            .map_err(EngineError::Storage)?
        {
            Some(bytes) => {
                let mut raw: [u8; 32] = bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| EngineError::Storage("corrupt vault secret".into()))?;
                let secret = StaticSecret::from(raw);
                raw.zeroize();
                secret
            }
            None => {
                let mut raw = [0u8; 32];
                rand::rngs::OsRng.fill_bytes(&mut raw);
                let secret = StaticSecret::from(raw);
                raw.zeroize();
                backend
                    .put(VAULT_SECRET_SLOT, secret.as_bytes())
                    .map_err(EngineError::Storage)?;
                backend.flush().map_err(EngineError::Storage)?;
                tracing::info!("provisioned device vault keypair");
                secret
            }
        };

        let public = PublicKey::from(&secret);
        Ok(Self { secret, public })
    }

    /// An ephemeral vault for tests and throwaway engines; nothing persists.
    pub fn ephemeral() -> Self {
        let mut raw = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut raw);
        let secret = StaticSecret::from(raw);
        raw.zeroize();
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Wrap a symmetric key for persistence.
    pub fn wrap(&self, key: &[u8; 32]) -> Result<Vec<u8>, EngineError> {
        let ephemeral = EphemeralSecret::random_from_rng(rand::rngs::OsRng);
        let ephemeral_public = PublicKey::from(&ephemeral);
        let shared = ephemeral.diffie_hellman(&self.public);

        let mut wrapping_key = blake3::derive_key(KDF_CONTEXT, shared.as_bytes());

        let mut nonce = [0u8; NONCE_LEN];
        rand::rngs::OsRng.fill_bytes(&mut nonce);

        let cipher = ChaCha20Poly1305::new((&wrapping_key).into());
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), key.as_slice())
            .map_err(|e| EngineError::Internal(format!("key wrap failed: {e}")));
        wrapping_key.zeroize();
        let ciphertext = ciphertext?;

        let mut blob = Vec::with_capacity(WRAPPED_LEN);
        blob.extend_from_slice(VAULT_MAGIC);
        blob.extend_from_slice(ephemeral_public.as_bytes());
        blob.extend_from_slice(&nonce);
        blob.extend_from_slice(&ciphertext);
        Ok(blob)
    }

    /// Unwrap a blob produced by `wrap` on this device.
    ///
    /// Returns `None` on any failure — corrupt blob, foreign device,
    /// wrong format. "Key unavailable" is a state, not a crash.
    pub fn unwrap(&self, blob: &[u8]) -> Option<Zeroizing<[u8; 32]>> {
        if blob.len() != WRAPPED_LEN || !blob.starts_with(VAULT_MAGIC) {
            return None;
        }

        let rest = &blob[VAULT_MAGIC.len()..];
        let ephemeral_public: [u8; 32] = rest[..32].try_into().ok()?;
        let nonce = &rest[32..32 + NONCE_LEN];
        let ciphertext = &rest[32 + NONCE_LEN..];

        let shared = self
            .secret
            .diffie_hellman(&PublicKey::from(ephemeral_public));
        let mut wrapping_key = blake3::derive_key(KDF_CONTEXT, shared.as_bytes());

        let cipher = ChaCha20Poly1305::new((&wrapping_key).into());
        let plaintext = cipher.decrypt(Nonce::from_slice(nonce), ciphertext).ok();
        wrapping_key.zeroize();

        let plaintext = plaintext?;
        let mut key = Zeroizing::new([0u8; 32]);
        if plaintext.len() != 32 {
            return None;
        }
        key.copy_from_slice(&plaintext);
        Some(key)
    }
}

/// A symmetric key as it sits in storage.
///
/// `LegacyRaw` covers records written before wrapping was introduced. It
/// is an explicit compatibility variant, not a silent degradation, and
/// opening one is flagged as reduced assurance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredKey {
    /// Vault ciphertext (magic-prefixed blob)
    Wrapped(Vec<u8>),
    /// Pre-wrapping plaintext key
    LegacyRaw([u8; 32]),
}

impl StoredKey {
    /// Classify a stored blob by format.
    pub fn from_blob(bytes: &[u8]) -> Result<Self, EngineError> {
        if bytes.starts_with(VAULT_MAGIC) {
            Ok(Self::Wrapped(bytes.to_vec()))
        } else if bytes.len() == 32 {
            let mut raw = [0u8; 32];
            raw.copy_from_slice(bytes);
            Ok(Self::LegacyRaw(raw))
        } else {
            Err(EngineError::InvalidInput(format!(
                "unrecognized key blob ({} bytes)",
                bytes.len()
            )))
        }
    }

    /// The persisted form.
    pub fn to_blob(&self) -> Vec<u8> {
        match self {
            Self::Wrapped(blob) => blob.clone(),
            Self::LegacyRaw(raw) => raw.to_vec(),
        }
    }

    /// Recover the symmetric key, unwrapping through the vault when wrapped.
    pub fn open(&self, vault: &KeyVault) -> Option<Zeroizing<[u8; 32]>> {
        match self {
            Self::Wrapped(blob) => vault.unwrap(blob),
            Self::LegacyRaw(raw) => {
                tracing::warn!("using legacy unwrapped key (reduced assurance)");
                Some(Zeroizing::new(*raw))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::engine::generate_key;
    use crate::store::backend::MemoryStorage;

    #[test]
    fn test_wrap_unwrap_roundtrip() {
        let vault = KeyVault::ephemeral();
        let key = generate_key();

        let blob = vault.wrap(&key).unwrap();
        let recovered = vault.unwrap(&blob).expect("unwrap should succeed");

        assert_eq!(*key, *recovered);
    }

    #[test]
    fn test_blob_useless_on_other_device() {
        let vault_a = KeyVault::ephemeral();
        let vault_b = KeyVault::ephemeral();
        let key = generate_key();

        let blob = vault_a.wrap(&key).unwrap();
        assert!(vault_b.unwrap(&blob).is_none());
    }

    #[test]
    fn test_corrupt_blob_is_none() {
        let vault = KeyVault::ephemeral();
        let key = generate_key();
        let mut blob = vault.wrap(&key).unwrap();

        if let Some(byte) = blob.last_mut() {
            *byte ^= 0xFF;
        }
        assert!(vault.unwrap(&blob).is_none());

        assert!(vault.unwrap(&[]).is_none());
        assert!(vault.unwrap(b"LLV1short").is_none());
    }

    #[test]
    fn test_keypair_persists_across_open() {
        let backend: Arc<dyn StorageBackend> = Arc::new(MemoryStorage::new());
        let key = generate_key();

        let blob = KeyVault::open(&backend).unwrap().wrap(&key).unwrap();
        let reopened = KeyVault::open(&backend).unwrap();

        assert_eq!(*key, *reopened.unwrap(&blob).unwrap());
    }

    #[test]
    fn test_stored_key_classification() {
        let vault = KeyVault::ephemeral();
        let key = generate_key();

        let wrapped = StoredKey::from_blob(&vault.wrap(&key).unwrap()).unwrap();
        assert!(matches!(wrapped, StoredKey::Wrapped(_)));

        let legacy = StoredKey::from_blob(&key[..]).unwrap();
        assert!(matches!(legacy, StoredKey::LegacyRaw(_)));

        assert!(StoredKey::from_blob(&[0u8; 7]).is_err());
    }

    #[test]
    fn test_legacy_raw_opens_without_vault_help() {
        let vault = KeyVault::ephemeral();
        let key = generate_key();

        let stored = StoredKey::LegacyRaw(*key);
        let opened = stored.open(&vault).expect("legacy keys always open");
        assert_eq!(*key, *opened);
    }

    #[test]
    fn test_stored_key_blob_roundtrip() {
        let vault = KeyVault::ephemeral();
        let key = generate_key();

        let stored = StoredKey::Wrapped(vault.wrap(&key).unwrap());
        let restored = StoredKey::from_blob(&stored.to_blob()).unwrap();
        assert_eq!(stored, restored);
        assert_eq!(*key, *restored.open(&vault).unwrap());
    }
}
