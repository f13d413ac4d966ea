// Broadcast sealing: ChaCha20-Poly1305 under a pre-shared relationship key
//
// Flow:
// 1. Generate a fresh random 12-byte nonce (reuse under one key breaks
//    the AEAD; the nonce is never derived, always drawn from OsRng)
// 2. Encrypt: ChaCha20-Poly1305(key, nonce, plaintext) → ciphertext + tag
// 3. Output: WireFrame = nonce || ciphertext‖tag
//
// The receiver splits the first 12 bytes back off and authenticates the
// rest. Every failure mode — truncation, tag mismatch, wrong key — is
// `AuthFailure`, which on a shared advertising channel means "not a
// message for me".

use crate::EngineError;
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use rand::RngCore;
use zeroize::Zeroizing;

/// Nonce length in bytes (96-bit AEAD nonce)
pub const NONCE_LEN: usize = 12;

/// Authentication tag length in bytes (128-bit tag)
pub const TAG_LEN: usize = 16;

/// An encrypted frame as it travels on the air: `nonce || ciphertext+tag`.
///
/// Produced by `encrypt`, consumed immediately by the radio. Never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireFrame {
    pub nonce: [u8; NONCE_LEN],
    pub ciphertext: Vec<u8>,
}

impl WireFrame {
    /// Concatenated on-air representation
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(NONCE_LEN + self.ciphertext.len());
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    /// Split raw on-air bytes back into nonce and ciphertext
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, EngineError> {
        if bytes.len() < NONCE_LEN + TAG_LEN {
            return Err(EngineError::AuthFailure);
        }
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&bytes[..NONCE_LEN]);
        Ok(Self {
            nonce,
            ciphertext: bytes[NONCE_LEN..].to_vec(),
        })
    }
}

/// Generate a fresh 256-bit symmetric key.
///
/// One per device identity, and one per newly learned contact binding.
pub fn generate_key() -> Zeroizing<[u8; 32]> {
    let mut key = Zeroizing::new([0u8; 32]);
    rand::rngs::OsRng.fill_bytes(key.as_mut());
    key
}

/// Encrypt plaintext under a relationship key with a fresh random nonce.
pub fn encrypt(plaintext: &[u8], key: &[u8; 32]) -> Result<WireFrame, EngineError> {
    let mut nonce = [0u8; NONCE_LEN];
    rand::rngs::OsRng.fill_bytes(&mut nonce);

    let cipher = ChaCha20Poly1305::new(key.into());
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|e| EngineError::Internal(format!("encryption failed: {e}")))?;

    Ok(WireFrame { nonce, ciphertext })
}

/// Decrypt raw on-air bytes with the given key.
///
/// Tag mismatch, truncated input, and wrong key all collapse to
/// `AuthFailure` — the caller treats that as foreign traffic, not a crash.
pub fn decrypt(frame_bytes: &[u8], key: &[u8; 32]) -> Result<Vec<u8>, EngineError> {
    let frame = WireFrame::from_bytes(frame_bytes)?;

    let cipher = ChaCha20Poly1305::new(key.into());
    cipher
        .decrypt(Nonce::from_slice(&frame.nonce), frame.ciphertext.as_slice())
        .map_err(|_| EngineError::AuthFailure)
}
