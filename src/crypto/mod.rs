//! Authenticated symmetric encryption of provider credentials, and token
//! hashing/minting.
//!
//! `Seal`/`Open` use AES-256-GCM with a random 96-bit nonce prepended to the
//! ciphertext-and-tag, the same layout the pack's own key-vault module uses
//! for sealing upstream API secrets at rest. `HashToken`/`MintToken` back the
//! virtual-key lookup path (invariants: `key_hash` is a 256-bit digest
//! with fixed prefix `lum_`).

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit},
};
use rand::RngCore;
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

pub const NONCE_LEN: usize = 12;
pub const KEY_LEN: usize = 32;
pub const TOKEN_PREFIX: &str = "lum_";

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("ciphertext too short or corrupted")]
    InvalidCiphertext,
    #[error("decryption failed")]
    DecryptionFailed,
    #[error("master key must be at least {KEY_LEN} bytes")]
    InvalidKeyLength,
}

/// Holds the service master key. Cloneable and cheap: the key bytes are
/// copied into an owned buffer once at startup and never reallocated.
#[derive(Clone)]
pub struct MasterKey {
    bytes: [u8; KEY_LEN],
}

impl MasterKey {
    /// Build a master key from raw bytes. Only the first `KEY_LEN` bytes are
    /// used; longer input is truncated rather than rejected.
    pub fn from_bytes(raw: &[u8]) -> Result<Self, CryptoError> {
        if raw.len() < KEY_LEN {
            return Err(CryptoError::InvalidKeyLength);
        }
        let mut bytes = [0u8; KEY_LEN];
        bytes.copy_from_slice(&raw[..KEY_LEN]);
        Ok(Self { bytes })
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new_from_slice(&self.bytes).expect("key length fixed at KEY_LEN")
    }
}

impl Drop for MasterKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

/// Seal plaintext under the master key. Returns `nonce || ciphertext_and_tag`.
pub fn seal(key: &MasterKey, plaintext: &[u8]) -> Vec<u8> {
    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = key
        .cipher()
        .encrypt(nonce, plaintext)
        .expect("AES-256-GCM encryption of a bounded secret cannot fail");

    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    out
}

/// Open a ciphertext produced by `seal`. Rejects anything shorter than the
/// nonce, or that fails authentication (tampered, or sealed under a
/// different key).
pub fn open(key: &MasterKey, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if ciphertext.len() <= NONCE_LEN {
        return Err(CryptoError::InvalidCiphertext);
    }
    let (nonce_bytes, body) = ciphertext.split_at(NONCE_LEN);
    let nonce = Nonce::from_slice(nonce_bytes);

    key.cipher()
        .decrypt(nonce, body)
        .map_err(|_| CryptoError::DecryptionFailed)
}

/// Deterministic 256-bit digest of a token, hex-encoded. Used both for
/// storage keying (`virtual_keys.token_hash`) and cache keying.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Mint a fresh virtual token: 256 uniformly random bits, hex-encoded, with
/// the `lum_` prefix.
pub fn mint_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("{TOKEN_PREFIX}{}", hex::encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> MasterKey {
        MasterKey::from_bytes(&[7u8; KEY_LEN]).unwrap()
    }

    #[test]
    fn seal_open_roundtrip() {
        let k = key();
        let plaintext = b"sk-super-secret-upstream-key";
        let ciphertext = seal(&k, plaintext);
        assert_eq!(open(&k, &ciphertext).unwrap(), plaintext);
    }

    #[test]
    fn tampering_fails_open() {
        let k = key();
        let mut ciphertext = seal(&k, b"hello world");
        let last = ciphertext.len() - 1;
        ciphertext[last] ^= 0xff;
        assert!(open(&k, &ciphertext).is_err());
    }

    #[test]
    fn short_ciphertext_rejected() {
        let k = key();
        assert!(matches!(
            open(&k, &[0u8; NONCE_LEN]),
            Err(CryptoError::InvalidCiphertext)
        ));
    }

    #[test]
    fn different_keys_cannot_open_each_others_ciphertext() {
        let k1 = MasterKey::from_bytes(&[1u8; KEY_LEN]).unwrap();
        let k2 = MasterKey::from_bytes(&[2u8; KEY_LEN]).unwrap();
        let ciphertext = seal(&k1, b"secret");
        assert!(open(&k2, &ciphertext).is_err());
    }

    #[test]
    fn mint_token_has_prefix_and_hash_is_64_hex_chars() {
        let token = mint_token();
        assert!(token.starts_with(TOKEN_PREFIX));
        assert_eq!(token.len(), TOKEN_PREFIX.len() + 64);

        let hash = hash_token(&token);
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_uppercase()));
    }

    #[test]
    fn mint_token_is_unique() {
        assert_ne!(mint_token(), mint_token());
    }

    #[test]
    fn seal_is_randomized() {
        let k = key();
        let e1 = seal(&k, b"same plaintext");
        let e2 = seal(&k, b"same plaintext");
        assert_ne!(e1, e2);
    }
}
