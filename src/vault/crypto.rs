use aes_gcm::{
    aead::{generic_array::GenericArray, AeadInPlace, KeyInit},
    Aes256Gcm, Key,
};
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::ConfigError;
use crate::vault::format::{NONCE_LEN, TAG_LEN};

pub const KEY_LEN: usize = 32;

/// 256-bit capture encryption key. Loaded once at startup, never rotated, wiped on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey([u8; KEY_LEN]);

impl EncryptionKey {
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Parse a 64-character hex string.
    pub fn from_hex(hex_key: &str) -> Result<Self, ConfigError> {
        let mut raw = hex::decode(hex_key.trim())
            .map_err(|e| ConfigError::new(format!("ENCRYPTION_KEY is not valid hex: {}", e)))?;
        if raw.len() != KEY_LEN {
            let len = raw.len();
            raw.zeroize();
            return Err(ConfigError::new(format!(
                "ENCRYPTION_KEY must decode to {} bytes, got {}",
                KEY_LEN, len
            )));
        }
        let mut key = [0u8; KEY_LEN];
        key.copy_from_slice(&raw);
        raw.zeroize();
        Ok(Self(key))
    }

    pub fn generate() -> Self {
        let mut key = [0u8; KEY_LEN];
        rand::thread_rng().fill_bytes(&mut key);
        Self(key)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.0))
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EncryptionKey(<redacted>)")
    }
}

pub(crate) fn random_nonce() -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce);
    nonce
}

pub(crate) fn encrypt_in_place(
    key: &EncryptionKey,
    nonce: &[u8; NONCE_LEN],
    buffer: &mut [u8],
) -> Option<[u8; TAG_LEN]> {
    let tag = key
        .cipher()
        .encrypt_in_place_detached(GenericArray::from_slice(nonce), b"", buffer)
        .ok()?;
    Some(tag.into())
}

/// Returns false on tag mismatch; `buffer` contents are unspecified in that case.
pub(crate) fn decrypt_in_place(
    key: &EncryptionKey,
    nonce: &[u8; NONCE_LEN],
    tag: &[u8; TAG_LEN],
    buffer: &mut [u8],
) -> bool {
    key.cipher()
        .decrypt_in_place_detached(
            GenericArray::from_slice(nonce),
            b"",
            buffer,
            GenericArray::from_slice(tag),
        )
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_key_must_be_32_bytes() {
        assert!(EncryptionKey::from_hex(&"ab".repeat(32)).is_ok());
        assert!(EncryptionKey::from_hex(&"ab".repeat(16)).is_err());
        assert!(EncryptionKey::from_hex("not hex at all").is_err());
    }

    #[test]
    fn hex_round_trip() {
        let key = EncryptionKey::generate();
        let parsed = EncryptionKey::from_hex(&key.to_hex()).unwrap();
        assert_eq!(parsed.to_hex(), key.to_hex());
    }

    #[test]
    fn debug_does_not_leak_key() {
        let key = EncryptionKey::from_bytes([0x42; KEY_LEN]);
        assert!(!format!("{:?}", key).contains("42"));
    }
}
