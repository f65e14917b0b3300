//! Authenticated encryption of capture files at rest.
//!
//! Each clip is sealed with AES-256-GCM under the process key and written next to
//! the plaintext as `<clip>.enc`. A fresh random nonce is drawn for every call.

mod crypto;
pub mod format;

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use zeroize::Zeroize;

pub use crypto::{EncryptionKey, KEY_LEN};
pub use format::{ENCRYPTED_EXTENSION, NONCE_LEN, OVERHEAD, TAG_LEN};

use crate::error::{IntegrityError, VaultError};

pub struct Encryptor {
    key: EncryptionKey,
}

impl Encryptor {
    pub fn new(key: EncryptionKey) -> Self {
        Self { key }
    }

    /// Encrypt `plaintext_path` into `plaintext_path + ".enc"` and return the new path.
    pub fn encrypt(&self, plaintext_path: &Path) -> Result<PathBuf, VaultError> {
        let clear = fs::read(plaintext_path).map_err(|e| VaultError::io(plaintext_path, e))?;
        let sealed = self.seal(clear)?;
        let out_path = encrypted_path(plaintext_path);
        write_atomic(&out_path, &sealed).map_err(|e| VaultError::io(&out_path, e))?;
        Ok(out_path)
    }

    /// Decrypt `encrypted_path` into `output_path`. Nothing is written unless the
    /// authentication tag verifies.
    pub fn decrypt(&self, encrypted_path: &Path, output_path: &Path) -> Result<(), VaultError> {
        let sealed = fs::read(encrypted_path).map_err(|e| VaultError::io(encrypted_path, e))?;
        let mut clear = self.open(&sealed, encrypted_path)?;
        let written = write_atomic(output_path, &clear);
        clear.zeroize();
        written.map_err(|e| VaultError::io(output_path, e))
    }

    /// Seal an in-memory buffer into the on-disk layout.
    pub fn seal(&self, mut clear: Vec<u8>) -> Result<Vec<u8>, VaultError> {
        let nonce = crypto::random_nonce();
        let tag = crypto::encrypt_in_place(&self.key, &nonce, &mut clear)
            .ok_or(VaultError::Encrypt)?;
        Ok(format::join(&nonce, &clear, &tag))
    }

    /// Open a sealed buffer. `origin` is only used for error reporting.
    pub fn open(&self, sealed: &[u8], origin: &Path) -> Result<Vec<u8>, VaultError> {
        let parts = format::split(sealed).ok_or_else(|| IntegrityError::Truncated {
            path: origin.to_path_buf(),
            len: sealed.len(),
            min: OVERHEAD,
        })?;
        let mut clear = parts.ciphertext.to_vec();
        if !crypto::decrypt_in_place(&self.key, parts.nonce, parts.tag, &mut clear) {
            clear.zeroize();
            return Err(IntegrityError::TagMismatch {
                path: origin.to_path_buf(),
            }
            .into());
        }
        Ok(clear)
    }
}

/// `clip.avi` -> `clip.avi.enc`
pub fn encrypted_path(plaintext_path: &Path) -> PathBuf {
    let mut name = plaintext_path.as_os_str().to_owned();
    name.push(".");
    name.push(ENCRYPTED_EXTENSION);
    PathBuf::from(name)
}

fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);
    {
        let mut file = File::create(&tmp_path)?;
        file.write_all(data)?;
        file.sync_all()?;
    }
    fs::rename(tmp_path, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn encryptor() -> Encryptor {
        Encryptor::new(EncryptionKey::from_bytes([7u8; KEY_LEN]))
    }

    #[test]
    fn file_round_trip() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let clip = dir.path().join("motion_20240602-192003.avi");
        fs::write(&clip, b"RIFF fake clip bytes")?;

        let enc = encryptor();
        let sealed_path = enc.encrypt(&clip)?;
        assert_eq!(sealed_path, dir.path().join("motion_20240602-192003.avi.enc"));
        assert_eq!(
            fs::metadata(&sealed_path)?.len() as usize,
            b"RIFF fake clip bytes".len() + OVERHEAD
        );

        let out = dir.path().join("decrypted.avi");
        enc.decrypt(&sealed_path, &out)?;
        assert_eq!(fs::read(out)?, b"RIFF fake clip bytes");
        Ok(())
    }

    #[test]
    fn round_trips_various_sizes() -> anyhow::Result<()> {
        let enc = encryptor();
        for len in [0usize, 1, 15, 16, 17, 4096, 70_001] {
            let clear: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
            let sealed = enc.seal(clear.clone())?;
            assert_eq!(sealed.len(), len + OVERHEAD);
            assert_eq!(enc.open(&sealed, Path::new("mem"))?, clear);
        }
        Ok(())
    }

    #[test]
    fn every_flipped_bit_is_rejected() -> anyhow::Result<()> {
        let enc = encryptor();
        let sealed = enc.seal(b"motion clip".to_vec())?;
        for byte in NONCE_LEN..sealed.len() {
            for bit in 0..8 {
                let mut tampered = sealed.clone();
                tampered[byte] ^= 1 << bit;
                let err = enc.open(&tampered, Path::new("mem")).unwrap_err();
                assert!(matches!(
                    err,
                    VaultError::Integrity(IntegrityError::TagMismatch { .. })
                ));
            }
        }
        Ok(())
    }

    #[test]
    fn tampered_file_writes_no_output() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let clip = dir.path().join("clip.avi");
        fs::write(&clip, b"clip")?;
        let enc = encryptor();
        let sealed_path = enc.encrypt(&clip)?;

        let mut bytes = fs::read(&sealed_path)?;
        let last = bytes.len() - 1;
        bytes[last] ^= 0x80;
        fs::write(&sealed_path, bytes)?;

        let out = dir.path().join("out.avi");
        assert!(enc.decrypt(&sealed_path, &out).is_err());
        assert!(!out.exists());
        Ok(())
    }

    #[test]
    fn wrong_key_is_an_integrity_error() -> anyhow::Result<()> {
        let sealed = encryptor().seal(b"clip".to_vec())?;
        let other = Encryptor::new(EncryptionKey::from_bytes([8u8; KEY_LEN]));
        assert!(matches!(
            other.open(&sealed, Path::new("mem")),
            Err(VaultError::Integrity(IntegrityError::TagMismatch { .. }))
        ));
        Ok(())
    }

    #[test]
    fn truncated_input_is_rejected() {
        let err = encryptor()
            .open(&[0u8; OVERHEAD - 1], Path::new("short.enc"))
            .unwrap_err();
        assert!(matches!(
            err,
            VaultError::Integrity(IntegrityError::Truncated { .. })
        ));
    }

    /// AES-256-GCM file sealed by another implementation: key 00..1f,
    /// nonce 64..6f, no associated data.
    const FOREIGN_SEALED_HEX: &str =
        "6465666768696a6b6c6d6e6f2b77b716599a33ff52073bc8bf09199835aa6378\
         ee0a4d77cf8b79f37a1b76fe8264e31494";

    #[test]
    fn decrypts_files_sealed_elsewhere() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let sealed_path = dir.path().join("orig.avi.enc");
        fs::write(&sealed_path, hex::decode(FOREIGN_SEALED_HEX)?)?;

        let key: [u8; KEY_LEN] = std::array::from_fn(|i| i as u8);
        let out = dir.path().join("orig.avi");
        Encryptor::new(EncryptionKey::from_bytes(key)).decrypt(&sealed_path, &out)?;
        assert_eq!(fs::read(out)?, b"clip sealed elsewhere");
        Ok(())
    }

    #[test]
    fn nonces_are_unique_per_call() -> anyhow::Result<()> {
        let enc = encryptor();
        let mut seen = HashSet::new();
        for _ in 0..256 {
            let sealed = enc.seal(b"same plaintext".to_vec())?;
            assert!(seen.insert(sealed[..NONCE_LEN].to_vec()));
        }
        Ok(())
    }
}
