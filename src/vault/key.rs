// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Device-scoped AES-256-GCM key.
//!
//! The key file lives on the encrypted data mount and is created exactly once.
//! Its bytes go straight into a `ring` key object; nothing in this crate can
//! read them back out.

use std::fs::{self, OpenOptions};
use std::io::{Read, Write};
use std::path::Path;

use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};
use zeroize::Zeroizing;

use super::{VaultError, VaultResult};

/// 256-bit key length.
pub const KEY_LEN: usize = 32;

/// 128-bit GCM tag length.
pub const TAG_LEN: usize = 16;

pub struct DeviceKey {
    key: LessSafeKey,
}

impl std::fmt::Debug for DeviceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DeviceKey(<redacted>)")
    }
}

impl DeviceKey {
    /// Draw a fresh key that lives only as long as this process.
    pub fn generate(rng: &SystemRandom) -> VaultResult<Self> {
        let mut bytes = Zeroizing::new([0u8; KEY_LEN]);
        rng.fill(bytes.as_mut())
            .map_err(|_| VaultError::Crypto("random source unavailable".to_string()))?;
        Self::from_bytes(bytes.as_ref())
    }

    /// Load the device key at `path`, creating it on first start.
    pub fn load_or_create(path: &Path, rng: &SystemRandom) -> VaultResult<Self> {
        match OpenOptions::new().read(true).open(path) {
            Ok(mut file) => {
                let mut bytes = Zeroizing::new(Vec::with_capacity(KEY_LEN));
                file.read_to_end(&mut bytes)?;
                if bytes.len() != KEY_LEN {
                    return Err(VaultError::Crypto(format!(
                        "device key at {} has invalid length",
                        path.display()
                    )));
                }
                Self::from_bytes(&bytes)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::create(path, rng),
            Err(e) => Err(e.into()),
        }
    }

    fn create(path: &Path, rng: &SystemRandom) -> VaultResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut bytes = Zeroizing::new([0u8; KEY_LEN]);
        rng.fill(bytes.as_mut())
            .map_err(|_| VaultError::Crypto("random source unavailable".to_string()))?;

        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(path)?;
        file.write_all(bytes.as_ref())?;
        file.sync_all()?;

        tracing::info!(path = %path.display(), "generated new device key");
        Self::from_bytes(bytes.as_ref())
    }

    fn from_bytes(bytes: &[u8]) -> VaultResult<Self> {
        let unbound = UnboundKey::new(&AES_256_GCM, bytes)
            .map_err(|_| VaultError::Crypto("invalid key material".to_string()))?;
        Ok(Self {
            key: LessSafeKey::new(unbound),
        })
    }

    /// Encrypt `in_out` in place, returning the detached tag.
    pub(super) fn seal_in_place(
        &self,
        nonce: [u8; NONCE_LEN],
        in_out: &mut Vec<u8>,
    ) -> VaultResult<[u8; TAG_LEN]> {
        let tag = self
            .key
            .seal_in_place_separate_tag(Nonce::assume_unique_for_key(nonce), Aad::empty(), in_out)
            .map_err(|_| VaultError::Crypto("seal failed".to_string()))?;
        let mut out = [0u8; TAG_LEN];
        out.copy_from_slice(tag.as_ref());
        Ok(out)
    }

    /// Decrypt `ciphertext || tag` in place and return the plaintext length.
    ///
    /// Any verification failure is `Integrity`; the buffer must then be discarded.
    pub(super) fn open_in_place(
        &self,
        nonce: [u8; NONCE_LEN],
        in_out: &mut [u8],
    ) -> VaultResult<usize> {
        let plaintext = self
            .key
            .open_in_place(Nonce::assume_unique_for_key(nonce), Aad::empty(), in_out)
            .map_err(|_| VaultError::Integrity)?;
        Ok(plaintext.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn key_file_is_created_once_and_reused() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("keys").join("vault.key");
        let rng = SystemRandom::new();

        let first = DeviceKey::load_or_create(&path, &rng).unwrap();
        let on_disk = fs::read(&path).unwrap();
        assert_eq!(on_disk.len(), KEY_LEN);

        let second = DeviceKey::load_or_create(&path, &rng).unwrap();
        assert_eq!(fs::read(&path).unwrap(), on_disk);

        let mut buf = b"payload".to_vec();
        let tag = first.seal_in_place([7; NONCE_LEN], &mut buf).unwrap();
        buf.extend_from_slice(&tag);
        let len = second.open_in_place([7; NONCE_LEN], &mut buf).unwrap();
        assert_eq!(&buf[..len], b"payload");
    }

    #[cfg(unix)]
    #[test]
    fn key_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let path = temp.path().join("vault.key");
        DeviceKey::load_or_create(&path, &SystemRandom::new()).unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn truncated_key_file_is_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("vault.key");
        fs::write(&path, [1u8; 10]).unwrap();
        let result = DeviceKey::load_or_create(&path, &SystemRandom::new());
        assert!(matches!(result, Err(VaultError::Crypto(_))));
    }

    #[test]
    fn debug_output_is_redacted() {
        let key = DeviceKey::generate(&SystemRandom::new()).unwrap();
        assert_eq!(format!("{key:?}"), "DeviceKey(<redacted>)");
    }
}
