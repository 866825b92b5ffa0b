// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Secure Vault
//!
//! Authenticated symmetric encryption of opaque payloads with a device-scoped
//! key, secure erasure, and sealed backups.
//!
//! ## Security Model
//!
//! - AES-256-GCM, a fresh 96-bit nonce from the OS CSPRNG on every seal
//! - The key never leaves the vault; there is no accessor for its bytes
//! - A blob opens only under the key that sealed it; any mismatch or
//!   modification is an `Integrity` error and no plaintext is returned
//! - Any cryptographic failure fails the calling operation; there is no
//!   fallback to unencrypted storage

pub mod blob;
pub mod erase;
pub mod key;
pub mod paths;
pub mod records;

use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::Path;

use ring::aead::NONCE_LEN;
use ring::rand::{SecureRandom, SystemRandom};
use serde::{de::DeserializeOwned, Serialize};
use zeroize::Zeroizing;

pub use blob::EncryptedBlob;
pub use key::DeviceKey;
pub use paths::VaultPaths;
pub use records::{RecordKey, SealedStore};

use key::TAG_LEN;
use paths::SEALED_EXT;

#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    /// Authentication tag did not verify (tampering or foreign key).
    #[error("sealed data failed authentication")]
    Integrity,

    #[error("cryptographic failure: {0}")]
    Crypto(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),
}

pub type VaultResult<T> = Result<T, VaultError>;

/// Name of a sealed backup artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct BackupHandle(String);

impl BackupHandle {
    /// Validate a backup name: ASCII alphanumerics, `-`, `_` and `.`, no `..`.
    pub fn parse(name: &str) -> VaultResult<Self> {
        let valid = !name.is_empty()
            && name.len() <= 128
            && !name.contains("..")
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if valid {
            Ok(Self(name.to_string()))
        } else {
            Err(VaultError::InvalidPath(format!("invalid backup name `{name}`")))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BackupHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug)]
pub struct SecureVault {
    key: DeviceKey,
    rng: SystemRandom,
    paths: VaultPaths,
}

impl SecureVault {
    /// Open the vault rooted at `root`, creating the device key on first use.
    pub fn load(root: impl AsRef<Path>) -> VaultResult<Self> {
        let paths = VaultPaths::new(root);
        let rng = SystemRandom::new();
        let key = DeviceKey::load_or_create(&paths.vault_key(), &rng)?;
        fs::create_dir_all(paths.records_dir())?;
        fs::create_dir_all(paths.backups_dir())?;
        Ok(Self { key, rng, paths })
    }

    /// Vault with a process-scoped key. Nothing it seals survives a restart.
    pub fn ephemeral(root: impl AsRef<Path>) -> VaultResult<Self> {
        let paths = VaultPaths::new(root);
        let rng = SystemRandom::new();
        let key = DeviceKey::generate(&rng)?;
        fs::create_dir_all(paths.records_dir())?;
        fs::create_dir_all(paths.backups_dir())?;
        Ok(Self { key, rng, paths })
    }

    pub fn paths(&self) -> &VaultPaths {
        &self.paths
    }

    /// Fill `buf` from the OS CSPRNG.
    pub fn fill_random(&self, buf: &mut [u8]) -> VaultResult<()> {
        self.rng
            .fill(buf)
            .map_err(|_| VaultError::Crypto("random source unavailable".to_string()))
    }

    /// Seal `plaintext` under a freshly drawn nonce.
    pub fn seal(&self, plaintext: &[u8]) -> VaultResult<EncryptedBlob> {
        let mut nonce = [0u8; NONCE_LEN];
        self.fill_random(&mut nonce)?;

        let mut in_out = plaintext.to_vec();
        let tag = self.key.seal_in_place(nonce, &mut in_out)?;

        Ok(EncryptedBlob {
            ciphertext: in_out,
            nonce: nonce.to_vec(),
            auth_tag: tag.to_vec(),
        })
    }

    /// Verify and decrypt a blob sealed by this vault.
    pub fn open(&self, blob: &EncryptedBlob) -> VaultResult<Vec<u8>> {
        let nonce: [u8; NONCE_LEN] = blob
            .nonce
            .as_slice()
            .try_into()
            .map_err(|_| VaultError::Integrity)?;
        if blob.auth_tag.len() != TAG_LEN {
            return Err(VaultError::Integrity);
        }

        let mut in_out = Zeroizing::new(Vec::with_capacity(blob.ciphertext.len() + TAG_LEN));
        in_out.extend_from_slice(&blob.ciphertext);
        in_out.extend_from_slice(&blob.auth_tag);

        let len = self.key.open_in_place(nonce, &mut in_out)?;
        Ok(in_out[..len].to_vec())
    }

    pub fn seal_json<T: Serialize>(&self, value: &T) -> VaultResult<EncryptedBlob> {
        let plaintext = Zeroizing::new(serde_json::to_vec(value)?);
        self.seal(&plaintext)
    }

    pub fn open_json<T: DeserializeOwned>(&self, blob: &EncryptedBlob) -> VaultResult<T> {
        let plaintext = Zeroizing::new(self.open(blob)?);
        Ok(serde_json::from_slice(&plaintext)?)
    }

    /// Overwrite `path` with random bytes before deleting it.
    pub fn secure_erase(&self, path: impl AsRef<Path>) -> VaultResult<()> {
        erase::secure_erase(path.as_ref(), &self.rng)
    }

    /// Seal `plaintext` and store it as backup `name`.
    ///
    /// The artifact is written to a temp file and renamed into place, so a
    /// failed backup leaves nothing behind.
    pub fn backup(&self, plaintext: &[u8], name: &str) -> VaultResult<BackupHandle> {
        let handle = BackupHandle::parse(name)?;
        let blob = self.seal(plaintext)?;
        records::write_blob(&self.paths.backup(handle.as_str()), &blob)?;
        tracing::info!(backup = %handle, bytes = blob.len(), "wrote sealed backup");
        Ok(handle)
    }

    pub fn restore(&self, handle: &BackupHandle) -> VaultResult<Vec<u8>> {
        let path = self.paths.backup(handle.as_str());
        let file = match File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(VaultError::NotFound(format!("backup {handle}")))
            }
            Err(e) => return Err(e.into()),
        };
        let blob: EncryptedBlob =
            serde_json::from_reader(BufReader::new(file)).map_err(|_| VaultError::Integrity)?;
        self.open(&blob)
    }

    /// Backups whose name starts with `prefix`.
    pub fn list_backups(&self, prefix: &str) -> VaultResult<Vec<BackupHandle>> {
        let dir = self.paths.backups_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut handles = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().is_none_or(|ext| ext != SEALED_EXT) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if stem.starts_with(prefix) {
                    if let Ok(handle) = BackupHandle::parse(stem) {
                        handles.push(handle);
                    }
                }
            }
        }
        handles.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(handles)
    }

    pub fn delete_backup(&self, handle: &BackupHandle) -> VaultResult<()> {
        self.secure_erase(self.paths.backup(handle.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, SecureVault) {
        let temp = TempDir::new().unwrap();
        let vault = SecureVault::ephemeral(temp.path()).unwrap();
        (temp, vault)
    }

    #[test]
    fn open_returns_sealed_payload() {
        let (_temp, vault) = setup();
        for payload in [&b""[..], b"a", b"points for chores", &[0u8; 4096]] {
            let blob = vault.seal(payload).unwrap();
            assert_eq!(blob.nonce.len(), 12);
            assert_eq!(blob.auth_tag.len(), 16);
            assert_eq!(vault.open(&blob).unwrap(), payload);
        }
    }

    #[test]
    fn every_single_byte_mutation_fails() {
        let (_temp, vault) = setup();
        let blob = vault.seal(b"allowance: 25").unwrap();

        for i in 0..blob.ciphertext.len() {
            let mut bad = blob.clone();
            bad.ciphertext[i] ^= 0x80;
            assert!(matches!(vault.open(&bad), Err(VaultError::Integrity)));
        }
        for i in 0..blob.nonce.len() {
            let mut bad = blob.clone();
            bad.nonce[i] ^= 0x01;
            assert!(matches!(vault.open(&bad), Err(VaultError::Integrity)));
        }
        for i in 0..blob.auth_tag.len() {
            let mut bad = blob.clone();
            bad.auth_tag[i] ^= 0x01;
            assert!(matches!(vault.open(&bad), Err(VaultError::Integrity)));
        }
    }

    #[test]
    fn nonces_are_fresh() {
        let (_temp, vault) = setup();
        let a = vault.seal(b"same").unwrap();
        let b = vault.seal(b"same").unwrap();
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn foreign_vault_cannot_open() {
        let (_t1, device_a) = setup();
        let (_t2, device_b) = setup();
        let blob = device_a.seal(b"secret").unwrap();
        assert!(matches!(device_b.open(&blob), Err(VaultError::Integrity)));
    }

    #[test]
    fn malformed_blob_shape_is_integrity_error() {
        let (_temp, vault) = setup();
        let mut blob = vault.seal(b"x").unwrap();
        blob.nonce.pop();
        assert!(matches!(vault.open(&blob), Err(VaultError::Integrity)));

        let mut blob = vault.seal(b"x").unwrap();
        blob.auth_tag.truncate(4);
        assert!(matches!(vault.open(&blob), Err(VaultError::Integrity)));
    }

    #[test]
    fn persistent_key_survives_reload() {
        let temp = TempDir::new().unwrap();
        let blob = SecureVault::load(temp.path()).unwrap().seal(b"kept").unwrap();
        let reloaded = SecureVault::load(temp.path()).unwrap();
        assert_eq!(reloaded.open(&blob).unwrap(), b"kept");
    }

    #[test]
    fn backup_and_restore() {
        let (temp, vault) = setup();
        let handle = vault.backup(b"{\"settings\":true}", "export-p1-001").unwrap();
        assert_eq!(vault.restore(&handle).unwrap(), b"{\"settings\":true}");

        let raw = fs::read_to_string(VaultPaths::new(temp.path()).backup("export-p1-001")).unwrap();
        assert!(!raw.contains("settings"));

        assert_eq!(vault.list_backups("export-p1").unwrap(), vec![handle.clone()]);
        vault.delete_backup(&handle).unwrap();
        assert!(matches!(vault.restore(&handle), Err(VaultError::NotFound(_))));
    }

    #[test]
    fn backup_names_are_validated() {
        let (_temp, vault) = setup();
        for bad in ["", "../escape", "a/b", "sp ace"] {
            assert!(matches!(
                vault.backup(b"x", bad),
                Err(VaultError::InvalidPath(_))
            ));
        }
    }

    #[test]
    fn tampered_backup_fails_restore() {
        let (temp, vault) = setup();
        let handle = vault.backup(b"export", "b1").unwrap();
        let path = VaultPaths::new(temp.path()).backup("b1");
        let mut blob: EncryptedBlob =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        blob.auth_tag[0] ^= 0xff;
        fs::write(&path, serde_json::to_vec(&blob).unwrap()).unwrap();
        assert!(matches!(vault.restore(&handle), Err(VaultError::Integrity)));
    }
}
