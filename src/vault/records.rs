// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Keyed store of independently sealed records.
//!
//! Each logical key maps to exactly one file holding one `EncryptedBlob`.
//! Writes go to a temp file and are renamed into place, so a reader sees the
//! old record or the new one, never a torn write. Callers serialise writers
//! per key; the store itself holds no lock.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};

use super::paths::{decode_id, SEALED_EXT};
use super::{EncryptedBlob, SecureVault, VaultError, VaultResult};

/// Logical record keys. `Display` renders the `namespace:id` form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RecordKey {
    Settings(String),
    DataLogs(String),
    BackupCodes(String),
    TotpCredential(String),
    PayoutKeys(String),
    Limits(String),
    Usage(String),
    /// Access log shard for one UTC day (`YYYY-MM-DD`).
    AccessLog(String),
}

/// Namespaces holding a principal's own data, removed by erasure.
///
/// `limits`, `usage` and `pixKey` are spending controls of a family and
/// survive erasure of the parent.
pub const SUBJECT_NAMESPACES: [&str; 4] = ["settings", "logs", "backupCodes", "totp"];

impl RecordKey {
    pub fn namespace(&self) -> &'static str {
        match self {
            RecordKey::Settings(_) => "settings",
            RecordKey::DataLogs(_) => "logs",
            RecordKey::BackupCodes(_) => "backupCodes",
            RecordKey::TotpCredential(_) => "totp",
            RecordKey::PayoutKeys(_) => "pixKey",
            RecordKey::Limits(_) => "limits",
            RecordKey::Usage(_) => "usage",
            RecordKey::AccessLog(_) => "accessLog",
        }
    }

    pub fn id(&self) -> &str {
        match self {
            RecordKey::Settings(id)
            | RecordKey::DataLogs(id)
            | RecordKey::BackupCodes(id)
            | RecordKey::TotpCredential(id)
            | RecordKey::PayoutKeys(id)
            | RecordKey::Limits(id)
            | RecordKey::Usage(id)
            | RecordKey::AccessLog(id) => id,
        }
    }
}

impl std::fmt::Display for RecordKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.namespace(), self.id())
    }
}

#[derive(Debug, Clone)]
pub struct SealedStore {
    vault: Arc<SecureVault>,
}

impl SealedStore {
    pub fn new(vault: Arc<SecureVault>) -> Self {
        Self { vault }
    }

    pub fn vault(&self) -> &Arc<SecureVault> {
        &self.vault
    }

    /// Seal `value` and write it under `key`, replacing any previous record.
    pub fn put<T: Serialize>(&self, key: &RecordKey, value: &T) -> VaultResult<()> {
        let blob = self.vault.seal_json(value)?;
        let path = self.vault.paths().record(key.namespace(), key.id());
        write_blob(&path, &blob)
    }

    /// Read and open the record under `key`. `Ok(None)` when absent.
    pub fn get<T: DeserializeOwned>(&self, key: &RecordKey) -> VaultResult<Option<T>> {
        let path = self.vault.paths().record(key.namespace(), key.id());
        let file = match File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let blob: EncryptedBlob =
            serde_json::from_reader(BufReader::new(file)).map_err(|_| VaultError::Integrity)?;
        self.vault.open_json(&blob).map(Some)
    }

    pub fn exists(&self, key: &RecordKey) -> bool {
        File::open(self.vault.paths().record(key.namespace(), key.id())).is_ok()
    }

    /// Securely erase the record under `key`. Returns whether it existed.
    pub fn remove(&self, key: &RecordKey) -> VaultResult<bool> {
        let path = self.vault.paths().record(key.namespace(), key.id());
        let existed = path.exists();
        self.vault.secure_erase(&path)?;
        Ok(existed)
    }

    /// Ids of every record in `namespace`.
    pub fn list_ids(&self, namespace: &str) -> VaultResult<Vec<String>> {
        let dir = self.vault.paths().namespace_dir(namespace);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut ids = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if !path.is_file() || path.extension().is_none_or(|ext| ext != SEALED_EXT) {
                continue;
            }
            if let Some(id) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(decode_id)
            {
                ids.push(id);
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Securely erase every subject-data record of `principal_id`.
    pub fn erase_principal(&self, principal_id: &str) -> VaultResult<usize> {
        let mut erased = 0;
        for namespace in SUBJECT_NAMESPACES {
            let path = self.vault.paths().record(namespace, principal_id);
            if path.exists() {
                self.vault.secure_erase(&path)?;
                erased += 1;
            }
        }
        Ok(erased)
    }
}

/// Write a blob atomically (temp file + rename).
pub(super) fn write_blob(path: &Path, blob: &EncryptedBlob) -> VaultResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let temp_path = path.with_extension(format!("tmp-{}", uuid::Uuid::new_v4()));
    {
        let file = File::create(&temp_path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, blob)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
    }

    if let Err(e) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(e.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vault::VaultPaths;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Sample {
        name: String,
        value: u32,
    }

    fn setup() -> (TempDir, SealedStore) {
        let temp = TempDir::new().unwrap();
        let vault = SecureVault::ephemeral(temp.path()).unwrap();
        (temp, SealedStore::new(Arc::new(vault)))
    }

    #[test]
    fn record_key_display() {
        assert_eq!(RecordKey::Settings("p1".into()).to_string(), "settings:p1");
        assert_eq!(RecordKey::BackupCodes("p1".into()).to_string(), "backupCodes:p1");
        assert_eq!(RecordKey::PayoutKeys("p9".into()).to_string(), "pixKey:p9");
    }

    #[test]
    fn put_then_get() {
        let (_temp, store) = setup();
        let key = RecordKey::Settings("p1".into());
        let sample = Sample {
            name: "alice".into(),
            value: 7,
        };

        store.put(&key, &sample).unwrap();
        assert_eq!(store.get::<Sample>(&key).unwrap(), Some(sample));
    }

    #[test]
    fn records_are_not_plaintext_on_disk() {
        let (temp, store) = setup();
        let key = RecordKey::Settings("p1".into());
        store
            .put(
                &key,
                &Sample {
                    name: "very-identifiable-name".into(),
                    value: 1,
                },
            )
            .unwrap();

        let path = VaultPaths::new(temp.path()).record("settings", "p1");
        let raw = fs::read_to_string(path).unwrap();
        assert!(!raw.contains("very-identifiable-name"));
    }

    #[test]
    fn missing_record_is_none() {
        let (_temp, store) = setup();
        let value: Option<Sample> = store.get(&RecordKey::Limits("nobody".into())).unwrap();
        assert!(value.is_none());
    }

    #[test]
    fn tampered_record_is_integrity_error() {
        let (temp, store) = setup();
        let key = RecordKey::Usage("p1".into());
        store
            .put(
                &key,
                &Sample {
                    name: "x".into(),
                    value: 1,
                },
            )
            .unwrap();

        let path = VaultPaths::new(temp.path()).record("usage", "p1");
        let mut blob: EncryptedBlob =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        blob.ciphertext[0] ^= 0x01;
        fs::write(&path, serde_json::to_vec(&blob).unwrap()).unwrap();

        let result = store.get::<Sample>(&key);
        assert!(matches!(result, Err(VaultError::Integrity)));
    }

    #[test]
    fn list_and_erase_principal() {
        let (_temp, store) = setup();
        let sample = Sample {
            name: "x".into(),
            value: 1,
        };
        store.put(&RecordKey::Settings("p1".into()), &sample).unwrap();
        store.put(&RecordKey::DataLogs("p1".into()), &sample).unwrap();
        store.put(&RecordKey::Settings("p2".into()), &sample).unwrap();

        assert_eq!(store.list_ids("settings").unwrap(), vec!["p1", "p2"]);

        assert_eq!(store.erase_principal("p1").unwrap(), 2);
        assert!(!store.exists(&RecordKey::Settings("p1".into())));
        assert!(!store.exists(&RecordKey::DataLogs("p1".into())));
        assert!(store.exists(&RecordKey::Settings("p2".into())));
    }

    #[test]
    fn erasure_keeps_spending_controls() {
        let (_temp, store) = setup();
        let p1 = || "p1".to_string();
        store.put(&RecordKey::Settings(p1()), &1u32).unwrap();
        store.put(&RecordKey::Limits(p1()), &1u32).unwrap();
        store.put(&RecordKey::Usage(p1()), &1u32).unwrap();
        store.put(&RecordKey::PayoutKeys(p1()), &1u32).unwrap();

        assert_eq!(store.erase_principal("p1").unwrap(), 1);
        assert!(!store.exists(&RecordKey::Settings(p1())));
        assert!(store.exists(&RecordKey::Limits(p1())));
        assert!(store.exists(&RecordKey::Usage(p1())));
        assert!(store.exists(&RecordKey::PayoutKeys(p1())));
    }

    #[test]
    fn remove_reports_existence() {
        let (_temp, store) = setup();
        let key = RecordKey::Limits("p1".into());
        assert!(!store.remove(&key).unwrap());
        store.put(&key, &1u32).unwrap();
        assert!(store.remove(&key).unwrap());
        assert!(!store.exists(&key));
    }
}
