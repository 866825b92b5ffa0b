// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Path layout for the sealed data directory.
//!
//! ```text
//! {root}/
//!   keys/vault.key                     # device key (0600)
//!   records/{namespace}/{id}.sealed    # one EncryptedBlob per logical key
//!   backups/{name}.sealed              # backup and export artifacts
//!   authority.redb                     # embedded authority (single-node mode)
//! ```
//!
//! Record ids are base64url encoded in file names so arbitrary principal ids
//! can never escape their namespace directory.

use std::path::{Path, PathBuf};

use base64ct::{Base64UrlUnpadded, Encoding};

/// Base directory for all persistent state.
pub const DATA_ROOT: &str = "/data";

/// File extension for sealed records and backups.
pub const SEALED_EXT: &str = "sealed";

#[derive(Debug, Clone)]
pub struct VaultPaths {
    root: PathBuf,
}

impl Default for VaultPaths {
    fn default() -> Self {
        Self::new(DATA_ROOT)
    }
}

impl VaultPaths {
    /// Create with a custom root (useful for testing).
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    // ========== Key Paths ==========

    pub fn keys_dir(&self) -> PathBuf {
        self.root.join("keys")
    }

    pub fn vault_key(&self) -> PathBuf {
        self.keys_dir().join("vault.key")
    }

    // ========== Record Paths ==========

    pub fn records_dir(&self) -> PathBuf {
        self.root.join("records")
    }

    pub fn namespace_dir(&self, namespace: &str) -> PathBuf {
        self.records_dir().join(namespace)
    }

    /// Path of the sealed record `{namespace}:{id}`.
    pub fn record(&self, namespace: &str, id: &str) -> PathBuf {
        self.namespace_dir(namespace)
            .join(format!("{}.{SEALED_EXT}", encode_id(id)))
    }

    // ========== Backup Paths ==========

    pub fn backups_dir(&self) -> PathBuf {
        self.root.join("backups")
    }

    pub fn backup(&self, name: &str) -> PathBuf {
        self.backups_dir().join(format!("{name}.{SEALED_EXT}"))
    }

    // ========== Authority ==========

    pub fn authority_db(&self) -> PathBuf {
        self.root.join("authority.redb")
    }
}

/// File stem for a record id.
pub fn encode_id(id: &str) -> String {
    Base64UrlUnpadded::encode_string(id.as_bytes())
}

/// Inverse of [`encode_id`]; `None` for stems this crate did not write.
pub fn decode_id(stem: &str) -> Option<String> {
    let bytes = Base64UrlUnpadded::decode_vec(stem).ok()?;
    String::from_utf8(bytes).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_paths_use_data_root() {
        let paths = VaultPaths::default();
        assert_eq!(paths.root(), Path::new("/data"));
        assert_eq!(paths.vault_key(), PathBuf::from("/data/keys/vault.key"));
        assert_eq!(paths.authority_db(), PathBuf::from("/data/authority.redb"));
    }

    #[test]
    fn record_ids_cannot_traverse() {
        let paths = VaultPaths::new("/tmp/test-data");
        let path = paths.record("settings", "../../etc/passwd");
        assert_eq!(path.parent().unwrap(), Path::new("/tmp/test-data/records/settings"));
        let stem = path.file_stem().unwrap().to_str().unwrap();
        assert_eq!(decode_id(stem).as_deref(), Some("../../etc/passwd"));
    }

    #[test]
    fn backup_paths_are_correct() {
        let paths = VaultPaths::new("/tmp/test-data");
        assert_eq!(
            paths.backup("export-p1"),
            PathBuf::from("/tmp/test-data/backups/export-p1.sealed")
        );
    }

    #[test]
    fn foreign_stems_do_not_decode() {
        assert_eq!(decode_id("***"), None);
    }
}
