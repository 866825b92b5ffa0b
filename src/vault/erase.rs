// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Overwrite-then-delete for files holding sealed data.

use std::fs::{self, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;

use ring::rand::{SecureRandom, SystemRandom};

use super::{VaultError, VaultResult};

const CHUNK: usize = 64 * 1024;

/// Overwrite `path` with random bytes, flush to disk, then unlink it.
///
/// A missing file is not an error. Directories are refused.
pub fn secure_erase(path: &Path, rng: &SystemRandom) -> VaultResult<()> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    if !metadata.is_file() {
        return Err(VaultError::InvalidPath(format!(
            "{} is not a regular file",
            path.display()
        )));
    }

    let mut remaining = metadata.len() as usize;
    {
        let mut file = OpenOptions::new().write(true).open(path)?;
        file.seek(SeekFrom::Start(0))?;
        let mut chunk = vec![0u8; CHUNK.min(remaining.max(1))];
        while remaining > 0 {
            let n = remaining.min(chunk.len());
            rng.fill(&mut chunk[..n])
                .map_err(|_| VaultError::Crypto("random source unavailable".to_string()))?;
            file.write_all(&chunk[..n])?;
            remaining -= n;
        }
        file.sync_all()?;
    }

    fs::remove_file(path)?;
    tracing::debug!(path = %path.display(), "securely erased file");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn erases_and_removes_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("secret.sealed");
        fs::write(&path, vec![0x41u8; 200_000]).unwrap();

        secure_erase(&path, &SystemRandom::new()).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn missing_file_is_noop() {
        let temp = TempDir::new().unwrap();
        secure_erase(&temp.path().join("nope"), &SystemRandom::new()).unwrap();
    }

    #[test]
    fn directories_are_refused() {
        let temp = TempDir::new().unwrap();
        let result = secure_erase(temp.path(), &SystemRandom::new());
        assert!(matches!(result, Err(VaultError::InvalidPath(_))));
        assert!(temp.path().exists());
    }

    #[test]
    fn empty_file_is_removed() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("empty");
        fs::write(&path, b"").unwrap();
        secure_erase(&path, &SystemRandom::new()).unwrap();
        assert!(!path.exists());
    }
}
