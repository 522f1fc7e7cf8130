//! C3: a content-addressed directory for serialized Resource payloads.
//!
//! Layout: `<dir>/<hash[0..2]>/<hash>` (spec.md §6). Writes go to a
//! temporary file in the same shard directory and are then renamed into
//! place, so concurrent writers producing the same content race harmlessly
//! to the same final name (spec.md §5: "concurrent writes to the same
//! content hash are idempotent").

use std::fs;
use std::path::{Path, PathBuf};

use rms_common::blake3;
use rms_common::tempfile::NamedTempFile;
use rms_graph::{Error, Result};

#[derive(Debug, Clone)]
pub struct Vault {
    dir: PathBuf,
}

impl Vault {
    /// Open (creating if necessary) a vault rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn shard_path(&self, hash_hex: &str) -> PathBuf {
        self.dir.join(&hash_hex[0..2])
    }

    fn entry_path(&self, hash_hex: &str) -> PathBuf {
        self.shard_path(hash_hex).join(hash_hex)
    }

    /// Serialize `payload` with bincode, write it under its content hash,
    /// and return the hex digest used as the vault key.
    pub fn put<T: rms_common::serde::Serialize>(&self, payload: &T) -> Result<String> {
        let bytes = rms_common::bincode::serialize(payload)
            .map_err(|e| Error::SchemaError(format!("failed to serialize payload: {e}")))?;
        self.put_bytes(&bytes)
    }

    /// Write raw, already-encoded bytes under their content hash.
    pub fn put_bytes(&self, bytes: &[u8]) -> Result<String> {
        let hash = blake3::hash(bytes).to_hex().to_string();
        let shard = self.shard_path(&hash);
        fs::create_dir_all(&shard)?;

        let entry = self.entry_path(&hash);
        if entry.exists() {
            return Ok(hash);
        }

        let mut tmp = NamedTempFile::new_in(&shard)?;
        use std::io::Write;
        tmp.write_all(bytes)?;
        tmp.flush()?;
        // `persist` performs an atomic rename; if another writer won the
        // race the destination already has identical content (same hash).
        match tmp.persist(&entry) {
            Ok(_) => {}
            Err(e) if entry.exists() => {
                let _ = e; // lost the race harmlessly
            }
            Err(e) => return Err(Error::Io(e.error)),
        }
        Ok(hash)
    }

    /// Load and deserialize the payload stored at `hash_hex`.
    pub fn get<T: rms_common::serde::de::DeserializeOwned>(&self, hash_hex: &str) -> Result<T> {
        let bytes = self.get_bytes(hash_hex)?;
        rms_common::bincode::deserialize(&bytes)
            .map_err(|e| Error::SchemaError(format!("failed to deserialize payload: {e}")))
    }

    pub fn get_bytes(&self, hash_hex: &str) -> Result<Vec<u8>> {
        let path = self.entry_path(hash_hex);
        fs::read(&path).map_err(Error::Io)
    }

    pub fn contains(&self, hash_hex: &str) -> bool {
        self.entry_path(hash_hex).exists()
    }

    pub fn path_for(&self, hash_hex: &str) -> PathBuf {
        self.entry_path(hash_hex)
    }

    /// Remove every vault entry whose hash is not in `keep`. Used by the
    /// maintenance garbage sweep (spec.md §6).
    pub fn sweep(&self, keep: &std::collections::HashSet<String>) -> Result<usize> {
        let mut removed = 0;
        if !self.dir.exists() {
            return Ok(0);
        }
        for shard in fs::read_dir(&self.dir)? {
            let shard = shard?;
            if !shard.file_type()?.is_dir() {
                continue;
            }
            for entry in fs::read_dir(shard.path())? {
                let entry = entry?;
                let name = entry.file_name().to_string_lossy().to_string();
                if !keep.contains(&name) {
                    fs::remove_file(entry.path())?;
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }

    pub fn root(&self) -> &Path {
        &self.dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rms_common::tempfile::tempdir;

    #[test]
    fn put_then_get_round_trips() {
        let dir = tempdir().unwrap();
        let vault = Vault::open(dir.path()).unwrap();
        let hash = vault.put(&"hello world".to_string()).unwrap();
        let loaded: String = vault.get(&hash).unwrap();
        assert_eq!(loaded, "hello world");
    }

    #[test]
    fn identical_content_shares_one_entry() {
        let dir = tempdir().unwrap();
        let vault = Vault::open(dir.path()).unwrap();
        let h1 = vault.put(&42i64).unwrap();
        let h2 = vault.put(&42i64).unwrap();
        assert_eq!(h1, h2);
    }

    #[test]
    fn sweep_removes_unreferenced_entries() {
        let dir = tempdir().unwrap();
        let vault = Vault::open(dir.path()).unwrap();
        let keep = vault.put(&1i64).unwrap();
        let drop = vault.put(&2i64).unwrap();
        let mut keep_set = std::collections::HashSet::new();
        keep_set.insert(keep.clone());
        let removed = vault.sweep(&keep_set).unwrap();
        assert_eq!(removed, 1);
        assert!(vault.contains(&keep));
        assert!(!vault.contains(&drop));
    }
}
