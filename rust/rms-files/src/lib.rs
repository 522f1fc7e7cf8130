//! C4: absolute-path FileResource registration, integrity checking and
//! overwrite bookkeeping.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use rms_common::md5::{Digest, Md5};
use rms_common::tracing::debug;
use rms_graph::{Error, FileResource, InfoFlag, Result, TaskId};
use rms_store::{EntityRef, Store};

/// Result of [`FileManager::integrity_check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrityStatus {
    Ok,
    Changed,
    Missing,
}

pub struct FileManager<'a> {
    store: &'a Store,
}

impl<'a> FileManager<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    fn absolute(path: &Path) -> Result<PathBuf> {
        if path.is_absolute() {
            Ok(path.to_path_buf())
        } else {
            Ok(std::env::current_dir()?.join(path))
        }
    }

    fn hash_and_size(path: &Path) -> Result<(u64, [u8; 16])> {
        let mut file = File::open(path)?;
        let mut hasher = Md5::new();
        let mut buf = [0u8; 64 * 1024];
        let mut size = 0u64;
        loop {
            let n = file.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            size += n as u64;
        }
        let digest = hasher.finalize();
        Ok((size, digest.into()))
    }

    /// `register_file(path, force) -> fr` (spec.md §4.4). Reuses the
    /// current non-overwritten FileResource at `path` unless `force` is
    /// set, in which case the prior row (if any) is marked `overwritten`.
    pub fn register_file(&self, path: impl AsRef<Path>, force: bool) -> Result<FileResource> {
        let path = Self::absolute(path.as_ref())?;
        if !force {
            if let Some(existing) = self.store.file_resource_at_path(&path)? {
                return Ok(existing);
            }
        }

        let (size, md5) = Self::hash_and_size(&path)?;

        if let Some(prior) = self.store.file_resource_at_path(&path)? {
            debug!(prior = %prior.id, path = %path.display(), "marking prior FileResource overwritten");
            self.store
                .mark_info(EntityRef::FileResource(prior.id), InfoFlag::Overwritten, true)?;
        }

        self.store.insert_file_resource(&path, size, md5, None, None)
    }

    /// `file_from_path(path) -> fr`, failing if no current FileResource is
    /// registered there.
    pub fn file_from_path(&self, path: impl AsRef<Path>) -> Result<FileResource> {
        let path = Self::absolute(path.as_ref())?;
        self.store
            .file_resource_at_path(&path)?
            .ok_or_else(|| Error::FileResourceNotFound(path))
    }

    /// `integrity_check(fr, deep) -> status`. Shallow compares size only;
    /// deep also recomputes and compares MD5.
    pub fn integrity_check(&self, fr: &FileResource, deep: bool) -> Result<IntegrityStatus> {
        let metadata = match std::fs::metadata(&fr.path) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(IntegrityStatus::Missing),
            Err(e) => return Err(Error::Io(e)),
        };
        if metadata.len() != fr.size {
            return Ok(IntegrityStatus::Changed);
        }
        if deep {
            let (_, md5) = Self::hash_and_size(&fr.path)?;
            if md5 != fr.md5 {
                return Ok(IntegrityStatus::Changed);
            }
        }
        Ok(IntegrityStatus::Ok)
    }

    /// Reject use of a FileResource marked `overwritten` as a Task input
    /// (spec.md §4.4 policy) and otherwise confirm a shallow integrity
    /// check before the Executor hands the path to user code.
    pub fn ensure_fresh_for_use(&self, fr: &FileResource) -> Result<()> {
        if fr.info.has(InfoFlag::Overwritten) {
            return Err(Error::StaleFileResource {
                path: fr.path.clone(),
                reason: "overwritten".into(),
            });
        }
        match self.integrity_check(fr, false)? {
            IntegrityStatus::Ok => Ok(()),
            IntegrityStatus::Changed => Err(Error::StaleFileResource {
                path: fr.path.clone(),
                reason: "size changed since registration".into(),
            }),
            IntegrityStatus::Missing => Err(Error::StaleFileResource {
                path: fr.path.clone(),
                reason: "file missing".into(),
            }),
        }
    }

    /// `on_pipe_output(path_list, task) -> frs` (spec.md §4.4/§4.6 step 4):
    /// register a fresh FileResource for each produced path, marking any
    /// prior non-overwritten row at the same path `overwritten` first. Per
    /// spec.md §9 open question (b), a produced path that collides with an
    /// input FileResource is treated the same as any other overwrite.
    pub fn on_pipe_output(
        &self,
        paths: &[PathBuf],
        task: TaskId,
    ) -> Result<Vec<FileResource>> {
        let mut outputs = Vec::with_capacity(paths.len());
        for path in paths {
            let path = Self::absolute(path)?;
            let (size, md5) = Self::hash_and_size(&path)?;

            if let Some(prior) = self.store.file_resource_at_path(&path)? {
                debug!(prior = %prior.id, path = %path.display(), "marking prior FileResource overwritten");
                self.store
                    .mark_info(EntityRef::FileResource(prior.id), InfoFlag::Overwritten, true)?;
            }

            outputs.push(
                self.store
                    .insert_file_resource(&path, size, md5, Some(task), None)?,
            );
        }
        Ok(outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rms_common::tempfile::tempdir;
    use std::fs;

    #[test]
    fn register_file_reuses_existing_row() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.txt");
        fs::write(&path, b"x").unwrap();

        let store = Store::open_in_memory().unwrap();
        let files = FileManager::new(&store);
        let first = files.register_file(&path, false).unwrap();
        let second = files.register_file(&path, false).unwrap();
        assert_eq!(first.id, second.id);
    }

    #[test]
    fn rewriting_contents_marks_prior_overwritten_on_reregister() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.txt");
        fs::write(&path, b"x").unwrap();

        let store = Store::open_in_memory().unwrap();
        let files = FileManager::new(&store);
        let first = files.register_file(&path, false).unwrap();

        fs::write(&path, b"yy").unwrap();
        assert_eq!(
            files.integrity_check(&first, false).unwrap(),
            IntegrityStatus::Changed
        );

        let second = files.register_file(&path, true).unwrap();
        assert_ne!(first.id, second.id);

        let reloaded = store.get_file_resource(first.id).unwrap().unwrap();
        assert!(reloaded.info.has(InfoFlag::Overwritten));

        let err = files.ensure_fresh_for_use(&reloaded).unwrap_err();
        assert!(matches!(err, Error::StaleFileResource { .. }));
    }

    #[test]
    fn missing_file_reports_missing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.txt");
        fs::write(&path, b"x").unwrap();

        let store = Store::open_in_memory().unwrap();
        let files = FileManager::new(&store);
        let fr = files.register_file(&path, false).unwrap();
        fs::remove_file(&path).unwrap();

        assert_eq!(
            files.integrity_check(&fr, false).unwrap(),
            IntegrityStatus::Missing
        );
    }
}
