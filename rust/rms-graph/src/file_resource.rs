//! The [`FileResource`] entity: an on-disk artifact tracked by absolute
//! path, size and MD5.

use std::path::PathBuf;

use rms_common::serde::{Deserialize, Serialize};

use crate::{
    ids::{FileResourceId, TaskId},
    info::InfoSet,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(crate = "rms_common::serde")]
pub struct FileResource {
    pub id: FileResourceId,
    /// Absolute path; symlinks are preserved, not resolved.
    pub path: PathBuf,
    pub size: u64,
    pub md5: [u8; 16],
    /// `None` for externally registered files.
    pub producing_task: Option<TaskId>,
    pub description: Option<String>,
    pub info: InfoSet,
}

impl FileResource {
    pub fn md5_hex(&self) -> String {
        self.md5.iter().map(|b| format!("{b:02x}")).collect()
    }
}
