//! The [`Resource`] entity: an in-memory value produced by a Task.

use rms_common::serde::{Deserialize, Serialize};

use crate::{
    ids::{ResourceId, TaskId},
    info::InfoSet,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(crate = "rms_common::serde")]
pub struct Resource {
    pub id: ResourceId,
    /// The Task that produced this Resource. Exactly one, per invariant 2.
    pub producing_task: TaskId,
    /// Ordinal position in the producing Task's output list.
    pub ordinal: u32,
    /// True if derived from a generator-style Pipe: the payload is consumed
    /// on first read and cannot be restored from the vault.
    pub volatile: bool,
    /// The vault hash the payload was serialized under, if it was
    /// serialized. `None` for a volatile Resource that has not been (and
    /// will never be) written to the vault.
    pub vault_hash: Option<String>,
    pub description: Option<String>,
    pub info: InfoSet,
}

impl Resource {
    pub fn is_reloadable(&self) -> bool {
        !self.volatile && self.vault_hash.is_some()
    }
}
