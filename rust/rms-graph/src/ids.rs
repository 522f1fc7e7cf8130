//! Stable identifiers for persistent and transient graph nodes.

use rms_common::serde::{Deserialize, Serialize};

macro_rules! store_id {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(crate = "rms_common::serde", transparent)]
        pub struct $name(pub i64);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

store_id!(PipeId);
store_id!(TaskId);
store_id!(ResourceId);
store_id!(FileResourceId);

/// A reference to either kind of output node a Task can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(crate = "rms_common::serde", tag = "kind", content = "id")]
pub enum NodeId {
    Resource(ResourceId),
    FileResource(FileResourceId),
}

impl From<ResourceId> for NodeId {
    fn from(id: ResourceId) -> Self {
        NodeId::Resource(id)
    }
}

impl From<FileResourceId> for NodeId {
    fn from(id: FileResourceId) -> Self {
        NodeId::FileResource(id)
    }
}

/// Transient, in-process-only identifiers for builder planning entities.
/// These are never persisted and are only unique within a single Builder.
macro_rules! transient_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub u64);
    };
}

transient_id!(UnrunTaskId);
transient_id!(VirtualResourceId);
