//! The durable Store (spec.md C2/§6): the single SQLite-backed source of
//! truth for Pipes, Tasks, Resources and FileResources.

mod codec;
mod entities;
mod schema;
mod store;

use rms_graph::{FileResourceId, PipeId, ResourceId, TaskId};

pub use schema::CURRENT_VERSION;
pub use store::{NewOutput, NewTask, PipeSpec, Store};

/// A reference to any persistent entity that can carry [`rms_graph::InfoFlag`]s,
/// not just graph nodes (a Pipe's `SourceCode` flag lives on the Pipe
/// itself, not on one of its Tasks' outputs).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityRef {
    Pipe(PipeId),
    Task(TaskId),
    Resource(ResourceId),
    FileResource(FileResourceId),
}

impl From<ResourceId> for EntityRef {
    fn from(id: ResourceId) -> Self {
        EntityRef::Resource(id)
    }
}

impl From<FileResourceId> for EntityRef {
    fn from(id: FileResourceId) -> Self {
        EntityRef::FileResource(id)
    }
}

impl From<rms_graph::NodeId> for EntityRef {
    fn from(node: rms_graph::NodeId) -> Self {
        match node {
            rms_graph::NodeId::Resource(id) => EntityRef::Resource(id),
            rms_graph::NodeId::FileResource(id) => EntityRef::FileResource(id),
        }
    }
}
