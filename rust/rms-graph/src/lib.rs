//! Core provenance data model shared by every `rms-*` crate.
//!
//! The analysis record is a directed acyclic graph whose nodes are
//! [`Resource`]s and [`FileResource`]s and whose edges are [`Task`]s. Each
//! node has at most one incoming edge (invariant 2/3 in spec.md §3); Pipes
//! are definitions referenced by Tasks, not graph nodes themselves.

pub mod error;
pub mod file_resource;
pub mod fingerprint;
pub mod ids;
pub mod info;
pub mod pipe;
pub mod resource;
pub mod task;
pub mod transient;
pub mod value;

pub use error::{Error, Result};
pub use file_resource::FileResource;
pub use fingerprint::Fingerprint;
pub use ids::{FileResourceId, NodeId, PipeId, ResourceId, TaskId, UnrunTaskId, VirtualResourceId};
pub use info::{InfoFlag, InfoSet};
pub use pipe::{ArgSchema, Param, Pipe, PipeIdentity};
pub use resource::Resource;
pub use task::{BoundArgs, Task};
pub use transient::{Arg, UnrunTask, VirtualResource};
pub use value::Value;
