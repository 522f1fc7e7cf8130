//! The tagged error taxonomy from spec.md §7, shared across every `rms-*`
//! crate. Modeled as a `thiserror`-derived enum at the public API boundary
//! (internal plumbing is free to use `eyre` for ergonomic `?`-propagation
//! and fold into [`Error::PipeExecutionError`] or [`Error::StoreError`] at
//! the seam).

use std::path::PathBuf;

use rms_common::{eyre, rusqlite, thiserror};

use crate::{
    ids::{FileResourceId, ResourceId},
    pipe::PipeIdentity,
};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("unknown pipe: {0}")]
    UnknownPipe(PipeIdentity),

    #[error("pipe registration conflict for {0}: an existing Pipe has incompatible attributes")]
    PipeRegistrationConflict(PipeIdentity),

    #[error("stale file resource at {path}: {reason}")]
    StaleFileResource { path: PathBuf, reason: String },

    #[error("resource {0} could not be reloaded: vault entry missing")]
    MissingResource(ResourceId),

    #[error("volatile resource {0} was already consumed")]
    VolatileAlreadyConsumed(ResourceId),

    #[error("pipe execution failed")]
    PipeExecutionError(#[source] eyre::Report),

    #[error("schema error: {0}")]
    SchemaError(String),

    #[error("store error: {0}")]
    StoreError(#[from] rusqlite::Error),

    #[error("cycle detected in builder graph")]
    CycleDetected,

    #[error("operation cancelled")]
    Cancelled,

    #[error("file resource not found at {0}")]
    FileResourceNotFound(PathBuf),

    #[error("file resource {0} not found")]
    UnknownFileResource(FileResourceId),

    #[error("resource {0} not found")]
    UnknownResource(ResourceId),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
