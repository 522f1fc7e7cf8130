//! JSON encoding of the value types stored as opaque blobs in SQLite
//! columns (`schema_json`, `args_json`, `literal_json`). Structural data
//! (ids, fingerprints, flags) gets real columns so it can be indexed and
//! queried; everything else is serde_json since nothing needs to `WHERE`
//! against it.

use rms_common::serde_json;
use rms_graph::{ArgSchema, BoundArgs, Error, Result};

pub fn encode_schema(schema: &ArgSchema) -> Result<String> {
    serde_json::to_string(schema).map_err(|e| Error::SchemaError(e.to_string()))
}

pub fn decode_schema(json: &str) -> Result<ArgSchema> {
    serde_json::from_str(json).map_err(|e| Error::SchemaError(e.to_string()))
}

pub fn encode_args(args: &BoundArgs) -> Result<String> {
    serde_json::to_string(args).map_err(|e| Error::SchemaError(e.to_string()))
}

pub fn decode_args(json: &str) -> Result<BoundArgs> {
    serde_json::from_str(json).map_err(|e| Error::SchemaError(e.to_string()))
}

/// The `node_kind` / `entity_kind` discriminant used in `task_outputs`,
/// `task_inputs` and `info_flags`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Pipe,
    Task,
    Resource,
    FileResource,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Pipe => "pipe",
            EntityKind::Task => "task",
            EntityKind::Resource => "resource",
            EntityKind::FileResource => "file_resource",
        }
    }
}
