//! Row <-> domain type conversions and small cross-cutting helpers shared
//! by [`crate::store::Store`].

use rms_graph::{Error, FileResourceId, NodeId, Result, ResourceId};

use crate::codec::EntityKind;

pub fn node_kind_id(node: NodeId) -> (&'static str, i64) {
    match node {
        NodeId::Resource(id) => ("resource", id.0),
        NodeId::FileResource(id) => ("file_resource", id.0),
    }
}

pub fn node_from_kind_id(kind: &str, id: i64) -> Result<NodeId> {
    match kind {
        "resource" => Ok(NodeId::Resource(ResourceId(id))),
        "file_resource" => Ok(NodeId::FileResource(FileResourceId(id))),
        other => Err(Error::SchemaError(format!("unknown node kind '{other}'"))),
    }
}

pub fn entity_kind_id(entity: crate::EntityRef) -> (&'static str, i64) {
    use crate::EntityRef::*;
    match entity {
        Pipe(id) => (EntityKind::Pipe.as_str(), id.0),
        Task(id) => (EntityKind::Task.as_str(), id.0),
        Resource(id) => (EntityKind::Resource.as_str(), id.0),
        FileResource(id) => (EntityKind::FileResource.as_str(), id.0),
    }
}

pub fn md5_to_hex(md5: [u8; 16]) -> String {
    md5.iter().map(|b| format!("{b:02x}")).collect()
}

pub fn md5_from_hex(hex: &str) -> Result<[u8; 16]> {
    if hex.len() != 32 {
        return Err(Error::SchemaError("malformed md5 hex".into()));
    }
    let mut out = [0u8; 16];
    for (i, byte) in out.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16)
            .map_err(|_| Error::SchemaError("malformed md5 hex".into()))?;
    }
    Ok(out)
}
