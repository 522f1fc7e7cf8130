//! The [`Task`] entity: one committed execution of a Pipe.

use std::collections::BTreeMap;

use rms_common::chrono::{DateTime, Utc};
use rms_common::serde::{Deserialize, Serialize};

use crate::{
    fingerprint::Fingerprint,
    ids::{NodeId, PipeId, TaskId},
    info::InfoSet,
    value::Value,
};

/// The normalized arguments bound to a Task, after the Pipe's [`ArgSchema`](crate::pipe::ArgSchema)
/// has been applied (missing params filled with defaults, positional/keyword
/// equivalences unified, variadic captures collected).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(crate = "rms_common::serde")]
pub struct BoundArgs {
    pub positional: Vec<Value>,
    pub keyword: BTreeMap<String, Value>,
}

impl BoundArgs {
    pub fn new(positional: Vec<Value>, keyword: BTreeMap<String, Value>) -> Self {
        Self { positional, keyword }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(crate = "rms_common::serde")]
pub struct Task {
    pub id: TaskId,
    pub pipe_id: PipeId,
    pub args: BoundArgs,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub fingerprint: Fingerprint,
    /// Ordered list of output nodes, in the ordinal order of the Pipe's
    /// return / `output_func` list.
    pub outputs: Vec<NodeId>,
    pub description: Option<String>,
    pub info: InfoSet,
}
