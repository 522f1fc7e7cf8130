//! [`UnrunTask`] and [`VirtualResource`]: transient planning placeholders
//! used by the Builder/Scheduler. Neither is ever persisted (spec.md
//! invariant 5); both live only in a Builder's in-process memory and are
//! removed atomically when their `replacement` is installed.

use std::collections::BTreeMap;

use crate::{
    ids::{NodeId, PipeId, UnrunTaskId, VirtualResourceId},
    value::Value,
};

/// One argument bound to an [`UnrunTask`]: a literal, a reference to an
/// already-committed node, or a not-yet-resolved planned output.
#[derive(Debug, Clone)]
pub enum Arg {
    Literal(Value),
    Node(NodeId),
    Virtual(VirtualResourceId),
}

impl Arg {
    pub fn is_resolved(&self) -> bool {
        !matches!(self, Arg::Virtual(_))
    }
}

#[derive(Debug, Clone)]
pub struct UnrunTask {
    pub id: UnrunTaskId,
    pub pipe_id: PipeId,
    pub positional: Vec<Arg>,
    pub keyword: BTreeMap<String, Arg>,
    /// Installed once this placeholder's Task has actually run.
    pub replacement: Option<crate::ids::TaskId>,
    /// Insertion order within the Builder; used to break ties in readiness.
    pub sequence: u64,
}

impl UnrunTask {
    /// All arguments that reference another planned output, used to compute
    /// dataflow predecessors for the topological pass.
    pub fn virtual_dependencies(&self) -> impl Iterator<Item = VirtualResourceId> + '_ {
        self.positional
            .iter()
            .chain(self.keyword.values())
            .filter_map(|arg| match arg {
                Arg::Virtual(id) => Some(*id),
                _ => None,
            })
    }

    pub fn is_ready(&self) -> bool {
        self.virtual_dependencies().next().is_none()
    }
}

#[derive(Debug, Clone)]
pub struct VirtualResource {
    pub id: VirtualResourceId,
    pub producer: UnrunTaskId,
    pub ordinal: u32,
    /// Installed to the concrete Resource/FileResource id once the
    /// producing UnrunTask completes.
    pub replacement: Option<NodeId>,
}
