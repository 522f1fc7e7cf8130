//! The `rms` facade: ties the Store (C2), Vault (C3), FileResource Manager
//! (C4), Pipe Registry (C5), Executor (C6), Worker Pool (C7), Builder (C8)
//! and Query engine (C9) together behind the programmatic surface
//! described in spec.md §6.

pub mod config;

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use rms_builder::Builder;
use rms_executor::{Executor, RunOutcome};
use rms_files::{FileManager, IntegrityStatus};
use rms_graph::{FileResourceId, InfoFlag, PipeId, Result, Value};
pub use rms_graph::{Error, NodeId};
use rms_pipes::{OutputFuncSpec, PipeRegistry, PipeSpec};
use rms_query::{Predicate, QueryEngine};
use rms_store::{EntityRef, Store};
use rms_vault::Vault;
use rms_workers::WorkerPool;

/// Create (or open) the database file at `path`, running schema migrations.
/// Mirrors spec.md §6's `create_new_db(path)`.
pub fn create_new_db(path: impl AsRef<Path>) -> Result<()> {
    Store::open(path)?;
    Ok(())
}

/// The open system: owns nothing beyond what it's given references to,
/// mirroring the reference-based ownership the rest of the workspace uses
/// for `Executor`/`Builder`/`PipeRegistry` (spec.md §4.6-§4.9). A caller
/// typically opens a `Store`/`Vault` on the stack in `main` and constructs
/// one of these around them for the life of the process.
pub struct ResourceManagementSystem<'a> {
    store: &'a Store,
    vault: &'a Vault,
    pipes: &'a PipeRegistry<'a>,
}

impl<'a> ResourceManagementSystem<'a> {
    pub fn new(store: &'a Store, vault: &'a Vault, pipes: &'a PipeRegistry<'a>) -> Self {
        Self { store, vault, pipes }
    }

    pub fn store(&self) -> &'a Store {
        self.store
    }

    pub fn vault(&self) -> &'a Vault {
        self.vault
    }

    /// Register a Pipe, and optionally its `output_func` (spec.md §4.5).
    pub fn register_pipe(
        &self,
        spec: PipeSpec,
        output_func: Option<OutputFuncSpec>,
    ) -> Result<PipeId> {
        self.pipes.register_pipe(spec, output_func)
    }

    /// Register an on-disk file as a FileResource (spec.md §4.4).
    pub fn register_file(&self, path: impl AsRef<Path>, force: bool) -> Result<rms_graph::FileResource> {
        FileManager::new(self.store).register_file(path, force)
    }

    pub fn file_from_path(&self, path: impl AsRef<Path>) -> Result<rms_graph::FileResource> {
        FileManager::new(self.store).file_from_path(path)
    }

    /// Call a Pipe synchronously: dedup lookup, invocation, output capture
    /// (spec.md §4.6).
    pub fn run(
        &self,
        pipe_id: PipeId,
        positional: Vec<Value>,
        keyword: BTreeMap<String, Value>,
    ) -> Result<RunOutcome> {
        Executor::new(self.store, self.vault, self.pipes).run(pipe_id, positional, keyword)
    }

    /// Open a fresh Builder batch bounded by `pool`'s capacity (spec.md
    /// §4.8).
    pub fn builder(&self, pool: WorkerPool) -> Builder<'a> {
        Builder::new(self.store, self.vault, self.pipes, pool)
    }

    /// Structured search (spec.md §4.9).
    pub fn search(&self, predicate: &Predicate) -> Result<HashSet<NodeId>> {
        QueryEngine::new(self.store).search(predicate)
    }

    /// Walk every FileResource not already flagged `overwritten` and report
    /// its on-disk integrity (spec.md §6 maintenance: "integrity-check
    /// traversal"). Walks every FileResource row directly rather than only
    /// Task outputs, since a `register_file`'d FileResource has no
    /// producing Task and would otherwise never be visited.
    pub fn integrity_check_all(&self, deep: bool) -> Result<Vec<(FileResourceId, IntegrityStatus)>> {
        let files = FileManager::new(self.store);
        let mut out = Vec::new();
        for id in self.store.all_file_resource_ids()? {
            let Some(fr) = self.store.get_file_resource(id)? else {
                continue;
            };
            if fr.info.has(InfoFlag::Overwritten) {
                continue;
            }
            out.push((id, files.integrity_check(&fr, deep)?));
        }
        Ok(out)
    }

    /// Mark a node `deprecated` (spec.md §6 maintenance).
    pub fn deprecate(&self, entity: impl Into<EntityRef>) -> Result<()> {
        self.store.mark_info(entity.into(), InfoFlag::Deprecated, true)
    }

    /// Sweep vault entries no longer referenced by any non-volatile
    /// Resource (spec.md §6 maintenance: "garbage-sweeping vault entries
    /// unreferenced by any Resource").
    pub fn sweep_vault(&self) -> Result<usize> {
        let mut keep = HashSet::new();
        for task_id in self.store.all_task_ids()? {
            for node in self.store.output_nodes(task_id)? {
                if let NodeId::Resource(id) = node {
                    if let Some(resource) = self.store.get_resource(id)? {
                        if let Some(hash) = resource.vault_hash {
                            keep.insert(hash);
                        }
                    }
                }
            }
        }
        self.vault.sweep(&keep)
    }
}
