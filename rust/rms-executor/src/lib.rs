//! C6: synchronous single-Task execution — dedup lookup, invocation,
//! output capture (spec.md §4.6).

use std::collections::BTreeMap;
use std::path::PathBuf;

use rms_common::chrono::Utc;
use rms_common::dashmap::DashMap;
use rms_common::tracing::{debug, info};
use rms_graph::{
    BoundArgs, Error, InfoFlag, NodeId, Pipe, PipeId, Result, ResourceId, Task, Value,
};
use rms_files::{FileManager, IntegrityStatus};
use rms_pipes::PipeRegistry;
use rms_store::{EntityRef, NewOutput, NewTask, Store};
use rms_vault::Vault;

/// Outcome of [`Executor::run`]: the committed (or reused) Task plus
/// whether user code actually ran.
pub struct RunOutcome {
    pub task: Task,
    pub reused: bool,
}

pub struct Executor<'a> {
    store: &'a Store,
    vault: &'a Vault,
    files: FileManager<'a>,
    pipes: &'a PipeRegistry<'a>,
    /// One-shot payloads for volatile Resources, held only in this
    /// process's memory (spec.md §4.3: volatile Resources bypass the
    /// vault). Removed on first read.
    volatile: DashMap<ResourceId, Value>,
}

impl<'a> Executor<'a> {
    pub fn new(store: &'a Store, vault: &'a Vault, pipes: &'a PipeRegistry<'a>) -> Self {
        Self {
            store,
            vault,
            files: FileManager::new(store),
            pipes,
            volatile: DashMap::new(),
        }
    }

    /// `run(pipe, args, kwargs) -> outputs` (spec.md §4.6 steps 1-5).
    pub fn run(
        &self,
        pipe_id: PipeId,
        positional: Vec<Value>,
        keyword: BTreeMap<String, Value>,
    ) -> Result<RunOutcome> {
        let pipe = self.pipes.get_pipe(pipe_id)?;
        let bound = rms_fingerprint::normalize_args(&pipe.schema, positional, keyword)?;
        let fingerprint = rms_fingerprint::compute(&pipe.identity, &bound, self.store)?;

        if pipe.is_deterministic {
            if let Some(existing) = self.store.get_task_by_fingerprint(fingerprint)? {
                if self.outputs_still_valid(&existing)? {
                    debug!(pipe = %pipe.identity, task = %existing.id, %fingerprint, "dedup hit, reusing task");
                    return Ok(RunOutcome {
                        task: existing,
                        reused: true,
                    });
                }
                debug!(pipe = %pipe.identity, task = %existing.id, "dedup candidate's outputs no longer valid, rerunning");
            }
        }

        let resolved = self.resolve_args(&bound)?;

        let output_paths = match pipe.output_func {
            Some(output_func_id) => {
                let body = self
                    .pipes
                    .output_func_body(output_func_id)
                    .ok_or_else(|| Error::UnknownPipe(pipe.identity.clone()))?;
                body(&resolved).map_err(Error::PipeExecutionError)?
            }
            None => Vec::new(),
        };

        let body = self
            .pipes
            .body(pipe_id)
            .ok_or_else(|| Error::UnknownPipe(pipe.identity.clone()))?;
        let returned = body(&resolved).map_err(Error::PipeExecutionError)?;

        self.commit(&pipe, bound, fingerprint, returned, output_paths)
    }

    fn outputs_still_valid(&self, task: &Task) -> Result<bool> {
        for output in &task.outputs {
            match output {
                NodeId::Resource(id) => {
                    let Some(resource) = self.store.get_resource(*id)? else {
                        return Ok(false);
                    };
                    // A volatile payload is consumed at most once and is
                    // never restored from the vault; reuse would silently
                    // hand out a second copy of a one-shot value.
                    if resource.volatile || resource.vault_hash.is_none() {
                        return Ok(false);
                    }
                    if !self.vault.contains(resource.vault_hash.as_deref().unwrap()) {
                        return Ok(false);
                    }
                }
                NodeId::FileResource(id) => {
                    let Some(fr) = self.store.get_file_resource(*id)? else {
                        return Ok(false);
                    };
                    if fr.info.has(InfoFlag::Overwritten) {
                        return Ok(false);
                    }
                    if self.files.integrity_check(&fr, false)? != IntegrityStatus::Ok {
                        return Ok(false);
                    }
                }
            }
        }
        Ok(true)
    }

    fn resolve_args(&self, bound: &BoundArgs) -> Result<BoundArgs> {
        let mut keyword = BTreeMap::new();
        for (name, value) in &bound.keyword {
            keyword.insert(name.clone(), self.resolve_value(value)?);
        }
        Ok(BoundArgs {
            positional: Vec::new(),
            keyword,
        })
    }

    fn resolve_value(&self, value: &Value) -> Result<Value> {
        match value {
            Value::Resource(id) => self.read_resource(*id),
            Value::FileResource(id) => {
                let fr = self
                    .store
                    .get_file_resource(*id)?
                    .ok_or(Error::UnknownFileResource(*id))?;
                self.files.ensure_fresh_for_use(&fr)?;
                Ok(Value::Text(fr.path.to_string_lossy().into_owned()))
            }
            Value::Seq(items) => Ok(Value::Seq(
                items.iter().map(|v| self.resolve_value(v)).collect::<Result<_>>()?,
            )),
            Value::Set(items) => Ok(Value::Set(
                items.iter().map(|v| self.resolve_value(v)).collect::<Result<_>>()?,
            )),
            Value::Map(pairs) => Ok(Value::Map(
                pairs
                    .iter()
                    .map(|(k, v)| Ok((self.resolve_value(k)?, self.resolve_value(v)?)))
                    .collect::<Result<Vec<_>>>()?,
            )),
            other => Ok(other.clone()),
        }
    }

    /// Read a Resource's content: reload from the vault, or consume the
    /// in-process one-shot handle for a volatile Resource.
    pub fn read_resource(&self, id: ResourceId) -> Result<Value> {
        let resource = self.store.get_resource(id)?.ok_or(Error::UnknownResource(id))?;
        if resource.volatile {
            self.volatile
                .remove(&id)
                .map(|(_, v)| v)
                .ok_or(Error::VolatileAlreadyConsumed(id))
        } else {
            let hash = resource.vault_hash.ok_or(Error::MissingResource(id))?;
            self.vault.get(&hash)
        }
    }

    fn commit(
        &self,
        pipe: &Pipe,
        args: BoundArgs,
        fingerprint: rms_graph::Fingerprint,
        returned: Vec<Value>,
        output_paths: Vec<PathBuf>,
    ) -> Result<RunOutcome> {
        let mut new_outputs = Vec::with_capacity(returned.len() + output_paths.len());

        for value in &returned {
            if pipe.return_volatile {
                new_outputs.push(NewOutput::Resource {
                    volatile: true,
                    vault_hash: None,
                    description: None,
                });
            } else {
                let hash = self.vault.put(value)?;
                new_outputs.push(NewOutput::Resource {
                    volatile: false,
                    vault_hash: Some(hash),
                    description: None,
                });
            }
        }

        for path in &output_paths {
            let absolute = if path.is_absolute() {
                path.clone()
            } else {
                std::env::current_dir()?.join(path)
            };
            // Mark the prior row overwritten before the new one is committed
            // below, so no two non-overwritten FileResources at the same
            // path are ever observable (matches `FileManager::on_pipe_output`).
            if let Some(prior) = self.store.file_resource_at_path(&absolute)? {
                self.store
                    .mark_info(EntityRef::FileResource(prior.id), InfoFlag::Overwritten, true)?;
            }
            let (size, md5) = hash_file(&absolute)?;
            new_outputs.push(NewOutput::FileResource {
                path: absolute,
                size,
                md5,
                description: None,
            });
        }

        let now = Utc::now();
        let task = self.store.put_task(NewTask {
            pipe_id: pipe.id,
            args,
            started_at: now,
            finished_at: now,
            fingerprint,
            outputs: new_outputs,
            description: None,
        })?;

        if pipe.return_volatile {
            for (value, output) in returned.into_iter().zip(&task.outputs) {
                if let NodeId::Resource(id) = output {
                    self.volatile.insert(*id, value);
                }
            }
        }

        info!(pipe = %pipe.identity, task = %task.id, outputs = task.outputs.len(), "task committed");
        Ok(RunOutcome { task, reused: false })
    }
}

fn hash_file(path: &std::path::Path) -> Result<(u64, [u8; 16])> {
    use rms_common::md5::{Digest, Md5};
    use std::io::Read;

    let mut file = std::fs::File::open(path)?;
    let mut hasher = Md5::new();
    let mut buf = [0u8; 64 * 1024];
    let mut size = 0u64;
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        size += n as u64;
    }
    Ok((size, hasher.finalize().into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rms_common::tempfile::tempdir;
    use rms_graph::{ArgSchema, PipeIdentity};
    use rms_pipes::PipeSpec;
    use std::sync::Arc;

    fn add_pipe(registry: &PipeRegistry<'_>) -> PipeId {
        registry
            .register_pipe(
                PipeSpec {
                    identity: PipeIdentity::Named {
                        module: "demo".into(),
                        qualified_name: "add".into(),
                    },
                    schema: ArgSchema::positional(&["i", "j"]),
                    body: Arc::new(|args: &BoundArgs| {
                        let i = match args.keyword.get("i") {
                            Some(Value::Int(n)) => *n,
                            _ => 0,
                        };
                        let j = match args.keyword.get("j") {
                            Some(Value::Int(n)) => *n,
                            _ => 0,
                        };
                        Ok(vec![Value::Int(i + j)])
                    }),
                    return_volatile: false,
                    is_deterministic: true,
                    description: None,
                    source_code: None,
                },
                None,
            )
            .unwrap()
    }

    #[test]
    fn identical_call_deduplicates_without_rerunning() {
        let store = Store::open_in_memory().unwrap();
        let dir = tempdir().unwrap();
        let vault = Vault::open(dir.path()).unwrap();
        let registry = PipeRegistry::new(&store);
        let pipe_id = add_pipe(&registry);
        let executor = Executor::new(&store, &vault, &registry);

        let first = executor.run(pipe_id, vec![Value::Int(1), Value::Int(2)], BTreeMap::new()).unwrap();
        assert!(!first.reused);
        let second = executor.run(pipe_id, vec![Value::Int(1), Value::Int(2)], BTreeMap::new()).unwrap();
        assert!(second.reused);
        assert_eq!(first.task.id, second.task.id);
    }

    #[test]
    fn dependency_chain_references_producing_resource() {
        let store = Store::open_in_memory().unwrap();
        let dir = tempdir().unwrap();
        let vault = Vault::open(dir.path()).unwrap();
        let registry = PipeRegistry::new(&store);
        let pipe_id = add_pipe(&registry);
        let executor = Executor::new(&store, &vault, &registry);

        let r1 = executor.run(pipe_id, vec![Value::Int(1), Value::Int(2)], BTreeMap::new()).unwrap();
        let NodeId::Resource(r1_id) = r1.task.outputs[0] else {
            panic!("expected resource");
        };

        let r2 = executor
            .run(pipe_id, vec![Value::Resource(r1_id), Value::Int(4)], BTreeMap::new())
            .unwrap();
        assert_eq!(executor.read_resource_for_test(&r2), Value::Int(7));
    }

    impl<'a> Executor<'a> {
        fn read_resource_for_test(&self, outcome: &RunOutcome) -> Value {
            let NodeId::Resource(id) = outcome.task.outputs[0] else {
                panic!("expected resource");
            };
            self.read_resource(id).unwrap()
        }
    }
}
