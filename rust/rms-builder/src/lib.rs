//! C8: the deferred-execution Builder/Scheduler (spec.md §4.8) — accumulates
//! a DAG of [`UnrunTask`]s and [`VirtualResource`]s, then executes it
//! topologically against the worker pool.
//!
//! Concurrency note: `rms-workers`' [`WorkerPool`] is the standalone C7
//! primitive (a bounded async job queue via `tokio::spawn_blocking`, used
//! directly by callers that want one bounded-async submission). The
//! Builder's batch walk is itself synchronous coordinator work, so instead
//! of bridging through `tokio` it bounds each topological wave's
//! concurrency with `std::thread::scope`, chunked to the pool's configured
//! `capacity()` — scoped threads let it borrow the (non-`'static`)
//! `Executor` directly rather than requiring `Arc`-owned state. The pool
//! is still held for its `shutdown()`/`is_shutdown()` cancellation signal.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use rms_common::tracing::{debug, warn};
use rms_executor::Executor;
use rms_graph::{
    Arg, Error, Fingerprint, NodeId, PipeId, Result, Task, UnrunTask, UnrunTaskId, Value,
    VirtualResource, VirtualResourceId,
};
use rms_pipes::PipeRegistry;
use rms_store::Store;
use rms_vault::Vault;
use rms_workers::WorkerPool;

/// Outcome of [`Builder::execute_builder`].
#[derive(Debug, Default)]
pub struct BuildReport {
    pub completed: Vec<UnrunTaskId>,
    /// `(folded, leader)`: `folded`'s UnrunTask shared a fingerprint with
    /// `leader`'s within this batch and was not separately executed.
    pub folded: Vec<(UnrunTaskId, UnrunTaskId)>,
    pub skipped: Vec<UnrunTaskId>,
    pub failed: Vec<(UnrunTaskId, String)>,
}

pub struct Builder<'a> {
    store: &'a Store,
    pipes: &'a PipeRegistry<'a>,
    executor: Executor<'a>,
    pool: WorkerPool,
    tasks: HashMap<UnrunTaskId, UnrunTask>,
    resources: HashMap<VirtualResourceId, VirtualResource>,
    sequence: u64,
    next_task_id: u64,
    next_resource_id: u64,
}

impl<'a> Builder<'a> {
    pub fn new(
        store: &'a Store,
        vault: &'a Vault,
        pipes: &'a PipeRegistry<'a>,
        pool: WorkerPool,
    ) -> Self {
        Self {
            store,
            pipes,
            executor: Executor::new(store, vault, pipes),
            pool,
            tasks: HashMap::new(),
            resources: HashMap::new(),
            sequence: 0,
            next_task_id: 0,
            next_resource_id: 0,
        }
    }

    /// `call_pipe(...)` (spec.md §4.8): records an [`UnrunTask`] and
    /// `output_count` [`VirtualResource`]s instead of executing
    /// immediately. `output_count` stands in for the runtime arity a
    /// dynamic-language implementation would discover from the Pipe's
    /// actual return; Rust callables carry no such reflection, so the
    /// caller declares it up front (recorded as a Decision in DESIGN.md).
    pub fn call_pipe(
        &mut self,
        pipe_id: PipeId,
        positional: Vec<Arg>,
        keyword: BTreeMap<String, Arg>,
        output_count: usize,
    ) -> Vec<VirtualResourceId> {
        let task_id = UnrunTaskId(self.next_task_id);
        self.next_task_id += 1;
        let sequence = self.sequence;
        self.sequence += 1;

        let mut ids = Vec::with_capacity(output_count);
        for ordinal in 0..output_count {
            let id = VirtualResourceId(self.next_resource_id);
            self.next_resource_id += 1;
            self.resources.insert(
                id,
                VirtualResource {
                    id,
                    producer: task_id,
                    ordinal: ordinal as u32,
                    replacement: None,
                },
            );
            ids.push(id);
        }

        self.tasks.insert(
            task_id,
            UnrunTask {
                id: task_id,
                pipe_id,
                positional,
                keyword,
                replacement: None,
                sequence,
            },
        );
        ids
    }

    /// Stop submitting new work; Tasks already running finish normally
    /// (spec.md §4.8/§5).
    pub fn cancel(&self) {
        self.pool.shutdown();
    }

    fn is_ready(&self, task: &UnrunTask) -> bool {
        task.virtual_dependencies()
            .all(|vr_id| matches!(self.resources.get(&vr_id), Some(vr) if vr.replacement.is_some()))
    }

    fn resolve_arg(&self, arg: &Arg) -> Value {
        match arg {
            Arg::Literal(v) => v.clone(),
            Arg::Node(node) => node_to_value(*node),
            Arg::Virtual(id) => {
                let node = self.resources[id]
                    .replacement
                    .expect("resolve_arg called on a not-yet-ready UnrunTask");
                node_to_value(node)
            }
        }
    }

    fn bound_values(&self, task: &UnrunTask) -> (Vec<Value>, BTreeMap<String, Value>) {
        let positional = task.positional.iter().map(|a| self.resolve_arg(a)).collect();
        let keyword = task
            .keyword
            .iter()
            .map(|(name, arg)| (name.clone(), self.resolve_arg(arg)))
            .collect();
        (positional, keyword)
    }

    /// `execute_builder()` (spec.md §4.8): a Kahn's-algorithm topological
    /// walk. Each wave's ready UnrunTasks run concurrently (bounded by the
    /// pool's capacity); a non-empty, stuck remainder after the walk
    /// terminates means the dataflow graph contains a cycle.
    pub fn execute_builder(&mut self) -> Result<BuildReport> {
        let mut report = BuildReport::default();
        let mut skipped: HashSet<UnrunTaskId> = HashSet::new();
        let mut done: HashSet<UnrunTaskId> = HashSet::new();

        loop {
            if self.pool.is_shutdown() {
                debug!("pool shut down, halting wave walk");
                break;
            }

            let mut ready: Vec<UnrunTaskId> = self
                .tasks
                .values()
                .filter(|t| t.replacement.is_none() && !done.contains(&t.id) && !skipped.contains(&t.id))
                .filter(|t| self.is_ready(t))
                .map(|t| t.id)
                .collect();
            if ready.is_empty() {
                break;
            }
            ready.sort_by_key(|id| self.tasks[id].sequence);

            // Within-batch dedup: group this wave's ready tasks by
            // precomputed fingerprint; only the sequence-first id per
            // group actually runs, the rest fold into it once it completes.
            let mut groups: HashMap<Fingerprint, Vec<UnrunTaskId>> = HashMap::new();
            let mut ungroupable = Vec::new();
            for &id in &ready {
                let task = &self.tasks[&id];
                let pipe = self.pipes.get_pipe(task.pipe_id)?;
                let (positional, keyword) = self.bound_values(task);
                let bound = rms_fingerprint::normalize_args(&pipe.schema, positional, keyword)?;
                if pipe.is_deterministic {
                    let fp = rms_fingerprint::compute(&pipe.identity, &bound, self.store)?;
                    groups.entry(fp).or_default().push(id);
                } else {
                    ungroupable.push(id);
                }
            }

            let mut leaders = Vec::new();
            let mut followers: Vec<(UnrunTaskId, UnrunTaskId)> = Vec::new();
            for mut ids in groups.into_values() {
                ids.sort_by_key(|id| self.tasks[id].sequence);
                let leader = ids.remove(0);
                leaders.push(leader);
                for follower in ids {
                    followers.push((follower, leader));
                }
            }
            leaders.extend(ungroupable);
            leaders.sort_by_key(|id| self.tasks[id].sequence);

            debug!(
                ready = ready.len(),
                leaders = leaders.len(),
                followers = followers.len(),
                capacity = self.pool.capacity(),
                "starting wave"
            );

            for chunk in leaders.chunks(self.pool.capacity()) {
                let jobs: Vec<(UnrunTaskId, PipeId, Vec<Value>, BTreeMap<String, Value>)> = chunk
                    .iter()
                    .map(|&id| {
                        let task = &self.tasks[&id];
                        let (positional, keyword) = self.bound_values(task);
                        (id, task.pipe_id, positional, keyword)
                    })
                    .collect();

                let results: Vec<(UnrunTaskId, Result<Task>)> = std::thread::scope(|scope| {
                    let handles: Vec<_> = jobs
                        .into_iter()
                        .map(|(id, pipe_id, positional, keyword)| {
                            let executor = &self.executor;
                            scope.spawn(move || {
                                let outcome = executor.run(pipe_id, positional, keyword);
                                (id, outcome.map(|o| o.task))
                            })
                        })
                        .collect();
                    handles.into_iter().map(|h| h.join().expect("worker thread panicked")).collect()
                });

                for (id, outcome) in results {
                    match outcome {
                        Ok(task) => {
                            self.install_replacement(id, task);
                            done.insert(id);
                            report.completed.push(id);
                        }
                        Err(e) => {
                            report.failed.push((id, e.to_string()));
                            self.propagate_skip(id, &mut skipped);
                        }
                    }
                }
            }

            for (follower, leader) in followers {
                if let Some(task) = self.task_result(leader) {
                    self.install_replacement(follower, task);
                    done.insert(follower);
                    report.folded.push((follower, leader));
                } else {
                    // The leader failed or was skipped; the follower shares
                    // its fate.
                    self.propagate_skip(follower, &mut skipped);
                }
            }
        }

        let stuck = self
            .tasks
            .values()
            .any(|t| t.replacement.is_none() && !done.contains(&t.id) && !skipped.contains(&t.id));
        if stuck && !self.pool.is_shutdown() {
            warn!("stuck remainder after wave walk terminated, reporting a cycle");
            return Err(Error::CycleDetected);
        }

        debug!(
            completed = report.completed.len(),
            folded = report.folded.len(),
            skipped = skipped.len(),
            failed = report.failed.len(),
            "builder run finished"
        );
        report.skipped = skipped.into_iter().collect();
        Ok(report)
    }

    fn task_result(&self, id: UnrunTaskId) -> Option<Task> {
        let task_id = self.tasks.get(&id)?.replacement?;
        self.store.get_task(task_id).ok().flatten()
    }

    fn install_replacement(&mut self, id: UnrunTaskId, task: Task) {
        let outputs = task.outputs.clone();
        if let Some(unrun) = self.tasks.get_mut(&id) {
            unrun.replacement = Some(task.id);
        }
        for vr in self.resources.values_mut() {
            if vr.producer == id {
                if let Some(node) = outputs.get(vr.ordinal as usize) {
                    vr.replacement = Some(*node);
                }
            }
        }
    }

    /// Mark `id` and every UnrunTask that transitively depends on its
    /// VirtualResources as skipped (spec.md §4.8: "failure of one UnrunTask
    /// marks all transitive successors as skipped; independent branches
    /// continue").
    fn propagate_skip(&self, id: UnrunTaskId, skipped: &mut HashSet<UnrunTaskId>) {
        let mut queue = VecDeque::from([id]);
        while let Some(current) = queue.pop_front() {
            if !skipped.insert(current) {
                continue;
            }
            for task in self.tasks.values() {
                if task.replacement.is_none()
                    && !skipped.contains(&task.id)
                    && task.virtual_dependencies().any(|vr_id| {
                        self.resources
                            .get(&vr_id)
                            .is_some_and(|vr| vr.producer == current)
                    })
                {
                    queue.push_back(task.id);
                }
            }
        }
    }
}

fn node_to_value(node: NodeId) -> Value {
    match node {
        NodeId::Resource(id) => Value::Resource(id),
        NodeId::FileResource(id) => Value::FileResource(id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rms_common::tempfile::tempdir;
    use rms_graph::{ArgSchema, BoundArgs, PipeIdentity};
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

    fn resource_value(store: &Store, vault: &Vault, node: NodeId) -> Value {
        let NodeId::Resource(id) = node else {
            panic!("expected a Resource output");
        };
        let resource = store.get_resource(id).unwrap().unwrap();
        vault.get(resource.vault_hash.as_deref().unwrap()).unwrap()
    }

    /// Scenario S6: `a = add(1, 2)`, `b = add(3, 4)`, `c = add(a, b)` — three
    /// Tasks, `c` strictly after both `a` and `b`.
    #[test]
    fn dag_of_three_calls_executes_to_three_tasks() {
        let store = Store::open_in_memory().unwrap();
        let dir = tempdir().unwrap();
        let vault = Vault::open(dir.path()).unwrap();
        let registry = PipeRegistry::new(&store);
        let pipe_id = add_pipe(&registry);
        let pool = WorkerPool::new(2);
        let mut builder = Builder::new(&store, &vault, &registry, pool);

        let a = builder.call_pipe(
            pipe_id,
            vec![Arg::Literal(Value::Int(1)), Arg::Literal(Value::Int(2))],
            BTreeMap::new(),
            1,
        );
        let b = builder.call_pipe(
            pipe_id,
            vec![Arg::Literal(Value::Int(3)), Arg::Literal(Value::Int(4))],
            BTreeMap::new(),
            1,
        );
        let c = builder.call_pipe(
            pipe_id,
            vec![Arg::Virtual(a[0]), Arg::Virtual(b[0])],
            BTreeMap::new(),
            1,
        );

        let report = builder.execute_builder().unwrap();
        assert_eq!(report.completed.len(), 3);
        assert!(report.skipped.is_empty());
        assert!(report.failed.is_empty());

        let c_node = builder.resources[&c[0]].replacement.unwrap();
        assert_eq!(resource_value(&store, &vault, c_node), Value::Int(10));
    }

    /// Invariant 7: two UnrunTasks sharing a fingerprint within the same
    /// batch execute once; the second folds into the first.
    #[test]
    fn duplicate_calls_in_the_same_batch_fold_together() {
        let store = Store::open_in_memory().unwrap();
        let dir = tempdir().unwrap();
        let vault = Vault::open(dir.path()).unwrap();
        let registry = PipeRegistry::new(&store);
        let pipe_id = add_pipe(&registry);
        let pool = WorkerPool::new(4);
        let mut builder = Builder::new(&store, &vault, &registry, pool);

        let first = builder.call_pipe(
            pipe_id,
            vec![Arg::Literal(Value::Int(5)), Arg::Literal(Value::Int(6))],
            BTreeMap::new(),
            1,
        );
        let second = builder.call_pipe(
            pipe_id,
            vec![Arg::Literal(Value::Int(5)), Arg::Literal(Value::Int(6))],
            BTreeMap::new(),
            1,
        );

        let report = builder.execute_builder().unwrap();
        assert_eq!(report.completed.len(), 1);
        assert_eq!(report.folded.len(), 1);

        let first_node = builder.resources[&first[0]].replacement.unwrap();
        let second_node = builder.resources[&second[0]].replacement.unwrap();
        assert_eq!(first_node, second_node);
    }

    #[test]
    fn cyclic_virtual_dependency_is_detected() {
        let store = Store::open_in_memory().unwrap();
        let dir = tempdir().unwrap();
        let vault = Vault::open(dir.path()).unwrap();
        let registry = PipeRegistry::new(&store);
        let pipe_id = add_pipe(&registry);
        let pool = WorkerPool::new(2);
        let mut builder = Builder::new(&store, &vault, &registry, pool);

        // Two UnrunTasks each waiting on the other's output: the topological
        // walk can never make either ready.
        let t1 = UnrunTaskId(1000);
        let t2 = UnrunTaskId(1001);
        let vr1 = VirtualResourceId(2000);
        let vr2 = VirtualResourceId(2001);
        builder.resources.insert(
            vr1,
            VirtualResource { id: vr1, producer: t1, ordinal: 0, replacement: None },
        );
        builder.resources.insert(
            vr2,
            VirtualResource { id: vr2, producer: t2, ordinal: 0, replacement: None },
        );
        builder.tasks.insert(
            t1,
            UnrunTask {
                id: t1,
                pipe_id,
                positional: vec![Arg::Virtual(vr2), Arg::Literal(Value::Int(1))],
                keyword: BTreeMap::new(),
                replacement: None,
                sequence: 0,
            },
        );
        builder.tasks.insert(
            t2,
            UnrunTask {
                id: t2,
                pipe_id,
                positional: vec![Arg::Virtual(vr1), Arg::Literal(Value::Int(1))],
                keyword: BTreeMap::new(),
                replacement: None,
                sequence: 1,
            },
        );

        let err = builder.execute_builder().unwrap_err();
        assert!(matches!(err, Error::CycleDetected));
    }

    #[test]
    fn cancelling_before_execution_runs_nothing() {
        let store = Store::open_in_memory().unwrap();
        let dir = tempdir().unwrap();
        let vault = Vault::open(dir.path()).unwrap();
        let registry = PipeRegistry::new(&store);
        let pipe_id = add_pipe(&registry);
        let pool = WorkerPool::new(2);
        let mut builder = Builder::new(&store, &vault, &registry, pool);

        builder.call_pipe(
            pipe_id,
            vec![Arg::Literal(Value::Int(1)), Arg::Literal(Value::Int(2))],
            BTreeMap::new(),
            1,
        );
        builder.cancel();

        let report = builder.execute_builder().unwrap();
        assert!(report.completed.is_empty());
    }
}
