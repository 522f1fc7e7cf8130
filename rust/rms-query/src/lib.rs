//! C9: structured search over the provenance graph (spec.md §4.9).
//!
//! Every [`Predicate`] evaluates to a set of [`NodeId`]s: the Task-output
//! nodes it selects. `by-pipe` and `argument-contains` pick Tasks and
//! report their outputs; `ancestors`/`descendants` walk Task edges from a
//! given node. `And`/`Or`/`Not` are then plain set algebra over that common
//! domain, which is what lets the canonical search in spec.md —
//! `descendants({F1,F2}) ∩ (by-pipe(X,arg=A) ∪ by-pipe(Y,arg=B))` — compose
//! at all.

use std::collections::{HashSet, VecDeque};

use rms_graph::{BoundArgs, NodeId, PipeId, Result, Value};
use rms_store::Store;

/// Which argument slot an [`ArgFilter`] inspects.
#[derive(Debug, Clone)]
pub enum ArgPosition {
    Positional(usize),
    Keyword(String),
}

#[derive(Debug, Clone)]
pub struct ArgFilter {
    pub position: ArgPosition,
    pub value: Value,
}

impl ArgFilter {
    fn matches(&self, args: &BoundArgs) -> bool {
        match &self.position {
            ArgPosition::Positional(i) => args.positional.get(*i) == Some(&self.value),
            ArgPosition::Keyword(name) => args.keyword.get(name) == Some(&self.value),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Predicate {
    /// Tasks invoking `pipe_id`, optionally restricted to those where one
    /// bound argument equals a given value.
    ByPipe { pipe_id: PipeId, arg: Option<ArgFilter> },
    /// All nodes transitively consumed to produce `node`.
    Ancestors(NodeId),
    /// All nodes transitively derived from `node`.
    Descendants(NodeId),
    /// Outputs of Tasks whose inputs include every node in this set.
    ArgumentContains(Vec<NodeId>),
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
}

pub struct QueryEngine<'a> {
    store: &'a Store,
}

impl<'a> QueryEngine<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    pub fn search(&self, predicate: &Predicate) -> Result<HashSet<NodeId>> {
        self.eval(predicate)
    }

    fn eval(&self, predicate: &Predicate) -> Result<HashSet<NodeId>> {
        match predicate {
            Predicate::ByPipe { pipe_id, arg } => {
                let mut out = HashSet::new();
                for task_id in self.store.tasks_by_pipe(*pipe_id)? {
                    let Some(task) = self.store.get_task(task_id)? else {
                        continue;
                    };
                    let keep = match arg {
                        Some(filter) => filter.matches(&task.args),
                        None => true,
                    };
                    if keep {
                        out.extend(self.store.output_nodes(task_id)?);
                    }
                }
                Ok(out)
            }
            Predicate::Ancestors(node) => self.ancestors(*node),
            Predicate::Descendants(node) => self.descendants(*node),
            Predicate::ArgumentContains(nodes) => {
                let mut out = HashSet::new();
                for task_id in self.store.all_task_ids()? {
                    let inputs: HashSet<NodeId> =
                        self.store.input_nodes(task_id)?.into_iter().collect();
                    if nodes.iter().all(|n| inputs.contains(n)) {
                        out.extend(self.store.output_nodes(task_id)?);
                    }
                }
                Ok(out)
            }
            Predicate::And(ps) => {
                let mut sets = ps.iter().map(|p| self.eval(p));
                let Some(first) = sets.next() else {
                    return Ok(HashSet::new());
                };
                let mut acc = first?;
                for next in sets {
                    acc = acc.intersection(&next?).cloned().collect();
                }
                Ok(acc)
            }
            Predicate::Or(ps) => {
                let mut acc = HashSet::new();
                for p in ps {
                    acc.extend(self.eval(p)?);
                }
                Ok(acc)
            }
            Predicate::Not(inner) => {
                let universe = self.universe()?;
                let excluded = self.eval(inner)?;
                Ok(universe.difference(&excluded).cloned().collect())
            }
        }
    }

    fn universe(&self) -> Result<HashSet<NodeId>> {
        let mut out = HashSet::new();
        for task_id in self.store.all_task_ids()? {
            out.extend(self.store.output_nodes(task_id)?);
        }
        Ok(out)
    }

    fn ancestors(&self, node: NodeId) -> Result<HashSet<NodeId>> {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        if let Some(task_id) = self.store.producing_task(node)? {
            queue.extend(self.store.input_nodes(task_id)?);
        }
        while let Some(n) = queue.pop_front() {
            if !visited.insert(n) {
                continue;
            }
            if let Some(task_id) = self.store.producing_task(n)? {
                queue.extend(self.store.input_nodes(task_id)?);
            }
        }
        Ok(visited)
    }

    fn descendants(&self, node: NodeId) -> Result<HashSet<NodeId>> {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        for task_id in self.store.consumers(node)? {
            queue.extend(self.store.output_nodes(task_id)?);
        }
        while let Some(n) = queue.pop_front() {
            if !visited.insert(n) {
                continue;
            }
            for task_id in self.store.consumers(n)? {
                queue.extend(self.store.output_nodes(task_id)?);
            }
        }
        Ok(visited)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rms_graph::{ArgSchema, PipeIdentity, ResourceId};
    use rms_store::{NewOutput, NewTask, PipeSpec};
    use rms_common::chrono::Utc;

    fn fingerprint(byte: u8) -> rms_graph::Fingerprint {
        rms_graph::Fingerprint([byte; 32])
    }

    fn put_pipe(store: &Store, name: &str) -> PipeId {
        store
            .put_pipe(PipeSpec {
                identity: PipeIdentity::Named {
                    module: "demo".into(),
                    qualified_name: name.into(),
                },
                schema: ArgSchema::positional(&["x"]),
                return_volatile: false,
                is_deterministic: true,
                output_func: None,
                description: None,
                source_code: None,
                output_func_source_code: None,
            })
            .unwrap()
    }

    fn put_task(store: &Store, pipe_id: PipeId, seed: u8, args: BoundArgs) -> ResourceId {
        let now = Utc::now();
        let task = store
            .put_task(NewTask {
                pipe_id,
                args,
                started_at: now,
                finished_at: now,
                fingerprint: fingerprint(seed),
                outputs: vec![NewOutput::Resource {
                    volatile: false,
                    vault_hash: Some(format!("{seed:064x}")),
                    description: None,
                }],
                description: None,
            })
            .unwrap();
        let NodeId::Resource(id) = task.outputs[0] else {
            panic!("expected a Resource output");
        };
        id
    }

    #[test]
    fn by_pipe_filters_on_bound_argument() {
        let store = Store::open_in_memory().unwrap();
        let pipe = put_pipe(&store, "scale");

        let mut args_a = BoundArgs::default();
        args_a.keyword.insert("x".into(), Value::Int(1));
        let a = put_task(&store, pipe, 1, args_a);

        let mut args_b = BoundArgs::default();
        args_b.keyword.insert("x".into(), Value::Int(2));
        let b = put_task(&store, pipe, 2, args_b);

        let engine = QueryEngine::new(&store);
        let found = engine
            .search(&Predicate::ByPipe {
                pipe_id: pipe,
                arg: Some(ArgFilter {
                    position: ArgPosition::Keyword("x".into()),
                    value: Value::Int(1),
                }),
            })
            .unwrap();

        assert_eq!(found, HashSet::from([NodeId::Resource(a)]));
        assert!(!found.contains(&NodeId::Resource(b)));
    }

    #[test]
    fn descendants_follow_task_edges_transitively() {
        let store = Store::open_in_memory().unwrap();
        let pipe = put_pipe(&store, "step");

        let root = put_task(&store, pipe, 10, BoundArgs::default());

        let mut args_mid = BoundArgs::default();
        args_mid.keyword.insert("x".into(), Value::Resource(root));
        let mid = put_task(&store, pipe, 11, args_mid);

        let mut args_leaf = BoundArgs::default();
        args_leaf.keyword.insert("x".into(), Value::Resource(mid));
        let leaf = put_task(&store, pipe, 12, args_leaf);

        let engine = QueryEngine::new(&store);
        let found = engine.search(&Predicate::Descendants(NodeId::Resource(root))).unwrap();
        assert_eq!(
            found,
            HashSet::from([NodeId::Resource(mid), NodeId::Resource(leaf)])
        );
    }

    #[test]
    fn and_or_not_compose_as_set_algebra() {
        let store = Store::open_in_memory().unwrap();
        let pipe_x = put_pipe(&store, "x");
        let pipe_y = put_pipe(&store, "y");

        let a = put_task(&store, pipe_x, 20, BoundArgs::default());
        let b = put_task(&store, pipe_y, 21, BoundArgs::default());

        let engine = QueryEngine::new(&store);
        let union = engine
            .search(&Predicate::Or(vec![
                Predicate::ByPipe { pipe_id: pipe_x, arg: None },
                Predicate::ByPipe { pipe_id: pipe_y, arg: None },
            ]))
            .unwrap();
        assert_eq!(union, HashSet::from([NodeId::Resource(a), NodeId::Resource(b)]));

        let not_x = engine
            .search(&Predicate::Not(Box::new(Predicate::ByPipe {
                pipe_id: pipe_x,
                arg: None,
            })))
            .unwrap();
        assert_eq!(not_x, HashSet::from([NodeId::Resource(b)]));
    }
}
