//! End-to-end scenarios from spec.md §8: a fresh system, a Pipe, and the
//! documented testable properties.

use std::collections::BTreeMap;
use std::sync::Arc;

use rms::ResourceManagementSystem;
use rms_common::tempfile::tempdir;
use rms_graph::{Arg, ArgSchema, BoundArgs, NodeId, PipeIdentity, Value};
use rms_pipes::{PipeRegistry, PipeSpec};
use rms_query::Predicate;
use rms_store::Store;
use rms_vault::Vault;
use rms_workers::WorkerPool;

fn add_pipe(registry: &PipeRegistry<'_>) -> rms_graph::PipeId {
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

/// S1: the first call to a pure Pipe actually runs it and commits a Task.
#[test]
fn first_call_runs_and_commits() {
    let store = Store::open_in_memory().unwrap();
    let dir = tempdir().unwrap();
    let vault = Vault::open(dir.path()).unwrap();
    let pipes = PipeRegistry::new(&store);
    let system = ResourceManagementSystem::new(&store, &vault, &pipes);

    let pipe_id = add_pipe(&pipes);
    let outcome = system.run(pipe_id, vec![Value::Int(2), Value::Int(3)], BTreeMap::new()).unwrap();
    assert!(!outcome.reused);
    assert_eq!(outcome.task.outputs.len(), 1);
}

/// Invariant 7 / S1: an identical call reuses the committed Task rather
/// than re-running the Pipe body.
#[test]
fn identical_synchronous_call_is_deduplicated() {
    let store = Store::open_in_memory().unwrap();
    let dir = tempdir().unwrap();
    let vault = Vault::open(dir.path()).unwrap();
    let pipes = PipeRegistry::new(&store);
    let system = ResourceManagementSystem::new(&store, &vault, &pipes);
    let pipe_id = add_pipe(&pipes);

    let first = system.run(pipe_id, vec![Value::Int(1), Value::Int(1)], BTreeMap::new()).unwrap();
    let second = system.run(pipe_id, vec![Value::Int(1), Value::Int(1)], BTreeMap::new()).unwrap();
    assert_eq!(first.task.id, second.task.id);
    assert!(second.reused);
}

/// S6: a three-node DAG (`c = add(add(1,2), add(3,4))`) executed through
/// the Builder produces exactly three Tasks, `c` strictly after `a`/`b`.
#[test]
fn builder_executes_diamond_dag() {
    let store = Store::open_in_memory().unwrap();
    let dir = tempdir().unwrap();
    let vault = Vault::open(dir.path()).unwrap();
    let pipes = PipeRegistry::new(&store);
    let system = ResourceManagementSystem::new(&store, &vault, &pipes);
    let pipe_id = add_pipe(&pipes);

    let pool = WorkerPool::new(2);
    let mut builder = system.builder(pool);

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
    builder.call_pipe(pipe_id, vec![Arg::Virtual(a[0]), Arg::Virtual(b[0])], BTreeMap::new(), 1);

    let report = builder.execute_builder().unwrap();
    assert_eq!(report.completed.len(), 3);
    assert!(report.failed.is_empty());
}

/// Registering a file twice without modification reuses the same row;
/// registering after a content change marks the prior row `overwritten`.
#[test]
fn file_registration_tracks_overwrites() {
    let store = Store::open_in_memory().unwrap();
    let dir = tempdir().unwrap();
    let vault = Vault::open(dir.path()).unwrap();
    let pipes = PipeRegistry::new(&store);
    let system = ResourceManagementSystem::new(&store, &vault, &pipes);

    let work = tempdir().unwrap();
    let path = work.path().join("input.csv");
    std::fs::write(&path, b"a,b\n1,2\n").unwrap();

    let first = system.register_file(&path, false).unwrap();
    let again = system.register_file(&path, false).unwrap();
    assert_eq!(first.id, again.id);

    std::fs::write(&path, b"a,b\n9,9\n").unwrap();
    let updated = system.register_file(&path, true).unwrap();
    assert_ne!(updated.id, first.id);

    let check = system.integrity_check_all(false).unwrap();
    assert!(check.iter().any(|(id, _)| *id == updated.id));
}

/// The canonical query in spec.md §4.9: descendants of an input, filtered
/// to Tasks invoking a given Pipe.
#[test]
fn query_composes_descendants_with_by_pipe() {
    let store = Store::open_in_memory().unwrap();
    let dir = tempdir().unwrap();
    let vault = Vault::open(dir.path()).unwrap();
    let pipes = PipeRegistry::new(&store);
    let system = ResourceManagementSystem::new(&store, &vault, &pipes);
    let pipe_id = add_pipe(&pipes);

    let root = system.run(pipe_id, vec![Value::Int(1), Value::Int(1)], BTreeMap::new()).unwrap();
    let NodeId::Resource(root_id) = root.task.outputs[0] else {
        panic!("expected a Resource output");
    };

    let derived = system
        .run(pipe_id, vec![Value::Resource(root_id), Value::Int(5)], BTreeMap::new())
        .unwrap();

    let found = system
        .search(&Predicate::And(vec![
            Predicate::Descendants(NodeId::Resource(root_id)),
            Predicate::ByPipe { pipe_id, arg: None },
        ]))
        .unwrap();

    assert!(found.contains(&derived.task.outputs[0]));
}
