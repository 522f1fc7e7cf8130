//! C5: Pipe registration, identity-based deduplication, and the live
//! per-process table binding a [`rms_graph::PipeId`] to its callable.
//!
//! Rust closures are not reflectively inspectable the way Python functions
//! are (spec.md §9 design note), so callers supply a stable
//! [`PipeIdentity`] up front rather than having one derived from the
//! callable itself. Persistence stores only the identity/schema/metadata;
//! the callable itself lives only in this process's binding table and must
//! be re-registered after a restart before the Pipe can be called again.

use std::sync::Arc;

use rms_common::dashmap::DashMap;
use rms_common::eyre;
use rms_graph::{ArgSchema, BoundArgs, Error, Pipe, PipeId, PipeIdentity, Result, Value};
use rms_store::{PipeSpec as StoredPipeSpec, Store};

/// The body of a Pipe: bound arguments in, output values out.
pub type PipeFn = dyn Fn(&BoundArgs) -> eyre::Result<Vec<Value>> + Send + Sync;

/// The body of an `output_func`: bound arguments in, the ordered list of
/// output file paths the main Pipe body is expected to produce.
pub type OutputFn = dyn Fn(&BoundArgs) -> eyre::Result<Vec<std::path::PathBuf>> + Send + Sync;

/// A sibling callable supplied alongside a Pipe mapping arguments to
/// expected output paths (spec.md §3/§4.5).
pub struct OutputFuncSpec {
    pub identity: PipeIdentity,
    pub schema: ArgSchema,
    pub body: Arc<OutputFn>,
    pub source_code: Option<String>,
}

/// Everything needed to register a new Pipe.
pub struct PipeSpec {
    pub identity: PipeIdentity,
    pub schema: ArgSchema,
    pub body: Arc<PipeFn>,
    pub return_volatile: bool,
    pub is_deterministic: bool,
    pub description: Option<String>,
    pub source_code: Option<String>,
}

pub struct PipeRegistry<'a> {
    store: &'a Store,
    bodies: DashMap<PipeId, Arc<PipeFn>>,
    output_funcs: DashMap<PipeId, Arc<OutputFn>>,
}

impl<'a> PipeRegistry<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self {
            store,
            bodies: DashMap::new(),
            output_funcs: DashMap::new(),
        }
    }

    /// `register_pipe(...)` (spec.md §4.5). Idempotent by identity: if a
    /// Pipe with the same identity and compatible attributes is already
    /// persisted, its id is reused (but the live binding in this process
    /// is still (re)installed, since bindings never survive a restart).
    pub fn register_pipe(
        &self,
        spec: PipeSpec,
        output_func: Option<OutputFuncSpec>,
    ) -> Result<PipeId> {
        let output_func_id = match output_func {
            Some(of) => {
                let id = self.store.put_pipe(StoredPipeSpec {
                    identity: of.identity,
                    schema: of.schema,
                    return_volatile: false,
                    is_deterministic: spec.is_deterministic,
                    output_func: None,
                    description: None,
                    source_code: of.source_code,
                    output_func_source_code: None,
                })?;
                self.output_funcs.insert(id, of.body);
                Some(id)
            }
            None => None,
        };

        let id = self.store.put_pipe(StoredPipeSpec {
            identity: spec.identity,
            schema: spec.schema,
            return_volatile: spec.return_volatile,
            is_deterministic: spec.is_deterministic,
            output_func: output_func_id,
            description: spec.description,
            source_code: spec.source_code,
            output_func_source_code: None,
        })?;

        self.bodies.insert(id, spec.body);
        Ok(id)
    }

    pub fn get_pipe(&self, id: PipeId) -> Result<Pipe> {
        self.store.get_pipe(id)?.ok_or(Error::UnknownPipe(PipeIdentity::Named {
            module: "<unresolved>".into(),
            qualified_name: id.to_string(),
        }))
    }

    /// The live callable bound to `id` in this process, if any. `None`
    /// after a restart until the Pipe is registered again.
    pub fn body(&self, id: PipeId) -> Option<Arc<PipeFn>> {
        self.bodies.get(&id).map(|entry| entry.clone())
    }

    pub fn output_func_body(&self, id: PipeId) -> Option<Arc<OutputFn>> {
        self.output_funcs.get(&id).map(|entry| entry.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(name: &str) -> PipeIdentity {
        PipeIdentity::Named {
            module: "demo".into(),
            qualified_name: name.into(),
        }
    }

    #[test]
    fn reregistering_same_identity_reuses_id_and_rebinds_body() {
        let store = Store::open_in_memory().unwrap();
        let registry = PipeRegistry::new(&store);

        let spec = || PipeSpec {
            identity: identity("add"),
            schema: ArgSchema::positional(&["i", "j"]),
            body: Arc::new(|_args: &BoundArgs| Ok(vec![Value::Int(0)])),
            return_volatile: false,
            is_deterministic: true,
            description: None,
            source_code: None,
        };

        let first = registry.register_pipe(spec(), None).unwrap();
        let second = registry.register_pipe(spec(), None).unwrap();
        assert_eq!(first, second);
        assert!(registry.body(first).is_some());
    }

    #[test]
    fn output_func_is_persisted_and_linked() {
        let store = Store::open_in_memory().unwrap();
        let registry = PipeRegistry::new(&store);

        let spec = PipeSpec {
            identity: identity("write_hw"),
            schema: ArgSchema::positional(&["out1", "out2"]),
            body: Arc::new(|_args: &BoundArgs| Ok(vec![])),
            return_volatile: false,
            is_deterministic: true,
            description: None,
            source_code: None,
        };
        let out_func = OutputFuncSpec {
            identity: identity("write_hw_outputs"),
            schema: ArgSchema::positional(&["out1", "out2"]),
            body: Arc::new(|args: &BoundArgs| {
                Ok(args
                    .positional
                    .iter()
                    .map(|v| match v {
                        Value::Text(s) => std::path::PathBuf::from(s),
                        _ => std::path::PathBuf::new(),
                    })
                    .collect())
            }),
            source_code: None,
        };

        let id = registry.register_pipe(spec, Some(out_func)).unwrap();
        let pipe = registry.get_pipe(id).unwrap();
        assert!(pipe.output_func.is_some());
        assert!(registry.output_func_body(pipe.output_func.unwrap()).is_some());
    }
}
