//! The [`Pipe`] entity: a registered, deduplicable definition of a callable.

use rms_common::serde::{Deserialize, Serialize};

use crate::{ids::PipeId, info::InfoSet, value::Value};

/// How a Pipe is identified for deduplication on registration.
///
/// Rust callables aren't reflectively inspectable at runtime the way a
/// dynamic language's functions are, so identity is supplied explicitly by
/// the caller: either a stable module path + name, or (for closures/
/// anonymous callables) captured source text whose hash becomes the
/// identity. See DESIGN.md for the reasoning.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(crate = "rms_common::serde")]
pub enum PipeIdentity {
    Named {
        module: String,
        qualified_name: String,
    },
    Anonymous {
        /// blake3 hex digest of the normalized source text
        source_hash: String,
    },
}

impl std::fmt::Display for PipeIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipeIdentity::Named {
                module,
                qualified_name,
            } => write!(f, "{module}::{qualified_name}"),
            PipeIdentity::Anonymous { source_hash } => write!(f, "anonymous#{source_hash}"),
        }
    }
}

/// One declared parameter of a Pipe's argument schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(crate = "rms_common::serde")]
pub struct Param {
    pub name: String,
    pub default: Option<Value>,
    pub variadic: bool,
}

/// The argument schema used to normalize positional/keyword calls before
/// fingerprinting (spec.md §4.1 rule 1).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(crate = "rms_common::serde")]
pub struct ArgSchema {
    pub params: Vec<Param>,
}

impl ArgSchema {
    pub fn positional(names: &[&str]) -> Self {
        Self {
            params: names
                .iter()
                .map(|name| Param {
                    name: name.to_string(),
                    default: None,
                    variadic: false,
                })
                .collect(),
        }
    }

    pub fn variadic(name: &str) -> Self {
        Self {
            params: vec![Param {
                name: name.to_string(),
                default: None,
                variadic: true,
            }],
        }
    }

    pub fn param(&self, name: &str) -> Option<&Param> {
        self.params.iter().find(|p| p.name == name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(crate = "rms_common::serde")]
pub struct Pipe {
    pub id: PipeId,
    pub identity: PipeIdentity,
    pub schema: ArgSchema,
    /// True for generators and other one-shot producers; their Resources
    /// are tagged `volatile`.
    pub return_volatile: bool,
    /// If false, dedup is disabled: every call produces a fresh Task.
    pub is_deterministic: bool,
    /// A sibling callable mapping arguments -> expected output file paths.
    pub output_func: Option<PipeId>,
    pub description: Option<String>,
    pub info: InfoSet,
}
