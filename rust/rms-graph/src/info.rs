//! The free-form `info` status set carried by every persistent entity
//! (spec.md §3): a closed set of flags, some of which carry a text payload
//! (captured source code).

use std::collections::BTreeMap;

use rms_common::serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(crate = "rms_common::serde", rename_all = "snake_case")]
pub enum InfoFlag {
    /// FileResource: a newer FileResource has been registered at this path.
    Overwritten,
    /// Task and downstream nodes: propagated transitively (invariant 4).
    Obsolete,
    /// Pipe: captured source text of the main callable.
    SourceCode,
    /// Pipe: captured source text of `output_func`.
    OutputFuncSourceCode,
    /// Any node: user-marked, triggers rerun.
    Deprecated,
}

/// A set of [`InfoFlag`]s, each optionally carrying a text payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(crate = "rms_common::serde", transparent)]
pub struct InfoSet {
    flags: BTreeMap<InfoFlag, Option<String>>,
}

impl InfoSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has(&self, flag: InfoFlag) -> bool {
        self.flags.contains_key(&flag)
    }

    pub fn text(&self, flag: InfoFlag) -> Option<&str> {
        self.flags.get(&flag).and_then(|v| v.as_deref())
    }

    pub fn set(&mut self, flag: InfoFlag) {
        self.flags.entry(flag).or_insert(None);
    }

    pub fn set_with_text(&mut self, flag: InfoFlag, text: impl Into<String>) {
        self.flags.insert(flag, Some(text.into()));
    }

    pub fn clear(&mut self, flag: InfoFlag) {
        self.flags.remove(&flag);
    }

    pub fn iter(&self) -> impl Iterator<Item = (InfoFlag, Option<&str>)> {
        self.flags.iter().map(|(k, v)| (*k, v.as_deref()))
    }
}
