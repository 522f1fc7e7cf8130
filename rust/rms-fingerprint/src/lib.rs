//! C1: deterministic, canonical fingerprinting over (Pipe identity,
//! normalized positional arguments, normalized keyword arguments).
//!
//! Fingerprint equality is the only dedup key (spec.md §4.1): path equality,
//! description and timestamps never participate. For a Pipe with
//! `is_deterministic = false` a fingerprint is still computed (so that
//! within-batch bookkeeping, e.g. the in-flight set, still works) but the
//! caller is responsible for skipping the dedup *lookup*.

mod canon;
mod lookup;
mod normalize;

pub use lookup::NodeLookup;
pub use normalize::normalize_args;

use rms_common::blake3;
use rms_graph::{BoundArgs, Fingerprint, PipeIdentity, Result};

const DOMAIN_TAG: &[u8] = b"rms-fingerprint-v1";

/// Compute the fingerprint of a call: the Pipe's identity plus its
/// already-normalized [`BoundArgs`] (see [`normalize_args`]).
pub fn compute(
    identity: &PipeIdentity,
    args: &BoundArgs,
    lookup: &dyn NodeLookup,
) -> Result<Fingerprint> {
    let mut buf = Vec::new();
    buf.extend_from_slice(DOMAIN_TAG);

    let identity_str = identity.to_string();
    buf.extend_from_slice(&(identity_str.len() as u64).to_le_bytes());
    buf.extend_from_slice(identity_str.as_bytes());

    // `args.positional` is always empty post-normalization but encoded
    // anyway so a caller that bypasses normalization still gets a fingerprint
    // (used by the builder's within-batch digest before a Pipe's schema is
    // known, see rms-builder).
    buf.extend_from_slice(&(args.positional.len() as u64).to_le_bytes());
    for value in &args.positional {
        canon::encode_value(value, lookup, &mut buf)?;
    }

    buf.extend_from_slice(&(args.keyword.len() as u64).to_le_bytes());
    for (name, value) in &args.keyword {
        buf.extend_from_slice(&(name.len() as u64).to_le_bytes());
        buf.extend_from_slice(name.as_bytes());
        canon::encode_value(value, lookup, &mut buf)?;
    }

    Ok(Fingerprint(*blake3::hash(&buf).as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rms_graph::{FileResourceId, ResourceId, Value};
    use std::collections::BTreeMap;

    struct NoResources;
    impl NodeLookup for NoResources {
        fn producing_fingerprint(&self, _id: ResourceId) -> Option<Fingerprint> {
            None
        }
        fn ordinal(&self, _id: ResourceId) -> Option<u32> {
            None
        }
        fn file_md5(&self, _id: FileResourceId) -> Option<[u8; 16]> {
            None
        }
    }

    fn identity() -> PipeIdentity {
        PipeIdentity::Named {
            module: "m".into(),
            qualified_name: "add".into(),
        }
    }

    #[test]
    fn same_inputs_same_fingerprint() {
        let mut kw = BTreeMap::new();
        kw.insert("i".to_string(), Value::Int(1));
        kw.insert("j".to_string(), Value::Int(2));
        let args = BoundArgs::new(vec![], kw);
        let a = compute(&identity(), &args, &NoResources).unwrap();
        let b = compute(&identity(), &args, &NoResources).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn different_args_different_fingerprint() {
        let mut kw1 = BTreeMap::new();
        kw1.insert("i".to_string(), Value::Int(1));
        let mut kw2 = BTreeMap::new();
        kw2.insert("i".to_string(), Value::Int(2));
        let a = compute(&identity(), &BoundArgs::new(vec![], kw1), &NoResources).unwrap();
        let b = compute(&identity(), &BoundArgs::new(vec![], kw2), &NoResources).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn path_and_description_never_participate() {
        // Two FileResource values with the same md5 fingerprint identically
        // regardless of path -- modeled here by the lookup always returning
        // the same md5 for any id.
        struct SameMd5;
        impl NodeLookup for SameMd5 {
            fn producing_fingerprint(&self, _id: ResourceId) -> Option<Fingerprint> {
                None
            }
            fn ordinal(&self, _id: ResourceId) -> Option<u32> {
                None
            }
            fn file_md5(&self, _id: FileResourceId) -> Option<[u8; 16]> {
                Some([7u8; 16])
            }
        }
        let mut kw1 = BTreeMap::new();
        kw1.insert("f".to_string(), Value::FileResource(FileResourceId(1)));
        let mut kw2 = BTreeMap::new();
        kw2.insert("f".to_string(), Value::FileResource(FileResourceId(2)));
        let a = compute(&identity(), &BoundArgs::new(vec![], kw1), &SameMd5).unwrap();
        let b = compute(&identity(), &BoundArgs::new(vec![], kw2), &SameMd5).unwrap();
        assert_eq!(a, b);
    }
}
