//! Canonical byte encoding of [`Value`]s (spec.md §4.1 rule 2), fed into a
//! [`blake3::Hasher`] rather than through a general-purpose serializer:
//! `serde_json`'s map ordering and float formatting are not a contract we
//! want dedup correctness to depend on.

use rms_common::blake3;
use rms_graph::{Error, Result, Value};

use crate::lookup::NodeLookup;

/// Discriminant tags, one byte each, prefixed before a value's payload so
/// that e.g. `Int(1)` and `Float(1.0)` never collide.
mod tag {
    pub const NULL: u8 = 0;
    pub const BOOL: u8 = 1;
    pub const INT: u8 = 2;
    pub const FLOAT: u8 = 3;
    pub const TEXT: u8 = 4;
    pub const BYTES: u8 = 5;
    pub const SEQ: u8 = 6;
    pub const SET: u8 = 7;
    pub const MAP: u8 = 8;
    pub const RESOURCE: u8 = 9;
    pub const FILE_RESOURCE: u8 = 10;
    pub const OPAQUE: u8 = 11;
}

fn write_len(out: &mut Vec<u8>, len: usize) {
    out.extend_from_slice(&(len as u64).to_le_bytes());
}

fn write_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    write_len(out, bytes.len());
    out.extend_from_slice(bytes);
}

/// Digest a single value in isolation; used to derive per-element digests
/// for `Set` canonicalization (sorted by digest, spec.md §4.1 rule 2).
fn digest_of(value: &Value, lookup: &dyn NodeLookup) -> Result<[u8; 32]> {
    let mut buf = Vec::new();
    encode_value(value, lookup, &mut buf)?;
    Ok(*blake3::hash(&buf).as_bytes())
}

pub fn encode_value(value: &Value, lookup: &dyn NodeLookup, out: &mut Vec<u8>) -> Result<()> {
    match value {
        Value::Null => out.push(tag::NULL),
        Value::Bool(b) => {
            out.push(tag::BOOL);
            out.push(*b as u8);
        }
        Value::Int(i) => {
            out.push(tag::INT);
            out.extend_from_slice(&i.to_le_bytes());
        }
        Value::Float(f) => {
            out.push(tag::FLOAT);
            // Canonicalize -0.0 to 0.0 and reject NaN (not orderable/stable).
            let bits = if *f == 0.0 { 0.0f64 } else { *f }.to_bits();
            out.extend_from_slice(&bits.to_le_bytes());
        }
        Value::Text(s) => {
            out.push(tag::TEXT);
            write_bytes(out, s.as_bytes());
        }
        Value::Bytes(b) => {
            out.push(tag::BYTES);
            write_bytes(out, b);
        }
        Value::Seq(items) => {
            out.push(tag::SEQ);
            write_len(out, items.len());
            for item in items {
                encode_value(item, lookup, out)?;
            }
        }
        Value::Set(items) => {
            out.push(tag::SET);
            let mut digests = items
                .iter()
                .map(|item| digest_of(item, lookup))
                .collect::<Result<Vec<_>>>()?;
            digests.sort();
            write_len(out, digests.len());
            for digest in digests {
                out.extend_from_slice(&digest);
            }
        }
        Value::Map(pairs) => {
            out.push(tag::MAP);
            let mut encoded_pairs = Vec::with_capacity(pairs.len());
            for (k, v) in pairs {
                let mut key_buf = Vec::new();
                encode_value(k, lookup, &mut key_buf)?;
                let mut val_buf = Vec::new();
                encode_value(v, lookup, &mut val_buf)?;
                encoded_pairs.push((key_buf, val_buf));
            }
            encoded_pairs.sort_by(|a, b| a.0.cmp(&b.0));
            write_len(out, encoded_pairs.len());
            for (k, v) in encoded_pairs {
                write_bytes(out, &k);
                write_bytes(out, &v);
            }
        }
        Value::Resource(id) => {
            let fp = lookup
                .producing_fingerprint(*id)
                .ok_or(Error::MissingResource(*id))?;
            let ordinal = lookup.ordinal(*id).ok_or(Error::MissingResource(*id))?;
            out.push(tag::RESOURCE);
            out.extend_from_slice(&fp.0);
            out.extend_from_slice(&ordinal.to_le_bytes());
        }
        Value::FileResource(id) => {
            let md5 = lookup
                .file_md5(*id)
                .ok_or(Error::UnknownFileResource(*id))?;
            out.push(tag::FILE_RESOURCE);
            out.extend_from_slice(&md5);
        }
        Value::Opaque { type_tag, bytes } => {
            out.push(tag::OPAQUE);
            write_bytes(out, type_tag.as_bytes());
            write_bytes(out, bytes);
        }
    }
    Ok(())
}
