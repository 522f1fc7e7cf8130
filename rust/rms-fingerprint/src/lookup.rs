//! The narrow read interface the fingerprinter needs into the provenance
//! graph, so that this crate does not depend on `rms-store` (which depends
//! on this crate for dedup lookups).

use rms_graph::{Fingerprint, FileResourceId, ResourceId};

pub trait NodeLookup {
    /// The fingerprint of the Task that produced this Resource.
    fn producing_fingerprint(&self, id: ResourceId) -> Option<Fingerprint>;

    /// The output ordinal of this Resource within its producing Task.
    fn ordinal(&self, id: ResourceId) -> Option<u32>;

    /// The stored MD5 of this FileResource.
    fn file_md5(&self, id: FileResourceId) -> Option<[u8; 16]>;
}
