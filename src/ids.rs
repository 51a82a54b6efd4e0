//! Identifier newtypes shared across the registry.

use std::hash::{Hash, Hasher};

/// A 32-bit file id, unique within a tree connection.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fid(pub u32);

/// A 32-bit directory id: the parent directory's [`Fid`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Did(pub u32);

/// A 32-bit stream id; `0` denotes the main data stream.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct StreamId(pub u32);

impl StreamId {
    pub const MAIN: StreamId = StreamId(0);

    pub fn is_main(self) -> bool {
        self.0 == 0
    }
}

/// A 64-bit cache key shared across handles that refer to the same file.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UniqueId(pub u64);

impl UniqueId {
    /// Derives a unique id as `(did<<32)|fid`.
    pub fn from_ids(did: Did, fid: Fid) -> Self {
        UniqueId(((did.0 as u64) << 32) | fid.0 as u64)
    }

    /// Derives a unique id as an uppercased-path hash, for drivers
    /// that key files by path rather than by a `(did, fid)` pair. FNV-1a is
    /// used rather than a cryptographic hash: the cache key only needs
    /// uniform distribution and process-local stability, not collision
    /// resistance against an adversary.
    pub fn from_path_hash(path: &str) -> Self {
        let upper = path.to_uppercase();
        let mut hasher = Fnv1a::default();
        upper.hash(&mut hasher);
        UniqueId(hasher.finish())
    }
}

#[derive(Default)]
struct Fnv1a(u64);

impl Hasher for Fnv1a {
    fn finish(&self) -> u64 {
        if self.0 == 0 {
            0xcbf29ce484222325
        } else {
            self.0
        }
    }

    fn write(&mut self, bytes: &[u8]) {
        let mut hash = if self.0 == 0 { 0xcbf29ce484222325 } else { self.0 };
        for &byte in bytes {
            hash ^= byte as u64;
            hash = hash.wrapping_mul(0x100000001b3);
        }
        self.0 = hash;
    }
}

/// The handle id assigned by an [`crate::open_file_map::OpenFileMap`], stored
/// back on the file for cross-lookup.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProtocolId(pub u32);

/// Per-session handle for a [`crate::tree_connection::TreeConnection`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TreeId(pub u32);

/// Identifies an active search within a [`crate::search::SearchMap`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SearchId(pub u32);
