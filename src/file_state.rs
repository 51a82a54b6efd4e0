//! Per-unique-id metadata cache entry, keyed across handles.
//!
//! Backed by `moka::sync::Cache` (a teacher dependency already used for the
//! same "expires with no live references" TTL/idle-eviction shape) rather
//! than a hand-rolled expiry map.

use std::sync::Arc;
use std::time::Duration;

use moka::sync::Cache;

use crate::attrs::NtAttributes;
use crate::ids::UniqueId;
use crate::segment::SegmentInfo;

/// Cross-handle metadata cache entry: cached size,
/// attributes, and the segment binding shared by every handle referring to
/// the same unique id.
#[derive(Clone)]
pub struct FileState {
    pub unique_id: UniqueId,
    pub cached_size: u64,
    pub attributes: NtAttributes,
    pub segment: Option<Arc<SegmentInfo>>,
}

impl FileState {
    pub fn new(unique_id: UniqueId) -> Self {
        FileState { unique_id, cached_size: 0, attributes: NtAttributes::default(), segment: None }
    }
}

/// Default idle time before an entry with no live references is expired by
/// the reaper.
pub const DEFAULT_IDLE_EXPIRY: Duration = Duration::from_secs(300);

/// Per-share cache of [`FileState`] keyed by [`UniqueId`]. One instance is
/// owned by each [`crate::disk_device_context::DiskDeviceContext`]; the
/// process-wide [`crate::filesystems_config::FileStateReaper`] drives its
/// expiry sweeps.
pub struct FileStateCache {
    cache: Cache<u64, FileState>,
}

impl FileStateCache {
    pub fn new() -> Self {
        Self::with_idle_expiry(DEFAULT_IDLE_EXPIRY)
    }

    pub fn with_idle_expiry(idle: Duration) -> Self {
        let cache = Cache::builder().time_to_idle(idle).build();
        FileStateCache { cache }
    }

    pub fn get(&self, unique_id: UniqueId) -> Option<FileState> {
        self.cache.get(&unique_id.0)
    }

    pub fn get_or_insert_with(&self, unique_id: UniqueId) -> FileState {
        self.cache.get_with(unique_id.0, || FileState::new(unique_id))
    }

    pub fn insert(&self, state: FileState) {
        self.cache.insert(state.unique_id.0, state);
    }

    pub fn remove(&self, unique_id: UniqueId) -> Option<FileState> {
        self.cache.remove(&unique_id.0)
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.run_pending_tasks();
        self.cache.entry_count()
    }

    /// Forces eviction of expired entries and returns how many were present
    /// right before the sweep, for the reaper's `debug!` logging.
    pub fn run_pending_tasks(&self) -> u64 {
        let before = self.cache.entry_count();
        self.cache.run_pending_tasks();
        before
    }
}

impl Default for FileStateCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_or_insert_with_creates_once() {
        let cache = FileStateCache::new();
        let id = UniqueId(7);
        let first = cache.get_or_insert_with(id);
        assert_eq!(first.unique_id, id);
        assert_eq!(first.cached_size, 0);

        let mut updated = first.clone();
        updated.cached_size = 42;
        cache.insert(updated);

        let second = cache.get_or_insert_with(id);
        assert_eq!(second.cached_size, 42);
    }

    #[test]
    fn remove_drops_the_entry() {
        let cache = FileStateCache::new();
        let id = UniqueId(1);
        cache.get_or_insert_with(id);
        assert!(cache.get(id).is_some());
        cache.remove(id);
        assert!(cache.get(id).is_none());
    }
}
