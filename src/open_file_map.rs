//! Per-tree table of open handles.
//!
//! Two interchangeable variants share one contract; both enforce
//! [`MAX_FILES`]/[`INITIAL_FILES`] and fire [`crate::listeners::FileListener`]
//! callbacks at a strict ordering: `add` fires `openFile` *before* the
//! handle id is returned, `remove` fires `closeFile` only when it actually
//! removed a file.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{SmbError, SmbResult};
use crate::ids::{ProtocolId, TreeId};
use crate::listeners::{FileListener, ListenerList};
use crate::network_file::NetworkFile;

pub const MAX_FILES: usize = 8192;
pub const INITIAL_FILES: usize = 32;

/// A dynamically grown dense vector. `add` finds the first empty slot; on
/// overflow, doubles capacity up to [`MAX_FILES`] before signalling
/// [`SmbError::TooManyFiles`].
pub struct ArrayOpenFileMap {
    slots: Vec<Option<Arc<NetworkFile>>>,
    open_count: usize,
}

impl ArrayOpenFileMap {
    pub fn new() -> Self {
        let mut slots = Vec::with_capacity(INITIAL_FILES);
        slots.resize_with(INITIAL_FILES, || None);
        ArrayOpenFileMap { slots, open_count: 0 }
    }

    pub fn add(&mut self, file: Arc<NetworkFile>) -> SmbResult<ProtocolId> {
        if let Some(index) = self.slots.iter().position(Option::is_none) {
            self.slots[index] = Some(file);
            self.open_count += 1;
            return Ok(ProtocolId(index as u32));
        }

        if self.slots.len() >= MAX_FILES {
            return Err(SmbError::TooManyFiles);
        }

        let index = self.slots.len();
        let new_len = (self.slots.len() * 2).clamp(INITIAL_FILES, MAX_FILES);
        self.slots.resize_with(new_len, || None);
        self.slots[index] = Some(file);
        self.open_count += 1;
        Ok(ProtocolId(index as u32))
    }

    pub fn find(&self, id: ProtocolId) -> Option<Arc<NetworkFile>> {
        self.slots.get(id.0 as usize).and_then(Option::clone)
    }

    pub fn remove(&mut self, id: ProtocolId) -> Option<Arc<NetworkFile>> {
        let slot = self.slots.get_mut(id.0 as usize)?;
        let removed = slot.take();
        if removed.is_some() {
            self.open_count -= 1;
        }
        removed
    }

    pub fn iter_handles(&self) -> Vec<ProtocolId> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|_| ProtocolId(i as u32)))
            .collect()
    }

    pub fn open_file_count(&self) -> usize {
        self.open_count
    }

    pub fn remove_all(&mut self) -> Vec<Arc<NetworkFile>> {
        let removed: Vec<_> = self.slots.iter_mut().filter_map(Option::take).collect();
        self.open_count = 0;
        removed
    }
}

impl Default for ArrayOpenFileMap {
    fn default() -> Self {
        Self::new()
    }
}

/// A hash table keyed by handle id, assigned from a monotonic counter that
/// wraps at `0x1FFF_FFFF` back to `1`, skipping occupied slots. Retains
/// stability across restarts better than the array variant because ids
/// don't get densely reused.
pub struct HashedOpenFileMap {
    slots: HashMap<u32, Arc<NetworkFile>>,
    next_id: u32,
}

impl HashedOpenFileMap {
    const WRAP_AT: u32 = 0x1FFF_FFFF;

    pub fn new() -> Self {
        HashedOpenFileMap { slots: HashMap::new(), next_id: 1 }
    }

    fn allocate_id(&mut self) -> SmbResult<u32> {
        if self.slots.len() >= MAX_FILES {
            return Err(SmbError::TooManyFiles);
        }

        if self.next_id >= Self::WRAP_AT {
            self.next_id = 1;
        }
        let start = self.next_id;
        loop {
            let candidate = self.next_id;
            self.next_id = if self.next_id + 1 >= Self::WRAP_AT { 1 } else { self.next_id + 1 };
            if !self.slots.contains_key(&candidate) {
                return Ok(candidate);
            }
            if self.next_id == start {
                // Every id in range is occupied; unreachable given the
                // MAX_FILES guard above, but guarded rather than looping
                // forever.
                return Err(SmbError::TooManyFiles);
            }
        }
    }

    pub fn add(&mut self, file: Arc<NetworkFile>) -> SmbResult<ProtocolId> {
        let id = self.allocate_id()?;
        self.slots.insert(id, file);
        Ok(ProtocolId(id))
    }

    pub fn find(&self, id: ProtocolId) -> Option<Arc<NetworkFile>> {
        self.slots.get(&id.0).cloned()
    }

    pub fn remove(&mut self, id: ProtocolId) -> Option<Arc<NetworkFile>> {
        self.slots.remove(&id.0)
    }

    pub fn iter_handles(&self) -> Vec<ProtocolId> {
        self.slots.keys().map(|&id| ProtocolId(id)).collect()
    }

    pub fn open_file_count(&self) -> usize {
        self.slots.len()
    }

    pub fn remove_all(&mut self) -> Vec<Arc<NetworkFile>> {
        self.slots.drain().map(|(_, file)| file).collect()
    }
}

impl Default for HashedOpenFileMap {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-tree table of open handles. Default is hashed; choice is
/// a per-share configuration flag ("disable hashed open file map").
pub enum OpenFileMap {
    Array(ArrayOpenFileMap),
    Hashed(HashedOpenFileMap),
}

impl OpenFileMap {
    pub fn new_array() -> Self {
        OpenFileMap::Array(ArrayOpenFileMap::new())
    }

    pub fn new_hashed() -> Self {
        OpenFileMap::Hashed(HashedOpenFileMap::new())
    }

    fn add_raw(&mut self, file: Arc<NetworkFile>) -> SmbResult<ProtocolId> {
        match self {
            OpenFileMap::Array(map) => map.add(file),
            OpenFileMap::Hashed(map) => map.add(file),
        }
    }

    /// Allocates a handle id, stores it back onto the file, and
    /// fires `openFile` listeners *before* returning the id to the caller.
    pub fn add(
        &mut self,
        tree: TreeId,
        file: Arc<NetworkFile>,
        listeners: &ListenerList<dyn FileListener>,
    ) -> SmbResult<ProtocolId> {
        let id = self.add_raw(file.clone())?;
        file.set_protocol_id(id);
        listeners.notify(|l| l.open_file(tree, id, &file));
        Ok(id)
    }

    pub fn find(&self, id: ProtocolId) -> Option<Arc<NetworkFile>> {
        match self {
            OpenFileMap::Array(map) => map.find(id),
            OpenFileMap::Hashed(map) => map.find(id),
        }
    }

    /// Removes the handle and fires `closeFile` listeners *only* when a
    /// file was actually removed.
    pub fn remove(
        &mut self,
        tree: TreeId,
        id: ProtocolId,
        listeners: &ListenerList<dyn FileListener>,
    ) -> Option<Arc<NetworkFile>> {
        let removed = match self {
            OpenFileMap::Array(map) => map.remove(id),
            OpenFileMap::Hashed(map) => map.remove(id),
        };
        if let Some(file) = &removed {
            listeners.notify(|l| l.close_file(tree, id, file));
        }
        removed
    }

    pub fn iter_handles(&self) -> Vec<ProtocolId> {
        match self {
            OpenFileMap::Array(map) => map.iter_handles(),
            OpenFileMap::Hashed(map) => map.iter_handles(),
        }
    }

    pub fn open_file_count(&self) -> usize {
        match self {
            OpenFileMap::Array(map) => map.open_file_count(),
            OpenFileMap::Hashed(map) => map.open_file_count(),
        }
    }

    pub fn remove_all(&mut self) -> Vec<Arc<NetworkFile>> {
        match self {
            OpenFileMap::Array(map) => map.remove_all(),
            OpenFileMap::Hashed(map) => map.remove_all(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{Did, Fid, StreamId};

    fn sample_file(fid: u32) -> Arc<NetworkFile> {
        Arc::new(NetworkFile::new(Fid(fid), Did(0), StreamId::MAIN, format!("file{fid}.txt")))
    }

    #[test]
    fn array_add_returns_first_empty_slot_and_tracks_count() {
        let mut map = ArrayOpenFileMap::new();
        let id0 = map.add(sample_file(1)).unwrap();
        let id1 = map.add(sample_file(2)).unwrap();
        assert_eq!(id0.0, 0);
        assert_eq!(id1.0, 1);
        assert_eq!(map.open_file_count(), 2);

        map.remove(id0);
        assert_eq!(map.open_file_count(), 1);
        let id2 = map.add(sample_file(3)).unwrap();
        assert_eq!(id2.0, 0, "first empty slot is reused");
    }

    #[test]
    fn open_file_count_matches_non_empty_slots() {
        let mut map = ArrayOpenFileMap::new();
        for i in 0..10 {
            map.add(sample_file(i));
        }
        assert_eq!(map.open_file_count(), 10);
        let handles = map.iter_handles();
        assert_eq!(handles.len(), 10);
    }

    /// Starting with `next_id = 0x1FFFFFFE`, adding three files and removing
    /// the middle one yields ids `{0x1FFFFFFE, 1 (wrapped), 2}` and
    /// `open_file_count()==2`.
    #[test]
    fn hashed_map_id_wrap_matches_scenario_2() {
        let mut map = HashedOpenFileMap::new();
        map.next_id = 0x1FFFFFFE;

        let id0 = map.add(sample_file(1)).unwrap();
        let id1 = map.add(sample_file(2)).unwrap();
        let id2 = map.add(sample_file(3)).unwrap();

        assert_eq!(id0.0, 0x1FFFFFFE);
        assert_eq!(id1.0, 1);
        assert_eq!(id2.0, 2);

        map.remove(id1);
        assert_eq!(map.open_file_count(), 2);
    }

    #[test]
    fn hashed_map_never_returns_a_currently_live_id_after_full_churn() {
        let mut map = HashedOpenFileMap::new();
        map.next_id = HashedOpenFileMap::WRAP_AT - 2;

        let mut live = std::collections::HashSet::new();
        for i in 0..20u32 {
            let id = map.add(sample_file(i)).unwrap();
            assert!(live.insert(id.0), "id {} reused while still live", id.0);
            if i % 3 == 0 {
                let to_remove = ProtocolId(id.0);
                map.remove(to_remove);
                live.remove(&id.0);
            }
        }
    }

    #[test]
    fn listeners_fire_open_before_id_returned_and_close_only_on_removal() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        struct Counting(Arc<AtomicUsize>, Arc<AtomicUsize>);
        impl FileListener for Counting {
            fn open_file(&self, _t: TreeId, _i: ProtocolId, _f: &NetworkFile) -> Result<(), String> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            fn close_file(&self, _t: TreeId, _i: ProtocolId, _f: &NetworkFile) -> Result<(), String> {
                self.1.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }

        let opens = Arc::new(AtomicUsize::new(0));
        let closes = Arc::new(AtomicUsize::new(0));
        let listeners: ListenerList<dyn FileListener> = ListenerList::new();
        listeners.add(Arc::new(Counting(opens.clone(), closes.clone())));

        let mut map = OpenFileMap::new_hashed();
        let id = map.add(TreeId(1), sample_file(1), &listeners).unwrap();
        assert_eq!(opens.load(Ordering::SeqCst), 1);

        // Double-remove: second call finds nothing, so close must fire
        // exactly once.
        map.remove(TreeId(1), id, &listeners);
        map.remove(TreeId(1), id, &listeners);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }
}
