//! Per-`NetworkFile` directory-search registry.

use crate::error::{SmbError, SmbResult};
use crate::file_info::FileInfo;
use crate::ids::SearchId;

pub const DEFAULT_SEARCHES_PER_FILE: usize = 8;
pub const MAX_SEARCHES_PER_FILE: usize = 256;

/// A resume anchor for restarting a search.
#[derive(Debug, Clone)]
pub enum ResumeAnchor {
    Id(u32),
    Info(FileInfo),
}

/// A single active directory search. The driver provides the concrete
/// implementation; the search map only owns slot
/// bookkeeping.
pub trait SearchContext: Send + Sync {
    fn has_more_files(&self) -> bool;
    fn next_file_info(&mut self, out: &mut FileInfo) -> SmbResult<bool>;
    fn next_file_name(&mut self) -> SmbResult<Option<String>>;
    fn resume_id(&self) -> u32;
    fn restart_at(&mut self, anchor: ResumeAnchor) -> SmbResult<()>;
    fn close_search(&mut self);

    /// Whether `.`/`..` pseudo-entries should be emitted; off by default.
    fn emits_dot_entries(&self) -> bool {
        false
    }
}

/// A slot in a [`SearchMap`]: either free, a sentinel placeholder for a
/// freshly-allocated-but-not-yet-populated slot, or an active search.
enum Slot {
    Free,
    /// Allocated but not yet populated: lookups must observe "in use but
    /// empty" rather than "free".
    Reserved,
    Active { context: Box<dyn SearchContext>, closed: bool },
}

/// A sequential, array-indexed search map (`allocateSearchSlot`).
pub struct SequentialSearchMap {
    slots: Vec<Slot>,
    max_slots: usize,
}

impl SequentialSearchMap {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_SEARCHES_PER_FILE, MAX_SEARCHES_PER_FILE)
    }

    pub fn with_capacity(initial: usize, max_slots: usize) -> Self {
        let mut slots = Vec::with_capacity(initial);
        slots.resize_with(initial, || Slot::Free);
        Self { slots, max_slots }
    }

    /// Allocates a fresh slot and returns its id, reserving it with the
    /// "in use but empty" sentinel until [`Self::install`] populates it.
    pub fn allocate_search_slot(&mut self) -> SmbResult<SearchId> {
        if let Some(index) = self.slots.iter().position(|slot| matches!(slot, Slot::Free)) {
            self.slots[index] = Slot::Reserved;
            return Ok(SearchId(index as u32));
        }

        if self.slots.len() >= self.max_slots {
            return Err(SmbError::TooManySearches);
        }

        let index = self.slots.len();
        self.slots.push(Slot::Reserved);
        Ok(SearchId(index as u32))
    }

    pub fn install(&mut self, id: SearchId, context: Box<dyn SearchContext>) {
        if let Some(slot) = self.slots.get_mut(id.0 as usize) {
            *slot = Slot::Active { context, closed: false };
        }
    }

    pub fn find(&mut self, id: SearchId) -> Option<&mut Box<dyn SearchContext>> {
        match self.slots.get_mut(id.0 as usize) {
            Some(Slot::Active { context, closed: false }) => Some(context),
            _ => None,
        }
    }

    pub fn close(&mut self, id: SearchId) {
        if let Some(slot @ Slot::Active { .. }) = self.slots.get_mut(id.0 as usize) {
            if let Slot::Active { context, closed } = slot {
                context.close_search();
                *closed = true;
            }
        }
    }

    pub fn close_all_searches(&mut self) {
        for slot in &mut self.slots {
            if let Slot::Active { context, closed } = slot {
                context.close_search();
                *closed = true;
            }
        }
        self.slots.clear();
    }
}

impl Default for SequentialSearchMap {
    fn default() -> Self {
        Self::new()
    }
}

/// A hashed search map (`allocateSearchSlotWithId`): the caller supplies the
/// id (e.g. from a protocol-assigned search handle).
pub struct HashedSearchMap {
    slots: std::collections::HashMap<u32, Slot>,
    max_slots: usize,
}

impl HashedSearchMap {
    pub fn new() -> Self {
        Self::with_capacity(MAX_SEARCHES_PER_FILE)
    }

    pub fn with_capacity(max_slots: usize) -> Self {
        Self { slots: std::collections::HashMap::new(), max_slots }
    }

    /// Reserves `id` with the "in use but empty" sentinel. Returns `Ok(true)`
    /// if the id was free and is now reserved, `Ok(false)` if it was already
    /// occupied. The hashed variant's `allocateSearchSlot()`-shaped method
    /// returns a success bool rather than an id, since the id is
    /// caller-supplied.
    pub fn allocate_search_slot_with_id(&mut self, id: SearchId) -> SmbResult<bool> {
        if self.slots.contains_key(&id.0) {
            return Ok(false);
        }
        if self.slots.len() >= self.max_slots {
            return Err(SmbError::TooManySearches);
        }
        self.slots.insert(id.0, Slot::Reserved);
        Ok(true)
    }

    pub fn install(&mut self, id: SearchId, context: Box<dyn SearchContext>) {
        self.slots.insert(id.0, Slot::Active { context, closed: false });
    }

    pub fn find(&mut self, id: SearchId) -> Option<&mut Box<dyn SearchContext>> {
        match self.slots.get_mut(&id.0) {
            Some(Slot::Active { context, closed: false }) => Some(context),
            _ => None,
        }
    }

    pub fn close(&mut self, id: SearchId) {
        if let Some(Slot::Active { context, closed }) = self.slots.get_mut(&id.0) {
            context.close_search();
            *closed = true;
        }
    }

    pub fn close_all_searches(&mut self) {
        for slot in self.slots.values_mut() {
            if let Slot::Active { context, closed } = slot {
                context.close_search();
                *closed = true;
            }
        }
        self.slots.clear();
    }
}

impl Default for HashedSearchMap {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-`NetworkFile` registry of active directory searches.
///
/// The hashed variant only supports caller-supplied
/// ids (`allocate_search_slot_with_id`) while the sequential variant only
/// supports server-assigned ids (`allocate_search_slot`); callers must use
/// whichever matches the variant in hand, which this enum enforces by only
/// exposing the matching inherent method on each variant.
pub enum SearchMap {
    Sequential(SequentialSearchMap),
    Hashed(HashedSearchMap),
}

impl SearchMap {
    pub fn new_sequential() -> Self {
        SearchMap::Sequential(SequentialSearchMap::new())
    }

    pub fn new_hashed() -> Self {
        SearchMap::Hashed(HashedSearchMap::new())
    }

    pub fn install(&mut self, id: SearchId, context: Box<dyn SearchContext>) {
        match self {
            SearchMap::Sequential(map) => map.install(id, context),
            SearchMap::Hashed(map) => map.install(id, context),
        }
    }

    pub fn find(&mut self, id: SearchId) -> Option<&mut Box<dyn SearchContext>> {
        match self {
            SearchMap::Sequential(map) => map.find(id),
            SearchMap::Hashed(map) => map.find(id),
        }
    }

    pub fn close(&mut self, id: SearchId) {
        match self {
            SearchMap::Sequential(map) => map.close(id),
            SearchMap::Hashed(map) => map.close(id),
        }
    }

    /// Iterates, calls each active context's `close_search`, marks closed,
    /// then clears the table. One variant's `closeAllSearches` is treated as
    /// "mark closed" rather than literally invoking `isClosed()`.
    pub fn close_all_searches(&mut self) {
        match self {
            SearchMap::Sequential(map) => map.close_all_searches(),
            SearchMap::Hashed(map) => map.close_all_searches(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubSearch {
        closed: bool,
    }

    impl SearchContext for StubSearch {
        fn has_more_files(&self) -> bool {
            false
        }

        fn next_file_info(&mut self, _out: &mut FileInfo) -> SmbResult<bool> {
            Ok(false)
        }

        fn next_file_name(&mut self) -> SmbResult<Option<String>> {
            Ok(None)
        }

        fn resume_id(&self) -> u32 {
            0
        }

        fn restart_at(&mut self, _anchor: ResumeAnchor) -> SmbResult<()> {
            Ok(())
        }

        fn close_search(&mut self) {
            self.closed = true;
        }
    }

    #[test]
    fn sequential_allocation_reserves_then_lookups_see_empty_not_free() {
        let mut map = SequentialSearchMap::new();
        let id = map.allocate_search_slot().unwrap();
        // Reserved-but-not-installed: `find` must not treat this as usable
        // yet, but allocating again must not return the same id either.
        assert!(map.find(id).is_none());
        let other = map.allocate_search_slot().unwrap();
        assert_ne!(id.0, other.0);
    }

    #[test]
    fn sequential_overflow_past_max_yields_too_many_searches() {
        let mut map = SequentialSearchMap::with_capacity(0, 2);
        map.allocate_search_slot().unwrap();
        map.allocate_search_slot().unwrap();
        assert_eq!(map.allocate_search_slot(), Err(SmbError::TooManySearches));
    }

    #[test]
    fn hashed_allocation_rejects_duplicate_id() {
        let mut map = HashedSearchMap::new();
        assert!(map.allocate_search_slot_with_id(SearchId(5)).unwrap());
        assert!(!map.allocate_search_slot_with_id(SearchId(5)).unwrap());
    }

    #[test]
    fn close_all_searches_closes_and_clears() {
        let mut map = SearchMap::new_sequential();
        let id = match &mut map {
            SearchMap::Sequential(seq) => seq.allocate_search_slot().unwrap(),
            _ => unreachable!(),
        };
        map.install(id, Box::new(StubSearch { closed: false }));
        assert!(map.find(id).is_some());
        map.close_all_searches();
        assert!(map.find(id).is_none());
    }
}
