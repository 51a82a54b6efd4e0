//! The data-streaming engine bound to a file's unique id.
//!
//! A [`SegmentInfo`] is shared by every [`crate::network_file::NetworkFile`]
//! that refers to the same unique id. State transitions are guarded by the
//! segment's own monitor; I/O against
//! the underlying store runs outside that monitor once a load-lock flag is
//! taken.

mod file_segment;
mod memory_segment;
mod streamed_segment;

pub use file_segment::FileSegment;
pub use memory_segment::MemorySegment;
pub use streamed_segment::{StreamedSegment, DEFAULT_PAGE_SIZE, DEFAULT_SLOT_COUNT};

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Notify};
use tracing::trace;

use crate::bitset::bitflags_like_status;
use crate::error::{SmbError, SmbResult};
use crate::ids::UniqueId;

/// The segment state machine:
/// `Initial -> LoadWait -> Loading -> Available -> SaveWait -> Saving -> Saved`,
/// with an `Error` branch reachable from `Loading` or `Saving`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SegmentState {
    Initial,
    LoadWait,
    Loading,
    Available,
    SaveWait,
    Saving,
    Saved,
    Error,
}

bitflags_like_status! {
    /// Status bits orthogonal to [`SegmentState`].
    pub struct SegmentStatusFlags: u16 {
        const UPDATED = 0x0001;
        const REQUEST_QUEUED = 0x0002;
        const DELETE_ON_SAVE = 0x0004;
        const ALL_DATA = 0x0008;
        const STREAMED = 0x0010;
        const READ_ERROR = 0x0020;
        const WRITE_ERROR = 0x0040;
        const FILE_CLOSED = 0x0080;
        const DELETE_FROM_STORE = 0x0100;
        const RENAME_ON_STORE = 0x0200;
    }
}

/// Outcome of a `hasDataFor`-style availability check.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DataAvailability {
    Available,
    Loadable,
    LoadableOutOfSeq,
    Loading,
    NotAvailable,
}

/// Shared mutable state behind a segment's monitor.
pub(crate) struct SegmentShared {
    pub state: SegmentState,
    pub flags: SegmentStatusFlags,
    pub file_length: u64,
    pub readable_length: u64,
}

impl SegmentShared {
    fn new() -> Self {
        SegmentShared {
            state: SegmentState::Initial,
            flags: SegmentStatusFlags::empty(),
            file_length: 0,
            readable_length: 0,
        }
    }
}

/// The condvar-equivalent monitor backing a segment: a `tokio::sync::Mutex`
/// guarding shared state plus a `Notify` for state-transition wakeups: one
/// monitor per segment, built on the async primitives the existing `tokio`
/// dependency already provides.
pub struct SegmentMonitor {
    shared: Mutex<SegmentShared>,
    notify: Notify,
}

impl SegmentMonitor {
    fn new() -> Self {
        SegmentMonitor { shared: Mutex::new(SegmentShared::new()), notify: Notify::new() }
    }

    pub async fn state(&self) -> SegmentState {
        self.shared.lock().await.state
    }

    /// Applies a state transition and broadcasts whenever the new state is
    /// `Available` or later in the happy path (i.e. anything but
    /// `Initial`/`LoadWait`/`Loading`).
    pub async fn transition(&self, new_state: SegmentState) {
        {
            let mut shared = self.shared.lock().await;
            trace!(?shared.state, ?new_state, "segment state transition");
            shared.state = new_state;
        }
        if !matches!(new_state, SegmentState::Initial | SegmentState::LoadWait | SegmentState::Loading) {
            self.notify.notify_waiters();
        }
    }

    pub async fn set_flag(&self, flag: SegmentStatusFlags) {
        self.shared.lock().await.flags.insert(flag);
    }

    pub async fn flags(&self) -> SegmentStatusFlags {
        self.shared.lock().await.flags
    }

    pub async fn file_length(&self) -> u64 {
        self.shared.lock().await.file_length
    }

    pub async fn set_file_length(&self, len: u64) {
        self.shared.lock().await.file_length = len;
    }

    pub async fn readable_length(&self) -> u64 {
        self.shared.lock().await.readable_length
    }

    /// Advances `readable_length`; never lets it exceed `file_length`.
    pub async fn advance_readable_length(&self, len: u64) {
        let mut shared = self.shared.lock().await;
        shared.readable_length = len.min(shared.file_length);
        drop(shared);
        self.notify.notify_waiters();
    }

    /// Returns early if `off + len <= readable_length` already holds;
    /// otherwise waits up to `timeout` for a transition, then re-checks once.
    pub async fn wait_for_data(&self, timeout: Duration, off: u64, len: u64) -> bool {
        if self.is_data_available(off, len).await {
            return true;
        }
        let notified = self.notify.notified();
        tokio::select! {
            _ = notified => {}
            _ = tokio::time::sleep(timeout) => {}
        }
        self.is_data_available(off, len).await
    }

    pub async fn is_data_available(&self, off: u64, len: u64) -> bool {
        let shared = self.shared.lock().await;
        off.saturating_add(len) <= shared.readable_length
    }
}

/// Shared contract across the three segment backends.
#[async_trait::async_trait]
pub trait SegmentBackend: Send + Sync {
    fn monitor(&self) -> &SegmentMonitor;
    async fn read(&self, offset: u64, buf: &mut [u8]) -> SmbResult<usize>;
    async fn write(&self, offset: u64, data: &[u8]) -> SmbResult<usize>;
    async fn flush(&self) -> SmbResult<()>;
    async fn truncate(&self, size: u64) -> SmbResult<()>;
    fn has_data_for(&self, offset: u64, len: u64) -> DataAvailability;
}

/// A shared buffer-and-state object bound to a file's unique id, selected by
/// backend at creation time.
pub enum SegmentInfo {
    File(FileSegment),
    InMemory(MemorySegment),
    Streamed(StreamedSegment),
}

impl SegmentInfo {
    pub fn new_file_backed(unique_id: UniqueId, temp_path: std::path::PathBuf) -> Arc<Self> {
        Arc::new(SegmentInfo::File(FileSegment::new(unique_id, temp_path)))
    }

    pub fn new_in_memory(unique_id: UniqueId) -> Arc<Self> {
        Arc::new(SegmentInfo::InMemory(MemorySegment::new(unique_id)))
    }

    pub fn new_streamed(unique_id: UniqueId, page_size: usize, slot_count: usize) -> Arc<Self> {
        Arc::new(SegmentInfo::Streamed(StreamedSegment::new(unique_id, page_size, slot_count)))
    }

    pub fn unique_id(&self) -> UniqueId {
        match self {
            SegmentInfo::File(s) => s.unique_id,
            SegmentInfo::InMemory(s) => s.unique_id,
            SegmentInfo::Streamed(s) => s.unique_id,
        }
    }

    fn backend(&self) -> &dyn SegmentBackend {
        match self {
            SegmentInfo::File(s) => s,
            SegmentInfo::InMemory(s) => s,
            SegmentInfo::Streamed(s) => s,
        }
    }

    pub fn monitor(&self) -> &SegmentMonitor {
        self.backend().monitor()
    }

    pub async fn read(&self, offset: u64, buf: &mut [u8]) -> SmbResult<usize> {
        self.backend().read(offset, buf).await
    }

    pub async fn write(&self, offset: u64, data: &[u8]) -> SmbResult<usize> {
        let written = self.backend().write(offset, data).await?;
        self.monitor().set_flag(SegmentStatusFlags::UPDATED).await;
        Ok(written)
    }

    pub async fn flush(&self) -> SmbResult<()> {
        self.backend().flush().await
    }

    pub async fn truncate(&self, size: u64) -> SmbResult<()> {
        self.backend().truncate(size).await
    }

    pub fn has_data_for(&self, offset: u64, len: u64) -> DataAvailability {
        self.backend().has_data_for(offset, len)
    }

    pub async fn wait_for_data(&self, timeout: Duration, off: u64, len: u64) -> bool {
        self.monitor().wait_for_data(timeout, off, len).await
    }

    /// Drives the load-lock protocol: the first caller to see
    /// `Initial`/`LoadWait` transitions to `Loading` and owns the load;
    /// everyone else observes `Loading` and must wait on the monitor instead
    /// of racing the same load.
    pub async fn try_become_loader(&self) -> bool {
        let monitor = self.monitor();
        let mut shared = monitor.shared.lock().await;
        match shared.state {
            SegmentState::Initial | SegmentState::LoadWait => {
                shared.state = SegmentState::Loading;
                true
            }
            _ => false,
        }
    }

    pub async fn fail(&self, flag: SegmentStatusFlags) {
        self.monitor().set_flag(flag).await;
        self.monitor().transition(SegmentState::Error).await;
    }

    /// Ingests freshly loaded bytes from the store and transitions to
    /// `Available`.
    /// For the streamed backend this appends a page, in- or out-of-sequence
    /// per the caller's classification; the file and in-memory backends
    /// address their whole range directly, so ingesting a load is the same
    /// code path as a write at `offset`.
    pub async fn complete_load(&self, offset: u64, data: Vec<u8>, out_of_sequence: bool) -> SmbResult<()> {
        match self {
            SegmentInfo::Streamed(s) => {
                s.ingest_loaded_page(offset, data, out_of_sequence).await;
            }
            _ => {
                self.backend().write(offset, &data).await?;
            }
        }
        self.monitor().transition(SegmentState::Available).await;
        Ok(())
    }

    /// The next chunk of dirty data ready to persist, if any. Only the streamed backend defers partial buffers this
    /// way; file/memory backends persist their whole current extent on
    /// `flush` instead.
    pub async fn data_to_save(&self) -> Option<Vec<u8>> {
        match self {
            SegmentInfo::Streamed(s) => s.data_to_save().await,
            _ => None,
        }
    }

    /// Acknowledges the chunk [`Self::data_to_save`] returned.
    pub async fn data_saved(&self) {
        if let SegmentInfo::Streamed(s) = self {
            s.data_saved().await;
        }
    }

    /// Marks the segment closed for save-scheduling purposes.
    pub async fn mark_closed(&self) {
        if let SegmentInfo::Streamed(s) = self {
            s.mark_closed().await;
        }
        self.monitor().set_flag(SegmentStatusFlags::FILE_CLOSED).await;
    }

    /// Mirrors [`Self::try_become_loader`] for the save side: the first
    /// caller to see `Available`/`SaveWait` owns the save and transitions to
    /// `Saving`.
    pub async fn try_become_saver(&self) -> bool {
        let monitor = self.monitor();
        let mut shared = monitor.shared.lock().await;
        match shared.state {
            SegmentState::Available | SegmentState::SaveWait => {
                shared.state = SegmentState::Saving;
                true
            }
            _ => false,
        }
    }

    /// Completes a save started by [`Self::try_become_saver`]: clears
    /// `UPDATED` and transitions to `Saved`.
    pub async fn complete_save(&self) {
        self.monitor().shared.lock().await.flags.remove(SegmentStatusFlags::UPDATED);
        self.monitor().transition(SegmentState::Saved).await;
    }
}

pub(crate) fn too_many_buffers() -> SmbError {
    SmbError::MaxBuffers
}
