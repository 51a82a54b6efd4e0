//! Per-handle open-file state.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::attrs::NtAttributes;
use crate::bitset::bitflags_like_status;
use crate::ids::{Did, Fid, ProtocolId, StreamId, UniqueId};
use crate::interfaces::{LockManager, OpLockManager};
use crate::search::SearchMap;
use crate::segment::SegmentInfo;

/// A timestamp matching what the driver boundary round-trips.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct FileTime {
    pub seconds: i64,
    pub nanos: u32,
}

/// A byte-range lock held by this handle. Conflict resolution across
/// sessions is the lock manager's responsibility; this list is
/// just the bookkeeping [`NetworkFile`] owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRangeLock {
    pub offset: u64,
    pub length: u64,
    pub exclusive: bool,
    pub owner_pid: u32,
}

/// Opaque binding to an externally-managed oplock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OplockHandle(pub u64);

bitflags_like_status! {
    /// Per-handle status bits distinct from the DOS/NT attribute masks.
    pub struct NetworkFileFlags: u32 {
        const DELETE_ON_CLOSE = 0x0001;
        const FORCE_CLOSE = 0x0002;
        const DIRECTORY = 0x0004;
        const DELAYED_WRITE_ERROR = 0x0008;
    }
}

/// Per-handle state created by the driver on open/create.
pub struct NetworkFile {
    pub fid: Fid,
    pub did: Did,
    pub stid: StreamId,
    pub unique_id: UniqueId,
    pub name: String,

    protocol_id: Mutex<Option<ProtocolId>>,
    size: AtomicU64,
    create_time: Mutex<FileTime>,
    access_time: Mutex<FileTime>,
    modify_time: Mutex<FileTime>,
    change_time: Mutex<FileTime>,
    attributes: Mutex<NtAttributes>,
    flags: Mutex<NetworkFileFlags>,
    modify_date_dirty: AtomicBool,
    locks: Mutex<Vec<ByteRangeLock>>,
    oplock: Mutex<Option<OplockHandle>>,
    searches: Mutex<SearchMap>,
    segment: Mutex<Option<Arc<SegmentInfo>>>,
}

impl NetworkFile {
    pub fn new(fid: Fid, did: Did, stid: StreamId, name: impl Into<String>) -> Self {
        let unique_id = UniqueId::from_ids(did, fid);
        NetworkFile {
            fid,
            did,
            stid,
            unique_id,
            name: name.into(),
            protocol_id: Mutex::new(None),
            size: AtomicU64::new(0),
            create_time: Mutex::new(FileTime::default()),
            access_time: Mutex::new(FileTime::default()),
            modify_time: Mutex::new(FileTime::default()),
            change_time: Mutex::new(FileTime::default()),
            attributes: Mutex::new(NtAttributes::default()),
            flags: Mutex::new(NetworkFileFlags::empty()),
            modify_date_dirty: AtomicBool::new(false),
            locks: Mutex::new(Vec::new()),
            oplock: Mutex::new(None),
            searches: Mutex::new(SearchMap::new_hashed()),
            segment: Mutex::new(None),
        }
    }

    /// Assigned once by the owning tree's [`crate::open_file_map::OpenFileMap::add`],
    /// so it can be looked back up across protocol handles.
    pub fn set_protocol_id(&self, id: ProtocolId) {
        *self.protocol_id.lock().expect("network file mutex poisoned") = Some(id);
    }

    pub fn protocol_id(&self) -> Option<ProtocolId> {
        *self.protocol_id.lock().expect("network file mutex poisoned")
    }

    pub fn size(&self) -> u64 {
        self.size.load(Ordering::Acquire)
    }

    pub fn set_size(&self, size: u64) {
        self.size.store(size, Ordering::Release);
    }

    pub fn attributes(&self) -> NtAttributes {
        *self.attributes.lock().expect("network file mutex poisoned")
    }

    pub fn set_attributes(&self, attrs: NtAttributes) {
        *self.attributes.lock().expect("network file mutex poisoned") = attrs;
    }

    pub fn flags(&self) -> NetworkFileFlags {
        *self.flags.lock().expect("network file mutex poisoned")
    }

    pub fn set_flag(&self, flag: NetworkFileFlags) {
        self.flags.lock().expect("network file mutex poisoned").insert(flag);
    }

    pub fn is_delete_on_close(&self) -> bool {
        self.flags().contains(NetworkFileFlags::DELETE_ON_CLOSE)
    }

    pub fn is_directory(&self) -> bool {
        self.flags().contains(NetworkFileFlags::DIRECTORY)
    }

    /// Every data write sets this; only an explicit [`Self::set_modify_date`]
    /// clears it.
    pub fn mark_modify_date_dirty(&self) {
        self.modify_date_dirty.store(true, Ordering::Release);
    }

    pub fn is_modify_date_dirty(&self) -> bool {
        self.modify_date_dirty.load(Ordering::Acquire)
    }

    pub fn set_modify_date(&self, time: FileTime) {
        *self.modify_time.lock().expect("network file mutex poisoned") = time;
        self.modify_date_dirty.store(false, Ordering::Release);
    }

    pub fn modify_date(&self) -> FileTime {
        *self.modify_time.lock().expect("network file mutex poisoned")
    }

    pub fn set_create_date(&self, time: FileTime) {
        *self.create_time.lock().expect("network file mutex poisoned") = time;
    }

    pub fn set_access_date(&self, time: FileTime) {
        *self.access_time.lock().expect("network file mutex poisoned") = time;
    }

    pub fn set_change_date(&self, time: FileTime) {
        *self.change_time.lock().expect("network file mutex poisoned") = time;
    }

    pub fn add_lock(&self, lock: ByteRangeLock) {
        self.locks.lock().expect("network file mutex poisoned").push(lock);
    }

    pub fn locks(&self) -> Vec<ByteRangeLock> {
        self.locks.lock().expect("network file mutex poisoned").clone()
    }

    pub fn clear_locks(&self) {
        self.locks.lock().expect("network file mutex poisoned").clear();
    }

    pub fn bind_oplock(&self, handle: OplockHandle) {
        *self.oplock.lock().expect("network file mutex poisoned") = Some(handle);
    }

    pub fn oplock(&self) -> Option<OplockHandle> {
        *self.oplock.lock().expect("network file mutex poisoned")
    }

    pub fn searches(&self) -> std::sync::MutexGuard<'_, SearchMap> {
        self.searches.lock().expect("network file mutex poisoned")
    }

    pub fn bind_segment(&self, segment: Arc<SegmentInfo>) {
        *self.segment.lock().expect("network file mutex poisoned") = Some(segment);
    }

    pub fn segment(&self) -> Option<Arc<SegmentInfo>> {
        self.segment.lock().expect("network file mutex poisoned").clone()
    }

    /// Runs the local-state portion of the close sequence: close every
    /// handle-scoped search rooted on this file, then release any held
    /// locks and any bound oplock via the external managers. The driver's
    /// `closeFile` call and the delete-on-close
    /// honouring happen in the caller (the owning [`crate::tree_connection::TreeConnection`]),
    /// which alone knows the driver and the tree's remaining refcount.
    pub fn close_local_state(
        &self,
        lock_manager: Option<&dyn LockManager>,
        oplock_manager: Option<&dyn OpLockManager>,
    ) {
        self.searches().close_all_searches();

        if let Some(lock_manager) = lock_manager {
            lock_manager.release_all(self);
        }
        self.clear_locks();

        if let Some(oplock_manager) = oplock_manager {
            if let Some(handle) = self.oplock() {
                oplock_manager.release(self, handle);
            }
        }
        *self.oplock.lock().expect("network file mutex poisoned") = None;

        debug!(fid = self.fid.0, unique_id = self.unique_id.0, "network file local state closed");
    }
}
