//! Per-share singleton: configuration plus wiring to the driver and the
//! optional collaborator managers.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::bitset::bitflags_like_status;
use crate::file_info::{SrvDiskInfo, VolumeInfo};
use crate::file_state::FileStateCache;
use crate::interfaces::{
    DiskInterface, DiskSizeInterface, FileIdInterface, FsEventsHandler, IOCtlInterface,
    LockManager, OpLockManager, QuotaManager, SecurityDescriptorInterface, SymbolicLinkInterface,
    TransactionalFilesystemInterface,
};

bitflags_like_status! {
    /// Filesystem-attribute mask advertised for the share (case sensitivity,
    /// streams support, compression, encryption, ACLs, ...).
    pub struct FilesystemAttributes: u32 {
        const CASE_SENSITIVE_SEARCH = 0x0001;
        const CASE_PRESERVED_NAMES = 0x0002;
        const UNICODE_ON_DISK = 0x0004;
        const PERSISTENT_ACLS = 0x0008;
        const FILE_COMPRESSION = 0x0010;
        const VOLUME_QUOTAS = 0x0020;
        const SUPPORTS_SPARSE_FILES = 0x0040;
        const SUPPORTS_REPARSE_POINTS = 0x0080;
        const VOLUME_IS_COMPRESSED = 0x0100;
        const SUPPORTS_ENCRYPTION = 0x0200;
        const NAMED_STREAMS = 0x0400;
    }
}

bitflags_like_status! {
    /// Device-attribute mask (removable, read-only, write-once).
    pub struct DeviceAttributes: u32 {
        const REMOVABLE = 0x0001;
        const READ_ONLY = 0x0002;
        const WRITE_ONCE = 0x0004;
    }
}

/// Per-share configuration and collaborator wiring. Created
/// once per mounted share and referenced by every [`crate::tree_connection::TreeConnection`]
/// bound to it.
pub struct DiskDeviceContext {
    pub share_name: String,
    pub disk: Arc<dyn DiskInterface>,

    pub quota_manager: Option<Arc<dyn QuotaManager>>,
    pub file_state_cache: Option<Arc<FileStateCache>>,
    pub lock_manager: Option<Arc<dyn LockManager>>,
    pub oplock_manager: Option<Arc<dyn OpLockManager>>,
    pub fs_events_handler: Option<Arc<dyn FsEventsHandler>>,
    pub file_id_interface: Option<Arc<dyn FileIdInterface>>,
    pub disk_size_interface: Option<Arc<dyn DiskSizeInterface>>,
    pub io_ctl_interface: Option<Arc<dyn IOCtlInterface>>,
    pub symlink_interface: Option<Arc<dyn SymbolicLinkInterface>>,
    pub transactional_interface: Option<Arc<dyn TransactionalFilesystemInterface>>,
    pub security_descriptor_interface: Option<Arc<dyn SecurityDescriptorInterface>>,

    pub volume_info: VolumeInfo,
    pub disk_info: SrvDiskInfo,
    pub filesystem_attributes: FilesystemAttributes,
    pub device_attributes: DeviceAttributes,

    active_connections: AtomicU32,
}

impl DiskDeviceContext {
    pub fn new(share_name: impl Into<String>, disk: Arc<dyn DiskInterface>) -> Self {
        DiskDeviceContext {
            share_name: share_name.into(),
            disk,
            quota_manager: None,
            file_state_cache: None,
            lock_manager: None,
            oplock_manager: None,
            fs_events_handler: None,
            file_id_interface: None,
            disk_size_interface: None,
            io_ctl_interface: None,
            symlink_interface: None,
            transactional_interface: None,
            security_descriptor_interface: None,
            volume_info: VolumeInfo::default(),
            disk_info: SrvDiskInfo::default(),
            filesystem_attributes: FilesystemAttributes::empty(),
            device_attributes: DeviceAttributes::empty(),
            active_connections: AtomicU32::new(0),
        }
    }

    /// Called by [`crate::tree_connection::TreeConnection::new`] on mount.
    pub fn increment_connections(&self) -> u32 {
        self.active_connections.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Called by [`crate::tree_connection::TreeConnection::close_connection`]
    /// on teardown.
    pub fn decrement_connections(&self) -> u32 {
        self.active_connections.fetch_sub(1, Ordering::AcqRel) - 1
    }

    pub fn active_connection_count(&self) -> u32 {
        self.active_connections.load(Ordering::Acquire)
    }

    pub fn is_read_only_device(&self) -> bool {
        self.device_attributes.contains(DeviceAttributes::READ_ONLY)
    }

    /// Unregisters from the change handler, then delegates upward. There is nothing further "upward" to delegate to
    /// at this layer beyond dropping the handler reference: a
    /// [`DiskDeviceContext`] has no parent collaborator of its own.
    pub fn close_context(&mut self) {
        self.fs_events_handler = None;
    }
}
