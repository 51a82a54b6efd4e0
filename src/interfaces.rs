//! External collaborator contracts.
//!
//! Each trait here is a capability the core may discover on a driver or
//! manager. Only [`DiskInterface`] is mandatory; everything else is wired in
//! as `Option<Arc<dyn Trait>>` on [`crate::disk_device_context::DiskDeviceContext`]
//! or passed explicitly where a single call site needs it, matching the
//! "polymorphic collaborator contract" each external dependency plays.

use async_trait::async_trait;

use crate::error::SmbResult;
use crate::file_info::{FileInfo, SrvDiskInfo};
use crate::network_file::{FileTime, NetworkFile, OplockHandle};
use crate::open_params::OpenParams;
use crate::search::SearchContext;

/// Whether a path resolves to a file, a directory, or nothing.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PathState {
    NotExist,
    FileExists,
    DirectoryExists,
    Unknown,
}

/// The mandatory disk driver contract: every filesystem operation the core
/// cannot perform itself routes through here.
#[async_trait]
pub trait DiskInterface: Send + Sync {
    async fn create_directory(&self, path: &str, params: &OpenParams) -> SmbResult<()>;
    async fn delete_directory(&self, path: &str) -> SmbResult<()>;

    async fn open_file(&self, path: &str, params: &OpenParams) -> SmbResult<NetworkFile>;
    async fn close_file(&self, file: &NetworkFile) -> SmbResult<()>;

    async fn read_file(&self, file: &NetworkFile, offset: u64, buf: &mut [u8]) -> SmbResult<usize>;
    async fn write_file(&self, file: &NetworkFile, offset: u64, data: &[u8]) -> SmbResult<usize>;
    async fn flush_file(&self, file: &NetworkFile) -> SmbResult<()>;
    async fn truncate_file(&self, file: &NetworkFile, size: u64) -> SmbResult<()>;

    async fn delete_file(&self, path: &str) -> SmbResult<()>;
    async fn rename_file(&self, from: &str, to: &str) -> SmbResult<()>;

    async fn get_file_information(&self, path: &str) -> SmbResult<FileInfo>;
    async fn set_file_information(&self, path: &str, info: &FileInfo) -> SmbResult<()>;

    async fn file_exists(&self, path: &str) -> SmbResult<PathState>;
    async fn is_read_only(&self) -> SmbResult<bool>;

    async fn start_search(&self, pattern: &str, attr_filter: u32)
        -> SmbResult<Box<dyn SearchContext>>;
}

/// Resolves `(did, fid)` to a share-relative path.
#[async_trait]
pub trait FileIdInterface: Send + Sync {
    async fn resolve_path(&self, did: u32, fid: u32) -> SmbResult<String>;
}

/// Fills out a [`SrvDiskInfo`] with volume size information.
#[async_trait]
pub trait DiskSizeInterface: Send + Sync {
    async fn disk_size_info(&self) -> SmbResult<SrvDiskInfo>;
}

/// Processes an NT FS/device control code.
#[async_trait]
pub trait IOCtlInterface: Send + Sync {
    async fn io_control(&self, file: &NetworkFile, code: u32, input: &[u8]) -> SmbResult<Vec<u8>>;
}

/// Symbolic link support.
#[async_trait]
pub trait SymbolicLinkInterface: Send + Sync {
    fn is_enabled(&self) -> bool;
    async fn read_target(&self, path: &str) -> SmbResult<String>;
}

/// Wraps a request in a backend transaction.
#[async_trait]
pub trait TransactionalFilesystemInterface: Send + Sync {
    async fn begin_read_transaction(&self) -> SmbResult<u64>;
    async fn begin_write_transaction(&self) -> SmbResult<u64>;
    async fn end_transaction(&self, id: u64) -> SmbResult<()>;
}

/// Security-descriptor storage for a [`NetworkFile`].
#[async_trait]
pub trait SecurityDescriptorInterface: Send + Sync {
    async fn security_descriptor_length(&self, file: &NetworkFile) -> SmbResult<u32>;
    async fn load_security_descriptor(&self, file: &NetworkFile) -> SmbResult<Vec<u8>>;
    async fn save_security_descriptor(&self, file: &NetworkFile, raw: &[u8]) -> SmbResult<()>;
}

/// Per-share disk-quota accounting.
#[async_trait]
pub trait QuotaManager: Send + Sync {
    async fn allocate_space(&self, uid: u32, bytes: u64) -> SmbResult<()>;
    async fn release_space(&self, uid: u32, bytes: u64) -> SmbResult<()>;
    async fn user_free_space(&self, uid: u32) -> SmbResult<u64>;
    async fn total_free_space(&self) -> SmbResult<u64>;
}

/// The subset of [`DiskInterface`] the background loader needs for
/// save-side bookkeeping, named separately as the "loader-side" contract.
#[async_trait]
pub trait NamedFileLoader: Send + Sync {
    async fn file_exists(&self, path: &str) -> SmbResult<PathState>;
    async fn create_directory(&self, path: &str) -> SmbResult<()>;
    async fn delete_directory(&self, path: &str) -> SmbResult<()>;
    async fn rename_file_directory(&self, from: &str, to: &str) -> SmbResult<()>;
    async fn set_file_information(&self, path: &str, info: &FileInfo) -> SmbResult<()>;
}

/// Byte-range lock conflict resolution.
pub trait LockManager: Send + Sync {
    fn release_all(&self, file: &NetworkFile);
}

/// Opportunistic-lock binding and release.
pub trait OpLockManager: Send + Sync {
    fn release(&self, file: &NetworkFile, handle: OplockHandle);
}

/// Notifies interested parties of filesystem changes for SMB change
/// notification.
pub trait FsEventsHandler: Send + Sync {
    fn notify_change(&self, path: &str, action: ChangeAction, time: FileTime);
}

/// The kind of filesystem change an [`FsEventsHandler`] is told about.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ChangeAction {
    Added,
    Removed,
    Modified,
    RenamedOldName,
    RenamedNewName,
}
