//! The error taxonomy shared by every public operation in this crate.
//!
//! Mirrors the fixed taxonomy of error kinds the SMB core surfaces to its
//! callers (protocol handlers) and receives from its collaborators (the disk
//! driver, lock/oplock managers, quota manager). Names are illustrative; the
//! taxonomy itself is what callers may match on.

use std::fmt;

/// Convenience alias used throughout the crate.
pub type SmbResult<T> = Result<T, SmbError>;

/// The fixed error taxonomy of the filesystem core.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SmbError {
    /// Permission/ACL denied the operation, or the filesystem is read-only.
    AccessDenied,
    /// Rename/delete denied by policy.
    PermissionDenied,
    /// The target file or directory does not exist.
    FileNotFound,
    /// An upper path component does not exist.
    PathNotFound,
    /// The target already exists.
    FileExists,
    /// Sharing-mode conflict with an existing open.
    FileSharing,
    /// An oplock is already held by another owner.
    ExistingOplockOwner,
    /// The tree's `OpenFileMap` is at capacity.
    TooManyFiles,
    /// A `NetworkFile`'s `SearchMap` is at capacity.
    TooManySearches,
    /// The backing store is unreachable (disk-level).
    DiskOffline,
    /// The backing store is unreachable (media-level).
    MediaOffline,
    /// The protocol layer wanted to defer the request but deferral failed.
    DeferFailed,
    /// Sentinel: the core accepted the request for later processing. The
    /// protocol layer must not release the request packet.
    DeferredPacket,
    /// Sentinel: synonym for `DeferredPacket` used by some call sites.
    FilesystemPending,
    /// The requested I/O control code is not implemented by the driver.
    IoControlNotImplemented,
    /// The requested metadata view is not produced by this server.
    UnsupportedInfoLevel,
    /// Catch-all backend I/O failure.
    Io(IoErrorKind),
    /// A buffered write previously failed to persist; surfaced on the next
    /// operation against the owning handle.
    DelayedWriteError,
    /// Caller asked for an invalid combination of parameters.
    InvalidParameter,
    /// A streamed segment's tx buffer slots are full; caller must wait via
    /// `waitForWriteBuffer` and retry.
    MaxBuffers,
}

/// A small, `Clone`/`Eq`-friendly stand-in for [`std::io::ErrorKind`] plus a
/// message, so [`SmbError`] itself can stay `Clone + Eq + Hash`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IoErrorKind {
    pub message: String,
}

impl fmt::Display for SmbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SmbError::AccessDenied => write!(f, "access denied"),
            SmbError::PermissionDenied => write!(f, "permission denied"),
            SmbError::FileNotFound => write!(f, "file not found"),
            SmbError::PathNotFound => write!(f, "path not found"),
            SmbError::FileExists => write!(f, "file exists"),
            SmbError::FileSharing => write!(f, "sharing violation"),
            SmbError::ExistingOplockOwner => write!(f, "oplock already held by another owner"),
            SmbError::TooManyFiles => write!(f, "too many open files"),
            SmbError::TooManySearches => write!(f, "too many open searches"),
            SmbError::DiskOffline => write!(f, "disk offline"),
            SmbError::MediaOffline => write!(f, "media offline"),
            SmbError::DeferFailed => write!(f, "could not defer request"),
            SmbError::DeferredPacket => write!(f, "request deferred"),
            SmbError::FilesystemPending => write!(f, "request pending"),
            SmbError::IoControlNotImplemented => write!(f, "io control not implemented"),
            SmbError::UnsupportedInfoLevel => write!(f, "unsupported information level"),
            SmbError::Io(kind) => write!(f, "io error: {}", kind.message),
            SmbError::DelayedWriteError => write!(f, "a previous buffered write failed to persist"),
            SmbError::InvalidParameter => write!(f, "invalid parameter"),
            SmbError::MaxBuffers => write!(f, "segment buffer slots exhausted"),
        }
    }
}

impl std::error::Error for SmbError {}

impl From<std::io::Error> for SmbError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => SmbError::FileNotFound,
            std::io::ErrorKind::AlreadyExists => SmbError::FileExists,
            std::io::ErrorKind::PermissionDenied => SmbError::AccessDenied,
            _ => SmbError::Io(IoErrorKind { message: err.to_string() }),
        }
    }
}

impl SmbError {
    /// True for the two sentinel "accepted, handled asynchronously" values;
    /// these must never be treated as failures by a caller (§7).
    pub fn is_pending_sentinel(&self) -> bool {
        matches!(self, SmbError::DeferredPacket | SmbError::FilesystemPending)
    }
}
