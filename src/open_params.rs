//! Normalized open/create parameters.
//!
//! [`OpenParams`] is the single record a protocol handler builds from any of
//! three wire dialects before calling [`crate::tree_connection::TreeConnection::open`].
//! Construction never fails: invalid combinations are carried through and
//! only rejected at the driver boundary.

use crate::access_mask::{LegacyAccessMode, NtAccessMask};
use crate::attrs::NtAttributes;
use crate::disposition::CreateDisposition;
use crate::sharing::{LegacySharingMode, SharingMode};

/// Which oplock a requester asked for: three request bits map to
/// one of these with priority `Batch > Exclusive > LevelII`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum OplockRequest {
    Batch,
    Exclusive,
    LevelII,
    None,
}

impl OplockRequest {
    pub const BATCH_BIT: u8 = 0x4;
    pub const EXCLUSIVE_BIT: u8 = 0x2;
    pub const LEVEL_II_BIT: u8 = 0x1;

    pub fn from_bits(bits: u8) -> Self {
        if bits & Self::BATCH_BIT != 0 {
            OplockRequest::Batch
        } else if bits & Self::EXCLUSIVE_BIT != 0 {
            OplockRequest::Exclusive
        } else if bits & Self::LEVEL_II_BIT != 0 {
            OplockRequest::LevelII
        } else {
            OplockRequest::None
        }
    }
}

/// Raw parameters as carried by a legacy Core SMB `Open`/`Create`.
#[derive(Debug, Clone)]
pub struct CoreOpenParams {
    pub path: String,
    pub access: LegacyAccessMode,
    pub sharing: LegacySharingMode,
    pub create_if_missing: bool,
    pub attributes: u32,
}

/// Raw parameters as carried by a LanMan `OpenAndX`.
#[derive(Debug, Clone)]
pub struct LanManOpenParams {
    pub path: String,
    pub access: LegacyAccessMode,
    pub sharing: LegacySharingMode,
    /// The raw `FileAction` field (create/truncate/openIf bits).
    pub action: u16,
    pub attributes: u32,
}

/// Raw parameters as carried by `NTCreateAndX`/SMB2 `Create`.
#[derive(Debug, Clone)]
pub struct NtOpenParams {
    pub path: String,
    pub desired_access: u32,
    pub share_access: u8,
    pub create_disposition: CreateDisposition,
    pub file_attributes: u32,
    pub create_options: u32,
    pub oplock_request_bits: u8,
}

impl NtOpenParams {
    /// `FILE_DIRECTORY_FILE` create option (forces the Directory attribute
    /// bit on).
    pub const CREATE_DIRECTORY_OPTION: u32 = 0x0000_0001;
}

/// A normalized open/create request, equivalent regardless of which wire
/// dialect it was built from.
#[derive(Debug, Clone)]
pub struct OpenParams {
    /// Share-root-anchored path (a leading separator is ensured).
    pub path: String,
    /// The alternate-data-stream suffix, if any (e.g. `:stream`). Absent
    /// when no stream marker was present, or when the marker was the bare
    /// main-data-stream suffix `::$DATA`.
    pub stream: Option<String>,
    pub access: NtAccessMask,
    pub sharing: SharingMode,
    pub disposition: CreateDisposition,
    pub attributes: NtAttributes,
    pub oplock_request: OplockRequest,
}

impl OpenParams {
    fn anchor_path(path: &str) -> String {
        if path.starts_with('\\') || path.starts_with('/') {
            path.to_owned()
        } else {
            format!("\\{path}")
        }
    }

    /// Splits the stream suffix off a path:
    /// - split on `:`;
    /// - a bare `::$DATA` (main-data-stream) suffix is dropped;
    /// - a trailing `:$DATA` on a named stream is stripped;
    /// - if no stream marker is present, the stream is absent.
    fn split_stream_suffix(path: &str) -> (String, Option<String>) {
        // A leading path separator (and a possible drive-letter colon, which
        // this core does not need to special-case since paths are always
        // share-relative) means the first `:` search must skip position 0.
        let Some(colon_pos) = path.find(':') else {
            return (path.to_owned(), None);
        };

        let (base, mut suffix) = path.split_at(colon_pos);
        // `suffix` includes the leading `:`.
        suffix = &suffix[1..];

        if suffix.is_empty() || suffix.eq_ignore_ascii_case("$DATA") {
            return (base.to_owned(), None);
        }

        let stream = if let Some(stripped) = strip_suffix_case_insensitive(suffix, ":$DATA") {
            stripped
        } else {
            suffix
        };

        (base.to_owned(), Some(format!(":{stream}")))
    }

    /// Builds an [`OpenParams`] from a legacy Core SMB open.
    pub fn from_core(raw: CoreOpenParams) -> Self {
        let (path, stream) = Self::split_stream_suffix(&Self::anchor_path(&raw.path));
        let disposition =
            if raw.create_if_missing { CreateDisposition::OpenIf } else { CreateDisposition::Open };
        OpenParams {
            path,
            stream,
            access: NtAccessMask::from_legacy(raw.access),
            sharing: SharingMode::from_legacy(raw.sharing),
            disposition,
            attributes: NtAttributes::from_bits(raw.attributes),
            oplock_request: OplockRequest::None,
        }
    }

    /// Builds an [`OpenParams`] from a LanMan `OpenAndX`.
    pub fn from_lanman(raw: LanManOpenParams) -> Self {
        let (path, stream) = Self::split_stream_suffix(&Self::anchor_path(&raw.path));
        OpenParams {
            path,
            stream,
            access: NtAccessMask::from_legacy(raw.access),
            sharing: SharingMode::from_legacy(raw.sharing),
            disposition: CreateDisposition::from_legacy_action(raw.action),
            attributes: NtAttributes::from_bits(raw.attributes),
            oplock_request: OplockRequest::None,
        }
    }

    /// Builds an [`OpenParams`] from an `NTCreateAndX`/SMB2 `Create`.
    pub fn from_nt(raw: NtOpenParams) -> Self {
        let (path, stream) = Self::split_stream_suffix(&Self::anchor_path(&raw.path));
        let mut attributes = NtAttributes::from_bits(raw.file_attributes);
        if raw.create_options & NtOpenParams::CREATE_DIRECTORY_OPTION != 0 {
            attributes.set(NtAttributes::DIRECTORY);
        }
        OpenParams {
            path,
            stream,
            access: NtAccessMask::from_bits(raw.desired_access).expand_generic(),
            sharing: SharingMode::from_bits(raw.share_access),
            disposition: raw.create_disposition,
            attributes,
            oplock_request: OplockRequest::from_bits(raw.oplock_request_bits),
        }
    }

    pub fn is_read_only_access(&self) -> bool {
        // Checks `NTReadWrite == NTRead`, which is only true when no write
        // bits beyond what `NTRead` already carries are set.
        self.access.bits() & NtAccessMask::NT_READ_WRITE == NtAccessMask::NT_READ
    }

    pub fn is_write_only_access(&self) -> bool {
        self.access.bits() & NtAccessMask::NT_READ_WRITE == NtAccessMask::NT_WRITE
    }

    pub fn is_read_write_access(&self) -> bool {
        self.access.contains(NtAccessMask::NT_READ) && self.access.contains(NtAccessMask::NT_WRITE)
    }

    /// True iff no data bits (`Read`/`Write`/`Append`/`Execute`/`Delete`) are
    /// set and at least one of `ReadAttrib`/`WriteAttrib` is.
    pub fn is_attributes_only_access(&self) -> bool {
        const DATA_BITS: u32 = NtAccessMask::READ
            | NtAccessMask::WRITE
            | NtAccessMask::APPEND
            | NtAccessMask::EXECUTE
            | NtAccessMask::DELETE;
        let no_data = self.access.bits() & DATA_BITS == 0;
        let attrib_only = self.access.contains(NtAccessMask::READ_ATTRIB)
            || self.access.contains(NtAccessMask::WRITE_ATTRIB);
        no_data && attrib_only
    }

    pub fn is_overwrite(&self) -> bool {
        self.disposition.is_overwrite()
    }

    pub fn is_delete_on_close(&self) -> bool {
        self.attributes.contains(NtAttributes::DELETE_ON_CLOSE)
    }

    pub fn is_sequential_access_only(&self) -> bool {
        self.attributes.contains(NtAttributes::SEQUENTIAL_SCAN)
    }

    pub fn is_write_through(&self) -> bool {
        self.attributes.contains(NtAttributes::WRITE_THROUGH)
    }
}

fn strip_suffix_case_insensitive<'a>(value: &'a str, suffix: &str) -> Option<&'a str> {
    if value.len() < suffix.len() {
        return None;
    }
    let (head, tail) = value.split_at(value.len() - suffix.len());
    tail.eq_ignore_ascii_case(suffix).then_some(head)
}
