//! Metadata value objects with "set flags" for partial updates.

use crate::attrs::NtAttributes;
use crate::network_file::FileTime;

crate::bitset::bitflags_like_status! {
    /// Marks which fields of a [`FileInfo`] a partial `setFileInformation`
    /// call actually carries.
    pub struct FileInfoFlags: u32 {
        const SET_ATTRIBUTES = 0x0001;
        const SET_CREATE_DATE = 0x0002;
        const SET_ACCESS_DATE = 0x0004;
        const SET_MODIFY_DATE = 0x0008;
        const SET_CHANGE_DATE = 0x0010;
        const SET_FILE_SIZE = 0x0020;
        const SET_ALLOCATION_SIZE = 0x0040;
    }
}

/// Metadata describing a single file or directory.
#[derive(Debug, Clone, Default)]
pub struct FileInfo {
    pub set_flags: FileInfoFlags,
    pub file_name: String,
    pub size: u64,
    pub allocation_size: u64,
    pub attributes: NtAttributes,
    pub create_date: Option<FileTime>,
    pub access_date: Option<FileTime>,
    pub modify_date: Option<FileTime>,
    pub change_date: Option<FileTime>,
}

impl FileInfo {
    pub fn with_size(mut self, size: u64) -> Self {
        self.size = size;
        self.set_flags.insert(FileInfoFlags::SET_FILE_SIZE);
        self
    }

    pub fn with_attributes(mut self, attrs: NtAttributes) -> Self {
        self.attributes = attrs;
        self.set_flags.insert(FileInfoFlags::SET_ATTRIBUTES);
        self
    }
}

/// Static and dynamic disk geometry reported by the driver.
#[derive(Debug, Clone, Copy, Default)]
pub struct SrvDiskInfo {
    pub total_units: u64,
    pub free_units: u64,
    pub block_size: u32,
    pub blocks_per_unit: u32,
}

impl SrvDiskInfo {
    pub fn total_bytes(&self) -> u64 {
        self.total_units * self.block_size as u64 * self.blocks_per_unit as u64
    }

    pub fn free_bytes(&self) -> u64 {
        self.free_units * self.block_size as u64 * self.blocks_per_unit as u64
    }
}

/// Per-share volume metadata (label, serial number, creation date).
#[derive(Debug, Clone, Default)]
pub struct VolumeInfo {
    pub label: String,
    pub serial_number: u32,
    pub creation_date: Option<FileTime>,
}
