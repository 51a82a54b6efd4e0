#[path = "../demos/memory_disk.rs"]
pub mod memory_disk;

use std::sync::Arc;

use memory_disk::MemoryDisk;
use smb_filesystem_core::access_mask::NtAccessMask;
use smb_filesystem_core::disk_device_context::DiskDeviceContext;
use smb_filesystem_core::disposition::CreateDisposition;
use smb_filesystem_core::ids::TreeId;
use smb_filesystem_core::open_params::{NtOpenParams, OpenParams};
use smb_filesystem_core::sharing::SharingMode;
use smb_filesystem_core::tree_connection::{Permission, TreeConnection};

pub struct Fixture {
    pub tree: TreeConnection,
}

impl Fixture {
    pub fn new() -> Self {
        let device = Arc::new(DiskDeviceContext::new("share", Arc::new(MemoryDisk::default())));
        let tree = TreeConnection::new(TreeId(1), device, Permission::Writeable);
        Fixture { tree }
    }
}

pub fn open_params(path: &str, disposition: CreateDisposition) -> OpenParams {
    OpenParams::from_nt(NtOpenParams {
        path: path.to_owned(),
        desired_access: NtAccessMask::NT_READ_WRITE,
        share_access: SharingMode::READ_WRITE,
        create_disposition: disposition,
        file_attributes: 0,
        create_options: 0,
        oplock_request_bits: 0,
    })
}
