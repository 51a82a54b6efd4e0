//! Runnable demonstration of the filesystem core wired to the in-memory
//! reference driver: mounts a share, opens/writes/reads a file, then tears
//! the tree connection down.

#[path = "memory_disk.rs"]
mod memory_disk;

use std::sync::Arc;

use memory_disk::MemoryDisk;
use smb_filesystem_core::disk_device_context::DiskDeviceContext;
use smb_filesystem_core::disposition::CreateDisposition;
use smb_filesystem_core::filesystems_config::FilesystemsConfig;
use smb_filesystem_core::ids::TreeId;
use smb_filesystem_core::open_params::{NtOpenParams, OpenParams};
use smb_filesystem_core::tree_connection::{Permission, TreeConnection};

#[tokio::main]
async fn main() {
    smb_filesystem_core::init_tracing();

    let registry = FilesystemsConfig::new();
    let device = Arc::new(DiskDeviceContext::new("demo", Arc::new(MemoryDisk::default())));
    registry.mount_share(device.clone());

    let tree = TreeConnection::new(TreeId(1), device.clone(), Permission::Writeable);

    let params = OpenParams::from_nt(NtOpenParams {
        path: "/hello.txt".to_owned(),
        desired_access: smb_filesystem_core::access_mask::NtAccessMask::NT_READ_WRITE,
        share_access: smb_filesystem_core::sharing::SharingMode::READ_WRITE,
        create_disposition: CreateDisposition::OpenIf,
        file_attributes: 0,
        create_options: 0,
        oplock_request_bits: 0,
    });

    let (id, file) = tree.open("/hello.txt", &params).await.expect("open file");
    device.disk.write_file(&file, 0, b"hello from the memory disk driver").await.expect("write file");

    let mut buf = vec![0u8; file.size() as usize];
    device.disk.read_file(&file, 0, &mut buf).await.expect("read file");
    println!("{}", String::from_utf8_lossy(&buf));

    tree.remove_file(id).await.expect("close file");
    tree.close_connection().await;
    registry.unmount_share("demo");
}
