//! Per-session binding to a single shared device.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::disk_device_context::DiskDeviceContext;
use crate::error::SmbResult;
use crate::ids::{ProtocolId, TreeId};
use crate::listeners::{FileListener, ListenerList, ShareListener};
use crate::network_file::NetworkFile;
use crate::open_file_map::OpenFileMap;
use crate::open_params::OpenParams;

/// Access granted to this tree connection, either as a coarse enum or as an
/// ACL-derived integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    NoAccess,
    ReadOnly,
    Writeable,
    None,
    Acl(u32),
}

/// A per-session binding to a single shared device; scopes handle ids and
/// permissions.
pub struct TreeConnection {
    pub tree_id: TreeId,
    pub device: Arc<DiskDeviceContext>,
    pub permission: Permission,
    map: Mutex<OpenFileMap>,
    file_listeners: ListenerList<dyn FileListener>,
    closed: AtomicBool,
}

impl TreeConnection {
    /// Increments the device's active-connection counter on construction.
    pub fn new(tree_id: TreeId, device: Arc<DiskDeviceContext>, permission: Permission) -> Self {
        device.increment_connections();
        TreeConnection {
            tree_id,
            device,
            permission,
            map: Mutex::new(OpenFileMap::new_hashed()),
            file_listeners: ListenerList::new(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn with_open_file_map(tree_id: TreeId, device: Arc<DiskDeviceContext>, permission: Permission, map: OpenFileMap) -> Self {
        device.increment_connections();
        TreeConnection {
            tree_id,
            device,
            permission,
            map: Mutex::new(map),
            file_listeners: ListenerList::new(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn add_file_listener(&self, listener: Arc<dyn FileListener>) {
        self.file_listeners.add(listener);
    }

    /// Calls the disk driver to open/create the file and registers the
    /// resulting [`NetworkFile`] in this tree's [`OpenFileMap`]: "a protocol handler ... builds an OpenParams ->
    /// TreeConnection.open() calls the disk driver, which returns a
    /// NetworkFile -> the tree's OpenFileMap allocates a handle id".
    pub async fn open(&self, path: &str, params: &OpenParams) -> SmbResult<(ProtocolId, Arc<NetworkFile>)> {
        let file = Arc::new(self.device.disk.open_file(path, params).await?);
        let id = {
            let mut map = self.map.lock().expect("open file map mutex poisoned");
            map.add(self.tree_id, file.clone(), &self.file_listeners)?
        };
        debug!(tree = self.tree_id.0, id = id.0, path, "file opened");
        Ok((id, file))
    }

    pub fn add_file(&self, file: Arc<NetworkFile>) -> SmbResult<ProtocolId> {
        let mut map = self.map.lock().expect("open file map mutex poisoned");
        map.add(self.tree_id, file, &self.file_listeners)
    }

    pub fn find_file(&self, id: ProtocolId) -> Option<Arc<NetworkFile>> {
        self.map.lock().expect("open file map mutex poisoned").find(id)
    }

    /// Removes the handle from the map, calls the driver's `closeFile`, and
    /// fires `closeFile` listeners.
    pub async fn remove_file(&self, id: ProtocolId) -> SmbResult<()> {
        let file = {
            let mut map = self.map.lock().expect("open file map mutex poisoned");
            map.remove(self.tree_id, id, &self.file_listeners)
        };
        if let Some(file) = file {
            file.close_local_state(
                self.device.lock_manager.as_deref(),
                self.device.oplock_manager.as_deref(),
            );
            self.device.disk.close_file(&file).await?;
        }
        Ok(())
    }

    pub fn open_file_count(&self) -> usize {
        self.map.lock().expect("open file map mutex poisoned").open_file_count()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Iterates remaining handles, force-closes each via the driver
    /// (swallowing and logging any failure so the loop is total), fires
    /// close listeners, removes all, and decrements the device's refcount by
    /// exactly one.
    pub async fn close_connection(&self) {
        let handles = {
            let map = self.map.lock().expect("open file map mutex poisoned");
            map.iter_handles()
        };

        for id in handles {
            let file = {
                let mut map = self.map.lock().expect("open file map mutex poisoned");
                map.remove(self.tree_id, id, &self.file_listeners)
            };
            let Some(file) = file else { continue };

            file.set_flag(crate::network_file::NetworkFileFlags::FORCE_CLOSE);
            file.close_local_state(
                self.device.lock_manager.as_deref(),
                self.device.oplock_manager.as_deref(),
            );
            if let Err(err) = self.device.disk.close_file(&file).await {
                warn!(tree = self.tree_id.0, id = id.0, error = %err, "force-close: driver close_file failed; continuing");
            }
        }

        {
            let mut map = self.map.lock().expect("open file map mutex poisoned");
            map.remove_all();
        }

        self.closed.store(true, Ordering::Release);
        self.device.decrement_connections();
    }
}

/// Observes tree-connection lifecycle at the share level, dispatched from
/// [`crate::disk_device_context::DiskDeviceContext`]'s owner.
pub fn notify_tree_connected(listeners: &ListenerList<dyn ShareListener>, tree: TreeId) {
    listeners.notify(|l| l.tree_connected(tree));
}

pub fn notify_tree_disconnected(listeners: &ListenerList<dyn ShareListener>, tree: TreeId) {
    listeners.notify(|l| l.tree_disconnected(tree));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disposition::CreateDisposition;
    use crate::open_params::{NtOpenParams, OpenParams};
    use crate::test_support::StubDisk;

    fn open_params(path: &str) -> OpenParams {
        OpenParams::from_nt(NtOpenParams {
            path: path.to_owned(),
            desired_access: crate::access_mask::NtAccessMask::NT_READ_WRITE,
            share_access: crate::sharing::SharingMode::READ_WRITE,
            create_disposition: CreateDisposition::OpenIf,
            file_attributes: 0,
            create_options: 0,
            oplock_request_bits: 0,
        })
    }

    #[tokio::test]
    async fn open_then_remove_round_trips_through_the_map() {
        let device = Arc::new(DiskDeviceContext::new("share", Arc::new(StubDisk::default())));
        let tree = TreeConnection::new(TreeId(1), device, Permission::Writeable);

        let params = open_params("\\a.txt");
        let (id, file) = tree.open("\\a.txt", &params).await.unwrap();
        assert_eq!(tree.open_file_count(), 1);
        assert!(tree.find_file(id).is_some());
        assert_eq!(file.fid.0, 0);

        tree.remove_file(id).await.unwrap();
        assert_eq!(tree.open_file_count(), 0);
        assert!(tree.find_file(id).is_none());
    }

    /// Closing a tree with many open handles removes all of them and
    /// decrements the device refcount by exactly one, even though some
    /// driver `closeFile` calls fail.
    #[tokio::test]
    async fn close_connection_is_total_even_when_driver_close_fails() {
        struct FlakyCloseDisk {
            inner: StubDisk,
            close_calls: std::sync::atomic::AtomicU32,
        }

        #[async_trait::async_trait]
        impl crate::interfaces::DiskInterface for FlakyCloseDisk {
            async fn create_directory(&self, p: &str, o: &OpenParams) -> SmbResult<()> {
                self.inner.create_directory(p, o).await
            }
            async fn delete_directory(&self, p: &str) -> SmbResult<()> {
                self.inner.delete_directory(p).await
            }
            async fn open_file(&self, p: &str, o: &OpenParams) -> SmbResult<NetworkFile> {
                self.inner.open_file(p, o).await
            }
            async fn close_file(&self, f: &NetworkFile) -> SmbResult<()> {
                let n = self.close_calls.fetch_add(1, Ordering::SeqCst);
                if n % 3 == 0 {
                    return Err(crate::error::SmbError::Io(crate::error::IoErrorKind {
                        message: "simulated".to_owned(),
                    }));
                }
                self.inner.close_file(f).await
            }
            async fn read_file(&self, f: &NetworkFile, o: u64, b: &mut [u8]) -> SmbResult<usize> {
                self.inner.read_file(f, o, b).await
            }
            async fn write_file(&self, f: &NetworkFile, o: u64, d: &[u8]) -> SmbResult<usize> {
                self.inner.write_file(f, o, d).await
            }
            async fn flush_file(&self, f: &NetworkFile) -> SmbResult<()> {
                self.inner.flush_file(f).await
            }
            async fn truncate_file(&self, f: &NetworkFile, s: u64) -> SmbResult<()> {
                self.inner.truncate_file(f, s).await
            }
            async fn delete_file(&self, p: &str) -> SmbResult<()> {
                self.inner.delete_file(p).await
            }
            async fn rename_file(&self, a: &str, b: &str) -> SmbResult<()> {
                self.inner.rename_file(a, b).await
            }
            async fn get_file_information(&self, p: &str) -> SmbResult<crate::file_info::FileInfo> {
                self.inner.get_file_information(p).await
            }
            async fn set_file_information(&self, p: &str, i: &crate::file_info::FileInfo) -> SmbResult<()> {
                self.inner.set_file_information(p, i).await
            }
            async fn file_exists(&self, p: &str) -> SmbResult<crate::interfaces::PathState> {
                self.inner.file_exists(p).await
            }
            async fn is_read_only(&self) -> SmbResult<bool> {
                self.inner.is_read_only().await
            }
            async fn start_search(&self, p: &str, a: u32) -> SmbResult<Box<dyn crate::search::SearchContext>> {
                self.inner.start_search(p, a).await
            }
        }

        let disk =
            Arc::new(FlakyCloseDisk { inner: StubDisk::default(), close_calls: std::sync::atomic::AtomicU32::new(0) });
        let device = Arc::new(DiskDeviceContext::new("share", disk));
        let tree = TreeConnection::new(TreeId(1), device.clone(), Permission::Writeable);

        for i in 0..100 {
            let path = format!("\\f{i}.txt");
            tree.open(&path, &open_params(&path)).await.unwrap();
        }
        assert_eq!(tree.open_file_count(), 100);
        assert_eq!(device.active_connection_count(), 1);

        tree.close_connection().await;

        assert_eq!(tree.open_file_count(), 0);
        assert!(tree.is_closed());
        assert_eq!(device.active_connection_count(), 0);
    }
}
