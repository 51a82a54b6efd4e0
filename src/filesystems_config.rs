//! Registry of mounted shares and the per-registry expiry reaper.
//!
//! One reaper runs per [`FilesystemsConfig`], started when the first share
//! is mounted and stopped when the last is closed, so that it terminates
//! cleanly without coordinating with unrelated shares.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::disk_device_context::DiskDeviceContext;

/// How often the reaper sweeps every registered share's file-state cache.
pub const DEFAULT_REAP_INTERVAL: Duration = Duration::from_secs(60);

type ShareMap = Arc<Mutex<HashMap<String, Arc<DiskDeviceContext>>>>;

/// Registry of mounted shares. Owns one
/// [`FileStateReaper`], lazily started on the first [`Self::mount_share`]
/// and stopped on the last [`Self::unmount_share`].
pub struct FilesystemsConfig {
    shares: ShareMap,
    reaper: Mutex<Option<FileStateReaper>>,
    reap_interval: Duration,
}

impl FilesystemsConfig {
    pub fn new() -> Self {
        Self::with_reap_interval(DEFAULT_REAP_INTERVAL)
    }

    pub fn with_reap_interval(reap_interval: Duration) -> Self {
        FilesystemsConfig {
            shares: Arc::new(Mutex::new(HashMap::new())),
            reaper: Mutex::new(None),
            reap_interval,
        }
    }

    pub fn mount_share(&self, context: Arc<DiskDeviceContext>) {
        let name = context.share_name.clone();
        self.shares.lock().expect("filesystems config mutex poisoned").insert(name, context);
        self.ensure_reaper_started();
    }

    pub fn unmount_share(&self, share_name: &str) -> Option<Arc<DiskDeviceContext>> {
        let removed = self.shares.lock().expect("filesystems config mutex poisoned").remove(share_name);
        if self.shares.lock().expect("filesystems config mutex poisoned").is_empty() {
            self.stop_reaper();
        }
        removed
    }

    pub fn share(&self, share_name: &str) -> Option<Arc<DiskDeviceContext>> {
        self.shares.lock().expect("filesystems config mutex poisoned").get(share_name).cloned()
    }

    pub fn share_names(&self) -> Vec<String> {
        self.shares.lock().expect("filesystems config mutex poisoned").keys().cloned().collect()
    }

    fn ensure_reaper_started(&self) {
        let mut reaper = self.reaper.lock().expect("reaper mutex poisoned");
        if reaper.is_none() {
            *reaper = Some(FileStateReaper::start(self.shares.clone(), self.reap_interval));
        }
    }

    fn stop_reaper(&self) {
        if let Some(reaper) = self.reaper.lock().expect("reaper mutex poisoned").take() {
            reaper.stop();
        }
    }
}

impl Default for FilesystemsConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Periodic expiry scan across one [`FilesystemsConfig`]'s per-share
/// file-state caches. Reads the live share map on every
/// sweep, so shares mounted or unmounted after the reaper started are
/// picked up without restarting it.
pub struct FileStateReaper {
    stop: Arc<Notify>,
    handle: JoinHandle<()>,
}

impl FileStateReaper {
    fn start(shares: ShareMap, interval: Duration) -> Self {
        let stop = Arc::new(Notify::new());
        let stop_signal = stop.clone();
        info!("file state reaper started");
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = stop_signal.notified() => break,
                    _ = tokio::time::sleep(interval) => {
                        let snapshot: Vec<_> =
                            shares.lock().expect("filesystems config mutex poisoned").values().cloned().collect();
                        for share in snapshot {
                            if let Some(cache) = &share.file_state_cache {
                                let before = cache.entry_count();
                                cache.run_pending_tasks();
                                let after = cache.entry_count();
                                debug!(share = %share.share_name, reaped = before.saturating_sub(after), "expiry sweep");
                            }
                        }
                    }
                }
            }
            info!("file state reaper stopped");
        });
        FileStateReaper { stop, handle }
    }

    fn stop(self) {
        self.stop.notify_one();
        self.handle.abort();
    }
}
