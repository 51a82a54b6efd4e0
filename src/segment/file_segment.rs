//! File-backed segment: all data in a per-unique-id scratch file.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::fs::OpenOptions;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;

use crate::error::{SmbError, SmbResult};
use crate::ids::UniqueId;

use super::{DataAvailability, SegmentBackend, SegmentMonitor, SegmentStatusFlags};

/// Keeps all data in a scratch file under a per-share tempdir, named
/// `prefix + origName`. Reads/writes seek the file directly;
/// writes past the current end zero-pad.
pub struct FileSegment {
    pub unique_id: UniqueId,
    monitor: SegmentMonitor,
    temp_path: PathBuf,
    handle_closed: AtomicBool,
    io_lock: Mutex<()>,
}

impl FileSegment {
    pub fn new(unique_id: UniqueId, temp_path: PathBuf) -> Self {
        FileSegment {
            unique_id,
            monitor: SegmentMonitor::new(),
            temp_path,
            handle_closed: AtomicBool::new(false),
            io_lock: Mutex::new(()),
        }
    }

    pub fn mark_handle_closed(&self) {
        self.handle_closed.store(true, Ordering::Release);
    }

    /// Allowed only once the owning handle has been closed.
    pub async fn delete_temporary_file(&self) -> SmbResult<()> {
        if !self.handle_closed.load(Ordering::Acquire) {
            return Err(SmbError::InvalidParameter);
        }
        match tokio::fs::remove_file(&self.temp_path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    async fn open(&self) -> SmbResult<tokio::fs::File> {
        Ok(OpenOptions::new().read(true).write(true).create(true).open(&self.temp_path).await?)
    }
}

#[async_trait::async_trait]
impl SegmentBackend for FileSegment {
    fn monitor(&self) -> &SegmentMonitor {
        &self.monitor
    }

    async fn read(&self, offset: u64, buf: &mut [u8]) -> SmbResult<usize> {
        let _guard = self.io_lock.lock().await;
        let mut file = self.open().await?;
        file.seek(std::io::SeekFrom::Start(offset)).await?;
        let mut total = 0;
        loop {
            let read = file.read(&mut buf[total..]).await?;
            if read == 0 {
                break;
            }
            total += read;
            if total == buf.len() {
                break;
            }
        }
        Ok(total)
    }

    async fn write(&self, offset: u64, data: &[u8]) -> SmbResult<usize> {
        let _guard = self.io_lock.lock().await;
        let mut file = self.open().await?;
        let current_len = file.metadata().await?.len();
        if offset > current_len {
            file.set_len(offset).await?;
        }
        file.seek(std::io::SeekFrom::Start(offset)).await?;
        file.write_all(data).await?;

        let new_len = (offset + data.len() as u64).max(current_len);
        self.monitor.set_file_length(new_len).await;
        self.monitor.advance_readable_length(new_len).await;
        self.monitor.set_flag(SegmentStatusFlags::UPDATED).await;
        Ok(data.len())
    }

    async fn flush(&self) -> SmbResult<()> {
        let _guard = self.io_lock.lock().await;
        let mut file = self.open().await?;
        file.sync_all().await?;
        Ok(())
    }

    async fn truncate(&self, size: u64) -> SmbResult<()> {
        let _guard = self.io_lock.lock().await;
        let file = self.open().await?;
        file.set_len(size).await?;
        self.monitor.set_file_length(size).await;
        self.monitor.advance_readable_length(size).await;
        Ok(())
    }

    fn has_data_for(&self, _offset: u64, _len: u64) -> DataAvailability {
        // File-backed reads always go straight to the store: there is no
        // in-memory coverage to reason about.
        DataAvailability::Available
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::SegmentState;

    fn temp_file_path() -> PathBuf {
        std::env::temp_dir().join(format!("smb-core-test-{}.tmp", std::process::id()))
    }

    #[tokio::test]
    async fn write_extends_and_pads_then_read_roundtrips() {
        let path = temp_file_path();
        let segment = FileSegment::new(UniqueId(1), path.clone());

        segment.write(10, b"hello").await.unwrap();
        assert_eq!(segment.monitor().file_length().await, 15);
        assert!(segment.monitor().flags().await.contains(SegmentStatusFlags::UPDATED));

        let mut buf = vec![0u8; 15];
        segment.read(0, &mut buf).await.unwrap();
        assert_eq!(&buf[0..10], &[0u8; 10]);
        assert_eq!(&buf[10..15], b"hello");

        tokio::fs::remove_file(&path).await.ok();
    }

    #[tokio::test]
    async fn delete_before_handle_closed_is_rejected() {
        let path = temp_file_path();
        let segment = FileSegment::new(UniqueId(2), path.clone());
        segment.write(0, b"x").await.unwrap();

        assert!(matches!(segment.delete_temporary_file().await, Err(SmbError::InvalidParameter)));

        segment.mark_handle_closed();
        assert!(segment.delete_temporary_file().await.is_ok());
        let _ = SegmentState::Initial;
    }
}
