//! Streamed segment: fixed-size pages for files too large to hold in memory.
//! The page buffers are plain heap-allocated `Vec<u8>`, a simplified, safe
//! stand-in for an intrusive linked-list allocator, generalized here from a
//! single free-list into the rx/tx/out-of-sequence lists this backend needs.

use tokio::sync::{Mutex, Notify};

use crate::error::SmbResult;
use crate::ids::UniqueId;

use super::{too_many_buffers, DataAvailability, SegmentBackend, SegmentMonitor, SegmentStatusFlags};

pub const DEFAULT_PAGE_SIZE: usize = 2 * 1024 * 1024;
pub const DEFAULT_SLOT_COUNT: usize = 4;

/// A fixed-size in-sequence or out-of-sequence buffer.
struct Page {
    offset: u64,
    data: Vec<u8>,
    /// Bytes of `data` actually populated, from the front.
    used_length: usize,
    written: bool,
}

impl Page {
    fn end(&self) -> u64 {
        self.offset + self.used_length as u64
    }

    fn covers(&self, offset: u64, len: u64) -> bool {
        offset >= self.offset && offset + len <= self.end()
    }

    fn contains_prefix(&self, offset: u64) -> bool {
        offset >= self.offset && offset < self.end()
    }
}

struct Inner {
    page_size: usize,
    slot_count: usize,
    file_length: u64,
    rx: Vec<Page>,
    tx: Vec<Page>,
    out_of_sequence: Vec<Page>,
    read_cursor: u64,
    next_write_offset: u64,
    closed: bool,
}

impl Inner {
    fn new(page_size: usize, slot_count: usize) -> Self {
        Inner {
            page_size,
            slot_count,
            file_length: 0,
            rx: Vec::new(),
            tx: Vec::new(),
            out_of_sequence: Vec::new(),
            read_cursor: 0,
            next_write_offset: 0,
            closed: false,
        }
    }

    const SHORT_READ_THRESHOLD: u64 = 4096;

    /// Implements the streamed `hasDataFor` decision tree.
    fn has_data_for(&self, mut offset: u64, mut len: u64) -> DataAvailability {
        if self.rx.is_empty() && self.file_length > 0 {
            if offset == 0 && len > Self::SHORT_READ_THRESHOLD {
                return DataAvailability::Loadable;
            }
            if len <= Self::SHORT_READ_THRESHOLD
                || offset > self.read_cursor + self.page_size as u64
            {
                return DataAvailability::LoadableOutOfSeq;
            }
            return DataAvailability::Loadable;
        }

        for page in &self.rx {
            if page.covers(offset, len) {
                return DataAvailability::Available;
            }
            if page.contains_prefix(offset) {
                let covered = page.end() - offset;
                offset += covered;
                len = len.saturating_sub(covered);
                if len == 0 {
                    return DataAvailability::Available;
                }
            }
        }

        for page in &self.out_of_sequence {
            if page.covers(offset, len) {
                return DataAvailability::Available;
            }
        }

        if offset < self.file_length {
            return DataAvailability::LoadableOutOfSeq;
        }

        DataAvailability::NotAvailable
    }

    /// Copies from whichever rx/out-of-sequence page(s) cover the range,
    /// straddling two pages if necessary.
    fn copy_from_pages(&mut self, mut offset: u64, buf: &mut [u8]) -> usize {
        let mut written = 0;
        let candidates: Vec<usize> = (0..self.rx.len()).collect();

        for idx in candidates {
            let page = &self.rx[idx];
            if !page.contains_prefix(offset) {
                continue;
            }
            let page_off = (offset - page.offset) as usize;
            let available = page.used_length - page_off;
            let to_copy = available.min(buf.len() - written);
            buf[written..written + to_copy].copy_from_slice(&page.data[page_off..page_off + to_copy]);
            written += to_copy;
            offset += to_copy as u64;
            if written == buf.len() {
                break;
            }
        }

        if written < buf.len() {
            for page in &self.out_of_sequence {
                if !page.contains_prefix(offset) {
                    continue;
                }
                let page_off = (offset - page.offset) as usize;
                let available = page.used_length - page_off;
                let to_copy = available.min(buf.len() - written);
                buf[written..written + to_copy]
                    .copy_from_slice(&page.data[page_off..page_off + to_copy]);
                written += to_copy;
                break;
            }
        }

        written
    }

    /// Advances the read cursor and purges rx buffers fully behind it that
    /// are not marked written; resets to empty at end-of-file.
    fn advance_read_cursor(&mut self, new_cursor: u64) {
        self.read_cursor = new_cursor;
        if self.read_cursor >= self.file_length {
            self.rx.clear();
            self.read_cursor = 0;
            return;
        }
        self.rx.retain(|page| page.end() > self.read_cursor || page.written);
    }

    /// Drops a fully-consumed out-of-sequence page on a non-short read;
    /// short out-of-sequence reads stay cached.
    fn maybe_drop_out_of_sequence(&mut self, offset: u64, len: u64) {
        if len <= Self::SHORT_READ_THRESHOLD {
            return;
        }
        self.out_of_sequence.retain(|page| !(page.offset <= offset && offset + len <= page.end()));
    }

    fn find_or_alloc_tx(&mut self, offset: u64) -> Option<usize> {
        let appendable = |p: &Page| {
            p.used_length < self.page_size && (p.contains_prefix(offset) || offset == p.end())
        };
        if let Some(idx) = self.tx.iter().position(|p| appendable(p)) {
            return Some(idx);
        }
        if self.tx.len() >= self.slot_count {
            return None;
        }
        self.tx.push(Page { offset, data: vec![0u8; self.page_size], used_length: 0, written: true });
        Some(self.tx.len() - 1)
    }

    /// Returns the head tx buffer iff it's full or the segment is closed and
    /// its offset equals `next_write_offset`.
    fn data_to_save(&self) -> Option<usize> {
        let head = self.tx.first()?;
        if head.offset != self.next_write_offset {
            return None;
        }
        if head.used_length == self.page_size || self.closed {
            Some(0)
        } else {
            None
        }
    }

    fn data_saved(&mut self) {
        if self.tx.is_empty() {
            return;
        }
        let page = self.tx.remove(0);
        self.next_write_offset += page.used_length as u64;
    }

    fn truncate(&mut self, size: u64) {
        if size == 0 {
            self.rx.clear();
            self.tx.clear();
            self.out_of_sequence.clear();
            self.file_length = 0;
            self.read_cursor = 0;
            self.next_write_offset = 0;
            return;
        }

        self.rx.retain(|p| p.offset < size);
        self.tx.retain(|p| p.offset < size);
        self.out_of_sequence.retain(|p| p.offset < size);

        for page in self.rx.iter_mut().chain(self.tx.iter_mut()).chain(self.out_of_sequence.iter_mut()) {
            if page.end() > size {
                page.used_length = (size - page.offset) as usize;
            }
        }

        self.file_length = size;
    }
}

/// Page-oriented segment for files larger than the in-memory budget.
pub struct StreamedSegment {
    pub unique_id: UniqueId,
    monitor: SegmentMonitor,
    inner: Mutex<Inner>,
    write_buffer_available: Notify,
}

impl StreamedSegment {
    pub fn new(unique_id: UniqueId, page_size: usize, slot_count: usize) -> Self {
        let page_size = if page_size == 0 { DEFAULT_PAGE_SIZE } else { page_size };
        let slot_count = if slot_count == 0 { DEFAULT_SLOT_COUNT } else { slot_count };
        StreamedSegment {
            unique_id,
            monitor: SegmentMonitor::new(),
            inner: Mutex::new(Inner::new(page_size, slot_count)),
            write_buffer_available: Notify::new(),
        }
    }

    /// Waits for a tx slot to free up, or for `timeout` to elapse.
    pub async fn wait_for_write_buffer(&self, timeout: std::time::Duration) {
        let notified = self.write_buffer_available.notified();
        tokio::select! {
            _ = notified => {}
            _ = tokio::time::sleep(timeout) => {}
        }
    }

    /// Returns the head tx buffer's bytes ready to persist, iff it is full
    /// or the segment has been closed and its offset is next in line.
    pub async fn data_to_save(&self) -> Option<Vec<u8>> {
        let inner = self.inner.lock().await;
        let idx = inner.data_to_save()?;
        Some(inner.tx[idx].data[..inner.tx[idx].used_length].to_vec())
    }

    /// Removes the head tx buffer, advances `next_write_offset`, and wakes
    /// any writer waiting for a free slot.
    pub async fn data_saved(&self) {
        let mut inner = self.inner.lock().await;
        inner.data_saved();
        drop(inner);
        self.write_buffer_available.notify_waiters();
    }

    pub async fn mark_closed(&self) {
        let mut inner = self.inner.lock().await;
        inner.closed = true;
    }

    /// Called by the background loader once a page has been fetched from
    /// the store, appending it to the rx list (or the out-of-sequence list
    /// for reads that didn't follow the sequential cursor) and advancing the
    /// readable-length contract.
    pub async fn ingest_loaded_page(&self, offset: u64, data: Vec<u8>, out_of_sequence: bool) {
        let used_length = data.len();
        let page = Page { offset, data, used_length, written: false };
        let new_readable;
        {
            let mut inner = self.inner.lock().await;
            if out_of_sequence {
                inner.out_of_sequence.push(page);
            } else {
                inner.rx.push(page);
            }
            new_readable = inner.rx.iter().map(Page::end).max().unwrap_or(0).max(inner.read_cursor);
        }
        self.monitor.advance_readable_length(new_readable).await;
    }
}

#[async_trait::async_trait]
impl SegmentBackend for StreamedSegment {
    fn monitor(&self) -> &SegmentMonitor {
        &self.monitor
    }

    async fn read(&self, offset: u64, buf: &mut [u8]) -> SmbResult<usize> {
        let mut inner = self.inner.lock().await;
        let copied = inner.copy_from_pages(offset, buf);
        let new_cursor = offset + copied as u64;
        inner.maybe_drop_out_of_sequence(offset, copied as u64);
        inner.advance_read_cursor(new_cursor);
        Ok(copied)
    }

    /// Rejects writes below `next_write_offset` (already swallowed by the
    /// store); finds or allocates a tx buffer, failing with `MaxBuffers`
    /// when the slot limit is hit and the write doesn't fit the current
    /// buffer.
    async fn write(&self, offset: u64, data: &[u8]) -> SmbResult<usize> {
        let mut inner = self.inner.lock().await;
        if offset < inner.next_write_offset {
            return Err(crate::error::SmbError::InvalidParameter);
        }

        let Some(idx) = inner.find_or_alloc_tx(offset) else {
            return Err(too_many_buffers());
        };

        let page_size = inner.page_size;
        let page = &mut inner.tx[idx];
        let page_off = (offset - page.offset) as usize;
        if page_off + data.len() > page_size {
            return Err(too_many_buffers());
        }
        page.data[page_off..page_off + data.len()].copy_from_slice(data);
        page.used_length = page.used_length.max(page_off + data.len());
        let filled = page.used_length == page_size;

        let new_len = (offset + data.len() as u64).max(inner.file_length);
        inner.file_length = new_len;
        drop(inner);

        self.monitor.set_file_length(new_len).await;
        self.monitor.set_flag(SegmentStatusFlags::UPDATED).await;
        if filled {
            self.monitor.set_flag(SegmentStatusFlags::REQUEST_QUEUED).await;
        }
        Ok(data.len())
    }

    async fn flush(&self) -> SmbResult<()> {
        self.mark_closed().await;
        Ok(())
    }

    async fn truncate(&self, size: u64) -> SmbResult<()> {
        let mut inner = self.inner.lock().await;
        inner.truncate(size);
        drop(inner);
        self.monitor.set_file_length(size).await;
        self.monitor.advance_readable_length(size).await;
        Ok(())
    }

    fn has_data_for(&self, offset: u64, len: u64) -> DataAvailability {
        match self.inner.try_lock() {
            Ok(inner) => inner.has_data_for(offset, len),
            Err(_) => DataAvailability::Loading,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_below_next_write_offset_is_rejected() {
        let segment = StreamedSegment::new(UniqueId(1), 16, 2);
        segment.write(0, b"0123456789012345").await.unwrap();
        segment.data_to_save().await;
        segment.data_saved().await;

        assert!(segment.write(0, b"x").await.is_err());
    }

    #[tokio::test]
    async fn tx_buffers_fill_and_report_saveable() {
        let segment = StreamedSegment::new(UniqueId(1), 4, 2);
        segment.write(0, b"ab").await.unwrap();
        assert!(segment.data_to_save().await.is_none());
        segment.write(2, b"cd").await.unwrap();
        let saveable = segment.data_to_save().await;
        assert_eq!(saveable, Some(b"abcd".to_vec()));
    }

    #[tokio::test]
    async fn data_saved_advances_next_write_offset_and_allows_continued_writes() {
        let segment = StreamedSegment::new(UniqueId(1), 4, 1);
        segment.write(0, b"abcd").await.unwrap();
        segment.data_saved().await;
        // next_write_offset is now 4; a write starting there should succeed.
        assert!(segment.write(4, b"ef").await.is_ok());
    }

    #[tokio::test]
    async fn max_buffers_error_when_slots_exhausted() {
        let segment = StreamedSegment::new(UniqueId(1), 4, 1);
        segment.write(0, b"ab").await.unwrap();
        // Slot 0 is still open (not full, not saved); a write at a
        // non-overlapping offset needs a second slot, which isn't available.
        let result = segment.write(8, b"zz").await;
        assert!(matches!(result, Err(crate::error::SmbError::MaxBuffers)));
    }

    #[tokio::test]
    async fn truncate_to_zero_drops_everything() {
        let segment = StreamedSegment::new(UniqueId(1), 16, 2);
        segment.write(0, b"hello").await.unwrap();
        segment.truncate(0).await.unwrap();
        assert_eq!(segment.monitor().file_length().await, 0);
    }
}
