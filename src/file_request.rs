//! Work items queued between protocol threads and the background store
//! workers.

use std::collections::HashMap;
use std::sync::Arc;

use crossbeam_queue::SegQueue;
use tokio::sync::Notify;

use crate::file_state::FileState;
use crate::ids::{Fid, StreamId};
use crate::network_file::NetworkFile;

/// Identifies the task/connection that enqueued a request, for logging and
/// for attributing delayed-write errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OwningTaskId(pub u64);

/// Optional transaction binding carried by a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionBinding {
    pub transaction_id: u64,
    /// True when this is the last request belonging to the transaction, so
    /// the processor knows to commit rather than wait for more.
    pub last_of_transaction: bool,
}

/// A single-file load/save/delete request:
/// `(fid, stid, temp-path, virtual-path, file-state, sequence number)`.
#[derive(Clone)]
pub struct SingleFileRequest {
    pub fid: Fid,
    pub stid: StreamId,
    pub temp_path: String,
    pub virtual_path: String,
    pub file_state: FileState,
    pub sequence_number: u64,
    /// Every open handle currently bound to this request's segment, so a
    /// `DelayedWriteError` can be set on each of them.
    pub bound_files: Vec<Arc<NetworkFile>>,
}

/// One file's metadata as carried by a [`MultipleFileRequest`].
#[derive(Clone)]
pub struct CachedFileInfo {
    pub fid: Fid,
    pub virtual_path: String,
    pub file_state: FileState,
}

/// A batch load/save/delete request across several files.
#[derive(Clone)]
pub struct MultipleFileRequest {
    pub files: Vec<CachedFileInfo>,
}

/// The kind of work a [`FileRequest`] asks the background loader to perform.
#[derive(Clone)]
pub enum FileRequestKind {
    Load(SingleFileRequest),
    Save(SingleFileRequest),
    TransactionalSave(SingleFileRequest),
    Delete(MultipleFileRequest),
}

/// A queued item, annotated with the attributes every kind carries.
#[derive(Clone)]
pub struct FileRequest {
    pub kind: FileRequestKind,
    pub owner: OwningTaskId,
    pub transaction: Option<TransactionBinding>,
    pub attributes: HashMap<String, String>,
}

impl FileRequest {
    pub fn load(owner: OwningTaskId, request: SingleFileRequest) -> Self {
        FileRequest { kind: FileRequestKind::Load(request), owner, transaction: None, attributes: HashMap::new() }
    }

    pub fn save(owner: OwningTaskId, request: SingleFileRequest) -> Self {
        FileRequest { kind: FileRequestKind::Save(request), owner, transaction: None, attributes: HashMap::new() }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_transaction(mut self, binding: TransactionBinding) -> Self {
        self.transaction = Some(binding);
        self
    }

    /// The sequence number of the underlying single-file request, used by
    /// the loader to track retries; `None` for batch requests.
    pub fn sequence_number(&self) -> Option<u64> {
        match &self.kind {
            FileRequestKind::Load(r) | FileRequestKind::Save(r) | FileRequestKind::TransactionalSave(r) => {
                Some(r.sequence_number)
            }
            FileRequestKind::Delete(_) => None,
        }
    }
}

/// A FIFO queue that blocks `remove_head` on empty. Built on
/// `crossbeam_queue::SegQueue` for the lock-free body plus a `Notify` for
/// the blocking wakeup.
pub struct FileRequestQueue {
    queue: SegQueue<FileRequest>,
    non_empty: Notify,
}

impl FileRequestQueue {
    pub fn new() -> Self {
        FileRequestQueue { queue: SegQueue::new(), non_empty: Notify::new() }
    }

    pub fn add(&self, request: FileRequest) {
        self.queue.push(request);
        self.non_empty.notify_one();
    }

    /// Requeues to the tail, for the `Requeue` dispatch outcome.
    pub fn requeue(&self, request: FileRequest) {
        self.add(request);
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Pops the head, waiting if the queue is currently empty.
    pub async fn remove_head(&self) -> FileRequest {
        loop {
            if let Some(request) = self.queue.pop() {
                return request;
            }
            let notified = self.non_empty.notified();
            // Re-check after registering for notification to avoid missing
            // a concurrent push between the `pop` above and this wait.
            if let Some(request) = self.queue.pop() {
                return request;
            }
            notified.await;
        }
    }

    pub fn try_remove_head(&self) -> Option<FileRequest> {
        self.queue.pop()
    }
}

impl Default for FileRequestQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// The write-path specialization of [`FileRequestQueue`]: same blocking-on-empty contract, kept as a
/// distinct type so save-side backpressure can be reasoned about
/// independently of the load queue.
pub struct WriteRequestQueue {
    inner: FileRequestQueue,
}

impl WriteRequestQueue {
    pub fn new() -> Self {
        WriteRequestQueue { inner: FileRequestQueue::new() }
    }

    pub fn add(&self, request: FileRequest) {
        self.inner.add(request);
    }

    pub async fn remove_head(&self) -> FileRequest {
        self.inner.remove_head().await
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl Default for WriteRequestQueue {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn fresh_file_state(unique_id: crate::ids::UniqueId) -> FileState {
    FileState::new(unique_id)
}

pub(crate) type SharedQueue = Arc<FileRequestQueue>;
