//! Worker pool dispatching queued [`FileRequest`]s against an external store.
//!
//! The pool itself is plumbing: it pulls requests off the two queues and
//! hands them to a [`LoaderBackend`], which is the only thing that actually
//! talks to the remote store. Segment state transitions and retry/shutdown
//! bookkeeping live here since they're shared by every backend.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{error, warn};

use crate::error::SmbResult;
use crate::file_request::{FileRequest, FileRequestKind, FileRequestQueue, MultipleFileRequest, SingleFileRequest, WriteRequestQueue};
use crate::network_file::NetworkFileFlags;
use crate::segment::{SegmentInfo, SegmentStatusFlags};

/// Default worker count; callers should clamp to the configured
/// `worker_thread_count` (bounds 4-50).
pub const DEFAULT_WORKER_COUNT: usize = 8;

/// Bound on how many times a request is requeued before it is surfaced as a
/// terminal error.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// The store-facing half of the background loader: fetches a
/// file's bytes into the local cache, pushes dirty bytes back out, or
/// deletes a batch of files from the store. Everything else about dispatch,
/// retries, segment transitions, delayed-write propagation, is the loader's
/// job, not the backend's.
#[async_trait]
pub trait LoaderBackend: Send + Sync {
    async fn load(&self, request: &SingleFileRequest) -> SmbResult<Vec<u8>>;
    async fn save(&self, request: &SingleFileRequest, data: &[u8]) -> SmbResult<()>;
    async fn delete(&self, request: &MultipleFileRequest) -> SmbResult<()>;
}

/// What a single dispatch attempt decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Success,
    Requeue,
    Error,
}

/// A fixed pool of `tokio::task`s pulling from [`FileRequestQueue`] (loads and
/// deletes) and [`WriteRequestQueue`] (saves), dispatching each to a
/// [`LoaderBackend`].
pub struct BackgroundFileLoader {
    stop: Arc<Notify>,
    workers: Vec<JoinHandle<()>>,
    shutdown_wait: Duration,
}

impl BackgroundFileLoader {
    /// Spawns `worker_count` tasks (clamped to 4-50), each alternating
    /// between the load/delete queue and the write queue.
    pub fn start(
        queue: Arc<FileRequestQueue>,
        write_queue: Arc<WriteRequestQueue>,
        backend: Arc<dyn LoaderBackend>,
        worker_count: usize,
        max_retries: u32,
        shutdown_wait: Duration,
    ) -> Self {
        let worker_count = worker_count.clamp(4, 50);
        let stop = Arc::new(Notify::new());
        let mut workers = Vec::with_capacity(worker_count);

        for id in 0..worker_count {
            let queue = queue.clone();
            let write_queue = write_queue.clone();
            let backend = backend.clone();
            let stop_signal = stop.clone();
            workers.push(tokio::spawn(async move {
                worker_loop(id, queue, write_queue, backend, max_retries, stop_signal).await;
            }));
        }

        BackgroundFileLoader { stop, workers, shutdown_wait }
    }

    /// Requests a graceful shutdown: workers finish whatever they're
    /// currently dispatching, then exit once they observe the stop signal.
    /// Waits up to `shutdown_wait_ms` before giving up and returning;
    /// only a grace window is promised, not unbounded blocking.
    pub async fn shutdown(self) {
        self.stop.notify_waiters();
        let _ = tokio::time::timeout(self.shutdown_wait, join_all(self.workers)).await;
    }

    /// Aborts every worker immediately rather than waiting for in-flight
    /// work to drain. Any save
    /// left mid-flight is the caller's responsibility to surface as a
    /// delayed-write error; `propagate_delayed_write_error` does that for a
    /// request known to be in flight.
    pub fn shutdown_immediate(self) {
        self.stop.notify_waiters();
        for worker in self.workers {
            worker.abort();
        }
    }
}

async fn join_all(workers: Vec<JoinHandle<()>>) {
    for worker in workers {
        let _ = worker.await;
    }
}

async fn worker_loop(
    worker_id: usize,
    queue: Arc<FileRequestQueue>,
    write_queue: Arc<WriteRequestQueue>,
    backend: Arc<dyn LoaderBackend>,
    max_retries: u32,
    stop: Arc<Notify>,
) {
    loop {
        let request = tokio::select! {
            biased;
            _ = stop.notified() => break,
            request = queue.remove_head() => request,
            request = write_queue.remove_head() => request,
        };

        match dispatch(&request, backend.as_ref()).await {
            DispatchOutcome::Success => {}
            DispatchOutcome::Requeue => requeue(request, &queue, &write_queue, max_retries),
            DispatchOutcome::Error => {
                error!(worker = worker_id, "background request failed permanently");
            }
        }
    }
}

/// Resubmits a request that asked to be retried, tracking attempts via a
/// retry counter carried as an attribute. Once `max_retries` is exceeded,
/// reports the terminal failure and, for saves, sets `DelayedWriteError` on
/// every bound handle.
fn requeue(mut request: FileRequest, queue: &FileRequestQueue, write_queue: &WriteRequestQueue, max_retries: u32) {
    let attempts: u32 = request.attributes.get("retry_count").and_then(|v| v.parse().ok()).unwrap_or(0);
    if attempts >= max_retries {
        if let FileRequestKind::Save(single) | FileRequestKind::TransactionalSave(single) = &request.kind {
            propagate_delayed_write_error(single);
        }
        error!(attempts, "request exceeded retry budget, surfacing as error");
        return;
    }

    request = request.with_attribute("retry_count", (attempts + 1).to_string());
    match &request.kind {
        FileRequestKind::Load(_) | FileRequestKind::Delete(_) => queue.requeue(request),
        FileRequestKind::Save(_) | FileRequestKind::TransactionalSave(_) => write_queue.add(request),
    }
}

fn propagate_delayed_write_error(request: &SingleFileRequest) {
    for file in &request.bound_files {
        file.set_flag(NetworkFileFlags::DELAYED_WRITE_ERROR);
    }
    warn!(fid = request.fid.0, bound = request.bound_files.len(), "delayed write error surfaced");
}

async fn dispatch(request: &FileRequest, backend: &dyn LoaderBackend) -> DispatchOutcome {
    match &request.kind {
        FileRequestKind::Load(single) => dispatch_load(single, backend).await,
        FileRequestKind::Save(single) => dispatch_save(single, backend, false).await,
        FileRequestKind::TransactionalSave(single) => dispatch_save(single, backend, true).await,
        FileRequestKind::Delete(batch) => dispatch_delete(batch, backend).await,
    }
}

async fn dispatch_load(request: &SingleFileRequest, backend: &dyn LoaderBackend) -> DispatchOutcome {
    let Some(segment) = request.file_state.segment.clone() else { return DispatchOutcome::Success };

    match backend.load(request).await {
        Ok(data) => match segment.complete_load(0, data, false).await {
            Ok(()) => DispatchOutcome::Success,
            Err(err) => {
                warn!(error = %err, "ingesting loaded data failed");
                segment.fail(SegmentStatusFlags::READ_ERROR).await;
                DispatchOutcome::Error
            }
        },
        Err(err) => {
            warn!(error = %err, fid = request.fid.0, "load from store failed");
            segment.fail(SegmentStatusFlags::READ_ERROR).await;
            DispatchOutcome::Error
        }
    }
}

async fn dispatch_save(request: &SingleFileRequest, backend: &dyn LoaderBackend, transactional: bool) -> DispatchOutcome {
    let Some(segment) = request.file_state.segment.clone() else { return DispatchOutcome::Success };

    let chunk = segment.data_to_save().await;
    let result = match chunk {
        Some(data) => backend.save(request, &data).await,
        None => {
            // File/memory-backed segments save their whole current extent
            // rather than a discrete chunk.
            let mut buf = vec![0u8; segment.monitor().readable_length().await as usize];
            match segment.read(0, &mut buf).await {
                Ok(n) => backend.save(request, &buf[..n]).await,
                Err(err) => Err(err),
            }
        }
    };

    match result {
        Ok(()) => {
            segment.data_saved().await;
            segment.complete_save().await;
            DispatchOutcome::Success
        }
        Err(err) => {
            warn!(error = %err, fid = request.fid.0, transactional, "save to store failed");
            segment.monitor().set_flag(SegmentStatusFlags::WRITE_ERROR).await;
            DispatchOutcome::Requeue
        }
    }
}

async fn dispatch_delete(request: &MultipleFileRequest, backend: &dyn LoaderBackend) -> DispatchOutcome {
    match backend.delete(request).await {
        Ok(()) => DispatchOutcome::Success,
        Err(err) => {
            warn!(error = %err, count = request.files.len(), "batch delete failed");
            DispatchOutcome::Error
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_request::{fresh_file_state, OwningTaskId};
    use crate::ids::{Fid, StreamId, UniqueId};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingBackend {
        loads: AtomicUsize,
        saves: Mutex<Vec<Vec<u8>>>,
        fail_saves_until: AtomicUsize,
    }

    #[async_trait]
    impl LoaderBackend for RecordingBackend {
        async fn load(&self, _request: &SingleFileRequest) -> SmbResult<Vec<u8>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(b"hello".to_vec())
        }

        async fn save(&self, _request: &SingleFileRequest, data: &[u8]) -> SmbResult<()> {
            let remaining = self.fail_saves_until.load(Ordering::SeqCst);
            if remaining > 0 {
                self.fail_saves_until.fetch_sub(1, Ordering::SeqCst);
                return Err(crate::error::SmbError::Io(crate::error::IoErrorKind { message: "simulated".to_owned() }));
            }
            self.saves.lock().unwrap().push(data.to_vec());
            Ok(())
        }

        async fn delete(&self, _request: &MultipleFileRequest) -> SmbResult<()> {
            Ok(())
        }
    }

    fn single_request(segment: Option<Arc<SegmentInfo>>) -> SingleFileRequest {
        let mut file_state = fresh_file_state(UniqueId(1));
        file_state.segment = segment;
        SingleFileRequest {
            fid: Fid(1),
            stid: StreamId::MAIN,
            temp_path: "/tmp/x".to_owned(),
            virtual_path: "\\x".to_owned(),
            file_state,
            sequence_number: 1,
            bound_files: Vec::new(),
        }
    }

    #[tokio::test]
    async fn load_dispatch_ingests_into_the_segment_and_marks_it_available() {
        let segment = SegmentInfo::new_in_memory(UniqueId(1));
        segment.monitor().transition(crate::segment::SegmentState::Loading).await;
        let backend = RecordingBackend::default();
        let request = single_request(Some(segment.clone()));

        let outcome = dispatch_load(&request, &backend).await;

        assert_eq!(outcome, DispatchOutcome::Success);
        assert_eq!(backend.loads.load(Ordering::SeqCst), 1);
        assert_eq!(segment.monitor().state().await, crate::segment::SegmentState::Available);
        assert_eq!(segment.monitor().readable_length().await, 5);
    }

    #[tokio::test]
    async fn save_dispatch_failure_requeues_and_sets_write_error() {
        let segment = SegmentInfo::new_in_memory(UniqueId(1));
        segment.write(0, b"dirty").await.unwrap();
        segment.monitor().transition(crate::segment::SegmentState::Available).await;
        let backend = RecordingBackend { fail_saves_until: AtomicUsize::new(1), ..Default::default() };
        let request = single_request(Some(segment.clone()));

        let outcome = dispatch_save(&request, &backend, false).await;

        assert_eq!(outcome, DispatchOutcome::Requeue);
        assert!(segment.monitor().flags().await.contains(SegmentStatusFlags::WRITE_ERROR));
    }

    #[tokio::test]
    async fn requeue_past_retry_budget_sets_delayed_write_error_on_bound_files() {
        let queue = FileRequestQueue::new();
        let write_queue = WriteRequestQueue::new();
        let file = Arc::new(crate::network_file::NetworkFile::new(Fid(1), crate::ids::Did(0), StreamId::MAIN, "x"));

        let mut single = single_request(None);
        single.bound_files = vec![file.clone()];
        let mut request = FileRequest::save(OwningTaskId(1), single);
        request = request.with_attribute("retry_count", "3");

        requeue(request, &queue, &write_queue, 3);

        assert!(queue.is_empty());
        assert!(write_queue.is_empty());
        assert!(file.flags().contains(NetworkFileFlags::DELAYED_WRITE_ERROR));
    }

    #[tokio::test]
    async fn worker_pool_processes_a_load_request_end_to_end() {
        let queue = Arc::new(FileRequestQueue::new());
        let write_queue = Arc::new(WriteRequestQueue::new());
        let backend = Arc::new(RecordingBackend::default());
        let segment = SegmentInfo::new_in_memory(UniqueId(1));
        segment.monitor().transition(crate::segment::SegmentState::Loading).await;

        let loader = BackgroundFileLoader::start(queue.clone(), write_queue, backend.clone(), 4, 3, Duration::from_millis(200));

        queue.add(FileRequest::load(OwningTaskId(1), single_request(Some(segment.clone()))));

        for _ in 0..50 {
            if segment.monitor().state().await == crate::segment::SegmentState::Available {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert_eq!(segment.monitor().state().await, crate::segment::SegmentState::Available);
        loader.shutdown().await;
    }
}
