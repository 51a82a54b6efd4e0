//! Minimal stub collaborators shared by unit tests across the crate
//! (`#[cfg(test)]`-only). Not a fixture for integration tests — those use
//! the fuller reference driver under `demos/`.

#![cfg(test)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{SmbError, SmbResult};
use crate::file_info::{FileInfo, SrvDiskInfo};
use crate::ids::{Did, Fid, StreamId};
use crate::interfaces::{DiskInterface, PathState};
use crate::network_file::NetworkFile;
use crate::open_params::OpenParams;
use crate::search::{ResumeAnchor, SearchContext};

/// An in-memory [`DiskInterface`] with just enough behavior to exercise
/// [`crate::tree_connection::TreeConnection`]/[`crate::disk_device_context::DiskDeviceContext`]
/// wiring in unit tests.
#[derive(Default)]
pub(crate) struct StubDisk {
    files: Mutex<HashMap<String, Vec<u8>>>,
    next_fid: AtomicU32,
}

impl StubDisk {
    pub(crate) fn with_file(path: &str, contents: &[u8]) -> Self {
        let disk = StubDisk::default();
        disk.files.lock().unwrap().insert(path.to_owned(), contents.to_vec());
        disk
    }
}

#[async_trait]
impl DiskInterface for StubDisk {
    async fn create_directory(&self, path: &str, _params: &OpenParams) -> SmbResult<()> {
        self.files.lock().unwrap().insert(path.to_owned(), Vec::new());
        Ok(())
    }

    async fn delete_directory(&self, path: &str) -> SmbResult<()> {
        self.files.lock().unwrap().remove(path);
        Ok(())
    }

    async fn open_file(&self, path: &str, _params: &OpenParams) -> SmbResult<NetworkFile> {
        let mut files = self.files.lock().unwrap();
        let size = files.entry(path.to_owned()).or_default().len() as u64;
        drop(files);
        let fid = self.next_fid.fetch_add(1, Ordering::Relaxed);
        let file = NetworkFile::new(Fid(fid), Did(0), StreamId::MAIN, path.rsplit('\\').next().unwrap_or(path));
        file.set_size(size);
        Ok(file)
    }

    async fn close_file(&self, _file: &NetworkFile) -> SmbResult<()> {
        Ok(())
    }

    async fn read_file(&self, file: &NetworkFile, offset: u64, buf: &mut [u8]) -> SmbResult<usize> {
        let files = self.files.lock().unwrap();
        let Some(data) = files.get(&file.name) else { return Err(SmbError::FileNotFound) };
        let offset = offset as usize;
        if offset >= data.len() {
            return Ok(0);
        }
        let to_copy = buf.len().min(data.len() - offset);
        buf[..to_copy].copy_from_slice(&data[offset..offset + to_copy]);
        Ok(to_copy)
    }

    async fn write_file(&self, file: &NetworkFile, offset: u64, data: &[u8]) -> SmbResult<usize> {
        let mut files = self.files.lock().unwrap();
        let entry = files.entry(file.name.clone()).or_default();
        let offset = offset as usize;
        if entry.len() < offset + data.len() {
            entry.resize(offset + data.len(), 0);
        }
        entry[offset..offset + data.len()].copy_from_slice(data);
        file.set_size(entry.len() as u64);
        Ok(data.len())
    }

    async fn flush_file(&self, _file: &NetworkFile) -> SmbResult<()> {
        Ok(())
    }

    async fn truncate_file(&self, file: &NetworkFile, size: u64) -> SmbResult<()> {
        let mut files = self.files.lock().unwrap();
        let entry = files.entry(file.name.clone()).or_default();
        entry.resize(size as usize, 0);
        file.set_size(size);
        Ok(())
    }

    async fn delete_file(&self, path: &str) -> SmbResult<()> {
        self.files.lock().unwrap().remove(path);
        Ok(())
    }

    async fn rename_file(&self, from: &str, to: &str) -> SmbResult<()> {
        let mut files = self.files.lock().unwrap();
        if let Some(data) = files.remove(from) {
            files.insert(to.to_owned(), data);
        }
        Ok(())
    }

    async fn get_file_information(&self, path: &str) -> SmbResult<FileInfo> {
        let files = self.files.lock().unwrap();
        let Some(data) = files.get(path) else { return Err(SmbError::FileNotFound) };
        Ok(FileInfo { file_name: path.to_owned(), ..FileInfo::default() }.with_size(data.len() as u64))
    }

    async fn set_file_information(&self, _path: &str, _info: &FileInfo) -> SmbResult<()> {
        Ok(())
    }

    async fn file_exists(&self, path: &str) -> SmbResult<PathState> {
        Ok(if self.files.lock().unwrap().contains_key(path) {
            PathState::FileExists
        } else {
            PathState::NotExist
        })
    }

    async fn is_read_only(&self) -> SmbResult<bool> {
        Ok(false)
    }

    async fn start_search(&self, _pattern: &str, _attr_filter: u32) -> SmbResult<Box<dyn SearchContext>> {
        Ok(Box::new(EmptySearch))
    }
}

/// A [`SearchContext`] with no results, used where tests only need the
/// `start_search` call to succeed.
struct EmptySearch;

impl SearchContext for EmptySearch {
    fn has_more_files(&self) -> bool {
        false
    }

    fn next_file_info(&mut self, _out: &mut FileInfo) -> SmbResult<bool> {
        Ok(false)
    }

    fn next_file_name(&mut self) -> SmbResult<Option<String>> {
        Ok(None)
    }

    fn resume_id(&self) -> u32 {
        0
    }

    fn restart_at(&mut self, _anchor: ResumeAnchor) -> SmbResult<()> {
        Ok(())
    }

    fn close_search(&mut self) {}
}

pub(crate) fn disk_size_info() -> SrvDiskInfo {
    SrvDiskInfo { total_units: 1000, free_units: 500, block_size: 512, blocks_per_unit: 8 }
}
