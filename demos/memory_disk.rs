//! A toy in-memory [`DiskInterface`] driver.
//!
//! Backs both the `memory_disk` cargo example below and the integration
//! tests under `tests/`: a real driver is nothing more than this contract,
//! and the easiest way to prove the core against it is to write a whole one,
//! however small.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use smb_filesystem_core::error::{SmbError, SmbResult};
use smb_filesystem_core::file_info::FileInfo;
use smb_filesystem_core::ids::{Did, Fid, StreamId};
use smb_filesystem_core::interfaces::{DiskInterface, PathState};
use smb_filesystem_core::network_file::{FileTime, NetworkFile, NetworkFileFlags};
use smb_filesystem_core::open_params::OpenParams;
use smb_filesystem_core::search::{ResumeAnchor, SearchContext};

enum Entry {
    File(Vec<u8>),
    Directory(BTreeMap<String, ()>),
}

/// An in-memory tree of files and directories rooted at `/`.
pub struct MemoryDisk {
    entries: Mutex<BTreeMap<String, Entry>>,
    /// `open_file` hands back a [`NetworkFile`] that only carries a leaf
    /// name; every other call only carries that same `NetworkFile`, so the
    /// driver remembers each open fid's full path here.
    open_paths: Mutex<HashMap<u32, String>>,
    next_fid: AtomicU32,
}

impl Default for MemoryDisk {
    fn default() -> Self {
        let mut entries = BTreeMap::new();
        entries.insert("/".to_owned(), Entry::Directory(BTreeMap::new()));
        MemoryDisk {
            entries: Mutex::new(entries),
            open_paths: Mutex::new(HashMap::new()),
            next_fid: AtomicU32::new(1),
        }
    }
}

impl MemoryDisk {
    fn parent_of(path: &str) -> &str {
        match path.rsplit_once('/') {
            Some(("", _)) => "/",
            Some((parent, _)) => parent,
            None => "/",
        }
    }

    fn name_of(path: &str) -> &str {
        path.rsplit('/').next().unwrap_or(path)
    }

    fn now() -> FileTime {
        let since_epoch = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
        FileTime { seconds: since_epoch.as_secs() as i64, nanos: since_epoch.subsec_nanos() }
    }

    fn link_in_parent(entries: &mut BTreeMap<String, Entry>, path: &str) -> SmbResult<()> {
        let parent = Self::parent_of(path).to_owned();
        match entries.get_mut(&parent) {
            Some(Entry::Directory(children)) => {
                children.insert(Self::name_of(path).to_owned(), ());
                Ok(())
            }
            Some(Entry::File(_)) => Err(SmbError::PathNotFound),
            None => Err(SmbError::PathNotFound),
        }
    }

    fn unlink_from_parent(entries: &mut BTreeMap<String, Entry>, path: &str) {
        let parent = Self::parent_of(path).to_owned();
        if let Some(Entry::Directory(children)) = entries.get_mut(&parent) {
            children.remove(Self::name_of(path));
        }
    }
}

#[async_trait]
impl DiskInterface for MemoryDisk {
    async fn create_directory(&self, path: &str, _params: &OpenParams) -> SmbResult<()> {
        let mut entries = self.entries.lock().expect("memory disk mutex poisoned");
        if entries.contains_key(path) {
            return Err(SmbError::FileExists);
        }
        Self::link_in_parent(&mut entries, path)?;
        entries.insert(path.to_owned(), Entry::Directory(BTreeMap::new()));
        Ok(())
    }

    async fn delete_directory(&self, path: &str) -> SmbResult<()> {
        let mut entries = self.entries.lock().expect("memory disk mutex poisoned");
        match entries.get(path) {
            Some(Entry::Directory(children)) if !children.is_empty() => Err(SmbError::AccessDenied),
            Some(Entry::Directory(_)) => {
                entries.remove(path);
                Self::unlink_from_parent(&mut entries, path);
                Ok(())
            }
            Some(Entry::File(_)) => Err(SmbError::PathNotFound),
            None => Err(SmbError::FileNotFound),
        }
    }

    async fn open_file(&self, path: &str, params: &OpenParams) -> SmbResult<NetworkFile> {
        let mut entries = self.entries.lock().expect("memory disk mutex poisoned");
        let is_new = !entries.contains_key(path);
        if is_new {
            if params.disposition == smb_filesystem_core::disposition::CreateDisposition::Open {
                return Err(SmbError::FileNotFound);
            }
            Self::link_in_parent(&mut entries, path)?;
            entries.insert(path.to_owned(), Entry::File(Vec::new()));
        } else if params.disposition.is_overwrite() {
            if let Some(Entry::File(data)) = entries.get_mut(path) {
                data.clear();
            }
        }

        let is_directory = matches!(entries.get(path), Some(Entry::Directory(_)));
        let size = match entries.get(path) {
            Some(Entry::File(data)) => data.len() as u64,
            _ => 0,
        };

        let fid = self.next_fid.fetch_add(1, Ordering::Relaxed);
        let file = NetworkFile::new(Fid(fid), Did(0), StreamId::MAIN, Self::name_of(path));
        file.set_size(size);
        let now = Self::now();
        file.set_create_date(now);
        file.set_access_date(now);
        file.set_modify_date(now);
        file.set_change_date(now);
        if is_directory {
            file.set_flag(NetworkFileFlags::DIRECTORY);
        }
        self.open_paths.lock().expect("memory disk mutex poisoned").insert(file.fid.0, path.to_owned());
        Ok(file)
    }

    async fn close_file(&self, file: &NetworkFile) -> SmbResult<()> {
        self.open_paths.lock().expect("memory disk mutex poisoned").remove(&file.fid.0);
        Ok(())
    }

    async fn read_file(&self, file: &NetworkFile, offset: u64, buf: &mut [u8]) -> SmbResult<usize> {
        let path = self.path_of(file)?;
        let entries = self.entries.lock().expect("memory disk mutex poisoned");
        let Some(Entry::File(data)) = entries.get(&path) else { return Err(SmbError::FileNotFound) };
        let offset = offset as usize;
        if offset >= data.len() {
            return Ok(0);
        }
        let to_copy = buf.len().min(data.len() - offset);
        buf[..to_copy].copy_from_slice(&data[offset..offset + to_copy]);
        Ok(to_copy)
    }

    async fn write_file(&self, file: &NetworkFile, offset: u64, data: &[u8]) -> SmbResult<usize> {
        let path = self.path_of(file)?;
        let mut entries = self.entries.lock().expect("memory disk mutex poisoned");
        let Some(Entry::File(stored)) = entries.get_mut(&path) else {
            return Err(SmbError::FileNotFound);
        };
        let offset = offset as usize;
        if stored.len() < offset + data.len() {
            stored.resize(offset + data.len(), 0);
        }
        stored[offset..offset + data.len()].copy_from_slice(data);
        file.set_size(stored.len() as u64);
        file.mark_modify_date_dirty();
        Ok(data.len())
    }

    async fn flush_file(&self, _file: &NetworkFile) -> SmbResult<()> {
        Ok(())
    }

    async fn truncate_file(&self, file: &NetworkFile, size: u64) -> SmbResult<()> {
        let path = self.path_of(file)?;
        let mut entries = self.entries.lock().expect("memory disk mutex poisoned");
        let Some(Entry::File(stored)) = entries.get_mut(&path) else {
            return Err(SmbError::FileNotFound);
        };
        stored.resize(size as usize, 0);
        file.set_size(size);
        Ok(())
    }

    async fn delete_file(&self, path: &str) -> SmbResult<()> {
        let mut entries = self.entries.lock().expect("memory disk mutex poisoned");
        match entries.get(path) {
            Some(Entry::File(_)) => {
                entries.remove(path);
                Self::unlink_from_parent(&mut entries, path);
                Ok(())
            }
            Some(Entry::Directory(_)) => Err(SmbError::AccessDenied),
            None => Err(SmbError::FileNotFound),
        }
    }

    async fn rename_file(&self, from: &str, to: &str) -> SmbResult<()> {
        let mut entries = self.entries.lock().expect("memory disk mutex poisoned");
        if !entries.contains_key(from) {
            return Err(SmbError::FileNotFound);
        }
        if entries.contains_key(to) {
            return Err(SmbError::FileExists);
        }
        let entry = entries.remove(from).expect("checked above");
        Self::unlink_from_parent(&mut entries, from);
        Self::link_in_parent(&mut entries, to)?;
        entries.insert(to.to_owned(), entry);
        Ok(())
    }

    async fn get_file_information(&self, path: &str) -> SmbResult<FileInfo> {
        let entries = self.entries.lock().expect("memory disk mutex poisoned");
        match entries.get(path) {
            Some(Entry::File(data)) => {
                Ok(FileInfo { file_name: Self::name_of(path).to_owned(), ..FileInfo::default() }
                    .with_size(data.len() as u64))
            }
            Some(Entry::Directory(_)) => {
                Ok(FileInfo { file_name: Self::name_of(path).to_owned(), ..FileInfo::default() })
            }
            None => Err(SmbError::FileNotFound),
        }
    }

    async fn set_file_information(&self, _path: &str, _info: &FileInfo) -> SmbResult<()> {
        Ok(())
    }

    async fn file_exists(&self, path: &str) -> SmbResult<PathState> {
        let entries = self.entries.lock().expect("memory disk mutex poisoned");
        Ok(match entries.get(path) {
            Some(Entry::File(_)) => PathState::FileExists,
            Some(Entry::Directory(_)) => PathState::DirectoryExists,
            None => PathState::NotExist,
        })
    }

    async fn is_read_only(&self) -> SmbResult<bool> {
        Ok(false)
    }

    async fn start_search(&self, pattern: &str, _attr_filter: u32) -> SmbResult<Box<dyn SearchContext>> {
        let entries = self.entries.lock().expect("memory disk mutex poisoned");
        let dir = Self::directory_of_pattern(pattern);
        let names = match entries.get(dir) {
            Some(Entry::Directory(children)) => children.keys().cloned().collect(),
            _ => Vec::new(),
        };
        Ok(Box::new(DirectorySearch { names, index: 0 }))
    }
}

impl MemoryDisk {
    /// `pattern` is `<dir>/*` (the only wildcard shape this toy driver
    /// understands); strips the trailing glob to get the directory to list.
    fn directory_of_pattern(pattern: &str) -> &str {
        match pattern.trim_end_matches("/*") {
            "" => "/",
            dir => dir,
        }
    }

    fn path_of(&self, file: &NetworkFile) -> SmbResult<String> {
        self.open_paths
            .lock()
            .expect("memory disk mutex poisoned")
            .get(&file.fid.0)
            .cloned()
            .ok_or(SmbError::FileNotFound)
    }
}

struct DirectorySearch {
    names: Vec<String>,
    index: usize,
}

impl SearchContext for DirectorySearch {
    fn has_more_files(&self) -> bool {
        self.index < self.names.len()
    }

    fn next_file_info(&mut self, out: &mut FileInfo) -> SmbResult<bool> {
        let Some(name) = self.names.get(self.index) else { return Ok(false) };
        out.file_name = name.clone();
        self.index += 1;
        Ok(true)
    }

    fn next_file_name(&mut self) -> SmbResult<Option<String>> {
        let name = self.names.get(self.index).cloned();
        if name.is_some() {
            self.index += 1;
        }
        Ok(name)
    }

    fn resume_id(&self) -> u32 {
        self.index as u32
    }

    fn restart_at(&mut self, anchor: ResumeAnchor) -> SmbResult<()> {
        if let ResumeAnchor::Id(id) = anchor {
            self.index = id as usize;
        }
        Ok(())
    }

    fn close_search(&mut self) {
        self.index = self.names.len();
    }
}
