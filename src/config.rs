//! Process-wide tunable knobs, loadable from TOML.
//!
//! Every field here mirrors a constant defined closer to the code it
//! governs (`open_file_map::MAX_FILES`, `segment::streamed_segment::
//! DEFAULT_PAGE_SIZE`, ...); this struct exists so a deployment can override
//! any of them from one config file instead of hand-wiring constructors.

use serde::Deserialize;

use crate::background_loader::{DEFAULT_MAX_RETRIES, DEFAULT_WORKER_COUNT};
use crate::error::{SmbError, SmbResult};
use crate::open_file_map::{INITIAL_FILES, MAX_FILES};
use crate::search::{DEFAULT_SEARCHES_PER_FILE, MAX_SEARCHES_PER_FILE};
use crate::segment::{DEFAULT_PAGE_SIZE, DEFAULT_SLOT_COUNT};

/// Lower/upper bounds the worker pool is clamped to regardless of what a
/// config file asks for.
pub const MIN_WORKER_THREADS: usize = 4;
pub const MAX_WORKER_THREADS: usize = 50;

pub const DEFAULT_SHORT_READ_THRESHOLD: usize = 64 * 1024;
pub const DEFAULT_SHUTDOWN_WAIT_MS: u64 = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub max_files_per_tree: usize,
    pub initial_files_per_tree: usize,
    pub hashed_open_file_map: bool,
    pub default_searches_per_file: usize,
    pub max_searches_per_file: usize,
    pub streamed_buffer_size: usize,
    pub streamed_slot_count: usize,
    pub short_read_threshold: usize,
    pub worker_thread_count: usize,
    pub shutdown_wait_ms: u64,
}

impl ServerConfig {
    /// Parses a TOML document, filling in [`Default::default`] for any
    /// field the document omits.
    pub fn from_toml_str(raw: &str) -> SmbResult<Self> {
        toml::from_str(raw).map_err(|_| SmbError::InvalidParameter)
    }

    /// Background worker count clamped to the pool's hard bounds, so a
    /// misconfigured file can't start zero workers or an unbounded flood.
    pub fn worker_thread_count(&self) -> usize {
        self.worker_thread_count.clamp(MIN_WORKER_THREADS, MAX_WORKER_THREADS)
    }

    pub fn shutdown_wait(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.shutdown_wait_ms)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            max_files_per_tree: MAX_FILES,
            initial_files_per_tree: INITIAL_FILES,
            hashed_open_file_map: true,
            default_searches_per_file: DEFAULT_SEARCHES_PER_FILE,
            max_searches_per_file: MAX_SEARCHES_PER_FILE,
            streamed_buffer_size: DEFAULT_PAGE_SIZE,
            streamed_slot_count: DEFAULT_SLOT_COUNT,
            short_read_threshold: DEFAULT_SHORT_READ_THRESHOLD,
            worker_thread_count: DEFAULT_WORKER_COUNT,
            shutdown_wait_ms: DEFAULT_SHUTDOWN_WAIT_MS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_table() {
        let config = ServerConfig::default();
        assert_eq!(config.max_files_per_tree, 8192);
        assert_eq!(config.initial_files_per_tree, 32);
        assert!(config.hashed_open_file_map);
        assert_eq!(config.default_searches_per_file, 8);
        assert_eq!(config.max_searches_per_file, 256);
        assert_eq!(config.streamed_buffer_size, 2 * 1024 * 1024);
        assert_eq!(config.streamed_slot_count, 4);
        assert_eq!(config.worker_thread_count(), 8);
        assert_eq!(config.shutdown_wait_ms, 2000);
    }

    #[test]
    fn empty_document_falls_back_to_defaults() {
        let config = ServerConfig::from_toml_str("").unwrap();
        assert_eq!(config, ServerConfig::default());
    }

    #[test]
    fn partial_override_only_changes_named_fields() {
        let config = ServerConfig::from_toml_str("worker_thread_count = 16\n").unwrap();
        assert_eq!(config.worker_thread_count(), 16);
        assert_eq!(config.max_files_per_tree, ServerConfig::default().max_files_per_tree);
    }

    #[test]
    fn worker_thread_count_is_clamped_to_the_pool_bounds() {
        let mut config = ServerConfig::default();
        config.worker_thread_count = 1;
        assert_eq!(config.worker_thread_count(), MIN_WORKER_THREADS);
        config.worker_thread_count = 1000;
        assert_eq!(config.worker_thread_count(), MAX_WORKER_THREADS);
    }
}
