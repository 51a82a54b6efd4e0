//! SMB/CIFS filesystem core: session/tree/handle registries, file-open
//! semantics, and the file-data streaming cache that sits between a
//! protocol front end and a concrete storage driver.
//!
//! This crate does not speak the SMB wire protocol, authenticate
//! connections, or own a transport — it is the filesystem-semantics layer a
//! protocol implementation plugs a [`interfaces::DiskInterface`] driver into.

pub mod access_mask;
pub mod access_token;
pub mod attrs;
pub mod background_loader;
pub mod bitset;
pub mod config;
pub mod disk_device_context;
pub mod disposition;
pub mod error;
pub mod file_info;
pub mod file_request;
pub mod file_state;
pub mod filesystems_config;
pub mod ids;
pub mod interfaces;
pub mod listeners;
pub mod network_file;
pub mod open_file_map;
pub mod open_params;
pub mod search;
pub mod segment;
pub mod sharing;
pub mod sharing_check;
pub mod tree_connection;

#[cfg(test)]
pub(crate) mod test_support;

/// Installs a default [`tracing_subscriber::fmt`] subscriber. Binaries and
/// examples call this; the library itself never installs one on a caller's
/// behalf.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
