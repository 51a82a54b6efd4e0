//! Listener dispatch.
//!
//! The source models `FileListener`/`ShareListener`/`FileStateCacheListener`
//! as single-method observer interfaces. A small vector of callbacks
//! suffices; errors are caught and logged, never allowed to break the
//! enclosing fire loop.

use std::sync::Mutex;

use tracing::warn;

use crate::ids::{ProtocolId, TreeId};
use crate::network_file::NetworkFile;

/// Observes open/close events on a tree's [`crate::open_file_map::OpenFileMap`].
pub trait FileListener: Send + Sync {
    /// Fired *before* the handle id is returned to the caller.
    fn open_file(&self, tree: TreeId, id: ProtocolId, file: &NetworkFile) -> Result<(), String>;

    /// Fired *after* the driver's `closeFile` returns and the map slot is
    /// cleared.
    fn close_file(&self, tree: TreeId, id: ProtocolId, file: &NetworkFile) -> Result<(), String>;
}

/// Observes share (tree connection) lifecycle events.
pub trait ShareListener: Send + Sync {
    fn tree_connected(&self, tree: TreeId) -> Result<(), String>;
    fn tree_disconnected(&self, tree: TreeId) -> Result<(), String>;
}

/// Observes expiry sweeps of a per-share file-state cache.
pub trait FileStateCacheListener: Send + Sync {
    fn state_expired(&self, unique_id: u64) -> Result<(), String>;
}

/// A dispatch vector of fallible single-method callbacks. Every call is
/// swallowed-and-logged: a misbehaving listener can never abort the fire
/// loop or propagate past [`ListenerList::notify`].
pub struct ListenerList<L: ?Sized> {
    listeners: Mutex<Vec<std::sync::Arc<L>>>,
}

impl<L: ?Sized> Default for ListenerList<L> {
    fn default() -> Self {
        Self { listeners: Mutex::new(Vec::new()) }
    }
}

impl<L: ?Sized> ListenerList<L> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, listener: std::sync::Arc<L>) {
        self.listeners.lock().expect("listener list mutex poisoned").push(listener);
    }

    /// Invokes `call` against every registered listener, logging (not
    /// propagating) any `Err` it returns.
    pub fn notify(&self, mut call: impl FnMut(&L) -> Result<(), String>) {
        let snapshot: Vec<_> = self.listeners.lock().expect("listener list mutex poisoned").clone();
        for listener in snapshot {
            if let Err(message) = call(listener.as_ref()) {
                warn!(error = %message, "listener callback failed; continuing fire loop");
            }
        }
    }

    pub fn len(&self) -> usize {
        self.listeners.lock().expect("listener list mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
