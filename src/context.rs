//! Per-execution-unit context propagation.
//!
//! Each logical unit of execution (an OS thread, or a tokio task when running
//! inside one) owns a private key/value map. Values pushed by one unit are
//! never visible to another; events capture a copy of the emitting unit's map.

use crate::core::Context;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::ThreadId;

/// Identity of a unit of execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitId {
    Thread(ThreadId),
    Task(tokio::task::Id),
}

/// Resolves the identity of the calling unit of execution.
pub trait UnitIdentity: Send + Sync {
    fn current(&self) -> UnitId;
}

/// The current tokio task if called from inside one, otherwise the OS thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct AmbientIdentity;

impl UnitIdentity for AmbientIdentity {
    fn current(&self) -> UnitId {
        match tokio::task::try_id() {
            Some(id) => UnitId::Task(id),
            None => UnitId::Thread(std::thread::current().id()),
        }
    }
}

static SHARED: Lazy<Arc<ContextStore>> = Lazy::new(|| Arc::new(ContextStore::new()));

/// Maps each unit of execution to its own context.
///
/// Entries are created lazily on the first push and are not removed when the
/// unit finishes; call [`ContextStore::clear`] from the unit to reclaim one.
pub struct ContextStore {
    identity: Arc<dyn UnitIdentity>,
    entries: Mutex<HashMap<UnitId, Context>>,
}

impl ContextStore {
    /// Creates an empty store keyed by [`AmbientIdentity`].
    pub fn new() -> Self {
        Self::with_identity(Arc::new(AmbientIdentity))
    }

    pub fn with_identity(identity: Arc<dyn UnitIdentity>) -> Self {
        Self {
            identity,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// The process-wide store used by hubs that are not given their own.
    pub fn shared() -> Arc<ContextStore> {
        Arc::clone(&SHARED)
    }

    /// Merges `pairs` into the calling unit's context, overwriting existing keys.
    pub fn push_context<I, K, V>(&self, pairs: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<serde_json::Value>,
    {
        let unit = self.identity.current();
        let mut entries = self.lock();
        let context = entries.entry(unit).or_default();
        for (key, value) in pairs {
            context.insert(key.into(), value.into());
        }
    }

    /// Returns a copy of the calling unit's context (empty if nothing was pushed).
    pub fn snapshot(&self) -> Context {
        let unit = self.identity.current();
        self.lock().get(&unit).cloned().unwrap_or_default()
    }

    /// Removes the calling unit's entry.
    pub fn clear(&self) {
        let unit = self.identity.current();
        self.lock().remove(&unit);
    }

    /// Number of units currently holding an entry.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<UnitId, Context>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ContextStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ContextStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextStore")
            .field("units", &self.len())
            .finish_non_exhaustive()
    }
}
