//! Per-vault wiring and the fair-FIFO lock that serializes mutations.
//!
//! A `VaultContext` owns one vault's [`Workspace`] and [`DatabaseStore`] and
//! hands out short-lived [`NoteManager`]/[`NoteTypeManager`]/[`HybridSearch`]
//! borrows on demand rather than storing them, since those types borrow from
//! the workspace/store they wrap. `VaultContextRegistry` caches contexts by
//! vault id so repeated lookups reuse the same open database connection.

use crate::db::DatabaseStore;
use crate::error::Result;
use crate::note::NoteManager;
use crate::note_type::NoteTypeManager;
use crate::search::HybridSearch;
use crate::workspace::Workspace;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Condvar, Mutex};

struct FairLockState {
    next_ticket: u64,
    serving: u64,
}

/// A ticket lock: waiters are granted the lock in the order they arrived,
/// unlike `std::sync::Mutex` which makes no such guarantee.
struct FairLock {
    state: Mutex<FairLockState>,
    turn: Condvar,
}

impl FairLock {
    fn new() -> Self {
        Self { state: Mutex::new(FairLockState { next_ticket: 0, serving: 0 }), turn: Condvar::new() }
    }

    fn lock(&self) -> FairLockGuard<'_> {
        let mut state = self.state.lock().expect("fair lock poisoned");
        let ticket = state.next_ticket;
        state.next_ticket += 1;
        while state.serving != ticket {
            state = self.turn.wait(state).expect("fair lock poisoned");
        }
        drop(state);
        FairLockGuard { lock: self }
    }
}

struct FairLockGuard<'a> {
    lock: &'a FairLock,
}

impl Drop for FairLockGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.lock.state.lock().expect("fair lock poisoned");
        state.serving += 1;
        self.lock.turn.notify_all();
    }
}

/// One vault's open workspace, database connection, and mutation lock.
/// Reads may proceed concurrently; call [`VaultContext::with_write_lock`]
/// around any sequence of mutations that must observe a consistent order.
pub struct VaultContext {
    pub vault_id: String,
    workspace: Workspace,
    db: DatabaseStore,
    lock: FairLock,
}

impl VaultContext {
    /// Open an already-initialized vault at `root`.
    pub fn open(vault_id: String, root: impl Into<std::path::PathBuf>) -> Result<Self> {
        let workspace = Workspace::initialize(root)?;
        let db = DatabaseStore::open(&workspace.db_path())?;
        Ok(Self { vault_id, workspace, db, lock: FairLock::new() })
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn database(&self) -> &DatabaseStore {
        &self.db
    }

    pub fn note_types(&self) -> NoteTypeManager<'_> {
        NoteTypeManager::new(&self.workspace, &self.db)
    }

    pub fn notes(&self) -> NoteManager<'_> {
        NoteManager::new(&self.workspace, &self.db)
    }

    pub fn search(&self) -> HybridSearch<'_> {
        HybridSearch::new(&self.workspace, &self.db)
    }

    /// Run `f` while holding this vault's mutation lock, serializing it
    /// against every other mutating call on the same vault in FIFO order.
    pub fn with_write_lock<R>(&self, f: impl FnOnce() -> Result<R>) -> Result<R> {
        let _guard = self.lock.lock();
        f()
    }
}

/// Process-wide cache of open `VaultContext`s, keyed by vault id, so repeat
/// lookups reuse the same database connection instead of reopening it.
pub struct VaultContextRegistry {
    contexts: Mutex<HashMap<String, Arc<VaultContext>>>,
}

impl VaultContextRegistry {
    pub fn new() -> Self {
        Self { contexts: Mutex::new(HashMap::new()) }
    }

    /// Fetch the cached context for `vault_id`, opening it from `root` if
    /// this is the first access.
    pub fn get_or_open(&self, vault_id: &str, root: &Path) -> Result<Arc<VaultContext>> {
        let mut contexts = self.contexts.lock().expect("vault context registry poisoned");
        if let Some(ctx) = contexts.get(vault_id) {
            return Ok(ctx.clone());
        }
        let ctx = Arc::new(VaultContext::open(vault_id.to_string(), root)?);
        contexts.insert(vault_id.to_string(), ctx.clone());
        Ok(ctx)
    }

    /// Drop the cached context for `vault_id`, closing its database
    /// connection. The next `get_or_open` reopens it.
    pub fn evict(&self, vault_id: &str) {
        self.contexts.lock().expect("vault context registry poisoned").remove(vault_id);
    }
}

impl Default for VaultContextRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workspace::Workspace;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use tempfile::TempDir;

    #[test]
    fn registry_reuses_cached_context() {
        let dir = TempDir::new().unwrap();
        Workspace::initialize_vault(dir.path()).unwrap();
        let registry = VaultContextRegistry::new();

        let a = registry.get_or_open("v1", dir.path()).unwrap();
        let b = registry.get_or_open("v1", dir.path()).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn evict_forces_reopen() {
        let dir = TempDir::new().unwrap();
        Workspace::initialize_vault(dir.path()).unwrap();
        let registry = VaultContextRegistry::new();

        let a = registry.get_or_open("v1", dir.path()).unwrap();
        registry.evict("v1");
        let b = registry.get_or_open("v1", dir.path()).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn write_lock_serializes_mutations() {
        let dir = TempDir::new().unwrap();
        Workspace::initialize_vault(dir.path()).unwrap();
        let ctx = Arc::new(VaultContext::open("v1".to_string(), dir.path()).unwrap());
        let counter = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let ctx = ctx.clone();
            let counter = counter.clone();
            handles.push(thread::spawn(move || {
                ctx.with_write_lock(|| {
                    let before = counter.fetch_add(1, Ordering::SeqCst);
                    assert_eq!(before, counter.load(Ordering::SeqCst) - 1);
                    Ok(())
                })
                .unwrap();
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 8);
    }
}
