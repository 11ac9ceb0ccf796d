use std::sync::{Arc, Mutex};

use domtray_core::{DomainEntry, DomainId, DomainRegistry, RegistryRow};

/// Shared handle to the registry. The engine mutates it; other threads take snapshots.
#[derive(Clone, Default)]
pub struct RegistryStore {
    inner: Arc<Mutex<DomainRegistry>>,
}

impl RegistryStore {
    pub fn snapshot(&self) -> Vec<RegistryRow> {
        self.inner.lock().unwrap().iterate()
    }

    pub fn entries(&self) -> Vec<DomainEntry> {
        self.inner.lock().unwrap().entries()
    }

    pub fn get(&self, id: DomainId) -> Option<DomainEntry> {
        self.inner.lock().unwrap().get(id).cloned()
    }

    pub fn contains(&self, id: DomainId) -> bool {
        self.inner.lock().unwrap().contains(id)
    }

    pub(crate) fn with_registry_mut<R>(&self, f: impl FnOnce(&mut DomainRegistry) -> R) -> R {
        let mut guard = self.inner.lock().unwrap();
        f(&mut guard)
    }
}
