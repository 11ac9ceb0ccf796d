//! Ordered collection of domain entries.
//!
//! Order is: the header row (if any), then admin domains in insertion order, then
//! every other domain in strictly ascending name order.

use serde::{Deserialize, Serialize};

use crate::{visibility_for, DomainEntry, DomainId, DomainInfo, PowerState};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistryRow {
    Header,
    Domain(DomainEntry),
}

impl RegistryRow {
    pub fn entry(&self) -> Option<&DomainEntry> {
        match self {
            RegistryRow::Header => None,
            RegistryRow::Domain(entry) => Some(entry),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Upsert {
    /// `position` counts the header row when present.
    Inserted { position: usize },
    Updated {
        previous: PowerState,
        visibility_changed: bool,
    },
}

#[derive(Debug, Clone, Default)]
pub struct DomainRegistry {
    header: bool,
    entries: Vec<DomainEntry>,
}

impl DomainRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_header(&mut self) {
        self.header = true;
    }

    pub fn has_header(&self) -> bool {
        self.header
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: DomainId) -> bool {
        self.index_of(id).is_some()
    }

    pub fn get(&self, id: DomainId) -> Option<&DomainEntry> {
        self.index_of(id).map(|ix| &self.entries[ix])
    }

    pub fn ids(&self) -> Vec<DomainId> {
        self.entries.iter().map(|e| e.id).collect()
    }

    /// Owned snapshot of the current order.
    pub fn iterate(&self) -> Vec<RegistryRow> {
        let header = self.header.then_some(RegistryRow::Header);
        header
            .into_iter()
            .chain(self.entries.iter().cloned().map(RegistryRow::Domain))
            .collect()
    }

    pub fn entries(&self) -> Vec<DomainEntry> {
        self.entries.clone()
    }

    pub fn upsert(&mut self, info: &DomainInfo, state: PowerState) -> Upsert {
        if let Some(ix) = self.index_of(info.id) {
            let entry = &mut self.entries[ix];
            let previous = entry.state;
            let was_visible = entry.visible;
            entry.state = state;
            entry.visible = visibility_for(entry.class, state);
            return Upsert::Updated {
                previous,
                visibility_changed: was_visible != entry.visible,
            };
        }

        let position = self.insert_sorted(DomainEntry::new(info, state));
        Upsert::Inserted { position }
    }

    /// Removing an absent identity is a no-op.
    pub fn remove(&mut self, id: DomainId) -> Option<DomainEntry> {
        let ix = self.index_of(id)?;
        let removed = self.entries.remove(ix);
        self.check_order();
        Some(removed)
    }

    /// Renames an entry and moves it to its new sorted position. Admin entries keep
    /// their place.
    pub fn rename(&mut self, id: DomainId, new_name: &str) -> Option<usize> {
        let ix = self.index_of(id)?;
        if self.entries[ix].is_admin() {
            self.entries[ix].name = new_name.to_string();
            return Some(ix + usize::from(self.header));
        }
        let mut entry = self.entries.remove(ix);
        entry.name = new_name.to_string();
        Some(self.insert_sorted(entry))
    }

    /// Returns whether the flag changed. Admin entries cannot be hidden.
    pub fn set_visible(&mut self, id: DomainId, visible: bool) -> bool {
        let Some(ix) = self.index_of(id) else {
            return false;
        };
        let entry = &mut self.entries[ix];
        let visible = visible || entry.is_admin();
        let changed = entry.visible != visible;
        entry.visible = visible;
        changed
    }

    pub fn set_outdated(&mut self, id: DomainId, outdated: bool) -> bool {
        let Some(ix) = self.index_of(id) else {
            return false;
        };
        let entry = &mut self.entries[ix];
        let changed = entry.outdated != outdated;
        entry.outdated = outdated;
        changed
    }

    /// Host names are unique, so non-decreasing order is strictly ascending in practice.
    pub fn ordering_holds(&self) -> bool {
        let admin_len = self.entries.iter().take_while(|e| e.is_admin()).count();
        let rest = &self.entries[admin_len..];
        rest.iter().all(|e| !e.is_admin()) && rest.windows(2).all(|w| w[0].name <= w[1].name)
    }

    fn index_of(&self, id: DomainId) -> Option<usize> {
        self.entries.iter().position(|e| e.id == id)
    }

    fn insert_sorted(&mut self, entry: DomainEntry) -> usize {
        let admin_len = self.entries.iter().take_while(|e| e.is_admin()).count();
        let ix = if entry.is_admin() {
            admin_len
        } else {
            admin_len
                + self.entries[admin_len..]
                    .iter()
                    .take_while(|e| e.name <= entry.name)
                    .count()
        };
        self.entries.insert(ix, entry);
        self.check_order();
        ix + usize::from(self.header)
    }

    fn check_order(&self) {
        debug_assert!(self.ordering_holds(), "registry order violated");
    }
}
