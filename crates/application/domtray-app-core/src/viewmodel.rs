use domtray_core::{DomainEntry, DomainId, PowerState, RegistryRow};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NameColour {
    Default,
    Grey,
    Red,
}

/// How one registry row is drawn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryVm {
    pub id: Option<DomainId>,
    pub name: String,
    pub state: Option<PowerState>,
    pub colour: NameColour,
    pub spinner: bool,
    pub visible: bool,
    pub outdated: bool,
}

impl EntryVm {
    pub fn header() -> Self {
        Self {
            id: None,
            name: String::new(),
            state: None,
            colour: NameColour::Default,
            spinner: false,
            visible: true,
            outdated: false,
        }
    }

    pub fn from_entry(entry: &DomainEntry) -> Self {
        let decorated = !entry.is_admin();
        let colour = match entry.state {
            PowerState::Paused if decorated => NameColour::Grey,
            PowerState::Crashed | PowerState::Transient if decorated => NameColour::Red,
            _ => NameColour::Default,
        };
        Self {
            id: Some(entry.id),
            name: entry.name.clone(),
            state: Some(entry.state),
            colour,
            spinner: decorated
                && !matches!(
                    entry.state,
                    PowerState::Running | PowerState::Paused | PowerState::Halted
                ),
            visible: entry.visible,
            outdated: entry.outdated,
        }
    }

    pub fn from_row(row: &RegistryRow) -> Self {
        match row {
            RegistryRow::Header => Self::header(),
            RegistryRow::Domain(entry) => Self::from_entry(entry),
        }
    }
}

/// View models for every visible row, in display order.
pub fn visible_rows(rows: &[RegistryRow]) -> Vec<EntryVm> {
    rows.iter()
        .map(EntryVm::from_row)
        .filter(|vm| vm.visible)
        .collect()
}
