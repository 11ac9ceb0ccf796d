use serde::{Deserialize, Serialize};
use std::fmt;

pub mod actions;
pub mod event;
pub mod registry;
pub mod state;

pub use actions::{ActionItem, ActionSet, ActionSetKind, DomainAction};
pub use event::{DecodeError, DomainEvent, FeatureName, PropertyName, RawEvent};
pub use registry::{DomainRegistry, RegistryRow, Upsert};
pub use state::{LifecycleKind, MappedState};

/// Process-unique handle for a domain. Never reused after the domain is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DomainId(uuid::Uuid);

impl DomainId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for DomainId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DomainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PowerState {
    Transient,
    Running,
    Halted,
    Paused,
    Crashed,
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PowerState::Transient => "Transient",
            PowerState::Running => "Running",
            PowerState::Halted => "Halted",
            PowerState::Paused => "Paused",
            PowerState::Crashed => "Crashed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClassTag {
    AdminVM,
    AppVM,
    TemplateVM,
    DispVM,
    StandaloneVM,
    /// A disposable caught mid-transition whose class could not be read.
    Unknown,
}

impl ClassTag {
    pub fn is_admin(self) -> bool {
        self == ClassTag::AdminVM
    }
}

/// Live metadata for a domain, as resolved from the management API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainInfo {
    pub id: DomainId,
    pub name: String,
    pub class: ClassTag,
    #[serde(default)]
    pub internal: bool,
    #[serde(default)]
    pub preload: bool,
    #[serde(default)]
    pub auto_cleanup: bool,
    #[serde(default)]
    pub template_for_dispvms: bool,
}

impl DomainInfo {
    /// Templates and disposable templates can leave dependants outdated when they shut down.
    pub fn is_template_like(&self) -> bool {
        self.class == ClassTag::TemplateVM || self.template_for_dispvms
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainEntry {
    pub id: DomainId,
    pub name: String,
    pub state: PowerState,
    pub class: ClassTag,
    pub internal: bool,
    pub preload: bool,
    pub visible: bool,
    pub outdated: bool,
}

impl DomainEntry {
    pub fn new(info: &DomainInfo, state: PowerState) -> Self {
        Self {
            id: info.id,
            name: info.name.clone(),
            state,
            class: info.class,
            internal: info.internal,
            preload: info.preload,
            visible: visibility_for(info.class, state),
            outdated: false,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.class.is_admin()
    }
}

/// Halted domains are hidden; admin domains are always shown.
pub fn visibility_for(class: ClassTag, state: PowerState) -> bool {
    class.is_admin() || state != PowerState::Halted
}
