//! Per-domain action sets and the modifier rule table.

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::{ClassTag, PowerState};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DomainAction {
    OpenFileManager,
    RunTerminal { as_root: bool },
    DebugConsole,
    Settings,
    Pause,
    Unpause,
    Shutdown { force: bool },
    Restart { force: bool },
    Kill,
    ViewLog { path: Utf8PathBuf },
    /// Informational row shown for internal domains; does nothing.
    InternalInfo,
}

impl DomainAction {
    fn label(&self) -> String {
        let label = match self {
            DomainAction::OpenFileManager => "Open File Manager",
            DomainAction::RunTerminal { as_root: true } => "Run Root Terminal",
            DomainAction::RunTerminal { as_root: false } => "Run Terminal",
            DomainAction::DebugConsole => "Debug Console",
            DomainAction::Settings => "Settings",
            DomainAction::Pause => "Emergency pause",
            DomainAction::Unpause => "Unpause",
            DomainAction::Shutdown { force: true } => "Force shutdown",
            DomainAction::Shutdown { force: false } => "Shutdown",
            DomainAction::Restart { force: true } => "Force restart",
            DomainAction::Restart { force: false } => "Restart",
            DomainAction::Kill => "Kill",
            DomainAction::ViewLog { .. } => "Log",
            DomainAction::InternalInfo => "Internal qube",
        };
        label.to_string()
    }

    fn icon(&self) -> Option<&'static str> {
        match self {
            DomainAction::OpenFileManager => Some("qubes-files"),
            DomainAction::RunTerminal { .. } => Some("qubes-terminal"),
            DomainAction::DebugConsole => Some("bug-play"),
            DomainAction::Settings => Some("qubes-vm-settings"),
            DomainAction::Pause => Some("qubes-vm-pause"),
            DomainAction::Unpause => Some("qubes-vm-unpause"),
            DomainAction::Shutdown { .. } => Some("qubes-vm-shutdown"),
            DomainAction::Restart { .. } => Some("qubes-vm-restart"),
            DomainAction::Kill => Some("qubes-vm-kill"),
            DomainAction::ViewLog { .. } => Some("scroll-text"),
            DomainAction::InternalInfo => None,
        }
    }

    /// Applies the modifier rule table. Returns `None` for actions without a variant.
    fn with_modifier(&self, active: bool) -> Option<DomainAction> {
        match self {
            DomainAction::RunTerminal { .. } => Some(DomainAction::RunTerminal { as_root: active }),
            DomainAction::Shutdown { .. } => Some(DomainAction::Shutdown { force: active }),
            DomainAction::Restart { .. } => Some(DomainAction::Restart { force: active }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionItem {
    pub action: DomainAction,
    pub label: String,
    pub icon: Option<String>,
    pub visible: bool,
    pub sensitive: bool,
}

impl ActionItem {
    fn new(action: DomainAction) -> Self {
        Self {
            label: action.label(),
            icon: action.icon().map(str::to_string),
            action,
            visible: true,
            sensitive: true,
        }
    }

    fn log(label: &str, path: Utf8PathBuf) -> Self {
        Self {
            label: label.to_string(),
            ..Self::new(DomainAction::ViewLog { path })
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionSetKind {
    Started,
    Paused,
    Debug,
    /// `working_correctly` domains offer a shutdown, others only a kill.
    Internal { working_correctly: bool },
}

impl ActionSetKind {
    pub fn for_state(internal: bool, state: PowerState) -> Self {
        if internal {
            return ActionSetKind::Internal {
                working_correctly: state == PowerState::Running,
            };
        }
        match state {
            PowerState::Running => ActionSetKind::Started,
            PowerState::Paused => ActionSetKind::Paused,
            _ => ActionSetKind::Debug,
        }
    }
}

/// Inputs needed to build the action set of one domain.
#[derive(Debug, Clone)]
pub struct ActionSetSpec {
    pub state: PowerState,
    pub class: ClassTag,
    pub internal: bool,
    pub auto_cleanup: bool,
    pub debug_console: bool,
    /// Console logs that exist on disk, as `(label, path)`.
    pub logs: Vec<(String, Utf8PathBuf)>,
}

/// Candidate console logs for `name` under `dir`; callers keep the ones that exist.
pub fn console_logs(dir: &Utf8Path, name: &str) -> Vec<(String, Utf8PathBuf)> {
    vec![
        (
            "Console Log".to_string(),
            dir.join(format!("guest-{name}.log")),
        ),
        (
            "QEMU Console Log".to_string(),
            dir.join(format!("guest-{name}-dm.log")),
        ),
    ]
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionSet {
    pub kind: ActionSetKind,
    pub modifier: bool,
    pub items: Vec<ActionItem>,
}

impl ActionSet {
    pub fn build(spec: &ActionSetSpec, modifier: bool) -> Self {
        let kind = ActionSetKind::for_state(spec.internal, spec.state);
        let logs = || {
            spec.logs
                .iter()
                .map(|(label, path)| ActionItem::log(label, path.clone()))
        };

        let mut items = Vec::new();
        match kind {
            ActionSetKind::Started => {
                items.push(ActionItem::new(DomainAction::OpenFileManager));
                items.push(ActionItem::new(DomainAction::RunTerminal { as_root: modifier }));
                items.push(ActionItem {
                    visible: spec.debug_console,
                    ..ActionItem::new(DomainAction::DebugConsole)
                });
                items.push(ActionItem::new(DomainAction::Settings));
                items.push(ActionItem::new(DomainAction::Pause));
                items.push(ActionItem::new(DomainAction::Shutdown { force: modifier }));
                if spec.class != ClassTag::DispVM || !spec.auto_cleanup {
                    items.push(ActionItem::new(DomainAction::Restart { force: modifier }));
                }
            }
            ActionSetKind::Paused => {
                items.push(ActionItem::new(DomainAction::Settings));
                items.push(ActionItem::new(DomainAction::Unpause));
                items.push(ActionItem::new(DomainAction::Kill));
            }
            ActionSetKind::Debug => {
                items.push(ActionItem::new(DomainAction::Settings));
                items.extend(logs());
                items.push(ActionItem::new(DomainAction::Kill));
            }
            ActionSetKind::Internal { working_correctly } => {
                items.push(ActionItem {
                    sensitive: false,
                    ..ActionItem::new(DomainAction::InternalInfo)
                });
                items.extend(logs());
                if working_correctly {
                    items.push(ActionItem::new(DomainAction::Shutdown { force: modifier }));
                } else {
                    items.push(ActionItem::new(DomainAction::Kill));
                }
            }
        }

        Self {
            kind,
            modifier,
            items,
        }
    }

    /// Switches every modifier-sensitive item to the variant for `active`.
    /// Only labels and flags change. Returns whether anything changed.
    pub fn reconfigure(&mut self, active: bool) -> bool {
        if self.modifier == active {
            return false;
        }
        self.modifier = active;
        for item in &mut self.items {
            if let Some(action) = item.action.with_modifier(active) {
                item.label = action.label();
                item.action = action;
            }
        }
        true
    }

    pub fn set_debug_console(&mut self, visible: bool) -> bool {
        let mut changed = false;
        for item in &mut self.items {
            if item.action == DomainAction::DebugConsole && item.visible != visible {
                item.visible = visible;
                changed = true;
            }
        }
        changed
    }

    pub fn find(&self, pred: impl Fn(&DomainAction) -> bool) -> Option<&ActionItem> {
        self.items.iter().find(|item| pred(&item.action))
    }

    pub fn labels(&self) -> Vec<&str> {
        self.items
            .iter()
            .filter(|i| i.visible)
            .map(|i| i.label.as_str())
            .collect()
    }
}
