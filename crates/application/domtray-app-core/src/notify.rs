//! User-facing notifications and the aggregate notification latch.

use chrono::{DateTime, Utc};
use domtray_core::LifecycleKind;
use serde::{Deserialize, Serialize};

const WARNING_ICON: &str = "dialog-warning";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Priority {
    Normal,
    High,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationButton {
    pub label: String,
    pub action: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Replaceable notifications carry an id; one-shot status messages don't.
    pub id: Option<String>,
    pub title: String,
    pub body: String,
    pub priority: Priority,
    pub icon: Option<String>,
    pub buttons: Vec<NotificationButton>,
    pub issued_at: DateTime<Utc>,
}

impl Notification {
    fn status(name: &str, body: String) -> Self {
        Self {
            id: None,
            title: format!("Qube Status: {name}"),
            body,
            priority: Priority::Normal,
            icon: None,
            buttons: Vec::new(),
            issued_at: Utc::now(),
        }
    }

    fn warning(mut self) -> Self {
        self.priority = Priority::High;
        self.icon = Some(WARNING_ICON.to_string());
        self
    }

    /// Status notification for a lifecycle transition, if that kind is announced.
    pub fn lifecycle(kind: &LifecycleKind, name: &str, reason: Option<&str>) -> Option<Self> {
        let reason = reason.unwrap_or_default();
        let notification = match kind {
            LifecycleKind::PreStart => Self::status(name, format!("Qube {name} is starting.")),
            LifecycleKind::Start => Self::status(name, format!("Qube {name} has started.")),
            LifecycleKind::StartFailed => Self::status(
                name,
                format!("Qube {name} has failed to start: {reason}"),
            )
            .warning(),
            LifecycleKind::PreShutdown => {
                Self::status(name, format!("Qube {name} is attempting to shut down."))
            }
            LifecycleKind::Shutdown => Self::status(name, format!("Qube {name} has shut down.")),
            LifecycleKind::ShutdownFailed => Self::status(
                name,
                format!("Qube {name} failed to shut down: {reason}"),
            )
            .warning(),
            LifecycleKind::Paused | LifecycleKind::Unpaused | LifecycleKind::Other(_) => {
                return None
            }
        };
        Some(notification)
    }

    pub fn preload_used(dispvm: &str) -> Self {
        Self::status(
            dispvm,
            format!("Qube {dispvm} was preloaded and is now being used."),
        )
    }

    pub fn all_paused() -> Self {
        Self {
            id: Some(domtray_config::PAUSED_NOTIFICATION_ID.to_string()),
            title: "Your qubes have been paused!".to_string(),
            body: "All your qubes are currently paused. If this was an accident, simply \
                   click 'Unpause All' to unpause them (except preloaded disposables). \
                   Otherwise, you can unpause individual qubes via the Qubes Domains tray \
                   widget."
                .to_string(),
            priority: Priority::High,
            icon: Some(WARNING_ICON.to_string()),
            buttons: vec![NotificationButton {
                label: "Unpause All".to_string(),
                action: domtray_config::UNPAUSE_ALL_ACTION.to_string(),
            }],
            issued_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateTransition {
    Emit,
    Withdraw,
    Unchanged,
}

/// Holds at most one outstanding aggregate notification.
#[derive(Debug, Default)]
pub struct NotificationGate {
    outstanding: bool,
}

impl NotificationGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_outstanding(&self) -> bool {
        self.outstanding
    }

    pub fn update(&mut self, condition: bool) -> GateTransition {
        match (condition, self.outstanding) {
            (true, false) => {
                self.outstanding = true;
                GateTransition::Emit
            }
            (false, true) => {
                self.outstanding = false;
                GateTransition::Withdraw
            }
            _ => GateTransition::Unchanged,
        }
    }
}
