//! Delta callbacks consumed by the presentation layer.

use std::sync::{Arc, Mutex};

use domtray_core::{ActionSet, DomainEntry, DomainId, PowerState};
use serde::{Deserialize, Serialize};

use crate::actions::{ActionError, EscalationPrompt};
use crate::notify::Notification;
use crate::ports::StorageUsage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggregateKind {
    AllPaused,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Tooltip {
    pub name: String,
    pub netvm: Option<String>,
    pub template: Option<String>,
    pub storage: Option<StorageUsage>,
    pub outdated: bool,
    pub updates_available: bool,
}

/// Presentation-only attributes of an entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decoration {
    Icon { label: String },
    Tooltip(Tooltip),
    Updates { available: bool },
    Stats { memory_kb: u64, cpu_usage: u32 },
}

/// Callbacks invoked by the engine. The presentation layer owns all rendering.
pub trait PresentationSink: Send + Sync + 'static {
    fn on_entry_added(&self, entry: &DomainEntry, position: usize);
    fn on_entry_removed(&self, id: DomainId);
    fn on_entry_state_changed(&self, id: DomainId, state: PowerState);
    fn on_entry_visibility_changed(&self, id: DomainId, visible: bool);
    fn on_entry_outdated_changed(&self, id: DomainId, outdated: bool);
    fn on_entry_decoration_changed(&self, id: DomainId, decoration: &Decoration);
    fn on_action_set_reconfigure(&self, id: DomainId, set: &ActionSet);
    fn on_notification(&self, notification: &Notification);
    fn on_aggregate_notify(&self, kind: AggregateKind, notification: &Notification);
    fn on_aggregate_withdraw(&self, kind: AggregateKind);
    fn on_action_error(&self, error: &ActionError);
    fn on_escalation_prompt(&self, prompt: &EscalationPrompt);
}

/// One recorded sink call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "delta", rename_all = "snake_case")]
pub enum UiDelta {
    EntryAdded { entry: DomainEntry, position: usize },
    EntryRemoved { id: DomainId },
    EntryStateChanged { id: DomainId, state: PowerState },
    EntryVisibilityChanged { id: DomainId, visible: bool },
    EntryOutdatedChanged { id: DomainId, outdated: bool },
    EntryDecorationChanged { id: DomainId, decoration: Decoration },
    ActionSetReconfigure { id: DomainId, set: ActionSet },
    Notification { notification: Notification },
    AggregateNotify { kind: AggregateKind, notification: Notification },
    AggregateWithdraw { kind: AggregateKind },
    ActionError { error: ActionError },
    EscalationPrompt { prompt: EscalationPrompt },
}

/// A sink that records every delta in arrival order.
#[derive(Debug, Clone, Default)]
pub struct DeltaLog {
    inner: Arc<Mutex<Vec<UiDelta>>>,
}

impl DeltaLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, delta: UiDelta) {
        self.inner.lock().unwrap().push(delta);
    }

    pub fn deltas(&self) -> Vec<UiDelta> {
        self.inner.lock().unwrap().clone()
    }

    /// Removes and returns everything recorded so far.
    pub fn drain(&self) -> Vec<UiDelta> {
        std::mem::take(&mut *self.inner.lock().unwrap())
    }

    pub fn count(&self, pred: impl Fn(&UiDelta) -> bool) -> usize {
        self.inner.lock().unwrap().iter().filter(|d| pred(d)).count()
    }
}

impl PresentationSink for DeltaLog {
    fn on_entry_added(&self, entry: &DomainEntry, position: usize) {
        self.push(UiDelta::EntryAdded {
            entry: entry.clone(),
            position,
        });
    }
    fn on_entry_removed(&self, id: DomainId) {
        self.push(UiDelta::EntryRemoved { id });
    }
    fn on_entry_state_changed(&self, id: DomainId, state: PowerState) {
        self.push(UiDelta::EntryStateChanged { id, state });
    }
    fn on_entry_visibility_changed(&self, id: DomainId, visible: bool) {
        self.push(UiDelta::EntryVisibilityChanged { id, visible });
    }
    fn on_entry_outdated_changed(&self, id: DomainId, outdated: bool) {
        self.push(UiDelta::EntryOutdatedChanged { id, outdated });
    }
    fn on_entry_decoration_changed(&self, id: DomainId, decoration: &Decoration) {
        self.push(UiDelta::EntryDecorationChanged {
            id,
            decoration: decoration.clone(),
        });
    }
    fn on_action_set_reconfigure(&self, id: DomainId, set: &ActionSet) {
        self.push(UiDelta::ActionSetReconfigure {
            id,
            set: set.clone(),
        });
    }
    fn on_notification(&self, notification: &Notification) {
        self.push(UiDelta::Notification {
            notification: notification.clone(),
        });
    }
    fn on_aggregate_notify(&self, kind: AggregateKind, notification: &Notification) {
        self.push(UiDelta::AggregateNotify {
            kind,
            notification: notification.clone(),
        });
    }
    fn on_aggregate_withdraw(&self, kind: AggregateKind) {
        self.push(UiDelta::AggregateWithdraw { kind });
    }
    fn on_action_error(&self, error: &ActionError) {
        self.push(UiDelta::ActionError {
            error: error.clone(),
        });
    }
    fn on_escalation_prompt(&self, prompt: &EscalationPrompt) {
        self.push(UiDelta::EscalationPrompt {
            prompt: prompt.clone(),
        });
    }
}
