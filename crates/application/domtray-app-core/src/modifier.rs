//! Held-modifier flag and its fan-out to live action sets.

use std::sync::{Arc, Mutex, Weak};

use domtray_core::{ActionSet, DomainId};

/// Something that switches between force and non-force variants.
pub trait ModifierSubscriber: Send + Sync {
    fn domain(&self) -> DomainId;
    /// Returns whether the subscriber changed.
    fn reconfigure(&self, active: bool) -> bool;
}

/// The action set currently offered for one domain.
#[derive(Debug)]
pub struct LiveActionSet {
    domain: DomainId,
    set: Mutex<ActionSet>,
}

impl LiveActionSet {
    pub fn new(domain: DomainId, set: ActionSet) -> Arc<Self> {
        Arc::new(Self {
            domain,
            set: Mutex::new(set),
        })
    }

    pub fn snapshot(&self) -> ActionSet {
        self.set.lock().unwrap().clone()
    }

    pub fn set_debug_console(&self, visible: bool) -> bool {
        self.set.lock().unwrap().set_debug_console(visible)
    }
}

impl ModifierSubscriber for LiveActionSet {
    fn domain(&self) -> DomainId {
        self.domain
    }

    fn reconfigure(&self, active: bool) -> bool {
        self.set.lock().unwrap().reconfigure(active)
    }
}

/// Holds weak references only; dropping an action set unsubscribes it.
#[derive(Default)]
pub struct ModifierState {
    active: bool,
    subscribers: Vec<Weak<dyn ModifierSubscriber>>,
}

impl ModifierState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn subscribe(&mut self, subscriber: &Arc<dyn ModifierSubscriber>) {
        self.subscribers.retain(|s| s.strong_count() > 0);
        self.subscribers.push(Arc::downgrade(subscriber));
    }

    pub fn live_subscribers(&self) -> usize {
        self.subscribers
            .iter()
            .filter(|s| s.strong_count() > 0)
            .count()
    }

    /// Sets the flag and returns the domains whose action sets changed.
    /// Setting the current value is a no-op.
    pub fn set(&mut self, active: bool) -> Vec<DomainId> {
        if self.active == active {
            return Vec::new();
        }
        self.active = active;

        let mut changed = Vec::new();
        self.subscribers.retain(|weak| match weak.upgrade() {
            Some(subscriber) => {
                if subscriber.reconfigure(active) {
                    changed.push(subscriber.domain());
                }
                true
            }
            None => false,
        });
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domtray_core::actions::ActionSetSpec;
    use domtray_core::{ClassTag, DomainAction, PowerState};

    fn running_set() -> ActionSet {
        let spec = ActionSetSpec {
            state: PowerState::Running,
            class: ClassTag::AppVM,
            internal: false,
            auto_cleanup: false,
            debug_console: false,
            logs: Vec::new(),
        };
        ActionSet::build(&spec, false)
    }

    #[test]
    fn flip_reconfigures_live_sets_and_prunes_dead_ones() {
        let mut modifier = ModifierState::new();
        let kept = LiveActionSet::new(DomainId::new(), running_set());
        let kept_dyn: Arc<dyn ModifierSubscriber> = kept.clone();
        modifier.subscribe(&kept_dyn);
        {
            let dropped: Arc<dyn ModifierSubscriber> =
                LiveActionSet::new(DomainId::new(), running_set());
            modifier.subscribe(&dropped);
        }
        drop(kept_dyn);

        let changed = modifier.set(true);
        assert_eq!(changed, vec![kept.domain()]);
        assert_eq!(modifier.live_subscribers(), 1);
        let set = kept.snapshot();
        assert!(set
            .find(|a| *a == DomainAction::Shutdown { force: true })
            .is_some());
        assert!(set.labels().contains(&"Run Root Terminal"));
    }

    #[test]
    fn setting_same_value_is_a_no_op() {
        let mut modifier = ModifierState::new();
        let live = LiveActionSet::new(DomainId::new(), running_set());
        let live_dyn: Arc<dyn ModifierSubscriber> = live.clone();
        modifier.subscribe(&live_dyn);

        assert!(modifier.set(false).is_empty());
        assert_eq!(live.snapshot(), running_set());
    }
}
