use serde::{Deserialize, Serialize};

use crate::PowerState;

/// Lifecycle transitions reported by the event feed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecycleKind {
    PreStart,
    Start,
    StartFailed,
    Paused,
    Unpaused,
    Shutdown,
    PreShutdown,
    ShutdownFailed,
    /// Anything the table does not cover; the live state must be queried.
    Other(String),
}

impl LifecycleKind {
    pub fn from_wire(kind: &str) -> Self {
        match kind {
            "domain-pre-start" => LifecycleKind::PreStart,
            "domain-start" => LifecycleKind::Start,
            "domain-start-failed" => LifecycleKind::StartFailed,
            "domain-paused" => LifecycleKind::Paused,
            "domain-unpaused" => LifecycleKind::Unpaused,
            "domain-shutdown" => LifecycleKind::Shutdown,
            "domain-pre-shutdown" => LifecycleKind::PreShutdown,
            "domain-shutdown-failed" => LifecycleKind::ShutdownFailed,
            other => LifecycleKind::Other(other.to_string()),
        }
    }

    pub fn as_wire(&self) -> &str {
        match self {
            LifecycleKind::PreStart => "domain-pre-start",
            LifecycleKind::Start => "domain-start",
            LifecycleKind::StartFailed => "domain-start-failed",
            LifecycleKind::Paused => "domain-paused",
            LifecycleKind::Unpaused => "domain-unpaused",
            LifecycleKind::Shutdown => "domain-shutdown",
            LifecycleKind::PreShutdown => "domain-pre-shutdown",
            LifecycleKind::ShutdownFailed => "domain-shutdown-failed",
            LifecycleKind::Other(kind) => kind,
        }
    }

    pub fn is_start_family(&self) -> bool {
        matches!(self, LifecycleKind::Start | LifecycleKind::PreStart)
    }

    pub fn is_shutdown(&self) -> bool {
        matches!(self, LifecycleKind::Shutdown)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappedState {
    Known(PowerState),
    Unknown,
}

/// Maps a lifecycle kind onto the state the domain is in once the event was emitted.
pub fn map(kind: &LifecycleKind) -> MappedState {
    let state = match kind {
        LifecycleKind::PreStart => PowerState::Transient,
        LifecycleKind::Start => PowerState::Running,
        LifecycleKind::StartFailed => PowerState::Halted,
        LifecycleKind::Paused => PowerState::Paused,
        LifecycleKind::Unpaused => PowerState::Running,
        LifecycleKind::Shutdown => PowerState::Halted,
        LifecycleKind::PreShutdown => PowerState::Transient,
        LifecycleKind::ShutdownFailed => PowerState::Running,
        LifecycleKind::Other(_) => return MappedState::Unknown,
    };
    MappedState::Known(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_covers_the_eight_transitions() {
        let cases = [
            ("domain-pre-start", PowerState::Transient),
            ("domain-start", PowerState::Running),
            ("domain-start-failed", PowerState::Halted),
            ("domain-paused", PowerState::Paused),
            ("domain-unpaused", PowerState::Running),
            ("domain-shutdown", PowerState::Halted),
            ("domain-pre-shutdown", PowerState::Transient),
            ("domain-shutdown-failed", PowerState::Running),
        ];
        for (wire, expected) in cases {
            assert_eq!(
                map(&LifecycleKind::from_wire(wire)),
                MappedState::Known(expected),
                "{wire}"
            );
        }
    }

    #[test]
    fn unrecognized_kind_requires_a_query() {
        let kind = LifecycleKind::from_wire("domain-feature-set:internal");
        assert_eq!(kind.as_wire(), "domain-feature-set:internal");
        assert_eq!(map(&kind), MappedState::Unknown);
        assert_eq!(map(&LifecycleKind::Other(String::new())), MappedState::Unknown);
    }
}
