//! Typed events consumed by the reconciliation engine.
//!
//! The feed delivers loosely typed `(subject, kind, attributes)` tuples. [`RawEvent`]
//! carries that shape and [`RawEvent::decode`] turns it into a [`DomainEvent`], ignoring
//! unknown attribute keys and defaulting optional ones.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::state::LifecycleKind;
use crate::DomainId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeatureName {
    UpdatesAvailable,
    Gui,
    ExpertMode,
    Internal,
    Other(String),
}

impl FeatureName {
    pub fn from_wire(name: &str) -> Self {
        match name {
            "updates-available" => FeatureName::UpdatesAvailable,
            "gui" => FeatureName::Gui,
            "expert-mode" => FeatureName::ExpertMode,
            "internal" => FeatureName::Internal,
            other => FeatureName::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyName {
    Netvm,
    Label,
    Debug,
    Guivm,
    Name,
    Other(String),
}

impl PropertyName {
    pub fn from_wire(name: &str) -> Self {
        match name {
            "netvm" => PropertyName::Netvm,
            "label" => PropertyName::Label,
            "debug" => PropertyName::Debug,
            "guivm" => PropertyName::Guivm,
            "name" => PropertyName::Name,
            other => PropertyName::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Failure {
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DomainEvent {
    /// The feed (re)connected; the view must be re-synced against the live set.
    ConnectionEstablished,
    Added { domain: DomainId },
    Deleted { domain: DomainId },
    PreStart { domain: DomainId },
    Started { domain: DomainId },
    StartFailed { domain: DomainId, failure: Failure },
    Paused { domain: DomainId },
    Unpaused { domain: DomainId },
    PreShutdown { domain: DomainId },
    Shutdown { domain: DomainId },
    ShutdownFailed { domain: DomainId, failure: Failure },
    /// A preloaded disposable was handed out.
    PreloadUsed { domain: DomainId, dispvm: String },
    FeatureChanged {
        domain: DomainId,
        feature: FeatureName,
        value: Option<String>,
    },
    PropertyChanged {
        domain: DomainId,
        property: PropertyName,
        value: Option<String>,
    },
    Stats {
        domain: DomainId,
        memory_kb: u64,
        cpu_usage: u32,
    },
    UnknownLifecycle { domain: DomainId, kind: String },
}

impl DomainEvent {
    pub fn domain(&self) -> Option<DomainId> {
        match self {
            DomainEvent::ConnectionEstablished => None,
            DomainEvent::Added { domain }
            | DomainEvent::Deleted { domain }
            | DomainEvent::PreStart { domain }
            | DomainEvent::Started { domain }
            | DomainEvent::StartFailed { domain, .. }
            | DomainEvent::Paused { domain }
            | DomainEvent::Unpaused { domain }
            | DomainEvent::PreShutdown { domain }
            | DomainEvent::Shutdown { domain }
            | DomainEvent::ShutdownFailed { domain, .. }
            | DomainEvent::PreloadUsed { domain, .. }
            | DomainEvent::FeatureChanged { domain, .. }
            | DomainEvent::PropertyChanged { domain, .. }
            | DomainEvent::Stats { domain, .. }
            | DomainEvent::UnknownLifecycle { domain, .. } => Some(*domain),
        }
    }

    /// The lifecycle kind this event drives through the state mapper, if any.
    pub fn lifecycle_kind(&self) -> Option<LifecycleKind> {
        let kind = match self {
            DomainEvent::PreStart { .. } => LifecycleKind::PreStart,
            DomainEvent::Started { .. } => LifecycleKind::Start,
            DomainEvent::StartFailed { .. } => LifecycleKind::StartFailed,
            DomainEvent::Paused { .. } => LifecycleKind::Paused,
            DomainEvent::Unpaused { .. } => LifecycleKind::Unpaused,
            DomainEvent::PreShutdown { .. } => LifecycleKind::PreShutdown,
            DomainEvent::Shutdown { .. } => LifecycleKind::Shutdown,
            DomainEvent::ShutdownFailed { .. } => LifecycleKind::ShutdownFailed,
            DomainEvent::UnknownLifecycle { kind, .. } => LifecycleKind::Other(kind.clone()),
            _ => return None,
        };
        Some(kind)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("event {0} carries no subject")]
    MissingSubject(String),
    #[error("event {kind} refers to unknown domain {name}")]
    UnknownDomain { kind: String, name: String },
    #[error("event {kind} is missing attribute {key}")]
    MissingAttribute { kind: String, key: String },
}

/// An event as delivered by the feed, before typing.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RawEvent {
    #[serde(default)]
    pub subject: Option<String>,
    pub event: String,
    #[serde(default)]
    pub attrs: Map<String, Value>,
}

impl RawEvent {
    pub fn new(subject: Option<&str>, event: &str) -> Self {
        Self {
            subject: subject.map(str::to_string),
            event: event.to_string(),
            attrs: Map::new(),
        }
    }

    pub fn with_attr(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.attrs.insert(key.to_string(), value.into());
        self
    }

    fn attr_str(&self, key: &str) -> Option<String> {
        match self.attrs.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }

    fn attr_u64(&self, key: &str) -> Result<u64, DecodeError> {
        self.attrs
            .get(key)
            .and_then(|v| v.as_u64().or_else(|| v.as_f64().map(|f| f as u64)))
            .ok_or_else(|| DecodeError::MissingAttribute {
                kind: self.event.clone(),
                key: key.to_string(),
            })
    }

    /// Types the event. `resolve` maps a domain name to its identity; it must keep
    /// answering for domains that were just deleted so that delete events decode.
    pub fn decode(
        &self,
        resolve: impl Fn(&str) -> Option<DomainId>,
    ) -> Result<DomainEvent, DecodeError> {
        let kind = self.event.as_str();
        if kind == "connection-established" {
            return Ok(DomainEvent::ConnectionEstablished);
        }

        // domain-add / domain-delete are emitted by the host, with the domain in `vm`.
        let subject = match kind {
            "domain-add" | "domain-delete" => self.attr_str("vm").or_else(|| self.subject.clone()),
            _ => self.subject.clone(),
        }
        .ok_or_else(|| DecodeError::MissingSubject(kind.to_string()))?;

        let domain = resolve(&subject).ok_or_else(|| DecodeError::UnknownDomain {
            kind: kind.to_string(),
            name: subject.clone(),
        })?;

        let failure = || Failure {
            reason: self.attr_str("reason").unwrap_or_default(),
        };

        let ev = match kind {
            "domain-add" => DomainEvent::Added { domain },
            "domain-delete" => DomainEvent::Deleted { domain },
            "domain-pre-start" => DomainEvent::PreStart { domain },
            "domain-start" => DomainEvent::Started { domain },
            "domain-start-failed" => DomainEvent::StartFailed {
                domain,
                failure: failure(),
            },
            "domain-paused" => DomainEvent::Paused { domain },
            "domain-unpaused" => DomainEvent::Unpaused { domain },
            "domain-pre-shutdown" => DomainEvent::PreShutdown { domain },
            "domain-shutdown" => DomainEvent::Shutdown { domain },
            "domain-shutdown-failed" => DomainEvent::ShutdownFailed {
                domain,
                failure: failure(),
            },
            "domain-preload-dispvm-used" => DomainEvent::PreloadUsed {
                domain,
                dispvm: self.attr_str("dispvm").unwrap_or_else(|| subject.clone()),
            },
            "vm-stats" => DomainEvent::Stats {
                domain,
                memory_kb: self.attr_u64("memory_kb")?,
                cpu_usage: self.attr_u64("cpu_usage")? as u32,
            },
            _ => {
                if let Some(name) = kind
                    .strip_prefix("domain-feature-set:")
                    .or_else(|| kind.strip_prefix("domain-feature-delete:"))
                {
                    let removed = kind.starts_with("domain-feature-delete:");
                    DomainEvent::FeatureChanged {
                        domain,
                        feature: FeatureName::from_wire(name),
                        value: if removed { None } else { self.attr_str("value") },
                    }
                } else if let Some(name) = kind
                    .strip_prefix("property-set:")
                    .or_else(|| kind.strip_prefix("property-del:"))
                {
                    DomainEvent::PropertyChanged {
                        domain,
                        property: PropertyName::from_wire(name),
                        value: self.attr_str("newvalue"),
                    }
                } else {
                    DomainEvent::UnknownLifecycle {
                        domain,
                        kind: kind.to_string(),
                    }
                }
            }
        };
        Ok(ev)
    }
}
