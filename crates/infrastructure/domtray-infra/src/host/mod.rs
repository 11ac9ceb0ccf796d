//! A simulated VM host backing the domain API in tests and in the CLI.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use camino::Utf8Path;
use domtray_app_core::{ApiError, DomainApi, StorageUsage};
use domtray_core::state::{self, MappedState};
use domtray_core::{
    ClassTag, DomainEvent, DomainId, DomainInfo, FeatureName, PowerState, PropertyName,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum HostError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid host description: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("a domain named {0} already exists")]
    DuplicateName(String),
    #[error("no domain named {0}")]
    UnknownDomain(String),
}

fn default_class() -> ClassTag {
    ClassTag::AppVM
}

fn default_state() -> PowerState {
    PowerState::Halted
}

fn default_local() -> String {
    "dom0".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainSpec {
    pub name: String,
    #[serde(default = "default_class")]
    pub class: ClassTag,
    #[serde(default = "default_state")]
    pub state: PowerState,
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub internal: bool,
    #[serde(default)]
    pub preload: bool,
    #[serde(default)]
    pub auto_cleanup: bool,
    #[serde(default)]
    pub template_for_dispvms: bool,
    #[serde(default)]
    pub outdated_volumes: bool,
    #[serde(default)]
    pub storage: Option<StorageUsage>,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
    #[serde(default)]
    pub features: BTreeMap<String, String>,
    /// Every mutating call on this domain fails with permission denied.
    #[serde(default)]
    pub deny_actions: bool,
    /// A non-forced shutdown fails with this reason.
    #[serde(default)]
    pub shutdown_refusal: Option<String>,
}

impl DomainSpec {
    pub fn new(name: &str, class: ClassTag, state: PowerState) -> Self {
        Self {
            name: name.to_string(),
            class,
            state,
            template: None,
            internal: false,
            preload: false,
            auto_cleanup: false,
            template_for_dispvms: false,
            outdated_volumes: false,
            storage: None,
            properties: BTreeMap::new(),
            features: BTreeMap::new(),
            deny_actions: false,
            shutdown_refusal: None,
        }
    }

    pub fn template(mut self, template: &str) -> Self {
        self.template = Some(template.to_string());
        self
    }

    pub fn property(mut self, name: &str, value: &str) -> Self {
        self.properties.insert(name.to_string(), value.to_string());
        self
    }

    pub fn feature(mut self, name: &str, value: &str) -> Self {
        self.features.insert(name.to_string(), value.to_string());
        self
    }
}

/// JSON description of a host: its domains plus the name of the local admin domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostSpec {
    #[serde(default = "default_local")]
    pub local: String,
    pub domains: Vec<DomainSpec>,
}

impl HostSpec {
    pub fn load(path: &Utf8Path) -> Result<Self, HostError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

#[derive(Debug, Clone)]
struct Record {
    info: DomainInfo,
    state: PowerState,
    template: Option<String>,
    outdated_volumes: bool,
    storage: StorageUsage,
    properties: BTreeMap<String, String>,
    features: BTreeMap<String, String>,
    deny_actions: bool,
    shutdown_refusal: Option<String>,
    state_query_failure: Option<ApiError>,
}

#[derive(Debug, Default)]
struct HostState {
    domains: BTreeMap<DomainId, Record>,
    /// Names of deleted domains keep pointing at their old identity.
    names: HashMap<String, DomainId>,
    local: Option<String>,
    outbox: Vec<DomainEvent>,
    services: Vec<(DomainId, String, Option<String>)>,
}

impl HostState {
    fn record(&self, id: DomainId) -> Result<&Record, ApiError> {
        self.domains.get(&id).ok_or(ApiError::NotFound)
    }

    fn record_mut(&mut self, id: DomainId) -> Result<&mut Record, ApiError> {
        self.domains.get_mut(&id).ok_or(ApiError::NotFound)
    }

    fn live_id(&self, name: &str) -> Option<DomainId> {
        self.names
            .get(name)
            .copied()
            .filter(|id| self.domains.contains_key(id))
    }

    fn mutable(&mut self, id: DomainId) -> Result<&mut Record, ApiError> {
        let record = self.record_mut(id)?;
        if record.deny_actions {
            return Err(ApiError::PermissionDenied(format!(
                "not allowed to control {}",
                record.info.name
            )));
        }
        Ok(record)
    }
}

/// Thread-safe simulated host implementing [`DomainApi`].
///
/// Mutating API calls change the simulated state and queue the events a real
/// host would report; [`InMemoryHost::take_events`] hands them out.
#[derive(Debug, Default)]
pub struct InMemoryHost {
    inner: Mutex<HostState>,
}

impl InMemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_spec(spec: &HostSpec) -> Result<Self, HostError> {
        let host = Self::new();
        for domain in &spec.domains {
            host.create(domain.clone())?;
        }
        host.inner.lock().unwrap().local = Some(spec.local.clone());
        Ok(host)
    }

    pub fn load(path: &Utf8Path) -> Result<Self, HostError> {
        Self::from_spec(&HostSpec::load(path)?)
    }

    pub fn create(&self, spec: DomainSpec) -> Result<DomainId, HostError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.live_id(&spec.name).is_some() {
            return Err(HostError::DuplicateName(spec.name));
        }
        let id = DomainId::new();
        let record = Record {
            info: DomainInfo {
                id,
                name: spec.name.clone(),
                class: spec.class,
                internal: spec.internal || spec.features.contains_key("internal"),
                preload: spec.preload,
                auto_cleanup: spec.auto_cleanup,
                template_for_dispvms: spec.template_for_dispvms,
            },
            state: spec.state,
            template: spec.template,
            outdated_volumes: spec.outdated_volumes,
            storage: spec.storage.unwrap_or_default(),
            properties: spec.properties,
            features: spec.features,
            deny_actions: spec.deny_actions,
            shutdown_refusal: spec.shutdown_refusal,
            state_query_failure: None,
        };
        inner.names.insert(spec.name, id);
        inner.domains.insert(id, record);
        Ok(id)
    }

    /// Removes the domain. Its name keeps resolving to the stale identity.
    pub fn delete(&self, name: &str) -> Option<DomainId> {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.live_id(name)?;
        inner.domains.remove(&id);
        debug!(domain = name, "simulated domain deleted");
        Some(id)
    }

    /// Identity for `name`, including domains that were deleted.
    pub fn id_of(&self, name: &str) -> Option<DomainId> {
        self.inner.lock().unwrap().names.get(name).copied()
    }

    pub fn state_of(&self, name: &str) -> Option<PowerState> {
        let inner = self.inner.lock().unwrap();
        let id = inner.live_id(name)?;
        inner.domains.get(&id).map(|r| r.state)
    }

    pub fn set_state(&self, name: &str, state: PowerState) -> Result<(), HostError> {
        self.with_record(name, |r| r.state = state)
    }

    pub fn set_outdated_volumes(&self, name: &str, outdated: bool) -> Result<(), HostError> {
        self.with_record(name, |r| r.outdated_volumes = outdated)
    }

    pub fn set_feature(
        &self,
        name: &str,
        feature: &str,
        value: Option<&str>,
    ) -> Result<(), HostError> {
        self.with_record(name, |r| {
            match value {
                Some(value) => r.features.insert(feature.to_string(), value.to_string()),
                None => r.features.remove(feature),
            };
            if feature == "internal" {
                r.info.internal = value.is_some();
            }
        })
    }

    pub fn set_property(
        &self,
        name: &str,
        property: &str,
        value: Option<&str>,
    ) -> Result<(), HostError> {
        self.with_record(name, |r| {
            match value {
                Some(value) => r.properties.insert(property.to_string(), value.to_string()),
                None => r.properties.remove(property),
            };
        })
    }

    /// Makes direct state queries for `name` fail with `failure` until cleared.
    pub fn fail_state_queries(
        &self,
        name: &str,
        failure: Option<ApiError>,
    ) -> Result<(), HostError> {
        self.with_record(name, |r| r.state_query_failure = failure)
    }

    pub fn deny_actions(&self, name: &str, deny: bool) -> Result<(), HostError> {
        self.with_record(name, |r| r.deny_actions = deny)
    }

    pub fn refuse_shutdown(&self, name: &str, reason: Option<&str>) -> Result<(), HostError> {
        self.with_record(name, |r| r.shutdown_refusal = reason.map(str::to_string))
    }

    /// Applies what an observed event says about the world to the simulated state.
    pub fn apply_event(&self, event: &DomainEvent) {
        let Some(id) = event.domain() else {
            return;
        };
        let mut inner = self.inner.lock().unwrap();
        let Ok(record) = inner.record_mut(id) else {
            return;
        };
        if let Some(kind) = event.lifecycle_kind() {
            if let MappedState::Known(state) = state::map(&kind) {
                record.state = state;
            }
            return;
        }
        match event {
            DomainEvent::FeatureChanged { feature, value, .. } => {
                let key = match feature {
                    FeatureName::UpdatesAvailable => "updates-available",
                    FeatureName::Gui => "gui",
                    FeatureName::ExpertMode => "expert-mode",
                    FeatureName::Internal => "internal",
                    FeatureName::Other(name) => name.as_str(),
                };
                match value {
                    Some(value) => record.features.insert(key.to_string(), value.clone()),
                    None => record.features.remove(key),
                };
                if *feature == FeatureName::Internal {
                    record.info.internal = value.is_some();
                }
            }
            DomainEvent::PropertyChanged {
                property, value, ..
            } => {
                let key = match property {
                    PropertyName::Netvm => "netvm",
                    PropertyName::Label => "label",
                    PropertyName::Debug => "debug",
                    PropertyName::Guivm => "guivm",
                    PropertyName::Name => "name",
                    PropertyName::Other(name) => name.as_str(),
                };
                if *property == PropertyName::Name {
                    if let Some(new_name) = value.clone() {
                        let old = std::mem::replace(&mut record.info.name, new_name.clone());
                        inner.names.remove(&old);
                        inner.names.insert(new_name, id);
                    }
                    return;
                }
                match value {
                    Some(value) => record.properties.insert(key.to_string(), value.clone()),
                    None => record.properties.remove(key),
                };
            }
            _ => {}
        }
    }

    /// Events produced by mutating API calls since the last call.
    pub fn take_events(&self) -> Vec<DomainEvent> {
        std::mem::take(&mut self.inner.lock().unwrap().outbox)
    }

    /// Services started through [`DomainApi::run_service`], as `(domain, service, user)`.
    pub fn services(&self) -> Vec<(DomainId, String, Option<String>)> {
        self.inner.lock().unwrap().services.clone()
    }

    fn with_record(&self, name: &str, f: impl FnOnce(&mut Record)) -> Result<(), HostError> {
        let mut inner = self.inner.lock().unwrap();
        let id = inner
            .live_id(name)
            .ok_or_else(|| HostError::UnknownDomain(name.to_string()))?;
        let record = inner
            .domains
            .get_mut(&id)
            .ok_or_else(|| HostError::UnknownDomain(name.to_string()))?;
        f(record);
        Ok(())
    }

    fn transition(
        &self,
        id: DomainId,
        check: impl FnOnce(&Record) -> Result<(), ApiError>,
        next: PowerState,
        events: impl FnOnce(DomainId) -> Vec<DomainEvent>,
    ) -> Result<(), ApiError> {
        let mut inner = self.inner.lock().unwrap();
        let record = inner.mutable(id)?;
        check(record)?;
        record.state = next;
        inner.outbox.extend(events(id));
        Ok(())
    }
}

fn running(record: &Record) -> bool {
    matches!(
        record.state,
        PowerState::Running | PowerState::Paused | PowerState::Transient
    )
}

fn not_running(record: &Record) -> ApiError {
    ApiError::Failed(format!("qube {} is not running", record.info.name))
}

impl DomainApi for InMemoryHost {
    fn list_domains(&self) -> Result<Vec<DomainId>, ApiError> {
        Ok(self.inner.lock().unwrap().domains.keys().copied().collect())
    }

    fn info(&self, id: DomainId) -> Result<DomainInfo, ApiError> {
        Ok(self.inner.lock().unwrap().record(id)?.info.clone())
    }

    fn local_domain(&self) -> Result<DomainId, ApiError> {
        let inner = self.inner.lock().unwrap();
        inner
            .local
            .as_deref()
            .and_then(|name| inner.live_id(name))
            .ok_or_else(|| ApiError::Failed("no local domain".to_string()))
    }

    fn power_state(&self, id: DomainId) -> Result<PowerState, ApiError> {
        let inner = self.inner.lock().unwrap();
        let record = inner.record(id)?;
        match &record.state_query_failure {
            Some(failure) => Err(failure.clone()),
            None => Ok(record.state),
        }
    }

    fn is_running(&self, id: DomainId) -> Result<bool, ApiError> {
        Ok(running(self.inner.lock().unwrap().record(id)?))
    }

    fn is_paused(&self, id: DomainId) -> Result<bool, ApiError> {
        Ok(self.inner.lock().unwrap().record(id)?.state == PowerState::Paused)
    }

    fn template(&self, id: DomainId) -> Result<Option<DomainId>, ApiError> {
        let inner = self.inner.lock().unwrap();
        let record = inner.record(id)?;
        Ok(record
            .template
            .as_deref()
            .and_then(|name| inner.names.get(name).copied()))
    }

    fn has_outdated_volumes(&self, id: DomainId) -> Result<bool, ApiError> {
        Ok(self.inner.lock().unwrap().record(id)?.outdated_volumes)
    }

    fn storage_usage(&self, id: DomainId) -> Result<StorageUsage, ApiError> {
        Ok(self.inner.lock().unwrap().record(id)?.storage)
    }

    fn property(&self, id: DomainId, name: &str) -> Result<Option<String>, ApiError> {
        let inner = self.inner.lock().unwrap();
        let record = inner.record(id)?;
        if name == "name" {
            return Ok(Some(record.info.name.clone()));
        }
        Ok(record.properties.get(name).cloned())
    }

    fn feature(&self, id: DomainId, name: &str) -> Result<Option<String>, ApiError> {
        Ok(self.inner.lock().unwrap().record(id)?.features.get(name).cloned())
    }

    fn feature_with_template(
        &self,
        id: DomainId,
        name: &str,
    ) -> Result<Option<String>, ApiError> {
        if let Some(value) = self.feature(id, name)? {
            return Ok(Some(value));
        }
        match self.template(id)? {
            Some(template) => match self.feature(template, name) {
                Err(ApiError::NotFound) => Ok(None),
                other => other,
            },
            None => Ok(None),
        }
    }

    fn pause(&self, id: DomainId) -> Result<(), ApiError> {
        self.transition(
            id,
            |r| match r.state {
                PowerState::Running => Ok(()),
                _ => Err(not_running(r)),
            },
            PowerState::Paused,
            |domain| vec![DomainEvent::Paused { domain }],
        )
    }

    fn unpause(&self, id: DomainId) -> Result<(), ApiError> {
        self.transition(
            id,
            |r| match r.state {
                PowerState::Paused => Ok(()),
                _ => Err(ApiError::Failed(format!("qube {} is not paused", r.info.name))),
            },
            PowerState::Running,
            |domain| vec![DomainEvent::Unpaused { domain }],
        )
    }

    fn shutdown(&self, id: DomainId, force: bool) -> Result<(), ApiError> {
        self.transition(
            id,
            |r| {
                if !running(r) {
                    return Err(not_running(r));
                }
                match (&r.shutdown_refusal, force) {
                    (Some(reason), false) => Err(ApiError::Failed(reason.clone())),
                    _ => Ok(()),
                }
            },
            PowerState::Halted,
            |domain| {
                vec![
                    DomainEvent::PreShutdown { domain },
                    DomainEvent::Shutdown { domain },
                ]
            },
        )
    }

    fn kill(&self, id: DomainId) -> Result<(), ApiError> {
        self.transition(
            id,
            |r| if running(r) { Ok(()) } else { Err(not_running(r)) },
            PowerState::Halted,
            |domain| vec![DomainEvent::Shutdown { domain }],
        )
    }

    fn run_service(
        &self,
        id: DomainId,
        service: &str,
        user: Option<&str>,
    ) -> Result<(), ApiError> {
        let mut inner = self.inner.lock().unwrap();
        let record = inner.mutable(id)?;
        if record.state != PowerState::Running {
            return Err(not_running(record));
        }
        inner
            .services
            .push((id, service.to_string(), user.map(str::to_string)));
        Ok(())
    }
}
