//! Turns the raw event feed into a coherent ordered view plus UI deltas.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use domtray_core::actions::{console_logs, ActionSetSpec};
use domtray_core::state::{self, MappedState};
use domtray_core::{
    ActionSet, DomainEvent, DomainId, DomainInfo, FeatureName, LifecycleKind, PowerState,
    PropertyName, RegistryRow, Upsert,
};
use tracing::{debug, info, warn};

use crate::domain::EngineSettings;
use crate::error::{ApiError, ErrorClass};
use crate::modifier::{LiveActionSet, ModifierState, ModifierSubscriber};
use crate::notify::{GateTransition, Notification, NotificationGate};
use crate::pause::{PauseAggregateMonitor, UnpauseReport};
use crate::ports::{is_truthy, DomainApi};
use crate::query;
use crate::sink::{AggregateKind, Decoration, PresentationSink, Tooltip};
use crate::store::RegistryStore;

/// Outcome of resolving an identity against the live API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Live(DomainInfo),
    Deleted,
    /// The lookup failed for a reason other than deletion; the view is left alone.
    Unavailable,
}

pub struct ReconciliationEngine {
    api: Arc<dyn DomainApi>,
    sink: Arc<dyn PresentationSink>,
    settings: EngineSettings,
    store: RegistryStore,
    gate: NotificationGate,
    modifier: ModifierState,
    action_sets: HashMap<DomainId, Arc<LiveActionSet>>,
    local: Option<DomainId>,
    expert_mode: bool,
}

impl ReconciliationEngine {
    pub fn new(
        api: Arc<dyn DomainApi>,
        sink: Arc<dyn PresentationSink>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            api,
            sink,
            settings,
            store: RegistryStore::default(),
            gate: NotificationGate::new(),
            modifier: ModifierState::new(),
            action_sets: HashMap::new(),
            local: None,
            expert_mode: false,
        }
    }

    pub fn store(&self) -> RegistryStore {
        self.store.clone()
    }

    pub fn snapshot(&self) -> Vec<RegistryRow> {
        self.store.snapshot()
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn local_domain(&self) -> Option<DomainId> {
        self.local
    }

    pub fn action_set(&self, id: DomainId) -> Option<ActionSet> {
        self.action_sets.get(&id).map(|set| set.snapshot())
    }

    pub fn modifier_active(&self) -> bool {
        self.modifier.is_active()
    }

    pub fn expert_mode(&self) -> bool {
        self.expert_mode
    }

    pub fn pause_notification_outstanding(&self) -> bool {
        self.gate.is_outstanding()
    }

    /// Builds the initial view: header, admin domains, then everything else by name.
    pub fn initialize(&mut self) -> Result<(), ApiError> {
        self.store.with_registry_mut(|r| r.insert_header());

        self.local = match self.api.local_domain() {
            Ok(id) => Some(id),
            Err(err) => {
                warn!("cannot determine the local domain: {err}");
                None
            }
        };
        self.expert_mode = self.read_global_expert_mode();

        let mut infos: Vec<DomainInfo> = Vec::new();
        for id in self.api.list_domains()? {
            match self.api.info(id) {
                Ok(info) => infos.push(info),
                Err(err) => debug!(%id, "skipping domain during startup: {err}"),
            }
        }
        let (mut admins, mut rest): (Vec<_>, Vec<_>) =
            infos.into_iter().partition(|info| info.class.is_admin());
        admins.sort_by(|a, b| a.name.cmp(&b.name));
        rest.sort_by(|a, b| a.name.cmp(&b.name));

        for info in admins.iter().chain(rest.iter()) {
            self.add_resolved(info);
        }

        for entry in self.store.entries() {
            let running = self.api.is_running(entry.id).unwrap_or(false);
            if self.store.with_registry_mut(|r| r.set_visible(entry.id, running)) {
                self.sink.on_entry_visibility_changed(entry.id, running);
            }
            if running {
                self.emit_tooltip(entry.id);
            }
        }

        info!(domains = self.store.entries().len(), "domain list initialised");
        Ok(())
    }

    pub fn handle(&mut self, event: DomainEvent) {
        match event {
            DomainEvent::ConnectionEstablished => self.refresh_all(),
            DomainEvent::Added { domain } => self.add_domain(domain),
            DomainEvent::Deleted { domain } => self.remove_domain(domain),
            DomainEvent::StartFailed { domain, failure } => {
                self.update_domain(domain, &LifecycleKind::StartFailed, Some(&failure.reason))
            }
            DomainEvent::ShutdownFailed { domain, failure } => self.update_domain(
                domain,
                &LifecycleKind::ShutdownFailed,
                Some(&failure.reason),
            ),
            DomainEvent::PreloadUsed { dispvm, .. } => {
                self.sink
                    .on_notification(&Notification::preload_used(&dispvm));
            }
            DomainEvent::FeatureChanged {
                domain,
                feature,
                value,
            } => self.feature_changed(domain, feature, value),
            DomainEvent::PropertyChanged {
                domain,
                property,
                value,
            } => self.property_changed(domain, property, value),
            DomainEvent::Stats {
                domain,
                memory_kb,
                cpu_usage,
            } => {
                if self.store.contains(domain) {
                    self.sink.on_entry_decoration_changed(
                        domain,
                        &Decoration::Stats {
                            memory_kb,
                            cpu_usage,
                        },
                    );
                }
            }
            other => {
                if let (Some(domain), Some(kind)) = (other.domain(), other.lifecycle_kind()) {
                    self.update_domain(domain, &kind, None);
                }
            }
        }
    }

    /// Resolves `id`. Only a not-found answer removes what the view holds for it;
    /// other failures (timeouts included) skip the event and keep the entry.
    pub fn resolve_or_treat_as_deleted(&mut self, id: DomainId) -> Resolution {
        let api = Arc::clone(&self.api);
        match query::bounded(self.settings.query_timeout(), move || api.info(id)) {
            Ok(info) => Resolution::Live(info),
            Err(err) => match err.query_class() {
                ErrorClass::EntityVanished => {
                    self.drop_domain(id);
                    Resolution::Deleted
                }
                _ => {
                    warn!(%id, "cannot resolve domain, event skipped: {err}");
                    Resolution::Unavailable
                }
            },
        }
    }

    /// Processes one lifecycle event for `id`.
    pub fn update_domain(&mut self, id: DomainId, kind: &LifecycleKind, reason: Option<&str>) {
        let Resolution::Live(info) = self.resolve_or_treat_as_deleted(id) else {
            return;
        };

        let state = match state::map(kind) {
            MappedState::Known(state) => state,
            MappedState::Unknown => match self.query_state(id) {
                Ok(state) => state,
                Err(err) if err.query_class() == ErrorClass::EntityVanished => {
                    debug!(domain = %info.name, "domain vanished while querying its state");
                    self.drop_domain(id);
                    return;
                }
                Err(err) => {
                    debug!(domain = %info.name, "state query failed: {err}");
                    PowerState::Transient
                }
            },
        };

        if !self.store.contains(id) && !self.add_resolved(&info) {
            return;
        }

        match self.store.with_registry_mut(|r| r.upsert(&info, state)) {
            Upsert::Updated {
                visibility_changed, ..
            } => {
                self.sink.on_entry_state_changed(id, state);
                if visibility_changed {
                    let visible = domtray_core::visibility_for(info.class, state);
                    self.sink.on_entry_visibility_changed(id, visible);
                }
            }
            Upsert::Inserted { position } => {
                if let Some(entry) = self.store.get(id) {
                    self.sink.on_entry_added(&entry, position);
                }
            }
        }
        self.rebuild_action_set(&info, state);

        if kind.is_shutdown() {
            if info.is_template_like() {
                self.propagate_outdated(id);
            }
            self.set_outdated(id, false);
            self.force_visible(id, false);
        } else if kind.is_start_family() {
            self.set_outdated(id, false);
            self.force_visible(id, true);
        }

        self.recheck_pause();

        if let Some(notification) = Notification::lifecycle(kind, &info.name, reason) {
            self.sink.on_notification(&notification);
        }
    }

    /// Adds an entry for `id` unless it is already listed or already gone.
    pub fn add_domain(&mut self, id: DomainId) {
        if self.store.contains(id) {
            return;
        }
        if let Resolution::Live(info) = self.resolve_or_treat_as_deleted(id) {
            self.add_resolved(&info);
        }
    }

    /// Idempotent.
    pub fn remove_domain(&mut self, id: DomainId) {
        self.drop_domain(id);
    }

    /// Re-syncs the view against the live domain set.
    pub fn refresh_all(&mut self) {
        let live: HashSet<DomainId> = match self.api.list_domains() {
            Ok(ids) => ids.into_iter().collect(),
            Err(err) => {
                warn!("refresh skipped, cannot list domains: {err}");
                return;
            }
        };

        let stale: Vec<DomainId> = self
            .store
            .entries()
            .into_iter()
            .map(|e| e.id)
            .filter(|id| !live.contains(id))
            .collect();
        for id in stale {
            self.drop_domain(id);
        }

        let mut live: Vec<DomainId> = live.into_iter().collect();
        live.sort();
        let resync = LifecycleKind::Other(String::new());
        for id in live {
            self.update_domain(id, &resync, None);
        }
    }

    /// Recomputes tooltips of visible entries. One entry's failure doesn't stop the pass.
    pub fn refresh_tooltips(&mut self) {
        for entry in self.store.entries() {
            if !entry.visible {
                continue;
            }
            match self.tooltip(entry.id) {
                Ok(tooltip) => self
                    .sink
                    .on_entry_decoration_changed(entry.id, &Decoration::Tooltip(tooltip)),
                Err(err) => debug!(domain = %entry.name, "tooltip refresh failed: {err}"),
            }
        }
    }

    /// Returns the domains whose action sets were reconfigured.
    pub fn set_modifier(&mut self, active: bool) -> Vec<DomainId> {
        let changed = self.modifier.set(active);
        for id in &changed {
            if let Some(set) = self.action_sets.get(id) {
                self.sink.on_action_set_reconfigure(*id, &set.snapshot());
            }
        }
        changed
    }

    pub fn unpause_all(&mut self) -> UnpauseReport {
        let report = PauseAggregateMonitor::unpause_all(
            self.api.as_ref(),
            &self.store.entries(),
            self.local,
        );
        info!(
            unpaused = report.unpaused.len(),
            denied = report.denied.len(),
            failed = report.failed.len(),
            "unpause all finished"
        );
        report
    }

    fn feature_changed(&mut self, id: DomainId, feature: FeatureName, value: Option<String>) {
        if feature == FeatureName::Internal {
            self.update_domain(id, &LifecycleKind::Other("internal".to_string()), None);
            return;
        }
        if !self.store.contains(id) {
            return;
        }
        match feature {
            FeatureName::UpdatesAvailable => {
                let available = is_truthy(value.as_deref());
                self.sink
                    .on_entry_decoration_changed(id, &Decoration::Updates { available });
            }
            FeatureName::Gui | FeatureName::ExpertMode => self.debug_console_changed(id),
            _ => {}
        }
    }

    fn property_changed(&mut self, id: DomainId, property: PropertyName, value: Option<String>) {
        if !self.store.contains(id) {
            return;
        }
        match property {
            PropertyName::Netvm => self.emit_tooltip(id),
            PropertyName::Label => {
                let label = match value {
                    Some(label) => Some(label),
                    None => self.api.property(id, "label").ok().flatten(),
                };
                if let Some(label) = label {
                    self.sink
                        .on_entry_decoration_changed(id, &Decoration::Icon { label });
                }
            }
            PropertyName::Debug | PropertyName::Guivm => self.debug_console_changed(id),
            PropertyName::Name => {
                let Some(name) = value else {
                    return;
                };
                let Some(position) = self.store.with_registry_mut(|r| r.rename(id, &name))
                else {
                    return;
                };
                self.sink.on_entry_removed(id);
                if let Some(entry) = self.store.get(id) {
                    self.sink.on_entry_added(&entry, position);
                }
                if let Resolution::Live(info) = self.resolve_or_treat_as_deleted(id) {
                    if let Some(entry) = self.store.get(id) {
                        self.rebuild_action_set(&info, entry.state);
                    }
                }
            }
            _ => {}
        }
    }

    fn debug_console_changed(&mut self, id: DomainId) {
        let targets: Vec<DomainId> = if Some(id) == self.local {
            self.expert_mode = self.read_global_expert_mode();
            self.action_sets.keys().copied().collect()
        } else {
            vec![id]
        };
        for target in targets {
            let visible = self.debug_console_visible(target);
            if let Some(set) = self.action_sets.get(&target) {
                if set.set_debug_console(visible) {
                    self.sink.on_action_set_reconfigure(target, &set.snapshot());
                }
            }
        }
    }

    fn debug_console_visible(&self, id: DomainId) -> bool {
        let api = self.api.as_ref();
        self.expert_mode
            || is_truthy(api.property(id, "debug").ok().flatten().as_deref())
            || matches!(api.property(id, "guivm"), Ok(None))
            || !is_truthy(api.feature_with_template(id, "gui").ok().flatten().as_deref())
            || is_truthy(api.feature(id, "expert-mode").ok().flatten().as_deref())
    }

    fn read_global_expert_mode(&self) -> bool {
        let Some(local) = self.local else {
            return false;
        };
        is_truthy(self.api.feature(local, "expert-mode").ok().flatten().as_deref())
    }

    /// Add path: the state comes from a live query. Returns whether the entry exists afterwards.
    fn add_resolved(&mut self, info: &DomainInfo) -> bool {
        if self.store.contains(info.id) {
            return true;
        }
        let state = match self.query_state(info.id) {
            Ok(state) => state,
            Err(err) if err.query_class() == ErrorClass::EntityVanished => {
                debug!(domain = %info.name, "domain vanished before it could be added");
                return false;
            }
            Err(err) => {
                debug!(domain = %info.name, "state unavailable while adding: {err}");
                PowerState::Halted
            }
        };
        self.insert_with_state(info, state);
        true
    }

    fn insert_with_state(&mut self, info: &DomainInfo, state: PowerState) {
        let upsert = self.store.with_registry_mut(|r| r.upsert(info, state));
        if let Upsert::Inserted { position } = upsert {
            if let Some(entry) = self.store.get(info.id) {
                debug!(domain = %entry.name, position, "entry added");
                self.sink.on_entry_added(&entry, position);
            }
        }
        self.rebuild_action_set(info, state);
    }

    /// Removes the entry and its action set, then rechecks the pause aggregate.
    fn drop_domain(&mut self, id: DomainId) {
        self.action_sets.remove(&id);
        if let Some(entry) = self.store.with_registry_mut(|r| r.remove(id)) {
            debug!(domain = %entry.name, "entry removed");
            self.sink.on_entry_removed(id);
            self.recheck_pause();
        }
    }

    fn rebuild_action_set(&mut self, info: &DomainInfo, state: PowerState) {
        if info.class.is_admin() || state == PowerState::Halted {
            self.action_sets.remove(&info.id);
            return;
        }

        let logs = console_logs(&self.settings.console_log_dir, &info.name)
            .into_iter()
            .filter(|(_, path)| path.is_file())
            .collect();
        let spec = ActionSetSpec {
            state,
            class: info.class,
            internal: info.internal,
            auto_cleanup: info.auto_cleanup,
            debug_console: self.debug_console_visible(info.id),
            logs,
        };
        let set = ActionSet::build(&spec, self.modifier.is_active());
        self.sink.on_action_set_reconfigure(info.id, &set);

        let live = LiveActionSet::new(info.id, set);
        let subscriber: Arc<dyn ModifierSubscriber> = live.clone();
        self.modifier.subscribe(&subscriber);
        self.action_sets.insert(info.id, live);
    }

    fn propagate_outdated(&mut self, template: DomainId) {
        for entry in self.store.entries() {
            if entry.id == template {
                continue;
            }
            let api = Arc::clone(&self.api);
            let id = entry.id;
            let check = move || outdated_after_template_shutdown(api.as_ref(), id, template);
            match query::bounded(self.settings.query_timeout(), check) {
                Ok(true) => self.set_outdated(id, true),
                Ok(false) => {}
                Err(err) => debug!(domain = %entry.name, "skipped in outdated scan: {err}"),
            }
        }
    }

    fn set_outdated(&mut self, id: DomainId, outdated: bool) {
        if self.store.with_registry_mut(|r| r.set_outdated(id, outdated)) {
            self.sink.on_entry_outdated_changed(id, outdated);
        }
    }

    fn force_visible(&mut self, id: DomainId, visible: bool) {
        if self.store.with_registry_mut(|r| r.set_visible(id, visible)) {
            self.sink.on_entry_visibility_changed(id, visible);
        }
    }

    fn recheck_pause(&mut self) {
        let api = Arc::clone(&self.api);
        let scan = move || Ok(PauseAggregateMonitor::all_paused(api.as_ref()));
        let all_paused = query::bounded(self.settings.query_timeout(), scan).unwrap_or_else(|err| {
            debug!("pause aggregate: scan abandoned: {err}");
            false
        });
        match self.gate.update(all_paused) {
            GateTransition::Emit => {
                info!("every running domain is paused");
                self.sink
                    .on_aggregate_notify(AggregateKind::AllPaused, &Notification::all_paused());
            }
            GateTransition::Withdraw => self.sink.on_aggregate_withdraw(AggregateKind::AllPaused),
            GateTransition::Unchanged => {}
        }
    }

    fn query_state(&self, id: DomainId) -> Result<PowerState, ApiError> {
        let api = Arc::clone(&self.api);
        query::bounded(self.settings.query_timeout(), move || api.power_state(id))
    }

    fn emit_tooltip(&self, id: DomainId) {
        match self.tooltip(id) {
            Ok(tooltip) => self
                .sink
                .on_entry_decoration_changed(id, &Decoration::Tooltip(tooltip)),
            Err(err) => debug!(%id, "tooltip unavailable: {err}"),
        }
    }

    fn tooltip(&self, id: DomainId) -> Result<Tooltip, ApiError> {
        let api = Arc::clone(&self.api);
        let outdated = self.store.get(id).map(|e| e.outdated).unwrap_or(false);
        query::bounded(self.settings.query_timeout(), move || {
            tooltip_for(api.as_ref(), id, outdated)
        })
    }
}

fn tooltip_for(api: &dyn DomainApi, id: DomainId, outdated: bool) -> Result<Tooltip, ApiError> {
    let info = api.info(id)?;
    let template = match api.template(id)? {
        Some(template) => Some(api.info(template)?.name),
        None => None,
    };
    Ok(Tooltip {
        name: info.name,
        netvm: api.property(id, "netvm")?,
        template,
        storage: api.storage_usage(id).ok(),
        outdated,
        updates_available: is_truthy(api.feature(id, "updates-available")?.as_deref()),
    })
}

/// Whether `id` runs on `template` (directly or one level removed) and has stale volumes.
fn outdated_after_template_shutdown(
    api: &dyn DomainApi,
    id: DomainId,
    template: DomainId,
) -> Result<bool, ApiError> {
    if !api.is_running(id)? {
        return Ok(false);
    }
    let first = api.template(id)?;
    let second = first.and_then(|t| api.template(t).ok().flatten());
    if first != Some(template) && second != Some(template) {
        return Ok(false);
    }
    Ok(api.has_outdated_volumes(id).unwrap_or(false))
}
