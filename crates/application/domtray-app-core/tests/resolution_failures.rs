use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use domtray_app_core::{
    ApiError, DeltaLog, DomainApi, EngineSettings, ReconciliationEngine, StorageUsage, UiDelta,
};
use domtray_core::{ClassTag, DomainEvent, DomainId, DomainInfo, PowerState};
use domtray_infra::{DomainSpec, HostSpec, InMemoryHost};

/// How `info()` misbehaves once armed.
#[derive(Clone)]
enum InfoFault {
    Fail(ApiError),
    Stall(Duration),
}

/// Delegates to the in-memory host, except for `info()` once a fault is armed.
struct FaultyApi {
    host: Arc<InMemoryHost>,
    fault: Mutex<Option<InfoFault>>,
}

impl FaultyApi {
    fn arm(&self, fault: InfoFault) {
        *self.fault.lock().unwrap() = Some(fault);
    }
}

impl DomainApi for FaultyApi {
    fn list_domains(&self) -> Result<Vec<DomainId>, ApiError> {
        self.host.list_domains()
    }
    fn info(&self, id: DomainId) -> Result<DomainInfo, ApiError> {
        let fault = self.fault.lock().unwrap().clone();
        match fault {
            Some(InfoFault::Fail(err)) => Err(err),
            Some(InfoFault::Stall(delay)) => {
                std::thread::sleep(delay);
                self.host.info(id)
            }
            None => self.host.info(id),
        }
    }
    fn local_domain(&self) -> Result<DomainId, ApiError> {
        self.host.local_domain()
    }
    fn power_state(&self, id: DomainId) -> Result<PowerState, ApiError> {
        self.host.power_state(id)
    }
    fn is_running(&self, id: DomainId) -> Result<bool, ApiError> {
        self.host.is_running(id)
    }
    fn is_paused(&self, id: DomainId) -> Result<bool, ApiError> {
        self.host.is_paused(id)
    }
    fn template(&self, id: DomainId) -> Result<Option<DomainId>, ApiError> {
        self.host.template(id)
    }
    fn has_outdated_volumes(&self, id: DomainId) -> Result<bool, ApiError> {
        self.host.has_outdated_volumes(id)
    }
    fn storage_usage(&self, id: DomainId) -> Result<StorageUsage, ApiError> {
        self.host.storage_usage(id)
    }
    fn property(&self, id: DomainId, name: &str) -> Result<Option<String>, ApiError> {
        self.host.property(id, name)
    }
    fn feature(&self, id: DomainId, name: &str) -> Result<Option<String>, ApiError> {
        self.host.feature(id, name)
    }
    fn feature_with_template(
        &self,
        id: DomainId,
        name: &str,
    ) -> Result<Option<String>, ApiError> {
        self.host.feature_with_template(id, name)
    }
    fn pause(&self, id: DomainId) -> Result<(), ApiError> {
        self.host.pause(id)
    }
    fn unpause(&self, id: DomainId) -> Result<(), ApiError> {
        self.host.unpause(id)
    }
    fn shutdown(&self, id: DomainId, force: bool) -> Result<(), ApiError> {
        self.host.shutdown(id, force)
    }
    fn kill(&self, id: DomainId) -> Result<(), ApiError> {
        self.host.kill(id)
    }
    fn run_service(
        &self,
        id: DomainId,
        service: &str,
        user: Option<&str>,
    ) -> Result<(), ApiError> {
        self.host.run_service(id, service, user)
    }
}

fn setup() -> (Arc<InMemoryHost>, Arc<FaultyApi>, ReconciliationEngine, DeltaLog) {
    let spec = HostSpec {
        local: "dom0".to_string(),
        domains: vec![
            DomainSpec::new("dom0", ClassTag::AdminVM, PowerState::Running),
            DomainSpec::new("work", ClassTag::AppVM, PowerState::Running),
            DomainSpec::new("mail", ClassTag::AppVM, PowerState::Running),
        ],
    };
    let host = Arc::new(InMemoryHost::from_spec(&spec).unwrap());
    let api = Arc::new(FaultyApi {
        host: host.clone(),
        fault: Mutex::new(None),
    });
    let settings = EngineSettings {
        state_query_timeout_ms: 100,
        ..EngineSettings::default()
    };
    let log = DeltaLog::new();
    let mut engine = ReconciliationEngine::new(api.clone(), Arc::new(log.clone()), settings);
    engine.initialize().unwrap();
    log.drain();
    (host, api, engine, log)
}

#[test]
fn failed_lookup_keeps_the_entry() {
    let (host, api, mut engine, log) = setup();
    let work = host.id_of("work").unwrap();
    api.arm(InfoFault::Fail(ApiError::Failed("qubesd busy".to_string())));

    engine.handle(DomainEvent::Paused { domain: work });

    let entry = engine.store().get(work).expect("work must stay listed");
    assert_eq!(entry.state, PowerState::Running);
    assert!(!log.deltas().contains(&UiDelta::EntryRemoved { id: work }));
}

#[test]
fn permission_denied_lookup_keeps_the_entry() {
    let (host, api, mut engine, _log) = setup();
    let work = host.id_of("work").unwrap();
    api.arm(InfoFault::Fail(ApiError::PermissionDenied("policy".to_string())));

    engine.add_domain(work);
    engine.handle(DomainEvent::Started { domain: work });
    assert!(engine.store().contains(work));
}

#[test]
fn not_found_lookup_still_removes() {
    let (host, api, mut engine, log) = setup();
    let work = host.id_of("work").unwrap();
    api.arm(InfoFault::Fail(ApiError::NotFound));

    engine.handle(DomainEvent::Paused { domain: work });
    assert!(!engine.store().contains(work));
    assert!(log.deltas().contains(&UiDelta::EntryRemoved { id: work }));
}

#[test]
fn stalled_lookup_is_cut_off() {
    let (host, api, mut engine, _log) = setup();
    let work = host.id_of("work").unwrap();
    api.arm(InfoFault::Stall(Duration::from_millis(1500)));

    let started = Instant::now();
    engine.handle(DomainEvent::Paused { domain: work });
    assert!(
        started.elapsed() < Duration::from_secs(1),
        "event took {:?}",
        started.elapsed()
    );
    assert_eq!(
        engine.store().get(work).map(|e| e.state),
        Some(PowerState::Running)
    );
}

#[test]
fn stalled_pause_scan_and_tooltips_are_cut_off() {
    let (host, api, mut engine, _log) = setup();
    let mail = host.id_of("mail").unwrap();
    api.arm(InfoFault::Stall(Duration::from_millis(1500)));

    let started = Instant::now();
    engine.remove_domain(mail);
    engine.refresh_tooltips();
    assert!(
        started.elapsed() < Duration::from_secs(1),
        "scan took {:?}",
        started.elapsed()
    );
    assert!(!engine.store().contains(mail));
    assert!(engine.store().contains(host.id_of("work").unwrap()));
}
