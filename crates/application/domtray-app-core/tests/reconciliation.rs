use std::sync::Arc;

use domtray_app_core::{
    Decoration, DeltaLog, EngineSettings, Priority, ReconciliationEngine, UiDelta,
};
use domtray_core::event::Failure;
use domtray_core::{
    ActionSetKind, ClassTag, DomainEvent, DomainId, FeatureName, PowerState, PropertyName,
    RegistryRow,
};
use domtray_infra::{DomainSpec, HostSpec, InMemoryHost};

struct Fixture {
    host: Arc<InMemoryHost>,
    log: DeltaLog,
    engine: ReconciliationEngine,
}

impl Fixture {
    fn new() -> Self {
        let spec = HostSpec {
            local: "dom0".to_string(),
            domains: vec![
                DomainSpec::new("dom0", ClassTag::AdminVM, PowerState::Running),
                DomainSpec::new("fedora", ClassTag::TemplateVM, PowerState::Halted)
                    .feature("gui", "1"),
                DomainSpec::new("work", ClassTag::AppVM, PowerState::Running)
                    .template("fedora")
                    .property("guivm", "dom0"),
                DomainSpec::new("vault", ClassTag::AppVM, PowerState::Halted)
                    .template("fedora"),
            ],
        };
        let host = Arc::new(InMemoryHost::from_spec(&spec).unwrap());
        let log = DeltaLog::new();
        let mut engine = ReconciliationEngine::new(
            host.clone(),
            Arc::new(log.clone()),
            EngineSettings::default(),
        );
        engine.initialize().unwrap();
        log.drain();
        Self { host, log, engine }
    }

    fn id(&self, name: &str) -> DomainId {
        self.host.id_of(name).unwrap()
    }

    fn names(&self) -> Vec<String> {
        self.engine
            .snapshot()
            .iter()
            .map(|row| match row {
                RegistryRow::Header => "<header>".to_string(),
                RegistryRow::Domain(entry) => entry.name.clone(),
            })
            .collect()
    }

    fn state(&self, name: &str) -> Option<PowerState> {
        self.engine.store().get(self.id(name)).map(|e| e.state)
    }
}

#[test]
fn initial_view_is_header_admins_then_sorted_names() {
    let fx = Fixture::new();
    assert_eq!(fx.names(), vec!["<header>", "dom0", "fedora", "vault", "work"]);
    let store = fx.engine.store();
    assert!(!store.get(fx.id("vault")).unwrap().visible);
    assert!(store.get(fx.id("work")).unwrap().visible);
    assert_eq!(fx.engine.local_domain(), Some(fx.id("dom0")));
    assert!(fx.engine.action_set(fx.id("dom0")).is_none());
    assert!(fx.engine.action_set(fx.id("vault")).is_none());
    assert!(fx.engine.action_set(fx.id("work")).is_some());
}

#[test]
fn update_for_unknown_identity_adds_it_in_order() {
    let mut fx = Fixture::new();
    let alpha = fx
        .host
        .create(DomainSpec::new("alpha", ClassTag::AppVM, PowerState::Running))
        .unwrap();

    fx.engine.handle(DomainEvent::Started { domain: alpha });
    assert_eq!(
        fx.names(),
        vec!["<header>", "dom0", "alpha", "fedora", "vault", "work"]
    );
    assert!(fx.engine.store().get(alpha).unwrap().visible);

    let deltas = fx.log.drain();
    assert!(matches!(
        &deltas[0],
        UiDelta::EntryAdded { entry, position: 2 } if entry.id == alpha
    ));
    assert!(deltas.contains(&UiDelta::EntryStateChanged {
        id: alpha,
        state: PowerState::Running
    }));

    // The later add event finds the entry already there.
    fx.engine.handle(DomainEvent::Added { domain: alpha });
    assert_eq!(fx.log.count(|d| matches!(d, UiDelta::EntryAdded { .. })), 0);
}

#[test]
fn unknown_kind_queries_the_live_state() {
    let mut fx = Fixture::new();
    let work = fx.id("work");

    fx.host.set_state("work", PowerState::Paused).unwrap();
    fx.engine.handle(DomainEvent::UnknownLifecycle {
        domain: work,
        kind: "domain-spawn".to_string(),
    });
    assert_eq!(fx.state("work"), Some(PowerState::Paused));
    assert_eq!(
        fx.engine.action_set(work).map(|s| s.kind),
        Some(ActionSetKind::Paused)
    );

    fx.host
        .fail_state_queries("work", Some(domtray_app_core::ApiError::Failed("busy".into())))
        .unwrap();
    fx.engine.handle(DomainEvent::UnknownLifecycle {
        domain: work,
        kind: "domain-spawn".to_string(),
    });
    assert_eq!(fx.state("work"), Some(PowerState::Transient));
}

#[test]
fn unknown_kind_for_vanished_domain_removes_it_once() {
    let mut fx = Fixture::new();
    let work = fx.id("work");
    fx.host.delete("work");

    fx.engine.handle(DomainEvent::UnknownLifecycle {
        domain: work,
        kind: "domain-spawn".to_string(),
    });
    fx.engine.handle(DomainEvent::Deleted { domain: work });
    fx.engine.handle(DomainEvent::Started { domain: work });

    assert_eq!(fx.names(), vec!["<header>", "dom0", "fedora", "vault"]);
    assert!(fx.engine.action_set(work).is_none());
    assert_eq!(
        fx.log
            .count(|d| matches!(d, UiDelta::EntryRemoved { id } if *id == work)),
        1
    );
    assert_eq!(fx.log.count(|d| matches!(d, UiDelta::Notification { .. })), 0);
}

#[test]
fn failures_carry_their_reason() {
    let mut fx = Fixture::new();
    let vault = fx.id("vault");

    fx.engine.handle(DomainEvent::StartFailed {
        domain: vault,
        failure: Failure {
            reason: "out of memory".to_string(),
        },
    });
    assert_eq!(fx.state("vault"), Some(PowerState::Halted));

    let notifications: Vec<_> = fx
        .log
        .deltas()
        .into_iter()
        .filter_map(|d| match d {
            UiDelta::Notification { notification } => Some(notification),
            _ => None,
        })
        .collect();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].body, "Qube vault has failed to start: out of memory");
    assert_eq!(notifications[0].priority, Priority::High);
}

#[test]
fn shutdown_hides_and_drops_the_action_set() {
    let mut fx = Fixture::new();
    let work = fx.id("work");

    fx.host.set_state("work", PowerState::Halted).unwrap();
    fx.engine.handle(DomainEvent::Shutdown { domain: work });

    let entry = fx.engine.store().get(work).unwrap();
    assert_eq!(entry.state, PowerState::Halted);
    assert!(!entry.visible);
    assert!(fx.engine.action_set(work).is_none());
    assert!(fx.log.deltas().contains(&UiDelta::EntryVisibilityChanged {
        id: work,
        visible: false
    }));
}

#[test]
fn modifier_flip_reconfigures_without_touching_the_registry() {
    let mut fx = Fixture::new();
    let work = fx.id("work");
    let before = fx.engine.snapshot();

    assert!(fx.engine.set_modifier(false).is_empty());
    assert!(fx.log.deltas().is_empty());

    assert_eq!(fx.engine.set_modifier(true), vec![work]);
    let set = fx.engine.action_set(work).unwrap();
    assert!(set.labels().contains(&"Force shutdown"));
    assert!(set.labels().contains(&"Run Root Terminal"));
    assert!(set.labels().contains(&"Force restart"));

    assert!(fx.engine.set_modifier(true).is_empty());
    assert_eq!(
        fx.log
            .count(|d| matches!(d, UiDelta::ActionSetReconfigure { .. })),
        1
    );
    assert_eq!(fx.engine.snapshot(), before);

    fx.engine.set_modifier(false);
    assert!(fx.engine.action_set(work).unwrap().labels().contains(&"Shutdown"));
}

#[test]
fn rebuilt_sets_pick_up_the_held_modifier() {
    let mut fx = Fixture::new();
    fx.engine.set_modifier(true);

    let vault = fx.id("vault");
    fx.host.set_state("vault", PowerState::Running).unwrap();
    fx.engine.handle(DomainEvent::Started { domain: vault });
    let set = fx.engine.action_set(vault).unwrap();
    assert!(set.modifier);
    assert!(set.labels().contains(&"Force shutdown"));
}

#[test]
fn global_expert_mode_shows_every_debug_console() {
    let mut fx = Fixture::new();
    let work = fx.id("work");
    let dom0 = fx.id("dom0");
    let debug_visible = |fx: &Fixture| {
        fx.engine
            .action_set(work)
            .unwrap()
            .labels()
            .contains(&"Debug Console")
    };
    assert!(!debug_visible(&fx));

    fx.host.set_feature("dom0", "expert-mode", Some("1")).unwrap();
    fx.engine.handle(DomainEvent::FeatureChanged {
        domain: dom0,
        feature: FeatureName::ExpertMode,
        value: Some("1".to_string()),
    });
    assert!(fx.engine.expert_mode());
    assert!(debug_visible(&fx));
    assert_eq!(
        fx.log
            .count(|d| matches!(d, UiDelta::ActionSetReconfigure { id, .. } if *id == work)),
        1
    );
}

#[test]
fn per_domain_debug_property_toggles_the_console() {
    let mut fx = Fixture::new();
    let work = fx.id("work");

    fx.host.set_property("work", "debug", Some("True")).unwrap();
    fx.engine.handle(DomainEvent::PropertyChanged {
        domain: work,
        property: PropertyName::Debug,
        value: Some("True".to_string()),
    });
    assert!(fx
        .engine
        .action_set(work)
        .unwrap()
        .labels()
        .contains(&"Debug Console"));
}

#[test]
fn rename_moves_the_entry() {
    let mut fx = Fixture::new();
    let work = fx.id("work");
    let event = DomainEvent::PropertyChanged {
        domain: work,
        property: PropertyName::Name,
        value: Some("archive".to_string()),
    };
    fx.host.apply_event(&event);
    fx.engine.handle(event);

    assert_eq!(
        fx.names(),
        vec!["<header>", "dom0", "archive", "fedora", "vault"]
    );
    let deltas = fx.log.drain();
    assert_eq!(deltas[0], UiDelta::EntryRemoved { id: work });
    assert!(matches!(&deltas[1], UiDelta::EntryAdded { position: 2, .. }));
}

#[test]
fn decorations_for_listed_domains_only() {
    let mut fx = Fixture::new();
    let work = fx.id("work");

    fx.engine.handle(DomainEvent::FeatureChanged {
        domain: work,
        feature: FeatureName::UpdatesAvailable,
        value: Some("1".to_string()),
    });
    fx.engine.handle(DomainEvent::FeatureChanged {
        domain: work,
        feature: FeatureName::UpdatesAvailable,
        value: None,
    });
    fx.engine.handle(DomainEvent::PropertyChanged {
        domain: work,
        property: PropertyName::Label,
        value: Some("red".to_string()),
    });
    fx.engine.handle(DomainEvent::Stats {
        domain: DomainId::new(),
        memory_kb: 1024,
        cpu_usage: 3,
    });
    fx.engine.handle(DomainEvent::Stats {
        domain: work,
        memory_kb: 2048,
        cpu_usage: 12,
    });

    let decorations: Vec<Decoration> = fx
        .log
        .deltas()
        .into_iter()
        .filter_map(|d| match d {
            UiDelta::EntryDecorationChanged { decoration, .. } => Some(decoration),
            _ => None,
        })
        .collect();
    assert_eq!(
        decorations,
        vec![
            Decoration::Updates { available: true },
            Decoration::Updates { available: false },
            Decoration::Icon {
                label: "red".to_string()
            },
            Decoration::Stats {
                memory_kb: 2048,
                cpu_usage: 12
            },
        ]
    );
}

#[test]
fn internal_feature_rebuilds_as_internal_set() {
    let mut fx = Fixture::new();
    let work = fx.id("work");

    fx.host.set_feature("work", "internal", Some("1")).unwrap();
    fx.engine.handle(DomainEvent::FeatureChanged {
        domain: work,
        feature: FeatureName::Internal,
        value: Some("1".to_string()),
    });
    assert_eq!(
        fx.engine.action_set(work).map(|s| s.kind),
        Some(ActionSetKind::Internal {
            working_correctly: true
        })
    );
}

#[test]
fn preload_used_only_notifies() {
    let mut fx = Fixture::new();
    let before = fx.engine.snapshot();
    fx.engine.handle(DomainEvent::PreloadUsed {
        domain: fx.id("fedora"),
        dispvm: "disp42".to_string(),
    });
    let deltas = fx.log.drain();
    assert_eq!(deltas.len(), 1);
    assert!(matches!(
        &deltas[0],
        UiDelta::Notification { notification }
            if notification.body == "Qube disp42 was preloaded and is now being used."
    ));
    assert_eq!(fx.engine.snapshot(), before);
}

#[test]
fn reconnect_resyncs_against_the_live_set() {
    let mut fx = Fixture::new();
    let work = fx.id("work");
    fx.host.delete("work");
    fx.host
        .create(DomainSpec::new("banking", ClassTag::AppVM, PowerState::Running))
        .unwrap();

    fx.engine.handle(DomainEvent::ConnectionEstablished);
    assert_eq!(
        fx.names(),
        vec!["<header>", "dom0", "banking", "fedora", "vault"]
    );
    assert!(fx.log.deltas().contains(&UiDelta::EntryRemoved { id: work }));
    assert!(fx.engine.store().get(fx.id("banking")).unwrap().visible);
}

#[test]
fn tooltips_cover_every_visible_entry() {
    let mut fx = Fixture::new();
    fx.engine.refresh_tooltips();
    let tooltips: Vec<_> = fx
        .log
        .deltas()
        .into_iter()
        .filter_map(|d| match d {
            UiDelta::EntryDecorationChanged {
                decoration: Decoration::Tooltip(tooltip),
                ..
            } => Some(tooltip),
            _ => None,
        })
        .collect();
    assert_eq!(tooltips.len(), 2);
    assert_eq!(tooltips[0].name, "dom0");
    assert_eq!(tooltips[0].template, None);
    assert_eq!(tooltips[1].name, "work");
    assert_eq!(tooltips[1].template.as_deref(), Some("fedora"));
}
