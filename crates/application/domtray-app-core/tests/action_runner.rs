use std::sync::{Arc, Mutex};

use domtray_app_core::{
    ActionRunner, DeltaLog, DomainApi, EngineSettings, HelperCommand, HelperPort, UiDelta,
};
use domtray_core::{ClassTag, DomainAction, DomainId, PowerState};
use domtray_infra::{DomainSpec, InMemoryHost};

#[derive(Default)]
struct RecordingHelpers {
    calls: Mutex<Vec<HelperCommand>>,
    fail: bool,
}

impl HelperPort for RecordingHelpers {
    fn run_detached(&self, command: &HelperCommand) -> anyhow::Result<()> {
        self.calls.lock().unwrap().push(command.clone());
        anyhow::ensure!(!self.fail, "helper missing");
        Ok(())
    }

    fn run_to_completion(&self, command: &HelperCommand) -> anyhow::Result<()> {
        self.run_detached(command)
    }
}

struct Fixture {
    host: Arc<InMemoryHost>,
    helpers: Arc<RecordingHelpers>,
    log: DeltaLog,
    runner: ActionRunner,
    work: DomainId,
}

fn fixture_with(helpers: RecordingHelpers) -> Fixture {
    let host = Arc::new(InMemoryHost::new());
    let work = host
        .create(DomainSpec::new("work", ClassTag::AppVM, PowerState::Running))
        .unwrap();
    let helpers = Arc::new(helpers);
    let log = DeltaLog::new();
    let settings = EngineSettings {
        restart_poll_interval_ms: 1,
        restart_max_polls: 3,
        ..EngineSettings::default()
    };
    let runner = ActionRunner::new(host.clone(), helpers.clone(), Arc::new(log.clone()), settings);
    Fixture {
        host,
        helpers,
        log,
        runner,
        work,
    }
}

fn fixture() -> Fixture {
    fixture_with(RecordingHelpers::default())
}

fn errors(log: &DeltaLog) -> Vec<(String, String)> {
    log.deltas()
        .into_iter()
        .filter_map(|d| match d {
            UiDelta::ActionError { error } => Some((error.title, error.body)),
            _ => None,
        })
        .collect()
}

#[test]
fn pause_failure_reports_name_and_reason() {
    let fx = fixture();
    fx.host.set_state("work", PowerState::Halted).unwrap();
    fx.runner.perform(fx.work, "work", &DomainAction::Pause);

    let errors = errors(&fx.log);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].0, "Error pausing qube");
    assert_eq!(
        errors[0].1,
        "The following error occurred while attempting to pause qube work:\nqube work is not running"
    );
}

#[test]
fn permission_denied_is_surfaced() {
    let fx = fixture();
    fx.host.deny_actions("work", true).unwrap();
    fx.runner.perform(fx.work, "work", &DomainAction::Kill);
    assert_eq!(errors(&fx.log)[0].0, "Error shutting down qube");
    assert_eq!(fx.host.state_of("work"), Some(PowerState::Running));
}

#[test]
fn refused_shutdown_offers_escalation() {
    let fx = fixture();
    fx.host.refuse_shutdown("work", Some("qube is busy")).unwrap();
    fx.runner
        .perform(fx.work, "work", &DomainAction::Shutdown { force: false });

    let prompt = fx
        .log
        .deltas()
        .into_iter()
        .find_map(|d| match d {
            UiDelta::EscalationPrompt { prompt } => Some(prompt),
            _ => None,
        })
        .expect("expected an escalation prompt");
    assert!(prompt.body.contains("qube is busy"));
    assert!(!prompt.restart);
    assert!(errors(&fx.log).is_empty());
    assert_eq!(fx.host.state_of("work"), Some(PowerState::Running));

    fx.runner.resolve_escalation(&prompt, false);
    assert_eq!(fx.host.state_of("work"), Some(PowerState::Running));

    fx.runner.resolve_escalation(&prompt, true);
    assert_eq!(fx.host.state_of("work"), Some(PowerState::Halted));
}

#[test]
fn forced_shutdown_failure_is_an_error() {
    let fx = fixture();
    fx.host.deny_actions("work", true).unwrap();
    fx.runner
        .perform(fx.work, "work", &DomainAction::Shutdown { force: true });
    assert_eq!(errors(&fx.log).len(), 1);
    assert_eq!(
        fx.log
            .count(|d| matches!(d, UiDelta::EscalationPrompt { .. })),
        0
    );
}

#[test]
fn restart_starts_the_domain_once_it_is_down() {
    let fx = fixture();
    fx.runner
        .perform(fx.work, "work", &DomainAction::Restart { force: false });
    assert_eq!(fx.host.state_of("work"), Some(PowerState::Halted));
    assert_eq!(
        *fx.helpers.calls.lock().unwrap(),
        vec![HelperCommand::StartDomain {
            name: "work".to_string()
        }]
    );
    assert!(errors(&fx.log).is_empty());
}

#[test]
fn escalated_restart_continues_after_acceptance() {
    let fx = fixture();
    fx.host.refuse_shutdown("work", Some("busy")).unwrap();
    fx.runner
        .perform(fx.work, "work", &DomainAction::Restart { force: false });
    assert!(fx.helpers.calls.lock().unwrap().is_empty());

    let prompt = fx
        .log
        .deltas()
        .into_iter()
        .find_map(|d| match d {
            UiDelta::EscalationPrompt { prompt } => Some(prompt),
            _ => None,
        })
        .unwrap();
    assert!(prompt.restart);
    assert_eq!(prompt.title, "Error restarting qube");

    fx.runner.resolve_escalation(&prompt, true);
    assert_eq!(fx.helpers.calls.lock().unwrap().len(), 1);
}

#[test]
fn failing_start_helper_is_reported() {
    let fx = fixture_with(RecordingHelpers {
        fail: true,
        ..RecordingHelpers::default()
    });
    fx.runner
        .perform(fx.work, "work", &DomainAction::Restart { force: true });
    let errors = errors(&fx.log);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].0, "Error restarting qube");
    assert!(errors[0].1.contains("helper missing"));
}

#[test]
fn terminals_run_as_root_when_asked() {
    let fx = fixture();
    fx.runner
        .perform(fx.work, "work", &DomainAction::RunTerminal { as_root: true });
    fx.runner
        .perform(fx.work, "work", &DomainAction::OpenFileManager);
    assert_eq!(
        fx.host.services(),
        vec![
            (
                fx.work,
                "qubes.StartApp+qubes-run-terminal".to_string(),
                Some("root".to_string())
            ),
            (
                fx.work,
                "qubes.StartApp+qubes-open-file-manager".to_string(),
                None
            ),
        ]
    );
}

#[test]
fn helper_actions_are_detached() {
    let fx = fixture();
    fx.runner.perform(fx.work, "work", &DomainAction::Settings);
    fx.runner.perform(fx.work, "work", &DomainAction::DebugConsole);
    fx.runner.open_manager();
    assert_eq!(
        *fx.helpers.calls.lock().unwrap(),
        vec![
            HelperCommand::DomainSettings {
                name: "work".to_string()
            },
            HelperCommand::DebugConsole {
                name: "work".to_string()
            },
            HelperCommand::QubeManager,
        ]
    );
    assert!(fx.host.is_running(fx.work).unwrap());
}
