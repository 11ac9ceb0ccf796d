//! Runs user-chosen actions for one domain, off the reconciliation timeline.

use std::sync::Arc;
use std::thread;

use domtray_core::{DomainAction, DomainId};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::domain::EngineSettings;
use crate::error::ApiError;
use crate::ports::{DomainApi, HelperCommand, HelperPort};
use crate::sink::PresentationSink;

/// A failed action, shown to the user as a dialog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionError {
    pub domain: Option<DomainId>,
    pub title: String,
    pub body: String,
}

impl ActionError {
    fn new(domain: DomainId, title: &str, verb: &str, name: &str, reason: &str) -> Self {
        Self {
            domain: Some(domain),
            title: title.to_string(),
            body: format!(
                "The following error occurred while attempting to {verb} qube {name}:\n{reason}"
            ),
        }
    }
}

/// Offered when a normal shutdown fails: the user may retry with force.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationPrompt {
    pub domain: DomainId,
    pub name: String,
    pub title: String,
    pub body: String,
    /// Whether the domain should be started again once it is down.
    pub restart: bool,
}

pub struct ActionRunner {
    api: Arc<dyn DomainApi>,
    helpers: Arc<dyn HelperPort>,
    sink: Arc<dyn PresentationSink>,
    settings: EngineSettings,
}

impl ActionRunner {
    pub fn new(
        api: Arc<dyn DomainApi>,
        helpers: Arc<dyn HelperPort>,
        sink: Arc<dyn PresentationSink>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            api,
            helpers,
            sink,
            settings,
        }
    }

    /// Blocks until the action is done. Failures go to the sink.
    pub fn perform(&self, domain: DomainId, name: &str, action: &DomainAction) {
        debug!(domain = %name, ?action, "performing action");
        match action {
            DomainAction::Pause => {
                if let Err(err) = self.api.pause(domain) {
                    self.fail(domain, "Error pausing qube", "pause", name, &err);
                }
            }
            DomainAction::Unpause => {
                if let Err(err) = self.api.unpause(domain) {
                    self.fail(domain, "Error unpausing qube", "unpause", name, &err);
                }
            }
            DomainAction::Kill => {
                if let Err(err) = self.api.kill(domain) {
                    self.fail(domain, "Error shutting down qube", "shut down", name, &err);
                }
            }
            DomainAction::Shutdown { force } => {
                self.shutdown(domain, name, *force, false);
            }
            DomainAction::Restart { force } => {
                if self.shutdown(domain, name, *force, true) {
                    self.start_when_halted(domain, name);
                }
            }
            DomainAction::RunTerminal { as_root } => {
                let user = as_root.then_some("root");
                if let Err(err) =
                    self.api
                        .run_service(domain, domtray_config::RUN_TERMINAL_SERVICE, user)
                {
                    self.fail(domain, "Error starting terminal", "start a terminal in", name, &err);
                }
            }
            DomainAction::OpenFileManager => {
                if let Err(err) =
                    self.api
                        .run_service(domain, domtray_config::OPEN_FILE_MANAGER_SERVICE, None)
                {
                    self.fail(
                        domain,
                        "Error opening file manager",
                        "open a file manager in",
                        name,
                        &err,
                    );
                }
            }
            DomainAction::Settings => self.detached(
                domain,
                &HelperCommand::DomainSettings {
                    name: name.to_string(),
                },
            ),
            DomainAction::DebugConsole => self.detached(
                domain,
                &HelperCommand::DebugConsole {
                    name: name.to_string(),
                },
            ),
            DomainAction::ViewLog { path } => {
                self.detached(domain, &HelperCommand::LogViewer { path: path.clone() })
            }
            DomainAction::InternalInfo => {}
        }
    }

    pub fn open_manager(&self) {
        if let Err(err) = self.helpers.run_detached(&HelperCommand::QubeManager) {
            warn!("failed to open the qube manager: {err:#}");
        }
    }

    /// Answers an escalation prompt. Declining gives up.
    pub fn resolve_escalation(&self, prompt: &EscalationPrompt, accepted: bool) {
        if !accepted {
            info!(domain = %prompt.name, "forced shutdown declined");
            return;
        }
        if let Err(err) = self.api.shutdown(prompt.domain, true) {
            self.fail(
                prompt.domain,
                "Error shutting down qube",
                "shut down",
                &prompt.name,
                &err,
            );
            return;
        }
        if prompt.restart {
            self.start_when_halted(prompt.domain, &prompt.name);
        }
    }

    /// Returns whether the domain is on its way down.
    fn shutdown(&self, domain: DomainId, name: &str, force: bool, restart: bool) -> bool {
        let (title, verb) = if restart {
            ("Error restarting qube", "restart")
        } else {
            ("Error shutting down qube", "shut down")
        };
        let Err(err) = self.api.shutdown(domain, force) else {
            return true;
        };
        if force {
            self.fail(domain, title, verb, name, &err);
            return false;
        }

        info!(domain = %name, "shutdown failed, offering a forced one: {err}");
        self.sink.on_escalation_prompt(&EscalationPrompt {
            domain,
            name: name.to_string(),
            title: title.to_string(),
            body: format!(
                "The qube {name} couldn't be shut down normally. The following error \
                 occurred:\n{}\n\nDo you want to force shutdown?\n\nWarning: this may \
                 cause unexpected issues in connected qubes.",
                err.reason()
            ),
            restart,
        });
        false
    }

    fn start_when_halted(&self, domain: DomainId, name: &str) {
        let interval = self.settings.restart_poll_interval();
        let mut polls = 0;
        loop {
            match self.api.is_running(domain) {
                Ok(false) => break,
                Ok(true) if polls < self.settings.restart_max_polls => {
                    polls += 1;
                    thread::sleep(interval);
                }
                Ok(true) => {
                    let err = ApiError::Failed("the qube did not shut down in time".to_string());
                    self.fail(domain, "Error restarting qube", "restart", name, &err);
                    return;
                }
                Err(err) => {
                    self.fail(domain, "Error restarting qube", "restart", name, &err);
                    return;
                }
            }
        }

        let start = HelperCommand::StartDomain {
            name: name.to_string(),
        };
        if let Err(err) = self.helpers.run_to_completion(&start) {
            let err = ApiError::Failed(format!("{err:#}"));
            self.fail(domain, "Error restarting qube", "restart", name, &err);
        }
    }

    fn detached(&self, domain: DomainId, command: &HelperCommand) {
        if let Err(err) = self.helpers.run_detached(command) {
            warn!(%domain, ?command, "helper failed to start: {err:#}");
            self.sink.on_action_error(&ActionError {
                domain: Some(domain),
                title: "Error starting helper".to_string(),
                body: format!("{err:#}"),
            });
        }
    }

    fn fail(&self, domain: DomainId, title: &str, verb: &str, name: &str, err: &ApiError) {
        warn!(domain = %name, class = ?err.action_class(), "{title}: {err}");
        self.sink
            .on_action_error(&ActionError::new(domain, title, verb, name, &err.reason()));
    }
}
