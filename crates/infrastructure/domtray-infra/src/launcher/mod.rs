use std::collections::HashMap;
use std::process::{Command, Stdio};

use domtray_app_core::{HelperCommand, HelperPort};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("Launch configuration error: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Command parsing error")]
    ParseError,
    #[error("{program} exited with {code:?}: {stderr}")]
    Failed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ResolvedLaunchCommand {
    pub program: String,
    pub args: Vec<String>,
}

const DOMAIN_PLACEHOLDER: &str = "__DOMTRAY_DOMAIN__";
const PATH_PLACEHOLDER: &str = "__DOMTRAY_PATH__";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum HelperKind {
    StartDomain,
    DomainSettings,
    DebugConsole,
    LogViewer,
    QubeManager,
}

impl HelperKind {
    fn of(command: &HelperCommand) -> Self {
        match command {
            HelperCommand::StartDomain { .. } => HelperKind::StartDomain,
            HelperCommand::DomainSettings { .. } => HelperKind::DomainSettings,
            HelperCommand::DebugConsole { .. } => HelperKind::DebugConsole,
            HelperCommand::LogViewer { .. } => HelperKind::LogViewer,
            HelperCommand::QubeManager => HelperKind::QubeManager,
        }
    }
}

/// Spawns helper programs from command templates.
///
/// `$DOMAIN` and `$PATH` are substituted after word splitting, so names and
/// paths containing whitespace stay a single argument.
pub struct ProcessLauncher {
    templates: HashMap<HelperKind, String>,
}

impl Default for ProcessLauncher {
    fn default() -> Self {
        let templates = [
            (HelperKind::StartDomain, domtray_config::START_DOMAIN_TEMPLATE),
            (HelperKind::DomainSettings, domtray_config::DOMAIN_SETTINGS_TEMPLATE),
            (HelperKind::DebugConsole, domtray_config::DEBUG_CONSOLE_TEMPLATE),
            (HelperKind::LogViewer, domtray_config::LOG_VIEWER_TEMPLATE),
            (HelperKind::QubeManager, domtray_config::QUBE_MANAGER_TEMPLATE),
        ]
        .into_iter()
        .map(|(kind, template)| (kind, template.to_string()))
        .collect();
        Self { templates }
    }
}

impl ProcessLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the template used to start domains, e.g. `"echo $DOMAIN"` in tests.
    pub fn with_start_template(mut self, template: impl Into<String>) -> Self {
        self.templates.insert(HelperKind::StartDomain, template.into());
        self
    }

    pub(crate) fn resolve_command(
        &self,
        command: &HelperCommand,
    ) -> Result<ResolvedLaunchCommand, LaunchError> {
        let kind = HelperKind::of(command);
        let template = self
            .templates
            .get(&kind)
            .ok_or_else(|| LaunchError::Config(format!("no template for {kind:?}")))?;

        let (domain, path) = match command {
            HelperCommand::StartDomain { name }
            | HelperCommand::DomainSettings { name }
            | HelperCommand::DebugConsole { name } => (Some(name.as_str()), None),
            HelperCommand::LogViewer { path } => (None, Some(path.as_str())),
            HelperCommand::QubeManager => (None, None),
        };

        let cmd_str = template
            .replace("$DOMAIN", DOMAIN_PLACEHOLDER)
            .replace("$PATH", PATH_PLACEHOLDER);
        let mut parts = shlex::split(&cmd_str).ok_or(LaunchError::ParseError)?;

        for (placeholder, value) in [(DOMAIN_PLACEHOLDER, domain), (PATH_PLACEHOLDER, path)] {
            match value {
                Some(value) => {
                    for p in &mut parts {
                        if p.contains(placeholder) {
                            *p = p.replace(placeholder, value);
                        }
                    }
                }
                None => parts.retain(|p| p != placeholder),
            }
        }

        let Some((program, args)) = parts.split_first() else {
            return Err(LaunchError::Config(
                "Launch template produced empty command".into(),
            ));
        };
        Ok(ResolvedLaunchCommand {
            program: program.clone(),
            args: args.to_vec(),
        })
    }

    pub fn spawn(&self, command: &HelperCommand) -> Result<(), LaunchError> {
        let cmd = self.resolve_command(command)?;
        debug!(program = %cmd.program, args = ?cmd.args, "spawning helper");
        Command::new(&cmd.program)
            .args(&cmd.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .spawn()?;
        Ok(())
    }

    pub fn run(&self, command: &HelperCommand) -> Result<(), LaunchError> {
        let cmd = self.resolve_command(command)?;
        debug!(program = %cmd.program, args = ?cmd.args, "running helper");
        let output = Command::new(&cmd.program)
            .args(&cmd.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()?;
        if output.status.success() {
            return Ok(());
        }
        Err(LaunchError::Failed {
            program: cmd.program,
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

impl HelperPort for ProcessLauncher {
    fn run_detached(&self, command: &HelperCommand) -> anyhow::Result<()> {
        Ok(self.spawn(command)?)
    }

    fn run_to_completion(&self, command: &HelperCommand) -> anyhow::Result<()> {
        Ok(self.run(command)?)
    }
}
