use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use camino::Utf8Path;
use domtray_app_core::viewmodel::{self, EntryVm};
use domtray_app_core::{
    ActionRunner, Decoration, DeltaLog, EngineKernel, EngineSettings, EventSender, KernelInput,
    KeyInput, ReconciliationEngine, UiDelta, UserCommand,
};
use domtray_core::{DomainEvent, DomainId};
use domtray_infra::{ChannelEventSource, InMemoryHost, ProcessLauncher};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::script::ScriptOp;

pub fn load_settings(path: Option<&Utf8Path>) -> Result<EngineSettings> {
    let Some(path) = path else {
        return Ok(EngineSettings::default());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read settings {}", path))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid settings in {}", path))
}

/// Builds the initial list for `host` and returns the rows a user would see.
pub fn cmd_snapshot(host: Arc<InMemoryHost>, settings: EngineSettings) -> Result<Vec<EntryVm>> {
    let mut engine = ReconciliationEngine::new(host, Arc::new(DeltaLog::new()), settings);
    engine
        .initialize()
        .context("Failed to build the domain list")?;
    Ok(viewmodel::visible_rows(&engine.snapshot()))
}

pub fn render_rows(rows: &[EntryVm]) -> String {
    let width = rows.iter().map(|r| r.name.len()).max().unwrap_or(0);
    let mut out = String::new();
    for row in rows {
        let state = row.state.map(|s| s.to_string()).unwrap_or_default();
        let mut line = format!("{:<width$}  {}", row.name, state);
        if row.outdated {
            line.push_str("  (outdated)");
        }
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out
}

/// Runs `ops` through a live kernel against `host` and returns every delta it produced.
pub async fn cmd_replay(
    host: Arc<InMemoryHost>,
    ops: Vec<ScriptOp>,
    settings: EngineSettings,
) -> Result<Vec<UiDelta>> {
    let source = Arc::new(ChannelEventSource::new());
    let log = DeltaLog::new();
    let sink = Arc::new(log.clone());

    let engine = ReconciliationEngine::new(host.clone(), sink.clone(), settings.clone());
    let runner = ActionRunner::new(
        host.clone(),
        Arc::new(ProcessLauncher::default()),
        sink,
        settings,
    );
    let kernel = EngineKernel::new(engine, runner, source.clone());
    let replay = Replay {
        host,
        source,
        sender: kernel.sender(),
    };
    let cancel = CancellationToken::new();
    let task = tokio::spawn(kernel.run(cancel.clone()));

    let outcome = replay.run(ops).await;
    cancel.cancel();
    task.await.context("kernel task panicked")??;
    outcome?;
    Ok(log.drain())
}

struct Replay {
    host: Arc<InMemoryHost>,
    source: Arc<ChannelEventSource>,
    sender: EventSender,
}

impl Replay {
    async fn run(&self, ops: Vec<ScriptOp>) -> Result<()> {
        self.settle().await?;
        for (n, op) in ops.into_iter().enumerate() {
            debug!(step = n + 1, ?op, "replaying");
            self.apply(op);
            self.settle()
                .await
                .with_context(|| format!("replay stopped at step {}", n + 1))?;
        }
        Ok(())
    }

    fn apply(&self, op: ScriptOp) {
        match op {
            ScriptOp::Create { domain } => {
                let name = domain.name.clone();
                match self.host.create(domain) {
                    Ok(id) => self.publish(DomainEvent::Added { domain: id }),
                    Err(err) => warn!(domain = %name, "create skipped: {err}"),
                }
            }
            ScriptOp::Delete { name } => match self.host.delete(&name) {
                Some(id) => self.publish(DomainEvent::Deleted { domain: id }),
                None => warn!(domain = %name, "delete skipped: no such domain"),
            },
            ScriptOp::Event(raw) => match raw.decode(|name| self.host.id_of(name)) {
                Ok(event) => {
                    self.host.apply_event(&event);
                    self.publish(event);
                }
                Err(err) => warn!(event = %raw.event, "event skipped: {err}"),
            },
            ScriptOp::Key { key, pressed } => {
                self.sender.send(KernelInput::Key(KeyInput { key, pressed }));
            }
            ScriptOp::MenuShown => {
                self.sender.send(KernelInput::MenuShown);
            }
            ScriptOp::Perform { name, action } => match self.host.id_of(&name) {
                Some(domain) => self.command(UserCommand::Perform { domain, action }),
                None => warn!(domain = %name, "action skipped: no such domain"),
            },
            ScriptOp::UnpauseAll => self.command(UserCommand::UnpauseAll),
            ScriptOp::Refresh => self.command(UserCommand::RefreshAll),
            ScriptOp::Tick => {
                self.sender.send(KernelInput::Tick);
            }
        }
    }

    fn command(&self, command: UserCommand) {
        self.sender.send(KernelInput::Command(command));
    }

    fn publish(&self, event: DomainEvent) {
        if self.source.publish(event) == 0 {
            warn!("no subscriber received the event");
        }
    }

    /// Waits for the kernel, then feeds back whatever the host reported until it goes quiet.
    async fn settle(&self) -> Result<()> {
        loop {
            self.sender.flush().await?;
            let events = self.host.take_events();
            if events.is_empty() {
                return Ok(());
            }
            for event in events {
                self.publish(event);
            }
        }
    }
}

/// Human-readable lines for `deltas`, naming domains as they were first announced.
pub fn render_deltas(deltas: &[UiDelta]) -> Vec<String> {
    let mut names: HashMap<DomainId, String> = HashMap::new();
    deltas
        .iter()
        .map(|delta| describe(delta, &mut names))
        .collect()
}

fn name(names: &HashMap<DomainId, String>, id: &DomainId) -> String {
    names.get(id).cloned().unwrap_or_else(|| id.to_string())
}

fn describe(delta: &UiDelta, names: &mut HashMap<DomainId, String>) -> String {
    match delta {
        UiDelta::EntryAdded { entry, position } => {
            names.insert(entry.id, entry.name.clone());
            format!("+ {} at {} ({})", entry.name, position, entry.state)
        }
        UiDelta::EntryRemoved { id } => format!("- {}", name(names, id)),
        UiDelta::EntryStateChanged { id, state } => format!("{}: {}", name(names, id), state),
        UiDelta::EntryVisibilityChanged { id, visible } => {
            let shown = if *visible { "shown" } else { "hidden" };
            format!("{}: {}", name(names, id), shown)
        }
        UiDelta::EntryOutdatedChanged { id, outdated } => {
            let flag = if *outdated { "outdated" } else { "up to date" };
            format!("{}: {}", name(names, id), flag)
        }
        UiDelta::EntryDecorationChanged { id, decoration } => {
            let what = match decoration {
                Decoration::Icon { label } => format!("icon {label}"),
                Decoration::Tooltip(_) => "tooltip refreshed".to_string(),
                Decoration::Updates { available: true } => "updates available".to_string(),
                Decoration::Updates { available: false } => "no updates".to_string(),
                Decoration::Stats {
                    memory_kb,
                    cpu_usage,
                } => format!("{memory_kb} kB, {cpu_usage}% cpu"),
            };
            format!("{}: {}", name(names, id), what)
        }
        UiDelta::ActionSetReconfigure { id, set } => {
            format!("{}: menu [{}]", name(names, id), set.labels().join(", "))
        }
        UiDelta::Notification { notification } => {
            format!("notify: {}: {}", notification.title, notification.body)
        }
        UiDelta::AggregateNotify { notification, .. } => {
            format!("notify (sticky): {}", notification.title)
        }
        UiDelta::AggregateWithdraw { .. } => "withdraw: all paused".to_string(),
        UiDelta::ActionError { error } => {
            format!("error: {}: {}", error.title, error.body.replace('\n', " "))
        }
        UiDelta::EscalationPrompt { prompt } => {
            format!("prompt: {}: {}", prompt.title, prompt.body.replace('\n', " "))
        }
    }
}
