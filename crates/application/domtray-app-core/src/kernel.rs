//! The single sequential timeline every input is processed on.

use std::sync::{Arc, Mutex};

use anyhow::Context;
use domtray_core::{DomainAction, DomainEvent, DomainId};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::actions::{ActionRunner, EscalationPrompt};
use crate::engine::ReconciliationEngine;
use crate::ports::{EventSource, SubscriptionId};
use crate::store::RegistryStore;

const SHIFT_KEYS: [&str; 2] = ["Shift_L", "Shift_R"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyInput {
    pub key: String,
    pub pressed: bool,
}

impl KeyInput {
    /// The modifier value this key sets, if it is a modifier key.
    pub fn modifier(&self) -> Option<bool> {
        SHIFT_KEYS
            .contains(&self.key.as_str())
            .then_some(self.pressed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserCommand {
    Perform {
        domain: DomainId,
        action: DomainAction,
    },
    ResolveEscalation {
        prompt: EscalationPrompt,
        accepted: bool,
    },
    UnpauseAll,
    OpenManager,
    RefreshAll,
}

#[derive(Debug)]
pub enum KernelInput {
    Event(DomainEvent),
    Key(KeyInput),
    /// The menu opened; the modifier resets.
    MenuShown,
    Command(UserCommand),
    Tick,
    /// Answered once every earlier input and every in-flight action is done.
    Flush(oneshot::Sender<()>),
}

/// Cloneable handle that feeds the kernel queue. Pushing never blocks.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<KernelInput>,
}

impl EventSender {
    /// Returns `false` once the kernel has shut down.
    pub fn push(&self, event: DomainEvent) -> bool {
        self.send(KernelInput::Event(event))
    }

    pub fn send(&self, input: KernelInput) -> bool {
        self.tx.send(input).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Waits until everything queued before this call has been processed.
    pub async fn flush(&self) -> anyhow::Result<()> {
        let (done_tx, done_rx) = oneshot::channel();
        anyhow::ensure!(self.send(KernelInput::Flush(done_tx)), "kernel is shut down");
        done_rx.await.context("kernel stopped before flushing")
    }
}

pub struct EngineKernel {
    engine: Arc<Mutex<ReconciliationEngine>>,
    runner: Arc<ActionRunner>,
    source: Arc<dyn EventSource>,
    store: RegistryStore,
    tx: mpsc::UnboundedSender<KernelInput>,
    rx: mpsc::UnboundedReceiver<KernelInput>,
    subscription: Option<SubscriptionId>,
    actions: JoinSet<()>,
}

impl EngineKernel {
    pub fn new(
        engine: ReconciliationEngine,
        runner: ActionRunner,
        source: Arc<dyn EventSource>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            store: engine.store(),
            engine: Arc::new(Mutex::new(engine)),
            runner: Arc::new(runner),
            source,
            tx,
            rx,
            subscription: None,
            actions: JoinSet::new(),
        }
    }

    pub fn sender(&self) -> EventSender {
        EventSender {
            tx: self.tx.clone(),
        }
    }

    pub fn store(&self) -> RegistryStore {
        self.store.clone()
    }

    /// Runs until `cancel` fires. Inputs still queued at that point are discarded.
    pub async fn run(mut self, cancel: CancellationToken) -> anyhow::Result<()> {
        let subscription = self
            .source
            .subscribe(self.sender())
            .context("subscribing to the event feed")?;
        self.subscription = Some(subscription);

        let initialised = self
            .with_engine(|engine| engine.initialize())
            .await
            .unwrap_or_else(|| Err(crate::error::ApiError::Failed("engine panicked".into())));
        if let Err(err) = initialised {
            self.shutdown().await;
            return Err(err).context("building the initial domain list");
        }

        let period = {
            let engine = self.engine.lock().unwrap();
            engine.settings().tooltip_refresh()
        };
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("engine kernel running");
        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    debug!("kernel cancelled");
                    break;
                }

                maybe = self.rx.recv() => match maybe {
                    Some(input) => self.step(input).await,
                    None => break,
                },

                _ = ticker.tick() => self.step(KernelInput::Tick).await,
            }
        }

        self.shutdown().await;
        info!("engine kernel stopped");
        Ok(())
    }

    async fn shutdown(&mut self) {
        self.rx.close();
        let mut discarded = 0usize;
        while let Ok(input) = self.rx.try_recv() {
            if let KernelInput::Flush(done) = input {
                let _ = done.send(());
            }
            discarded += 1;
        }
        if discarded > 0 {
            debug!(discarded, "dropped queued inputs on shutdown");
        }

        if let Some(id) = self.subscription.take() {
            self.source.unsubscribe(id);
        }
        self.actions.shutdown().await;
    }

    async fn step(&mut self, input: KernelInput) {
        match input {
            KernelInput::Event(event) => {
                self.with_engine(move |engine| engine.handle(event)).await;
            }
            KernelInput::Key(key) => {
                if let Some(active) = key.modifier() {
                    self.with_engine(move |engine| engine.set_modifier(active))
                        .await;
                }
            }
            KernelInput::MenuShown => {
                self.with_engine(|engine| engine.set_modifier(false)).await;
            }
            KernelInput::Tick => {
                self.with_engine(|engine| engine.refresh_tooltips()).await;
            }
            KernelInput::Command(command) => self.command(command).await,
            KernelInput::Flush(done) => {
                while let Some(joined) = self.actions.join_next().await {
                    if let Err(err) = joined {
                        error!("action worker failed: {err}");
                    }
                }
                let _ = done.send(());
            }
        }
    }

    async fn command(&mut self, command: UserCommand) {
        match command {
            UserCommand::Perform { domain, action } => {
                let Some(entry) = self.store.get(domain) else {
                    warn!(%domain, "action requested for an unknown domain");
                    return;
                };
                let runner = Arc::clone(&self.runner);
                self.actions
                    .spawn_blocking(move || runner.perform(domain, &entry.name, &action));
            }
            UserCommand::ResolveEscalation { prompt, accepted } => {
                let runner = Arc::clone(&self.runner);
                self.actions
                    .spawn_blocking(move || runner.resolve_escalation(&prompt, accepted));
            }
            UserCommand::OpenManager => {
                let runner = Arc::clone(&self.runner);
                self.actions.spawn_blocking(move || runner.open_manager());
            }
            UserCommand::UnpauseAll => {
                self.with_engine(|engine| engine.unpause_all()).await;
            }
            UserCommand::RefreshAll => {
                self.with_engine(|engine| engine.refresh_all()).await;
            }
        }
    }

    /// Runs one reconciliation step on a blocking worker; steps never overlap.
    async fn with_engine<R, F>(&self, step: F) -> Option<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut ReconciliationEngine) -> R + Send + 'static,
    {
        let engine = Arc::clone(&self.engine);
        let joined = tokio::task::spawn_blocking(move || {
            let mut guard = engine.lock().unwrap();
            step(&mut guard)
        })
        .await;
        match joined {
            Ok(result) => Some(result),
            Err(err) => {
                error!("reconciliation step failed: {err}");
                None
            }
        }
    }
}
