pub mod actions;
pub mod domain;
pub mod engine;
pub mod error;
pub mod kernel;
pub mod modifier;
pub mod notify;
pub mod pause;
pub mod ports;
mod query;
pub mod sink;
pub mod store;
pub mod viewmodel;

pub use actions::{ActionError, ActionRunner, EscalationPrompt};
pub use domain::EngineSettings;
pub use engine::{ReconciliationEngine, Resolution};
pub use error::{ApiError, ErrorClass};
pub use kernel::{EngineKernel, EventSender, KernelInput, KeyInput, UserCommand};
pub use notify::{Notification, NotificationGate, Priority};
pub use pause::{PauseAggregateMonitor, UnpauseReport};
pub use ports::{DomainApi, EventSource, HelperCommand, HelperPort, StorageUsage, SubscriptionId};
pub use sink::{AggregateKind, Decoration, DeltaLog, PresentationSink, Tooltip, UiDelta};
pub use store::RegistryStore;
