use camino::Utf8PathBuf;
use domtray_core::{DomainId, DomainInfo, PowerState};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::kernel::EventSender;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StorageUsage {
    pub used_bytes: u64,
    pub size_bytes: u64,
}

impl StorageUsage {
    pub fn percent(&self) -> u8 {
        if self.size_bytes == 0 {
            return 0;
        }
        ((self.used_bytes.saturating_mul(100)) / self.size_bytes).min(100) as u8
    }
}

/// The VM-management API. Every call may fail with [`ApiError::NotFound`] when the
/// domain vanished in the meantime.
pub trait DomainApi: Send + Sync + 'static {
    fn list_domains(&self) -> Result<Vec<DomainId>, ApiError>;
    fn info(&self, id: DomainId) -> Result<DomainInfo, ApiError>;
    /// The admin domain the tray runs in.
    fn local_domain(&self) -> Result<DomainId, ApiError>;

    fn power_state(&self, id: DomainId) -> Result<PowerState, ApiError>;
    fn is_running(&self, id: DomainId) -> Result<bool, ApiError>;
    fn is_paused(&self, id: DomainId) -> Result<bool, ApiError>;
    fn template(&self, id: DomainId) -> Result<Option<DomainId>, ApiError>;
    fn has_outdated_volumes(&self, id: DomainId) -> Result<bool, ApiError>;
    fn storage_usage(&self, id: DomainId) -> Result<StorageUsage, ApiError>;

    fn property(&self, id: DomainId, name: &str) -> Result<Option<String>, ApiError>;
    fn feature(&self, id: DomainId, name: &str) -> Result<Option<String>, ApiError>;
    /// Like [`DomainApi::feature`], falling back to the template's value.
    fn feature_with_template(&self, id: DomainId, name: &str)
        -> Result<Option<String>, ApiError>;

    fn pause(&self, id: DomainId) -> Result<(), ApiError>;
    fn unpause(&self, id: DomainId) -> Result<(), ApiError>;
    fn shutdown(&self, id: DomainId, force: bool) -> Result<(), ApiError>;
    fn kill(&self, id: DomainId) -> Result<(), ApiError>;
    fn run_service(&self, id: DomainId, service: &str, user: Option<&str>)
        -> Result<(), ApiError>;
}

/// Feature and boolean property values are strings; empty, "0" and "false" are off.
pub fn is_truthy(value: Option<&str>) -> bool {
    match value {
        None => false,
        Some(v) => !(v.is_empty() || v == "0" || v.eq_ignore_ascii_case("false")),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// The event transport. Events are pushed into the kernel queue through the sender.
pub trait EventSource: Send + Sync + 'static {
    fn subscribe(&self, sender: EventSender) -> anyhow::Result<SubscriptionId>;
    /// Removing an unknown or already removed subscription is a no-op.
    fn unsubscribe(&self, id: SubscriptionId);
}

/// External helper programs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HelperCommand {
    StartDomain { name: String },
    DomainSettings { name: String },
    DebugConsole { name: String },
    LogViewer { path: Utf8PathBuf },
    QubeManager,
}

pub trait HelperPort: Send + Sync + 'static {
    /// Spawns the helper and returns without waiting for it.
    fn run_detached(&self, command: &HelperCommand) -> anyhow::Result<()>;
    /// Runs the helper and fails if it exits unsuccessfully.
    fn run_to_completion(&self, command: &HelperCommand) -> anyhow::Result<()>;
}
