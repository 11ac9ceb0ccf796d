use domtray_core::{DomainEntry, DomainId};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::ports::DomainApi;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnpauseReport {
    pub unpaused: Vec<DomainId>,
    pub denied: Vec<DomainId>,
    pub failed: Vec<DomainId>,
}

/// Derives "at least one domain is running and every running one is paused".
pub struct PauseAggregateMonitor;

impl PauseAggregateMonitor {
    /// Scans the live domain list. Admin and preloaded domains don't count.
    /// Uncertain data yields `false`.
    pub fn all_paused(api: &dyn DomainApi) -> bool {
        let ids = match api.list_domains() {
            Ok(ids) => ids,
            Err(err) => {
                debug!("pause aggregate: cannot list domains: {err}");
                return false;
            }
        };

        let mut found_paused = false;
        for id in ids {
            match Self::classify(api, id) {
                Ok(Some(true)) => found_paused = true,
                Ok(Some(false)) => return false,
                Ok(None) => {}
                Err(ApiError::NotFound) => debug!(%id, "pause aggregate: domain vanished"),
                Err(err) => {
                    debug!(%id, "pause aggregate: query failed: {err}");
                    return false;
                }
            }
        }
        found_paused
    }

    /// `Some(paused)` for a counted running domain, `None` for ignored ones.
    fn classify(api: &dyn DomainApi, id: DomainId) -> Result<Option<bool>, ApiError> {
        let info = api.info(id)?;
        if info.class.is_admin() || info.preload {
            return Ok(None);
        }
        if !api.is_running(id)? {
            return Ok(None);
        }
        Ok(Some(api.is_paused(id)?))
    }

    /// Best-effort unpause of every listed domain except admin and preloaded ones.
    pub fn unpause_all(
        api: &dyn DomainApi,
        entries: &[DomainEntry],
        local: Option<DomainId>,
    ) -> UnpauseReport {
        let mut report = UnpauseReport::default();
        for entry in entries {
            if entry.is_admin() || entry.preload || Some(entry.id) == local {
                continue;
            }
            match api.unpause(entry.id) {
                Ok(()) => report.unpaused.push(entry.id),
                Err(ApiError::PermissionDenied(_)) => report.denied.push(entry.id),
                Err(err) => {
                    warn!(domain = %entry.name, "failed to unpause: {err}");
                    report.failed.push(entry.id);
                }
            }
        }
        report
    }
}
