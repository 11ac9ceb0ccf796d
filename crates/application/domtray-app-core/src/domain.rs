use std::time::Duration;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

fn default_console_log_dir() -> Utf8PathBuf {
    Utf8PathBuf::from(domtray_config::CONSOLE_LOG_DIR)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    pub tooltip_refresh_secs: u64,
    pub state_query_timeout_ms: u64,
    #[serde(default = "default_console_log_dir")]
    pub console_log_dir: Utf8PathBuf,
    pub restart_poll_interval_ms: u64,
    pub restart_max_polls: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            tooltip_refresh_secs: domtray_config::DEFAULT_TOOLTIP_REFRESH_SECS,
            state_query_timeout_ms: domtray_config::DEFAULT_STATE_QUERY_TIMEOUT_MS,
            console_log_dir: default_console_log_dir(),
            restart_poll_interval_ms: domtray_config::RESTART_POLL_INTERVAL_MS,
            restart_max_polls: domtray_config::RESTART_MAX_POLLS,
        }
    }
}

impl EngineSettings {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(domtray_config::clamp_query_timeout_ms(
            self.state_query_timeout_ms,
        ))
    }

    pub fn tooltip_refresh(&self) -> Duration {
        Duration::from_secs(self.tooltip_refresh_secs.max(1))
    }

    pub fn restart_poll_interval(&self) -> Duration {
        Duration::from_millis(self.restart_poll_interval_ms)
    }
}
