//! Central configuration constants for runtime limits and defaults.

/// Interval between tooltip/storage refresh passes over visible entries.
pub const DEFAULT_TOOLTIP_REFRESH_SECS: u64 = 120;

/// Upper bound for a direct power-state query issued while reconciling one event.
pub const DEFAULT_STATE_QUERY_TIMEOUT_MS: u64 = 2_000;

/// Shortest and longest query timeouts accepted from settings.
pub const MIN_STATE_QUERY_TIMEOUT_MS: u64 = 100;
pub const MAX_STATE_QUERY_TIMEOUT_MS: u64 = 30_000;

/// Restart waits for the domain to halt by polling at this interval.
pub const RESTART_POLL_INTERVAL_MS: u64 = 1_000;

/// Restart gives up after this many polls.
pub const RESTART_MAX_POLLS: u32 = 120;

/// Notification id of the "all qubes paused" warning.
pub const PAUSED_NOTIFICATION_ID: &str = "vms-paused";

/// Application action bound to the "Unpause All" notification button.
pub const UNPAUSE_ALL_ACTION: &str = "app.do-unpause-all";

/// Directory holding per-domain console logs.
pub const CONSOLE_LOG_DIR: &str = "/var/log/xen/console";

/// Qrexec services used by the terminal and file manager actions.
pub const RUN_TERMINAL_SERVICE: &str = "qubes.StartApp+qubes-run-terminal";
pub const OPEN_FILE_MANAGER_SERVICE: &str = "qubes.StartApp+qubes-open-file-manager";

/// Helper command templates. `$DOMAIN` and `$PATH` are substituted after word splitting.
pub const START_DOMAIN_TEMPLATE: &str = "qvm-start $DOMAIN";
pub const DOMAIN_SETTINGS_TEMPLATE: &str = "qubes-vm-settings $DOMAIN";
pub const DEBUG_CONSOLE_TEMPLATE: &str = "qvm-console-dispvm $DOMAIN";
pub const LOG_VIEWER_TEMPLATE: &str = "qubes-log-viewer $PATH";
pub const QUBE_MANAGER_TEMPLATE: &str = "qubes-qube-manager";

/// Clamp a query timeout into the accepted range.
pub fn clamp_query_timeout_ms(v: u64) -> u64 {
    v.clamp(MIN_STATE_QUERY_TIMEOUT_MS, MAX_STATE_QUERY_TIMEOUT_MS)
}
