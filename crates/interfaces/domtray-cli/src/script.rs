//! Replay scripts: one JSON operation per line.

use anyhow::{Context, Result};
use camino::Utf8Path;
use domtray_core::{DomainAction, RawEvent};
use domtray_infra::DomainSpec;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "kebab-case")]
pub enum ScriptOp {
    /// Adds a domain to the host and announces it on the feed.
    Create { domain: DomainSpec },
    /// Removes a domain from the host and announces the deletion.
    Delete { name: String },
    /// A raw feed event; `subject` is a domain name.
    Event(RawEvent),
    Key { key: String, pressed: bool },
    MenuShown,
    /// Runs a menu action against the named domain.
    Perform { name: String, action: DomainAction },
    UnpauseAll,
    Refresh,
    Tick,
}

/// Parses a script. Blank lines and lines starting with `#` are skipped.
pub fn parse(text: &str) -> Result<Vec<ScriptOp>> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .map(|(n, line)| {
            serde_json::from_str(line).with_context(|| format!("script line {}", n + 1))
        })
        .collect()
}

pub fn load(path: &Utf8Path) -> Result<Vec<ScriptOp>> {
    let text =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read script {}", path))?;
    parse(&text)
}
