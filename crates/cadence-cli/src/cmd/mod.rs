pub mod action;
pub mod config;
pub mod init;
pub mod release;
pub mod serve;

use anyhow::Context;
use cadence_core::Workspace;
use chrono::{DateTime, Utc};
use std::path::Path;

/// Open the project for an offline command. Scheduling done here is picked
/// up by the next `cadence serve`.
pub(crate) fn open(root: &Path) -> anyhow::Result<Workspace> {
    Workspace::open(root).with_context(|| format!("failed to open project at {}", root.display()))
}

pub(crate) fn parse_datetime(s: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("expected an RFC 3339 timestamp: {e}"))
}
