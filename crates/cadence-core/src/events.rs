//! Release notifications and telemetry.
//!
//! `EventHub` is a fire-and-forget bus: emitting never blocks and never fails,
//! and an event with no subscribers is dropped. The server forwards events to
//! webhooks and the SSE stream.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::error::CadenceError;
use crate::release::Release;
use crate::types::ReleaseId;

pub const RELEASES_PUBLISH: &str = "releases.publish";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventError {
    pub name: String,
    pub message: String,
}

impl From<&CadenceError> for EventError {
    fn from(e: &CadenceError) -> Self {
        Self {
            name: e.name().to_string(),
            message: e.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseEvent {
    pub event: String,
    pub created_at: DateTime<Utc>,
    pub release_id: ReleaseId,
    pub is_published: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release: Option<Release>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<EventError>,
}

impl ReleaseEvent {
    pub fn published(release: &Release) -> Self {
        Self {
            event: RELEASES_PUBLISH.to_string(),
            created_at: Utc::now(),
            release_id: release.id,
            is_published: true,
            release: Some(release.clone()),
            error: None,
        }
    }

    pub fn publish_failed(release_id: ReleaseId, error: &CadenceError) -> Self {
        Self {
            event: RELEASES_PUBLISH.to_string(),
            created_at: Utc::now(),
            release_id,
            is_published: false,
            release: None,
            error: Some(error.into()),
        }
    }
}

#[derive(Clone)]
pub struct EventHub {
    tx: broadcast::Sender<ReleaseEvent>,
}

impl EventHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn emit(&self, event: ReleaseEvent) {
        tracing::debug!(event = %event.event, release_id = event.release_id, "emit");
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ReleaseEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new(64)
    }
}

// ---------------------------------------------------------------------------
// Telemetry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Telemetry {
    CreateRelease,
    UpdateRelease,
    DeleteRelease,
    PublishRelease,
}

impl Telemetry {
    pub fn as_str(&self) -> &'static str {
        match self {
            Telemetry::CreateRelease => "didCreateContentRelease",
            Telemetry::UpdateRelease => "didUpdateContentRelease",
            Telemetry::DeleteRelease => "didDeleteContentRelease",
            Telemetry::PublishRelease => "didPublishContentRelease",
        }
    }
}

pub fn track(event: Telemetry, release_id: ReleaseId) {
    tracing::info!(
        target: "cadence::telemetry",
        event = event.as_str(),
        release_id,
        "telemetry"
    );
}
