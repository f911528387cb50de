//! Release and release-action records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CadenceError, Result};
use crate::types::{ActionId, ActionType, EntryRef, ReleaseId, ReleaseStatus};

// ---------------------------------------------------------------------------
// Release
// ---------------------------------------------------------------------------

/// A named batch of pending publish/unpublish intents with an optional schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Release {
    pub id: ReleaseId,
    pub name: String,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub timezone: Option<String>,
    /// Set exactly once, when the release publishes successfully.
    pub released_at: Option<DateTime<Utc>>,
    pub status: ReleaseStatus,
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default)]
    pub updated_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Release {
    pub fn new(id: ReleaseId, data: NewRelease, created_by: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            name: data.name.trim().to_string(),
            scheduled_at: data.scheduled_at,
            timezone: data.timezone,
            released_at: None,
            status: ReleaseStatus::Empty,
            updated_by: created_by.clone(),
            created_by,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_released(&self) -> bool {
        self.released_at.is_some()
    }

    pub fn is_pending(&self) -> bool {
        self.released_at.is_none()
    }

    pub(crate) fn apply(&mut self, update: ReleaseUpdate, updated_by: Option<String>) {
        self.name = update.name.trim().to_string();
        self.scheduled_at = update.scheduled_at;
        self.timezone = update.timezone;
        self.updated_by = updated_by;
        self.updated_at = Utc::now();
    }

    pub(crate) fn mark_done(&mut self) {
        let now = Utc::now();
        self.status = ReleaseStatus::Done;
        self.released_at = Some(now);
        self.updated_at = now;
    }
}

/// Input for creating a release.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRelease {
    pub name: String,
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub timezone: Option<String>,
}

impl NewRelease {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn scheduled(mut self, at: DateTime<Utc>, timezone: impl Into<String>) -> Self {
        self.scheduled_at = Some(at);
        self.timezone = Some(timezone.into());
        self
    }

    pub(crate) fn check_shape(&self) -> Result<()> {
        check_name(&self.name)
    }
}

/// Full replacement of a release's editable fields. A `None` schedule clears it.
pub type ReleaseUpdate = NewRelease;

fn check_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(CadenceError::Validation("name is a required field".into()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// ReleaseAction
// ---------------------------------------------------------------------------

/// One entry-level publish or unpublish intent belonging to a release.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseAction {
    pub id: ActionId,
    pub release_id: ReleaseId,
    #[serde(rename = "type")]
    pub action_type: ActionType,
    /// Uid of the target entry's content type.
    pub content_type: String,
    pub entry: EntryRef,
    pub locale: Option<String>,
    /// `None` until computed; `false` when the entry fails schema validation.
    pub is_entry_valid: Option<bool>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ReleaseAction {
    pub fn is_invalid(&self) -> bool {
        self.is_entry_valid == Some(false)
    }
}

/// Input for attaching an entry to a release.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAction {
    #[serde(rename = "type")]
    pub action_type: ActionType,
    pub entry: EntryRef,
}

impl NewAction {
    pub fn publish(entry: EntryRef) -> Self {
        Self {
            action_type: ActionType::Publish,
            entry,
        }
    }

    pub fn unpublish(entry: EntryRef) -> Self {
        Self {
            action_type: ActionType::Unpublish,
            entry,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionUpdate {
    #[serde(rename = "type")]
    pub action_type: ActionType,
}

/// Tally of a release's actions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ActionCounts {
    pub total: usize,
    pub invalid: usize,
    pub publish: usize,
    pub unpublish: usize,
}

impl ActionCounts {
    pub fn tally<'a>(actions: impl IntoIterator<Item = &'a ReleaseAction>) -> Self {
        let mut counts = Self::default();
        for action in actions {
            counts.total += 1;
            if action.is_invalid() {
                counts.invalid += 1;
            }
            match action.action_type {
                ActionType::Publish => counts.publish += 1,
                ActionType::Unpublish => counts.unpublish += 1,
            }
        }
        counts
    }

    pub fn status(&self) -> ReleaseStatus {
        ReleaseStatus::derive(self.total, self.invalid)
    }
}
