use thiserror::Error;

use crate::types::{ActionId, EntryId, EntryState, ReleaseId};

#[derive(Debug, Error)]
pub enum CadenceError {
    #[error("not initialized: run 'cadence init'")]
    NotInitialized,

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Validation(String),

    #[error(
        "Entry with id {entry_id} and contentType {content_type} already exists in release with id {release_id}"
    )]
    AlreadyOnRelease {
        entry_id: EntryId,
        content_type: String,
        release_id: ReleaseId,
    },

    #[error("entry {entry_id} of {content_type} is already {state}")]
    AlreadyInTargetState {
        content_type: String,
        entry_id: EntryId,
        state: EntryState,
    },

    #[error("scheduler error: {0}")]
    Scheduler(String),

    #[error("database error: {0}")]
    Db(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl CadenceError {
    pub fn release_not_found(id: ReleaseId) -> Self {
        Self::NotFound(format!("No release found for id {id}"))
    }

    /// The update/delete action paths report a missing action and an action on an
    /// already published release identically.
    pub fn action_not_found(action_id: ActionId, release_id: ReleaseId) -> Self {
        Self::NotFound(format!(
            "Action with id {action_id} not found in release with id {release_id} or it is already published"
        ))
    }

    pub fn already_published() -> Self {
        Self::Validation("Release already published".to_string())
    }

    /// True for business-rule and schema violations, including the
    /// duplicate-entry condition.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::AlreadyOnRelease { .. })
    }

    /// Short machine-readable name, used in API error bodies and webhook payloads.
    pub fn name(&self) -> &'static str {
        match self {
            Self::NotInitialized => "NotInitializedError",
            Self::NotFound(_) => "NotFoundError",
            Self::Validation(_) => "ValidationError",
            Self::AlreadyOnRelease { .. } => "AlreadyOnReleaseError",
            Self::AlreadyInTargetState { .. } => "AlreadyInTargetStateError",
            Self::Scheduler(_) => "SchedulerError",
            Self::Db(_) | Self::Io(_) | Self::Yaml(_) | Self::Json(_) => "ApplicationError",
        }
    }
}

pub(crate) fn db_err(e: impl std::fmt::Display) -> CadenceError {
    CadenceError::Db(e.to_string())
}

pub type Result<T> = std::result::Result<T, CadenceError>;
