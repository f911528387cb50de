use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub type ReleaseId = u64;
pub type ActionId = u64;
pub type EntryId = u64;

// ---------------------------------------------------------------------------
// ReleaseStatus
// ---------------------------------------------------------------------------

/// Lifecycle state of a release.
///
/// `Empty`, `Blocked` and `Ready` are derived from the release's actions and
/// recomputed after every action mutation. `Done` and `Failed` are written only
/// by the publish transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseStatus {
    Ready,
    Blocked,
    Failed,
    Done,
    Empty,
}

impl ReleaseStatus {
    /// Status implied by the number of actions and how many of them target an
    /// invalid entry.
    pub fn derive(total_actions: usize, invalid_actions: usize) -> Self {
        match (total_actions, invalid_actions) {
            (0, _) => ReleaseStatus::Empty,
            (_, 0) => ReleaseStatus::Ready,
            _ => ReleaseStatus::Blocked,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReleaseStatus::Ready => "ready",
            ReleaseStatus::Blocked => "blocked",
            ReleaseStatus::Failed => "failed",
            ReleaseStatus::Done => "done",
            ReleaseStatus::Empty => "empty",
        }
    }
}

impl fmt::Display for ReleaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ActionType
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Publish,
    Unpublish,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Publish => "publish",
            ActionType::Unpublish => "unpublish",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "publish" => Ok(ActionType::Publish),
            "unpublish" => Ok(ActionType::Unpublish),
            other => Err(format!("unknown action type '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// EntryState
// ---------------------------------------------------------------------------

/// Publication state of a content entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryState {
    Draft,
    Published,
}

impl fmt::Display for EntryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryState::Draft => f.write_str("draft"),
            EntryState::Published => f.write_str("published"),
        }
    }
}

// ---------------------------------------------------------------------------
// EntryRef
// ---------------------------------------------------------------------------

/// Polymorphic reference to a content entry: id plus the uid of its content type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryRef {
    pub id: EntryId,
    pub content_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
}

impl EntryRef {
    pub fn new(id: EntryId, content_type: impl Into<String>) -> Self {
        Self {
            id,
            content_type: content_type.into(),
            locale: None,
        }
    }

    /// Two references target the same entry when id and content type match;
    /// the locale is not part of the identity.
    pub fn same_entry(&self, other: &EntryRef) -> bool {
        self.id == other.id && self.content_type == other.content_type
    }
}

// ---------------------------------------------------------------------------
// Permission
// ---------------------------------------------------------------------------

/// Named permissions gating the admin API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Permission {
    Read,
    Create,
    Update,
    Delete,
    Publish,
    CreateAction,
    DeleteAction,
}

impl Permission {
    pub fn all() -> &'static [Permission] {
        &[
            Permission::Read,
            Permission::Create,
            Permission::Update,
            Permission::Delete,
            Permission::Publish,
            Permission::CreateAction,
            Permission::DeleteAction,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::Read => "read",
            Permission::Create => "create",
            Permission::Update => "update",
            Permission::Delete => "delete",
            Permission::Publish => "publish",
            Permission::CreateAction => "create-action",
            Permission::DeleteAction => "delete-action",
        }
    }

    pub fn uid(&self) -> String {
        format!("plugin::content-releases.{}", self.as_str())
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_status_table() {
        assert_eq!(ReleaseStatus::derive(0, 0), ReleaseStatus::Empty);
        assert_eq!(ReleaseStatus::derive(3, 0), ReleaseStatus::Ready);
        assert_eq!(ReleaseStatus::derive(3, 1), ReleaseStatus::Blocked);
        assert_eq!(ReleaseStatus::derive(1, 1), ReleaseStatus::Blocked);
    }

    #[test]
    fn action_type_parses() {
        assert_eq!("publish".parse::<ActionType>(), Ok(ActionType::Publish));
        assert_eq!("unpublish".parse::<ActionType>(), Ok(ActionType::Unpublish));
        assert!("archive".parse::<ActionType>().is_err());
    }

    #[test]
    fn entry_identity_ignores_locale() {
        let a = EntryRef::new(42, "api::article.article");
        let mut b = EntryRef::new(42, "api::article.article");
        b.locale = Some("fr".into());
        assert!(a.same_entry(&b));
        assert!(!a.same_entry(&EntryRef::new(42, "api::page.page")));
    }

    #[test]
    fn permission_serializes_kebab_case() {
        let json = serde_json::to_string(&Permission::CreateAction).unwrap();
        assert_eq!(json, "\"create-action\"");
        assert_eq!(
            Permission::DeleteAction.uid(),
            "plugin::content-releases.delete-action"
        );
    }
}
