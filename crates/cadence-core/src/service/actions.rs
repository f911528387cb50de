use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::str::FromStr;

use super::{refresh_status, ReleaseService};
use crate::content::ContentType;
use crate::db::{ReleaseQuery, WriteTx};
use crate::error::{CadenceError, Result};
use crate::pagination::{Pagination, PaginationMeta};
use crate::release::{ActionCounts, ActionUpdate, NewAction, ReleaseAction};
use crate::types::{ActionId, ActionType, ReleaseId};

// ---------------------------------------------------------------------------
// Result shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkOutcome {
    pub created: Vec<ReleaseAction>,
    pub entries_already_in_release: usize,
    pub total_entries: usize,
}

/// How `find_actions` groups its results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GroupBy {
    #[default]
    ContentType,
    Action,
    Locale,
}

impl FromStr for GroupBy {
    type Err = std::convert::Infallible;

    /// Unknown values group by content type.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s {
            "action" => GroupBy::Action,
            "locale" => GroupBy::Locale,
            _ => GroupBy::ContentType,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentTypeLabel {
    pub uid: String,
    pub display_name: String,
    pub main_field_value: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocaleLabel {
    pub code: String,
    pub name: String,
}

/// An action decorated for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormattedAction {
    pub id: ActionId,
    #[serde(rename = "type")]
    pub action_type: ActionType,
    pub content_type: ContentTypeLabel,
    /// The current entry, or `null` when it no longer exists.
    pub entry: Option<serde_json::Value>,
    pub locale: Option<LocaleLabel>,
    pub is_entry_valid: Option<bool>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub type ActionGroup = BTreeMap<String, Vec<FormattedAction>>;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionPage {
    pub groups: ActionGroup,
    pub pagination: PaginationMeta,
    pub content_types: BTreeMap<String, ContentType>,
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

impl ReleaseService {
    /// Attach one entry to a pending release and refresh its status.
    pub fn create_action(&self, release_id: ReleaseId, action: NewAction) -> Result<ReleaseAction> {
        self.db.write(|tx| {
            let created = self.insert_action(tx, release_id, &action)?;
            refresh_status(tx, release_id)?;
            Ok(created)
        })
    }

    /// Attach many entries in one transaction. Entries already on the release
    /// are skipped; any other failure aborts the whole batch.
    pub fn create_many(&self, release_id: ReleaseId, actions: Vec<NewAction>) -> Result<BulkOutcome> {
        let total_entries = actions.len();
        let outcome = self.db.write(|tx| {
            let mut created = Vec::with_capacity(actions.len());
            let mut skipped = 0;
            for action in &actions {
                match self.insert_action(tx, release_id, action) {
                    Ok(a) => created.push(a),
                    Err(CadenceError::AlreadyOnRelease { .. }) => skipped += 1,
                    Err(e) => return Err(e),
                }
            }
            if !created.is_empty() {
                refresh_status(tx, release_id)?;
            }
            Ok(BulkOutcome {
                created,
                entries_already_in_release: skipped,
                total_entries,
            })
        })?;
        tracing::debug!(
            release_id,
            created = outcome.created.len(),
            skipped = outcome.entries_already_in_release,
            "bulk actions created"
        );
        Ok(outcome)
    }

    fn insert_action(
        &self,
        tx: &mut WriteTx,
        release_id: ReleaseId,
        action: &NewAction,
    ) -> Result<ReleaseAction> {
        let uid = &action.entry.content_type;
        let content_type = self.validator.entry_content_type(uid)?;
        self.validator.unique_entry(tx, release_id, action)?;

        let release = tx.require_release(release_id)?;
        if release.is_released() {
            return Err(CadenceError::already_published());
        }

        let entry = self
            .content
            .find_one(uid, action.entry.id)?
            .ok_or_else(|| {
                CadenceError::NotFound(format!("No entry found for id {} in {uid}", action.entry.id))
            })?;
        let is_entry_valid = self.entity_validator.is_valid(content_type, &entry);

        let now = Utc::now();
        let created = ReleaseAction {
            id: tx.next_action_id()?,
            release_id,
            action_type: action.action_type,
            content_type: uid.clone(),
            entry: action.entry.clone(),
            locale: action.entry.locale.clone().or(entry.locale),
            is_entry_valid: Some(is_entry_valid),
            created_at: now,
            updated_at: now,
        };
        tx.put_action(&created)?;
        Ok(created)
    }

    /// Load an action of a pending release, or fail with the ambiguous
    /// not-found error.
    fn pending_action(
        tx: &WriteTx,
        action_id: ActionId,
        release_id: ReleaseId,
    ) -> Result<ReleaseAction> {
        let action = tx
            .action(action_id)?
            .filter(|a| a.release_id == release_id);
        let pending = tx.release(release_id)?.is_some_and(|r| r.is_pending());
        match action {
            Some(action) if pending => Ok(action),
            _ => Err(CadenceError::action_not_found(action_id, release_id)),
        }
    }

    pub fn update_action(
        &self,
        action_id: ActionId,
        release_id: ReleaseId,
        update: ActionUpdate,
    ) -> Result<ReleaseAction> {
        self.db.write(|tx| {
            let mut action = Self::pending_action(tx, action_id, release_id)?;
            action.action_type = update.action_type;
            action.updated_at = Utc::now();
            tx.put_action(&action)?;
            Ok(action)
        })
    }

    pub fn delete_action(&self, action_id: ActionId, release_id: ReleaseId) -> Result<ReleaseAction> {
        self.db.write(|tx| {
            let action = Self::pending_action(tx, action_id, release_id)?;
            tx.remove_action(&action)?;
            refresh_status(tx, release_id)?;
            Ok(action)
        })
    }

    pub fn count_actions(&self, release_id: ReleaseId) -> Result<ActionCounts> {
        self.db.read(|tx| tx.action_counts(release_id))
    }

    /// One page of a release's actions, grouped for display.
    pub fn find_actions(
        &self,
        release_id: ReleaseId,
        group_by: GroupBy,
        pagination: Pagination,
    ) -> Result<ActionPage> {
        let mut actions = self.db.read(|tx| {
            tx.require_release(release_id)?;
            tx.actions_for(release_id)
        })?;

        match group_by {
            GroupBy::ContentType => actions.sort_by(|a, b| a.content_type.cmp(&b.content_type)),
            GroupBy::Action => actions.sort_by_key(|a| a.action_type.as_str()),
            GroupBy::Locale => actions.sort_by(|a, b| a.locale.cmp(&b.locale)),
        }
        let total = actions.len();
        let page = pagination.apply(actions);

        let mut content_types = BTreeMap::new();
        for action in &page {
            if let Some(ct) = self.registry.get(&action.content_type) {
                content_types
                    .entry(ct.uid.clone())
                    .or_insert_with(|| ct.clone());
            }
        }

        let formatted = page
            .into_iter()
            .map(|action| self.format_action(action))
            .collect::<Result<Vec<_>>>()?;
        Ok(ActionPage {
            groups: group_actions(formatted, group_by),
            pagination: pagination.meta(total),
            content_types,
        })
    }

    fn format_action(&self, action: ReleaseAction) -> Result<FormattedAction> {
        let content_type = self.registry.get(&action.content_type);
        let entry = self
            .content
            .find_one(&action.content_type, action.entry.id)?;
        let main_field_value = match (content_type, &entry) {
            (Some(ct), Some(entry)) => entry.label(ct.main_field()),
            _ => serde_json::json!(action.entry.id),
        };
        let display_name = content_type
            .map(|ct| ct.display_name().to_string())
            .unwrap_or_else(|| action.content_type.clone());

        Ok(FormattedAction {
            id: action.id,
            action_type: action.action_type,
            content_type: ContentTypeLabel {
                uid: action.content_type,
                display_name,
                main_field_value,
            },
            entry: entry.map(serde_json::to_value).transpose()?,
            locale: action.locale.map(|code| LocaleLabel {
                name: self.i18n.locale_name(&code),
                code,
            }),
            is_entry_valid: action.is_entry_valid,
            created_at: action.created_at,
            updated_at: action.updated_at,
        })
    }
}

fn group_actions(actions: Vec<FormattedAction>, group_by: GroupBy) -> ActionGroup {
    let mut groups = ActionGroup::new();
    for action in actions {
        let key = match group_by {
            GroupBy::ContentType => action.content_type.display_name.clone(),
            GroupBy::Action => action.action_type.to_string(),
            GroupBy::Locale => action
                .locale
                .as_ref()
                .map(|l| l.name.clone())
                .unwrap_or_else(|| "No locale".to_string()),
        };
        groups.entry(key).or_default().push(action);
    }
    groups
}
