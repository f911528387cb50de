use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;

use super::ReleaseService;
use crate::db::{ReleaseQuery, WriteTx};
use crate::error::{CadenceError, Result};
use crate::events::{self, ReleaseEvent, Telemetry};
use crate::release::{ActionCounts, Release, ReleaseAction};
use crate::types::{ActionType, EntryId, ReleaseId, ReleaseStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishMeta {
    pub total_entries: usize,
    pub total_published_entries: usize,
    pub total_unpublished_entries: usize,
}

impl From<ActionCounts> for PublishMeta {
    fn from(counts: ActionCounts) -> Self {
        Self {
            total_entries: counts.publish + counts.unpublish,
            total_published_entries: counts.publish,
            total_unpublished_entries: counts.unpublish,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Published {
    pub release: Release,
    pub meta: PublishMeta,
}

struct SingleTypeAction {
    uid: String,
    action_type: ActionType,
    entry_id: EntryId,
}

#[derive(Default)]
struct CollectionActions {
    to_publish: Vec<EntryId>,
    to_unpublish: Vec<EntryId>,
}

/// A release's actions split the way they are applied.
struct FormattedActions {
    single: Vec<SingleTypeAction>,
    collection: BTreeMap<String, CollectionActions>,
}

impl ReleaseService {
    /// Apply every action of a release and mark it `done`.
    ///
    /// The release is read and written inside one database write
    /// transaction, so concurrent publishes of the same id are serialized and
    /// only the first can transition it. Content changes run in a content-store
    /// transaction: any failure rolls them back, marks the release `failed`
    /// (that status change is committed), emits a failed event and returns the
    /// error.
    pub fn publish(&self, id: ReleaseId) -> Result<Published> {
        let outcome = self.db.write(|tx| {
            let mut release = tx.require_release(id)?;
            if release.is_released() {
                return Err(CadenceError::already_published());
            }
            if release.status == ReleaseStatus::Failed {
                return Err(CadenceError::Validation("Release failed to publish".into()));
            }

            tracing::info!(release_id = id, name = %release.name, "starting to publish release");
            match self.apply_actions(tx, id) {
                Ok(()) => {
                    release.mark_done();
                    tx.put_release(&release)?;
                    let meta = PublishMeta::from(tx.action_counts(id)?);
                    Ok(Ok(Published { release, meta }))
                }
                Err(e) => {
                    release.status = ReleaseStatus::Failed;
                    release.updated_at = Utc::now();
                    tx.put_release(&release)?;
                    Ok(Err(e))
                }
            }
        })?;

        // A published or failed release can never fire again
        self.scheduler.cancel(id);

        match outcome {
            Ok(published) => {
                tracing::info!(release_id = id, entries = published.meta.total_entries, "release published");
                self.events.emit(ReleaseEvent::published(&published.release));
                events::track(Telemetry::PublishRelease, id);
                Ok(published)
            }
            Err(e) => {
                tracing::warn!(release_id = id, error = %e, "release failed to publish");
                self.events.emit(ReleaseEvent::publish_failed(id, &e));
                Err(e)
            }
        }
    }

    fn apply_actions(&self, tx: &WriteTx, id: ReleaseId) -> Result<()> {
        let actions = tx.actions_for(id)?;
        let formatted = self.format_actions(&actions)?;

        self.content.transaction(&mut || {
            for action in &formatted.single {
                self.apply_single_type_action(action)?;
            }
            for (uid, bucket) in &formatted.collection {
                if !bucket.to_publish.is_empty() {
                    let entries = self.content.find_many(uid, &bucket.to_publish)?;
                    self.content.publish_many(uid, &entries)?;
                }
                if !bucket.to_unpublish.is_empty() {
                    let entries = self.content.find_many(uid, &bucket.to_unpublish)?;
                    self.content.unpublish_many(uid, &entries)?;
                }
            }
            Ok(())
        })
    }

    fn format_actions(&self, actions: &[ReleaseAction]) -> Result<FormattedActions> {
        if actions.is_empty() {
            return Err(CadenceError::Validation("No entries to publish".into()));
        }

        let mut formatted = FormattedActions {
            single: Vec::new(),
            collection: BTreeMap::new(),
        };
        for action in actions {
            let content_type = self.registry.get(&action.content_type).ok_or_else(|| {
                CadenceError::NotFound(format!(
                    "No content type found for uid {}",
                    action.content_type
                ))
            })?;

            if content_type.is_collection() {
                let bucket = formatted
                    .collection
                    .entry(action.content_type.clone())
                    .or_default();
                match action.action_type {
                    ActionType::Publish => bucket.to_publish.push(action.entry.id),
                    ActionType::Unpublish => bucket.to_unpublish.push(action.entry.id),
                }
            } else {
                formatted.single.push(SingleTypeAction {
                    uid: action.content_type.clone(),
                    action_type: action.action_type,
                    entry_id: action.entry.id,
                });
            }
        }
        Ok(formatted)
    }

    fn apply_single_type_action(&self, action: &SingleTypeAction) -> Result<()> {
        let entry = self
            .content
            .find_one(&action.uid, action.entry_id)?
            .ok_or_else(|| {
                CadenceError::NotFound(format!(
                    "No entry found for id {} in {}",
                    action.entry_id, action.uid
                ))
            })?;
        let result = match action.action_type {
            ActionType::Publish => self.content.publish(&action.uid, &entry),
            ActionType::Unpublish => self.content.unpublish(&action.uid, &entry),
        };
        match result {
            Ok(_) | Err(CadenceError::AlreadyInTargetState { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Publish/unpublish counts for a release, as reported after publishing.
    pub fn publish_meta(&self, id: ReleaseId) -> Result<PublishMeta> {
        self.db
            .read(|tx| Ok(PublishMeta::from(tx.action_counts(id)?)))
    }
}
