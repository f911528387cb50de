use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::{Arc, PoisonError};
use tokio::sync::broadcast::error::RecvError;

use super::{refresh_status, ReleaseService};
use crate::content::{ContentEvent, ContentTypeRegistry};
use crate::db::{ReleaseQuery, WriteTx};
use crate::error::Result;
use crate::types::{EntryId, ReleaseId};

const CONTENT_TYPES_SNAPSHOT: &str = "content_types";

/// What the content-type migration changed at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationReport {
    pub deleted_actions: usize,
    pub revalidated_actions: usize,
    pub relocalized_actions: usize,
    pub refreshed_releases: usize,
}

impl ReleaseService {
    /// Startup: reconcile actions with the current content types, then
    /// rebuild the scheduler registry from the database.
    pub fn bootstrap(&self) -> Result<MigrationReport> {
        let report = self.migrate_content_types()?;
        self.scheduler.sync_from_database()?;
        Ok(report)
    }

    /// Teardown: cancel every scheduled job and stop the content listener.
    pub fn destroy(&self) {
        self.scheduler.shutdown();
        let listener = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = listener {
            handle.abort();
        }
    }

    /// Compare the content types with the snapshot taken at the previous
    /// startup and bring pending actions in line:
    /// removed types and types without draft/publish lose their actions,
    /// changed schemas are revalidated, and locale toggles clear or default
    /// the action locale.
    pub fn migrate_content_types(&self) -> Result<MigrationReport> {
        let report = self.db.write(|tx| {
            let previous: Option<ContentTypeRegistry> = tx
                .snapshot(CONTENT_TYPES_SNAPSHOT)?
                .map(|bytes| serde_json::from_slice(&bytes))
                .transpose()?;

            let mut report = MigrationReport::default();
            let mut touched = BTreeSet::new();
            for release in tx.pending_releases()? {
                for mut action in tx.actions_for(release.id)? {
                    let Some(current) = self.registry.get(&action.content_type) else {
                        tx.remove_action(&action)?;
                        report.deleted_actions += 1;
                        touched.insert(release.id);
                        continue;
                    };
                    if !current.draft_and_publish {
                        tx.remove_action(&action)?;
                        report.deleted_actions += 1;
                        touched.insert(release.id);
                        continue;
                    }

                    let before = previous.as_ref().and_then(|p| p.get(&action.content_type));
                    let Some(before) = before else { continue };
                    if before == current {
                        continue;
                    }

                    let mut changed = false;
                    if before.localized && !current.localized && action.locale.is_some() {
                        action.locale = None;
                        report.relocalized_actions += 1;
                        changed = true;
                    } else if !before.localized && current.localized && action.locale.is_none() {
                        action.locale = Some(self.i18n.default_locale.clone());
                        report.relocalized_actions += 1;
                        changed = true;
                    }

                    let valid = self
                        .content
                        .find_one(&action.content_type, action.entry.id)?
                        .map(|entry| self.entity_validator.is_valid(current, &entry));
                    if let Some(valid) = valid {
                        report.revalidated_actions += 1;
                        if action.is_entry_valid != Some(valid) {
                            action.is_entry_valid = Some(valid);
                            changed = true;
                        }
                    }

                    if changed {
                        action.updated_at = Utc::now();
                        tx.put_action(&action)?;
                        touched.insert(release.id);
                    }
                }
            }

            report.refreshed_releases = refresh_all(tx, &touched)?;
            let snapshot = serde_json::to_vec(self.registry.as_ref())?;
            tx.put_snapshot(CONTENT_TYPES_SNAPSHOT, &snapshot)?;
            Ok(report)
        })?;

        if report != MigrationReport::default() {
            tracing::info!(
                deleted = report.deleted_actions,
                revalidated = report.revalidated_actions,
                relocalized = report.relocalized_actions,
                releases = report.refreshed_releases,
                "content type migration applied"
            );
        }
        Ok(report)
    }

    /// Keep pending actions in sync with entry changes. Returns the number of
    /// actions touched.
    pub fn handle_content_event(&self, event: &ContentEvent) -> Result<usize> {
        match event {
            ContentEvent::EntryUpdated { content_type, entry } => {
                let Some(ct) = self.registry.get(content_type) else {
                    return Ok(0);
                };
                if !ct.draft_and_publish {
                    return Ok(0);
                }
                let valid = self.entity_validator.is_valid(ct, entry);
                self.db.write(|tx| {
                    let mut touched = BTreeSet::new();
                    let mut count = 0;
                    for mut action in pending_actions_for(tx, content_type, &[entry.id])? {
                        if action.is_entry_valid != Some(valid) {
                            action.is_entry_valid = Some(valid);
                            action.updated_at = Utc::now();
                            tx.put_action(&action)?;
                            touched.insert(action.release_id);
                            count += 1;
                        }
                    }
                    refresh_all(tx, &touched)?;
                    Ok(count)
                })
            }
            ContentEvent::EntriesDeleted { content_type, ids } => self.db.write(|tx| {
                let mut touched = BTreeSet::new();
                let mut count = 0;
                for action in pending_actions_for(tx, content_type, ids)? {
                    tx.remove_action(&action)?;
                    touched.insert(action.release_id);
                    count += 1;
                }
                refresh_all(tx, &touched)?;
                Ok(count)
            }),
        }
    }

    /// Subscribe to the content store and apply `handle_content_event` to
    /// every change. Requires a tokio runtime; a no-op without one.
    pub fn spawn_content_listener(self: &Arc<Self>) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::debug!("no runtime; content listener not started");
            return;
        };
        let mut rx = self.content.subscribe();
        let weak = Arc::downgrade(self);
        let task = runtime.spawn(async move {
            loop {
                let event = match rx.recv().await {
                    Ok(event) => event,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "content listener lagged; some entry changes were not applied");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };
                let Some(service) = weak.upgrade() else { break };
                let result =
                    tokio::task::spawn_blocking(move || service.handle_content_event(&event)).await;
                match result {
                    Ok(Ok(n)) if n > 0 => tracing::debug!(actions = n, "entry change applied to releases"),
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => tracing::warn!(error = %e, "failed to apply entry change to releases"),
                    Err(e) => tracing::error!(error = %e, "content listener task panicked"),
                }
            }
        });

        let previous = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(task.abort_handle());
        if let Some(previous) = previous {
            previous.abort();
        }
    }
}

fn pending_actions_for(
    tx: &WriteTx,
    content_type: &str,
    entry_ids: &[EntryId],
) -> Result<Vec<crate::release::ReleaseAction>> {
    let mut out = Vec::new();
    for release in tx.pending_releases()? {
        out.extend(
            tx.actions_for(release.id)?
                .into_iter()
                .filter(|a| a.content_type == content_type && entry_ids.contains(&a.entry.id)),
        );
    }
    Ok(out)
}

fn refresh_all(tx: &mut WriteTx, releases: &BTreeSet<ReleaseId>) -> Result<usize> {
    for id in releases {
        refresh_status(tx, *id)?;
    }
    Ok(releases.len())
}
