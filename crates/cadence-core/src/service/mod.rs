//! Release orchestration: creation, scheduling, status derivation and the
//! atomic publish of a release's actions.
//!
//! Every operation is synchronous and runs its reads, rule checks and writes
//! inside one `ReleaseDb` write transaction. Scheduler registration and event
//! emission happen after the transaction commits.

mod actions;
mod lifecycle;
mod publish;
mod queries;

pub use actions::{ActionGroup, ActionPage, BulkOutcome, FormattedAction, GroupBy};
pub use lifecycle::MigrationReport;
pub use publish::{PublishMeta, Published};
pub use queries::{ReleaseEntryActions, ReleasePage, ReleaseRef, ReleaseSort, ReleaseSummary};

use chrono::Utc;
use std::sync::{Arc, Mutex};
use tokio::task::AbortHandle;

use crate::config::{ApiConfig, I18nConfig};
use crate::content::{ContentStore, ContentTypeRegistry};
use crate::db::{ReleaseDb, ReleaseQuery, WriteTx};
use crate::error::{CadenceError, Result};
use crate::events::{self, EventHub, Telemetry};
use crate::release::{NewRelease, Release, ReleaseUpdate};
use crate::scheduler::{Publisher, Scheduler};
use crate::types::ReleaseId;
use crate::validation::ReleaseValidator;
use crate::validator::EntityValidator;

/// Collaborators a `ReleaseService` is built from.
pub struct ServiceContext {
    pub db: Arc<ReleaseDb>,
    pub content: Arc<dyn ContentStore>,
    pub registry: Arc<ContentTypeRegistry>,
    pub entity_validator: Arc<dyn EntityValidator>,
    pub events: EventHub,
    pub max_pending_releases: usize,
    pub api: ApiConfig,
    pub i18n: I18nConfig,
}

pub struct ReleaseService {
    db: Arc<ReleaseDb>,
    content: Arc<dyn ContentStore>,
    registry: Arc<ContentTypeRegistry>,
    entity_validator: Arc<dyn EntityValidator>,
    validator: ReleaseValidator,
    scheduler: Scheduler,
    events: EventHub,
    api: ApiConfig,
    i18n: I18nConfig,
    listener: Mutex<Option<AbortHandle>>,
}

impl ReleaseService {
    /// Build the service. The scheduler's jobs call back into the service
    /// through a weak reference, so the returned `Arc` is the only owner.
    pub fn new(ctx: ServiceContext) -> Arc<Self> {
        Arc::new_cyclic(|weak: &std::sync::Weak<Self>| {
            let publisher: std::sync::Weak<dyn Publisher> = weak.clone();
            Self {
                scheduler: Scheduler::new(Arc::clone(&ctx.db), publisher),
                validator: ReleaseValidator::new(
                    ctx.max_pending_releases,
                    Arc::clone(&ctx.registry),
                ),
                db: ctx.db,
                content: ctx.content,
                registry: ctx.registry,
                entity_validator: ctx.entity_validator,
                events: ctx.events,
                api: ctx.api,
                i18n: ctx.i18n,
                listener: Mutex::new(None),
            }
        })
    }

    pub fn events(&self) -> &EventHub {
        &self.events
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn registry(&self) -> &ContentTypeRegistry {
        &self.registry
    }

    pub fn api_config(&self) -> &ApiConfig {
        &self.api
    }

    // -----------------------------------------------------------------------
    // Releases
    // -----------------------------------------------------------------------

    pub fn create(&self, data: NewRelease, actor: Option<&str>) -> Result<Release> {
        data.check_shape()?;
        let release = self.db.write(|tx| {
            self.validator.pending_releases_limit(tx)?;
            self.validator
                .unique_name_for_pending_release(tx, &data.name, None)?;
            self.validator
                .scheduled_at_is_later_than_now(data.scheduled_at)?;

            let id = tx.next_release_id()?;
            let release = Release::new(id, data, actor.map(str::to_string));
            tx.put_release(&release)?;
            Ok(release)
        })?;

        if let Some(at) = release.scheduled_at {
            self.scheduler.set(release.id, at)?;
        }
        events::track(Telemetry::CreateRelease, release.id);
        Ok(release)
    }

    pub fn find_one(&self, id: ReleaseId) -> Result<Release> {
        self.db.read(|tx| tx.require_release(id))
    }

    pub fn pending_count(&self) -> Result<usize> {
        self.db.read(|tx| Ok(tx.pending_releases()?.len()))
    }

    /// Replace a pending release's name and schedule. A new schedule replaces
    /// the registered job; clearing the schedule cancels it.
    pub fn update(&self, id: ReleaseId, data: ReleaseUpdate, actor: Option<&str>) -> Result<Release> {
        data.check_shape()?;
        let (release, had_schedule) = self.db.write(|tx| {
            self.validator
                .unique_name_for_pending_release(tx, &data.name, Some(id))?;
            self.validator
                .scheduled_at_is_later_than_now(data.scheduled_at)?;

            let mut release = tx.require_release(id)?;
            if release.is_released() {
                return Err(CadenceError::already_published());
            }
            let had_schedule = release.scheduled_at.is_some();
            release.apply(data, actor.map(str::to_string));
            tx.put_release(&release)?;
            let release = refresh_status(tx, id)?;
            Ok((release, had_schedule))
        })?;

        match release.scheduled_at {
            Some(at) => self.scheduler.set(id, at)?,
            None if had_schedule => {
                self.scheduler.cancel(id);
            }
            None => {}
        }
        events::track(Telemetry::UpdateRelease, id);
        Ok(release)
    }

    /// Delete a pending release and all of its actions.
    pub fn delete(&self, id: ReleaseId) -> Result<Release> {
        let release = self.db.write(|tx| {
            let release = tx.require_release(id)?;
            if release.is_released() {
                return Err(CadenceError::already_published());
            }
            tx.remove_release(id)?;
            Ok(release)
        })?;

        if release.scheduled_at.is_some() {
            self.scheduler.cancel(id);
        }
        events::track(Telemetry::DeleteRelease, id);
        Ok(release)
    }

    /// Recompute a release's status from its actions.
    pub fn update_release_status(&self, id: ReleaseId) -> Result<Release> {
        self.db.write(|tx| refresh_status(tx, id))
    }
}

/// Persist the status implied by the release's current actions. Released
/// releases are left untouched.
fn refresh_status(tx: &mut WriteTx, id: ReleaseId) -> Result<Release> {
    let mut release = tx.require_release(id)?;
    if release.is_released() {
        return Ok(release);
    }
    let status = tx.action_counts(id)?.status();
    if release.status != status {
        tracing::debug!(release_id = id, from = %release.status, to = %status, "release status changed");
        release.status = status;
        release.updated_at = Utc::now();
        tx.put_release(&release)?;
    }
    Ok(release)
}

impl Publisher for ReleaseService {
    fn publish_release(&self, release_id: ReleaseId) -> Result<()> {
        self.publish(release_id).map(|_| ())
    }
}

// ---------------------------------------------------------------------------
// Test fixtures shared by the service submodules
// ---------------------------------------------------------------------------


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use crate::release::NewAction;
    use crate::types::{EntryRef, ReleaseStatus};
    use chrono::Duration;

    #[test]
    fn create_starts_empty_and_records_creator() {
        let h = harness();
        let r = h
            .service
            .create(NewRelease::named("Spring Launch"), Some("ada"))
            .unwrap();
        assert_eq!(r.status, ReleaseStatus::Empty);
        assert_eq!(r.created_by.as_deref(), Some("ada"));
        assert_eq!(h.service.find_one(r.id).unwrap().name, "Spring Launch");
    }

    #[test]
    fn fourth_pending_release_is_rejected() {
        let h = harness();
        for name in ["a", "b", "c"] {
            h.service.create(NewRelease::named(name), None).unwrap();
        }
        let err = h.service.create(NewRelease::named("d"), None).unwrap_err();
        assert!(err.is_validation());
        assert_eq!(h.service.pending_count().unwrap(), 3);
    }

    #[test]
    fn duplicate_pending_name_is_rejected() {
        let h = harness();
        h.service.create(NewRelease::named("Spring"), None).unwrap();
        let err = h.service.create(NewRelease::named(" Spring "), None).unwrap_err();
        assert_eq!(err.to_string(), "Release with name Spring already exists");
    }

    #[test]
    fn schedule_in_the_past_is_rejected() {
        let h = harness();
        let data = NewRelease::named("late").scheduled(Utc::now() - Duration::minutes(5), "UTC");
        assert!(h.service.create(data, None).unwrap_err().is_validation());
    }

    #[test]
    fn update_keeps_own_name_and_rejects_released() {
        let h = harness();
        let r = h.service.create(NewRelease::named("Spring"), None).unwrap();
        let updated = h
            .service
            .update(r.id, NewRelease::named("Spring"), Some("bob"))
            .unwrap();
        assert_eq!(updated.updated_by.as_deref(), Some("bob"));

        h.service
            .create_action(r.id, NewAction::publish(EntryRef::new(1, ARTICLE)))
            .unwrap();
        h.service.publish(r.id).unwrap();
        let err = h
            .service
            .update(r.id, NewRelease::named("Again"), None)
            .unwrap_err();
        assert_eq!(err.to_string(), "Release already published");
    }

    #[test]
    fn update_missing_release_is_not_found() {
        let h = harness();
        let err = h.service.update(42, NewRelease::named("x"), None).unwrap_err();
        assert!(matches!(err, CadenceError::NotFound(_)));
    }

    #[test]
    fn delete_removes_actions_and_refuses_released() {
        let h = harness();
        let r = h.service.create(NewRelease::named("a"), None).unwrap();
        h.service
            .create_action(r.id, NewAction::publish(EntryRef::new(1, ARTICLE)))
            .unwrap();
        h.service.delete(r.id).unwrap();
        assert!(h.db.read(|tx| tx.all_actions()).unwrap().is_empty());
        assert!(matches!(
            h.service.find_one(r.id),
            Err(CadenceError::NotFound(_))
        ));

        let done = h.service.create(NewRelease::named("b"), None).unwrap();
        h.service
            .create_action(done.id, NewAction::publish(EntryRef::new(2, ARTICLE)))
            .unwrap();
        h.service.publish(done.id).unwrap();
        assert!(h.service.delete(done.id).unwrap_err().is_validation());
    }

    #[tokio::test]
    async fn schedule_lifecycle_follows_updates() {
        let h = harness();
        let at = Utc::now() + Duration::hours(2);
        let r = h
            .service
            .create(NewRelease::named("Spring").scheduled(at, "Europe/Paris"), None)
            .unwrap();
        assert_eq!(h.service.scheduler().jobs().get(&r.id), Some(&at));

        let later = at + Duration::hours(1);
        h.service
            .update(r.id, NewRelease::named("Spring").scheduled(later, "Europe/Paris"), None)
            .unwrap();
        assert_eq!(h.service.scheduler().jobs().get(&r.id), Some(&later));

        h.service
            .update(r.id, NewRelease::named("Spring"), None)
            .unwrap();
        assert!(h.service.scheduler().jobs().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn scheduled_release_publishes_when_due() {
        let h = harness();
        let at = Utc::now() + Duration::milliseconds(150);
        let r = h
            .service
            .create(NewRelease::named("Timed").scheduled(at, "UTC"), None)
            .unwrap();
        h.service
            .create_action(r.id, NewAction::publish(EntryRef::new(1, ARTICLE)))
            .unwrap();
        assert!(h.service.scheduler().jobs().contains_key(&r.id));

        tokio::time::sleep(std::time::Duration::from_millis(600)).await;

        let released = h.service.find_one(r.id).unwrap();
        assert_eq!(released.status, ReleaseStatus::Done);
        assert!(released.released_at.is_some());
        assert!(h.service.scheduler().jobs().is_empty());
        let entry = h.content.find_one(ARTICLE, 1).unwrap().unwrap();
        assert!(entry.published_at.is_some());
    }

    #[tokio::test]
    async fn delete_cancels_schedule() {
        let h = harness();
        let at = Utc::now() + Duration::hours(2);
        let r = h
            .service
            .create(NewRelease::named("x").scheduled(at, "UTC"), None)
            .unwrap();
        h.service.delete(r.id).unwrap();
        assert!(h.service.scheduler().jobs().is_empty());
    }
}
