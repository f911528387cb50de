use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::content::{ContentType, ContentTypeRegistry};
use crate::db::ReleaseQuery;
use crate::error::{CadenceError, Result};
use crate::release::NewAction;
use crate::types::ReleaseId;

/// Business rules checked before any release or action is written.
///
/// Every check reads through the caller's transaction, so a rule and the write
/// it guards see the same state.
#[derive(Clone)]
pub struct ReleaseValidator {
    max_pending_releases: usize,
    registry: Arc<ContentTypeRegistry>,
}

impl ReleaseValidator {
    pub fn new(max_pending_releases: usize, registry: Arc<ContentTypeRegistry>) -> Self {
        Self {
            max_pending_releases,
            registry,
        }
    }

    pub fn max_pending_releases(&self) -> usize {
        self.max_pending_releases
    }

    pub fn pending_releases_limit(&self, tx: &impl ReleaseQuery) -> Result<()> {
        let pending = tx.pending_releases()?.len();
        if pending >= self.max_pending_releases {
            return Err(CadenceError::Validation(
                "You have reached the maximum number of pending releases".into(),
            ));
        }
        Ok(())
    }

    /// No other pending release may carry `name`. Released ones may.
    pub fn unique_name_for_pending_release(
        &self,
        tx: &impl ReleaseQuery,
        name: &str,
        exclude: Option<ReleaseId>,
    ) -> Result<()> {
        let name = name.trim();
        let clash = tx
            .pending_releases()?
            .into_iter()
            .any(|r| r.name == name && Some(r.id) != exclude);
        if clash {
            return Err(CadenceError::Validation(format!(
                "Release with name {name} already exists"
            )));
        }
        Ok(())
    }

    pub fn scheduled_at_is_later_than_now(&self, scheduled_at: Option<DateTime<Utc>>) -> Result<()> {
        match scheduled_at {
            Some(at) if at <= Utc::now() => Err(CadenceError::Validation(
                "Scheduled at must be later than now".into(),
            )),
            _ => Ok(()),
        }
    }

    pub fn entry_content_type(&self, uid: &str) -> Result<&ContentType> {
        let content_type = self
            .registry
            .get(uid)
            .ok_or_else(|| CadenceError::NotFound(format!("No content type found for uid {uid}")))?;
        if !content_type.draft_and_publish {
            return Err(CadenceError::Validation(format!(
                "Content type with uid {uid} does not have draftAndPublish enabled"
            )));
        }
        Ok(content_type)
    }

    /// Fails with `AlreadyOnRelease` when the release already holds an action
    /// for the same entry id and content type.
    pub fn unique_entry(
        &self,
        tx: &impl ReleaseQuery,
        release_id: ReleaseId,
        action: &NewAction,
    ) -> Result<()> {
        tx.require_release(release_id)?;
        let taken = tx
            .actions_for(release_id)?
            .iter()
            .any(|existing| existing.entry.same_entry(&action.entry));
        if taken {
            return Err(CadenceError::AlreadyOnRelease {
                entry_id: action.entry.id,
                content_type: action.entry.content_type.clone(),
                release_id,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::ContentKind;
    use crate::db::ReleaseDb;
    use crate::release::{NewRelease, Release, ReleaseAction};
    use crate::types::{ActionType, EntryRef};
    use chrono::Duration;

    const ARTICLE: &str = "api::article.article";

    fn registry() -> Arc<ContentTypeRegistry> {
        let ct = |uid: &str, dp: bool| ContentType {
            uid: uid.into(),
            kind: ContentKind::Collection,
            draft_and_publish: dp,
            localized: false,
            display_name: String::new(),
            main_field: None,
            attributes: Vec::new(),
        };
        Arc::new(ContentTypeRegistry::new([
            ct(ARTICLE, true),
            ct("api::tag.tag", false),
        ]))
    }

    fn seeded(names: &[&str]) -> ReleaseDb {
        let db = ReleaseDb::in_memory().unwrap();
        db.write(|tx| {
            for name in names {
                let id = tx.next_release_id()?;
                tx.put_release(&Release::new(id, NewRelease::named(*name), None))?;
            }
            Ok(())
        })
        .unwrap();
        db
    }

    #[test]
    fn pending_limit_counts_only_unreleased() {
        let v = ReleaseValidator::new(2, registry());
        let db = seeded(&["a", "b"]);
        let err = db.read(|tx| v.pending_releases_limit(tx)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "You have reached the maximum number of pending releases"
        );

        db.write(|tx| {
            let mut r = tx.require_release(1)?;
            r.mark_done();
            tx.put_release(&r)
        })
        .unwrap();
        db.read(|tx| v.pending_releases_limit(tx)).unwrap();
    }

    #[test]
    fn duplicate_pending_name_rejected_unless_excluded() {
        let v = ReleaseValidator::new(3, registry());
        let db = seeded(&["Spring Launch"]);
        let err = db
            .read(|tx| v.unique_name_for_pending_release(tx, "Spring Launch", None))
            .unwrap_err();
        assert_eq!(err.to_string(), "Release with name Spring Launch already exists");
        db.read(|tx| v.unique_name_for_pending_release(tx, "Spring Launch", Some(1)))
            .unwrap();
    }

    #[test]
    fn schedule_must_be_in_the_future() {
        let v = ReleaseValidator::new(3, registry());
        assert!(v
            .scheduled_at_is_later_than_now(Some(Utc::now() - Duration::minutes(1)))
            .is_err());
        v.scheduled_at_is_later_than_now(Some(Utc::now() + Duration::hours(1)))
            .unwrap();
        v.scheduled_at_is_later_than_now(None).unwrap();
    }

    #[test]
    fn content_type_must_exist_and_support_draft_publish() {
        let v = ReleaseValidator::new(3, registry());
        assert!(v.entry_content_type(ARTICLE).is_ok());
        assert!(matches!(
            v.entry_content_type("api::nope.nope"),
            Err(CadenceError::NotFound(_))
        ));
        let err = v.entry_content_type("api::tag.tag").unwrap_err();
        assert!(err.to_string().contains("does not have draftAndPublish enabled"));
    }

    #[test]
    fn unique_entry_detects_same_entry_and_type() {
        let v = ReleaseValidator::new(3, registry());
        let db = seeded(&["a"]);
        db.write(|tx| {
            let now = Utc::now();
            let id = tx.next_action_id()?;
            tx.put_action(&ReleaseAction {
                id,
                release_id: 1,
                action_type: ActionType::Publish,
                content_type: ARTICLE.into(),
                entry: EntryRef::new(42, ARTICLE),
                locale: None,
                is_entry_valid: Some(true),
                created_at: now,
                updated_at: now,
            })
        })
        .unwrap();

        let dup = NewAction::unpublish(EntryRef::new(42, ARTICLE));
        let err = db.read(|tx| v.unique_entry(tx, 1, &dup)).unwrap_err();
        assert!(matches!(err, CadenceError::AlreadyOnRelease { entry_id: 42, .. }));

        let other_type = NewAction::publish(EntryRef::new(42, "api::page.page"));
        db.read(|tx| v.unique_entry(tx, 1, &other_type)).unwrap();

        let missing = db.read(|tx| v.unique_entry(tx, 7, &dup)).unwrap_err();
        assert!(matches!(missing, CadenceError::NotFound(_)));
    }
}
