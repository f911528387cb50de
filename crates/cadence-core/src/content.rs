//! Content types, entries, and the content store contract.
//!
//! Releases never own content: they reference entries living in a
//! `ContentStore` and ask it to publish or unpublish them. `MemoryContentStore`
//! is the bundled implementation, seeded from `.cadence/content.yaml`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, ThreadId};
use tokio::sync::broadcast;

use crate::error::{CadenceError, Result};
use crate::types::{EntryId, EntryState};
use crate::validator::EntityValidator;

// ---------------------------------------------------------------------------
// Content types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    #[default]
    Collection,
    Single,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeKind {
    String,
    Text,
    Integer,
    Float,
    Boolean,
    Datetime,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: AttributeKind,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
}

/// Schema and capabilities of one content type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentType {
    pub uid: String,
    #[serde(default)]
    pub kind: ContentKind,
    #[serde(default)]
    pub draft_and_publish: bool,
    #[serde(default)]
    pub localized: bool,
    #[serde(default)]
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_field: Option<String>,
    #[serde(default)]
    pub attributes: Vec<Attribute>,
}

impl ContentType {
    pub fn is_collection(&self) -> bool {
        self.kind == ContentKind::Collection
    }

    pub fn display_name(&self) -> &str {
        if self.display_name.is_empty() {
            &self.uid
        } else {
            &self.display_name
        }
    }

    /// Name of the field shown as an entry's label; falls back to `id`.
    pub fn main_field(&self) -> &str {
        self.main_field.as_deref().unwrap_or("id")
    }
}

/// Resolves content-type uids to their schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentTypeRegistry {
    types: BTreeMap<String, ContentType>,
}

impl ContentTypeRegistry {
    pub fn new(types: impl IntoIterator<Item = ContentType>) -> Self {
        Self {
            types: types.into_iter().map(|t| (t.uid.clone(), t)).collect(),
        }
    }

    pub fn get(&self, uid: &str) -> Option<&ContentType> {
        self.types.get(uid)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ContentType> {
        self.types.values()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    pub id: EntryId,
    pub content_type: String,
    #[serde(default)]
    pub locale: Option<String>,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub data: serde_json::Map<String, serde_json::Value>,
}

impl Entry {
    pub fn new(id: EntryId, content_type: impl Into<String>, data: serde_json::Value) -> Self {
        let data = match data {
            serde_json::Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        Self {
            id,
            content_type: content_type.into(),
            locale: None,
            published_at: None,
            data,
        }
    }

    pub fn state(&self) -> EntryState {
        if self.published_at.is_some() {
            EntryState::Published
        } else {
            EntryState::Draft
        }
    }

    pub fn field(&self, name: &str) -> Option<&serde_json::Value> {
        if name == "id" {
            return None;
        }
        self.data.get(name)
    }

    /// Label for the entry: the main field's value, or the id.
    pub fn label(&self, main_field: &str) -> serde_json::Value {
        self.field(main_field)
            .cloned()
            .unwrap_or_else(|| serde_json::json!(self.id))
    }
}

/// Change notifications emitted by a content store after a committed write.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentEvent {
    EntryUpdated { content_type: String, entry: Entry },
    EntriesDeleted { content_type: String, ids: Vec<EntryId> },
}

// ---------------------------------------------------------------------------
// ContentStore
// ---------------------------------------------------------------------------

/// Entity layer consumed by the release workflow.
pub trait ContentStore: Send + Sync {
    fn find_one(&self, uid: &str, id: EntryId) -> Result<Option<Entry>>;

    /// Entries of `uid` whose id is in `ids`; missing ids are skipped.
    fn find_many(&self, uid: &str, ids: &[EntryId]) -> Result<Vec<Entry>>;

    /// Fails with `AlreadyInTargetState` when the entry is already published.
    fn publish(&self, uid: &str, entry: &Entry) -> Result<Entry>;

    /// Fails with `AlreadyInTargetState` when the entry is already a draft.
    fn unpublish(&self, uid: &str, entry: &Entry) -> Result<Entry>;

    /// Batched publish; entries already published are left alone. Returns the
    /// number of entries that changed state.
    fn publish_many(&self, uid: &str, entries: &[Entry]) -> Result<usize>;

    fn unpublish_many(&self, uid: &str, entries: &[Entry]) -> Result<usize>;

    /// Runs `work` atomically: every write it performs is rolled back when it
    /// returns an error. Not reentrant.
    fn transaction(&self, work: &mut dyn FnMut() -> Result<()>) -> Result<()>;

    fn subscribe(&self) -> broadcast::Receiver<ContentEvent>;
}

// ---------------------------------------------------------------------------
// MemoryContentStore
// ---------------------------------------------------------------------------

type EntryKey = (String, EntryId);

/// The open transaction. Only writes made on the thread that opened it are
/// recorded; writers on other threads apply and notify immediately.
struct OpenTx {
    owner: ThreadId,
    /// Previous values of every key written inside the transaction.
    undo: Vec<(EntryKey, Option<Entry>)>,
    /// Events held back until the transaction commits.
    deferred: Vec<ContentEvent>,
}

#[derive(Default)]
struct Inner {
    entries: BTreeMap<EntryKey, Entry>,
    tx: Option<OpenTx>,
}

impl Inner {
    fn own_tx(&mut self) -> Option<&mut OpenTx> {
        let current = thread::current().id();
        self.tx.as_mut().filter(|tx| tx.owner == current)
    }
}

#[derive(Debug, Default, Deserialize)]
struct ContentSeed {
    #[serde(default)]
    entries: Vec<Entry>,
}

pub struct MemoryContentStore {
    registry: Arc<ContentTypeRegistry>,
    validator: Arc<dyn EntityValidator>,
    inner: Mutex<Inner>,
    tx_guard: Mutex<()>,
    events: broadcast::Sender<ContentEvent>,
}

impl MemoryContentStore {
    pub fn new(registry: Arc<ContentTypeRegistry>, validator: Arc<dyn EntityValidator>) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            registry,
            validator,
            inner: Mutex::new(Inner::default()),
            tx_guard: Mutex::new(()),
            events,
        }
    }

    /// Load entries from a YAML seed file (`entries: [...]`). A missing file
    /// yields an empty store.
    pub fn load_seed(&self, path: &Path) -> Result<usize> {
        if !path.exists() {
            return Ok(0);
        }
        let data = std::fs::read_to_string(path)?;
        let seed: ContentSeed = serde_yaml::from_str(&data)?;
        let count = seed.entries.len();
        for entry in seed.entries {
            self.insert(entry);
        }
        Ok(count)
    }

    /// Insert or replace an entry without emitting a lifecycle event.
    pub fn insert(&self, entry: Entry) -> Entry {
        let mut inner = self.lock();
        let key = (entry.content_type.clone(), entry.id);
        inner.entries.insert(key, entry.clone());
        entry
    }

    /// Replace an entry's data and notify subscribers.
    pub fn update_entry(
        &self,
        uid: &str,
        id: EntryId,
        data: serde_json::Map<String, serde_json::Value>,
    ) -> Result<Entry> {
        let mut inner = self.lock();
        let key = (uid.to_string(), id);
        let mut entry = inner
            .entries
            .get(&key)
            .cloned()
            .ok_or_else(|| entry_not_found(uid, id))?;
        entry.data = data;
        write(&mut inner, key, Some(entry.clone()));
        self.notify(
            &mut inner,
            ContentEvent::EntryUpdated {
                content_type: uid.to_string(),
                entry: entry.clone(),
            },
        );
        Ok(entry)
    }

    /// Delete entries and notify subscribers. Returns how many existed.
    pub fn delete_entries(&self, uid: &str, ids: &[EntryId]) -> usize {
        let mut inner = self.lock();
        let mut deleted = Vec::new();
        for id in ids {
            let key = (uid.to_string(), *id);
            if inner.entries.contains_key(&key) {
                write(&mut inner, key, None);
                deleted.push(*id);
            }
        }
        let count = deleted.len();
        if count > 0 {
            self.notify(
                &mut inner,
                ContentEvent::EntriesDeleted {
                    content_type: uid.to_string(),
                    ids: deleted,
                },
            );
        }
        count
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn notify(&self, inner: &mut Inner, event: ContentEvent) {
        match inner.own_tx() {
            Some(tx) => tx.deferred.push(event),
            None => {
                let _ = self.events.send(event);
            }
        }
    }

    fn transition(&self, uid: &str, entry: &Entry, target: EntryState) -> Result<Entry> {
        let mut inner = self.lock();
        let key = (uid.to_string(), entry.id);
        let mut current = inner
            .entries
            .get(&key)
            .cloned()
            .ok_or_else(|| entry_not_found(uid, entry.id))?;
        if current.state() == target {
            return Err(CadenceError::AlreadyInTargetState {
                content_type: uid.to_string(),
                entry_id: entry.id,
                state: target,
            });
        }
        match target {
            EntryState::Published => {
                let content_type = self.registry.get(uid).ok_or_else(|| {
                    CadenceError::NotFound(format!("No content type found for uid {uid}"))
                })?;
                self.validator.validate(content_type, &current)?;
                current.published_at = Some(Utc::now());
            }
            EntryState::Draft => current.published_at = None,
        }
        write(&mut inner, key, Some(current.clone()));
        self.notify(
            &mut inner,
            ContentEvent::EntryUpdated {
                content_type: uid.to_string(),
                entry: current.clone(),
            },
        );
        Ok(current)
    }

    fn transition_many(&self, uid: &str, entries: &[Entry], target: EntryState) -> Result<usize> {
        let mut changed = 0;
        for entry in entries {
            match self.transition(uid, entry, target) {
                Ok(_) => changed += 1,
                Err(CadenceError::AlreadyInTargetState { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(changed)
    }

    fn rollback(&self) {
        let mut inner = self.lock();
        if let Some(tx) = inner.tx.take() {
            for (key, previous) in tx.undo.into_iter().rev() {
                match previous {
                    Some(entry) => {
                        inner.entries.insert(key, entry);
                    }
                    None => {
                        inner.entries.remove(&key);
                    }
                }
            }
        }
    }

    fn commit(&self) {
        let mut inner = self.lock();
        if let Some(tx) = inner.tx.take() {
            for event in tx.deferred {
                let _ = self.events.send(event);
            }
        }
    }
}

fn write(inner: &mut Inner, key: EntryKey, value: Option<Entry>) {
    let previous = match value {
        Some(entry) => inner.entries.insert(key.clone(), entry),
        None => inner.entries.remove(&key),
    };
    if let Some(tx) = inner.own_tx() {
        tx.undo.push((key, previous));
    }
}

fn entry_not_found(uid: &str, id: EntryId) -> CadenceError {
    CadenceError::NotFound(format!("No entry found for id {id} in {uid}"))
}

impl ContentStore for MemoryContentStore {
    fn find_one(&self, uid: &str, id: EntryId) -> Result<Option<Entry>> {
        Ok(self.lock().entries.get(&(uid.to_string(), id)).cloned())
    }

    fn find_many(&self, uid: &str, ids: &[EntryId]) -> Result<Vec<Entry>> {
        let inner = self.lock();
        Ok(ids
            .iter()
            .filter_map(|id| inner.entries.get(&(uid.to_string(), *id)).cloned())
            .collect())
    }

    fn publish(&self, uid: &str, entry: &Entry) -> Result<Entry> {
        self.transition(uid, entry, EntryState::Published)
    }

    fn unpublish(&self, uid: &str, entry: &Entry) -> Result<Entry> {
        self.transition(uid, entry, EntryState::Draft)
    }

    fn publish_many(&self, uid: &str, entries: &[Entry]) -> Result<usize> {
        self.transition_many(uid, entries, EntryState::Published)
    }

    fn unpublish_many(&self, uid: &str, entries: &[Entry]) -> Result<usize> {
        self.transition_many(uid, entries, EntryState::Draft)
    }

    fn transaction(&self, work: &mut dyn FnMut() -> Result<()>) -> Result<()> {
        let _guard = self
            .tx_guard
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        self.lock().tx = Some(OpenTx {
            owner: thread::current().id(),
            undo: Vec::new(),
            deferred: Vec::new(),
        });
        match work() {
            Ok(()) => {
                self.commit();
                Ok(())
            }
            Err(e) => {
                self.rollback();
                Err(e)
            }
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<ContentEvent> {
        self.events.subscribe()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validator::SchemaValidator;
    use tempfile::TempDir;

    const ARTICLE: &str = "api::article.article";

    fn registry() -> Arc<ContentTypeRegistry> {
        Arc::new(ContentTypeRegistry::new([ContentType {
            uid: ARTICLE.into(),
            kind: ContentKind::Collection,
            draft_and_publish: true,
            localized: false,
            display_name: "Article".into(),
            main_field: Some("title".into()),
            attributes: vec![Attribute {
                name: "title".into(),
                kind: AttributeKind::String,
                required: true,
                max_length: None,
            }],
        }]))
    }

    fn store() -> MemoryContentStore {
        let store = MemoryContentStore::new(registry(), Arc::new(SchemaValidator));
        store.insert(Entry::new(1, ARTICLE, serde_json::json!({ "title": "Hello" })));
        store.insert(Entry::new(2, ARTICLE, serde_json::json!({})));
        store
    }

    #[test]
    fn publish_twice_reports_target_state() {
        let store = store();
        let entry = store.find_one(ARTICLE, 1).unwrap().unwrap();
        let published = store.publish(ARTICLE, &entry).unwrap();
        assert_eq!(published.state(), EntryState::Published);

        let err = store.publish(ARTICLE, &published).unwrap_err();
        assert!(matches!(
            err,
            CadenceError::AlreadyInTargetState {
                state: EntryState::Published,
                ..
            }
        ));
    }

    #[test]
    fn publishing_invalid_entry_fails_validation() {
        let store = store();
        let entry = store.find_one(ARTICLE, 2).unwrap().unwrap();
        let err = store.publish(ARTICLE, &entry).unwrap_err();
        assert!(err.is_validation(), "got {err:?}");
    }

    #[test]
    fn publish_many_skips_already_published() {
        let store = store();
        let first = store.find_one(ARTICLE, 1).unwrap().unwrap();
        store.publish(ARTICLE, &first).unwrap();

        let entries = store.find_many(ARTICLE, &[1, 99]).unwrap();
        assert_eq!(entries.len(), 1, "missing ids are skipped");
        assert_eq!(store.publish_many(ARTICLE, &entries).unwrap(), 0);
    }

    #[test]
    fn failed_transaction_rolls_back_writes() {
        let store = store();
        let mut work = || {
            let first = store.find_one(ARTICLE, 1)?.unwrap();
            store.publish(ARTICLE, &first)?;
            let second = store.find_one(ARTICLE, 2)?.unwrap();
            store.publish(ARTICLE, &second)?;
            Ok(())
        };
        assert!(store.transaction(&mut work).is_err());

        let first = store.find_one(ARTICLE, 1).unwrap().unwrap();
        assert_eq!(first.state(), EntryState::Draft);
    }

    #[test]
    fn events_are_deferred_until_commit() {
        let store = store();
        let mut rx = store.subscribe();
        let mut failing = || {
            let first = store.find_one(ARTICLE, 1)?.unwrap();
            store.publish(ARTICLE, &first)?;
            Err(CadenceError::Validation("boom".into()))
        };
        assert!(store.transaction(&mut failing).is_err());
        assert!(rx.try_recv().is_err(), "rolled back writes must not notify");

        let mut ok = || {
            let first = store.find_one(ARTICLE, 1)?.unwrap();
            store.publish(ARTICLE, &first).map(|_| ())
        };
        store.transaction(&mut ok).unwrap();
        match rx.try_recv().unwrap() {
            ContentEvent::EntryUpdated { entry, .. } => assert_eq!(entry.id, 1),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn rollback_keeps_writes_from_other_threads() {
        use std::sync::mpsc;

        let store = Arc::new(store());
        let mut rx = store.subscribe();
        let (opened_tx, opened_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();

        let worker = {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                let mut work = || {
                    let first = store.find_one(ARTICLE, 1)?.unwrap();
                    store.publish(ARTICLE, &first)?;
                    opened_tx.send(()).unwrap();
                    release_rx.recv().unwrap();
                    Err(CadenceError::Validation("boom".into()))
                };
                store.transaction(&mut work)
            })
        };

        opened_rx.recv().unwrap();
        let mut data = serde_json::Map::new();
        data.insert("title".into(), serde_json::json!("new"));
        store.update_entry(ARTICLE, 2, data).unwrap();
        release_tx.send(()).unwrap();
        assert!(worker.join().unwrap().is_err());

        let second = store.find_one(ARTICLE, 2).unwrap().unwrap();
        assert_eq!(second.label("title"), serde_json::json!("new"));
        let first = store.find_one(ARTICLE, 1).unwrap().unwrap();
        assert_eq!(first.state(), EntryState::Draft);
        match rx.try_recv().unwrap() {
            ContentEvent::EntryUpdated { entry, .. } => assert_eq!(entry.id, 2),
            other => panic!("unexpected event {other:?}"),
        }
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn delete_entries_notifies_existing_ids_only() {
        let store = store();
        let mut rx = store.subscribe();
        assert_eq!(store.delete_entries(ARTICLE, &[2, 3]), 1);
        assert_eq!(
            rx.try_recv().unwrap(),
            ContentEvent::EntriesDeleted {
                content_type: ARTICLE.into(),
                ids: vec![2],
            }
        );
    }

    #[test]
    fn seed_file_loads_entries() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("content.yaml");
        std::fs::write(
            &path,
            "entries:\n  - id: 7\n    contentType: api::article.article\n    data:\n      title: Seeded\n",
        )
        .unwrap();
        let store = MemoryContentStore::new(registry(), Arc::new(SchemaValidator));
        assert_eq!(store.load_seed(&path).unwrap(), 1);
        let entry = store.find_one(ARTICLE, 7).unwrap().unwrap();
        assert_eq!(entry.label("title"), serde_json::json!("Seeded"));
    }

    #[test]
    fn missing_seed_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = MemoryContentStore::new(registry(), Arc::new(SchemaValidator));
        assert_eq!(store.load_seed(&dir.path().join("nope.yaml")).unwrap(), 0);
        assert!(store.is_empty());
    }
}
