//! Persistent storage for releases and their actions using redb.
//!
//! # Table design
//!
//! ```text
//! releases            u64 release id            -> JSON Release
//! actions             u64 action id             -> JSON ReleaseAction
//! actions_by_release  (release_id, action_id)   -> ()
//! sequences           &str sequence name        -> u64 last issued id
//! snapshots           &str snapshot name        -> JSON blob
//! ```
//!
//! The composite `(release_id, action_id)` key makes "all actions of a
//! release" a single range scan. Every mutation goes through `ReleaseDb::write`,
//! which runs a closure inside one write transaction: redb admits a single
//! writer at a time, so a closure observes and mutates a release without any
//! other writer interleaving.

use std::path::Path;

use redb::{Database, ReadableTable, TableDefinition};

use crate::error::{db_err, CadenceError, Result};
use crate::release::{ActionCounts, Release, ReleaseAction};
use crate::types::{ActionId, ReleaseId};

// ---------------------------------------------------------------------------
// Table definitions
// ---------------------------------------------------------------------------

const RELEASES: TableDefinition<u64, &[u8]> = TableDefinition::new("releases");
const ACTIONS: TableDefinition<u64, &[u8]> = TableDefinition::new("actions");
const ACTIONS_BY_RELEASE: TableDefinition<(u64, u64), ()> =
    TableDefinition::new("actions_by_release");
const SEQUENCES: TableDefinition<&str, u64> = TableDefinition::new("sequences");
const SNAPSHOTS: TableDefinition<&str, &[u8]> = TableDefinition::new("snapshots");

const RELEASE_SEQ: &str = "release";
const ACTION_SEQ: &str = "action";

// ---------------------------------------------------------------------------
// Table readers shared by read and write transactions
// ---------------------------------------------------------------------------

fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(db_err)
}

fn get_json<T, Tbl>(table: &Tbl, id: u64) -> Result<Option<T>>
where
    T: serde::de::DeserializeOwned,
    Tbl: ReadableTable<u64, &'static [u8]>,
{
    match table.get(id).map_err(db_err)? {
        Some(guard) => Ok(Some(decode(guard.value())?)),
        None => Ok(None),
    }
}

fn all_json<T, Tbl>(table: &Tbl) -> Result<Vec<T>>
where
    T: serde::de::DeserializeOwned,
    Tbl: ReadableTable<u64, &'static [u8]>,
{
    let mut out = Vec::new();
    for row in table.iter().map_err(db_err)? {
        let (_, v) = row.map_err(db_err)?;
        out.push(decode(v.value())?);
    }
    Ok(out)
}

fn action_ids<Tbl>(index: &Tbl, release_id: ReleaseId) -> Result<Vec<ActionId>>
where
    Tbl: ReadableTable<(u64, u64), ()>,
{
    let mut ids = Vec::new();
    for row in index
        .range((release_id, 0)..=(release_id, u64::MAX))
        .map_err(db_err)?
    {
        let (k, _) = row.map_err(db_err)?;
        ids.push(k.value().1);
    }
    Ok(ids)
}

fn snapshot_bytes<Tbl>(table: &Tbl, key: &str) -> Result<Option<Vec<u8>>>
where
    Tbl: ReadableTable<&'static str, &'static [u8]>,
{
    Ok(table.get(key).map_err(db_err)?.map(|g| g.value().to_vec()))
}

// ---------------------------------------------------------------------------
// ReleaseQuery
// ---------------------------------------------------------------------------

/// Read access available inside both read and write transactions.
pub trait ReleaseQuery {
    fn release(&self, id: ReleaseId) -> Result<Option<Release>>;

    /// All releases in id order.
    fn releases(&self) -> Result<Vec<Release>>;

    fn action(&self, id: ActionId) -> Result<Option<ReleaseAction>>;

    /// Actions of one release in id order.
    fn actions_for(&self, release_id: ReleaseId) -> Result<Vec<ReleaseAction>>;

    fn all_actions(&self) -> Result<Vec<ReleaseAction>>;

    fn snapshot(&self, key: &str) -> Result<Option<Vec<u8>>>;

    fn require_release(&self, id: ReleaseId) -> Result<Release> {
        self.release(id)?
            .ok_or_else(|| CadenceError::release_not_found(id))
    }

    fn pending_releases(&self) -> Result<Vec<Release>> {
        Ok(self
            .releases()?
            .into_iter()
            .filter(Release::is_pending)
            .collect())
    }

    fn action_counts(&self, release_id: ReleaseId) -> Result<ActionCounts> {
        Ok(ActionCounts::tally(&self.actions_for(release_id)?))
    }
}

macro_rules! impl_release_query {
    ($ty:ty) => {
        impl ReleaseQuery for $ty {
            fn release(&self, id: ReleaseId) -> Result<Option<Release>> {
                let table = self.tx.open_table(RELEASES).map_err(db_err)?;
                get_json(&table, id)
            }

            fn releases(&self) -> Result<Vec<Release>> {
                let table = self.tx.open_table(RELEASES).map_err(db_err)?;
                all_json(&table)
            }

            fn action(&self, id: ActionId) -> Result<Option<ReleaseAction>> {
                let table = self.tx.open_table(ACTIONS).map_err(db_err)?;
                get_json(&table, id)
            }

            fn actions_for(&self, release_id: ReleaseId) -> Result<Vec<ReleaseAction>> {
                let ids = {
                    let index = self.tx.open_table(ACTIONS_BY_RELEASE).map_err(db_err)?;
                    action_ids(&index, release_id)?
                };
                let table = self.tx.open_table(ACTIONS).map_err(db_err)?;
                let mut out = Vec::with_capacity(ids.len());
                for id in ids {
                    if let Some(action) = get_json(&table, id)? {
                        out.push(action);
                    }
                }
                Ok(out)
            }

            fn all_actions(&self) -> Result<Vec<ReleaseAction>> {
                let table = self.tx.open_table(ACTIONS).map_err(db_err)?;
                all_json(&table)
            }

            fn snapshot(&self, key: &str) -> Result<Option<Vec<u8>>> {
                let table = self.tx.open_table(SNAPSHOTS).map_err(db_err)?;
                snapshot_bytes(&table, key)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Transactions
// ---------------------------------------------------------------------------

pub struct ReadTx {
    tx: redb::ReadTransaction,
}

pub struct WriteTx {
    tx: redb::WriteTransaction,
}

impl_release_query!(ReadTx);
impl_release_query!(WriteTx);

impl WriteTx {
    fn next_id(&mut self, sequence: &str) -> Result<u64> {
        let mut table = self.tx.open_table(SEQUENCES).map_err(db_err)?;
        let current = table.get(sequence).map_err(db_err)?.map(|g| g.value());
        let next = current.unwrap_or(0) + 1;
        table.insert(sequence, next).map_err(db_err)?;
        Ok(next)
    }

    pub fn next_release_id(&mut self) -> Result<ReleaseId> {
        self.next_id(RELEASE_SEQ)
    }

    pub fn next_action_id(&mut self) -> Result<ActionId> {
        self.next_id(ACTION_SEQ)
    }

    pub fn put_release(&mut self, release: &Release) -> Result<()> {
        let value = serde_json::to_vec(release).map_err(db_err)?;
        let mut table = self.tx.open_table(RELEASES).map_err(db_err)?;
        table.insert(release.id, value.as_slice()).map_err(db_err)?;
        Ok(())
    }

    /// Remove a release together with all of its actions.
    pub fn remove_release(&mut self, id: ReleaseId) -> Result<()> {
        for action in self.actions_for(id)? {
            self.remove_action(&action)?;
        }
        let mut table = self.tx.open_table(RELEASES).map_err(db_err)?;
        table.remove(id).map_err(db_err)?;
        Ok(())
    }

    pub fn put_action(&mut self, action: &ReleaseAction) -> Result<()> {
        let value = serde_json::to_vec(action).map_err(db_err)?;
        {
            let mut table = self.tx.open_table(ACTIONS).map_err(db_err)?;
            table.insert(action.id, value.as_slice()).map_err(db_err)?;
        }
        let mut index = self.tx.open_table(ACTIONS_BY_RELEASE).map_err(db_err)?;
        index
            .insert((action.release_id, action.id), ())
            .map_err(db_err)?;
        Ok(())
    }

    pub fn remove_action(&mut self, action: &ReleaseAction) -> Result<()> {
        {
            let mut table = self.tx.open_table(ACTIONS).map_err(db_err)?;
            table.remove(action.id).map_err(db_err)?;
        }
        let mut index = self.tx.open_table(ACTIONS_BY_RELEASE).map_err(db_err)?;
        index
            .remove((action.release_id, action.id))
            .map_err(db_err)?;
        Ok(())
    }

    pub fn put_snapshot(&mut self, key: &str, bytes: &[u8]) -> Result<()> {
        let mut table = self.tx.open_table(SNAPSHOTS).map_err(db_err)?;
        table.insert(key, bytes).map_err(db_err)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ReleaseDb
// ---------------------------------------------------------------------------

/// Persistent store for `Release` and `ReleaseAction` records.
pub struct ReleaseDb {
    db: Database,
}

impl ReleaseDb {
    /// Open or create the redb database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path).map_err(db_err)?;
        Self::init(db)
    }

    /// A database that lives only as long as the returned value.
    pub fn in_memory() -> Result<Self> {
        let db = Database::builder()
            .create_with_backend(redb::backends::InMemoryBackend::new())
            .map_err(db_err)?;
        Self::init(db)
    }

    fn init(db: Database) -> Result<Self> {
        // Ensure every table exists before any reads
        let wt = db.begin_write().map_err(db_err)?;
        wt.open_table(RELEASES).map_err(db_err)?;
        wt.open_table(ACTIONS).map_err(db_err)?;
        wt.open_table(ACTIONS_BY_RELEASE).map_err(db_err)?;
        wt.open_table(SEQUENCES).map_err(db_err)?;
        wt.open_table(SNAPSHOTS).map_err(db_err)?;
        wt.commit().map_err(db_err)?;
        Ok(Self { db })
    }

    pub fn read<T>(&self, f: impl FnOnce(&ReadTx) -> Result<T>) -> Result<T> {
        let tx = ReadTx {
            tx: self.db.begin_read().map_err(db_err)?,
        };
        f(&tx)
    }

    /// Run `f` in a write transaction. Commits when `f` returns `Ok`, aborts
    /// otherwise. Must not be called from inside another `write` closure.
    pub fn write<T>(&self, f: impl FnOnce(&mut WriteTx) -> Result<T>) -> Result<T> {
        let mut tx = WriteTx {
            tx: self.db.begin_write().map_err(db_err)?,
        };
        match f(&mut tx) {
            Ok(value) => {
                tx.tx.commit().map_err(db_err)?;
                Ok(value)
            }
            Err(e) => {
                if let Err(abort) = tx.tx.abort() {
                    tracing::warn!(error = %abort, "failed to abort write transaction");
                }
                Err(e)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::release::NewRelease;
    use crate::types::{ActionType, EntryRef};
    use chrono::Utc;
    use tempfile::TempDir;

    fn open_tmp() -> (TempDir, ReleaseDb) {
        let dir = TempDir::new().unwrap();
        let db = ReleaseDb::open(&dir.path().join("test.redb")).unwrap();
        (dir, db)
    }

    fn add_release(db: &ReleaseDb, name: &str) -> Release {
        db.write(|tx| {
            let id = tx.next_release_id()?;
            let release = Release::new(id, NewRelease::named(name), None);
            tx.put_release(&release)?;
            Ok(release)
        })
        .unwrap()
    }

    fn add_action(db: &ReleaseDb, release_id: ReleaseId, entry_id: u64) -> ReleaseAction {
        db.write(|tx| {
            let now = Utc::now();
            let action = ReleaseAction {
                id: tx.next_action_id()?,
                release_id,
                action_type: ActionType::Publish,
                content_type: "api::article.article".into(),
                entry: EntryRef::new(entry_id, "api::article.article"),
                locale: None,
                is_entry_valid: Some(true),
                created_at: now,
                updated_at: now,
            };
            tx.put_action(&action)?;
            Ok(action)
        })
        .unwrap()
    }

    #[test]
    fn ids_are_sequential_per_table() {
        let (_dir, db) = open_tmp();
        let a = add_release(&db, "a");
        let b = add_release(&db, "b");
        assert_eq!((a.id, b.id), (1, 2));
        assert_eq!(add_action(&db, a.id, 10).id, 1);
    }

    #[test]
    fn actions_for_scans_only_that_release() {
        let (_dir, db) = open_tmp();
        let a = add_release(&db, "a");
        let b = add_release(&db, "b");
        add_action(&db, a.id, 1);
        add_action(&db, b.id, 2);
        add_action(&db, a.id, 3);

        let actions = db.read(|tx| tx.actions_for(a.id)).unwrap();
        let entries: Vec<_> = actions.iter().map(|x| x.entry.id).collect();
        assert_eq!(entries, vec![1, 3]);
        assert_eq!(db.read(|tx| tx.action_counts(a.id)).unwrap().total, 2);
    }

    #[test]
    fn remove_release_cascades_to_actions() {
        let (_dir, db) = open_tmp();
        let a = add_release(&db, "a");
        add_action(&db, a.id, 1);
        db.write(|tx| tx.remove_release(a.id)).unwrap();

        assert!(db.read(|tx| tx.release(a.id)).unwrap().is_none());
        assert!(db.read(|tx| tx.all_actions()).unwrap().is_empty());
    }

    #[test]
    fn failed_closure_rolls_back() {
        let (_dir, db) = open_tmp();
        let err = db
            .write(|tx| {
                let id = tx.next_release_id()?;
                tx.put_release(&Release::new(id, NewRelease::named("ghost"), None))?;
                Err::<(), _>(CadenceError::Validation("nope".into()))
            })
            .unwrap_err();
        assert!(err.is_validation());
        assert!(db.read(|tx| tx.releases()).unwrap().is_empty());
        // The sequence bump was rolled back too
        assert_eq!(add_release(&db, "real").id, 1);
    }

    #[test]
    fn require_release_reports_not_found() {
        let db = ReleaseDb::in_memory().unwrap();
        let err = db.read(|tx| tx.require_release(9)).unwrap_err();
        assert_eq!(err.to_string(), "No release found for id 9");
    }

    #[test]
    fn data_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.redb");
        {
            let db = ReleaseDb::open(&path).unwrap();
            add_release(&db, "persisted");
            db.write(|tx| tx.put_snapshot("content_types", b"{}")).unwrap();
        }
        let db = ReleaseDb::open(&path).unwrap();
        let releases = db.read(|tx| tx.releases()).unwrap();
        assert_eq!(releases[0].name, "persisted");
        assert_eq!(
            db.read(|tx| tx.snapshot("content_types")).unwrap(),
            Some(b"{}".to_vec())
        );
    }
}
