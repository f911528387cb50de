use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::str::FromStr;

use super::ReleaseService;
use crate::db::ReleaseQuery;
use crate::error::{CadenceError, Result};
use crate::pagination::{Pagination, PaginationMeta};
use crate::release::{ActionCounts, Release, ReleaseAction};
use crate::types::{EntryId, ReleaseId};

// ---------------------------------------------------------------------------
// Result shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct CountMeta {
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActionsMeta {
    pub meta: CountMeta,
}

/// A release with the number of actions it holds.
#[derive(Debug, Clone, Serialize)]
pub struct ReleaseSummary {
    #[serde(flatten)]
    pub release: Release,
    pub actions: ActionsMeta,
}

impl ReleaseSummary {
    pub fn new(release: Release, counts: ActionCounts) -> Self {
        Self {
            release,
            actions: ActionsMeta {
                meta: CountMeta {
                    count: counts.total,
                },
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleasePage {
    pub results: Vec<ReleaseSummary>,
    pub pagination: PaginationMeta,
    pub pending_releases_count: usize,
}

/// A pending release and its actions targeting the requested entries.
#[derive(Debug, Clone, Serialize)]
pub struct ReleaseEntryActions {
    #[serde(flatten)]
    pub release: Release,
    pub actions: Vec<ReleaseAction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReleaseRef {
    pub id: ReleaseId,
    pub name: String,
}

// ---------------------------------------------------------------------------
// Sorting
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SortField {
    Id,
    Name,
    CreatedAt,
    UpdatedAt,
    ScheduledAt,
    ReleasedAt,
}

/// `field[:asc|desc]` ordering for release lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReleaseSort {
    field: SortField,
    descending: bool,
}

impl Default for ReleaseSort {
    fn default() -> Self {
        Self {
            field: SortField::CreatedAt,
            descending: true,
        }
    }
}

impl FromStr for ReleaseSort {
    type Err = CadenceError;

    fn from_str(s: &str) -> Result<Self> {
        let (field, direction) = s.split_once(':').unwrap_or((s, "asc"));
        let field = match field {
            "id" => SortField::Id,
            "name" => SortField::Name,
            "createdAt" => SortField::CreatedAt,
            "updatedAt" => SortField::UpdatedAt,
            "scheduledAt" => SortField::ScheduledAt,
            "releasedAt" => SortField::ReleasedAt,
            other => {
                return Err(CadenceError::Validation(format!("Invalid sort field: {other}")))
            }
        };
        let descending = match direction.to_ascii_lowercase().as_str() {
            "asc" => false,
            "desc" => true,
            other => {
                return Err(CadenceError::Validation(format!(
                    "Invalid sort direction: {other}"
                )))
            }
        };
        Ok(Self { field, descending })
    }
}

impl ReleaseSort {
    fn compare(&self, a: &Release, b: &Release) -> Ordering {
        let ord = match self.field {
            SortField::Id => a.id.cmp(&b.id),
            SortField::Name => a.name.cmp(&b.name),
            SortField::CreatedAt => a.created_at.cmp(&b.created_at),
            SortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
            SortField::ScheduledAt => a.scheduled_at.cmp(&b.scheduled_at),
            SortField::ReleasedAt => a.released_at.cmp(&b.released_at),
        }
        .then(a.id.cmp(&b.id));
        if self.descending {
            ord.reverse()
        } else {
            ord
        }
    }
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

impl ReleaseService {
    /// One page of releases. `released` filters on whether `released_at` is set.
    pub fn find_page(
        &self,
        released: Option<bool>,
        sort: ReleaseSort,
        pagination: Pagination,
    ) -> Result<ReleasePage> {
        self.db.read(|tx| {
            let all = tx.releases()?;
            let pending_releases_count = all.iter().filter(|r| r.is_pending()).count();
            let mut releases: Vec<_> = all
                .into_iter()
                .filter(|r| released.map_or(true, |want| r.is_released() == want))
                .collect();
            releases.sort_by(|a, b| sort.compare(a, b));

            let total = releases.len();
            let results = pagination
                .apply(releases)
                .into_iter()
                .map(|r| {
                    let counts = tx.action_counts(r.id)?;
                    Ok(ReleaseSummary::new(r, counts))
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(ReleasePage {
                results,
                pagination: pagination.meta(total),
                pending_releases_count,
            })
        })
    }

    pub fn find_one_with_count(&self, id: ReleaseId) -> Result<ReleaseSummary> {
        self.db.read(|tx| {
            let release = tx.require_release(id)?;
            let counts = tx.action_counts(id)?;
            Ok(ReleaseSummary::new(release, counts))
        })
    }

    /// Pending releases holding an action for any of `entry_ids`, each with
    /// only those actions.
    pub fn find_many_with_entry_attached(
        &self,
        content_type: &str,
        entry_ids: &[EntryId],
    ) -> Result<Vec<ReleaseEntryActions>> {
        self.db.read(|tx| {
            let mut out = Vec::new();
            for release in tx.pending_releases()? {
                let actions: Vec<_> = tx
                    .actions_for(release.id)?
                    .into_iter()
                    .filter(|a| a.content_type == content_type && entry_ids.contains(&a.entry.id))
                    .collect();
                if !actions.is_empty() {
                    out.push(ReleaseEntryActions { release, actions });
                }
            }
            Ok(out)
        })
    }

    /// Pending releases the entry could still be added to.
    pub fn find_many_without_entry_attached(
        &self,
        content_type: &str,
        entry_id: EntryId,
    ) -> Result<Vec<Release>> {
        self.db.read(|tx| {
            let mut out = Vec::new();
            for release in tx.pending_releases()? {
                let attached = tx
                    .actions_for(release.id)?
                    .iter()
                    .any(|a| a.content_type == content_type && a.entry.id == entry_id);
                if !attached {
                    out.push(release);
                }
            }
            Ok(out)
        })
    }

    /// For each entry id, the pending releases it appears in.
    pub fn map_entries_to_releases(
        &self,
        content_type: &str,
        entry_ids: &[EntryId],
    ) -> Result<BTreeMap<EntryId, Vec<ReleaseRef>>> {
        let mut map: BTreeMap<EntryId, Vec<ReleaseRef>> = BTreeMap::new();
        for found in self.find_many_with_entry_attached(content_type, entry_ids)? {
            for action in &found.actions {
                map.entry(action.entry.id).or_default().push(ReleaseRef {
                    id: found.release.id,
                    name: found.release.name.clone(),
                });
            }
        }
        Ok(map)
    }
}
