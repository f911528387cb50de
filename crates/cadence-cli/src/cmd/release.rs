use crate::cmd::{open, parse_datetime};
use crate::output::{fmt_time, print_fields, print_json, print_table};
use cadence_core::pagination::{PageQuery, Pagination};
use cadence_core::release::{NewRelease, ReleaseUpdate};
use cadence_core::service::ReleaseSort;
use cadence_core::types::ReleaseId;
use chrono::{DateTime, Utc};
use clap::Subcommand;
use std::path::Path;

// ---------------------------------------------------------------------------
// Subcommand types
// ---------------------------------------------------------------------------

#[derive(Subcommand)]
pub enum ReleaseSubcommand {
    /// List releases
    List {
        /// Only pending (`false`) or only released (`true`) releases
        #[arg(long)]
        released: Option<bool>,
        /// Sort as `field[:asc|desc]`
        #[arg(long)]
        sort: Option<String>,
        #[arg(long)]
        page: Option<u64>,
        #[arg(long)]
        page_size: Option<u64>,
    },

    /// Show one release with its action counts
    Show { id: ReleaseId },

    /// Create a pending release
    Create {
        name: String,
        /// Publish automatically at this RFC 3339 time
        #[arg(long, value_parser = parse_datetime, requires = "timezone")]
        scheduled_at: Option<DateTime<Utc>>,
        /// IANA timezone the schedule was chosen in
        #[arg(long)]
        timezone: Option<String>,
    },

    /// Rename or reschedule a pending release
    Update {
        id: ReleaseId,
        #[arg(long)]
        name: Option<String>,
        #[arg(long, value_parser = parse_datetime, conflicts_with = "unschedule")]
        scheduled_at: Option<DateTime<Utc>>,
        #[arg(long)]
        timezone: Option<String>,
        /// Drop the schedule
        #[arg(long)]
        unschedule: bool,
    },

    /// Delete a pending release and its actions
    Delete { id: ReleaseId },

    /// Publish a release now
    Publish { id: ReleaseId },
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn run(root: &Path, subcmd: ReleaseSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        ReleaseSubcommand::List {
            released,
            sort,
            page,
            page_size,
        } => list(root, released, sort.as_deref(), page, page_size, json),
        ReleaseSubcommand::Show { id } => show(root, id, json),
        ReleaseSubcommand::Create {
            name,
            scheduled_at,
            timezone,
        } => {
            let data = NewRelease {
                name,
                scheduled_at,
                timezone,
            };
            create(root, data, json)
        }
        ReleaseSubcommand::Update {
            id,
            name,
            scheduled_at,
            timezone,
            unschedule,
        } => update(root, id, name, scheduled_at, timezone, unschedule, json),
        ReleaseSubcommand::Delete { id } => delete(root, id, json),
        ReleaseSubcommand::Publish { id } => publish(root, id, json),
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

fn list(
    root: &Path,
    released: Option<bool>,
    sort: Option<&str>,
    page: Option<u64>,
    page_size: Option<u64>,
    json: bool,
) -> anyhow::Result<()> {
    let ws = open(root)?;
    let sort = sort.map(str::parse::<ReleaseSort>).transpose()?.unwrap_or_default();
    let query = PageQuery {
        page: page.map(|p| p.to_string()),
        page_size: page_size.map(|s| s.to_string()),
        ..PageQuery::default()
    };
    let pagination = Pagination::from_query(&query, &ws.config.api)?;
    let result = ws.service.find_page(released, sort, pagination)?;

    if json {
        return print_json(&serde_json::json!({
            "data": result.results,
            "meta": {
                "pagination": result.pagination,
                "pendingReleasesCount": result.pending_releases_count,
            },
        }));
    }
    if result.results.is_empty() {
        println!("No releases.");
        return Ok(());
    }
    let rows = result
        .results
        .iter()
        .map(|s| {
            vec![
                s.release.id.to_string(),
                s.release.name.clone(),
                s.release.status.to_string(),
                s.actions.meta.count.to_string(),
                fmt_time(s.release.scheduled_at),
                fmt_time(s.release.released_at),
            ]
        })
        .collect();
    print_table(&["ID", "NAME", "STATUS", "ENTRIES", "SCHEDULED", "RELEASED"], rows);
    println!("\n{} pending", result.pending_releases_count);
    Ok(())
}

fn show(root: &Path, id: ReleaseId, json: bool) -> anyhow::Result<()> {
    let ws = open(root)?;
    let summary = ws.service.find_one_with_count(id)?;
    let meta = ws.service.publish_meta(id)?;
    if json {
        return print_json(&serde_json::json!({ "data": summary, "meta": meta }));
    }
    let r = &summary.release;
    print_fields(&[
        ("id", r.id.to_string()),
        ("name", r.name.clone()),
        ("status", r.status.to_string()),
        ("scheduled", fmt_time(r.scheduled_at)),
        ("timezone", r.timezone.clone().unwrap_or_else(|| "-".into())),
        ("released", fmt_time(r.released_at)),
        (
            "entries",
            format!(
                "{} ({} publish, {} unpublish)",
                meta.total_entries, meta.total_published_entries, meta.total_unpublished_entries
            ),
        ),
    ]);
    Ok(())
}

fn create(root: &Path, data: NewRelease, json: bool) -> anyhow::Result<()> {
    let ws = open(root)?;
    let release = ws.service.create(data, None)?;
    if json {
        return print_json(&release);
    }
    println!("Created release {} ({})", release.id, release.name);
    if let Some(at) = release.scheduled_at {
        println!("Scheduled for {}; it fires while `cadence serve` is running", fmt_time(Some(at)));
    }
    Ok(())
}

fn update(
    root: &Path,
    id: ReleaseId,
    name: Option<String>,
    scheduled_at: Option<DateTime<Utc>>,
    timezone: Option<String>,
    unschedule: bool,
    json: bool,
) -> anyhow::Result<()> {
    let ws = open(root)?;
    let current = ws.service.find_one(id)?;
    let data = if unschedule {
        ReleaseUpdate {
            name: name.unwrap_or(current.name),
            scheduled_at: None,
            timezone: None,
        }
    } else {
        ReleaseUpdate {
            name: name.unwrap_or(current.name),
            scheduled_at: scheduled_at.or(current.scheduled_at),
            timezone: timezone.or(current.timezone),
        }
    };
    let release = ws.service.update(id, data, None)?;
    if json {
        return print_json(&release);
    }
    println!("Updated release {} ({})", release.id, release.name);
    Ok(())
}

fn delete(root: &Path, id: ReleaseId, json: bool) -> anyhow::Result<()> {
    let ws = open(root)?;
    let release = ws.service.delete(id)?;
    if json {
        return print_json(&release);
    }
    println!("Deleted release {} ({})", release.id, release.name);
    Ok(())
}

fn publish(root: &Path, id: ReleaseId, json: bool) -> anyhow::Result<()> {
    let ws = open(root)?;
    let published = ws.service.publish(id)?;
    if json {
        return print_json(&published);
    }
    println!(
        "Published release {} ({}): {} published, {} unpublished",
        published.release.id,
        published.release.name,
        published.meta.total_published_entries,
        published.meta.total_unpublished_entries
    );
    Ok(())
}
