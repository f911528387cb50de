use crate::cmd::open;
use crate::output::{print_json, print_table};
use cadence_core::pagination::Pagination;
use cadence_core::release::{ActionUpdate, NewAction};
use cadence_core::service::GroupBy;
use cadence_core::types::{ActionId, ActionType, EntryId, EntryRef, ReleaseId};
use clap::Subcommand;
use std::path::Path;

#[derive(Subcommand)]
pub enum ActionSubcommand {
    /// List a release's actions, grouped
    List {
        release_id: ReleaseId,
        /// Group by content-type, action or locale
        #[arg(long, default_value = "content-type")]
        group_by: String,
    },

    /// Attach an entry to a release
    Add {
        release_id: ReleaseId,
        /// publish or unpublish
        #[arg(long = "type", value_name = "TYPE", default_value = "publish")]
        action_type: ActionType,
        /// Content type uid, e.g. api::article.article
        #[arg(long)]
        content_type: String,
        #[arg(long)]
        entry_id: EntryId,
        #[arg(long)]
        locale: Option<String>,
    },

    /// Switch an action between publish and unpublish
    Update {
        release_id: ReleaseId,
        action_id: ActionId,
        #[arg(long = "type", value_name = "TYPE")]
        action_type: ActionType,
    },

    /// Detach an entry from a release
    Remove {
        release_id: ReleaseId,
        action_id: ActionId,
    },
}

pub fn run(root: &Path, subcmd: ActionSubcommand, json: bool) -> anyhow::Result<()> {
    let ws = open(root)?;
    let service = &ws.service;

    match subcmd {
        ActionSubcommand::List {
            release_id,
            group_by,
        } => {
            let group_by = group_by.parse::<GroupBy>().unwrap_or_default();
            let page = service.find_actions(release_id, group_by, Pagination::unbounded())?;
            if json {
                return print_json(&page);
            }
            if page.groups.is_empty() {
                println!("Release {release_id} has no entries.");
                return Ok(());
            }
            for (group, actions) in &page.groups {
                println!("{group}");
                let rows = actions
                    .iter()
                    .map(|a| {
                        vec![
                            a.id.to_string(),
                            a.action_type.to_string(),
                            a.content_type.main_field_value.to_string().trim_matches('"').to_string(),
                            a.locale.as_ref().map(|l| l.name.clone()).unwrap_or_else(|| "-".into()),
                            match a.is_entry_valid {
                                Some(true) => "valid".to_string(),
                                Some(false) => "invalid".to_string(),
                                None => "-".to_string(),
                            },
                        ]
                    })
                    .collect();
                print_table(&["ID", "TYPE", "ENTRY", "LOCALE", "VALIDATION"], rows);
                println!();
            }
        }
        ActionSubcommand::Add {
            release_id,
            action_type,
            content_type,
            entry_id,
            locale,
        } => {
            let mut entry = EntryRef::new(entry_id, content_type);
            entry.locale = locale;
            let action = service.create_action(release_id, NewAction { action_type, entry })?;
            if json {
                return print_json(&action);
            }
            println!(
                "Added action {} to release {release_id}: {} {} #{}",
                action.id, action.action_type, action.content_type, action.entry.id
            );
        }
        ActionSubcommand::Update {
            release_id,
            action_id,
            action_type,
        } => {
            let action =
                service.update_action(action_id, release_id, ActionUpdate { action_type })?;
            if json {
                return print_json(&action);
            }
            println!("Action {} is now {}", action.id, action.action_type);
        }
        ActionSubcommand::Remove {
            release_id,
            action_id,
        } => {
            let action = service.delete_action(action_id, release_id)?;
            if json {
                return print_json(&action);
            }
            println!("Removed action {} from release {release_id}", action.id);
        }
    }
    Ok(())
}
