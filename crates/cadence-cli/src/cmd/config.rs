use crate::output::{print_json, print_table};
use anyhow::Context;
use cadence_core::config::{Config, WarnLevel};
use clap::Subcommand;
use std::path::Path;

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Print the effective configuration
    Show,

    /// Validate the config for common mistakes
    Validate,
}

pub fn run(root: &Path, subcmd: ConfigSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        ConfigSubcommand::Show => show(root, json),
        ConfigSubcommand::Validate => validate(root, json),
    }
}

fn show(root: &Path, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    if json {
        return print_json(&config);
    }

    println!("project:      {}", config.project.name);
    println!("database:     {}", config.db_path(root).display());
    println!("listen:       {}:{}", config.server.host, config.server.port);
    println!("max pending:  {}", config.releases.max_pending_releases);
    println!("api tokens:   {}", config.auth.tokens.len());
    println!("webhooks:     {}", config.webhooks.len());
    println!();
    let rows = config
        .content_types
        .iter()
        .map(|ct| {
            vec![
                ct.uid.clone(),
                ct.display_name().to_string(),
                format!("{:?}", ct.kind).to_lowercase(),
                ct.draft_and_publish.to_string(),
                ct.localized.to_string(),
            ]
        })
        .collect();
    print_table(&["UID", "NAME", "KIND", "DRAFT/PUBLISH", "LOCALIZED"], rows);
    Ok(())
}

fn validate(root: &Path, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    let warnings = config.validate();

    if json {
        print_json(&serde_json::json!({ "warnings": warnings }))?;
    } else if warnings.is_empty() {
        println!("Config is valid. No warnings.");
    } else {
        for w in &warnings {
            let prefix = match w.level {
                WarnLevel::Warning => "warning",
                WarnLevel::Error => "error",
            };
            println!("[{prefix}] {}", w.message);
        }
    }

    if warnings.iter().any(|w| w.level == WarnLevel::Error) {
        anyhow::bail!("config validation found errors");
    }
    Ok(())
}
