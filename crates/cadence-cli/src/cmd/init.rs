use anyhow::Context;
use cadence_core::config::Config;
use cadence_core::content::{Attribute, AttributeKind, ContentKind, ContentType};
use cadence_core::{io, paths};
use std::path::Path;

const CONTENT_TEMPLATE: &str = "\
# Entries served by the bundled content store.
entries:
  - id: 1
    contentType: api::article.article
    data:
      title: Hello world
";

pub fn run(root: &Path, name: Option<&str>) -> anyhow::Result<()> {
    let project_name = name.map(str::to_string).unwrap_or_else(|| {
        root.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "project".to_string())
    });

    println!("Initializing cadence in: {}", root.display());

    let config_path = paths::config_path(root);
    if config_path.exists() {
        println!("  exists:  {}", paths::CONFIG_FILE);
    } else {
        let mut config = Config::new(&project_name);
        config.content_types.push(example_content_type());
        config.save(root).context("failed to write config.yaml")?;
        println!("  created: {}", paths::CONFIG_FILE);
    }

    let created = io::write_if_missing(&paths::content_path(root), CONTENT_TEMPLATE.as_bytes())
        .context("failed to write content.yaml")?;
    let verb = if created { "created:" } else { "exists: " };
    println!("  {verb} {}", paths::CONTENT_FILE);

    Ok(())
}

fn example_content_type() -> ContentType {
    ContentType {
        uid: "api::article.article".into(),
        kind: ContentKind::Collection,
        draft_and_publish: true,
        localized: false,
        display_name: "Article".into(),
        main_field: Some("title".into()),
        attributes: vec![Attribute {
            name: "title".into(),
            kind: AttributeKind::String,
            required: true,
            max_length: Some(255),
        }],
    }
}
