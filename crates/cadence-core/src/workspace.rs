use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::Config;
use crate::content::{ContentStore, MemoryContentStore};
use crate::db::ReleaseDb;
use crate::error::Result;
use crate::events::EventHub;
use crate::paths;
use crate::service::{ReleaseService, ServiceContext};
use crate::validator::{EntityValidator, SchemaValidator};

/// Everything a front end needs to serve one project: its configuration, the
/// bundled content store and a release service over the project database.
pub struct Workspace {
    pub root: PathBuf,
    pub config: Config,
    pub content: Arc<MemoryContentStore>,
    pub service: Arc<ReleaseService>,
}

impl Workspace {
    /// Open the project at `root`. Fails with `NotInitialized` when there is no
    /// config file.
    pub fn open(root: &Path) -> Result<Self> {
        let config = Config::load(root)?;
        let db = ReleaseDb::open(&config.db_path(root))?;
        let ws = Self::assemble(root.to_path_buf(), config, db)?;
        let seeded = ws.content.load_seed(&paths::content_path(root))?;
        tracing::debug!(root = %root.display(), entries = seeded, "workspace opened");
        Ok(ws)
    }

    /// A workspace backed by an in-memory database and an empty content
    /// store.
    pub fn in_memory(config: Config) -> Result<Self> {
        Self::assemble(PathBuf::new(), config, ReleaseDb::in_memory()?)
    }

    fn assemble(root: PathBuf, config: Config, db: ReleaseDb) -> Result<Self> {
        let registry = Arc::new(config.registry());
        let validator: Arc<dyn EntityValidator> = Arc::new(SchemaValidator);
        let content = Arc::new(MemoryContentStore::new(
            Arc::clone(&registry),
            Arc::clone(&validator),
        ));
        let service = ReleaseService::new(ServiceContext {
            db: Arc::new(db),
            content: Arc::clone(&content) as Arc<dyn ContentStore>,
            registry,
            entity_validator: validator,
            events: EventHub::default(),
            max_pending_releases: config.releases.max_pending_releases,
            api: config.api.clone(),
            i18n: config.i18n.clone(),
        });
        Ok(Self {
            root,
            config,
            content,
            service,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CadenceError;
    use crate::release::NewRelease;
    use tempfile::TempDir;

    const CONFIG: &str = r#"
project:
  name: demo
releases:
  max_pending_releases: 5
content_types:
  - uid: api::article.article
    draft_and_publish: true
    display_name: Article
    attributes:
      - name: title
        type: string
        required: true
"#;

    const CONTENT: &str = r#"
entries:
  - id: 1
    contentType: api::article.article
    data:
      title: Hello
"#;

    #[test]
    fn open_requires_config() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            Workspace::open(dir.path()),
            Err(CadenceError::NotInitialized)
        ));
    }

    #[test]
    fn open_loads_config_and_seed_and_persists_releases() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(paths::cadence_dir(dir.path())).unwrap();
        std::fs::write(paths::config_path(dir.path()), CONFIG).unwrap();
        std::fs::write(paths::content_path(dir.path()), CONTENT).unwrap();

        let id = {
            let ws = Workspace::open(dir.path()).unwrap();
            assert_eq!(ws.content.len(), 1);
            assert_eq!(ws.config.releases.max_pending_releases, 5);
            ws.service.create(NewRelease::named("Launch"), None).unwrap().id
        };

        let ws = Workspace::open(dir.path()).unwrap();
        assert_eq!(ws.service.find_one(id).unwrap().name, "Launch");
        assert!(dir.path().join(paths::DB_FILE).exists());
    }

    #[test]
    fn in_memory_workspace_starts_empty() {
        let ws = Workspace::in_memory(Config::new("scratch")).unwrap();
        assert!(ws.content.is_empty());
        assert_eq!(ws.service.pending_count().unwrap(), 0);
    }
}
