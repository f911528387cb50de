use crate::content::{ContentType, ContentTypeRegistry};
use crate::error::{CadenceError, Result};
use crate::paths;
use crate::types::Permission;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// ReleasesConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleasesConfig {
    /// Maximum number of releases with no `released_at` at any one time.
    #[serde(default = "default_max_pending")]
    pub max_pending_releases: usize,
}

fn default_max_pending() -> usize {
    3
}

impl Default for ReleasesConfig {
    fn default() -> Self {
        Self {
            max_pending_releases: default_max_pending(),
        }
    }
}

// ---------------------------------------------------------------------------
// ApiConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_limit")]
    pub default_limit: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_limit: Option<u64>,
    #[serde(default = "default_with_count")]
    pub with_count: bool,
}

fn default_limit() -> u64 {
    25
}

fn default_with_count() -> bool {
    true
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            max_limit: None,
            with_count: default_with_count(),
        }
    }
}

// ---------------------------------------------------------------------------
// ServerConfig / DatabaseConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    1337
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

fn default_db_path() -> PathBuf {
    PathBuf::from(paths::DB_FILE)
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

// ---------------------------------------------------------------------------
// AuthConfig
// ---------------------------------------------------------------------------

/// A static API token and the permissions it grants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiToken {
    pub name: String,
    pub token: String,
    #[serde(default = "default_token_permissions")]
    pub permissions: Vec<Permission>,
}

fn default_token_permissions() -> Vec<Permission> {
    vec![Permission::Read]
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub tokens: Vec<ApiToken>,
}

// ---------------------------------------------------------------------------
// WebhookConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub url: String,
    /// Event names this hook receives; empty means every event.
    #[serde(default)]
    pub events: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
}

impl WebhookConfig {
    pub fn wants(&self, event: &str) -> bool {
        self.events.is_empty() || self.events.iter().any(|e| e == event)
    }
}

// ---------------------------------------------------------------------------
// I18nConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Locale {
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct I18nConfig {
    #[serde(default = "default_locale")]
    pub default_locale: String,
    #[serde(default)]
    pub locales: Vec<Locale>,
}

fn default_locale() -> String {
    "en".to_string()
}

impl Default for I18nConfig {
    fn default() -> Self {
        Self {
            default_locale: default_locale(),
            locales: Vec::new(),
        }
    }
}

impl I18nConfig {
    /// Display name for a locale code, falling back to the code itself.
    pub fn locale_name(&self, code: &str) -> String {
        self.locales
            .iter()
            .find(|l| l.code == code)
            .map(|l| l.name.clone())
            .unwrap_or_else(|| code.to_string())
    }
}

// ---------------------------------------------------------------------------
// ProjectConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub name: String,
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    pub project: ProjectConfig,
    #[serde(default)]
    pub releases: ReleasesConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub webhooks: Vec<WebhookConfig>,
    #[serde(default)]
    pub i18n: I18nConfig,
    #[serde(default)]
    pub content_types: Vec<ContentType>,
}

fn default_version() -> u32 {
    1
}

impl Config {
    pub fn new(project_name: impl Into<String>) -> Self {
        Self {
            version: 1,
            project: ProjectConfig {
                name: project_name.into(),
            },
            releases: ReleasesConfig::default(),
            api: ApiConfig::default(),
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            auth: AuthConfig::default(),
            webhooks: Vec::new(),
            i18n: I18nConfig::default(),
            content_types: Vec::new(),
        }
    }

    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Err(CadenceError::NotInitialized);
        }
        let data = std::fs::read_to_string(&path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    pub fn registry(&self) -> ContentTypeRegistry {
        ContentTypeRegistry::new(self.content_types.iter().cloned())
    }

    pub fn db_path(&self, root: &Path) -> PathBuf {
        paths::db_path(root, &self.database.path)
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if self.releases.max_pending_releases == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "releases.max_pending_releases is 0: no release can be created".into(),
            });
        }

        if let Some(max) = self.api.max_limit {
            if max < self.api.default_limit {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: format!(
                        "api.max_limit ({max}) is lower than api.default_limit ({})",
                        self.api.default_limit
                    ),
                });
            }
        }

        let mut uids = HashSet::new();
        for ct in &self.content_types {
            if !uids.insert(ct.uid.as_str()) {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!("content type '{}' is declared more than once", ct.uid),
                });
            }
            if let Some(field) = &ct.main_field {
                if field != "id" && !ct.attributes.iter().any(|a| &a.name == field) {
                    warnings.push(ConfigWarning {
                        level: WarnLevel::Warning,
                        message: format!(
                            "content type '{}' has main_field '{field}' with no matching attribute",
                            ct.uid
                        ),
                    });
                }
            }
            if ct.localized && self.i18n.locales.is_empty() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: format!(
                        "content type '{}' is localized but i18n.locales is empty",
                        ct.uid
                    ),
                });
            }
        }

        for hook in &self.webhooks {
            if hook.url.trim().is_empty() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: "webhook with an empty url".into(),
                });
            }
        }

        let mut tokens = HashSet::new();
        for token in &self.auth.tokens {
            if token.token.trim().is_empty() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!("auth token '{}' is empty", token.name),
                });
            } else if !tokens.insert(token.token.as_str()) {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!("auth token '{}' duplicates another token", token.name),
                });
            }
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::ContentKind;
    use tempfile::TempDir;

    fn content_type(uid: &str) -> ContentType {
        ContentType {
            uid: uid.into(),
            kind: ContentKind::Collection,
            draft_and_publish: true,
            localized: false,
            display_name: String::new(),
            main_field: None,
            attributes: Vec::new(),
        }
    }

    #[test]
    fn minimal_yaml_gets_defaults() {
        let yaml = "project:\n  name: site\n";
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.releases.max_pending_releases, 3);
        assert_eq!(cfg.api.default_limit, 25);
        assert!(cfg.api.max_limit.is_none());
        assert_eq!(cfg.server.port, 1337);
        assert_eq!(cfg.database.path, PathBuf::from(".cadence/releases.redb"));
        assert!(cfg.auth.tokens.is_empty());
        assert!(cfg.validate().is_empty());
    }

    #[test]
    fn load_missing_is_not_initialized() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            Config::load(dir.path()),
            Err(CadenceError::NotInitialized)
        ));
    }

    #[test]
    fn save_then_load() {
        let dir = TempDir::new().unwrap();
        let mut cfg = Config::new("site");
        cfg.content_types.push(content_type("api::article.article"));
        cfg.save(dir.path()).unwrap();

        let loaded = Config::load(dir.path()).unwrap();
        assert_eq!(loaded.project.name, "site");
        assert!(loaded.registry().get("api::article.article").is_some());
    }

    #[test]
    fn token_permissions_parse_kebab_case() {
        let yaml = r#"
project:
  name: site
auth:
  tokens:
    - name: editor
      token: s3cret
      permissions: [read, create-action, delete-action]
"#;
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            cfg.auth.tokens[0].permissions,
            vec![
                Permission::Read,
                Permission::CreateAction,
                Permission::DeleteAction
            ]
        );
    }

    #[test]
    fn validate_flags_duplicates_and_zero_limit() {
        let mut cfg = Config::new("site");
        cfg.releases.max_pending_releases = 0;
        cfg.content_types.push(content_type("api::page.page"));
        cfg.content_types.push(content_type("api::page.page"));
        cfg.webhooks.push(WebhookConfig {
            url: " ".into(),
            events: Vec::new(),
            headers: BTreeMap::new(),
        });
        for name in ["a", "b"] {
            cfg.auth.tokens.push(ApiToken {
                name: name.into(),
                token: "same".into(),
                permissions: Vec::new(),
            });
        }

        let warnings = cfg.validate();
        let errors: Vec<_> = warnings
            .iter()
            .filter(|w| w.level == WarnLevel::Error)
            .collect();
        assert_eq!(errors.len(), 4, "{warnings:?}");
    }

    #[test]
    fn unknown_main_field_warns() {
        let mut cfg = Config::new("site");
        let mut ct = content_type("api::article.article");
        ct.main_field = Some("headline".into());
        cfg.content_types.push(ct);
        let warnings = cfg.validate();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].level, WarnLevel::Warning);
    }

    #[test]
    fn webhook_without_events_wants_everything() {
        let hook = WebhookConfig {
            url: "http://localhost/hook".into(),
            events: Vec::new(),
            headers: BTreeMap::new(),
        };
        assert!(hook.wants("releases.publish"));
    }
}
