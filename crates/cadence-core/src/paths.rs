use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const CADENCE_DIR: &str = ".cadence";
pub const CONFIG_FILE: &str = ".cadence/config.yaml";
pub const CONTENT_FILE: &str = ".cadence/content.yaml";
pub const DB_FILE: &str = ".cadence/releases.redb";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn cadence_dir(root: &Path) -> PathBuf {
    root.join(CADENCE_DIR)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn content_path(root: &Path) -> PathBuf {
    root.join(CONTENT_FILE)
}

/// Resolve a configured database path: relative paths are anchored at `root`.
pub fn db_path(root: &Path, configured: &Path) -> PathBuf {
    if configured.is_absolute() {
        configured.to_path_buf()
    } else {
        root.join(configured)
    }
}
