use dirs::data_dir;
use once_cell::sync::Lazy;
use std::{
    fs,
    path::{Path, PathBuf},
};

static DATA_ROOT: Lazy<PathBuf> = Lazy::new(|| {
    let base = data_dir()
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
    let root = base.join("nice-outside");
    if let Err(err) = fs::create_dir_all(&root) {
        tracing::warn!(path = %root.display(), "failed to create data root: {err}");
    }
    root
});

pub fn data_root() -> PathBuf {
    DATA_ROOT.clone()
}

/// SQLite file holding the offline cache namespaces.
pub fn database_path() -> PathBuf {
    data_root().join("offline-cache.sqlite")
}

pub fn config_path() -> PathBuf {
    data_root().join("config.json")
}

pub fn ensure_parent(path: &Path) {
    if let Some(parent) = path.parent() {
        if let Err(err) = fs::create_dir_all(parent) {
            tracing::warn!(path = %parent.display(), "failed to create parent: {err}");
        }
    }
}
