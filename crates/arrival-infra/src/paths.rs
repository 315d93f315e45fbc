//! Data directory layout.
//!
//! ```text
//! <data_dir>/
//!   config.toml
//!   arrival.db
//!   buckets/<bucket>/<key>
//! ```

use std::path::{Path, PathBuf};

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "ARRIVAL_DATA_DIR";

/// Resolve the data directory from environment or platform defaults.
///
/// Priority:
/// 1. `ARRIVAL_DATA_DIR` environment variable
/// 2. `~/.arrival`
/// 3. `./.arrival`
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        return PathBuf::from(dir);
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".arrival");
    }

    PathBuf::from(".arrival")
}

pub fn config_path(data_dir: &Path) -> PathBuf {
    data_dir.join("config.toml")
}

/// SQLite URL for the execution history, created on first open.
pub fn database_url(data_dir: &Path) -> String {
    format!("sqlite://{}?mode=rwc", data_dir.join("arrival.db").display())
}

/// Default root of the local object store.
pub fn buckets_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("buckets")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_under_data_dir() {
        let dir = Path::new("/tmp/arrival-test");
        assert_eq!(config_path(dir), dir.join("config.toml"));
        assert_eq!(buckets_dir(dir), dir.join("buckets"));
        let url = database_url(dir);
        assert!(url.starts_with("sqlite://"));
        assert!(url.ends_with("arrival.db?mode=rwc"));
    }
}
