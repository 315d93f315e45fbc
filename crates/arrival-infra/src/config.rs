//! Dispatcher configuration loader.
//!
//! Reads `config.toml` (from the data directory or an explicit path) into a
//! resolved and validated [`DispatcherConfig`]. A missing file yields the
//! defaults; an unreadable, malformed or invalid file is an error.

use std::path::Path;

use arrival_types::config::DispatcherConfig;
use arrival_types::error::ConfigError;

use crate::paths;

/// Load, resolve and validate the config at `path`.
pub async fn load_config(path: &Path) -> Result<DispatcherConfig, ConfigError> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config found at {}, using defaults", path.display());
            return finish(DispatcherConfig::default());
        }
        Err(err) => {
            return Err(ConfigError::Read {
                path: path.display().to_string(),
                reason: err.to_string(),
            });
        }
    };

    parse_config(&content)
}

/// Load `{data_dir}/config.toml`.
pub async fn load_from_data_dir(data_dir: &Path) -> Result<DispatcherConfig, ConfigError> {
    load_config(&paths::config_path(data_dir)).await
}

/// Parse, resolve and validate TOML text.
pub fn parse_config(content: &str) -> Result<DispatcherConfig, ConfigError> {
    let config: DispatcherConfig =
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
    finish(config)
}

fn finish(config: DispatcherConfig) -> Result<DispatcherConfig, ConfigError> {
    let config = config.resolve();
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn missing_file_returns_defaults() {
        let tmp = TempDir::new().unwrap();
        let config = load_from_data_dir(tmp.path()).await.unwrap();
        assert_eq!(config.timeout_secs, 3600);
        assert_eq!(config.bucket_name(), "arrival-dev-bucket");
    }

    #[tokio::test]
    async fn valid_toml_is_parsed() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(
            paths::config_path(tmp.path()),
            r#"
project = "reports"
environment = "staging"
entry_path = "/app/main.js"

[rule]
min_size = 100
"#,
        )
        .await
        .unwrap();

        let config = load_from_data_dir(tmp.path()).await.unwrap();
        assert_eq!(config.bucket_name(), "reports-staging-bucket");
        assert_eq!(config.entry_path, "/app/main.js");
        assert_eq!(config.rule.min_size, 100);
    }

    #[tokio::test]
    async fn malformed_toml_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("custom.toml");
        tokio::fs::write(&path, "this is not { valid toml !!!")
            .await
            .unwrap();

        assert!(matches!(load_config(&path).await, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn invalid_values_are_an_error() {
        assert!(matches!(
            parse_config("timeout_secs = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            parse_config("[task]\nmemory_mib = 0"),
            Err(ConfigError::Invalid(_))
        ));
    }
}
