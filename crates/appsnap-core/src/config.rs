//! Configuration management for appsnap.
//!
//! Configuration is loaded from multiple sources and merged:
//! 1. Global config: `~/.config/appsnap/config.json`
//! 2. Environment variable: `APPSNAP_CONFIG_CONTENT`
//! 3. Project config: `appsnap.jsonc` or `appsnap.json` in the project directory
//! 4. Environment overrides: `APPSNAP_APPS_DIR`, `APPSNAP_LOG_LEVEL`
//!
//! Files may contain `//` and `/* */` comments.

use crate::error::{ConfigError, CoreResult};
use appsnap_snapshot::StoreConfig;
use appsnap_util::log::LogLevel;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default number of history entries returned when no limit is given.
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

/// Engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Parent directory of app working directories.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apps_dir: Option<PathBuf>,

    /// Author name recorded on snapshots.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author_name: Option<String>,

    /// Author email recorded on snapshots.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author_email: Option<String>,

    /// Default history length.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history_limit: Option<usize>,

    /// Give up waiting for an app's exclusive section after this long.
    /// Unset means wait indefinitely.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lock_timeout_ms: Option<u64>,

    /// Honour `.gitignore` rules when capturing snapshots.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub respect_ignore_files: Option<bool>,

    /// Log level name (`trace` .. `error`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

impl EngineConfig {
    /// Load configuration from all sources.
    ///
    /// Returns the merged config and the files it was read from.
    pub async fn load(project_dir: Option<&Path>) -> CoreResult<(Self, Vec<PathBuf>)> {
        let mut config = EngineConfig::default();
        let mut sources = Vec::new();

        // 1. Global config
        if let Some(global_dir) = appsnap_util::path::config_dir() {
            for name in &["config.json", "appsnap.jsonc", "appsnap.json"] {
                let path = global_dir.join(name);
                if path.exists() {
                    config = config.merge(Self::load_file(&path).await?);
                    sources.push(path);
                    break;
                }
            }
        }

        // 2. Inline config from the environment
        if let Ok(content) = std::env::var("APPSNAP_CONFIG_CONTENT") {
            config = config.merge(Self::parse_jsonc(&content, "<env>")?);
        }

        // 3. Project config
        if let Some(dir) = project_dir {
            for name in &["appsnap.jsonc", "appsnap.json"] {
                let path = dir.join(name);
                if path.exists() {
                    config = config.merge(Self::load_file(&path).await?);
                    sources.push(path);
                    break;
                }
            }
        }

        // 4. Single-value overrides
        config = config.merge(Self::from_env_overrides());

        config.validate()?;
        Ok((config, sources))
    }

    /// Load configuration from a file.
    pub async fn load_file(path: &Path) -> CoreResult<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        Self::parse_jsonc(&content, &path.display().to_string())
    }

    fn from_env_overrides() -> Self {
        EngineConfig {
            apps_dir: std::env::var_os("APPSNAP_APPS_DIR").map(PathBuf::from),
            log_level: std::env::var("APPSNAP_LOG_LEVEL").ok(),
            ..Default::default()
        }
    }

    /// Parse JSONC (JSON with comments).
    pub fn parse_jsonc(content: &str, source: &str) -> CoreResult<Self> {
        let stripped = strip_comments(content);

        serde_json::from_str(&stripped).map_err(|e| {
            ConfigError::InvalidJson {
                path: source.to_string(),
                message: e.to_string(),
            }
            .into()
        })
    }

    /// Check values that deserialize fine but cannot be used.
    pub fn validate(&self) -> CoreResult<()> {
        if let Some(level) = &self.log_level {
            if LogLevel::parse(level).is_none() {
                return Err(ConfigError::Validation {
                    message: format!("unknown log level '{level}'"),
                }
                .into());
            }
        }
        if self.history_limit == Some(0) {
            return Err(ConfigError::Validation {
                message: "history_limit must be at least 1".to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Merge another config into this one (other takes precedence).
    pub fn merge(self, other: Self) -> Self {
        Self {
            apps_dir: merge_option(self.apps_dir, other.apps_dir),
            author_name: merge_option(self.author_name, other.author_name),
            author_email: merge_option(self.author_email, other.author_email),
            history_limit: merge_option(self.history_limit, other.history_limit),
            lock_timeout_ms: merge_option(self.lock_timeout_ms, other.lock_timeout_ms),
            respect_ignore_files: merge_option(
                self.respect_ignore_files,
                other.respect_ignore_files,
            ),
            log_level: merge_option(self.log_level, other.log_level),
        }
    }

    /// Directory new apps are created in.
    pub fn apps_dir(&self) -> CoreResult<PathBuf> {
        self.apps_dir
            .clone()
            .or_else(appsnap_util::path::apps_dir)
            .ok_or_else(|| {
                ConfigError::InvalidPath("could not determine the apps directory".to_string())
                    .into()
            })
    }

    pub fn history_limit(&self) -> usize {
        self.history_limit.unwrap_or(DEFAULT_HISTORY_LIMIT)
    }

    pub fn lock_timeout(&self) -> Option<Duration> {
        self.lock_timeout_ms.map(Duration::from_millis)
    }

    pub fn log_level(&self) -> LogLevel {
        self.log_level
            .as_deref()
            .and_then(LogLevel::parse)
            .unwrap_or_default()
    }

    /// Settings for each app's snapshot store.
    pub fn store_config(&self) -> StoreConfig {
        let defaults = StoreConfig::default();
        StoreConfig {
            author_name: self.author_name.clone().unwrap_or(defaults.author_name),
            author_email: self.author_email.clone().unwrap_or(defaults.author_email),
            respect_ignore_files: self
                .respect_ignore_files
                .unwrap_or(defaults.respect_ignore_files),
            history_limit: self.history_limit(),
        }
    }
}

/// Merge two Option values.
fn merge_option<T>(base: Option<T>, other: Option<T>) -> Option<T> {
    match (base, other) {
        (_, Some(o)) => Some(o),
        (b, None) => b,
    }
}

/// Strip JSON comments, leaving string contents alone.
fn strip_comments(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    let mut in_string = false;
    let mut escape_next = false;

    while let Some(c) = chars.next() {
        if escape_next {
            result.push(c);
            escape_next = false;
            continue;
        }

        if in_string {
            match c {
                '\\' => escape_next = true,
                '"' => in_string = false,
                _ => {}
            }
            result.push(c);
            continue;
        }

        let next = chars.peek().copied();
        match (c, next) {
            ('"', _) => {
                in_string = true;
                result.push(c);
            }
            ('/', Some('/')) => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        result.push('\n');
                        break;
                    }
                }
            }
            ('/', Some('*')) => {
                chars.next();
                let mut prev = ' ';
                for c in chars.by_ref() {
                    if prev == '*' && c == '/' {
                        break;
                    }
                    // Keep line numbers stable for error messages
                    if c == '\n' {
                        result.push('\n');
                    }
                    prev = c;
                }
            }
            _ => result.push(c),
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_comments() {
        let input = r#"{
            // Line comment
            "author_name": "bot", // trailing comment
            /* block comment */
            "author_email": "a/*not a comment*/b@x"
        }"#;

        let result = strip_comments(input);
        assert!(!result.contains("Line comment"));
        assert!(!result.contains("trailing comment"));
        assert!(!result.contains("block comment"));
        assert!(result.contains("a/*not a comment*/b@x"));
    }

    #[test]
    fn test_parse_jsonc() {
        let input = r#"{
            // Apps live next to the project
            "apps_dir": "/srv/apps",
            "history_limit": 20,
            "log_level": "debug"
        }"#;

        let config = EngineConfig::parse_jsonc(input, "test").unwrap();
        assert_eq!(config.apps_dir, Some(PathBuf::from("/srv/apps")));
        assert_eq!(config.history_limit(), 20);
        assert_eq!(config.log_level(), LogLevel::Debug);
    }

    #[test]
    fn test_parse_invalid_json_names_source() {
        let err = EngineConfig::parse_jsonc("{ not json", "appsnap.json").unwrap_err();
        assert!(err.to_string().contains("appsnap.json"));
    }

    #[test]
    fn test_merge_config() {
        let base = EngineConfig {
            author_name: Some("base".to_string()),
            history_limit: Some(10),
            ..Default::default()
        };
        let other = EngineConfig {
            author_name: Some("override".to_string()),
            lock_timeout_ms: Some(500),
            ..Default::default()
        };

        let merged = base.merge(other);
        assert_eq!(merged.author_name.as_deref(), Some("override"));
        assert_eq!(merged.history_limit, Some(10));
        assert_eq!(merged.lock_timeout(), Some(Duration::from_millis(500)));
    }

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.history_limit(), DEFAULT_HISTORY_LIMIT);
        assert_eq!(config.lock_timeout(), None);
        assert_eq!(config.log_level(), LogLevel::Info);

        let store = config.store_config();
        assert!(!store.respect_ignore_files);
        assert_eq!(store.history_limit, DEFAULT_HISTORY_LIMIT);
        assert_eq!(store.author_name, StoreConfig::default().author_name);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = EngineConfig {
            log_level: Some("loud".to_string()),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = EngineConfig {
            history_limit: Some(0),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn test_load_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("appsnap.jsonc");
        tokio::fs::write(
            &path,
            "{\n  // keep ignored files out\n  \"respect_ignore_files\": true\n}",
        )
        .await
        .unwrap();

        let config = EngineConfig::load_file(&path).await.unwrap();
        assert!(config.store_config().respect_ignore_files);
    }
}
