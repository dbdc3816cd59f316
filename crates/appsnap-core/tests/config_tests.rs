//! Configuration integration tests.
//!
//! Tests for configuration loading from project directories.

use appsnap_core::{CoreError, EngineConfig};
use std::fs;
use tempfile::TempDir;

/// Test that config loads from project directory.
#[tokio::test]
async fn test_load_project_config() {
    let temp = TempDir::new().expect("Failed to create temp dir");

    let config_content = r#"{
        "author_name": "builder",
        "history_limit": 25
    }"#;
    fs::write(temp.path().join("appsnap.json"), config_content).expect("Failed to write config");

    let (config, sources) = EngineConfig::load(Some(temp.path()))
        .await
        .expect("Failed to load config");

    assert_eq!(config.author_name, Some("builder".to_string()));
    assert_eq!(config.history_limit(), 25);
    assert!(sources.contains(&temp.path().join("appsnap.json")));
}

/// Test that JSONC comments are handled.
#[tokio::test]
async fn test_load_jsonc_config() {
    let temp = TempDir::new().expect("Failed to create temp dir");

    let config_content = r#"{
        // Wait at most two seconds for a busy app
        "lock_timeout_ms": 2000,
        /* Multi-line
           comment */
        "respect_ignore_files": true
    }"#;
    fs::write(temp.path().join("appsnap.jsonc"), config_content).expect("Failed to write config");
    fs::write(temp.path().join("appsnap.json"), r#"{"lock_timeout_ms": 1}"#)
        .expect("Failed to write config");

    let (config, _) = EngineConfig::load(Some(temp.path()))
        .await
        .expect("Failed to load config");

    // appsnap.jsonc is preferred over appsnap.json
    assert_eq!(config.lock_timeout_ms, Some(2000));
    assert!(config.store_config().respect_ignore_files);
}

/// Test that invalid values are rejected at load time.
#[tokio::test]
async fn test_invalid_project_config() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    fs::write(temp.path().join("appsnap.json"), r#"{"log_level": "loud"}"#)
        .expect("Failed to write config");

    let err = EngineConfig::load(Some(temp.path())).await.unwrap_err();
    assert!(matches!(err, CoreError::Config(_)));
}

/// Test loading with no project directory.
#[tokio::test]
async fn test_load_without_project() {
    let result = EngineConfig::load(None).await;
    assert!(result.is_ok());
}
