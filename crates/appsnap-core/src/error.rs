//! Error types for the core crate.

use thiserror::Error;

/// Core error types.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Snapshot store error.
    #[error("snapshot error: {0}")]
    Snapshot(#[from] appsnap_snapshot::SnapshotError),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// App is not registered with the engine.
    #[error("app not found: {0}")]
    AppNotFound(String),

    /// The app's exclusive section stayed busy for longer than allowed.
    #[error("app {app_id} busy: gave up after {waited_ms}ms")]
    ExclusiveSectionTimeout { app_id: String, waited_ms: u64 },

    /// Content generator failed.
    #[error("generator error: {0}")]
    Generator(String),

    /// A generated item could not be applied to the working directory.
    #[error("invalid project item: {0}")]
    InvalidItem(String),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Blocking task panicked or was cancelled.
    #[error("background task failed: {0}")]
    TaskJoin(String),
}

impl CoreError {
    /// Whether the same call may succeed if simply tried again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::ExclusiveSectionTimeout { .. })
    }

    /// Short, stable name of the error kind for structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            CoreError::Snapshot(e) => e.kind(),
            CoreError::Config(_) => "config",
            CoreError::AppNotFound(_) => "app_not_found",
            CoreError::ExclusiveSectionTimeout { .. } => "exclusive_section_timeout",
            CoreError::Generator(_) => "generator",
            CoreError::InvalidItem(_) => "invalid_item",
            CoreError::Io(_) => "io",
            CoreError::Json(_) => "json",
            CoreError::TaskJoin(_) => "task_join",
        }
    }
}

impl From<tokio::task::JoinError> for CoreError {
    fn from(e: tokio::task::JoinError) -> Self {
        CoreError::TaskJoin(e.to_string())
    }
}

/// Configuration-specific errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Invalid JSON/JSONC syntax.
    #[error("invalid config at {path}: {message}")]
    InvalidJson { path: String, message: String },

    /// Config validation failed.
    #[error("config validation failed: {message}")]
    Validation { message: String },

    /// Invalid path (e.g., could not determine the apps directory).
    #[error("invalid path: {0}")]
    InvalidPath(String),
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
