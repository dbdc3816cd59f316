//! Core of the app snapshot & synchronization engine.
//!
//! This crate coordinates per-app snapshot histories with live viewers:
//! - Configuration management (multi-source, JSONC support)
//! - App model and lifecycle (create, open, rename, delete)
//! - App session registry with per-app exclusive sections
//! - Change notification with ordered fan-out to subscribers
//! - Content generator adapter with bounded retry
//! - The [`Engine`] facade tying it together

pub mod app;
pub mod config;
pub mod engine;
pub mod error;
pub mod generator;
pub mod notifier;
pub mod registry;
pub mod retry;
pub mod subscriber;

pub use app::App;
pub use config::EngineConfig;
pub use engine::{Engine, TaskOutcome};
pub use error::{ConfigError, CoreError, CoreResult};
pub use generator::{
    apply_items, generate_with_retry, AppliedItems, CommandOutcome, ContentGenerator,
    GeneratorError, ProjectItem,
};
pub use notifier::{collect_events, FileReadFailure, NotificationReport};
pub use registry::{AppHandle, AppRegistry};
pub use retry::{RetryHelper, RetryPolicy};
pub use subscriber::{ChannelSubscriber, DeliveryError, FileContent, FileEvent, Subscriber};

pub use appsnap_snapshot::{
    ChangeKind, ChangeSet, RecoveryOutcome, SetAsideEntry, SnapshotError, SnapshotId,
    SnapshotSummary,
};
