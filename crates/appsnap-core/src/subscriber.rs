//! Live viewers of an app's file changes.
//!
//! The transport that carries events to a browser lives outside the engine.
//! It plugs in through [`Subscriber`]; delivery is at most once and never
//! acknowledged.

use appsnap_snapshot::ChangeKind;
use async_trait::async_trait;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

/// Contents of a changed file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "encoding", content = "data", rename_all = "snake_case")]
pub enum FileContent {
    /// Valid UTF-8 text.
    Utf8(String),
    /// Anything else, base64 encoded.
    Base64(String),
}

impl FileContent {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        match String::from_utf8(bytes) {
            Ok(text) => FileContent::Utf8(text),
            Err(e) => FileContent::Base64(
                base64::engine::general_purpose::STANDARD.encode(e.into_bytes()),
            ),
        }
    }

    /// Text content, if the file was valid UTF-8.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FileContent::Utf8(text) => Some(text),
            FileContent::Base64(_) => None,
        }
    }

    /// Raw bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            FileContent::Utf8(text) => text.as_bytes().to_vec(),
            FileContent::Base64(data) => base64::engine::general_purpose::STANDARD
                .decode(data)
                .unwrap_or_default(),
        }
    }
}

/// One changed file, as seen by a viewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEvent {
    pub app_id: String,
    /// Relative, forward-slash path.
    pub path: String,
    pub kind: ChangeKind,
    /// Current contents; absent for deletions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<FileContent>,
}

impl FileEvent {
    pub fn changed(
        app_id: impl Into<String>,
        path: impl Into<String>,
        kind: ChangeKind,
        content: FileContent,
    ) -> Self {
        Self {
            app_id: app_id.into(),
            path: path.into(),
            kind,
            content: Some(content),
        }
    }

    pub fn deleted(app_id: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            path: path.into(),
            kind: ChangeKind::Deleted,
            content: None,
        }
    }
}

/// Delivery to a subscriber failed; the subscriber is dropped.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The connection is gone.
    #[error("subscriber disconnected")]
    Disconnected,

    #[error("delivery failed: {0}")]
    Failed(String),
}

/// A live connection interested in one app's file changes.
#[async_trait]
pub trait Subscriber: Send + Sync {
    /// Stable id used to unsubscribe.
    fn id(&self) -> &str;

    /// Deliver one event.
    async fn deliver(&self, event: &FileEvent) -> Result<(), DeliveryError>;
}

/// Subscriber that forwards events into a channel.
///
/// Never waits for the receiver: delivery fails once the receiving side is
/// dropped or its buffer is full.
pub struct ChannelSubscriber {
    id: String,
    tx: mpsc::Sender<FileEvent>,
}

impl ChannelSubscriber {
    /// Create a subscriber and the receiver its events arrive on.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<FileEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            Self {
                id: appsnap_util::Identifier::subscriber(),
                tx,
            },
            rx,
        )
    }
}

#[async_trait]
impl Subscriber for ChannelSubscriber {
    fn id(&self) -> &str {
        &self.id
    }

    async fn deliver(&self, event: &FileEvent) -> Result<(), DeliveryError> {
        self.tx.try_send(event.clone()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                DeliveryError::Failed("receiver is not keeping up".to_string())
            }
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Disconnected,
        })
    }
}
