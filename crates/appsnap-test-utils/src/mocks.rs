//! Test doubles for the engine's external seams.

use appsnap_core::{
    ContentGenerator, DeliveryError, FileEvent, GeneratorError, ProjectItem, Subscriber,
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// A subscriber that records every event it receives.
///
/// # Example
///
/// ```rust
/// use appsnap_test_utils::mocks::RecordingSubscriber;
///
/// let viewer = RecordingSubscriber::new();
/// assert!(viewer.events().is_empty());
/// ```
#[derive(Clone)]
pub struct RecordingSubscriber {
    id: String,
    events: Arc<Mutex<Vec<FileEvent>>>,
}

impl RecordingSubscriber {
    pub fn new() -> Self {
        Self::with_id("sub_recording")
    }

    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A shared handle to register with the engine. Events delivered to the
    /// handle show up on `self`.
    pub fn handle(&self) -> Arc<dyn Subscriber> {
        Arc::new(self.clone())
    }

    /// Everything received so far, in delivery order.
    pub fn events(&self) -> Vec<FileEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Paths received so far, in delivery order.
    pub fn paths(&self) -> Vec<String> {
        self.events().into_iter().map(|e| e.path).collect()
    }

    /// The last event received for `path`.
    pub fn last_for(&self, path: &str) -> Option<FileEvent> {
        self.events().into_iter().rev().find(|e| e.path == path)
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

impl Default for RecordingSubscriber {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Subscriber for RecordingSubscriber {
    fn id(&self) -> &str {
        &self.id
    }

    async fn deliver(&self, event: &FileEvent) -> Result<(), DeliveryError> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// A subscriber whose every delivery fails.
pub struct FailingSubscriber {
    id: String,
    attempts: AtomicUsize,
}

impl FailingSubscriber {
    pub fn new() -> Self {
        Self {
            id: "sub_failing".to_string(),
            attempts: AtomicUsize::new(0),
        }
    }

    /// Deliveries attempted so far.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl Default for FailingSubscriber {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Subscriber for FailingSubscriber {
    fn id(&self) -> &str {
        &self.id
    }

    async fn deliver(&self, _event: &FileEvent) -> Result<(), DeliveryError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(DeliveryError::Disconnected)
    }
}

/// A content generator that replays a fixed script of responses.
///
/// Once the script runs out every call fails with a fatal error.
pub struct ScriptedGenerator {
    script: Mutex<VecDeque<Result<Vec<ProjectItem>, GeneratorError>>>,
    tasks: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Next call returns `items`.
    pub fn then_items(self, items: Vec<ProjectItem>) -> Self {
        self.script.lock().unwrap().push_back(Ok(items));
        self
    }

    /// Next call fails with a retryable error.
    pub fn then_transient(self, message: &str) -> Self {
        self.script
            .lock()
            .unwrap()
            .push_back(Err(GeneratorError::Transient(message.to_string())));
        self
    }

    /// Next call fails permanently.
    pub fn then_fatal(self, message: &str) -> Self {
        self.script
            .lock()
            .unwrap()
            .push_back(Err(GeneratorError::Fatal(message.to_string())));
        self
    }

    /// Tasks received so far.
    pub fn tasks(&self) -> Vec<String> {
        self.tasks.lock().unwrap().clone()
    }
}

impl Default for ScriptedGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContentGenerator for ScriptedGenerator {
    async fn generate(&self, task: &str) -> Result<Vec<ProjectItem>, GeneratorError> {
        self.tasks.lock().unwrap().push(task.to_string());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(GeneratorError::Fatal("script exhausted".to_string())))
    }
}
