//! Testing utilities, fixtures, and mocks for appsnap.
//!
//! - **Fixtures**: temporary app directories with a known file tree
//! - **Mocks**: recording and failing subscribers, a scripted content generator
//! - **Assertions**: helpers for change sets and files on disk
//!
//! # Example Usage
//!
//! ```rust,ignore
//! use appsnap_test_utils::{RecordingSubscriber, TestApp};
//!
//! #[tokio::test]
//! async fn test_rewind_notifies() {
//!     let app = TestApp::new().with_file("a.txt", "1").build();
//!     let engine = app.engine().await;
//!     let viewer = RecordingSubscriber::new();
//!     engine.subscribe(app.id(), viewer.handle()).await.unwrap();
//!     // ...
//! }
//! ```

pub mod assertions;
pub mod fixtures;
pub mod mocks;

// Re-export commonly used items
pub use fixtures::{BuiltTestApp, TestApp};
pub use mocks::{FailingSubscriber, RecordingSubscriber, ScriptedGenerator};
