//! Snapshot history for app working directories.
//!
//! Each app directory is versioned as a linear chain of immutable,
//! content-addressed snapshots:
//! - Record the entire tree as a new snapshot
//! - Rewind or replay the tree to any recorded snapshot
//! - Compute change sets between snapshots
//! - Set aside uncommitted work before a checkout and recover interrupted ones
//!
//! # Example
//!
//! ```no_run
//! use appsnap_snapshot::{SnapshotStore, StoreConfig};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = SnapshotStore::new("/apps/app_01", StoreConfig::default());
//! let initial = store.ensure_initialized()?;
//!
//! // ... the generator edits files ...
//! let next = store.create_snapshot("Add landing page")?;
//!
//! // Rewind; the change set says which files the viewer must refresh.
//! let changes = store.checkout_snapshot(initial.as_str())?;
//! for (path, kind) in changes.iter() {
//!     println!("{kind} {path}");
//! }
//! # let _ = next;
//! # Ok(())
//! # }
//! ```

mod changes;
mod diff;
mod error;
mod guard;
mod snapshot;
mod store;

pub use changes::{ChangeKind, ChangeSet};
pub use diff::unified_diff;
pub use error::{SnapshotError, SnapshotResult};
pub use guard::RecoveryOutcome;
pub use snapshot::{SetAsideEntry, SnapshotId, SnapshotSummary};
pub use store::{SnapshotStore, StoreConfig, INITIAL_MESSAGE};
