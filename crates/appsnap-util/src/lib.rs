//! Shared utilities for appsnap.
//!
//! This crate provides common utilities used across the appsnap workspace:
//! - ULID-based identifier generation for apps and subscribers
//! - Logging setup with tracing
//! - Path utilities (normalization, forward-slash relative paths)
//! - Per-app operation timing scaled to what each operation costs

pub mod id;
pub mod log;
pub mod path;
pub mod timing;

pub use id::{IdPrefix, Identifier};
pub use timing::{OpCost, TimingGuard};
