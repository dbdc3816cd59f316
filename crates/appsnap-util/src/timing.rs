//! Per-app operation timing.
//!
//! Every engine operation holds a [`TimingGuard`] while it runs. When the
//! guard drops it logs the app, the operation and the elapsed time. The log
//! level depends on what the operation costs: rewriting a working tree may
//! take seconds before it counts as slow, a history lookup may not.
//!
//! ```rust,ignore
//! use appsnap_util::timing::TimingGuard;
//!
//! let _timing = TimingGuard::new("app_01h...", "checkout");
//! // ... replace the working tree ...
//! ```

use std::time::{Duration, Instant};
use tracing::{debug, info, warn, Level};

/// How expensive an operation is expected to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCost {
    /// Reads history, diffs or single files.
    Lookup,
    /// Writes the working tree or the snapshot history.
    TreeWrite,
    /// Waits on an external generator before writing.
    Generation,
}

impl OpCost {
    /// Classify an engine operation by name. Unknown names count as lookups.
    pub fn of(op: &str) -> Self {
        match op {
            "register" | "ensure_initialized" | "commit" | "checkout" | "set_aside_restore"
            | "delete" | "notify" => OpCost::TreeWrite,
            "run_task" => OpCost::Generation,
            _ => OpCost::Lookup,
        }
    }

    /// `(info, warn)` thresholds in milliseconds.
    fn thresholds_ms(self) -> (u64, u64) {
        match self {
            OpCost::Lookup => (100, 1_000),
            OpCost::TreeWrite => (500, 5_000),
            OpCost::Generation => (5_000, 120_000),
        }
    }
}

/// Logs the duration of one operation on one app when dropped.
pub struct TimingGuard {
    app_id: String,
    op: &'static str,
    start: Instant,
    info_threshold_ms: u64,
    warn_threshold_ms: u64,
}

impl TimingGuard {
    /// Start timing `op` on `app_id`, with thresholds from [`OpCost::of`].
    pub fn new(app_id: impl Into<String>, op: &'static str) -> Self {
        let app_id = app_id.into();
        let (info_threshold_ms, warn_threshold_ms) = OpCost::of(op).thresholds_ms();
        debug!(app_id = %app_id, op, "Starting operation");
        Self {
            app_id,
            op,
            start: Instant::now(),
            info_threshold_ms,
            warn_threshold_ms,
        }
    }

    /// Override the info and warn thresholds (milliseconds).
    pub fn with_thresholds(mut self, info_ms: u64, warn_ms: u64) -> Self {
        self.info_threshold_ms = info_ms;
        self.warn_threshold_ms = warn_ms.max(info_ms);
        self
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Level a completion after `elapsed_ms` is logged at.
    fn level_for(&self, elapsed_ms: u64) -> Level {
        if elapsed_ms >= self.warn_threshold_ms {
            Level::WARN
        } else if elapsed_ms >= self.info_threshold_ms {
            Level::INFO
        } else {
            Level::DEBUG
        }
    }
}

impl Drop for TimingGuard {
    fn drop(&mut self) {
        let duration_ms = u64::try_from(self.start.elapsed().as_millis()).unwrap_or(u64::MAX);
        let duration = format_duration(duration_ms);
        let (app_id, op) = (&self.app_id, self.op);

        match self.level_for(duration_ms) {
            Level::WARN => warn!(app_id = %app_id, op, duration_ms, duration = %duration, "Slow operation"),
            Level::INFO => info!(app_id = %app_id, op, duration_ms, duration = %duration, "Operation completed"),
            _ => debug!(app_id = %app_id, op, duration_ms, "Operation completed"),
        }
    }
}

fn format_duration(ms: u64) -> String {
    match ms {
        0..=999 => format!("{ms}ms"),
        1_000..=59_999 => format!("{:.2}s", ms as f64 / 1000.0),
        _ => format!("{}m {:.1}s", ms / 60_000, (ms % 60_000) as f64 / 1000.0),
    }
}
