//! Progress events emitted during a dispatch run.

use crate::config::DispatchMode;

/// Events emitted while a run is in progress.
///
/// The dispatcher ignores send failures, so a dropped receiver never
/// affects a run.
#[derive(Debug, Clone)]
pub enum DispatchEvent {
    /// The catalog was listed and dispatch is starting.
    Started { total: usize, mode: DispatchMode },
    /// One outcome arrived at the aggregation point (individual mode).
    ObjectCompleted { identifier: String, failed: bool },
    /// A whole group finished (batch mode). `collapsed` marks a group
    /// that failed wholesale and produced one synthetic outcome.
    GroupCompleted {
        start: usize,
        size: usize,
        collapsed: bool,
    },
    /// Cancellation was observed; no further work will be admitted.
    Cancelled,
}
