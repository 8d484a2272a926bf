use serde::Serialize;

use crate::{BatchCounters, JobId, ProcessingState};

/// Emitted once per state transition.
///
/// Self-contained: consumers never need to read back into the session to render it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressEvent {
    pub job_id: JobId,
    pub url: String,
    pub old_state: ProcessingState,
    pub new_state: ProcessingState,
    /// Terminal entries over total entries, in `0.0..=1.0`.
    pub progress: f64,
    pub message: String,
    pub counters: BatchCounters,
}
