use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::view_model::{BatchViewModel, UrlRowView};
use crate::{ExtractionError, SourceUrl, TrainingRecord, ValidationError};

pub type JobId = u64;

/// Why a URL ended in [`ProcessingState::Failed`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum FailureReason {
    Validation(ValidationError),
    /// Transient failures, timeouts included, that outlived the retry budget.
    Network { message: String },
    Http(u16),
    Extraction(ExtractionError),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Validation(reason) => write!(f, "validation error: {reason}"),
            FailureReason::Network { message } => write!(f, "network error: {message}"),
            FailureReason::Http(code) => write!(f, "http error {code}"),
            FailureReason::Extraction(err) => write!(f, "extraction error: {err}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ProcessingState {
    Pending,
    Validating,
    Fetching,
    Extracting,
    Scoring,
    Accepted,
    Rejected,
    Failed(FailureReason),
    Skipped,
}

impl ProcessingState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProcessingState::Accepted
                | ProcessingState::Rejected
                | ProcessingState::Failed(_)
                | ProcessingState::Skipped
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            ProcessingState::Pending => "pending",
            ProcessingState::Validating => "validating",
            ProcessingState::Fetching => "fetching",
            ProcessingState::Extracting => "extracting",
            ProcessingState::Scoring => "scoring",
            ProcessingState::Accepted => "accepted",
            ProcessingState::Rejected => "rejected",
            ProcessingState::Failed(_) => "failed",
            ProcessingState::Skipped => "skipped",
        }
    }

    /// Forward-only transition table; `Failed -> Pending` is the single way back.
    pub fn can_transition_to(&self, next: &ProcessingState) -> bool {
        use ProcessingState::*;
        match (self, next) {
            (Pending, Validating | Skipped) => true,
            (Validating, Fetching | Failed(_) | Skipped) => true,
            (Fetching, Extracting | Failed(_) | Skipped) => true,
            (Extracting, Scoring | Failed(_) | Skipped) => true,
            (Scoring, Accepted | Rejected | Skipped) => true,
            (Failed(_), Pending) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ProcessingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessingState::Failed(reason) => write!(f, "failed ({reason})"),
            other => f.write_str(other.label()),
        }
    }
}

/// `processed` counts URLs that reached Accepted, Rejected or Failed.
/// Skipped URLs are counted only in `skipped`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchCounters {
    pub processed: usize,
    pub succeeded: usize,
    pub rejected: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl BatchCounters {
    pub(crate) fn record_terminal(&mut self, state: &ProcessingState) {
        match state {
            ProcessingState::Accepted => {
                self.processed += 1;
                self.succeeded += 1;
            }
            ProcessingState::Rejected => {
                self.processed += 1;
                self.rejected += 1;
            }
            ProcessingState::Failed(_) => {
                self.processed += 1;
                self.failed += 1;
            }
            ProcessingState::Skipped => self.skipped += 1,
            _ => {}
        }
    }

    pub(crate) fn withdraw_failure(&mut self) {
        self.processed = self.processed.saturating_sub(1);
        self.failed = self.failed.saturating_sub(1);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum RunState {
    #[default]
    Idle,
    Running,
    Stopping,
    Finished,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlEntry {
    pub job_id: JobId,
    pub source: SourceUrl,
    pub state: ProcessingState,
}

/// An input refused before it was enqueued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefusedInput {
    pub url: String,
    pub reason: ValidationError,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ReportReason {
    Failed(FailureReason),
    Rejected { quality_score: f64, threshold: f64 },
    Refused(ValidationError),
    Skipped,
}

impl fmt::Display for ReportReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportReason::Failed(reason) => write!(f, "{reason}"),
            ReportReason::Rejected {
                quality_score,
                threshold,
            } => write!(
                f,
                "quality rejection: score {quality_score:.1} below threshold {threshold:.1}"
            ),
            ReportReason::Refused(reason) => write!(f, "validation error: {reason}"),
            ReportReason::Skipped => write!(f, "skipped by stop request"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureReportEntry {
    pub source_url: String,
    pub reason: ReportReason,
}

/// All state of one batch run. Owned and mutated only through [`crate::update`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BatchSession {
    pub(crate) entries: BTreeMap<JobId, UrlEntry>,
    pub(crate) records: Vec<TrainingRecord>,
    pub(crate) failed: BTreeMap<String, FailureReason>,
    pub(crate) refused: Vec<RefusedInput>,
    pub(crate) counters: BatchCounters,
    pub(crate) run: RunState,
    pub(crate) quality_threshold: f64,
    pub(crate) next_job_id: JobId,
}

impl BatchSession {
    pub fn new(quality_threshold: f64) -> Self {
        Self {
            quality_threshold,
            next_job_id: 1,
            ..Self::default()
        }
    }

    pub fn records(&self) -> &[TrainingRecord] {
        &self.records
    }

    pub fn failed(&self) -> &BTreeMap<String, FailureReason> {
        &self.failed
    }

    pub fn refused(&self) -> &[RefusedInput] {
        &self.refused
    }

    pub fn counters(&self) -> BatchCounters {
        self.counters
    }

    pub fn run_state(&self) -> RunState {
        self.run
    }

    pub fn quality_threshold(&self) -> f64 {
        self.quality_threshold
    }

    pub fn entries(&self) -> impl Iterator<Item = &UrlEntry> {
        self.entries.values()
    }

    pub fn entry(&self, job_id: JobId) -> Option<&UrlEntry> {
        self.entries.get(&job_id)
    }

    pub fn state_of(&self, url: &str) -> Option<&ProcessingState> {
        self.find_by_url(url).map(|entry| &entry.state)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn terminal_count(&self) -> usize {
        self.entries
            .values()
            .filter(|entry| entry.state.is_terminal())
            .count()
    }

    /// Fraction of entries in a terminal state; 1.0 for an empty batch.
    pub fn progress(&self) -> f64 {
        if self.entries.is_empty() {
            return 1.0;
        }
        self.terminal_count() as f64 / self.entries.len() as f64
    }

    pub fn is_complete(&self) -> bool {
        self.terminal_count() == self.entries.len()
    }

    /// Every refused, failed, rejected and skipped URL with its reason, in job order.
    pub fn failure_report(&self) -> Vec<FailureReportEntry> {
        let mut report: Vec<FailureReportEntry> = self
            .refused
            .iter()
            .map(|refused| FailureReportEntry {
                source_url: refused.url.clone(),
                reason: ReportReason::Refused(refused.reason),
            })
            .collect();
        for entry in self.entries.values() {
            let reason = match &entry.state {
                ProcessingState::Failed(reason) => ReportReason::Failed(reason.clone()),
                ProcessingState::Skipped => ReportReason::Skipped,
                ProcessingState::Rejected => {
                    let quality_score = self
                        .records
                        .iter()
                        .rev()
                        .find(|record| record.source_url == entry.source.as_str())
                        .map(|record| record.quality_score.value())
                        .unwrap_or_default();
                    ReportReason::Rejected {
                        quality_score,
                        threshold: self.quality_threshold,
                    }
                }
                _ => continue,
            };
            report.push(FailureReportEntry {
                source_url: entry.source.as_str().to_string(),
                reason,
            });
        }
        report
    }

    /// Read-only snapshot for presentation layers.
    pub fn view(&self) -> BatchViewModel {
        BatchViewModel {
            run: self.run,
            rows: self
                .entries
                .values()
                .map(|entry| UrlRowView {
                    job_id: entry.job_id,
                    url: entry.source.as_str().to_string(),
                    state: entry.state.label(),
                    category: self
                        .records
                        .iter()
                        .rev()
                        .find(|record| record.source_url == entry.source.as_str())
                        .map(|record| record.category)
                        .or(entry.source.category_hint()),
                    detail: match &entry.state {
                        ProcessingState::Failed(reason) => Some(reason.to_string()),
                        _ => None,
                    },
                })
                .collect(),
            counters: self.counters,
            progress: self.progress(),
            refused: self.refused.len(),
        }
    }

    pub(crate) fn find_by_url(&self, url: &str) -> Option<&UrlEntry> {
        let wanted = crate::normalize_url_for_dedupe(url);
        self.entries
            .values()
            .find(|entry| entry.source.normalized() == wanted)
    }

    pub(crate) fn allocate_job_id(&mut self) -> JobId {
        let id = self.next_job_id.max(1);
        self.next_job_id = id + 1;
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_only_move_forward() {
        use ProcessingState::*;
        let failed = Failed(FailureReason::Http(404));
        assert!(Pending.can_transition_to(&Validating));
        assert!(Validating.can_transition_to(&failed));
        assert!(Scoring.can_transition_to(&Rejected));
        assert!(failed.can_transition_to(&Pending));
        assert!(!Scoring.can_transition_to(&failed));
        assert!(!Accepted.can_transition_to(&Pending));
        assert!(!Fetching.can_transition_to(&Validating));
        assert!(!Skipped.can_transition_to(&Pending));
    }

    #[test]
    fn empty_session_reports_full_progress() {
        let session = BatchSession::new(100.0);
        assert_eq!(session.progress(), 1.0);
        assert!(session.is_complete());
        assert!(session.failure_report().is_empty());
    }
}
