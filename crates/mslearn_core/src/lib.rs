//! Generator core: pure pipeline stages, batch state machine and view-model helpers.
mod category;
mod classify;
mod config;
mod document;
mod effect;
mod event;
mod msg;
mod record;
mod score;
mod state;
mod update;
mod validate;
mod view_model;

pub use category::Category;
pub use classify::{default_rules, CategoryRule, Classifier, RuleClassifier, GENERAL_SYSTEM_PROMPT};
pub use config::{ConfigError, GeneratorConfig};
pub use document::{count_words, ExtractedDocument, ExtractionError, Heading, StructuralSignals};
pub use effect::Effect;
pub use event::ProgressEvent;
pub use msg::Msg;
pub use record::{assemble, assemble_at, record_id, TrainingRecord};
pub use score::{default_relevance_keywords, QualityScore, Scorer, ScoringWeights, WeightedScorer};
pub use state::{
    BatchCounters, BatchSession, FailureReason, FailureReportEntry, JobId, ProcessingState,
    RefusedInput, ReportReason, RunState, UrlEntry,
};
pub use update::update;
pub use validate::{
    is_syntactically_valid, normalize_url_for_dedupe, validate, SourceUrl, Validation,
    ValidationError, DOCS_HOST,
};
pub use view_model::{BatchViewModel, UrlRowView};
