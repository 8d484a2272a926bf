use crate::{BatchCounters, Category, JobId, RunState};

#[derive(Debug, Clone, PartialEq)]
pub struct BatchViewModel {
    pub run: RunState,
    pub rows: Vec<UrlRowView>,
    pub counters: BatchCounters,
    pub progress: f64,
    pub refused: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlRowView {
    pub job_id: JobId,
    pub url: String,
    pub state: &'static str,
    pub category: Option<Category>,
    pub detail: Option<String>,
}
