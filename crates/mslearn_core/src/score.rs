use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ExtractedDocument;

/// Non-negative, unbounded quality measure. Higher is richer content.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QualityScore(f64);

impl QualityScore {
    /// Clamps negative and non-finite inputs to zero.
    pub fn new(value: f64) -> Self {
        if value.is_finite() && value > 0.0 {
            Self(value)
        } else {
            Self(0.0)
        }
    }

    pub fn value(self) -> f64 {
        self.0
    }

    /// Inclusive: a score equal to the threshold passes.
    pub fn meets(self, threshold: f64) -> bool {
        self.0 >= threshold
    }
}

impl fmt::Display for QualityScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}", self.0)
    }
}

/// Weight table for [`WeightedScorer`]. Every weight must be finite and non-negative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    /// Words that earn one length point.
    pub words_per_point: f64,
    /// Cap on the length term.
    pub max_length_points: f64,
    pub per_heading: f64,
    pub per_heading_level: f64,
    pub per_code_block: f64,
    pub per_list: f64,
    pub per_table: f64,
    pub per_keyword: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            words_per_point: 15.0,
            max_length_points: 50.0,
            per_heading: 4.0,
            per_heading_level: 6.0,
            per_code_block: 20.0,
            per_list: 3.0,
            per_table: 5.0,
            per_keyword: 10.0,
        }
    }
}

impl ScoringWeights {
    /// Name and value of each weight, for validation and reporting.
    pub fn entries(&self) -> [(&'static str, f64); 8] {
        [
            ("words_per_point", self.words_per_point),
            ("max_length_points", self.max_length_points),
            ("per_heading", self.per_heading),
            ("per_heading_level", self.per_heading_level),
            ("per_code_block", self.per_code_block),
            ("per_list", self.per_list),
            ("per_table", self.per_table),
            ("per_keyword", self.per_keyword),
        ]
    }
}

/// Topic phrases whose presence raises the keyword-density term.
pub fn default_relevance_keywords() -> Vec<String> {
    [
        "windows server",
        "active directory",
        "powershell",
        "dns",
        "dhcp",
        "group policy",
        "azure",
        "microsoft",
        "cmdlet",
        "administrator",
        "domain controller",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

pub trait Scorer: Send + Sync {
    fn score(&self, doc: &ExtractedDocument) -> QualityScore;
}

#[derive(Debug, Clone)]
pub struct WeightedScorer {
    weights: ScoringWeights,
    keywords: Vec<String>,
}

impl WeightedScorer {
    pub fn new(weights: ScoringWeights, keywords: Vec<String>) -> Self {
        let keywords = keywords
            .into_iter()
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        Self { weights, keywords }
    }

    pub fn weights(&self) -> &ScoringWeights {
        &self.weights
    }

    fn length_points(&self, word_count: u32) -> f64 {
        let w = &self.weights;
        if w.words_per_point <= 0.0 || !w.words_per_point.is_finite() {
            return 0.0;
        }
        (f64::from(word_count) / w.words_per_point).min(w.max_length_points)
    }

    fn matched_keywords(&self, doc: &ExtractedDocument) -> usize {
        if self.keywords.is_empty() {
            return 0;
        }
        let text = doc.searchable_text();
        self.keywords.iter().filter(|k| text.contains(k.as_str())).count()
    }
}

impl Default for WeightedScorer {
    fn default() -> Self {
        Self::new(ScoringWeights::default(), default_relevance_keywords())
    }
}

impl Scorer for WeightedScorer {
    fn score(&self, doc: &ExtractedDocument) -> QualityScore {
        let w = &self.weights;
        let signals = doc.signals;
        let total = self.length_points(doc.word_count)
            + doc.heading_structure.len() as f64 * w.per_heading
            + f64::from(doc.distinct_heading_levels()) * w.per_heading_level
            + f64::from(signals.code_blocks) * w.per_code_block
            + f64::from(signals.lists) * w.per_list
            + f64::from(signals.tables) * w.per_table
            + self.matched_keywords(doc) as f64 * w.per_keyword;
        QualityScore::new(total)
    }
}
