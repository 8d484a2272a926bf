use serde::{Deserialize, Serialize};
use url::Url;

/// One heading of the main content region, in document order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heading {
    /// 1 for `h1` through 6 for `h6`.
    pub level: u8,
    pub text: String,
}

/// Counts of structural elements used as quality proxies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuralSignals {
    pub code_blocks: u32,
    pub lists: u32,
    pub tables: u32,
}

/// Normalized main content of one documentation page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedDocument {
    pub source_url: String,
    pub title: String,
    pub body_text: String,
    pub word_count: u32,
    pub heading_structure: Vec<Heading>,
    pub signals: StructuralSignals,
    /// At most five code samples, in document order.
    pub code_examples: Vec<String>,
}

impl ExtractedDocument {
    /// Builds a document with `word_count` derived from `body_text`.
    pub fn new(
        source_url: impl Into<String>,
        title: impl Into<String>,
        body_text: impl Into<String>,
    ) -> Self {
        let body_text = body_text.into();
        Self {
            source_url: source_url.into(),
            title: title.into(),
            word_count: count_words(&body_text),
            body_text,
            heading_structure: Vec::new(),
            signals: StructuralSignals::default(),
            code_examples: Vec::new(),
        }
    }

    pub fn with_heading(mut self, level: u8, text: impl Into<String>) -> Self {
        self.heading_structure.push(Heading {
            level,
            text: text.into(),
        });
        self
    }

    pub fn with_signals(mut self, signals: StructuralSignals) -> Self {
        self.signals = signals;
        self
    }

    /// Number of distinct heading levels present (0 when there are no headings).
    pub fn distinct_heading_levels(&self) -> u32 {
        let mut seen = [false; 7];
        for heading in &self.heading_structure {
            seen[usize::from(heading.level.min(6))] = true;
        }
        seen.iter().filter(|present| **present).count() as u32
    }

    /// Lowercased URL path, or the whole lowercased URL if it does not parse.
    pub fn url_path(&self) -> String {
        match Url::parse(&self.source_url) {
            Ok(url) => url.path().to_ascii_lowercase(),
            Err(_) => self.source_url.to_ascii_lowercase(),
        }
    }

    /// Title and body lowercased and joined, for keyword matching.
    pub fn searchable_text(&self) -> String {
        let mut text = String::with_capacity(self.title.len() + self.body_text.len() + 1);
        text.push_str(&self.title.to_lowercase());
        text.push(' ');
        text.push_str(&self.body_text.to_lowercase());
        text
    }
}

/// Whitespace word count, the unit for the minimum-content floor and length scoring.
pub fn count_words(text: &str) -> u32 {
    text.split_whitespace().count() as u32
}

/// Why a fetched page could not be turned into an [`ExtractedDocument`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum ExtractionError {
    #[error("content too thin: {word_count} words, minimum {minimum}")]
    EmptyContent { word_count: u32, minimum: u32 },
    #[error("malformed markup: {0}")]
    MalformedMarkup(String),
}
