use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{normalize_url_for_dedupe, Category, ExtractedDocument, QualityScore};

/// One unit of generator output, accepted or rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingRecord {
    pub record_id: String,
    pub source_url: String,
    pub title: String,
    pub body_text: String,
    pub category: Category,
    pub quality_score: QualityScore,
    pub accepted: bool,
    pub word_count: u32,
    #[serde(default)]
    pub code_examples: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

impl TrainingRecord {
    /// Equality ignoring `generated_at`.
    pub fn same_content(&self, other: &TrainingRecord) -> bool {
        let mut other = other.clone();
        other.generated_at = self.generated_at;
        *self == other
    }
}

/// Builds a record stamped with the current time. `accepted` is `score >= threshold`.
pub fn assemble(
    doc: ExtractedDocument,
    category: Category,
    score: QualityScore,
    threshold: f64,
) -> TrainingRecord {
    assemble_at(doc, category, score, threshold, Utc::now())
}

pub fn assemble_at(
    doc: ExtractedDocument,
    category: Category,
    score: QualityScore,
    threshold: f64,
    generated_at: DateTime<Utc>,
) -> TrainingRecord {
    TrainingRecord {
        record_id: record_id(&doc.source_url),
        source_url: doc.source_url,
        title: doc.title,
        body_text: doc.body_text,
        category,
        quality_score: score,
        accepted: score.meets(threshold),
        word_count: doc.word_count,
        code_examples: doc.code_examples,
        generated_at,
    }
}

/// Stable 8-hex-digit identifier derived from the normalized URL.
pub fn record_id(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_url_for_dedupe(url).as_bytes());
    let digest = hasher.finalize();
    let mut hex = String::with_capacity(8);
    for byte in digest.iter().take(4) {
        use std::fmt::Write;
        let _ = write!(&mut hex, "{byte:02x}");
    }
    hex
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc() -> ExtractedDocument {
        ExtractedDocument::new(
            "https://learn.microsoft.com/en-us/windows-server/networking/dns/dns-overview",
            "DNS overview",
            "Domain Name System overview",
        )
    }

    #[test]
    fn score_equal_to_threshold_is_accepted() {
        let record = assemble(doc(), Category::DnsAdministration, QualityScore::new(100.0), 100.0);
        assert!(record.accepted);
        let record = assemble(doc(), Category::DnsAdministration, QualityScore::new(40.0), 100.0);
        assert!(!record.accepted);
        assert_eq!(record.title, "DNS overview");
    }

    #[test]
    fn record_id_is_stable_across_url_spellings() {
        let a = record_id("https://learn.microsoft.com/en-us/dns/");
        let b = record_id("https://LEARN.microsoft.com/en-us/DNS#top");
        assert_eq!(a, b);
        assert_eq!(a.len(), 8);
    }

    #[test]
    fn same_content_ignores_timestamp() {
        let earlier = assemble_at(
            doc(),
            Category::DnsAdministration,
            QualityScore::new(120.0),
            100.0,
            DateTime::from_timestamp(0, 0).unwrap(),
        );
        let later = assemble(doc(), Category::DnsAdministration, QualityScore::new(120.0), 100.0);
        assert!(earlier.same_content(&later));
        assert_ne!(earlier, later);
    }
}
