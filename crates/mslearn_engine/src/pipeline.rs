use std::sync::Arc;

use mslearn_core::{
    assemble, Classifier, ExtractedDocument, ExtractionError, GeneratorConfig, RuleClassifier,
    Scorer, TrainingRecord, WeightedScorer,
};

use crate::extract::{Extractor, LearnPageExtractor, RawPage};

/// The pure per-page stages, injected into the orchestrator as trait objects.
#[derive(Clone)]
pub struct Pipeline {
    extractor: Arc<dyn Extractor>,
    classifier: Arc<dyn Classifier>,
    scorer: Arc<dyn Scorer>,
}

impl Pipeline {
    pub fn new(
        extractor: Arc<dyn Extractor>,
        classifier: Arc<dyn Classifier>,
        scorer: Arc<dyn Scorer>,
    ) -> Self {
        Self {
            extractor,
            classifier,
            scorer,
        }
    }

    /// Default stages configured from the rule table, weights and word floor.
    pub fn from_config(config: &GeneratorConfig) -> Self {
        Self::new(
            Arc::new(LearnPageExtractor::new(config.min_word_count)),
            Arc::new(RuleClassifier::new(config.category_rules.clone())),
            Arc::new(WeightedScorer::new(
                config.scoring_weights.clone(),
                config.relevance_keywords.clone(),
            )),
        )
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn Extractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn Classifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_scorer(mut self, scorer: Arc<dyn Scorer>) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn extract(&self, page: &RawPage<'_>) -> Result<ExtractedDocument, ExtractionError> {
        self.extractor.extract(page)
    }

    /// Classifies, scores and assembles. Rejected records are returned too.
    pub fn assess(&self, doc: ExtractedDocument, threshold: f64) -> TrainingRecord {
        let category = self.classifier.classify(&doc);
        let score = self.scorer.score(&doc);
        assemble(doc, category, score, threshold)
    }

    /// Extract then assess in one call.
    pub fn process(
        &self,
        page: &RawPage<'_>,
        threshold: f64,
    ) -> Result<TrainingRecord, ExtractionError> {
        let doc = self.extract(page)?;
        Ok(self.assess(doc, threshold))
    }
}
