use mslearn_core::{
    assemble, validate, Category, Classifier, ExtractedDocument, GeneratorConfig, QualityScore,
    RuleClassifier, Scorer, ScoringWeights, StructuralSignals, WeightedScorer,
};

#[test]
fn learn_shaped_urls_always_validate() {
    let locales = ["en-us", "de-de", "ja-jp"];
    let products = ["windows-server", "powershell", "troubleshoot/windows-server", "azure"];
    let slugs = ["dns-overview", "Get-ADUser", "install-adds?view=ws-2022", "a/b/c/"];
    for locale in locales {
        for product in products {
            for slug in slugs {
                let url = format!("https://learn.microsoft.com/{locale}/{product}/{slug}");
                assert!(validate(&url).valid, "{url}");
            }
        }
    }
}

#[test]
fn malformed_strings_never_validate() {
    for raw in [
        "",
        "   ",
        "learn.microsoft.com",
        "https//learn.microsoft.com/en-us/dns",
        "https://",
        "javascript:alert(1)",
        "https://learn.microsoft.com",
        "http://learn.microsoft.com/en-us/dns",
    ] {
        let result = validate(raw);
        assert!(!result.valid, "{raw:?}");
        assert!(result.reason.is_some(), "{raw:?}");
    }
}

fn documents() -> Vec<ExtractedDocument> {
    vec![
        ExtractedDocument::new("", "", ""),
        ExtractedDocument::new("not a url at all", "?", "   "),
        ExtractedDocument::new(
            "https://learn.microsoft.com/en-us/windows-server/networking/dhcp/dhcp-top",
            "DHCP",
            "A DHCP scope hands out a lease for each ip address.",
        )
        .with_heading(1, "DHCP")
        .with_signals(StructuralSignals {
            code_blocks: 1,
            lists: 0,
            tables: 2,
        }),
    ]
}

#[test]
fn classify_and_score_are_total_and_deterministic() {
    let config = GeneratorConfig::default();
    let classifier = RuleClassifier::new(config.category_rules.clone());
    let scorer = WeightedScorer::new(config.scoring_weights.clone(), config.relevance_keywords);
    for doc in documents() {
        let category = classifier.classify(&doc);
        let score = scorer.score(&doc);
        assert_eq!(category, classifier.classify(&doc));
        assert_eq!(score, scorer.score(&doc));
        assert!(score.value() >= 0.0 && score.value().is_finite());
    }
    assert_eq!(classifier.classify(&documents()[0]), Category::Uncategorized);
    assert_eq!(classifier.classify(&documents()[2]), Category::Dhcp);
}

#[test]
fn score_grows_with_content_richness() {
    let scorer = WeightedScorer::new(ScoringWeights::default(), vec!["dns".to_string()]);
    let thin = ExtractedDocument::new("", "", "short text");
    let richer = ExtractedDocument::new("", "", "short text about dns zones and records")
        .with_heading(2, "Zones");
    let richest = richer.clone().with_signals(StructuralSignals {
        code_blocks: 3,
        lists: 2,
        tables: 1,
    });
    assert!(scorer.score(&thin) < scorer.score(&richer));
    assert!(scorer.score(&richer) < scorer.score(&richest));
}

#[test]
fn recalibrated_weights_change_the_outcome_without_code_changes() {
    let doc = ExtractedDocument::new("", "", "").with_signals(StructuralSignals {
        code_blocks: 5,
        lists: 0,
        tables: 0,
    });
    let default_score = WeightedScorer::new(ScoringWeights::default(), Vec::new()).score(&doc);
    let heavy_code = ScoringWeights {
        per_code_block: 40.0,
        ..ScoringWeights::default()
    };
    let tuned_score = WeightedScorer::new(heavy_code, Vec::new()).score(&doc);
    assert_eq!(default_score.value(), 100.0);
    assert_eq!(tuned_score.value(), 200.0);

    let record = assemble(doc, Category::PowerShell, default_score, 100.0);
    assert!(record.accepted);
    assert_eq!(record.quality_score, QualityScore::new(100.0));
}
