use mslearn_core::{Category, ExtractionError, GeneratorConfig, Heading, StructuralSignals};
use mslearn_engine::{Extractor, LearnPageExtractor, Pipeline, RawPage};
use pretty_assertions::assert_eq;

const DNS_URL: &str = "https://learn.microsoft.com/en-us/windows-server/networking/dns/dns-overview";

const PROSE: &str = "The DNS Server role in Windows Server resolves names for clients on the network. \
    Zones store resource records and secondary servers copy them through zone transfers. \
    Administrators manage zones with the DNS Manager console \
    or with PowerShell cmdlets, and conditional forwarders send queries for other namespaces to the \
    servers that are authoritative for them.";

fn learn_page() -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en-us">
<head><title>DNS overview | Microsoft Learn</title><script>var x = "script text";</script></head>
<body>
  <header class="uhf-header"><a href="/">Microsoft</a> Skip to main content</header>
  <nav><ul><li>Table of contents</li><li>Windows Server</li></ul></nav>
  <main id="main" role="main">
    <div class="breadcrumb"><a>Learn</a> / <a>Windows Server</a></div>
    <h1>Domain Name System (DNS)</h1>
    <div class="page-metadata">Article 05/09/2024 3 contributors</div>
    <p>In this article</p>
    <p>{PROSE}</p>
    <h2>Install the role</h2>
    <pre><code>Install-WindowsFeature -Name DNS -IncludeManagementTools</code></pre>
    <ul><li>Primary zones</li><li>Secondary zones</li></ul>
    <h2>Zone types</h2>
    <h3>Stub zones</h3>
    <table><tr><th>Type</th><th>Use</th></tr><tr><td>Stub</td><td>Delegation</td></tr></table>
    <pre><code>Add-DnsServerPrimaryZone -Name "contoso.com" -ReplicationScope "Forest"</code></pre>
    <div class="feedback-section">Was this page helpful? Yes No</div>
  </main>
  <footer class="uhf-footer">Privacy Terms of use</footer>
</body>
</html>"#
    )
}

fn page(html: &str) -> RawPage<'_> {
    RawPage {
        url: DNS_URL,
        bytes: html.as_bytes(),
        content_type: Some("text/html; charset=utf-8"),
    }
}

#[test]
fn learn_page_main_region_is_extracted() {
    let html = learn_page();
    let doc = LearnPageExtractor::new(20).extract(&page(&html)).unwrap();

    assert_eq!(doc.title, "Domain Name System (DNS)");
    assert_eq!(doc.source_url, DNS_URL);
    assert!(doc.body_text.starts_with("Domain Name System (DNS) The DNS Server role"));
    for absent in [
        "Skip to main content",
        "Table of contents",
        "In this article",
        "Was this page helpful",
        "contributors",
        "Privacy",
        "script text",
        "Learn / Windows Server",
    ] {
        assert!(!doc.body_text.contains(absent), "{absent:?} leaked into body");
    }
    assert_eq!(
        doc.heading_structure,
        vec![
            Heading {
                level: 1,
                text: "Domain Name System (DNS)".to_string()
            },
            Heading {
                level: 2,
                text: "Install the role".to_string()
            },
            Heading {
                level: 2,
                text: "Zone types".to_string()
            },
            Heading {
                level: 3,
                text: "Stub zones".to_string()
            },
        ]
    );
    assert_eq!(
        doc.signals,
        StructuralSignals {
            code_blocks: 2,
            lists: 1,
            tables: 1,
        }
    );
    assert_eq!(
        doc.code_examples,
        vec![
            "Install-WindowsFeature -Name DNS -IncludeManagementTools".to_string(),
            r#"Add-DnsServerPrimaryZone -Name "contoso.com" -ReplicationScope "Forest""#.to_string(),
        ]
    );
    assert_eq!(doc.word_count as usize, doc.body_text.split_whitespace().count());
}

#[test]
fn extraction_is_deterministic() {
    let html = learn_page();
    let extractor = LearnPageExtractor::new(20);
    let first = extractor.extract(&page(&html)).unwrap();
    let second = extractor.extract(&page(&html)).unwrap();
    assert_eq!(first, second);
}

#[test]
fn thin_pages_fail_with_empty_content() {
    let html = "<html><body><main id=\"main\"><h1>Stub</h1><p>Coming soon.</p></main></body></html>";
    let err = LearnPageExtractor::default().extract(&page(html)).unwrap_err();
    assert_eq!(
        err,
        ExtractionError::EmptyContent {
            word_count: 3,
            minimum: 50
        }
    );
}

#[test]
fn unparseable_bodies_fail_with_malformed_markup() {
    let extractor = LearnPageExtractor::new(1);
    for body in ["", "just some plain text without any tags"] {
        let err = extractor.extract(&page(body)).unwrap_err();
        assert!(matches!(err, ExtractionError::MalformedMarkup(_)), "{body:?}: {err:?}");
    }
    let invalid_utf8 = RawPage {
        url: DNS_URL,
        bytes: b"<p>\xff\xfe</p>",
        content_type: Some("text/html; charset=utf-8"),
    };
    assert!(matches!(
        extractor.extract(&invalid_utf8),
        Err(ExtractionError::MalformedMarkup(_))
    ));
}

#[test]
fn main_selector_beats_article_and_body_is_the_fallback() {
    let both = "<body><article><p>article text</p></article>\
                <main id=\"main\"><p>main text</p></main></body>";
    let doc = LearnPageExtractor::new(1).extract(&page(both)).unwrap();
    assert_eq!(doc.body_text, "main text");

    let bare = "<html><head><title>Only a title</title></head><body><p>loose body text</p></body></html>";
    let doc = LearnPageExtractor::new(1).extract(&page(bare)).unwrap();
    assert_eq!(doc.body_text, "loose body text");
    assert_eq!(doc.title, "Only a title");
}

#[test]
fn at_most_five_code_examples_are_kept() {
    let blocks: String = (1..=7)
        .map(|i| format!("<pre><code>Get-Item {i}</code></pre>"))
        .collect();
    let html = format!("<body><article>{blocks}</article></body>");
    let doc = LearnPageExtractor::new(1).extract(&page(&html)).unwrap();
    assert_eq!(doc.signals.code_blocks, 7);
    assert_eq!(doc.code_examples.len(), 5);
    assert_eq!(doc.code_examples[4], "Get-Item 5");
}

#[test]
fn pipeline_is_idempotent_except_for_timestamp() {
    let config = GeneratorConfig {
        min_word_count: 20,
        ..GeneratorConfig::default()
    };
    let pipeline = Pipeline::from_config(&config);
    let html = learn_page();

    let first = pipeline.process(&page(&html), config.quality_threshold).unwrap();
    let second = pipeline.process(&page(&html), config.quality_threshold).unwrap();

    assert!(first.same_content(&second));
    assert_eq!(first.category, Category::DnsAdministration);
    assert_eq!(first.source_url, DNS_URL);
    assert!(first.quality_score.value() > 0.0);
    assert_eq!(first.accepted, first.quality_score.meets(config.quality_threshold));
}
