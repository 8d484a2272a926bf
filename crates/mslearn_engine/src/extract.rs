use ego_tree::NodeRef;
use mslearn_core::{count_words, ExtractedDocument, ExtractionError, Heading, StructuralSignals};
use regex::Regex;
use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};

use crate::decode::decode_html;

/// Main-region candidates, most specific first. `body` is the last resort.
const CONTENT_SELECTORS: &[&str] = &[
    r#"main[role="main"]"#,
    "main#main",
    r#"[data-bi-name="content"]"#,
    ".content",
    "#content",
    "article",
    ".mainContent",
];

/// Subtrees that never contribute text, headings or signals.
const EXCLUDED_SELECTORS: &[&str] = &[
    "head",
    "nav",
    "header",
    "footer",
    "aside",
    "script",
    "style",
    "noscript",
    "template",
    r#"[data-bi-name="navigation"]"#,
    r#"[data-bi-name="breadcrumb"]"#,
    r#"[data-bi-name="recommendation"]"#,
    ".breadcrumb",
    ".recommendation-list",
    ".page-metadata",
    ".feedback-section",
    ".page-actions",
    ".content-footer",
    ".uhf-header",
    ".uhf-footer",
    ".banner",
    ".alert",
    ".notification",
];

const CODE_EXAMPLE_SELECTOR: &str = "pre code, .code-snippet";
const MAX_CODE_EXAMPLES: usize = 5;

const BOILERPLATE_PATTERN: &str = r"(?i)skip to main content|table of contents|in this article|was this page helpful\?|feedback";

/// A fetched page as handed to the extractor.
#[derive(Debug, Clone, Copy)]
pub struct RawPage<'a> {
    pub url: &'a str,
    pub bytes: &'a [u8],
    pub content_type: Option<&'a str>,
}

pub trait Extractor: Send + Sync {
    fn extract(&self, page: &RawPage<'_>) -> Result<ExtractedDocument, ExtractionError>;
}

/// Extractor tuned for the documentation site's page layout.
#[derive(Debug, Clone)]
pub struct LearnPageExtractor {
    min_words: u32,
    boilerplate: Option<Regex>,
}

impl LearnPageExtractor {
    pub fn new(min_words: u32) -> Self {
        Self {
            min_words,
            boilerplate: Regex::new(BOILERPLATE_PATTERN).ok(),
        }
    }

    pub fn min_words(&self) -> u32 {
        self.min_words
    }

    fn clean_text(&self, raw: &str) -> String {
        let stripped = match &self.boilerplate {
            Some(re) => re.replace_all(raw, " "),
            None => raw.into(),
        };
        normalize_whitespace(&stripped)
    }
}

impl Default for LearnPageExtractor {
    fn default() -> Self {
        Self::new(50)
    }
}

impl Extractor for LearnPageExtractor {
    fn extract(&self, page: &RawPage<'_>) -> Result<ExtractedDocument, ExtractionError> {
        let decoded = decode_html(page.bytes, page.content_type)
            .map_err(|err| ExtractionError::MalformedMarkup(err.to_string()))?;
        if !decoded.html.contains('<') {
            return Err(ExtractionError::MalformedMarkup(
                "response contains no markup".to_string(),
            ));
        }

        let doc = Html::parse_document(&decoded.html);
        let excluded: Vec<Selector> = EXCLUDED_SELECTORS
            .iter()
            .filter_map(|s| Selector::parse(s).ok())
            .collect();

        let main = find_main_region(&doc);
        let mut collector = TextCollector::new(&excluded);
        collector.visit(*main);

        let title = find_title(&doc, &excluded)
            .map(|t| self.clean_text(&t))
            .unwrap_or_default();
        let body_text = self.clean_text(&collector.text);
        let word_count = count_words(&body_text);
        if word_count < self.min_words {
            return Err(ExtractionError::EmptyContent {
                word_count,
                minimum: self.min_words,
            });
        }

        let mut document = ExtractedDocument::new(page.url, title, body_text)
            .with_signals(collector.signals);
        document.heading_structure = collector.headings;
        document.code_examples = code_examples(main, &excluded);
        Ok(document)
    }
}

fn find_main_region(doc: &Html) -> ElementRef<'_> {
    for selector in CONTENT_SELECTORS {
        let Ok(sel) = Selector::parse(selector) else {
            continue;
        };
        if let Some(found) = doc.select(&sel).next() {
            return found;
        }
    }
    Selector::parse("body")
        .ok()
        .and_then(|sel| doc.select(&sel).next())
        .unwrap_or_else(|| doc.root_element())
}

fn find_title(doc: &Html, excluded: &[Selector]) -> Option<String> {
    let from = |selector: &str, skip_excluded: bool| {
        let sel = Selector::parse(selector).ok()?;
        doc.select(&sel)
            .filter(|el| !skip_excluded || !is_excluded(*el, excluded))
            .map(|el| normalize_whitespace(&el.text().collect::<String>()))
            .find(|text| !text.is_empty())
    };
    from("h1", true).or_else(|| from("title", false))
}

fn code_examples(main: ElementRef<'_>, excluded: &[Selector]) -> Vec<String> {
    let Ok(sel) = Selector::parse(CODE_EXAMPLE_SELECTOR) else {
        return Vec::new();
    };
    main.select(&sel)
        .filter(|el| !is_excluded(*el, excluded))
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|code| !code.is_empty())
        .take(MAX_CODE_EXAMPLES)
        .collect()
}

fn is_excluded(element: ElementRef<'_>, excluded: &[Selector]) -> bool {
    std::iter::once(element)
        .chain(element.ancestors().filter_map(ElementRef::wrap))
        .any(|el| excluded.iter().any(|sel| sel.matches(&el)))
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn heading_level(tag: &str) -> Option<u8> {
    match tag {
        "h1" => Some(1),
        "h2" => Some(2),
        "h3" => Some(3),
        "h4" => Some(4),
        "h5" => Some(5),
        "h6" => Some(6),
        _ => None,
    }
}

fn is_block(tag: &str) -> bool {
    matches!(
        tag,
        "p" | "div"
            | "section"
            | "br"
            | "li"
            | "ul"
            | "ol"
            | "pre"
            | "table"
            | "tr"
            | "td"
            | "th"
            | "blockquote"
            | "dt"
            | "dd"
            | "h1"
            | "h2"
            | "h3"
            | "h4"
            | "h5"
            | "h6"
    )
}

struct TextCollector<'s> {
    excluded: &'s [Selector],
    text: String,
    headings: Vec<Heading>,
    signals: StructuralSignals,
}

impl<'s> TextCollector<'s> {
    fn new(excluded: &'s [Selector]) -> Self {
        Self {
            excluded,
            text: String::new(),
            headings: Vec::new(),
            signals: StructuralSignals::default(),
        }
    }

    fn visit(&mut self, node: NodeRef<'_, Node>) {
        match node.value() {
            Node::Text(text) => self.text.push_str(text),
            Node::Element(_) => {
                if let Some(element) = ElementRef::wrap(node) {
                    self.visit_element(element);
                }
            }
            _ => {
                for child in node.children() {
                    self.visit(child);
                }
            }
        }
    }

    fn visit_element(&mut self, element: ElementRef<'_>) {
        if self.excluded.iter().any(|sel| sel.matches(&element)) {
            return;
        }
        let tag = element.value().name();
        match tag {
            "pre" => self.signals.code_blocks += 1,
            "ul" | "ol" => self.signals.lists += 1,
            "table" => self.signals.tables += 1,
            _ => {}
        }
        if let Some(level) = heading_level(tag) {
            let text = normalize_whitespace(&element.text().collect::<String>());
            if !text.is_empty() {
                self.headings.push(Heading { level, text });
            }
        }

        let block = is_block(tag);
        if block {
            self.text.push(' ');
        }
        for child in element.children() {
            self.visit(child);
        }
        if block {
            self.text.push(' ');
        }
    }
}
