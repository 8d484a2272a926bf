use serde::{Deserialize, Serialize};

use crate::{Category, ExtractedDocument};

/// System prompt used for categories without a rule-specific prompt.
pub const GENERAL_SYSTEM_PROMPT: &str =
    "You are a Windows Server and Microsoft technologies expert.";

fn default_min_keyword_hits() -> u32 {
    2
}

/// One row of the priority-ordered classification table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRule {
    pub category: Category,
    /// Substrings matched against the lowercased URL path.
    #[serde(default)]
    pub url_patterns: Vec<String>,
    /// Phrases matched against the lowercased title and body.
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Distinct keywords that must occur for a keyword match.
    #[serde(default = "default_min_keyword_hits")]
    pub min_keyword_hits: u32,
    #[serde(default)]
    pub system_prompt: Option<String>,
}

impl CategoryRule {
    pub fn new(category: Category) -> Self {
        Self {
            category,
            url_patterns: Vec::new(),
            keywords: Vec::new(),
            min_keyword_hits: default_min_keyword_hits(),
            system_prompt: None,
        }
    }

    pub fn url_patterns(mut self, patterns: &[&str]) -> Self {
        self.url_patterns = patterns.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn keywords(mut self, keywords: &[&str], min_hits: u32) -> Self {
        self.keywords = keywords.iter().map(|k| k.to_string()).collect();
        self.min_keyword_hits = min_hits;
        self
    }

    pub fn system_prompt(mut self, prompt: &str) -> Self {
        self.system_prompt = Some(prompt.to_string());
        self
    }

    fn matches_path(&self, path: &str) -> bool {
        self.url_patterns
            .iter()
            .any(|pattern| !pattern.is_empty() && path.contains(&pattern.to_ascii_lowercase()))
    }

    fn matches_text(&self, text: &str) -> bool {
        if self.keywords.is_empty() || self.min_keyword_hits == 0 {
            return false;
        }
        let hits = self
            .keywords
            .iter()
            .filter(|keyword| !keyword.is_empty() && text.contains(&keyword.to_lowercase()))
            .count();
        hits as u32 >= self.min_keyword_hits
    }
}

pub trait Classifier: Send + Sync {
    fn classify(&self, doc: &ExtractedDocument) -> Category;
}

/// Table-driven classifier.
///
/// Rules are tried in priority order and the first one whose path patterns or
/// keywords match wins, otherwise [`Category::Uncategorized`].
#[derive(Debug, Clone)]
pub struct RuleClassifier {
    rules: Vec<CategoryRule>,
}

impl RuleClassifier {
    pub fn new(rules: Vec<CategoryRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[CategoryRule] {
        &self.rules
    }

    /// Category suggested by the URL path alone, if any rule matches it.
    pub fn hint_for_url(&self, url: &str) -> Option<Category> {
        let doc = ExtractedDocument::new(url, "", "");
        let path = doc.url_path();
        self.rules
            .iter()
            .find(|rule| rule.matches_path(&path))
            .map(|rule| rule.category)
    }

    /// Prompt of the first rule for `category`, or [`GENERAL_SYSTEM_PROMPT`].
    pub fn system_prompt(&self, category: Category) -> &str {
        self.rules
            .iter()
            .filter(|rule| rule.category == category)
            .find_map(|rule| rule.system_prompt.as_deref())
            .unwrap_or(GENERAL_SYSTEM_PROMPT)
    }
}

impl Default for RuleClassifier {
    fn default() -> Self {
        Self::new(default_rules())
    }
}

impl Classifier for RuleClassifier {
    fn classify(&self, doc: &ExtractedDocument) -> Category {
        let path = doc.url_path();
        let text = doc.searchable_text();
        self.rules
            .iter()
            .find(|rule| rule.matches_path(&path) || rule.matches_text(&text))
            .map(|rule| rule.category)
            .unwrap_or(Category::Uncategorized)
    }
}

/// Rule table shipped with the generator, highest priority first.
pub fn default_rules() -> Vec<CategoryRule> {
    vec![
        CategoryRule::new(Category::ActiveDirectory)
            .url_patterns(&["identity", "ad-ds", "active-directory"])
            .keywords(&["active directory", "domain controller", "ad ds", "forest"], 2)
            .system_prompt(
                "You are an expert Active Directory administrator and Windows Server specialist.",
            ),
        CategoryRule::new(Category::DnsAdministration)
            .url_patterns(&["dns", "domain-name"])
            .keywords(&["dns", "name resolution", "zone", "resource record"], 2)
            .system_prompt("You are a DNS specialist and Windows Server networking expert."),
        CategoryRule::new(Category::Dhcp)
            .url_patterns(&["dhcp", "dynamic-host"])
            .keywords(&["dhcp", "scope", "lease", "ip address"], 2)
            .system_prompt("You are a DHCP administration expert for Windows Server environments."),
        CategoryRule::new(Category::PowerShell)
            .url_patterns(&["powershell", "scripting"])
            .keywords(&["powershell", "cmdlet", "script"], 2)
            .system_prompt("You are a PowerShell developer and Windows automation specialist."),
        CategoryRule::new(Category::Security)
            .url_patterns(&["security", "authentication", "kerberos"])
            .keywords(&["security", "authentication", "kerberos", "certificate"], 2)
            .system_prompt(
                "You are a Windows Server security specialist and authentication expert.",
            ),
        CategoryRule::new(Category::Networking)
            .url_patterns(&["networking", "network", "tcpip", "ipv4", "ipv6"])
            .keywords(&["network adapter", "subnet", "tcp/ip", "routing"], 2)
            .system_prompt("You are a Windows Server networking specialist."),
        CategoryRule::new(Category::Administration)
            .url_patterns(&["admin", "manage", "management"])
            .system_prompt(
                "You are a Windows Server administrator with extensive management experience.",
            ),
        CategoryRule::new(Category::Deployment)
            .url_patterns(&["deploy", "install", "setup", "configure"])
            .system_prompt("You are a Windows Server deployment and configuration specialist."),
        CategoryRule::new(Category::Troubleshooting)
            .url_patterns(&["troubleshoot", "debug", "diagnostic"])
            .keywords(&["troubleshoot", "event id", "error code"], 2)
            .system_prompt("You are a Windows Server troubleshooting expert."),
    ]
}
