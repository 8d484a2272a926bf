use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::Category;

/// Host every in-scope documentation URL must point at.
pub const DOCS_HOST: &str = "learn.microsoft.com";

/// Why a URL was refused before reaching the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValidationError {
    Malformed,
    UnsupportedScheme,
    OutOfScope,
    Duplicate,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::Malformed => write!(f, "not a well-formed absolute url"),
            ValidationError::UnsupportedScheme => write!(f, "only https urls are accepted"),
            ValidationError::OutOfScope => write!(f, "not a {DOCS_HOST} documentation page"),
            ValidationError::Duplicate => write!(f, "duplicate url in batch"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Validation {
    pub valid: bool,
    pub reason: Option<ValidationError>,
}

impl Validation {
    fn ok() -> Self {
        Self {
            valid: true,
            reason: None,
        }
    }

    fn refused(reason: ValidationError) -> Self {
        Self {
            valid: false,
            reason: Some(reason),
        }
    }

    pub fn reason_text(&self) -> Option<String> {
        self.reason.map(|reason| reason.to_string())
    }
}

/// Checks that `url` is an https documentation page on [`DOCS_HOST`].
///
/// Pure: no I/O, no allocation beyond URL parsing.
pub fn validate(url: &str) -> Validation {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return Validation::refused(ValidationError::Malformed);
    }
    let parsed = match Url::parse(trimmed) {
        Ok(parsed) => parsed,
        Err(_) => return Validation::refused(ValidationError::Malformed),
    };
    if parsed.cannot_be_a_base() {
        return Validation::refused(ValidationError::Malformed);
    }
    if parsed.scheme() != "https" {
        return Validation::refused(ValidationError::UnsupportedScheme);
    }
    let on_docs_host = parsed
        .host_str()
        .is_some_and(|host| host.eq_ignore_ascii_case(DOCS_HOST));
    if !on_docs_host || parsed.path().trim_matches('/').is_empty() {
        return Validation::refused(ValidationError::OutOfScope);
    }
    Validation::ok()
}

/// Loose check used by list import: an absolute http(s) URL with a host.
pub fn is_syntactically_valid(url: &str) -> bool {
    match Url::parse(url.trim()) {
        Ok(parsed) => {
            matches!(parsed.scheme(), "http" | "https") && parsed.host_str().is_some()
        }
        Err(_) => false,
    }
}

/// Canonical form used for duplicate detection.
///
/// Scheme and host are lowercased by the parser; the path is lowercased too
/// because the documentation site serves paths case-insensitively. Fragments
/// and trailing slashes are dropped, the query is kept.
pub fn normalize_url_for_dedupe(url: &str) -> String {
    let trimmed = url.trim();
    match Url::parse(trimmed) {
        Ok(mut parsed) if !parsed.cannot_be_a_base() => {
            parsed.set_fragment(None);
            let path = parsed.path().trim_end_matches('/').to_ascii_lowercase();
            if path.is_empty() {
                parsed.set_path("/");
            } else {
                parsed.set_path(&path);
            }
            parsed.to_string()
        }
        _ => trimmed.to_ascii_lowercase(),
    }
}

/// A submitted URL together with its validation outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceUrl {
    raw: String,
    normalized: String,
    validation: Validation,
    category_hint: Option<Category>,
}

impl SourceUrl {
    pub fn parse(raw: impl Into<String>) -> Self {
        let raw = raw.into().trim().to_string();
        Self {
            normalized: normalize_url_for_dedupe(&raw),
            validation: validate(&raw),
            raw,
            category_hint: None,
        }
    }

    pub fn with_category_hint(mut self, hint: Option<Category>) -> Self {
        self.category_hint = hint;
        self
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn normalized(&self) -> &str {
        &self.normalized
    }

    pub fn is_valid(&self) -> bool {
        self.validation.valid
    }

    pub fn validation(&self) -> Validation {
        self.validation
    }

    pub fn category_hint(&self) -> Option<Category> {
        self.category_hint
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn learn_urls_are_valid() {
        for url in [
            "https://learn.microsoft.com/en-us/windows-server/networking/dns/dns-overview",
            "https://LEARN.microsoft.com/en-us/powershell/module/dnsserver/?view=latest",
            "  https://learn.microsoft.com/en-us/troubleshoot/windows-server/  ",
        ] {
            let result = validate(url);
            assert!(result.valid, "{url} should be valid");
            assert_eq!(result.reason, None);
        }
    }

    #[test]
    fn malformed_and_out_of_scope_urls_carry_a_reason() {
        let cases = [
            ("", ValidationError::Malformed),
            ("learn.microsoft.com/en-us/dns", ValidationError::Malformed),
            ("mailto:someone@example.com", ValidationError::Malformed),
            ("http://learn.microsoft.com/en-us/dns", ValidationError::UnsupportedScheme),
            ("ftp://learn.microsoft.com/en-us/dns", ValidationError::UnsupportedScheme),
            ("https://example.com/en-us/dns", ValidationError::OutOfScope),
            ("https://learn.microsoft.com.evil.test/dns", ValidationError::OutOfScope),
            ("https://learn.microsoft.com/", ValidationError::OutOfScope),
        ];
        for (url, expected) in cases {
            let result = validate(url);
            assert!(!result.valid, "{url:?} should be refused");
            assert_eq!(result.reason, Some(expected), "{url:?}");
            assert!(!result.reason_text().unwrap_or_default().is_empty());
        }
    }

    #[test]
    fn normalization_ignores_case_fragment_and_trailing_slash() {
        let a = normalize_url_for_dedupe("https://Learn.Microsoft.com/en-US/DNS/overview/#intro");
        let b = normalize_url_for_dedupe("https://learn.microsoft.com/en-us/dns/overview");
        assert_eq!(a, b);
        let with_query = normalize_url_for_dedupe("https://learn.microsoft.com/a?view=2022");
        assert_ne!(with_query, normalize_url_for_dedupe("https://learn.microsoft.com/a"));
    }

    #[test]
    fn syntactic_check_accepts_any_http_host() {
        assert!(is_syntactically_valid("http://example.com/x"));
        assert!(!is_syntactically_valid("not a url"));
        assert!(!is_syntactically_valid("file:///etc/passwd"));
    }
}
