use std::fs;
use std::path::{Path, PathBuf};

use mslearn_core::is_syntactically_valid;
use mslearn_logging::{mslearn_debug, mslearn_info, mslearn_warn};

/// Header names recognised as the URL column of a table, case-insensitive.
const URL_COLUMNS: &[&str] = &["url", "link", "source_url"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    InvalidUrl,
    MissingColumn,
    /// The row could not be parsed as delimited text.
    Malformed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedLine {
    /// 1-based line number in the source text.
    pub line: usize,
    pub content: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub urls: Vec<String>,
    pub skipped: Vec<SkippedLine>,
}

impl ImportReport {
    fn accept_or_skip(&mut self, line: usize, raw: &str, candidate: &str) {
        let candidate = candidate.trim();
        if is_syntactically_valid(candidate) {
            self.urls.push(candidate.to_string());
        } else {
            mslearn_debug!("import: skipping line {line}, not a url");
            self.skipped.push(SkippedLine {
                line,
                content: raw.to_string(),
                reason: SkipReason::InvalidUrl,
            });
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// One URL per line. Blank lines and `#` comments are ignored, invalid lines reported.
pub fn parse_url_list(text: &str) -> ImportReport {
    let mut report = ImportReport::default();
    for (index, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        report.accept_or_skip(index + 1, raw, line);
    }
    report
}

/// Delimited table with an optional header row naming the URL column.
///
/// Without a recognised header the first column is used, and a first row that
/// already holds a URL is treated as data. Quoted fields may contain the
/// delimiter and line breaks.
pub fn parse_url_table(text: &str, delimiter: char) -> ImportReport {
    let mut report = ImportReport::default();
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(u8::try_from(delimiter).unwrap_or(b','))
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());
    let separator = delimiter.to_string();
    let mut column: Option<usize> = None;
    for row in reader.records() {
        let fields = match row {
            Ok(fields) => fields,
            Err(err) => {
                let line = err.position().map_or(0, |pos| pos.line() as usize);
                mslearn_warn!("import: skipping malformed row at line {line}: {err}");
                report.skipped.push(SkippedLine {
                    line,
                    content: err.to_string(),
                    reason: SkipReason::Malformed,
                });
                continue;
            }
        };
        if fields.iter().all(|field| field.trim().is_empty()) {
            continue;
        }
        let line = fields.position().map_or(0, |pos| pos.line() as usize);
        let raw = fields.iter().collect::<Vec<_>>().join(&separator);
        let url_column = match column {
            Some(known) => known,
            None => {
                let header = fields.iter().position(|field| {
                    URL_COLUMNS
                        .iter()
                        .any(|name| field.trim().eq_ignore_ascii_case(name))
                });
                column = Some(header.unwrap_or(0));
                let first_is_data = header.is_none()
                    && fields
                        .get(0)
                        .is_some_and(|field| is_syntactically_valid(field.trim()));
                if !first_is_data {
                    continue;
                }
                0
            }
        };
        match fields.get(url_column) {
            Some(candidate) => report.accept_or_skip(line, &raw, candidate),
            None => report.skipped.push(SkippedLine {
                line,
                content: raw,
                reason: SkipReason::MissingColumn,
            }),
        }
    }
    report
}

/// Reads a URL list; `.csv` and `.tsv` files are parsed as tables.
pub fn import_url_file(path: &Path) -> Result<ImportReport, ImportError> {
    let bytes = fs::read(path).map_err(|source| ImportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let text = String::from_utf8_lossy(&bytes);
    let text = text.trim_start_matches('\u{feff}');

    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());
    let report = match extension.as_deref() {
        Some("csv") => parse_url_table(text, ','),
        Some("tsv") => parse_url_table(text, '\t'),
        _ => parse_url_list(text),
    };
    mslearn_info!(
        "imported {} urls from {} ({} lines skipped)",
        report.urls.len(),
        path.display(),
        report.skipped.len()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DNS_URL: &str =
        "https://learn.microsoft.com/en-us/windows-server/networking/dns/dns-overview";

    #[test]
    fn quoted_fields_may_span_lines() {
        let text = format!("notes,url\n\"first line\nsecond, line\",{DNS_URL}\nlast,bad\n");
        let report = parse_url_table(&text, ',');
        assert_eq!(report.urls, vec![DNS_URL.to_string()]);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].line, 4);
        assert_eq!(report.skipped[0].content, "last,bad");
    }

    #[test]
    fn doubled_quotes_are_unescaped() {
        let text = format!("url\tnote\n\"say \"\"hi\"\"\"\tx\n{DNS_URL}\tok\n");
        let report = parse_url_table(&text, '\t');
        assert_eq!(report.urls, vec![DNS_URL.to_string()]);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].content, "say \"hi\"\tx");
        assert_eq!(report.skipped[0].reason, SkipReason::InvalidUrl);
    }
}
