use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use mslearn_core::{BatchSession, ReportReason, RuleClassifier, TrainingRecord};
use mslearn_logging::{mslearn_debug, mslearn_info};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::filename::dataset_slug;
use crate::persist::{AtomicFileWriter, PersistError};

const GENERATOR_NAME: &str = "MS Learn Training Data Generator v1.0";
const LICENSE_NOTE: &str = "Creative Commons Attribution 4.0 International - Microsoft Learn";
const CHATML_LICENSE: &str = "CC BY 4.0 - Microsoft Learn";
const CHATML_BODY_CHARS: usize = 6000;
const CHATML_CODE_EXAMPLES: usize = 3;
const UNTITLED_TOPIC: &str = "Windows Server topic";
const TRIAL_DIR: &str = "test_outputs";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordFormat {
    /// One JSON object per line.
    #[default]
    JsonLines,
    /// A single pretty-printed JSON array.
    JsonArray,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportOptions {
    /// Prefix of every output file, slugified.
    pub dataset_name: String,
    pub format: RecordFormat,
    /// Leave rejected records out of the record file. They stay in the failure report.
    pub accepted_only: bool,
    /// Also write accepted records as ChatML conversations.
    pub chatml: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            dataset_name: "MS_Learn".to_string(),
            format: RecordFormat::JsonLines,
            accepted_only: false,
            chatml: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    pub record_count: usize,
    pub accepted_count: usize,
    pub failure_count: usize,
    pub records_path: PathBuf,
    pub failures_path: PathBuf,
    pub metadata_path: PathBuf,
    pub chatml_path: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("persist error: {0}")]
    Persist(#[from] PersistError),
    #[error("failed to serialize record {record_id}: {message}")]
    Serialize { record_id: String, message: String },
}

/// Writes the outputs of one batch into a directory.
#[derive(Debug, Clone)]
pub struct DatasetExporter {
    writer: AtomicFileWriter,
    options: ExportOptions,
    prompts: RuleClassifier,
}

impl DatasetExporter {
    /// `prompts` supplies the per-category system prompts for ChatML output.
    pub fn new(output_dir: PathBuf, options: ExportOptions, prompts: RuleClassifier) -> Self {
        Self {
            writer: AtomicFileWriter::new(output_dir),
            options,
            prompts,
        }
    }

    pub fn slug(&self) -> String {
        dataset_slug(&self.options.dataset_name)
    }

    pub fn export(&self, session: &BatchSession) -> Result<ExportSummary, ExportError> {
        let slug = self.slug();
        let records: Vec<&TrainingRecord> = session
            .records()
            .iter()
            .filter(|record| record.accepted || !self.options.accepted_only)
            .collect();
        let accepted: Vec<&TrainingRecord> =
            session.records().iter().filter(|r| r.accepted).collect();

        let records_path = match self.options.format {
            RecordFormat::JsonLines => self
                .writer
                .write(&format!("{slug}_training_data.jsonl"), &json_lines(&records)?)?,
            RecordFormat::JsonArray => self
                .writer
                .write_json(&format!("{slug}_training_data.json"), &records)?,
        };

        let failures = failure_rows(session);
        let failures_path = self
            .writer
            .write_json(&format!("{slug}_failures.json"), &failures)?;

        let metadata = metadata(session, &accepted, &self.options.dataset_name);
        let metadata_path = self
            .writer
            .write_json(&format!("{slug}_metadata.json"), &metadata)?;

        let chatml_path = if self.options.chatml {
            let items: Vec<Value> = accepted
                .iter()
                .map(|record| chatml_item(record, self.prompts.system_prompt(record.category)))
                .collect();
            let mut content = Vec::new();
            for item in &items {
                content.extend_from_slice(item.to_string().as_bytes());
                content.push(b'\n');
            }
            Some(
                self.writer
                    .write(&format!("{slug}_chatml.jsonl"), &content)?,
            )
        } else {
            None
        };

        mslearn_info!(
            "exported {} records ({} accepted, {} failures) to {}",
            records.len(),
            accepted.len(),
            failures.len(),
            self.writer.dir().display()
        );
        Ok(ExportSummary {
            record_count: records.len(),
            accepted_count: accepted.len(),
            failure_count: failures.len(),
            records_path,
            failures_path,
            metadata_path,
            chatml_path,
        })
    }
}

/// Convenience wrapper around [`DatasetExporter::export`].
pub fn export_session(
    output_dir: &Path,
    session: &BatchSession,
    options: ExportOptions,
    prompts: RuleClassifier,
) -> Result<ExportSummary, ExportError> {
    DatasetExporter::new(output_dir.to_path_buf(), options, prompts).export(session)
}

/// Rewrites `{slug}_progress.jsonl` with every record assembled so far, once
/// every `interval` finished URLs, so a killed run keeps its work.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    writer: AtomicFileWriter,
    filename: String,
    interval: usize,
}

impl Checkpoint {
    pub const DEFAULT_INTERVAL: usize = 10;

    pub fn new(output_dir: PathBuf, dataset_name: &str, interval: usize) -> Self {
        Self {
            writer: AtomicFileWriter::new(output_dir),
            filename: format!("{}_progress.jsonl", dataset_slug(dataset_name)),
            interval,
        }
    }

    pub fn path(&self) -> PathBuf {
        self.writer.dir().join(&self.filename)
    }

    /// True when `finished` URLs completes another interval. An interval of 0 disables saving.
    pub fn is_due(&self, finished: usize) -> bool {
        self.interval > 0 && finished > 0 && finished % self.interval == 0
    }

    pub fn save(&self, session: &BatchSession) -> Result<PathBuf, ExportError> {
        let records: Vec<&TrainingRecord> = session.records().iter().collect();
        let path = self.writer.write(&self.filename, &json_lines(&records)?)?;
        mslearn_info!("progress saved: {} records", records.len());
        Ok(path)
    }
}

/// Files written by [`write_trial_outputs`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrialOutputs {
    pub raw_content_path: PathBuf,
    pub training_format_path: PathBuf,
    pub item_path: PathBuf,
}

/// Writes the extracted text, the rendered ChatML conversation and its JSONL
/// item for one record into `{output_dir}/test_outputs`.
pub fn write_trial_outputs(
    output_dir: &Path,
    record: &TrainingRecord,
    system_prompt: &str,
) -> Result<TrialOutputs, ExportError> {
    let writer = AtomicFileWriter::new(output_dir.join(TRIAL_DIR));

    let mut raw = format!(
        "Title: {}\n\nContent:\n{}\n\n",
        record.title, record.body_text
    );
    if !record.code_examples.is_empty() {
        raw.push_str("Code Examples:\n");
        for (i, code) in record.code_examples.iter().enumerate() {
            raw.push_str(&format!("\nExample {}:\n{code}\n", i + 1));
        }
    }
    let raw_content_path = writer.write("test_raw_content.txt", raw.as_bytes())?;

    let item = chatml_item(record, system_prompt);
    let text = item["text"].as_str().unwrap_or_default();
    let training_format_path = writer.write("test_training_format.txt", text.as_bytes())?;
    let item_path = writer.write(
        "test_training_item.jsonl",
        format!("{item}\n").as_bytes(),
    )?;

    mslearn_debug!("trial outputs written to {}", writer.dir().display());
    Ok(TrialOutputs {
        raw_content_path,
        training_format_path,
        item_path,
    })
}

fn json_lines(records: &[&TrainingRecord]) -> Result<Vec<u8>, ExportError> {
    let mut content = Vec::new();
    for record in records {
        let line = serde_json::to_string(record).map_err(|err| ExportError::Serialize {
            record_id: record.record_id.clone(),
            message: err.to_string(),
        })?;
        content.extend_from_slice(line.as_bytes());
        content.push(b'\n');
    }
    Ok(content)
}

fn failure_rows(session: &BatchSession) -> Vec<Value> {
    session
        .failure_report()
        .into_iter()
        .map(|entry| {
            let kind = match &entry.reason {
                ReportReason::Failed(_) => "failed",
                ReportReason::Rejected { .. } => "rejected",
                ReportReason::Refused(_) => "refused",
                ReportReason::Skipped => "skipped",
            };
            json!({
                "source_url": entry.source_url,
                "failure_reason": entry.reason.to_string(),
                "kind": kind,
            })
        })
        .collect()
}

fn metadata(session: &BatchSession, accepted: &[&TrainingRecord], dataset_name: &str) -> Value {
    let mut categories: BTreeMap<String, usize> = BTreeMap::new();
    for record in accepted {
        *categories.entry(record.category.to_string()).or_default() += 1;
    }
    let counters = session.counters();
    json!({
        "dataset": dataset_name,
        "total_items": session.records().len(),
        "accepted_items": accepted.len(),
        "categories": categories,
        "urls_processed": counters.processed,
        "counters": counters,
        "quality_threshold": session.quality_threshold(),
        "extraction_date": Utc::now().to_rfc3339(),
        "license": LICENSE_NOTE,
        "source": "Microsoft Learn",
        "generator": GENERATOR_NAME,
    })
}

/// Renders one accepted record as a ChatML conversation.
pub fn chatml_item(record: &TrainingRecord, system_prompt: &str) -> Value {
    let title = if record.title.is_empty() {
        UNTITLED_TOPIC
    } else {
        record.title.as_str()
    };
    let mut answer: String = record.body_text.chars().take(CHATML_BODY_CHARS).collect();
    if !record.code_examples.is_empty() {
        answer.push_str("\n\nCode Examples:\n");
        for (i, code) in record
            .code_examples
            .iter()
            .take(CHATML_CODE_EXAMPLES)
            .enumerate()
        {
            answer.push_str(&format!("\nExample {}:\n```\n{code}\n```\n", i + 1));
        }
    }
    let text = format!(
        "<|im_start|>system\n{system_prompt}<|im_end|>\n\
         <|im_start|>user\nExplain {title} in detail.<|im_end|>\n\
         <|im_start|>assistant\n{answer}<|im_end|>"
    );
    json!({
        "text": text,
        "metadata": {
            "source": record.source_url,
            "title": title,
            "category": record.category,
            "content_length": record.body_text.chars().count(),
            "code_examples_count": record.code_examples.len(),
            "license": CHATML_LICENSE,
        }
    })
}
