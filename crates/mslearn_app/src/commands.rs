use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use mslearn_core::{validate, ProcessingState, RuleClassifier};
use mslearn_engine::{
    export_session, import_url_file, write_trial_outputs, BatchOrchestrator, Checkpoint,
    FetchSettings, ImportReport, ReqwestTransport, StopHandle,
};
use mslearn_logging::{mslearn_info, mslearn_warn};

use crate::events::{render_summary, ConsoleProgressSink};
use crate::recent::{load_recent, save_recent};
use crate::settings::AppSettings;
use crate::RunArgs;

pub fn run(settings_path: &Path, args: RunArgs) -> Result<()> {
    let mut settings = AppSettings::load_or_create(settings_path)?;
    apply_overrides(&mut settings, &args);
    let output_dir = args
        .output
        .clone()
        .unwrap_or_else(|| settings.default_output_dir.clone());

    let mut recent = load_recent(&output_dir);
    let mut urls = Vec::new();
    if let Some(path) = &args.urls {
        let report = import_url_file(path)?;
        log_skipped(path, &report);
        urls.extend(report.urls);
        recent.add_url_list(path.display().to_string());
    }
    urls.extend(args.url);
    if urls.is_empty() {
        bail!("no urls to process; pass --urls FILE or URL arguments");
    }

    let transport = Arc::new(ReqwestTransport::new(FetchSettings::default())?);
    let checkpoint = Checkpoint::new(
        output_dir.clone(),
        &settings.dataset_name,
        args.checkpoint_every,
    );
    let mut orchestrator = BatchOrchestrator::new(transport, Arc::new(ConsoleProgressSink))
        .with_checkpoint(checkpoint);
    let interrupt = Interrupt::install()?;
    mslearn_info!("processing {} urls into {}", urls.len(), output_dir.display());
    let stop = orchestrator
        .start(urls, settings.generator.clone())
        .context("batch could not start")?;
    interrupt.watch(stop);

    if args.retry_failed {
        let failed: Vec<String> = orchestrator.wait()?.failed().keys().cloned().collect();
        for url in failed {
            if interrupt.requested() {
                break;
            }
            let stop = orchestrator.retry(&url)?;
            interrupt.watch(stop);
            orchestrator.wait()?;
        }
    }
    let session = orchestrator.into_session()?;
    print!("{}", render_summary(&session.view()));

    let prompts = RuleClassifier::new(settings.generator.category_rules.clone());
    let summary = export_session(&output_dir, &session, settings.export_options(), prompts)
        .with_context(|| format!("writing dataset to {}", output_dir.display()))?;

    let categories: BTreeSet<String> = session
        .records()
        .iter()
        .filter(|record| record.accepted)
        .map(|record| record.category.to_string())
        .collect();
    for category in categories {
        recent.add_category(category);
    }
    recent.last_run_utc = Some(Utc::now().to_rfc3339());
    save_recent(&output_dir, &recent);

    println!(
        "wrote {} records ({} accepted) to {}",
        summary.record_count,
        summary.accepted_count,
        summary.records_path.display()
    );
    println!("failure report: {}", summary.failures_path.display());
    println!("metadata: {}", summary.metadata_path.display());
    if let Some(path) = &summary.chatml_path {
        println!("chatml: {}", path.display());
    }
    Ok(())
}

/// Runs one URL through the whole pipeline and writes its outputs to
/// `{output}/test_outputs` when it is accepted.
pub fn trial(settings_path: &Path, url: &str, output: Option<PathBuf>) -> Result<()> {
    let settings = AppSettings::load_or_create(settings_path)?;
    let output_dir = output.unwrap_or_else(|| settings.default_output_dir.clone());

    let transport = Arc::new(ReqwestTransport::new(FetchSettings::default())?);
    let mut orchestrator = BatchOrchestrator::new(transport, Arc::new(ConsoleProgressSink));
    orchestrator
        .start(vec![url.to_string()], settings.generator.clone())
        .context("test run could not start")?;
    let session = orchestrator.into_session()?;

    if let Some(refused) = session.refused().first() {
        bail!("{}: {}", refused.url, refused.reason);
    }
    if let Some(ProcessingState::Failed(reason)) = session.state_of(url) {
        bail!("{url}: {reason}");
    }
    let Some(record) = session.records().first() else {
        bail!("{url}: no record was produced");
    };
    println!("category: {}", record.category);
    println!("quality score: {:.1}", record.quality_score.value());
    if !record.accepted {
        println!(
            "rejected: below the quality threshold of {}",
            session.quality_threshold()
        );
        return Ok(());
    }

    let prompts = RuleClassifier::new(settings.generator.category_rules.clone());
    let outputs = write_trial_outputs(&output_dir, record, prompts.system_prompt(record.category))
        .with_context(|| format!("writing test outputs to {}", output_dir.display()))?;
    println!("raw content: {}", outputs.raw_content_path.display());
    println!("training format: {}", outputs.training_format_path.display());
    println!("training item: {}", outputs.item_path.display());
    Ok(())
}

pub fn check(list: Option<&Path>, mut urls: Vec<String>) -> Result<()> {
    if let Some(path) = list {
        let report = import_url_file(path)?;
        log_skipped(path, &report);
        urls.splice(0..0, report.urls);
    }
    let mut invalid = 0;
    for url in &urls {
        match validate(url).reason {
            None => println!("ok       {url}"),
            Some(reason) => {
                invalid += 1;
                println!("invalid  {url}: {reason}");
            }
        }
    }
    if invalid > 0 {
        bail!("{invalid} of {} urls are invalid", urls.len());
    }
    Ok(())
}

pub fn recent(settings_path: &Path, output: Option<PathBuf>) -> Result<()> {
    let output_dir = match output {
        Some(dir) => dir,
        None => AppSettings::load_or_create(settings_path)?.default_output_dir,
    };
    let state = load_recent(&output_dir);
    if let Some(at) = &state.last_run_utc {
        println!("last run: {at}");
    }
    println!("recent url lists:");
    for path in &state.url_lists {
        println!("  {path}");
    }
    println!("recent categories:");
    for category in &state.categories {
        println!("  {category}");
    }
    Ok(())
}

fn apply_overrides(settings: &mut AppSettings, args: &RunArgs) {
    if let Some(name) = &args.name {
        settings.dataset_name = name.clone();
    }
    if let Some(format) = args.format {
        settings.record_format = format.into();
    }
    settings.chatml |= args.chatml;
    settings.accepted_only |= args.accepted_only;
    if let Some(threshold) = args.threshold {
        settings.generator.quality_threshold = threshold;
    }
    if let Some(delay) = args.delay_ms {
        settings.generator.min_request_delay_ms = delay;
    }
}

/// Turns Ctrl-C into a cooperative stop of whichever run is current.
struct Interrupt {
    current: Arc<Mutex<Option<StopHandle>>>,
}

impl Interrupt {
    fn install() -> Result<Self> {
        let current: Arc<Mutex<Option<StopHandle>>> = Arc::default();
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("ctrl-c listener could not start")?;
        let listener = current.clone();
        thread::Builder::new()
            .name("mslearn-ctrl-c".to_string())
            .spawn(move || {
                runtime.block_on(async {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        mslearn_warn!("interrupted; stopping after the request in flight");
                        let current = listener.lock().unwrap_or_else(PoisonError::into_inner);
                        if let Some(stop) = current.as_ref() {
                            stop.stop();
                        }
                    }
                })
            })
            .context("ctrl-c listener could not start")?;
        Ok(Self { current })
    }

    fn watch(&self, stop: StopHandle) {
        *self.lock() = Some(stop);
    }

    fn requested(&self) -> bool {
        self.lock().as_ref().is_some_and(StopHandle::is_stopped)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<StopHandle>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn log_skipped(path: &Path, report: &ImportReport) {
    for skipped in &report.skipped {
        mslearn_warn!(
            "{}:{}: skipped ({:?}): {}",
            path.display(),
            skipped.line,
            skipped.reason,
            skipped.content
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FormatArg;
    use mslearn_engine::RecordFormat;

    fn args() -> RunArgs {
        RunArgs {
            urls: None,
            url: Vec::new(),
            output: None,
            name: None,
            format: None,
            chatml: false,
            accepted_only: false,
            threshold: None,
            delay_ms: None,
            retry_failed: false,
            checkpoint_every: Checkpoint::DEFAULT_INTERVAL,
        }
    }

    #[test]
    fn command_line_overrides_settings() {
        let mut settings = AppSettings {
            chatml: true,
            ..AppSettings::default()
        };
        let args = RunArgs {
            name: Some("DNS".to_string()),
            format: Some(FormatArg::Json),
            threshold: Some(150.0),
            delay_ms: Some(0),
            ..args()
        };

        apply_overrides(&mut settings, &args);

        assert_eq!(settings.dataset_name, "DNS");
        assert_eq!(settings.record_format, RecordFormat::JsonArray);
        assert!(settings.chatml, "a flag left off keeps the saved preference");
        assert_eq!(settings.generator.quality_threshold, 150.0);
        assert_eq!(settings.generator.min_request_delay_ms, 0);
    }

    #[test]
    fn interrupt_stops_the_run_it_watches() {
        let interrupt = Interrupt::install().unwrap();
        assert!(!interrupt.requested());

        let first = StopHandle::new();
        interrupt.watch(first.clone());
        first.stop();
        assert!(interrupt.requested());

        interrupt.watch(StopHandle::new());
        assert!(!interrupt.requested());
    }

    #[test]
    fn check_reports_invalid_urls() {
        let urls = vec![
            "https://learn.microsoft.com/en-us/windows-server/networking/dns/dns-overview"
                .to_string(),
            "http://example.com/page".to_string(),
        ];
        assert!(check(None, urls[..1].to_vec()).is_ok());
        let err = check(None, urls).unwrap_err();
        assert_eq!(err.to_string(), "1 of 2 urls are invalid");
    }
}
