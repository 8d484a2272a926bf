use std::fmt::Write as _;

use mslearn_core::{BatchViewModel, ProgressEvent};
use mslearn_engine::ProgressSink;
use mslearn_logging::{mslearn_debug, mslearn_info};

/// Prints one line per finished URL and logs every transition.
pub struct ConsoleProgressSink;

impl ProgressSink for ConsoleProgressSink {
    fn emit(&self, event: ProgressEvent) {
        if event.new_state.is_terminal() {
            let line = progress_line(&event);
            mslearn_info!("{line}");
            println!("{line}");
        } else {
            mslearn_debug!(
                "job {} {} -> {}: {}",
                event.job_id,
                event.old_state.label(),
                event.new_state.label(),
                event.url
            );
        }
    }
}

pub fn progress_line(event: &ProgressEvent) -> String {
    let mut line = format!(
        "[{:>3.0}%] {:<9} {}",
        event.progress * 100.0,
        event.new_state.label(),
        event.url
    );
    if !event.message.is_empty() {
        let _ = write!(line, " ({})", event.message);
    }
    line
}

/// Counters block printed after a run.
pub fn render_summary(view: &BatchViewModel) -> String {
    let counters = view.counters;
    let mut out = String::new();
    let _ = writeln!(out, "processed: {}", counters.processed);
    let _ = writeln!(out, "accepted:  {}", counters.succeeded);
    let _ = writeln!(out, "rejected:  {}", counters.rejected);
    let _ = writeln!(out, "failed:    {}", counters.failed);
    let _ = writeln!(out, "skipped:   {}", counters.skipped);
    if view.refused > 0 {
        let _ = writeln!(out, "refused:   {}", view.refused);
    }
    for row in view.rows.iter().filter(|row| row.detail.is_some()) {
        let detail = row.detail.as_deref().unwrap_or_default();
        let _ = writeln!(out, "  {} {}: {}", row.state, row.url, detail);
    }
    out
}
