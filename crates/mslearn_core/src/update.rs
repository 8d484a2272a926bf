use mslearn_logging::{mslearn_debug, mslearn_warn};

use crate::{
    BatchSession, Effect, JobId, Msg, ProcessingState, ProgressEvent, RefusedInput, RunState,
    SourceUrl, UrlEntry, ValidationError,
};

/// Pure update function: applies a message to the session and returns any effects.
///
/// Illegal transitions are logged and ignored so a late or repeated driver
/// message can never move an entry backwards.
pub fn update(mut session: BatchSession, msg: Msg) -> (BatchSession, Vec<Effect>) {
    let effects = match msg {
        Msg::UrlsSubmitted(urls) => submit(&mut session, urls),
        Msg::StageStarted { job_id, stage } => {
            if stage.is_terminal() {
                mslearn_warn!("job {job_id}: {stage} is not a pipeline stage");
                Vec::new()
            } else {
                transition(&mut session, job_id, stage, None)
                    .into_iter()
                    .collect()
            }
        }
        Msg::JobFailed { job_id, reason } => {
            let message = reason.to_string();
            let next = ProcessingState::Failed(reason.clone());
            match transition(&mut session, job_id, next, Some(message)) {
                Some(effect) => {
                    if let Some(entry) = session.entries.get(&job_id) {
                        session
                            .failed
                            .insert(entry.source.as_str().to_string(), reason);
                    }
                    vec![effect]
                }
                None => Vec::new(),
            }
        }
        Msg::RecordAssembled { job_id, record } => {
            let next = if record.accepted {
                ProcessingState::Accepted
            } else {
                ProcessingState::Rejected
            };
            let message = format!(
                "{} scored {} as {}",
                if record.title.is_empty() {
                    "untitled page"
                } else {
                    record.title.as_str()
                },
                record.quality_score,
                record.category
            );
            if can_move(&session, job_id, &next) {
                session.records.push(record);
            }
            transition(&mut session, job_id, next, Some(message))
                .into_iter()
                .collect()
        }
        Msg::StopRequested { in_flight } => stop(&mut session, in_flight),
        Msg::RetryRequested { url } => retry(&mut session, &url),
        Msg::BatchFinished => {
            session.run = RunState::Finished;
            Vec::new()
        }
    };

    (session, effects)
}

fn submit(session: &mut BatchSession, urls: Vec<SourceUrl>) -> Vec<Effect> {
    if session.run == RunState::Stopping {
        mslearn_warn!("ignoring {} urls submitted while stopping", urls.len());
        return Vec::new();
    }
    let mut effects = Vec::with_capacity(urls.len());
    for source in urls {
        let duplicate = session
            .entries
            .values()
            .any(|entry| entry.source.normalized() == source.normalized());
        if duplicate {
            mslearn_debug!("refusing duplicate url {}", source.as_str());
            session.refused.push(RefusedInput {
                url: source.as_str().to_string(),
                reason: ValidationError::Duplicate,
            });
            continue;
        }
        let job_id = session.allocate_job_id();
        effects.push(Effect::Process {
            job_id,
            url: source.as_str().to_string(),
        });
        session.entries.insert(
            job_id,
            UrlEntry {
                job_id,
                source,
                state: ProcessingState::Pending,
            },
        );
    }
    if !effects.is_empty() {
        session.run = RunState::Running;
    }
    effects
}

fn stop(session: &mut BatchSession, in_flight: Option<JobId>) -> Vec<Effect> {
    session.run = RunState::Stopping;
    let mut effects = Vec::new();
    if let Some(job_id) = in_flight {
        let active = session
            .entries
            .get(&job_id)
            .is_some_and(|entry| !entry.state.is_terminal());
        if active {
            effects.extend(transition(
                session,
                job_id,
                ProcessingState::Skipped,
                Some("stopped after the current stage".to_string()),
            ));
        }
    }
    let pending: Vec<JobId> = session
        .entries
        .values()
        .filter(|entry| entry.state == ProcessingState::Pending)
        .map(|entry| entry.job_id)
        .collect();
    for job_id in pending {
        effects.extend(transition(
            session,
            job_id,
            ProcessingState::Skipped,
            Some("stopped before processing".to_string()),
        ));
    }
    effects
}

fn retry(session: &mut BatchSession, url: &str) -> Vec<Effect> {
    let Some((job_id, source_url)) = session
        .find_by_url(url)
        .filter(|entry| matches!(entry.state, ProcessingState::Failed(_)))
        .map(|entry| (entry.job_id, entry.source.as_str().to_string()))
    else {
        mslearn_warn!("retry ignored: {url} is not a failed url of this batch");
        return Vec::new();
    };
    session.failed.remove(&source_url);
    session.counters.withdraw_failure();
    let Some(emit) = transition(
        session,
        job_id,
        ProcessingState::Pending,
        Some("re-queued for retry".to_string()),
    ) else {
        return Vec::new();
    };
    session.run = RunState::Running;
    vec![
        emit,
        Effect::Process {
            job_id,
            url: source_url,
        },
    ]
}

fn can_move(session: &BatchSession, job_id: JobId, next: &ProcessingState) -> bool {
    session
        .entries
        .get(&job_id)
        .is_some_and(|entry| entry.state.can_transition_to(next))
}

fn transition(
    session: &mut BatchSession,
    job_id: JobId,
    next: ProcessingState,
    message: Option<String>,
) -> Option<Effect> {
    let Some(entry) = session.entries.get_mut(&job_id) else {
        mslearn_warn!("job {job_id}: unknown job, ignoring move to {next}");
        return None;
    };
    if !entry.state.can_transition_to(&next) {
        mslearn_warn!(
            "job {job_id}: illegal transition {} -> {}",
            entry.state.label(),
            next.label()
        );
        return None;
    }
    let old_state = std::mem::replace(&mut entry.state, next.clone());
    let url = entry.source.as_str().to_string();
    if next.is_terminal() {
        session.counters.record_terminal(&next);
    }
    let message = message.unwrap_or_else(|| format!("{} {url}", next.label()));
    mslearn_debug!("job {job_id}: {} -> {}", old_state.label(), next.label());
    Some(Effect::Emit(ProgressEvent {
        job_id,
        url,
        old_state,
        new_state: next,
        progress: session.progress(),
        message,
        counters: session.counters,
    }))
}
