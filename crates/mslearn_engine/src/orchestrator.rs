use std::io;
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use mslearn_core::{
    update, BatchSession, ConfigError, Effect, FailureReason, GeneratorConfig, JobId, Msg,
    ProcessingState, ProgressEvent, RuleClassifier, SourceUrl, ValidationError,
};
use mslearn_logging::{mslearn_debug, mslearn_info, mslearn_warn};
use tokio_util::sync::CancellationToken;

use crate::export::Checkpoint;
use crate::fetch::{
    is_transient_status, FetchResult, FetchStatus, Pacer, RetryPolicy, RetryingFetcher, Transport,
};
use crate::pipeline::Pipeline;

/// Receives every state transition, in production order.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: ProgressEvent);
}

pub struct ChannelProgressSink {
    tx: mpsc::Sender<ProgressEvent>,
}

impl ChannelProgressSink {
    pub fn new(tx: mpsc::Sender<ProgressEvent>) -> Self {
        Self { tx }
    }
}

impl ProgressSink for ChannelProgressSink {
    fn emit(&self, event: ProgressEvent) {
        let _ = self.tx.send(event);
    }
}

/// Adapts a closure into a [`ProgressSink`].
pub struct FnProgressSink<F>(pub F);

impl<F> ProgressSink for FnProgressSink<F>
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    fn emit(&self, event: ProgressEvent) {
        (self.0)(event)
    }
}

/// Cooperative stop request for one run. Cloneable and callable from any thread.
#[derive(Debug, Clone)]
pub struct StopHandle {
    token: CancellationToken,
}

impl StopHandle {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    pub fn stop(&self) {
        self.token.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Default for StopHandle {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("a batch is already running")]
    AlreadyRunning,
    #[error("{0} is not a failed url of the last batch")]
    NotRetryable(String),
    #[error("failed to start driver: {0}")]
    Runtime(#[from] io::Error),
    #[error("driver thread panicked")]
    DriverPanicked,
}

struct RunContext {
    config: GeneratorConfig,
    pipeline: Pipeline,
}

struct Driver {
    handle: JoinHandle<BatchSession>,
    stop: StopHandle,
}

/// Drives batches of URLs through fetch, extraction, scoring and assembly.
///
/// The session moves into a driver thread for the duration of a run and is
/// handed back when the thread is joined, so it is never shared.
pub struct BatchOrchestrator {
    transport: Arc<dyn Transport>,
    sink: Arc<dyn ProgressSink>,
    pacer: Arc<Pacer>,
    session: Option<BatchSession>,
    driver: Option<Driver>,
    last_run: Option<RunContext>,
    checkpoint: Option<Checkpoint>,
}

impl BatchOrchestrator {
    pub fn new(transport: Arc<dyn Transport>, sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            transport,
            sink,
            pacer: Arc::new(Pacer::default()),
            session: Some(BatchSession::default()),
            driver: None,
            last_run: None,
            checkpoint: None,
        }
    }

    /// Saves the records assembled so far while a run is in progress.
    pub fn with_checkpoint(mut self, checkpoint: Checkpoint) -> Self {
        self.checkpoint = Some(checkpoint);
        self
    }

    /// Starts a batch with the default pipeline built from `config`.
    pub fn start(
        &mut self,
        urls: Vec<String>,
        config: GeneratorConfig,
    ) -> Result<StopHandle, OrchestratorError> {
        let pipeline = Pipeline::from_config(&config);
        self.start_with(urls, config, pipeline)
    }

    pub fn start_with(
        &mut self,
        urls: Vec<String>,
        config: GeneratorConfig,
        pipeline: Pipeline,
    ) -> Result<StopHandle, OrchestratorError> {
        self.ensure_idle()?;
        config.validate()?;

        let hints = RuleClassifier::new(config.category_rules.clone());
        let sources: Vec<SourceUrl> = urls
            .iter()
            .map(|url| SourceUrl::parse(url.as_str()).with_category_hint(hints.hint_for_url(url)))
            .collect();

        let session = BatchSession::new(config.quality_threshold);
        let (session, jobs) = apply(session, Msg::UrlsSubmitted(sources), self.sink.as_ref());
        for refused in session.refused() {
            mslearn_warn!("refused {}: {}", refused.url, refused.reason);
        }
        mslearn_info!(
            "batch started: {} urls queued, {} refused",
            jobs.len(),
            session.refused().len()
        );

        let context = RunContext { config, pipeline };
        let stop = self.spawn_driver(session, jobs, &context)?;
        self.last_run = Some(context);
        Ok(stop)
    }

    /// Re-queues one failed URL of the last batch and processes it.
    pub fn retry(&mut self, url: &str) -> Result<StopHandle, OrchestratorError> {
        self.ensure_idle()?;
        let failed = self
            .session
            .as_ref()
            .and_then(|session| session.state_of(url))
            .is_some_and(|state| matches!(state, ProcessingState::Failed(_)));
        if !failed || self.last_run.is_none() {
            return Err(OrchestratorError::NotRetryable(url.to_string()));
        }
        let (Some(session), Some(context)) = (self.session.take(), self.last_run.take()) else {
            return Err(OrchestratorError::NotRetryable(url.to_string()));
        };

        let (session, jobs) = apply(
            session,
            Msg::RetryRequested {
                url: url.to_string(),
            },
            self.sink.as_ref(),
        );
        mslearn_info!("retrying {url}");
        let result = self.spawn_driver(session, jobs, &context);
        self.last_run = Some(context);
        result
    }

    pub fn stop(&self) {
        if let Some(driver) = &self.driver {
            mslearn_info!("stop requested");
            driver.stop.stop();
        }
    }

    pub fn stop_handle(&self) -> Option<StopHandle> {
        self.driver.as_ref().map(|driver| driver.stop.clone())
    }

    pub fn is_running(&self) -> bool {
        self.driver
            .as_ref()
            .is_some_and(|driver| !driver.handle.is_finished())
    }

    /// Blocks until the current run ends and returns its session.
    pub fn wait(&mut self) -> Result<&BatchSession, OrchestratorError> {
        self.join_driver()?;
        self.session.as_ref().ok_or(OrchestratorError::DriverPanicked)
    }

    /// The last session, or `None` while a run owns it.
    pub fn session(&self) -> Option<&BatchSession> {
        self.session.as_ref()
    }

    pub fn into_session(mut self) -> Result<BatchSession, OrchestratorError> {
        self.join_driver()?;
        self.session.take().ok_or(OrchestratorError::DriverPanicked)
    }

    fn ensure_idle(&mut self) -> Result<(), OrchestratorError> {
        if self.is_running() {
            return Err(OrchestratorError::AlreadyRunning);
        }
        self.join_driver()
    }

    fn join_driver(&mut self) -> Result<(), OrchestratorError> {
        let Some(driver) = self.driver.take() else {
            return Ok(());
        };
        let session = driver
            .handle
            .join()
            .map_err(|_| OrchestratorError::DriverPanicked)?;
        self.session = Some(session);
        Ok(())
    }

    fn spawn_driver(
        &mut self,
        session: BatchSession,
        jobs: Vec<(JobId, String)>,
        context: &RunContext,
    ) -> Result<StopHandle, OrchestratorError> {
        self.pacer.set_min_interval(context.config.min_request_delay());
        let runtime = match tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(err) => {
                self.session = Some(session);
                return Err(err.into());
            }
        };
        let stop = StopHandle::new();
        let job = DriverJob {
            fetcher: RetryingFetcher::new(
                self.transport.clone(),
                RetryPolicy::from_config(&context.config),
                self.pacer.clone(),
            ),
            pipeline: context.pipeline.clone(),
            sink: self.sink.clone(),
            stop: stop.clone(),
            timeout: context.config.request_timeout(),
            checkpoint: self.checkpoint.clone(),
        };

        // The session is handed over only once the thread exists, so a failed
        // spawn leaves it in place.
        let (handoff, received) = mpsc::channel::<(BatchSession, Vec<(JobId, String)>)>();
        let spawned = thread::Builder::new()
            .name("mslearn-driver".to_string())
            .spawn(move || {
                let (session, jobs) = received.recv().unwrap_or_default();
                runtime.block_on(job.run(session, jobs))
            });
        let handle = match spawned {
            Ok(handle) => handle,
            Err(err) => {
                self.session = Some(session);
                return Err(err.into());
            }
        };
        let _ = handoff.send((session, jobs));
        self.session = None;
        self.driver = Some(Driver {
            handle,
            stop: stop.clone(),
        });
        Ok(stop)
    }
}

struct DriverJob {
    fetcher: RetryingFetcher,
    pipeline: Pipeline,
    sink: Arc<dyn ProgressSink>,
    stop: StopHandle,
    timeout: Duration,
    checkpoint: Option<Checkpoint>,
}

impl DriverJob {
    async fn run(self, mut session: BatchSession, jobs: Vec<(JobId, String)>) -> BatchSession {
        for (finished, (job_id, url)) in jobs.into_iter().enumerate() {
            if self.stop.is_stopped() {
                break;
            }
            session = self.process(session, job_id, &url).await;
            self.save_checkpoint(&session, finished + 1);
        }
        if self.stop.is_stopped() {
            session = self.send(session, Msg::StopRequested { in_flight: None });
        }
        session = self.send(session, Msg::BatchFinished);
        let counters = session.counters();
        mslearn_info!(
            "batch finished: processed={} succeeded={} rejected={} failed={} skipped={}",
            counters.processed,
            counters.succeeded,
            counters.rejected,
            counters.failed,
            counters.skipped
        );
        session
    }

    async fn process(&self, session: BatchSession, job_id: JobId, url: &str) -> BatchSession {
        let session = self.stage(session, job_id, ProcessingState::Validating);
        let validation = session
            .entry(job_id)
            .map(|entry| entry.source.validation());
        match validation {
            Some(v) if v.valid => {}
            other => {
                let reason = other
                    .and_then(|v| v.reason)
                    .unwrap_or(ValidationError::Malformed);
                return self.fail(session, job_id, FailureReason::Validation(reason));
            }
        }
        if self.stop.is_stopped() {
            return self.stop_now(session, job_id);
        }

        let session = self.stage(session, job_id, ProcessingState::Fetching);
        let fetched = self
            .fetcher
            .fetch_until_cancelled(url, self.timeout, self.stop.token())
            .await;
        if self.stop.is_stopped() {
            return self.stop_now(session, job_id);
        }
        let page = match fetched.page() {
            Some(page) => page,
            None => return self.fail(session, job_id, fetch_failure(&fetched)),
        };

        let session = self.stage(session, job_id, ProcessingState::Extracting);
        let doc = match self.pipeline.extract(&page) {
            Ok(doc) => doc,
            Err(err) => return self.fail(session, job_id, FailureReason::Extraction(err)),
        };
        if self.stop.is_stopped() {
            return self.stop_now(session, job_id);
        }

        let session = self.stage(session, job_id, ProcessingState::Scoring);
        let record = self.pipeline.assess(doc, session.quality_threshold());
        self.send(session, Msg::RecordAssembled { job_id, record })
    }

    fn save_checkpoint(&self, session: &BatchSession, finished: usize) {
        let Some(checkpoint) = self.checkpoint.as_ref().filter(|c| c.is_due(finished)) else {
            return;
        };
        if let Err(err) = checkpoint.save(session) {
            mslearn_warn!("progress checkpoint failed: {err}");
        }
    }

    fn stage(&self, session: BatchSession, job_id: JobId, stage: ProcessingState) -> BatchSession {
        self.send(session, Msg::StageStarted { job_id, stage })
    }

    fn fail(&self, session: BatchSession, job_id: JobId, reason: FailureReason) -> BatchSession {
        mslearn_warn!("job {job_id} failed: {reason}");
        self.send(session, Msg::JobFailed { job_id, reason })
    }

    fn stop_now(&self, session: BatchSession, job_id: JobId) -> BatchSession {
        mslearn_debug!("job {job_id}: stop observed between stages");
        self.send(
            session,
            Msg::StopRequested {
                in_flight: Some(job_id),
            },
        )
    }

    fn send(&self, session: BatchSession, msg: Msg) -> BatchSession {
        apply(session, msg, self.sink.as_ref()).0
    }
}

/// Runs `update`, forwards emitted events and collects jobs to process.
fn apply(
    session: BatchSession,
    msg: Msg,
    sink: &dyn ProgressSink,
) -> (BatchSession, Vec<(JobId, String)>) {
    let (session, effects) = update(session, msg);
    let mut jobs = Vec::new();
    for effect in effects {
        match effect {
            Effect::Emit(event) => sink.emit(event),
            Effect::Process { job_id, url } => jobs.push((job_id, url)),
        }
    }
    (session, jobs)
}

fn fetch_failure(result: &FetchResult) -> FailureReason {
    let message = || {
        let detail = result.message.as_deref().unwrap_or("no response body");
        format!("{detail} after {} attempt(s)", result.attempts)
    };
    match result.status {
        FetchStatus::HttpError(code) if is_transient_status(code) => {
            FailureReason::Network { message: message() }
        }
        FetchStatus::HttpError(code) => FailureReason::Http(code),
        FetchStatus::Timeout
        | FetchStatus::NetworkError
        | FetchStatus::Cancelled
        | FetchStatus::Ok => FailureReason::Network { message: message() },
    }
}
