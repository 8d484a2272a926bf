use crate::{FailureReason, JobId, ProcessingState, SourceUrl, TrainingRecord};

#[derive(Debug, Clone, PartialEq)]
pub enum Msg {
    /// New URLs for the batch, in submission order. Duplicates are refused here.
    UrlsSubmitted(Vec<SourceUrl>),
    /// The driver entered a non-terminal pipeline stage for a job.
    StageStarted {
        job_id: JobId,
        stage: ProcessingState,
    },
    /// The job could not be validated, fetched or extracted.
    JobFailed { job_id: JobId, reason: FailureReason },
    /// Scoring finished; the record decides Accepted or Rejected.
    RecordAssembled {
        job_id: JobId,
        record: TrainingRecord,
    },
    /// Stop observed by the driver. `in_flight` is the job whose stage just finished.
    StopRequested { in_flight: Option<JobId> },
    /// Manual retry of a failed URL after the batch.
    RetryRequested { url: String },
    /// The driver's queue is drained.
    BatchFinished,
}
