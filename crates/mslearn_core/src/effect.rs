use crate::{JobId, ProgressEvent};

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Run the pipeline for this entry, in queue order.
    Process { job_id: JobId, url: String },
    /// Hand the event to the progress sink.
    Emit(ProgressEvent),
}
