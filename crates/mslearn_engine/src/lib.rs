//! Generator engine: network, extraction, persistence and the batch driver.
mod decode;
mod export;
mod extract;
mod fetch;
mod filename;
mod import;
mod orchestrator;
mod persist;
mod pipeline;

pub use decode::{decode_html, DecodeError, DecodedHtml};
pub use export::{
    chatml_item, export_session, write_trial_outputs, Checkpoint, DatasetExporter, ExportError,
    ExportOptions, ExportSummary, RecordFormat, TrialOutputs,
};
pub use extract::{Extractor, LearnPageExtractor, RawPage};
pub use fetch::{
    is_transient_status, request_timeout, FetchContractError, FetchResult, FetchSettings,
    FetchStatus, Pacer, ReqwestTransport, RetryPolicy, RetryingFetcher, Transport, TransportError,
    TransportErrorKind, TransportResponse,
};
pub use filename::dataset_slug;
pub use import::{
    import_url_file, parse_url_list, parse_url_table, ImportError, ImportReport, SkipReason,
    SkippedLine,
};
pub use orchestrator::{
    BatchOrchestrator, ChannelProgressSink, FnProgressSink, OrchestratorError, ProgressSink,
    StopHandle,
};
pub use persist::{ensure_output_dir, AtomicFileWriter, PersistError};
pub use pipeline::Pipeline;
