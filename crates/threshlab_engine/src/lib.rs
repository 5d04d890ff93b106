//! Threshlab engine: HTTP client, chunked uploads, background polling and effect execution.
mod api;
mod download;
mod engine;
mod persist;
mod tasks;
mod types;
mod upload;
mod wire;

pub use api::{
    resolve_reference, ChunkReply, ChunkUpload, ClientSettings, ReqwestApi, SessionApi,
    DEFAULT_API_BASE_URL, DEFAULT_CHUNK_SIZE,
};
pub use download::download_file_name;
pub use engine::EngineHandle;
pub use persist::{ensure_dir, AtomicFileWriter, PendingFile, PersistError};
pub use tasks::{poll_job_status, refresh_session, PollSettings, TaskGuard};
pub use types::{ApiError, ChannelEventSink, EngineEvent, EventSink, FailureKind};
pub use upload::{progress_percent, BatchSummary, ChunkPlan, ChunkSpan, Uploader};
pub use url::Url;
