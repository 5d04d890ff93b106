use std::fmt;
use std::path::PathBuf;

use threshlab_core::{
    FileCategory, JobId, Metrics, PipelineStart, PipelineStatusReport, ProcessName, SessionId,
    SessionSnapshot, UploadedFile,
};

/// Everything the engine reports back to the UI thread.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    SessionCreated(Result<SessionId, ApiError>),
    SessionFetched {
        session_id: SessionId,
        result: Result<SessionSnapshot, ApiError>,
    },
    UploadFileStarted {
        category: FileCategory,
        /// Position of the file within its batch.
        index: usize,
        file_name: String,
    },
    UploadProgress {
        category: FileCategory,
        index: usize,
        file_name: String,
        percent: u8,
    },
    UploadFileCompleted(UploadedFile),
    UploadFileFailed {
        category: FileCategory,
        index: usize,
        file_name: String,
        error: ApiError,
    },
    UploadBatchFinished {
        category: FileCategory,
        succeeded: usize,
        failed: usize,
    },
    DeleteFinished {
        category: FileCategory,
        result: Result<(), ApiError>,
    },
    ThresholdUpdated {
        name: String,
        result: Result<(), ApiError>,
    },
    PipelineConfigUpdated {
        process: ProcessName,
        result: Result<(), ApiError>,
    },
    DefaultsRestored(Result<(), ApiError>),
    PipelineStarted(Result<PipelineStart, ApiError>),
    StatusPolled {
        job_id: JobId,
        report: PipelineStatusReport,
    },
    PollFailed {
        job_id: JobId,
        error: ApiError,
        /// The poller reached its failure budget and stopped.
        gave_up: bool,
    },
    MetricsFetched(Result<Metrics, ApiError>),
    DownloadFinished {
        reference: String,
        result: Result<PathBuf, ApiError>,
    },
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: EngineEvent);
}

pub struct ChannelEventSink {
    tx: std::sync::mpsc::Sender<EngineEvent>,
}

impl ChannelEventSink {
    pub fn new(tx: std::sync::mpsc::Sender<EngineEvent>) -> Self {
        Self { tx }
    }
}

impl EventSink for ChannelEventSink {
    fn emit(&self, event: EngineEvent) {
        let _ = self.tx.send(event);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ApiError {
    pub kind: FailureKind,
    pub message: String,
}

impl ApiError {
    pub(crate) fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Human-readable reason without the failure class prefix.
    pub fn reason(&self) -> &str {
        &self.message
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    InvalidUrl,
    Network,
    Timeout,
    HttpStatus(u16),
    /// The backend answered `success: false` or `status: "error"`.
    Rejected,
    MalformedBody,
    Io,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::InvalidUrl => write!(f, "invalid url"),
            FailureKind::Network => write!(f, "network error"),
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::HttpStatus(code) => write!(f, "http status {code}"),
            FailureKind::Rejected => write!(f, "rejected by server"),
            FailureKind::MalformedBody => write!(f, "malformed response"),
            FailureKind::Io => write!(f, "io error"),
        }
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        ApiError::new(FailureKind::Io, err.to_string())
    }
}
