use std::path::PathBuf;

use crate::{
    FileCategory, JobId, Metrics, ParamValue, PipelineStart, PipelineStatusReport, ProcessName,
    SessionId, SessionSnapshot, Tab, ThresholdKey, UploadedFile,
};

/// Which single-field setting an acknowledgement refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingKind {
    Threshold(String),
    Process(ProcessName),
    RestoreDefaults,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Msg {
    /// Application loaded; request a fresh session.
    AppStarted,
    /// Reuse an existing backend session instead of creating one.
    SessionAttached(SessionId),
    /// Backend answered `GET /new-session`.
    SessionCreated(Result<SessionId, String>),
    /// User asked for a manual re-fetch of the session document.
    RefreshRequested,
    /// User switched the keep-fresh timer on or off.
    KeepFreshToggled(bool),
    /// Backend answered `GET /session/{id}`.
    SessionFetched(Result<SessionSnapshot, String>),
    /// User switched tabs.
    TabSelected(Tab),
    /// User picked files for one upload control.
    FilesSelected {
        category: FileCategory,
        files: Vec<PathBuf>,
    },
    /// Engine began sending a file.
    UploadFileStarted {
        category: FileCategory,
        index: usize,
        file_name: String,
    },
    /// Engine got a response for one chunk.
    UploadProgress {
        category: FileCategory,
        index: usize,
        file_name: String,
        percent: u8,
    },
    /// Engine saw a `complete` chunk response.
    UploadFileCompleted(UploadedFile),
    /// Engine aborted one file; siblings continue.
    UploadFileFailed {
        category: FileCategory,
        index: usize,
        file_name: String,
        reason: String,
    },
    /// Engine finished every file of the batch.
    UploadBatchFinished { category: FileCategory },
    /// User asked to delete every file of a category.
    DeleteClicked(FileCategory),
    /// Backend answered `POST /delete/{fileType}`.
    DeleteFinished {
        category: FileCategory,
        result: Result<(), String>,
    },
    /// User moved a threshold slider or edited the prompt.
    ThresholdEdited { key: ThresholdKey, value: ParamValue },
    /// User ticked or unticked a pipeline process.
    ProcessToggled { process: ProcessName, enabled: bool },
    /// User clicked Restore Defaults.
    RestoreDefaultsClicked,
    /// Backend acknowledged (or rejected) a single-field setting change.
    SettingApplied {
        setting: SettingKind,
        result: Result<(), String>,
    },
    /// User clicked Run Pipeline.
    RunPipelineClicked,
    /// Backend answered `POST /run-pipeline`.
    PipelineStarted(Result<PipelineStart, String>),
    /// One status poll succeeded.
    PipelineStatusPolled {
        job_id: JobId,
        report: PipelineStatusReport,
    },
    /// One status poll failed; `gave_up` when the poller stopped for good.
    PipelinePollFailed {
        job_id: JobId,
        reason: String,
        gave_up: bool,
    },
    /// User asked for fresh metrics.
    MetricsRequested,
    /// Backend answered `GET /metrics/{session_id}`.
    MetricsFetched(Result<Metrics, String>),
    /// User closed a notice.
    NoticeDismissed(u64),
    /// View is going away; release every background task.
    Shutdown,
}
