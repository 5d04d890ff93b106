use crate::{Bootstrap, FileCategory, Metrics, Notice, ParamValue, PipelinePhase, ProcessName, Tab};

#[derive(Debug, Clone, PartialEq)]
pub struct AppViewModel {
    pub active_tab: Tab,
    pub session_id: Option<String>,
    pub bootstrap: Bootstrap,
    pub keep_fresh: bool,
    pub has_session_data: bool,
    pub refresh_error: Option<String>,
    pub uploads: Vec<UploadControlView>,
    pub processes: Vec<(ProcessName, bool)>,
    pub thresholds: Vec<ThresholdRow>,
    pub pipeline: PipelineView,
    pub metrics: Metrics,
    pub metrics_loading: bool,
    pub notices: Vec<Notice>,
    pub dirty: bool,
}

impl AppViewModel {
    pub fn upload(&self, category: FileCategory) -> Option<&UploadControlView> {
        self.uploads.iter().find(|u| u.category == category)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadControlView {
    pub category: FileCategory,
    pub title: String,
    pub thumbnails: Vec<String>,
    pub busy: bool,
    pub files: Vec<FileProgressView>,
    pub selection_generation: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileProgressView {
    pub name: String,
    pub percent: u8,
    pub failed: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdRow {
    pub name: String,
    pub value: ParamValue,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PipelineView {
    pub phase: PipelinePhase,
    /// First eight characters of the job id.
    pub job_label: Option<String>,
    pub message: String,
    pub start_time: Option<f64>,
    pub duration_seconds: Option<f64>,
    /// Only set once the job completed with output.
    pub download_url: Option<String>,
    pub polling: bool,
    pub poll_error: Option<String>,
    pub status_unknown: bool,
    pub start_error: Option<String>,
    pub run_enabled: bool,
}
