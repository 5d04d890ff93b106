use std::collections::BTreeMap;

use crate::view_model::{
    AppViewModel, FileProgressView, PipelineView, ThresholdRow, UploadControlView,
};
use crate::{
    default_processes, default_threshold_params, FileCategory, JobId, Metrics, ParamValue,
    PipelinePhase, PipelineStart, PipelineStatusReport, ProcessName, SessionId, SessionSnapshot,
    UploadedFile,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tab {
    #[default]
    Training,
    AdvancedSettings,
    Metrics,
}

/// Where the app is in obtaining its session id.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Bootstrap {
    #[default]
    NotStarted,
    Pending,
    Ready,
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Info,
    Warning,
    Danger,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub id: u64,
    pub level: NoticeLevel,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub(crate) struct FileProgress {
    pub(crate) name: String,
    pub(crate) percent: u8,
    pub(crate) failed: bool,
}

/// Transient state of one category's upload control.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub(crate) struct UploadControl {
    pub(crate) in_flight: bool,
    pub(crate) files: Vec<FileProgress>,
    /// Bumped after every batch so the picker accepts the same file again.
    pub(crate) selection_generation: u64,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub(crate) struct PipelineRun {
    pub(crate) phase: PipelinePhase,
    pub(crate) job_id: Option<JobId>,
    pub(crate) message: String,
    pub(crate) start_time: Option<f64>,
    pub(crate) duration_seconds: Option<f64>,
    pub(crate) download_url: Option<String>,
    pub(crate) starting: bool,
    pub(crate) polling: bool,
    pub(crate) poll_error: Option<String>,
    /// Polling gave up while the job was still queued/running.
    pub(crate) status_unknown: bool,
    pub(crate) start_error: Option<String>,
}

impl PipelineRun {
    /// A new run is refused while one is starting or observed as queued/running.
    pub(crate) fn blocks_new_run(&self) -> bool {
        self.starting || (self.phase.is_active() && !self.status_unknown)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppState {
    session_id: Option<SessionId>,
    bootstrap: Bootstrap,
    session_data: Option<SessionSnapshot>,
    refresh_error: Option<String>,
    keep_fresh: bool,
    refresh_running: bool,
    active_tab: Tab,
    uploads: BTreeMap<FileCategory, UploadControl>,
    pipeline: PipelineRun,
    metrics: Metrics,
    metrics_loading: bool,
    notices: Vec<Notice>,
    next_notice_id: u64,
    dirty: bool,
}

impl Default for AppState {
    fn default() -> Self {
        Self::with_keep_fresh(true)
    }
}

impl AppState {
    /// Keep-fresh enabled, matching the browser default.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_keep_fresh(keep_fresh: bool) -> Self {
        Self {
            session_id: None,
            bootstrap: Bootstrap::NotStarted,
            session_data: None,
            refresh_error: None,
            keep_fresh,
            refresh_running: false,
            active_tab: Tab::Training,
            uploads: FileCategory::ALL
                .into_iter()
                .map(|category| (category, UploadControl::default()))
                .collect(),
            pipeline: PipelineRun::default(),
            metrics: Metrics::default(),
            metrics_loading: false,
            notices: Vec::new(),
            next_notice_id: 1,
            dirty: false,
        }
    }

    pub fn session_id(&self) -> Option<&SessionId> {
        self.session_id.as_ref()
    }

    pub fn session_data(&self) -> Option<&SessionSnapshot> {
        self.session_data.as_ref()
    }

    pub fn bootstrap(&self) -> &Bootstrap {
        &self.bootstrap
    }

    pub fn pipeline_phase(&self) -> PipelinePhase {
        self.pipeline.phase
    }

    pub fn pipeline_job_id(&self) -> Option<&str> {
        self.pipeline.job_id.as_deref()
    }

    pub fn is_polling(&self) -> bool {
        self.pipeline.polling
    }

    pub fn is_refreshing(&self) -> bool {
        self.refresh_running
    }

    pub fn is_pipeline_starting(&self) -> bool {
        self.pipeline.starting
    }

    pub fn is_uploading(&self, category: FileCategory) -> bool {
        self.uploads
            .get(&category)
            .is_some_and(|control| control.in_flight)
    }

    pub fn any_upload_in_flight(&self) -> bool {
        self.uploads.values().any(|control| control.in_flight)
    }

    pub fn notices(&self) -> &[Notice] {
        &self.notices
    }

    pub fn metrics(&self) -> Metrics {
        self.metrics
    }

    pub fn is_metrics_loading(&self) -> bool {
        self.metrics_loading
    }

    pub fn keep_fresh(&self) -> bool {
        self.keep_fresh
    }

    /// Reason the latest session fetch failed, cleared by the next success.
    pub fn refresh_error(&self) -> Option<&str> {
        self.refresh_error.as_deref()
    }

    /// Returns whether anything changed since the last call, and clears the flag.
    pub fn consume_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub(crate) fn push_notice(&mut self, level: NoticeLevel, text: impl Into<String>) {
        let id = self.next_notice_id;
        self.next_notice_id += 1;
        self.notices.push(Notice {
            id,
            level,
            text: text.into(),
        });
        self.mark_dirty();
    }

    pub(crate) fn dismiss_notice(&mut self, id: u64) {
        let before = self.notices.len();
        self.notices.retain(|notice| notice.id != id);
        if self.notices.len() != before {
            self.mark_dirty();
        }
    }

    pub(crate) fn begin_bootstrap(&mut self) {
        self.bootstrap = Bootstrap::Pending;
        self.mark_dirty();
    }

    pub(crate) fn attach_session(&mut self, session_id: SessionId) {
        self.session_id = Some(session_id);
        self.bootstrap = Bootstrap::Ready;
        self.mark_dirty();
    }

    pub(crate) fn fail_bootstrap(&mut self, reason: String) {
        self.bootstrap = Bootstrap::Failed(reason);
        self.mark_dirty();
    }

    pub(crate) fn set_keep_fresh(&mut self, keep_fresh: bool) {
        self.keep_fresh = keep_fresh;
        self.mark_dirty();
    }

    pub(crate) fn set_refresh_running(&mut self, running: bool) {
        self.refresh_running = running;
    }

    pub(crate) fn apply_snapshot(&mut self, snapshot: SessionSnapshot) {
        self.session_data = Some(snapshot);
        self.refresh_error = None;
        self.mark_dirty();
    }

    /// Stale data stays in place; only the error is recorded.
    pub(crate) fn record_refresh_error(&mut self, reason: String) {
        if self.refresh_error.as_deref() != Some(reason.as_str()) {
            self.refresh_error = Some(reason);
            self.mark_dirty();
        }
    }

    pub(crate) fn select_tab(&mut self, tab: Tab) {
        if self.active_tab != tab {
            self.active_tab = tab;
            self.mark_dirty();
        }
    }

    fn snapshot_mut(&mut self) -> &mut SessionSnapshot {
        self.session_data.get_or_insert_with(SessionSnapshot::default)
    }

    pub(crate) fn set_threshold_locally(&mut self, name: &str, value: ParamValue) {
        self.snapshot_mut()
            .thres_params
            .insert(name.to_string(), value);
        self.mark_dirty();
    }

    pub(crate) fn set_process_locally(&mut self, process: ProcessName, enabled: bool) {
        self.snapshot_mut()
            .pipeline_processes
            .insert(process, enabled);
        self.mark_dirty();
    }

    pub(crate) fn begin_upload(&mut self, category: FileCategory, file_names: Vec<String>) {
        let control = self.uploads.entry(category).or_default();
        control.in_flight = true;
        control.files = file_names
            .into_iter()
            .map(|name| FileProgress {
                name,
                ..FileProgress::default()
            })
            .collect();
        self.mark_dirty();
    }

    /// Files are addressed by batch position; names may repeat within a batch.
    fn file_progress_mut(
        &mut self,
        category: FileCategory,
        index: usize,
    ) -> Option<&mut FileProgress> {
        let control = self.uploads.get_mut(&category)?;
        if !control.in_flight {
            return None;
        }
        control.files.get_mut(index)
    }

    pub(crate) fn start_file(&mut self, category: FileCategory, index: usize) {
        if let Some(progress) = self.file_progress_mut(category, index) {
            progress.percent = 0;
            progress.failed = false;
            self.mark_dirty();
        }
    }

    /// Progress only moves forward within one file's upload.
    pub(crate) fn apply_upload_progress(
        &mut self,
        category: FileCategory,
        index: usize,
        percent: u8,
    ) {
        let percent = percent.min(100);
        let changed = match self.file_progress_mut(category, index) {
            Some(progress) if !progress.failed && percent > progress.percent => {
                progress.percent = percent;
                true
            }
            _ => false,
        };
        if changed {
            self.mark_dirty();
        }
    }

    pub(crate) fn fail_file(&mut self, category: FileCategory, index: usize) {
        if let Some(progress) = self.file_progress_mut(category, index) {
            progress.percent = 0;
            progress.failed = true;
            self.mark_dirty();
        }
    }

    pub(crate) fn complete_file(&mut self, file: UploadedFile) {
        if let Some(progress) = self.file_progress_mut(file.category, file.index) {
            progress.percent = 100;
        }
        let category = file.category;
        let snapshot = self.snapshot_mut();
        match (file.session_thumbnails, file.thumbnail_url) {
            (Some(all), _) if !all.is_empty() => {
                snapshot.thumbnails = all;
            }
            (_, Some(reference)) => snapshot.thumbnails.record_upload(category, reference),
            _ => {}
        }
        self.mark_dirty();
    }

    pub(crate) fn finish_upload(&mut self, category: FileCategory) {
        let control = self.uploads.entry(category).or_default();
        control.in_flight = false;
        control.files.clear();
        control.selection_generation += 1;
        self.mark_dirty();
    }

    pub(crate) fn begin_pipeline_start(&mut self) {
        self.pipeline.starting = true;
        self.pipeline.start_error = None;
        self.pipeline.poll_error = None;
        self.mark_dirty();
    }

    pub(crate) fn pipeline(&self) -> &PipelineRun {
        &self.pipeline
    }

    /// Replaces the previous run with the newly accepted one.
    pub(crate) fn accept_pipeline_start(&mut self, start: PipelineStart) {
        self.pipeline = PipelineRun {
            phase: start.phase,
            job_id: Some(start.job_id),
            message: start.message,
            polling: start.phase.is_active(),
            ..PipelineRun::default()
        };
        self.mark_dirty();
    }

    pub(crate) fn reject_pipeline_start(&mut self, reason: String) {
        self.pipeline.starting = false;
        self.pipeline.start_error = Some(reason);
        self.mark_dirty();
    }

    pub(crate) fn apply_status_report(&mut self, report: PipelineStatusReport) {
        let run = &mut self.pipeline;
        run.phase = report.phase;
        run.message = report.message;
        run.start_time = report.start_time;
        run.duration_seconds = report.duration_seconds;
        if report.download_url.is_some() {
            run.download_url = report.download_url;
        }
        run.poll_error = None;
        if run.phase.is_terminal() {
            run.polling = false;
        }
        self.mark_dirty();
    }

    pub(crate) fn record_poll_failure(&mut self, reason: String, gave_up: bool) {
        let run = &mut self.pipeline;
        run.poll_error = Some(reason);
        if gave_up {
            run.polling = false;
            run.status_unknown = run.phase.is_active();
        }
        self.mark_dirty();
    }

    pub(crate) fn stop_polling(&mut self) {
        self.pipeline.polling = false;
    }

    pub(crate) fn begin_metrics_fetch(&mut self) {
        self.metrics_loading = true;
        self.mark_dirty();
    }

    /// `None` keeps the previous values.
    pub(crate) fn finish_metrics_fetch(&mut self, metrics: Option<Metrics>) {
        if let Some(metrics) = metrics {
            self.metrics = metrics;
        }
        self.metrics_loading = false;
        self.mark_dirty();
    }

    pub fn view(&self) -> AppViewModel {
        let snapshot = self.session_data.as_ref();

        let uploads = FileCategory::ALL
            .into_iter()
            .map(|category| {
                let control = self.uploads.get(&category).cloned().unwrap_or_default();
                UploadControlView {
                    category,
                    title: category.title().to_string(),
                    thumbnails: snapshot
                        .map(|s| {
                            s.thumbnails
                                .references(category)
                                .into_iter()
                                .map(str::to_string)
                                .collect()
                        })
                        .unwrap_or_default(),
                    busy: control.in_flight,
                    files: control
                        .files
                        .iter()
                        .map(|f| FileProgressView {
                            name: f.name.clone(),
                            percent: f.percent,
                            failed: f.failed,
                        })
                        .collect(),
                    selection_generation: control.selection_generation,
                }
            })
            .collect();

        let mut processes = default_processes();
        if let Some(s) = snapshot {
            if !s.pipeline_processes.is_empty() {
                processes = s.pipeline_processes.clone();
            }
        }

        let mut thresholds = default_threshold_params();
        if let Some(s) = snapshot {
            thresholds.extend(s.thres_params.clone());
        }

        let run = &self.pipeline;
        let download_url = match run.phase {
            PipelinePhase::Completed => run.download_url.clone(),
            _ => None,
        };

        AppViewModel {
            active_tab: self.active_tab,
            session_id: self.session_id.as_ref().map(|id| id.as_str().to_string()),
            bootstrap: self.bootstrap.clone(),
            keep_fresh: self.keep_fresh,
            has_session_data: snapshot.is_some(),
            refresh_error: self.refresh_error.clone(),
            uploads,
            processes: processes.into_iter().collect(),
            thresholds: thresholds
                .into_iter()
                .map(|(name, value)| ThresholdRow { name, value })
                .collect(),
            pipeline: PipelineView {
                phase: run.phase,
                job_label: run
                    .job_id
                    .as_deref()
                    .map(|id| id.chars().take(8).collect()),
                message: run.message.clone(),
                start_time: run.start_time,
                duration_seconds: run.duration_seconds,
                download_url,
                polling: run.polling,
                poll_error: run.poll_error.clone(),
                status_unknown: run.status_unknown,
                start_error: run.start_error.clone(),
                run_enabled: self.session_id.is_some() && !run.blocks_new_run(),
            },
            metrics: self.metrics,
            metrics_loading: self.metrics_loading,
            notices: self.notices.clone(),
            dirty: self.dirty,
        }
    }
}
