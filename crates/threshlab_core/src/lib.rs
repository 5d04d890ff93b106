//! Threshlab core: pure state machine and view-model helpers.
mod effect;
mod msg;
mod state;
mod types;
mod update;
mod view_model;

pub use effect::Effect;
pub use msg::{Msg, SettingKind};
pub use state::{AppState, Bootstrap, Notice, NoticeLevel, Tab};
pub use types::{
    default_processes, default_threshold_params, file_display_name, FileCategory, JobId, Metrics, ParamValue,
    PipelinePhase, PipelineStart, PipelineStatusReport, ProcessName, ProcessSelection, SessionId,
    SessionSnapshot, ThresholdKey, ThumbnailRef, ThumbnailSet, Thumbnails, UnknownCategory,
    UploadedFile, DEFAULT_OBJECT_PROMPT, DEFAULT_PATTERN_THRESHOLD, DEFAULT_SOLID_THRESHOLD,
    OBJECT_PROMPT_PARAM, PATTERN_THRESHOLD_PARAM, SOLID_THRESHOLD_PARAM,
};
pub use update::update;
pub use view_model::{
    AppViewModel, FileProgressView, PipelineView, ThresholdRow, UploadControlView,
};
