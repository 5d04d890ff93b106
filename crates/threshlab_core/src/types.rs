//! Domain values shared by the state machine and the engine.
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Backend-issued identifier for upload and pipeline jobs.
pub type JobId = String;

/// Server-relative path to a preview image or result file.
pub type ThumbnailRef = String;

/// Name under which a local file is uploaded and reported.
pub fn file_display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Opaque session identifier issued by `GET /new-session`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown file category {0:?} (expected dataset, mirror or pattern)")]
pub struct UnknownCategory(pub String);

/// Upload target. Each category has its own upload control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileCategory {
    Dataset,
    Mirror,
    Pattern,
}

impl FileCategory {
    pub const ALL: [FileCategory; 3] = [
        FileCategory::Dataset,
        FileCategory::Mirror,
        FileCategory::Pattern,
    ];

    /// Name used in URLs and multipart fields.
    pub fn as_str(self) -> &'static str {
        match self {
            FileCategory::Dataset => "dataset",
            FileCategory::Mirror => "mirror",
            FileCategory::Pattern => "pattern",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            FileCategory::Dataset => "Dataset",
            FileCategory::Mirror => "Mirror Dataset",
            FileCategory::Pattern => "Training/Pattern Matching Data",
        }
    }

    /// Pattern data is a growing image set; the video categories hold one file.
    pub fn allows_multiple(self) -> bool {
        matches!(self, FileCategory::Pattern)
    }
}

impl fmt::Display for FileCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileCategory {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FileCategory::ALL
            .into_iter()
            .find(|category| category.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownCategory(s.to_string()))
    }
}

/// Pipeline stage that can be switched on or off per session.
///
/// The backend decides the key set; names it sends that we do not know are kept
/// in `Other` and round-tripped verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ProcessName {
    PatternThresholding,
    ModelObjectDetection,
    SolidColorDetection,
    Other(String),
}

impl ProcessName {
    pub const KNOWN: [ProcessName; 3] = [
        ProcessName::PatternThresholding,
        ProcessName::ModelObjectDetection,
        ProcessName::SolidColorDetection,
    ];

    pub fn label(&self) -> &str {
        match self {
            ProcessName::PatternThresholding => "Pattern Thresholding",
            ProcessName::ModelObjectDetection => "Model Object Detection",
            ProcessName::SolidColorDetection => "Solid Color Detection",
            ProcessName::Other(name) => name,
        }
    }
}

impl From<String> for ProcessName {
    fn from(name: String) -> Self {
        ProcessName::from(name.as_str())
    }
}

impl From<&str> for ProcessName {
    fn from(name: &str) -> Self {
        ProcessName::KNOWN
            .into_iter()
            .find(|known| known.label() == name)
            .unwrap_or_else(|| ProcessName::Other(name.to_string()))
    }
}

impl From<ProcessName> for String {
    fn from(name: ProcessName) -> Self {
        match name {
            ProcessName::Other(name) => name,
            known => known.label().to_string(),
        }
    }
}

impl fmt::Display for ProcessName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

pub type ProcessSelection = BTreeMap<ProcessName, bool>;

/// Every known process enabled, as a fresh backend session starts out.
pub fn default_processes() -> ProcessSelection {
    ProcessName::KNOWN.into_iter().map(|name| (name, true)).collect()
}

/// Threshold parameter value: integer slider, fractional slider, or prompt text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl ParamValue {
    /// Interprets user input as the narrowest matching value.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if let Ok(value) = trimmed.parse::<i64>() {
            return ParamValue::Integer(value);
        }
        match trimmed.parse::<f64>() {
            Ok(value) if value.is_finite() => ParamValue::Float(value),
            _ => ParamValue::Text(raw.to_string()),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Integer(value) => write!(f, "{value}"),
            ParamValue::Float(value) => write!(f, "{value:.2}"),
            ParamValue::Text(value) => f.write_str(value),
        }
    }
}

pub const PATTERN_THRESHOLD_PARAM: &str = "Pattern Thresholding";
pub const SOLID_THRESHOLD_PARAM: &str = "Solid Color Detection";
pub const OBJECT_PROMPT_PARAM: &str = "Object Detection Prompt";

pub const DEFAULT_PATTERN_THRESHOLD: i64 = 200;
pub const DEFAULT_SOLID_THRESHOLD: f64 = 0.60;
pub const DEFAULT_OBJECT_PROMPT: &str = "Analyze the image and determine with at least 70% confidence whether it contains man-made objects (buildings, houses, light poles, cars, sheds, or artificial structures) that affect depth; exclude natural elements like trees or paths in mostly tree-covered images, and explicitly state 'True' or 'False' before listing identified objects or explaining uncertainty.";

/// `(param name, threshold_type)` pairs the backend accepts under either key.
const THRESHOLD_TYPES: [(&str, &str); 3] = [
    (PATTERN_THRESHOLD_PARAM, "pattern_threshold"),
    (SOLID_THRESHOLD_PARAM, "solid_threshold"),
    (OBJECT_PROMPT_PARAM, "object_prompt"),
];

pub fn default_threshold_params() -> BTreeMap<String, ParamValue> {
    BTreeMap::from([
        (
            PATTERN_THRESHOLD_PARAM.to_string(),
            ParamValue::Integer(DEFAULT_PATTERN_THRESHOLD),
        ),
        (
            SOLID_THRESHOLD_PARAM.to_string(),
            ParamValue::Float(DEFAULT_SOLID_THRESHOLD),
        ),
        (
            OBJECT_PROMPT_PARAM.to_string(),
            ParamValue::Text(DEFAULT_OBJECT_PROMPT.to_string()),
        ),
    ])
}

/// How a threshold update names its target in the request body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThresholdKey {
    /// Sent as `param_name`.
    ParamName(String),
    /// Sent as `threshold_type` (`pattern_threshold`, `solid_threshold`, ...).
    ThresholdType(String),
}

impl ThresholdKey {
    /// Builds a key for `name`, preferring the `threshold_type` form when asked
    /// and the backend knows a type for that parameter.
    pub fn for_param(name: &str, by_type: bool) -> Self {
        if by_type {
            if let Some((_, kind)) = THRESHOLD_TYPES.iter().find(|(param, _)| *param == name) {
                return ThresholdKey::ThresholdType(kind.to_string());
            }
        }
        ThresholdKey::ParamName(name.to_string())
    }

    /// JSON field carrying the name.
    pub fn field(&self) -> &'static str {
        match self {
            ThresholdKey::ParamName(_) => "param_name",
            ThresholdKey::ThresholdType(_) => "threshold_type",
        }
    }

    pub fn wire_name(&self) -> &str {
        match self {
            ThresholdKey::ParamName(name) | ThresholdKey::ThresholdType(name) => name,
        }
    }

    /// Name under which the value appears in the session's `thres_params`.
    pub fn param_name(&self) -> &str {
        match self {
            ThresholdKey::ParamName(name) => name,
            ThresholdKey::ThresholdType(kind) => THRESHOLD_TYPES
                .iter()
                .find(|(_, known)| *known == kind.as_str())
                .map(|(param, _)| *param)
                .unwrap_or(kind.as_str()),
        }
    }
}

/// Thumbnail references for one category: a single preview or a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ThumbnailSet {
    Single(ThumbnailRef),
    Many(Vec<ThumbnailRef>),
}

impl ThumbnailSet {
    pub fn references(&self) -> Vec<&str> {
        match self {
            ThumbnailSet::Single(reference) => vec![reference.as_str()],
            ThumbnailSet::Many(references) => references.iter().map(String::as_str).collect(),
        }
    }

    fn push(&mut self, reference: ThumbnailRef) {
        match self {
            ThumbnailSet::Single(existing) => {
                let first = std::mem::take(existing);
                *self = ThumbnailSet::Many(vec![first, reference]);
            }
            ThumbnailSet::Many(references) => references.push(reference),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Thumbnails {
    #[serde(default)]
    pub dataset: Option<ThumbnailSet>,
    #[serde(default)]
    pub mirror: Option<ThumbnailSet>,
    #[serde(default)]
    pub pattern: Option<ThumbnailSet>,
}

impl Thumbnails {
    pub fn get(&self, category: FileCategory) -> Option<&ThumbnailSet> {
        match category {
            FileCategory::Dataset => self.dataset.as_ref(),
            FileCategory::Mirror => self.mirror.as_ref(),
            FileCategory::Pattern => self.pattern.as_ref(),
        }
    }

    fn slot_mut(&mut self, category: FileCategory) -> &mut Option<ThumbnailSet> {
        match category {
            FileCategory::Dataset => &mut self.dataset,
            FileCategory::Mirror => &mut self.mirror,
            FileCategory::Pattern => &mut self.pattern,
        }
    }

    pub fn references(&self, category: FileCategory) -> Vec<&str> {
        self.get(category)
            .map(ThumbnailSet::references)
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        FileCategory::ALL
            .into_iter()
            .all(|category| self.references(category).is_empty())
    }

    /// Records a freshly uploaded file's preview. Multi-file categories only grow.
    pub fn record_upload(&mut self, category: FileCategory, reference: ThumbnailRef) {
        let slot = self.slot_mut(category);
        if !category.allows_multiple() {
            *slot = Some(ThumbnailSet::Single(reference));
            return;
        }
        match slot {
            Some(set) => {
                if !set.references().contains(&reference.as_str()) {
                    set.push(reference);
                }
            }
            None => *slot = Some(ThumbnailSet::Many(vec![reference])),
        }
    }
}

/// Consolidated state document returned by `GET /session/{id}`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SessionSnapshot {
    #[serde(default)]
    pub thres_params: BTreeMap<String, ParamValue>,
    #[serde(default)]
    pub pipeline_processes: ProcessSelection,
    #[serde(default)]
    pub thumbnails: Thumbnails,
}

/// Backend pipeline job status. `Idle` is client-only: no job started yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelinePhase {
    #[default]
    Idle,
    Queued,
    Running,
    Completed,
    CompletedNoOutput,
    Failed,
}

impl PipelinePhase {
    pub fn is_active(self) -> bool {
        matches!(self, PipelinePhase::Queued | PipelinePhase::Running)
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PipelinePhase::Completed | PipelinePhase::CompletedNoOutput | PipelinePhase::Failed
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PipelinePhase::Idle => "idle",
            PipelinePhase::Queued => "queued",
            PipelinePhase::Running => "running",
            PipelinePhase::Completed => "completed",
            PipelinePhase::CompletedNoOutput => "completed_no_output",
            PipelinePhase::Failed => "failed",
        }
    }
}

impl fmt::Display for PipelinePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accepted `POST /run-pipeline` response.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineStart {
    pub job_id: JobId,
    pub phase: PipelinePhase,
    pub message: String,
}

/// One `GET /pipeline-status/{job_id}` observation.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PipelineStatusReport {
    #[serde(rename = "status")]
    pub phase: PipelinePhase,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub start_time: Option<f64>,
    #[serde(default)]
    pub duration_seconds: Option<f64>,
    #[serde(default)]
    pub download_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metrics {
    #[serde(default)]
    pub processed_frames: u64,
    #[serde(default)]
    pub detected_objects: u64,
    #[serde(default)]
    pub pattern_matches: u64,
    #[serde(default)]
    pub solid_color_frames: u64,
}

/// Result of a file whose final chunk the server reported `complete`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub category: FileCategory,
    /// Position of the file within its batch.
    pub index: usize,
    pub file_name: String,
    pub stored_filename: Option<String>,
    pub thumbnail_url: Option<ThumbnailRef>,
    /// Full thumbnail set for the session, when the server sends it.
    pub session_thumbnails: Option<Thumbnails>,
}
