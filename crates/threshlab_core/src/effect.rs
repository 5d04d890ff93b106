use std::path::PathBuf;

use crate::{FileCategory, JobId, ParamValue, ProcessName, SessionId, ThresholdKey};

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    CreateSession,
    FetchSession {
        session_id: SessionId,
    },
    StartSessionRefresh {
        session_id: SessionId,
    },
    StopSessionRefresh,
    UploadFiles {
        session_id: SessionId,
        category: FileCategory,
        files: Vec<PathBuf>,
    },
    DeleteCategory {
        session_id: SessionId,
        category: FileCategory,
    },
    UpdateThreshold {
        session_id: SessionId,
        key: ThresholdKey,
        value: ParamValue,
    },
    UpdatePipelineConfig {
        session_id: SessionId,
        process: ProcessName,
        enabled: bool,
    },
    RestoreDefaults {
        session_id: SessionId,
    },
    RunPipeline {
        session_id: SessionId,
    },
    StartStatusPolling {
        job_id: JobId,
    },
    StopStatusPolling {
        job_id: JobId,
    },
    FetchMetrics {
        session_id: SessionId,
    },
}
