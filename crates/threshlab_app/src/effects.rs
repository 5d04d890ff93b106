use std::path::PathBuf;
use std::time::Duration;

use lab_logging::{lab_debug, lab_info, lab_warn};
use threshlab_core::{Effect, Msg, SettingKind};
use threshlab_engine::{ApiError, ClientSettings, EngineEvent, EngineHandle};

/// Engine outcome routed back to the app.
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    Msg(Msg),
    Download {
        reference: String,
        result: Result<PathBuf, String>,
    },
}

pub struct EffectRunner {
    engine: EngineHandle,
}

impl EffectRunner {
    pub fn new(settings: ClientSettings) -> Result<Self, ApiError> {
        lab_info!("Connecting to backend at {}", settings.base_url);
        Ok(Self {
            engine: EngineHandle::new(settings)?,
        })
    }

    pub fn run(&self, effects: Vec<Effect>) {
        for effect in effects {
            lab_debug!("Effect {:?}", effect);
            match effect {
                Effect::CreateSession => self.engine.create_session(),
                Effect::FetchSession { session_id } => self.engine.fetch_session(session_id),
                Effect::StartSessionRefresh { session_id } => {
                    lab_info!("Keep-fresh on for session {}", session_id);
                    self.engine.start_refresh(session_id);
                }
                Effect::StopSessionRefresh => self.engine.stop_refresh(),
                Effect::UploadFiles {
                    session_id,
                    category,
                    files,
                } => {
                    lab_info!("Upload {} file(s) to {}", files.len(), category);
                    self.engine.upload(session_id, category, files);
                }
                Effect::DeleteCategory {
                    session_id,
                    category,
                } => self.engine.delete(session_id, category),
                Effect::UpdateThreshold {
                    session_id,
                    key,
                    value,
                } => self.engine.update_threshold(session_id, key, value),
                Effect::UpdatePipelineConfig {
                    session_id,
                    process,
                    enabled,
                } => self
                    .engine
                    .update_pipeline_config(session_id, process, enabled),
                Effect::RestoreDefaults { session_id } => self.engine.restore_defaults(session_id),
                Effect::RunPipeline { session_id } => self.engine.run_pipeline(session_id),
                Effect::StartStatusPolling { job_id } => self.engine.start_polling(job_id),
                Effect::StopStatusPolling { job_id } => self.engine.stop_polling(job_id),
                Effect::FetchMetrics { session_id } => self.engine.fetch_metrics(session_id),
            }
        }
    }

    pub fn download(&self, reference: &str, dir: PathBuf) {
        self.engine.download(reference, dir);
    }

    pub fn next(&self, timeout: Duration) -> Option<Incoming> {
        self.engine.recv_timeout(timeout).map(route_event)
    }
}

fn reason(err: ApiError) -> String {
    lab_warn!("Backend request failed: {}", err);
    err.message
}

pub(crate) fn route_event(event: EngineEvent) -> Incoming {
    let msg = match event {
        EngineEvent::SessionCreated(result) => Msg::SessionCreated(result.map_err(reason)),
        EngineEvent::SessionFetched { result, .. } => Msg::SessionFetched(result.map_err(reason)),
        EngineEvent::UploadFileStarted {
            category,
            index,
            file_name,
        } => Msg::UploadFileStarted {
            category,
            index,
            file_name,
        },
        EngineEvent::UploadProgress {
            category,
            index,
            file_name,
            percent,
        } => Msg::UploadProgress {
            category,
            index,
            file_name,
            percent,
        },
        EngineEvent::UploadFileCompleted(file) => Msg::UploadFileCompleted(file),
        EngineEvent::UploadFileFailed {
            category,
            index,
            file_name,
            error,
        } => Msg::UploadFileFailed {
            category,
            index,
            file_name,
            reason: reason(error),
        },
        EngineEvent::UploadBatchFinished { category, .. } => Msg::UploadBatchFinished { category },
        EngineEvent::DeleteFinished { category, result } => Msg::DeleteFinished {
            category,
            result: result.map_err(reason),
        },
        EngineEvent::ThresholdUpdated { name, result } => Msg::SettingApplied {
            setting: SettingKind::Threshold(name),
            result: result.map_err(reason),
        },
        EngineEvent::PipelineConfigUpdated { process, result } => Msg::SettingApplied {
            setting: SettingKind::Process(process),
            result: result.map_err(reason),
        },
        EngineEvent::DefaultsRestored(result) => Msg::SettingApplied {
            setting: SettingKind::RestoreDefaults,
            result: result.map_err(reason),
        },
        EngineEvent::PipelineStarted(result) => Msg::PipelineStarted(result.map_err(reason)),
        EngineEvent::StatusPolled { job_id, report } => {
            Msg::PipelineStatusPolled { job_id, report }
        }
        EngineEvent::PollFailed {
            job_id,
            error,
            gave_up,
        } => Msg::PipelinePollFailed {
            job_id,
            reason: reason(error),
            gave_up,
        },
        EngineEvent::MetricsFetched(result) => Msg::MetricsFetched(result.map_err(reason)),
        EngineEvent::DownloadFinished { reference, result } => {
            return Incoming::Download {
                reference,
                result: result.map_err(reason),
            }
        }
    };
    Incoming::Msg(msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use threshlab_core::{FileCategory, ProcessName};
    use threshlab_engine::FailureKind;

    #[test]
    fn failures_become_plain_reasons() {
        let event = EngineEvent::PipelineConfigUpdated {
            process: ProcessName::PatternThresholding,
            result: Err(ApiError {
                kind: FailureKind::HttpStatus(400),
                message: "Invalid session ID".to_string(),
            }),
        };

        assert_eq!(
            route_event(event),
            Incoming::Msg(Msg::SettingApplied {
                setting: SettingKind::Process(ProcessName::PatternThresholding),
                result: Err("Invalid session ID".to_string()),
            })
        );
    }

    #[test]
    fn batch_counts_are_dropped_for_the_core() {
        let event = EngineEvent::UploadBatchFinished {
            category: FileCategory::Pattern,
            succeeded: 2,
            failed: 1,
        };

        assert_eq!(
            route_event(event),
            Incoming::Msg(Msg::UploadBatchFinished {
                category: FileCategory::Pattern
            })
        );
    }
}
