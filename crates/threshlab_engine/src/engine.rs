use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use lab_logging::{lab_debug, lab_info};
use threshlab_core::{FileCategory, JobId, ParamValue, ProcessName, SessionId, ThresholdKey};
use tokio::runtime::Runtime;

use crate::api::{ClientSettings, ReqwestApi, SessionApi};
use crate::tasks::{poll_job_status, refresh_session, PollSettings, TaskGuard};
use crate::upload::Uploader;
use crate::{ApiError, ChannelEventSink, EngineEvent, EventSink, FailureKind};

enum EngineCommand {
    CreateSession,
    FetchSession {
        session_id: SessionId,
    },
    StartRefresh {
        session_id: SessionId,
    },
    StopRefresh,
    Upload {
        session_id: SessionId,
        category: FileCategory,
        files: Vec<PathBuf>,
    },
    Delete {
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
    StartPolling {
        job_id: JobId,
    },
    StopPolling {
        job_id: JobId,
    },
    FetchMetrics {
        session_id: SessionId,
    },
    Download {
        reference: String,
        dir: PathBuf,
    },
}

/// Front of the IO thread. Dropping the handle cancels every background task.
pub struct EngineHandle {
    cmd_tx: mpsc::Sender<EngineCommand>,
    event_rx: mpsc::Receiver<EngineEvent>,
}

impl EngineHandle {
    pub fn new(settings: ClientSettings) -> Result<Self, ApiError> {
        let api = Arc::new(ReqwestApi::new(&settings)?);
        Self::with_api(api, settings)
    }

    /// Runs the engine against any [`SessionApi`] implementation.
    pub fn with_api(api: Arc<dyn SessionApi>, settings: ClientSettings) -> Result<Self, ApiError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("threshlab-engine")
            .build()
            .map_err(|err| ApiError::new(FailureKind::Io, err.to_string()))?;
        let (cmd_tx, cmd_rx) = mpsc::channel();
        let (event_tx, event_rx) = mpsc::channel();

        thread::spawn(move || {
            let mut worker = Worker {
                api,
                settings,
                sink: Arc::new(ChannelEventSink::new(event_tx)),
                refresh: None,
                pollers: HashMap::new(),
            };
            while let Ok(command) = cmd_rx.recv() {
                worker.handle(&runtime, command);
            }
            // Guards cancel their tasks before the runtime shuts down.
            worker.stop_all();
            drop(worker);
            runtime.shutdown_timeout(Duration::from_secs(1));
            lab_debug!("Engine thread stopped");
        });

        Ok(Self { cmd_tx, event_rx })
    }

    fn send(&self, command: EngineCommand) {
        let _ = self.cmd_tx.send(command);
    }

    pub fn create_session(&self) {
        self.send(EngineCommand::CreateSession);
    }

    pub fn fetch_session(&self, session_id: SessionId) {
        self.send(EngineCommand::FetchSession { session_id });
    }

    /// Replaces any running refresh task.
    pub fn start_refresh(&self, session_id: SessionId) {
        self.send(EngineCommand::StartRefresh { session_id });
    }

    pub fn stop_refresh(&self) {
        self.send(EngineCommand::StopRefresh);
    }

    pub fn upload(&self, session_id: SessionId, category: FileCategory, files: Vec<PathBuf>) {
        self.send(EngineCommand::Upload {
            session_id,
            category,
            files,
        });
    }

    pub fn delete(&self, session_id: SessionId, category: FileCategory) {
        self.send(EngineCommand::Delete {
            session_id,
            category,
        });
    }

    pub fn update_threshold(&self, session_id: SessionId, key: ThresholdKey, value: ParamValue) {
        self.send(EngineCommand::UpdateThreshold {
            session_id,
            key,
            value,
        });
    }

    pub fn update_pipeline_config(&self, session_id: SessionId, process: ProcessName, enabled: bool) {
        self.send(EngineCommand::UpdatePipelineConfig {
            session_id,
            process,
            enabled,
        });
    }

    pub fn restore_defaults(&self, session_id: SessionId) {
        self.send(EngineCommand::RestoreDefaults { session_id });
    }

    pub fn run_pipeline(&self, session_id: SessionId) {
        self.send(EngineCommand::RunPipeline { session_id });
    }

    pub fn start_polling(&self, job_id: JobId) {
        self.send(EngineCommand::StartPolling { job_id });
    }

    pub fn stop_polling(&self, job_id: JobId) {
        self.send(EngineCommand::StopPolling { job_id });
    }

    pub fn fetch_metrics(&self, session_id: SessionId) {
        self.send(EngineCommand::FetchMetrics { session_id });
    }

    pub fn download(&self, reference: impl Into<String>, dir: PathBuf) {
        self.send(EngineCommand::Download {
            reference: reference.into(),
            dir,
        });
    }

    pub fn try_recv(&self) -> Option<EngineEvent> {
        self.event_rx.try_recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<EngineEvent> {
        self.event_rx.recv_timeout(timeout).ok()
    }
}

/// State owned by the engine thread.
struct Worker {
    api: Arc<dyn SessionApi>,
    settings: ClientSettings,
    sink: Arc<dyn EventSink>,
    refresh: Option<TaskGuard>,
    pollers: HashMap<JobId, TaskGuard>,
}

impl Worker {
    fn handle(&mut self, runtime: &Runtime, command: EngineCommand) {
        match command {
            EngineCommand::StartRefresh { session_id } => {
                let guard = TaskGuard::new();
                runtime.spawn(refresh_session(
                    self.api.clone(),
                    session_id,
                    self.settings.refresh_interval,
                    self.sink.clone(),
                    guard.token(),
                ));
                self.refresh = Some(guard);
            }
            EngineCommand::StopRefresh => {
                if self.refresh.take().is_some() {
                    lab_info!("Session refresh cancelled");
                }
            }
            EngineCommand::StartPolling { job_id } => {
                let guard = TaskGuard::new();
                let settings = PollSettings {
                    interval: self.settings.poll_interval,
                    max_failures: self.settings.max_poll_failures,
                };
                runtime.spawn(poll_job_status(
                    self.api.clone(),
                    job_id.clone(),
                    settings,
                    self.sink.clone(),
                    guard.token(),
                ));
                self.pollers.insert(job_id, guard);
            }
            EngineCommand::StopPolling { job_id } => {
                self.pollers.remove(&job_id);
            }
            command => {
                let api = self.api.clone();
                let sink = self.sink.clone();
                let uploader = Uploader::new(self.api.clone())
                    .with_chunk_size(self.settings.chunk_size)
                    .with_parallel_files(self.settings.parallel_files);
                runtime.spawn(async move {
                    handle_request(api.as_ref(), &uploader, command, sink.as_ref()).await;
                });
            }
        }
    }

    fn stop_all(&mut self) {
        self.refresh = None;
        self.pollers.clear();
    }
}

async fn handle_request(
    api: &dyn SessionApi,
    uploader: &Uploader,
    command: EngineCommand,
    sink: &dyn EventSink,
) {
    let event = match command {
        EngineCommand::CreateSession => EngineEvent::SessionCreated(api.create_session().await),
        EngineCommand::FetchSession { session_id } => {
            let result = api.fetch_session(&session_id).await;
            EngineEvent::SessionFetched { session_id, result }
        }
        EngineCommand::Upload {
            session_id,
            category,
            files,
        } => {
            // Per-file events are emitted by the uploader itself.
            uploader
                .upload_batch(&session_id, category, &files, sink)
                .await;
            return;
        }
        EngineCommand::Delete {
            session_id,
            category,
        } => EngineEvent::DeleteFinished {
            category,
            result: api.delete_category(&session_id, category).await,
        },
        EngineCommand::UpdateThreshold {
            session_id,
            key,
            value,
        } => EngineEvent::ThresholdUpdated {
            name: key.param_name().to_string(),
            result: api.update_threshold(&session_id, &key, &value).await,
        },
        EngineCommand::UpdatePipelineConfig {
            session_id,
            process,
            enabled,
        } => {
            let result = api
                .update_pipeline_config(&session_id, &process, enabled)
                .await;
            EngineEvent::PipelineConfigUpdated { process, result }
        }
        EngineCommand::RestoreDefaults { session_id } => {
            EngineEvent::DefaultsRestored(api.restore_defaults(&session_id).await)
        }
        EngineCommand::RunPipeline { session_id } => {
            EngineEvent::PipelineStarted(api.run_pipeline(&session_id).await)
        }
        EngineCommand::FetchMetrics { session_id } => {
            EngineEvent::MetricsFetched(api.fetch_metrics(&session_id).await)
        }
        EngineCommand::Download { reference, dir } => {
            let result = api.download(&reference, &dir).await;
            EngineEvent::DownloadFinished { reference, result }
        }
        EngineCommand::StartRefresh { .. }
        | EngineCommand::StopRefresh
        | EngineCommand::StartPolling { .. }
        | EngineCommand::StopPolling { .. } => return,
    };
    sink.emit(event);
}
