use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bytes::Bytes;
use lab_logging::{lab_debug, lab_info};
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use threshlab_core::{
    FileCategory, JobId, Metrics, ParamValue, PipelinePhase, PipelineStart, PipelineStatusReport,
    ProcessName, SessionId, SessionSnapshot, ThresholdKey, Thumbnails,
};
use url::Url;

use crate::download::stream_to_dir;
use crate::wire::{
    error_reason, AckResponse, ChunkResponse, ChunkStatus, InitUploadResponse, MetricsResponse,
    NewSessionResponse, RunPipelineResponse, SessionResponse,
};
use crate::{ApiError, FailureKind};

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:5000/api";
pub const DEFAULT_CHUNK_SIZE: u64 = 1024 * 1024;

#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub base_url: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub chunk_size: u64,
    pub refresh_interval: Duration,
    pub poll_interval: Duration,
    /// Consecutive status-poll failures before polling gives up; 0 never gives up.
    pub max_poll_failures: u32,
    pub parallel_files: usize,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE_URL.to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            chunk_size: DEFAULT_CHUNK_SIZE,
            refresh_interval: Duration::from_secs(3),
            poll_interval: Duration::from_secs(3),
            max_poll_failures: 5,
            parallel_files: 1,
        }
    }
}

/// One chunk of a file upload, as sent to `POST /upload-chunk`.
#[derive(Debug, Clone)]
pub struct ChunkUpload<'a> {
    pub session_id: &'a SessionId,
    pub job_id: &'a str,
    pub file_name: &'a str,
    pub category: FileCategory,
    pub index: u64,
    pub total: u64,
    pub data: Bytes,
}

/// Accepted chunk. `complete` is set on the response that assembled the file.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChunkReply {
    pub complete: bool,
    pub stored_filename: Option<String>,
    pub thumbnail_url: Option<String>,
    pub session_thumbnails: Option<Thumbnails>,
}

#[async_trait::async_trait]
pub trait SessionApi: Send + Sync {
    async fn create_session(&self) -> Result<SessionId, ApiError>;

    async fn fetch_session(&self, session_id: &SessionId) -> Result<SessionSnapshot, ApiError>;

    async fn update_threshold(
        &self,
        session_id: &SessionId,
        key: &ThresholdKey,
        value: &ParamValue,
    ) -> Result<(), ApiError>;

    async fn restore_defaults(&self, session_id: &SessionId) -> Result<(), ApiError>;

    async fn update_pipeline_config(
        &self,
        session_id: &SessionId,
        process: &ProcessName,
        enabled: bool,
    ) -> Result<(), ApiError>;

    async fn delete_category(
        &self,
        session_id: &SessionId,
        category: FileCategory,
    ) -> Result<(), ApiError>;

    async fn init_upload(&self) -> Result<JobId, ApiError>;

    async fn upload_chunk(&self, chunk: ChunkUpload<'_>) -> Result<ChunkReply, ApiError>;

    async fn run_pipeline(&self, session_id: &SessionId) -> Result<PipelineStart, ApiError>;

    async fn pipeline_status(&self, job_id: &str) -> Result<PipelineStatusReport, ApiError>;

    async fn fetch_metrics(&self, session_id: &SessionId) -> Result<Metrics, ApiError>;

    /// Streams a server-relative reference into `dir`, returning the written path.
    async fn download(&self, reference: &str, dir: &Path) -> Result<PathBuf, ApiError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestApi {
    client: reqwest::Client,
    /// Result files can take longer than `request_timeout`; only stalls abort them.
    download_client: reqwest::Client,
    base_url: Url,
}

impl ReqwestApi {
    pub fn new(settings: &ClientSettings) -> Result<Self, ApiError> {
        let base_url = Url::parse(settings.base_url.trim_end_matches('/'))
            .map_err(|err| ApiError::new(FailureKind::InvalidUrl, err.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::new(
                FailureKind::InvalidUrl,
                format!("{base_url} cannot carry endpoint paths"),
            ));
        }
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .build()
            .map_err(|err| ApiError::new(FailureKind::Network, err.to_string()))?;
        let download_client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .read_timeout(settings.request_timeout)
            .build()
            .map_err(|err| ApiError::new(FailureKind::Network, err.to_string()))?;
        Ok(Self {
            client,
            download_client,
            base_url,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Appends percent-encoded segments, so ids cannot escape their route.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| ApiError::new(FailureKind::InvalidUrl, "base URL cannot carry paths"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T, ApiError> {
        let response = self
            .client
            .get(self.endpoint(segments)?)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        read_json(response).await
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        body: &Value,
    ) -> Result<T, ApiError> {
        let response = self
            .client
            .post(self.endpoint(segments)?)
            .json(body)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        read_json(response).await
    }

    async fn post_ack(&self, segments: &[&str], body: &Value) -> Result<(), ApiError> {
        let ack: AckResponse = self.post_json(segments, body).await?;
        match ack.success {
            Some(false) => Err(ApiError::new(
                FailureKind::Rejected,
                ack.reason
                    .into_reason()
                    .unwrap_or_else(|| "request was not accepted".to_string()),
            )),
            _ => Ok(()),
        }
    }
}

#[async_trait::async_trait]
impl SessionApi for ReqwestApi {
    async fn create_session(&self) -> Result<SessionId, ApiError> {
        let response: NewSessionResponse = self.get_json(&["new-session"]).await?;
        let session_id = response
            .session_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ApiError::new(FailureKind::MalformedBody, "no session_id in response"))?;
        lab_info!("Created session {}", session_id);
        Ok(SessionId::new(session_id))
    }

    async fn fetch_session(&self, session_id: &SessionId) -> Result<SessionSnapshot, ApiError> {
        let response: SessionResponse = self
            .get_json(&["session", session_id.as_str()])
            .await?;
        Ok(response.into_snapshot())
    }

    async fn update_threshold(
        &self,
        session_id: &SessionId,
        key: &ThresholdKey,
        value: &ParamValue,
    ) -> Result<(), ApiError> {
        let body = threshold_body(session_id, key, value);
        lab_debug!("Updating threshold {}={}", key.wire_name(), value);
        self.post_ack(&["update-threshold"], &body).await
    }

    async fn restore_defaults(&self, session_id: &SessionId) -> Result<(), ApiError> {
        self.post_ack(&["restore-defaults"], &json!({ "session_id": session_id }))
            .await
    }

    async fn update_pipeline_config(
        &self,
        session_id: &SessionId,
        process: &ProcessName,
        enabled: bool,
    ) -> Result<(), ApiError> {
        let processes_config = BTreeMap::from([(process.clone(), enabled)]);
        self.post_ack(
            &["update-pipeline-config"],
            &json!({ "session_id": session_id, "processes_config": processes_config }),
        )
        .await
    }

    async fn delete_category(
        &self,
        session_id: &SessionId,
        category: FileCategory,
    ) -> Result<(), ApiError> {
        self.post_ack(
            &["delete", category.as_str()],
            &json!({ "session_id": session_id }),
        )
        .await
    }

    async fn init_upload(&self) -> Result<JobId, ApiError> {
        let response = self
            .client
            .post(self.endpoint(&["init-upload"])?)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let body: InitUploadResponse = read_json(response).await?;
        body.job_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ApiError::new(FailureKind::MalformedBody, "no job_id in response"))
    }

    async fn upload_chunk(&self, chunk: ChunkUpload<'_>) -> Result<ChunkReply, ApiError> {
        let length = chunk.data.len() as u64;
        let part = Part::stream_with_length(chunk.data, length).file_name(chunk.file_name.to_string());
        let form = Form::new()
            .part("chunk", part)
            .text("filename", chunk.file_name.to_string())
            .text("job_id", chunk.job_id.to_string())
            .text("chunk_index", chunk.index.to_string())
            .text("total_chunks", chunk.total.to_string())
            .text("file_type", chunk.category.as_str())
            .text("session_id", chunk.session_id.to_string());

        let response = self
            .client
            .post(self.endpoint(&["upload-chunk"])?)
            .multipart(form)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let reply: ChunkResponse = read_json(response).await?;

        match reply.status {
            ChunkStatus::Error => Err(ApiError::new(
                FailureKind::Rejected,
                reply
                    .reason
                    .into_reason()
                    .unwrap_or_else(|| format!("chunk {} rejected", chunk.index)),
            )),
            ChunkStatus::Complete => Ok(ChunkReply {
                complete: true,
                stored_filename: reply.stored_filename.or(reply.filename),
                thumbnail_url: reply.thumbnail_url,
                session_thumbnails: reply.all_session_thumbnails,
            }),
            ChunkStatus::Pending | ChunkStatus::Partial | ChunkStatus::Unknown => {
                Ok(ChunkReply::default())
            }
        }
    }

    async fn run_pipeline(&self, session_id: &SessionId) -> Result<PipelineStart, ApiError> {
        let response: RunPipelineResponse = self
            .post_json(&["run-pipeline"], &json!({ "session_id": session_id }))
            .await?;
        let job_id = response
            .job_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                ApiError::new(
                    FailureKind::MalformedBody,
                    response
                        .message
                        .clone()
                        .unwrap_or_else(|| "no job_id in response".to_string()),
                )
            })?;
        lab_info!("Pipeline job {} started for session {}", job_id, session_id);
        Ok(PipelineStart {
            job_id,
            phase: response.status.unwrap_or(PipelinePhase::Queued),
            message: response.message.unwrap_or_default(),
        })
    }

    async fn pipeline_status(&self, job_id: &str) -> Result<PipelineStatusReport, ApiError> {
        self.get_json(&["pipeline-status", job_id]).await
    }

    async fn fetch_metrics(&self, session_id: &SessionId) -> Result<Metrics, ApiError> {
        let response: MetricsResponse = self
            .get_json(&["metrics", session_id.as_str()])
            .await?;
        match (response.success, response.metrics) {
            (true, Some(metrics)) => Ok(metrics),
            _ => Err(ApiError::new(
                FailureKind::Rejected,
                response
                    .reason
                    .into_reason()
                    .unwrap_or_else(|| "metrics unavailable".to_string()),
            )),
        }
    }

    async fn download(&self, reference: &str, dir: &Path) -> Result<PathBuf, ApiError> {
        let url = resolve_reference(&self.base_url, reference)?;
        let response = self
            .download_client
            .get(url.clone())
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let response = check_status(response).await?;
        stream_to_dir(response, &url, dir).await
    }
}

/// Resolves a server-relative thumbnail or download reference.
///
/// Absolute paths land on the base URL's origin; absolute URLs pass through.
pub fn resolve_reference(base_url: &Url, reference: &str) -> Result<Url, ApiError> {
    base_url
        .join(reference.trim())
        .map_err(|err| ApiError::new(FailureKind::InvalidUrl, err.to_string()))
}

fn threshold_body(session_id: &SessionId, key: &ThresholdKey, value: &ParamValue) -> Value {
    let mut body = Map::new();
    body.insert("session_id".to_string(), json!(session_id));
    body.insert(key.field().to_string(), json!(key.wire_name()));
    body.insert("value".to_string(), json!(value));
    Value::Object(body)
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.bytes().await.unwrap_or_default();
    let reason = error_reason(&body).unwrap_or_else(|| status.to_string());
    Err(ApiError::new(FailureKind::HttpStatus(status.as_u16()), reason))
}

async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ApiError> {
    let response = check_status(response).await?;
    let body = response.bytes().await.map_err(map_reqwest_error)?;
    serde_json::from_slice(&body).map_err(|err| {
        let reason = error_reason(&body).unwrap_or_else(|| err.to_string());
        ApiError::new(FailureKind::MalformedBody, reason)
    })
}

pub(crate) fn map_reqwest_error(err: reqwest::Error) -> ApiError {
    if err.is_timeout() {
        return ApiError::new(FailureKind::Timeout, err.to_string());
    }
    if err.is_builder() {
        return ApiError::new(FailureKind::InvalidUrl, err.to_string());
    }
    ApiError::new(FailureKind::Network, err.to_string())
}
