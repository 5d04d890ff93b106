//! JSON bodies exchanged with the backend.
use serde::Deserialize;
use serde_json::Value;
use threshlab_core::{Metrics, PipelinePhase, SessionSnapshot, Thumbnails};

#[derive(Debug, Deserialize)]
pub(crate) struct NewSessionResponse {
    #[serde(default)]
    pub(crate) session_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct SessionResponse {
    #[serde(default)]
    pub(crate) session_data: Option<SessionSnapshot>,
    #[serde(default)]
    pub(crate) thumbnails: Option<Thumbnails>,
}

impl SessionResponse {
    /// The inner thumbnail map wins; the top-level one fills in when it is empty.
    pub(crate) fn into_snapshot(self) -> SessionSnapshot {
        let mut snapshot = self.session_data.unwrap_or_default();
        if snapshot.thumbnails.is_empty() {
            if let Some(outer) = self.thumbnails {
                snapshot.thumbnails = outer;
            }
        }
        snapshot
    }
}

/// Acknowledgement shared by the single-field setting endpoints.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct AckResponse {
    #[serde(default)]
    pub(crate) success: Option<bool>,
    #[serde(flatten)]
    pub(crate) reason: ErrorBody,
}

#[derive(Debug, Deserialize)]
pub(crate) struct InitUploadResponse {
    #[serde(default)]
    pub(crate) job_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum ChunkStatus {
    Pending,
    Partial,
    Complete,
    Error,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChunkResponse {
    pub(crate) status: ChunkStatus,
    #[serde(default)]
    pub(crate) filename: Option<String>,
    #[serde(default)]
    pub(crate) stored_filename: Option<String>,
    #[serde(default)]
    pub(crate) thumbnail_url: Option<String>,
    #[serde(default, alias = "thumbnails")]
    pub(crate) all_session_thumbnails: Option<Thumbnails>,
    #[serde(flatten)]
    pub(crate) reason: ErrorBody,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RunPipelineResponse {
    #[serde(default)]
    pub(crate) job_id: Option<String>,
    #[serde(default)]
    pub(crate) status: Option<PipelinePhase>,
    #[serde(default)]
    pub(crate) message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MetricsResponse {
    #[serde(default)]
    pub(crate) success: bool,
    #[serde(default)]
    pub(crate) metrics: Option<Metrics>,
    #[serde(flatten)]
    pub(crate) reason: ErrorBody,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    message: Option<Value>,
    #[serde(default)]
    detail: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

impl ErrorBody {
    /// First of `message`, `detail` or `error` that is present.
    pub(crate) fn into_reason(self) -> Option<String> {
        [self.message, self.detail, self.error]
            .into_iter()
            .flatten()
            .find(|value| !value.is_null())
            .map(|value| match value {
                Value::String(text) => text,
                other => other.to_string(),
            })
    }
}

pub(crate) fn error_reason(body: &[u8]) -> Option<String> {
    serde_json::from_slice::<ErrorBody>(body)
        .ok()?
        .into_reason()
}

#[cfg(test)]
mod tests {
    use super::*;
    use threshlab_core::ThumbnailSet;

    #[test]
    fn reason_prefers_message_then_detail_then_error() {
        assert_eq!(
            error_reason(br#"{"detail": "Invalid session ID", "error": "x"}"#).as_deref(),
            Some("Invalid session ID")
        );
        assert_eq!(
            error_reason(br#"{"error": "Invalid parameter name"}"#).as_deref(),
            Some("Invalid parameter name")
        );
        assert_eq!(error_reason(b"<html>oops</html>"), None);
    }

    #[test]
    fn outer_thumbnails_fill_an_empty_inner_map() {
        let response: SessionResponse = serde_json::from_str(
            r#"{"session_data": {"thres_params": {}}, "thumbnails": {"dataset": "/uploads/d.png"}}"#,
        )
        .unwrap();
        let snapshot = response.into_snapshot();
        assert_eq!(
            snapshot.thumbnails.dataset,
            Some(ThumbnailSet::Single("/uploads/d.png".to_string()))
        );
    }

    #[test]
    fn chunk_response_accepts_either_thumbnail_key() {
        let reply: ChunkResponse = serde_json::from_str(
            r#"{"status": "complete", "filename": "j_clip.mp4", "thumbnails": {"mirror": "/uploads/m.png"}}"#,
        )
        .unwrap();
        assert_eq!(reply.status, ChunkStatus::Complete);
        assert!(reply.all_session_thumbnails.is_some());

        let reply: ChunkResponse = serde_json::from_str(r#"{"status": "queued"}"#).unwrap();
        assert_eq!(reply.status, ChunkStatus::Unknown);
    }
}
