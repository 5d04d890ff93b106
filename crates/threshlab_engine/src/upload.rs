use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::BytesMut;
use futures_util::{stream, StreamExt};
use lab_logging::{lab_debug, lab_info, lab_warn};
use threshlab_core::{file_display_name, FileCategory, SessionId, UploadedFile};
use tokio::io::AsyncReadExt;

use crate::api::{ChunkUpload, SessionApi, DEFAULT_CHUNK_SIZE};
use crate::{ApiError, EngineEvent, EventSink, FailureKind};

/// Byte range of one chunk within a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSpan {
    pub index: u64,
    pub offset: u64,
    pub len: u64,
}

/// Splits a file into fixed-size chunks. An empty file still yields one empty chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    file_size: u64,
    chunk_size: u64,
}

impl ChunkPlan {
    pub fn new(file_size: u64, chunk_size: u64) -> Self {
        Self {
            file_size,
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn total_chunks(&self) -> u64 {
        self.file_size.div_ceil(self.chunk_size).max(1)
    }

    pub fn chunks(&self) -> impl Iterator<Item = ChunkSpan> + '_ {
        (0..self.total_chunks()).map(move |index| {
            let offset = index * self.chunk_size;
            ChunkSpan {
                index,
                offset,
                len: self.chunk_size.min(self.file_size - offset),
            }
        })
    }
}

/// Percent shown after chunk `index` of `total` was accepted, rounded half up.
pub fn progress_percent(index: u64, total: u64) -> u8 {
    let total = total.max(1);
    let done = (index + 1).min(total);
    ((200 * done + total) / (2 * total)).min(100) as u8
}

/// Sends batches of files for one category, one chunk at a time per file.
pub struct Uploader {
    api: Arc<dyn SessionApi>,
    chunk_size: u64,
    parallel_files: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchSummary {
    pub succeeded: usize,
    pub failed: usize,
}

impl Uploader {
    pub fn new(api: Arc<dyn SessionApi>) -> Self {
        Self {
            api,
            chunk_size: DEFAULT_CHUNK_SIZE,
            parallel_files: 1,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Files of one batch sent concurrently. Chunks of a file never are.
    pub fn with_parallel_files(mut self, parallel_files: usize) -> Self {
        self.parallel_files = parallel_files.max(1);
        self
    }

    /// Uploads every file; a failed file never stops its siblings.
    pub async fn upload_batch(
        &self,
        session_id: &SessionId,
        category: FileCategory,
        files: &[PathBuf],
        sink: &dyn EventSink,
    ) -> BatchSummary {
        lab_info!(
            "Uploading {} file(s) to {} for session {}",
            files.len(),
            category,
            session_id
        );
        let outcomes: Vec<bool> = stream::iter(files.iter().cloned().enumerate())
            .map(move |(index, path)| async move {
                self.upload_file(session_id, category, index, &path, sink)
                    .await
            })
            .buffer_unordered(self.parallel_files)
            .collect()
            .await;

        let succeeded = outcomes.iter().filter(|ok| **ok).count();
        let summary = BatchSummary {
            succeeded,
            failed: outcomes.len() - succeeded,
        };
        lab_info!(
            "Upload batch for {} finished: {} ok, {} failed",
            category,
            summary.succeeded,
            summary.failed
        );
        sink.emit(EngineEvent::UploadBatchFinished {
            category,
            succeeded: summary.succeeded,
            failed: summary.failed,
        });
        summary
    }

    async fn upload_file(
        &self,
        session_id: &SessionId,
        category: FileCategory,
        index: usize,
        path: &Path,
        sink: &dyn EventSink,
    ) -> bool {
        let file_name = file_display_name(path);
        sink.emit(EngineEvent::UploadFileStarted {
            category,
            index,
            file_name: file_name.clone(),
        });
        match self
            .send_file(session_id, category, index, path, &file_name, sink)
            .await
        {
            Ok(uploaded) => {
                sink.emit(EngineEvent::UploadFileCompleted(uploaded));
                true
            }
            Err(error) => {
                lab_warn!("Upload of {} failed: {}", file_name, error);
                sink.emit(EngineEvent::UploadFileFailed {
                    category,
                    index,
                    file_name,
                    error,
                });
                false
            }
        }
    }

    async fn send_file(
        &self,
        session_id: &SessionId,
        category: FileCategory,
        index: usize,
        path: &Path,
        file_name: &str,
        sink: &dyn EventSink,
    ) -> Result<UploadedFile, ApiError> {
        let mut file = tokio::fs::File::open(path).await?;
        let size = file.metadata().await?.len();
        let plan = ChunkPlan::new(size, self.chunk_size);
        let total = plan.total_chunks();
        let job_id = self.api.init_upload().await?;
        lab_debug!(
            "Upload job {} for {}: {} bytes in {} chunk(s)",
            job_id,
            file_name,
            size,
            total
        );

        for span in plan.chunks() {
            let mut data = BytesMut::zeroed(span.len as usize);
            file.read_exact(&mut data).await?;
            let reply = self
                .api
                .upload_chunk(ChunkUpload {
                    session_id,
                    job_id: &job_id,
                    file_name,
                    category,
                    index: span.index,
                    total,
                    data: data.freeze(),
                })
                .await?;
            let last = span.index + 1 == total;
            if reply.complete != last {
                return Err(ApiError::new(
                    FailureKind::Rejected,
                    format!(
                        "server reported chunk {} of {} as {}",
                        span.index + 1,
                        total,
                        if reply.complete { "complete" } else { "incomplete" }
                    ),
                ));
            }
            sink.emit(EngineEvent::UploadProgress {
                category,
                index,
                file_name: file_name.to_string(),
                percent: progress_percent(span.index, total),
            });
            if last {
                return Ok(UploadedFile {
                    category,
                    index,
                    file_name: file_name.to_string(),
                    stored_filename: reply.stored_filename,
                    thumbnail_url: reply.thumbnail_url,
                    session_thumbnails: reply.session_thumbnails,
                });
            }
        }
        Err(ApiError::new(
            FailureKind::Rejected,
            "server did not report the upload complete",
        ))
    }
}
