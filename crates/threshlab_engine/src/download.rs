use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use lab_logging::lab_info;
use tokio::io::AsyncWriteExt;
use url::Url;

use crate::api::map_reqwest_error;
use crate::{ApiError, AtomicFileWriter, FailureKind, PersistError};

const FALLBACK_NAME: &str = "download.bin";

/// Local file name for a download: the last non-empty path segment.
pub fn download_file_name(url: &Url) -> String {
    url.path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .filter(|name| *name != "." && *name != "..")
        .map(str::to_string)
        .unwrap_or_else(|| FALLBACK_NAME.to_string())
}

pub(crate) async fn stream_to_dir(
    response: reqwest::Response,
    url: &Url,
    dir: &Path,
) -> Result<PathBuf, ApiError> {
    let name = download_file_name(url);
    let pending = AtomicFileWriter::new(dir.to_path_buf())
        .begin(&name)
        .map_err(persist_error)?;
    let mut file = tokio::fs::File::from_std(pending.reopen().map_err(persist_error)?);

    let mut written = 0u64;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(map_reqwest_error)?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    drop(file);

    let path = pending.commit().map_err(persist_error)?;
    lab_info!("Downloaded {} ({} bytes) to {:?}", url, written, path);
    Ok(path)
}

fn persist_error(err: PersistError) -> ApiError {
    ApiError::new(FailureKind::Io, err.to_string())
}
