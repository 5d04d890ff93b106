use std::fs;
use std::time::Duration;

use serde_json::json;
use threshlab_engine::{
    download_file_name, AtomicFileWriter, ClientSettings, PersistError, ReqwestApi, SessionApi,
    Url,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[test]
fn atomic_writer_replaces_existing_file() {
    let dir = tempfile::tempdir().unwrap();
    let writer = AtomicFileWriter::new(dir.path().join("state"));

    writer.write("state.ron", b"(first)").unwrap();
    let path = writer.write("state.ron", b"(second)").unwrap();

    assert_eq!(fs::read_to_string(&path).unwrap(), "(second)");
    let entries = fs::read_dir(dir.path().join("state")).unwrap().count();
    assert_eq!(entries, 1);
}

#[test]
fn atomic_writer_rejects_path_like_names() {
    let dir = tempfile::tempdir().unwrap();
    let writer = AtomicFileWriter::new(dir.path().to_path_buf());

    for name in ["", "..", "../escape.txt", "a/b.txt"] {
        assert!(matches!(
            writer.write(name, b"x"),
            Err(PersistError::FileName(_))
        ));
    }
}

#[test]
fn uncommitted_file_leaves_nothing_behind() {
    let dir = tempfile::tempdir().unwrap();
    let writer = AtomicFileWriter::new(dir.path().to_path_buf());

    let pending = writer.begin("result.zip").unwrap();
    assert_eq!(pending.target(), dir.path().join("result.zip"));
    drop(pending);

    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn download_names_come_from_last_segment() {
    let url = Url::parse("http://localhost:5000/download/job-1.zip").unwrap();
    assert_eq!(download_file_name(&url), "job-1.zip");

    let url = Url::parse("http://localhost:5000/").unwrap();
    assert_eq!(download_file_name(&url), "download.bin");
}

#[tokio::test]
async fn download_streams_result_into_directory() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/download/job-1.zip"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"PK\x03\x04zipdata".to_vec()))
        .mount(&server)
        .await;

    let settings = ClientSettings {
        base_url: format!("{}/api", server.uri()),
        ..ClientSettings::default()
    };
    let dir = tempfile::tempdir().unwrap();
    let path = ReqwestApi::new(&settings)
        .unwrap()
        .download("/download/job-1.zip", dir.path())
        .await
        .unwrap();

    assert_eq!(path, dir.path().join("job-1.zip"));
    assert_eq!(fs::read(&path).unwrap(), b"PK\x03\x04zipdata");
}

#[tokio::test]
async fn missing_download_reports_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/download/nope.zip"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"detail": "Not Found"})))
        .mount(&server)
        .await;

    let settings = ClientSettings {
        base_url: format!("{}/api", server.uri()),
        ..ClientSettings::default()
    };
    let dir = tempfile::tempdir().unwrap();
    let err = ReqwestApi::new(&settings)
        .unwrap()
        .download("/download/nope.zip", dir.path())
        .await
        .unwrap_err();

    assert_eq!(err.reason(), "Not Found");
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}

/// Serves one response whose body trickles out a byte at a time.
async fn trickle_server(body: &'static [u8], gap: Duration) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = [0u8; 1024];
        let _ = socket.read(&mut request).await.unwrap();
        let head = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/zip\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        );
        socket.write_all(head.as_bytes()).await.unwrap();
        socket.flush().await.unwrap();
        for byte in body {
            tokio::time::sleep(gap).await;
            socket.write_all(&[*byte]).await.unwrap();
            socket.flush().await.unwrap();
        }
    });
    format!("http://{addr}/api")
}

#[tokio::test]
async fn slow_steady_download_outlives_request_timeout() {
    let base_url = trickle_server(b"PKzipped", Duration::from_millis(250)).await;
    let settings = ClientSettings {
        base_url,
        request_timeout: Duration::from_secs(1),
        ..ClientSettings::default()
    };
    let dir = tempfile::tempdir().unwrap();

    let path = ReqwestApi::new(&settings)
        .unwrap()
        .download("/downloads/job-1.zip", dir.path())
        .await
        .unwrap();

    assert_eq!(path, dir.path().join("job-1.zip"));
    assert_eq!(fs::read(&path).unwrap(), b"PKzipped");
}

#[tokio::test]
async fn stalled_download_is_abandoned() {
    let base_url = trickle_server(b"PK", Duration::from_secs(3)).await;
    let settings = ClientSettings {
        base_url,
        request_timeout: Duration::from_millis(500),
        ..ClientSettings::default()
    };
    let dir = tempfile::tempdir().unwrap();

    let result = ReqwestApi::new(&settings)
        .unwrap()
        .download("/downloads/job-1.zip", dir.path())
        .await;

    assert!(result.is_err());
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}
