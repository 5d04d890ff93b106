use std::time::{Duration, Instant};

use serde_json::json;
use threshlab_core::{FileCategory, PipelinePhase, SessionId};
use threshlab_engine::{ClientSettings, EngineEvent, EngineHandle};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn settings_for(server: &MockServer) -> ClientSettings {
    ClientSettings {
        base_url: format!("{}/api", server.uri()),
        refresh_interval: Duration::from_millis(20),
        poll_interval: Duration::from_millis(20),
        ..ClientSettings::default()
    }
}

/// Waits for the first event matching `pred`, skipping others.
fn wait_for(
    engine: &EngineHandle,
    mut pred: impl FnMut(&EngineEvent) -> bool,
) -> Option<EngineEvent> {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if let Some(event) = engine.recv_timeout(Duration::from_millis(50)) {
            if pred(&event) {
                return Some(event);
            }
        }
    }
    None
}

#[tokio::test(flavor = "multi_thread")]
async fn engine_creates_session() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/new-session"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"session_id": "abc123"})))
        .mount(&server)
        .await;

    let engine = EngineHandle::new(settings_for(&server)).unwrap();
    engine.create_session();

    let event = wait_for(&engine, |e| matches!(e, EngineEvent::SessionCreated(_)));
    assert_eq!(
        event,
        Some(EngineEvent::SessionCreated(Ok(SessionId::new("abc123"))))
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn engine_polls_until_terminal() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/run-pipeline"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "job_id": "job-1",
            "status": "queued",
            "message": "Pipeline job queued"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/pipeline-status/job-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "running"})))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/pipeline-status/job-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "completed",
            "download_url": "/download/job-1.zip"
        })))
        .mount(&server)
        .await;

    let engine = EngineHandle::new(settings_for(&server)).unwrap();
    engine.run_pipeline(SessionId::new("s1"));
    let started = wait_for(&engine, |e| matches!(e, EngineEvent::PipelineStarted(_)));
    let start = match started {
        Some(EngineEvent::PipelineStarted(Ok(start))) => start,
        other => panic!("pipeline did not start: {other:?}"),
    };
    engine.start_polling(start.job_id.clone());

    let completed = wait_for(&engine, |e| {
        matches!(e, EngineEvent::StatusPolled { report, .. } if report.phase.is_terminal())
    });
    match completed {
        Some(EngineEvent::StatusPolled { job_id, report }) => {
            assert_eq!(job_id, "job-1");
            assert_eq!(report.phase, PipelinePhase::Completed);
        }
        other => panic!("unexpected {other:?}"),
    }

    std::thread::sleep(Duration::from_millis(100));
    let status_requests = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path().starts_with("/api/pipeline-status"))
        .count();
    assert_eq!(status_requests, 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn stop_refresh_halts_fetches() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/session/s1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"session_data": {}})))
        .mount(&server)
        .await;

    let engine = EngineHandle::new(settings_for(&server)).unwrap();
    engine.start_refresh(SessionId::new("s1"));
    assert!(wait_for(&engine, |e| matches!(e, EngineEvent::SessionFetched { .. })).is_some());

    engine.stop_refresh();
    std::thread::sleep(Duration::from_millis(100));
    while engine.try_recv().is_some() {}
    let before = server.received_requests().await.unwrap().len();
    std::thread::sleep(Duration::from_millis(120));
    assert_eq!(server.received_requests().await.unwrap().len(), before);
}

#[tokio::test(flavor = "multi_thread")]
async fn upload_failure_reaches_batch_finish() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/init-upload"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("clip.mp4");
    std::fs::write(&file, b"data").unwrap();

    let engine = EngineHandle::new(settings_for(&server)).unwrap();
    engine.upload(SessionId::new("s1"), FileCategory::Dataset, vec![file]);

    let finished = wait_for(&engine, |e| {
        matches!(e, EngineEvent::UploadBatchFinished { .. })
    });
    assert_eq!(
        finished,
        Some(EngineEvent::UploadBatchFinished {
            category: FileCategory::Dataset,
            succeeded: 0,
            failed: 1,
        })
    );
}
