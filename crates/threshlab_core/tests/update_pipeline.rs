use std::sync::Once;

use pretty_assertions::assert_eq;
use threshlab_core::{
    update, AppState, Effect, Msg, PipelinePhase, PipelineStart, PipelineStatusReport, SessionId,
};

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(lab_logging::initialize_for_tests);
}

fn session_state() -> AppState {
    let (state, _) = update(
        AppState::with_keep_fresh(false),
        Msg::SessionAttached(SessionId::new("s1")),
    );
    state
}

fn started(state: AppState, job_id: &str, phase: PipelinePhase) -> (AppState, Vec<Effect>) {
    let (state, _) = update(state, Msg::RunPipelineClicked);
    update(
        state,
        Msg::PipelineStarted(Ok(PipelineStart {
            job_id: job_id.to_string(),
            phase,
            message: "Pipeline job queued".to_string(),
        })),
    )
}

fn report(phase: PipelinePhase) -> PipelineStatusReport {
    PipelineStatusReport {
        phase,
        message: String::new(),
        ..PipelineStatusReport::default()
    }
}

fn polled(state: AppState, job_id: &str, report: PipelineStatusReport) -> (AppState, Vec<Effect>) {
    update(
        state,
        Msg::PipelineStatusPolled {
            job_id: job_id.to_string(),
            report,
        },
    )
}

#[test]
fn run_click_requests_pipeline_and_blocks_until_answer() {
    init_logging();
    let (state, effects) = update(session_state(), Msg::RunPipelineClicked);

    assert_eq!(
        effects,
        vec![Effect::RunPipeline {
            session_id: SessionId::new("s1")
        }]
    );
    assert!(state.is_pipeline_starting());
    assert!(!state.view().pipeline.run_enabled);

    let (state, effects) = update(state, Msg::RunPipelineClicked);
    assert!(effects.is_empty());
    assert_eq!(state.notices().len(), 1);
}

#[test]
fn accepted_start_begins_polling() {
    init_logging();
    let (state, effects) = started(session_state(), "job-1", PipelinePhase::Queued);

    assert_eq!(
        effects,
        vec![Effect::StartStatusPolling {
            job_id: "job-1".to_string()
        }]
    );
    assert!(state.is_polling());
    assert_eq!(state.pipeline_phase(), PipelinePhase::Queued);
    assert_eq!(state.view().pipeline.job_label.as_deref(), Some("job-1"));
}

#[test]
fn run_rejected_while_queued_or_running() {
    init_logging();
    let (state, _) = started(session_state(), "job-1", PipelinePhase::Queued);
    let (state, effects) = update(state, Msg::RunPipelineClicked);
    assert!(effects.is_empty());
    assert_eq!(
        state.notices().last().unwrap().text,
        "A pipeline is already running or queued."
    );

    let (state, _) = polled(state, "job-1", report(PipelinePhase::Running));
    let (state, effects) = update(state, Msg::RunPipelineClicked);
    assert!(effects.is_empty());
    assert!(!state.view().pipeline.run_enabled);
}

#[test]
fn polling_stops_exactly_on_terminal_status() {
    init_logging();
    let (state, _) = started(session_state(), "job-1", PipelinePhase::Queued);
    let (state, effects) = polled(state, "job-1", report(PipelinePhase::Queued));
    assert!(effects.is_empty());
    let (state, effects) = polled(state, "job-1", report(PipelinePhase::Running));
    assert!(effects.is_empty());
    assert!(state.is_polling());

    let done = PipelineStatusReport {
        phase: PipelinePhase::Completed,
        message: "Pipeline completed successfully".to_string(),
        start_time: Some(1_700_000_000.0),
        duration_seconds: Some(42.5),
        download_url: Some("/download/job-1".to_string()),
    };
    let (state, effects) = polled(state, "job-1", done);

    assert_eq!(
        effects,
        vec![Effect::StopStatusPolling {
            job_id: "job-1".to_string()
        }]
    );
    assert!(!state.is_polling());
    let view = state.view();
    assert_eq!(view.pipeline.phase, PipelinePhase::Completed);
    assert_eq!(view.pipeline.download_url.as_deref(), Some("/download/job-1"));
    assert_eq!(view.pipeline.duration_seconds, Some(42.5));
    assert!(view.pipeline.run_enabled);

    // A straggling report after the terminal one changes nothing.
    let (state, effects) = polled(state, "job-1", report(PipelinePhase::Running));
    assert!(effects.is_empty());
    assert_eq!(state.pipeline_phase(), PipelinePhase::Completed);
}

#[test]
fn completed_without_output_has_no_download() {
    init_logging();
    let (state, _) = started(session_state(), "job-2", PipelinePhase::Queued);
    let (state, effects) = polled(state, "job-2", report(PipelinePhase::CompletedNoOutput));

    assert_eq!(effects.len(), 1);
    assert_eq!(state.view().pipeline.download_url, None);
    assert!(state.view().pipeline.run_enabled);
}

#[test]
fn failed_job_allows_new_run() {
    init_logging();
    let (state, _) = started(session_state(), "job-3", PipelinePhase::Queued);
    let (state, _) = polled(state, "job-3", report(PipelinePhase::Failed));
    let (_state, effects) = update(state, Msg::RunPipelineClicked);

    assert_eq!(
        effects,
        vec![Effect::RunPipeline {
            session_id: SessionId::new("s1")
        }]
    );
}

#[test]
fn reports_for_other_jobs_are_ignored() {
    init_logging();
    let (state, _) = started(session_state(), "job-1", PipelinePhase::Queued);
    let (state, effects) = polled(state, "job-old", report(PipelinePhase::Completed));

    assert!(effects.is_empty());
    assert_eq!(state.pipeline_phase(), PipelinePhase::Queued);
    assert!(state.is_polling());
}

#[test]
fn start_error_surfaces_notice() {
    init_logging();
    let (state, _) = update(session_state(), Msg::RunPipelineClicked);
    let (state, effects) = update(
        state,
        Msg::PipelineStarted(Err("Please upload a dataset first".to_string())),
    );

    assert!(effects.is_empty());
    assert!(!state.is_pipeline_starting());
    assert_eq!(
        state.notices().last().unwrap().text,
        "Pipeline Error: Please upload a dataset first"
    );
    assert!(state.view().pipeline.run_enabled);
}

#[test]
fn transient_poll_failure_keeps_polling() {
    init_logging();
    let (state, _) = started(session_state(), "job-1", PipelinePhase::Queued);
    let (state, effects) = update(
        state,
        Msg::PipelinePollFailed {
            job_id: "job-1".to_string(),
            reason: "timeout".to_string(),
            gave_up: false,
        },
    );

    assert!(effects.is_empty());
    assert!(state.is_polling());
    assert_eq!(state.view().pipeline.poll_error.as_deref(), Some("timeout"));

    let (state, _) = polled(state, "job-1", report(PipelinePhase::Running));
    assert_eq!(state.view().pipeline.poll_error, None);
}

#[test]
fn giving_up_marks_status_unknown_and_unblocks_run() {
    init_logging();
    let (state, _) = started(session_state(), "job-1", PipelinePhase::Queued);
    let (state, effects) = update(
        state,
        Msg::PipelinePollFailed {
            job_id: "job-1".to_string(),
            reason: "connection refused".to_string(),
            gave_up: true,
        },
    );

    assert_eq!(
        effects,
        vec![Effect::StopStatusPolling {
            job_id: "job-1".to_string()
        }]
    );
    let view = state.view();
    assert!(!view.pipeline.polling);
    assert!(view.pipeline.status_unknown);
    assert_eq!(view.pipeline.phase, PipelinePhase::Queued);
    assert!(view.pipeline.run_enabled);
}

#[test]
fn shutdown_stops_polling() {
    init_logging();
    let (state, _) = started(session_state(), "job-1", PipelinePhase::Queued);
    let (state, effects) = update(state, Msg::Shutdown);

    assert_eq!(
        effects,
        vec![Effect::StopStatusPolling {
            job_id: "job-1".to_string()
        }]
    );
    assert!(!state.is_polling());
}

#[test]
fn status_report_parses_backend_document() {
    let report: PipelineStatusReport = serde_json::from_str(
        r#"{"status": "completed_no_output", "message": "No frames matched", "start_time": 1700000000.5, "duration_seconds": 3.25}"#,
    )
    .unwrap();

    assert_eq!(report.phase, PipelinePhase::CompletedNoOutput);
    assert_eq!(report.download_url, None);
    assert_eq!(report.duration_seconds, Some(3.25));
}
