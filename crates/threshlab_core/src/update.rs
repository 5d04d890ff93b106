use crate::{
    file_display_name, AppState, Effect, Msg, NoticeLevel, PipelinePhase, SessionId, SettingKind,
    Tab,
};

/// Pure update function: applies a message to state and returns any effects.
pub fn update(mut state: AppState, msg: Msg) -> (AppState, Vec<Effect>) {
    let effects = match msg {
        Msg::AppStarted => {
            if state.session_id().is_some() {
                Vec::new()
            } else {
                state.begin_bootstrap();
                vec![Effect::CreateSession]
            }
        }
        Msg::SessionAttached(session_id) | Msg::SessionCreated(Ok(session_id)) => {
            attach_session(&mut state, session_id)
        }
        Msg::SessionCreated(Err(reason)) => {
            state.push_notice(
                NoticeLevel::Danger,
                format!("Could not start a session: {reason}"),
            );
            state.fail_bootstrap(reason);
            Vec::new()
        }
        Msg::RefreshRequested => match state.session_id() {
            Some(session_id) => vec![Effect::FetchSession {
                session_id: session_id.clone(),
            }],
            None => Vec::new(),
        },
        Msg::KeepFreshToggled(enabled) => {
            state.set_keep_fresh(enabled);
            match (enabled, state.is_refreshing(), state.session_id().cloned()) {
                (true, false, Some(session_id)) => {
                    state.set_refresh_running(true);
                    vec![Effect::StartSessionRefresh { session_id }]
                }
                (false, true, _) => {
                    state.set_refresh_running(false);
                    vec![Effect::StopSessionRefresh]
                }
                _ => Vec::new(),
            }
        }
        Msg::SessionFetched(Ok(snapshot)) => {
            state.apply_snapshot(snapshot);
            Vec::new()
        }
        Msg::SessionFetched(Err(reason)) => {
            state.record_refresh_error(reason);
            Vec::new()
        }
        Msg::TabSelected(tab) => {
            state.select_tab(tab);
            match (tab, state.session_id().cloned()) {
                (Tab::Metrics, Some(session_id)) => {
                    state.begin_metrics_fetch();
                    vec![Effect::FetchMetrics { session_id }]
                }
                _ => Vec::new(),
            }
        }
        Msg::FilesSelected { category, files } => {
            if files.is_empty() {
                return (state, Vec::new());
            }
            let Some(session_id) = require_session(&mut state) else {
                return (state, Vec::new());
            };
            if state.is_uploading(category) {
                state.push_notice(
                    NoticeLevel::Warning,
                    format!("{} is still uploading.", category.title()),
                );
                return (state, Vec::new());
            }
            if files.len() > 1 && !category.allows_multiple() {
                state.push_notice(
                    NoticeLevel::Warning,
                    format!("{} accepts a single file.", category.title()),
                );
                return (state, Vec::new());
            }
            state.begin_upload(category, files.iter().map(|f| file_display_name(f)).collect());
            vec![Effect::UploadFiles {
                session_id,
                category,
                files,
            }]
        }
        Msg::UploadFileStarted { category, index, .. } => {
            state.start_file(category, index);
            Vec::new()
        }
        Msg::UploadProgress {
            category,
            index,
            percent,
            ..
        } => {
            state.apply_upload_progress(category, index, percent);
            Vec::new()
        }
        Msg::UploadFileCompleted(file) => {
            state.push_notice(
                NoticeLevel::Success,
                format!("Uploaded {} to {}.", file.file_name, file.category.title()),
            );
            state.complete_file(file);
            Vec::new()
        }
        Msg::UploadFileFailed {
            category,
            index,
            file_name,
            reason,
        } => {
            state.fail_file(category, index);
            state.push_notice(
                NoticeLevel::Danger,
                format!("Upload of {file_name} failed: {reason}"),
            );
            Vec::new()
        }
        Msg::UploadBatchFinished { category } => {
            state.finish_upload(category);
            Vec::new()
        }
        Msg::DeleteClicked(category) => match require_session(&mut state) {
            Some(session_id) => vec![Effect::DeleteCategory {
                session_id,
                category,
            }],
            None => Vec::new(),
        },
        Msg::DeleteFinished { category, result } => match result {
            Ok(()) => {
                state.push_notice(
                    NoticeLevel::Info,
                    format!("Deleted {}.", category.title()),
                );
                refetch(&state)
            }
            Err(reason) => {
                state.push_notice(
                    NoticeLevel::Danger,
                    format!("Could not delete {}: {reason}", category.title()),
                );
                Vec::new()
            }
        },
        Msg::ThresholdEdited { key, value } => {
            let Some(session_id) = require_session(&mut state) else {
                return (state, Vec::new());
            };
            state.set_threshold_locally(key.param_name(), value.clone());
            vec![Effect::UpdateThreshold {
                session_id,
                key,
                value,
            }]
        }
        Msg::ProcessToggled { process, enabled } => {
            let Some(session_id) = require_session(&mut state) else {
                return (state, Vec::new());
            };
            state.set_process_locally(process.clone(), enabled);
            vec![Effect::UpdatePipelineConfig {
                session_id,
                process,
                enabled,
            }]
        }
        Msg::RestoreDefaultsClicked => match require_session(&mut state) {
            Some(session_id) => vec![Effect::RestoreDefaults { session_id }],
            None => Vec::new(),
        },
        Msg::SettingApplied { setting, result } => match result {
            Ok(()) => {
                state.push_notice(NoticeLevel::Success, setting_success_text(&setting));
                refetch(&state)
            }
            Err(reason) => {
                // The optimistic value stays until the next refresh reconciles it.
                state.push_notice(
                    NoticeLevel::Danger,
                    format!("Error updating {}: {reason}", setting_label(&setting)),
                );
                Vec::new()
            }
        },
        Msg::RunPipelineClicked => {
            if state.pipeline().blocks_new_run() {
                state.push_notice(
                    NoticeLevel::Warning,
                    "A pipeline is already running or queued.",
                );
                return (state, Vec::new());
            }
            let Some(session_id) = require_session(&mut state) else {
                return (state, Vec::new());
            };
            state.begin_pipeline_start();
            vec![Effect::RunPipeline { session_id }]
        }
        Msg::PipelineStarted(Ok(start)) => {
            let job_id = start.job_id.clone();
            let active = start.phase.is_active();
            state.accept_pipeline_start(start);
            if active {
                vec![Effect::StartStatusPolling { job_id }]
            } else {
                Vec::new()
            }
        }
        Msg::PipelineStarted(Err(reason)) => {
            state.push_notice(NoticeLevel::Danger, format!("Pipeline Error: {reason}"));
            state.reject_pipeline_start(reason);
            Vec::new()
        }
        Msg::PipelineStatusPolled { job_id, report } => {
            if !is_current_poll(&state, &job_id) {
                return (state, Vec::new());
            }
            let phase = report.phase;
            state.apply_status_report(report);
            if !phase.is_terminal() {
                return (state, Vec::new());
            }
            let (level, text) = match phase {
                PipelinePhase::Completed => (NoticeLevel::Success, "Pipeline completed."),
                PipelinePhase::CompletedNoOutput => (
                    NoticeLevel::Warning,
                    "Pipeline completed without producing output.",
                ),
                _ => (NoticeLevel::Danger, "Pipeline failed."),
            };
            state.push_notice(level, text);
            vec![Effect::StopStatusPolling { job_id }]
        }
        Msg::PipelinePollFailed {
            job_id,
            reason,
            gave_up,
        } => {
            if !is_current_poll(&state, &job_id) {
                return (state, Vec::new());
            }
            state.record_poll_failure(reason.clone(), gave_up);
            if gave_up {
                state.push_notice(
                    NoticeLevel::Warning,
                    format!("Stopped checking pipeline status: {reason}"),
                );
                vec![Effect::StopStatusPolling { job_id }]
            } else {
                Vec::new()
            }
        }
        Msg::MetricsRequested => match require_session(&mut state) {
            Some(session_id) => {
                state.begin_metrics_fetch();
                vec![Effect::FetchMetrics { session_id }]
            }
            None => Vec::new(),
        },
        Msg::MetricsFetched(Ok(metrics)) => {
            state.finish_metrics_fetch(Some(metrics));
            Vec::new()
        }
        Msg::MetricsFetched(Err(reason)) => {
            state.finish_metrics_fetch(None);
            state.push_notice(
                NoticeLevel::Danger,
                format!("Error fetching metrics: {reason}"),
            );
            Vec::new()
        }
        Msg::NoticeDismissed(id) => {
            state.dismiss_notice(id);
            Vec::new()
        }
        Msg::Shutdown => {
            let mut effects = Vec::new();
            if state.is_refreshing() {
                state.set_refresh_running(false);
                effects.push(Effect::StopSessionRefresh);
            }
            if state.is_polling() {
                if let Some(job_id) = state.pipeline_job_id().map(str::to_string) {
                    effects.push(Effect::StopStatusPolling { job_id });
                }
                state.stop_polling();
            }
            effects
        }
    };

    (state, effects)
}

fn attach_session(state: &mut AppState, session_id: SessionId) -> Vec<Effect> {
    state.attach_session(session_id.clone());
    let mut effects = vec![Effect::FetchSession {
        session_id: session_id.clone(),
    }];
    if state.keep_fresh() && !state.is_refreshing() {
        state.set_refresh_running(true);
        effects.push(Effect::StartSessionRefresh { session_id });
    }
    effects
}

fn require_session(state: &mut AppState) -> Option<SessionId> {
    let session_id = state.session_id().cloned();
    if session_id.is_none() {
        state.push_notice(NoticeLevel::Warning, "No session is active yet.");
    }
    session_id
}

fn refetch(state: &AppState) -> Vec<Effect> {
    state
        .session_id()
        .map(|session_id| Effect::FetchSession {
            session_id: session_id.clone(),
        })
        .into_iter()
        .collect()
}

/// Late reports for a replaced or already-settled job are dropped.
fn is_current_poll(state: &AppState, job_id: &str) -> bool {
    state.is_polling() && state.pipeline_job_id() == Some(job_id)
}

fn setting_label(setting: &SettingKind) -> String {
    match setting {
        SettingKind::Threshold(name) => name.clone(),
        SettingKind::Process(process) => process.label().to_string(),
        SettingKind::RestoreDefaults => "defaults".to_string(),
    }
}

fn setting_success_text(setting: &SettingKind) -> String {
    match setting {
        SettingKind::RestoreDefaults => "Threshold defaults restored.".to_string(),
        other => format!("{} setting updated.", setting_label(other)),
    }
}
